use std::sync::Arc;

use log::{debug, trace};
use tessera_dtype::DType;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};
use tessera_program::{Program, arith};

use crate::cursor::Cursor;
use crate::interpreter::{self, Outcome};
use crate::mover::{CountMover, Mover, NullMover, PackMover, Span, SpanMover, UnpackMover};
use crate::options::{EngineOptions, SpanOptions};

/// Passed as `last` to move everything that remains.
pub const LAST_UNBOUNDED: i64 = -1;

const PACK: usize = 0;
const PACK_SPANS: usize = 1;
const UNPACK: usize = 2;

/// Progress of one direction of a segment.
#[derive(Debug, Clone, Default)]
struct Slot {
    cursor: Cursor,
    /// Elements fully moved.
    element: usize,
    /// Stream bytes moved.
    position: usize,
}

/// A traversal session over `count` elements of a type in one buffer.
///
/// The buffer is addressed relative to `origin`, the index of the byte at displacement 0, so
/// types with negative displacements work as long as every byte they cover lies inside
/// the buffer. Pack, pack-to-spans and unpack each keep their own cursor, so calls in
/// different directions may be interleaved freely.
///
/// Access is sequential only. Every call must start at its direction's current stream
/// position, and a `first` anywhere else is rejected rather than sought to. Call
/// [`Segment::reset`] to start a direction over.
#[derive(Debug, Clone)]
pub struct Segment {
    program: Arc<Program>,
    elements: usize,
    extent: i64,
    packed_size: usize,
    buffer_len: usize,
    origin: usize,
    options: EngineOptions,
    slots: [Slot; 3],
}

impl Segment {
    /// Bind `count` elements of `dtype` in a buffer of `buffer_len` bytes.
    pub fn new(buffer_len: usize, origin: usize, count: usize, dtype: &DType) -> TesseraResult<Self> {
        debug!(
            "segment of {} x {} over {} bytes at origin {}",
            count, dtype, buffer_len, origin
        );
        match dtype.program()? {
            Some(program) => Self::from_program(buffer_len, origin, count, dtype.extent(), program.clone()),
            // A predefined type has no program of its own; all of it is one contiguous run.
            None => Self::from_program(
                buffer_len,
                origin,
                1,
                dtype.extent(),
                Arc::new(Program::primitive(count, dtype.size())?),
            ),
        }
    }

    /// Bind `count` elements laid out by an already compiled program, such as one decoded
    /// with [`Program::deserialize`]. Consecutive elements start `extent` bytes apart.
    pub fn from_program(
        buffer_len: usize,
        origin: usize,
        count: usize,
        extent: i64,
        program: Arc<Program>,
    ) -> TesseraResult<Self> {
        let element_size = program.root().map_or(0, |root| root.size);
        Ok(Self {
            packed_size: arith::bytes(count, element_size)?,
            program,
            elements: count,
            extent,
            buffer_len,
            origin,
            options: EngineOptions::default(),
            slots: Default::default(),
        })
    }

    /// Replace the engine options.
    pub fn with_options(mut self, options: EngineOptions) -> TesseraResult<Self> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    /// Total bytes of the packed stream.
    pub fn packed_size(&self) -> usize {
        self.packed_size
    }

    /// The program being executed.
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Stream bytes packed so far.
    pub fn pack_position(&self) -> usize {
        self.slots[PACK].position
    }

    /// Stream bytes described by spans so far.
    pub fn pack_spans_position(&self) -> usize {
        self.slots[PACK_SPANS].position
    }

    /// Stream bytes unpacked so far.
    pub fn unpack_position(&self) -> usize {
        self.slots[UNPACK].position
    }

    /// Rewind every direction to the start.
    pub fn reset(&mut self) {
        self.slots = Default::default();
    }

    /// Pack stream bytes `[first, last)` from `buffer` into `stream`.
    ///
    /// At most `stream.len()` bytes are moved. On return `last` is `first` plus the bytes
    /// actually moved.
    pub fn pack(&mut self, buffer: &[u8], first: i64, last: &mut i64, stream: &mut [u8]) -> TesseraResult<Outcome> {
        self.check_buffer(buffer.len())?;
        let budget = budget(first, *last, self.slots[PACK].position, stream.len())?;
        let mut mover = PackMover::new(buffer, self.origin, &mut stream[..budget]);
        let outcome = self.drive(PACK, &mut mover)?;
        self.finish(PACK, first, last, mover.moved(), outcome)
    }

    /// Unpack stream bytes `[first, last)` from `stream` into `buffer`.
    ///
    /// At most `stream.len()` bytes are moved. On return `last` is `first` plus the bytes
    /// actually moved.
    pub fn unpack(&mut self, buffer: &mut [u8], first: i64, last: &mut i64, stream: &[u8]) -> TesseraResult<Outcome> {
        self.check_buffer(buffer.len())?;
        let budget = budget(first, *last, self.slots[UNPACK].position, stream.len())?;
        let mut mover = UnpackMover::new(buffer, self.origin, &stream[..budget]);
        let outcome = self.drive(UNPACK, &mut mover)?;
        self.finish(UNPACK, first, last, mover.moved(), outcome)
    }

    /// Append the buffer spans that stream bytes `[first, last)` are gathered from.
    pub fn pack_to_spans(
        &mut self,
        first: i64,
        last: &mut i64,
        spans: &mut Vec<Span>,
        options: SpanOptions,
    ) -> TesseraResult<Outcome> {
        self.spans(PACK_SPANS, first, last, spans, options)
    }

    /// Append the buffer spans that stream bytes `[first, last)` scatter into.
    ///
    /// This advances the unpack cursor, so it is an alternative to [`Segment::unpack`] for
    /// callers that move the bytes themselves.
    pub fn unpack_from_spans(
        &mut self,
        first: i64,
        last: &mut i64,
        spans: &mut Vec<Span>,
        options: SpanOptions,
    ) -> TesseraResult<Outcome> {
        self.spans(UNPACK, first, last, spans, options)
    }

    /// Count the maximal contiguous buffer regions covering stream bytes `[first, last)`.
    ///
    /// Runs on a throwaway cursor and leaves every direction where it was.
    pub fn count_contiguous_blocks(&self, first: i64, last: i64) -> TesseraResult<usize> {
        let skip = arith::length(first)?;
        let mut slot = Slot::default();
        if drive(&self.program, self.elements, self.extent, &self.options, &mut slot, &mut NullMover::new(skip))?
            == Outcome::Complete
        {
            return Ok(0);
        }
        let wanted = budget(first, last, skip, usize::MAX)?;
        let mut counter = CountMover::new(self.buffer_len, self.origin, wanted);
        drive(&self.program, self.elements, self.extent, &self.options, &mut slot, &mut counter)?;
        Ok(counter.blocks())
    }

    fn spans(
        &mut self,
        which: usize,
        first: i64,
        last: &mut i64,
        spans: &mut Vec<Span>,
        options: SpanOptions,
    ) -> TesseraResult<Outcome> {
        let budget = budget(first, *last, self.slots[which].position, usize::MAX)?;
        let mut mover = SpanMover::new(
            self.buffer_len,
            self.origin,
            spans,
            budget,
            options.ceiling,
            options.merge,
        );
        let outcome = self.drive(which, &mut mover)?;
        self.finish(which, first, last, mover.moved(), outcome)
    }

    fn drive<M: Mover>(&mut self, which: usize, mover: &mut M) -> TesseraResult<Outcome> {
        drive(
            &self.program,
            self.elements,
            self.extent,
            &self.options,
            &mut self.slots[which],
            mover,
        )
    }

    fn finish(&mut self, which: usize, first: i64, last: &mut i64, moved: usize, outcome: Outcome) -> TesseraResult<Outcome> {
        let slot = &mut self.slots[which];
        slot.position += moved;
        *last = arith::add(first, arith::offset(moved)?)?;
        trace!(
            "moved {} bytes to stream position {}, {} of {} elements done",
            moved, slot.position, slot.element, self.elements
        );
        Ok(outcome)
    }

    fn check_buffer(&self, len: usize) -> TesseraResult<()> {
        if len != self.buffer_len {
            tessera_bail!(
                "segment bound to a {} byte buffer, called with {} bytes",
                self.buffer_len,
                len
            );
        }
        Ok(())
    }
}

/// Run elements until the budget runs out or every element is done.
fn drive<M: Mover>(
    program: &Program,
    elements: usize,
    extent: i64,
    options: &EngineOptions,
    slot: &mut Slot,
    mover: &mut M,
) -> TesseraResult<Outcome> {
    while slot.element < elements {
        let base = arith::scale(slot.element, extent)?;
        match interpreter::run(program, &mut slot.cursor, base, mover, options.memcpy_threshold)? {
            Outcome::Complete => slot.element += 1,
            Outcome::Partial => return Ok(Outcome::Partial),
        }
    }
    Ok(Outcome::Complete)
}

/// Bytes a call may move: what `[first, last)` asks for, capped by `room`.
fn budget(first: i64, last: i64, position: usize, room: usize) -> TesseraResult<usize> {
    let start = usize::try_from(first).map_err(|_| tessera_err!("first offset {} is negative", first))?;
    if start != position {
        tessera_bail!(
            "first offset {} is not the stream position {}: segments do not support random access",
            first,
            position
        );
    }
    if last == LAST_UNBOUNDED {
        return Ok(room);
    }
    if last < first {
        tessera_bail!("last offset {} precedes first offset {}", last, first);
    }
    Ok(arith::length(last - first)?.min(room))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, LAST_UNBOUNDED, 0, 10, 10)]
    #[case(4, 6, 4, 10, 2)]
    #[case(4, 100, 4, 10, 10)]
    fn budgets(#[case] first: i64, #[case] last: i64, #[case] position: usize, #[case] room: usize, #[case] expected: usize) {
        assert_eq!(budget(first, last, position, room).unwrap(), expected);
    }

    #[rstest]
    #[case::negative(-1, 4, 0)]
    #[case::behind(0, 4, 2)]
    #[case::reversed(4, 2, 4)]
    fn bad_budgets(#[case] first: i64, #[case] last: i64, #[case] position: usize) {
        assert!(budget(first, last, position, 10).is_err());
    }

    #[test]
    fn primitive_is_one_run() {
        let buffer = (0u8..12).collect::<Vec<_>>();
        let mut segment = Segment::new(12, 0, 3, &DType::I32).unwrap();
        assert_eq!(segment.packed_size(), 12);
        assert_eq!(segment.program().len(), 3);

        let mut stream = [0u8; 12];
        let mut last = 5;
        assert_eq!(segment.pack(&buffer, 0, &mut last, &mut stream).unwrap(), Outcome::Partial);
        assert_eq!(last, 5);
        let mut last = LAST_UNBOUNDED;
        assert_eq!(
            segment.pack(&buffer, 5, &mut last, &mut stream[5..]).unwrap(),
            Outcome::Complete
        );
        assert_eq!(last, 12);
        assert_eq!(stream.as_slice(), buffer.as_slice());
    }

    #[test]
    fn wrong_buffer_length() {
        let mut segment = Segment::new(12, 0, 3, &DType::I32).unwrap();
        let mut last = LAST_UNBOUNDED;
        assert!(segment.pack(&[0u8; 8], 0, &mut last, &mut [0u8; 12]).is_err());
    }

    #[test]
    fn negative_displacements_use_origin() {
        let t = DType::hindexed_block(1, &[-8, 4], &DType::I32).unwrap();
        let buffer = (0u8..16).collect::<Vec<_>>();
        let mut segment = Segment::new(16, 8, 1, &t).unwrap();
        let mut stream = [0u8; 8];
        let mut last = LAST_UNBOUNDED;
        segment.pack(&buffer, 0, &mut last, &mut stream).unwrap();
        assert_eq!(stream, [0, 1, 2, 3, 12, 13, 14, 15]);
    }

    #[test]
    fn out_of_bounds_layout() {
        let t = DType::vector(2, 1, 4, &DType::I32).unwrap();
        let mut segment = Segment::new(8, 0, 1, &t).unwrap();
        let mut stream = [0u8; 8];
        let mut last = LAST_UNBOUNDED;
        assert!(segment.pack(&[0u8; 8], 0, &mut last, &mut stream).is_err());
    }
}
