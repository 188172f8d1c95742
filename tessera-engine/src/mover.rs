//! Sinks for the runs of bytes the interpreter discovers.
//!
//! The interpreter only computes where each run lives, relative to the buffer origin. A
//! [`Mover`] decides what to do with it: copy it into or out of a stream, record it as a
//! span, or simply count it.

use std::ops::Range;

use tessera_error::{TesseraResult, tessera_bail, tessera_err};
use tessera_program::arith;

use crate::copy::Kernel;

/// A run of the bound buffer: `len` bytes starting at index `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Index of the first byte in the buffer.
    pub offset: usize,
    /// Number of bytes.
    pub len: usize,
}

impl Span {
    /// A span of `len` bytes at `offset`.
    pub fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Index one past the last byte.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// The span as a range of buffer indices.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end()
    }
}

pub(crate) trait Mover {
    /// Stream bytes this call may still move.
    fn bytes_left(&self) -> usize;

    /// Runs this call may still emit.
    fn slots_left(&self) -> usize {
        usize::MAX
    }

    /// Move `len` bytes at `addr`, relative to the buffer origin.
    fn move_run(&mut self, addr: i64, len: usize, kernel: Kernel) -> TesseraResult<()>;
}

/// Resolve a run to buffer indices, failing if any byte falls outside the buffer.
fn window(origin: usize, buffer_len: usize, addr: i64, len: usize) -> TesseraResult<Range<usize>> {
    let start = arith::add(arith::offset(origin)?, addr)?;
    let in_bounds = usize::try_from(start)
        .ok()
        .and_then(|start| start.checked_add(len).map(|end| start..end))
        .filter(|range| range.end <= buffer_len);
    in_bounds.ok_or_else(|| tessera_err!(OutOfBounds: start, 0, buffer_len))
}

fn overrun(len: usize, left: usize) -> TesseraResult<()> {
    if len > left {
        tessera_bail!(
            AssertionFailed: "run of {} bytes exceeds the {} left in the stream",
            len,
            left
        );
    }
    Ok(())
}

/// Gathers runs of a buffer into a contiguous stream.
pub(crate) struct PackMover<'a> {
    buffer: &'a [u8],
    origin: usize,
    stream: &'a mut [u8],
    written: usize,
}

impl<'a> PackMover<'a> {
    pub(crate) fn new(buffer: &'a [u8], origin: usize, stream: &'a mut [u8]) -> Self {
        Self {
            buffer,
            origin,
            stream,
            written: 0,
        }
    }

    pub(crate) fn moved(&self) -> usize {
        self.written
    }
}

impl Mover for PackMover<'_> {
    fn bytes_left(&self) -> usize {
        self.stream.len() - self.written
    }

    fn move_run(&mut self, addr: i64, len: usize, kernel: Kernel) -> TesseraResult<()> {
        if len == 0 {
            return Ok(());
        }
        overrun(len, self.bytes_left())?;
        let src = window(self.origin, self.buffer.len(), addr, len)?;
        let end = self.written + len;
        kernel.copy(&mut self.stream[self.written..end], &self.buffer[src])?;
        self.written = end;
        Ok(())
    }
}

/// Scatters a contiguous stream into runs of a buffer.
pub(crate) struct UnpackMover<'a> {
    buffer: &'a mut [u8],
    origin: usize,
    stream: &'a [u8],
    read: usize,
}

impl<'a> UnpackMover<'a> {
    pub(crate) fn new(buffer: &'a mut [u8], origin: usize, stream: &'a [u8]) -> Self {
        Self {
            buffer,
            origin,
            stream,
            read: 0,
        }
    }

    pub(crate) fn moved(&self) -> usize {
        self.read
    }
}

impl Mover for UnpackMover<'_> {
    fn bytes_left(&self) -> usize {
        self.stream.len() - self.read
    }

    fn move_run(&mut self, addr: i64, len: usize, kernel: Kernel) -> TesseraResult<()> {
        if len == 0 {
            return Ok(());
        }
        overrun(len, self.bytes_left())?;
        let dst = window(self.origin, self.buffer.len(), addr, len)?;
        let end = self.read + len;
        kernel.copy(&mut self.buffer[dst], &self.stream[self.read..end])?;
        self.read = end;
        Ok(())
    }
}

/// Records runs as spans of the buffer, up to a ceiling on the number of spans.
pub(crate) struct SpanMover<'a> {
    buffer_len: usize,
    origin: usize,
    spans: &'a mut Vec<Span>,
    /// Spans before this index belong to an earlier call. Only `merge` lets a run extend them.
    first_new: usize,
    bytes_left: usize,
    slots_left: usize,
    merge: bool,
    moved: usize,
}

impl<'a> SpanMover<'a> {
    pub(crate) fn new(
        buffer_len: usize,
        origin: usize,
        spans: &'a mut Vec<Span>,
        bytes: usize,
        ceiling: usize,
        merge: bool,
    ) -> Self {
        let first_new = spans.len();
        Self {
            buffer_len,
            origin,
            spans,
            first_new,
            bytes_left: bytes,
            slots_left: ceiling,
            merge,
            moved: 0,
        }
    }

    pub(crate) fn moved(&self) -> usize {
        self.moved
    }
}

impl Mover for SpanMover<'_> {
    fn bytes_left(&self) -> usize {
        self.bytes_left
    }

    fn slots_left(&self) -> usize {
        self.slots_left
    }

    fn move_run(&mut self, addr: i64, len: usize, _kernel: Kernel) -> TesseraResult<()> {
        if len == 0 {
            return Ok(());
        }
        let range = window(self.origin, self.buffer_len, addr, len)?;
        let mergeable =
            self.spans.len() > self.first_new || (self.merge && !self.spans.is_empty());
        match self.spans.last_mut() {
            Some(last) if mergeable && last.end() == range.start => last.len += len,
            _ => {
                if self.slots_left == 0 {
                    tessera_bail!(AssertionFailed: "span ceiling exceeded");
                }
                self.spans.push(Span::new(range.start, len));
                self.slots_left -= 1;
            }
        }
        self.bytes_left = self.bytes_left.saturating_sub(len);
        self.moved += len;
        Ok(())
    }
}

/// Counts maximal contiguous regions, merging runs that abut.
pub(crate) struct CountMover {
    buffer_len: usize,
    origin: usize,
    bytes_left: usize,
    blocks: usize,
    last_end: Option<usize>,
}

impl CountMover {
    pub(crate) fn new(buffer_len: usize, origin: usize, bytes: usize) -> Self {
        Self {
            buffer_len,
            origin,
            bytes_left: bytes,
            blocks: 0,
            last_end: None,
        }
    }

    pub(crate) fn blocks(&self) -> usize {
        self.blocks
    }
}

impl Mover for CountMover {
    fn bytes_left(&self) -> usize {
        self.bytes_left
    }

    fn move_run(&mut self, addr: i64, len: usize, _kernel: Kernel) -> TesseraResult<()> {
        if len == 0 {
            return Ok(());
        }
        let range = window(self.origin, self.buffer_len, addr, len)?;
        if self.last_end != Some(range.start) {
            self.blocks += 1;
        }
        self.last_end = Some(range.end);
        self.bytes_left = self.bytes_left.saturating_sub(len);
        Ok(())
    }
}

/// Advances a cursor without touching any memory.
pub(crate) struct NullMover {
    bytes_left: usize,
}

impl NullMover {
    pub(crate) fn new(bytes: usize) -> Self {
        Self { bytes_left: bytes }
    }
}

impl Mover for NullMover {
    fn bytes_left(&self) -> usize {
        self.bytes_left
    }

    fn move_run(&mut self, _addr: i64, len: usize, _kernel: Kernel) -> TesseraResult<()> {
        self.bytes_left = self.bytes_left.saturating_sub(len);
        Ok(())
    }
}
