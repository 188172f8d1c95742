use libfuzzer_sys::arbitrary::{Arbitrary, Result, Unstructured};
use tessera_dtype::DType;
use tessera_engine::{LAST_UNBOUNDED, Outcome, Segment, SpanOptions};
use tessera_error::{TesseraResult, TesseraUnwrap};

/// A type, a repetition count and the byte budgets to split a traversal with.
#[derive(Debug)]
pub struct FuzzPackAction {
    pub dtype: DType,
    pub count: usize,
    pub budgets: Vec<usize>,
    pub ceiling: usize,
    pub merge: bool,
}

impl<'a> Arbitrary<'a> for FuzzPackAction {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self> {
        let dtype = DType::arbitrary(u)?;
        let count = u.int_in_range(0..=4)?;
        let budget_count = u.int_in_range(1..=8)?;
        let budgets = (0..budget_count)
            .map(|_| u.int_in_range(0..=64))
            .collect::<Result<Vec<usize>>>()?;
        Ok(Self {
            dtype,
            count,
            budgets,
            ceiling: u.int_in_range(1..=16)?,
            merge: u.arbitrary()?,
        })
    }
}

impl FuzzPackAction {
    /// Bytes needed to hold every element, with the origin at index 0.
    pub fn buffer_len(&self) -> usize {
        let Some(last) = self.count.checked_sub(1) else {
            return 0;
        };
        let end = i64::try_from(last)
            .tessera_unwrap()
            .checked_mul(self.dtype.extent())
            .and_then(|start| start.checked_add(self.dtype.true_ub()))
            .unwrap_or(0);
        usize::try_from(end.max(0)).tessera_unwrap()
    }

    pub fn segment(&self) -> TesseraResult<Segment> {
        Segment::new(self.buffer_len(), 0, self.count, &self.dtype)
    }
}

/// Pack everything, cycling through `budgets` for the stream length of each call.
pub fn pack_in_chunks(segment: &mut Segment, buffer: &[u8], budgets: &[usize]) -> TesseraResult<Vec<u8>> {
    let mut out = Vec::with_capacity(segment.packed_size());
    let mut stalled = 0;
    for &budget in budgets.iter().cycle() {
        let first = i64::try_from(out.len())?;
        let mut chunk = vec![0u8; budget];
        let mut last = LAST_UNBOUNDED;
        let outcome = segment.pack(buffer, first, &mut last, &mut chunk)?;
        let moved = usize::try_from(last - first)?;
        out.extend_from_slice(&chunk[..moved]);
        if outcome == Outcome::Complete {
            break;
        }
        stalled = if moved == 0 { stalled + 1 } else { 0 };
        if stalled > budgets.len() {
            // Every budget in the cycle is zero.
            break;
        }
    }
    Ok(out)
}

/// Gather the stream through the span variant, `ceiling` spans per call.
pub fn gather_spans(segment: &mut Segment, buffer: &[u8], options: SpanOptions) -> TesseraResult<Vec<u8>> {
    let mut spans = Vec::new();
    loop {
        let first = i64::try_from(segment.pack_spans_position())?;
        let mut last = LAST_UNBOUNDED;
        if segment.pack_to_spans(first, &mut last, &mut spans, options)? == Outcome::Complete {
            break;
        }
    }
    Ok(spans
        .iter()
        .flat_map(|span| buffer[span.range()].iter().copied())
        .collect())
}
