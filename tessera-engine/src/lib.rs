#![deny(missing_docs)]

//! Resumable pack and unpack of structured memory layouts.
//!
//! A [`Segment`] binds a buffer, an element count and a committed [`DType`] and moves the
//! bytes the type describes between the buffer and a contiguous stream. Every call honors a
//! byte budget, and a call that runs out of budget parks its cursor so the next call
//! continues exactly where it stopped. The span variants describe the same traffic as a
//! list of buffer regions instead of copying it.

pub use cursor::Cursor;
pub use interpreter::Outcome;
pub use mover::Span;
pub use options::*;
pub use segment::*;
use tessera_dtype::DType;
use tessera_error::{TesseraResult, tessera_bail};

mod copy;
mod cursor;
mod interpreter;
mod mover;
mod options;
mod segment;

/// Pack `count` elements of `dtype` from `buffer`, addressed from `origin`, into a new stream.
pub fn pack(buffer: &[u8], origin: usize, count: usize, dtype: &DType) -> TesseraResult<Vec<u8>> {
    let mut segment = Segment::new(buffer.len(), origin, count, dtype)?;
    let mut stream = vec![0u8; segment.packed_size()];
    let mut last = LAST_UNBOUNDED;
    match segment.pack(buffer, 0, &mut last, &mut stream)? {
        Outcome::Complete => Ok(stream),
        Outcome::Partial => tessera_bail!(
            AssertionFailed: "packed {} of {} bytes",
            last,
            segment.packed_size()
        ),
    }
}

/// Unpack a whole stream of `count` elements of `dtype` into `buffer`, addressed from
/// `origin`.
pub fn unpack(stream: &[u8], buffer: &mut [u8], origin: usize, count: usize, dtype: &DType) -> TesseraResult<()> {
    let mut segment = Segment::new(buffer.len(), origin, count, dtype)?;
    if stream.len() != segment.packed_size() {
        tessera_bail!(
            "stream of {} bytes cannot hold {} elements of {} packed bytes",
            stream.len(),
            count,
            segment.packed_size()
        );
    }
    let mut last = LAST_UNBOUNDED;
    match segment.unpack(buffer, 0, &mut last, stream)? {
        Outcome::Complete => Ok(()),
        Outcome::Partial => tessera_bail!(
            AssertionFailed: "unpacked {} of {} bytes",
            last,
            segment.packed_size()
        ),
    }
}
