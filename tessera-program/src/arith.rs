//! Checked byte arithmetic shared by the builder and the engine.
//!
//! Counts and lengths are `usize`, displacements are signed `i64` byte offsets relative to
//! a buffer origin. Every conversion between the two goes through these helpers so that an
//! overflow surfaces as an error instead of a wrapped address.

use tessera_error::{TesseraResult, tessera_err};

/// Convert an element or byte count into a signed offset.
#[inline]
pub fn offset(n: usize) -> TesseraResult<i64> {
    Ok(i64::try_from(n)?)
}

/// Convert a signed offset that must be non-negative into a length.
#[inline]
pub fn length(n: i64) -> TesseraResult<usize> {
    Ok(usize::try_from(n)?)
}

/// `base + delta`, failing on overflow.
#[inline]
pub fn add(base: i64, delta: i64) -> TesseraResult<i64> {
    base.checked_add(delta)
        .ok_or_else(|| tessera_err!("address overflow computing {} + {}", base, delta))
}

/// `count * unit` as a signed offset, failing on overflow.
#[inline]
pub fn scale(count: usize, unit: i64) -> TesseraResult<i64> {
    offset(count)?
        .checked_mul(unit)
        .ok_or_else(|| tessera_err!("address overflow computing {} * {}", count, unit))
}

/// `count * size` as a byte length, failing on overflow.
#[inline]
pub fn bytes(count: usize, size: usize) -> TesseraResult<usize> {
    count
        .checked_mul(size)
        .ok_or_else(|| tessera_err!("length overflow computing {} * {}", count, size))
}
