//! Width-specialized copy kernels.
//!
//! Every kernel produces the same bytes. The choice only decides how a run is walked:
//! one bulk copy, fixed-width words, or single bytes.

use tessera_error::{TesseraResult, tessera_bail};
use tessera_program::NodeFlags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kernel {
    Memcpy,
    Wide8,
    Wide4,
    Wide2,
    Bytes,
}

impl Kernel {
    /// Kernel for one block of a Final loop: `len` bytes of `elem_size`-byte elements.
    pub(crate) fn for_block(len: usize, elem_size: usize, flags: NodeFlags, threshold: usize) -> Self {
        if len >= threshold || !flags.contains(NodeFlags::SHORT) {
            return Self::Memcpy;
        }
        if flags.contains(NodeFlags::ALIGNED) {
            Self::by_width(elem_size)
        } else {
            Self::Bytes
        }
    }

    /// Kernel for a contiguous run of `len` bytes.
    pub(crate) fn for_run(len: usize, base_size: usize, threshold: usize) -> Self {
        if len >= threshold {
            Self::Memcpy
        } else {
            Self::by_width(base_size)
        }
    }

    fn by_width(elem_size: usize) -> Self {
        match elem_size {
            0 => Self::Bytes,
            s if s % 8 == 0 => Self::Wide8,
            s if s % 4 == 0 => Self::Wide4,
            s if s % 2 == 0 => Self::Wide2,
            _ => Self::Bytes,
        }
    }

    pub(crate) fn copy(self, dst: &mut [u8], src: &[u8]) -> TesseraResult<()> {
        if dst.len() != src.len() {
            tessera_bail!(
                AssertionFailed: "copy between runs of {} and {} bytes",
                dst.len(),
                src.len()
            );
        }
        match self {
            Self::Memcpy => dst.copy_from_slice(src),
            Self::Wide8 => copy_words::<8>(dst, src),
            Self::Wide4 => copy_words::<4>(dst, src),
            Self::Wide2 => copy_words::<2>(dst, src),
            Self::Bytes => {
                for (d, s) in dst.iter_mut().zip(src) {
                    *d = *s;
                }
            }
        }
        Ok(())
    }
}

/// Copy `W`-byte words, then whatever tail a partial element leaves.
fn copy_words<const W: usize>(dst: &mut [u8], src: &[u8]) {
    let mut dst_words = dst.chunks_exact_mut(W);
    let mut src_words = src.chunks_exact(W);
    for (d, s) in (&mut dst_words).zip(&mut src_words) {
        d.copy_from_slice(s);
    }
    dst_words
        .into_remainder()
        .copy_from_slice(src_words.remainder());
}
