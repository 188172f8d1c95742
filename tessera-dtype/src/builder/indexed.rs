use std::sync::Arc;

use tessera_error::TesseraResult;
use tessera_program::{
    IndexedLoop, MEMCPY_THRESHOLD, Node, NodeFlags, NodeKind, ProgramBuilder, arith,
};

use super::blockindexed::all_aligned;
use super::{Shape, blockindexed, contig_final, contiguous, empty, is_foldable, splice};
use crate::DType;

/// Blocks of varying numbers of copies of `old` at the given byte displacements.
///
/// Zero-length blocks are dropped and a block that starts where the previous one ended is
/// merged into it.
pub(crate) fn indexed(
    b: &mut ProgramBuilder,
    blocklengths: &[usize],
    displacements: &[i64],
    old: &DType,
    shape: Shape,
) -> TesseraResult<()> {
    let Some(first) = blocklengths.iter().position(|&len| len != 0) else {
        return empty(b);
    };

    let extent = old.extent();
    let mut lengths: Vec<usize> = Vec::new();
    let mut offsets: Vec<i64> = Vec::new();
    for (&len, &disp) in blocklengths.iter().zip(displacements).skip(first) {
        if len == 0 {
            continue;
        }
        if let (Some(last_len), Some(&last_disp)) = (lengths.last_mut(), offsets.last()) {
            if arith::add(last_disp, arith::scale(*last_len, extent)?)? == disp {
                *last_len += len;
                continue;
            }
        }
        lengths.push(len);
        offsets.push(disp);
    }

    if lengths.len() == 1 {
        let total = lengths[0];
        if offsets[0] == 0 {
            return contiguous(b, total, old);
        }
        return blockindexed(b, total, &offsets, old, shape);
    }

    let head = blocklengths[first];
    if blocklengths[first..].iter().all(|&len| len == head) {
        return blockindexed(b, head, &displacements[first..], old, shape);
    }

    let short = lengths.iter().all(|&len| len <= MEMCPY_THRESHOLD);
    let aligned = all_aligned(&offsets, extent);
    let count = lengths.len();
    let leading = lengths[0];
    let l = IndexedLoop {
        elem_size: old.size(),
        blocklengths: Arc::from(lengths),
        offsets: Arc::from(offsets),
    };

    if is_foldable(old)? {
        let flags = NodeFlags::NONE
            .with(NodeFlags::ALIGNED, aligned)
            .with(NodeFlags::SHORT, short);
        b.push(
            Node::new(NodeKind::IndexedFinal(l), count, shape.size, shape.extent).with_flags(flags),
        )?;
        return b.push(contig_final(leading, old)?);
    }

    b.push(Node::new(NodeKind::Indexed(l), count, shape.size, shape.extent))?;
    b.push(Node::new(
        NodeKind::ContigChild {
            elem_extent: extent,
        },
        leading,
        arith::bytes(leading, old.size())?,
        arith::scale(leading, extent)?,
    ))?;
    splice(b, old)
}
