use std::sync::Arc;

use itertools::Itertools;
use tessera_error::TesseraResult;
use tessera_program::{
    BlockIndexedLoop, MEMCPY_THRESHOLD, Node, NodeFlags, NodeKind, ProgramBuilder, arith,
};

use super::{Shape, contig_final, contiguous, empty, is_foldable, splice, vector};
use crate::DType;

/// Whether every offset is a multiple of an element extent of 2, 4 or 8 bytes.
pub(super) fn all_aligned(offsets: &[i64], extent: i64) -> bool {
    matches!(extent, 2 | 4 | 8) && offsets.iter().all(|o| o % extent == 0)
}

/// Blocks of `blocklength` copies of `old` at the given byte displacements.
pub(crate) fn blockindexed(
    b: &mut ProgramBuilder,
    blocklength: usize,
    displacements: &[i64],
    old: &DType,
    shape: Shape,
) -> TesseraResult<()> {
    let Some(&first) = displacements.first() else {
        return empty(b);
    };
    if blocklength == 0 {
        return empty(b);
    }

    let block_bytes = arith::scale(blocklength, old.extent())?;
    let mut breaks = 0usize;
    for (cur, next) in displacements.iter().tuple_windows() {
        if arith::add(*cur, block_bytes)? != *next {
            breaks += 1;
        }
    }

    let (count, blocklength, displacements) = if breaks == 0 {
        // All blocks abut: one run of every element.
        let total = arith::bytes(displacements.len(), blocklength)?;
        if first == 0 {
            return contiguous(b, total, old);
        }
        (1, total, &displacements[..1])
    } else {
        (displacements.len(), blocklength, displacements)
    };

    if count > 1 && first == 0 {
        let stride = displacements[1] - displacements[0];
        if displacements
            .iter()
            .tuple_windows()
            .all(|(cur, next)| next - cur == stride)
        {
            return vector(b, count, blocklength, stride, old, shape);
        }
    }

    let offsets: Arc<[i64]> = displacements.into();
    let aligned = all_aligned(&offsets, old.extent());
    let l = BlockIndexedLoop {
        blocklength,
        elem_size: old.size(),
        offsets,
    };

    if is_foldable(old)? {
        let flags = NodeFlags::NONE
            .with(NodeFlags::ALIGNED, aligned)
            .with(NodeFlags::SHORT, blocklength < MEMCPY_THRESHOLD);
        b.push(
            Node::new(NodeKind::BlockIndexedFinal(l), count, shape.size, shape.extent)
                .with_flags(flags),
        )?;
        return b.push(contig_final(blocklength, old)?);
    }

    if blocklength > 1 {
        b.push(Node::new(NodeKind::BlockIndexed(l), count, shape.size, shape.extent))?;
        b.push(Node::new(
            NodeKind::ContigChild {
                elem_extent: old.extent(),
            },
            blocklength,
            arith::bytes(blocklength, old.size())?,
            block_bytes,
        ))?;
    } else {
        b.push(Node::new(NodeKind::BlockIndexed1(l), count, shape.size, shape.extent))?;
    }
    splice(b, old)
}

#[cfg(test)]
mod tests {
    use tessera_program::{NodeFlags, NodeKind, NodeTag};

    use crate::DType;
    use crate::builder::test_support::{program, root, tags};

    #[test]
    fn scattered_blocks_are_final() {
        let t = DType::indexed_block(2, &[0, 5, 3], &DType::I32).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::BlockIndexedFinal, NodeTag::ContigFinal]);
        let p = program(&t);
        let NodeKind::BlockIndexedFinal(l) = &p.nodes()[1].kind else {
            panic!("expected blockindexed_final");
        };
        assert_eq!(&*l.offsets, &[0, 20, 12]);
        assert!(p.nodes()[1].flags.contains(NodeFlags::ALIGNED));
    }

    #[test]
    fn abutting_at_zero_is_contiguous() {
        let t = DType::indexed_block(3, &[0, 3, 6], &DType::I16).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::ContigFinal]);
        assert_eq!(program(&t).nodes()[1].count, 9);
    }

    #[test]
    fn abutting_elsewhere_is_one_block() {
        let t = DType::hindexed_block(2, &[12, 20], &DType::I32).unwrap();
        let p = program(&t);
        let NodeKind::BlockIndexedFinal(l) = &p.nodes()[1].kind else {
            panic!("expected blockindexed_final");
        };
        assert_eq!(p.nodes()[1].count, 1);
        assert_eq!(l.blocklength, 4);
        assert_eq!(&*l.offsets, &[12]);
    }

    #[test]
    fn even_spacing_is_vector() {
        let t = DType::indexed_block(1, &[0, 4, 8, 12], &DType::F64).unwrap();
        let NodeKind::VectorFinal(l) = root(&t) else {
            panic!("expected vector_final");
        };
        assert_eq!(l.stride, 32);
    }

    #[test]
    fn odd_bytes_are_not_aligned() {
        let t = DType::hindexed_block(1, &[0, 6, 3], &DType::I32).unwrap();
        assert!(!program(&t).nodes()[1].flags.contains(NodeFlags::ALIGNED));
    }

    #[test]
    fn gapped_element() {
        let padded = DType::resized(&DType::I32, 0, 12).unwrap();
        let t = DType::indexed_block(2, &[1, 5, 4], &padded).unwrap();
        assert_eq!(
            tags(&t),
            vec![NodeTag::BlockIndexed, NodeTag::ContigChild, NodeTag::ContigFinal]
        );
        let t = DType::indexed_block(1, &[1, 5, 4], &padded).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::BlockIndexed1, NodeTag::ContigFinal]);
    }
}
