use tessera_error::TesseraResult;
use tessera_program::{MEMCPY_THRESHOLD, Node, NodeFlags, NodeKind, ProgramBuilder, VectorLoop, arith};

use super::{Shape, contig_final, contiguous, empty, is_foldable, splice};
use crate::DType;

/// `count` blocks of `blocklength` copies of `old`, block starts `stride` bytes apart.
pub(crate) fn vector(
    b: &mut ProgramBuilder,
    count: usize,
    blocklength: usize,
    stride: i64,
    old: &DType,
    shape: Shape,
) -> TesseraResult<()> {
    if count == 0 || blocklength == 0 {
        return empty(b);
    }
    if count == 1 {
        return contiguous(b, blocklength, old);
    }

    let elem_size = old.size();
    let l = VectorLoop {
        blocklength,
        elem_size,
        stride,
    };

    if is_foldable(old)? {
        let aligned = elem_size != 0 && stride % arith::offset(elem_size)? == 0;
        let flags = NodeFlags::NONE
            .with(NodeFlags::ALIGNED, aligned)
            .with(NodeFlags::SHORT, blocklength < MEMCPY_THRESHOLD);
        b.push(Node::new(NodeKind::VectorFinal(l), count, shape.size, shape.extent).with_flags(flags))?;
        return b.push(contig_final(blocklength, old)?);
    }

    if blocklength > 1 {
        b.push(Node::new(NodeKind::Vector(l), count, shape.size, shape.extent))?;
        b.push(Node::new(
            NodeKind::ContigChild {
                elem_extent: old.extent(),
            },
            blocklength,
            arith::bytes(blocklength, elem_size)?,
            arith::scale(blocklength, old.extent())?,
        ))?;
    } else {
        b.push(Node::new(NodeKind::Vector1(l), count, shape.size, shape.extent))?;
    }
    splice(b, old)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tessera_program::{NodeFlags, NodeKind, NodeTag};

    use crate::DType;
    use crate::builder::test_support::{program, root, tags};

    #[test]
    fn primitive_is_final() {
        let t = DType::vector(3, 2, 4, &DType::I32).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::VectorFinal, NodeTag::ContigFinal]);
        let p = program(&t);
        let NodeKind::VectorFinal(l) = &p.nodes()[1].kind else {
            panic!("expected vector_final");
        };
        assert_eq!(l.stride, 16);
        assert!(p.nodes()[1].flags.contains(NodeFlags::ALIGNED));
        assert!(p.nodes()[1].flags.contains(NodeFlags::SHORT));
        assert_eq!(p.nodes()[2].count, 2);
    }

    #[test]
    fn unaligned_long_blocks() {
        let t = DType::hvector(2, 2048, 8195, &DType::I32).unwrap();
        let flags = program(&t).nodes()[1].flags;
        assert!(!flags.contains(NodeFlags::ALIGNED));
        assert!(!flags.contains(NodeFlags::SHORT));
    }

    #[test]
    fn single_block_is_contiguous() {
        let t = DType::vector(1, 7, 100, &DType::U8).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::ContigFinal]);
        assert_eq!(program(&t).nodes()[1].count, 7);
    }

    #[rstest]
    #[case(0, 3)]
    #[case(3, 0)]
    fn empty_shapes(#[case] count: usize, #[case] blocklength: usize) {
        let t = DType::vector(count, blocklength, 2, &DType::I32).unwrap();
        assert_eq!(program(&t).nodes()[1].count, 0);
    }

    #[test]
    fn gapped_element_uses_child() {
        let padded = DType::resized(&DType::I16, 0, 4).unwrap();
        let t = DType::vector(3, 2, 3, &padded).unwrap();
        assert_eq!(
            tags(&t),
            vec![NodeTag::Vector, NodeTag::ContigChild, NodeTag::ContigFinal]
        );
        assert_eq!(root(&t).tag(), NodeTag::Vector);

        let t = DType::vector(3, 1, 3, &padded).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::Vector1, NodeTag::ContigFinal]);
    }
}
