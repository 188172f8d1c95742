use tessera_error::TesseraResult;
use tessera_program::{ContigLoop, Node, NodeKind, ProgramBuilder, arith};

use super::{contig_final, empty, is_foldable, splice};
use crate::DType;

/// `count` consecutive copies of `old`.
///
/// Gapless element types fold into a single leaf run. Otherwise a loop node walks the
/// elements and the element's own program is spliced one level below it; a single element
/// needs no loop and its program is spliced in place.
pub(crate) fn contiguous(b: &mut ProgramBuilder, count: usize, old: &DType) -> TesseraResult<()> {
    if count == 0 {
        return empty(b);
    }
    if is_foldable(old)? {
        return b.push(contig_final(count, old)?);
    }
    if count > 1 {
        let (size, extent) = (old.size(), old.extent());
        b.push(Node::new(
            NodeKind::Contig(ContigLoop {
                base_size: size,
                base_extent: extent,
            }),
            count,
            arith::bytes(count, size)?,
            arith::scale(count, extent)?,
        ))?;
    }
    splice(b, old)
}

#[cfg(test)]
mod tests {
    use tessera_program::{NodeKind, NodeTag};

    use crate::DType;
    use crate::builder::test_support::{program, root, tags};

    #[test]
    fn primitive_is_a_leaf() {
        let t = DType::contiguous(5, &DType::F64).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::ContigFinal]);
        let p = program(&t);
        assert_eq!(p.nodes()[1].count, 5);
        assert_eq!(p.nodes()[1].size, 40);
    }

    #[test]
    fn contiguous_of_contiguous_folds() {
        let inner = DType::contiguous(3, &DType::I16).unwrap();
        let t = DType::contiguous(4, &inner).unwrap();
        let NodeKind::ContigFinal(l) = root(&t) else {
            panic!("expected a folded leaf");
        };
        assert_eq!(l.base_size, 6);
        assert_eq!(program(&t).nodes()[1].count, 4);
    }

    #[test]
    fn gapped_element_loops() {
        let padded = DType::resized(&DType::I32, 0, 8).unwrap();
        let t = DType::contiguous(3, &padded).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::Contig, NodeTag::ContigFinal]);
        let NodeKind::Contig(l) = root(&t) else {
            panic!("expected a loop");
        };
        assert_eq!((l.base_size, l.base_extent), (4, 8));
    }

    #[test]
    fn single_gapped_element_splices() {
        let v = DType::vector(2, 1, 3, &DType::I32).unwrap();
        let t = DType::contiguous(1, &v).unwrap();
        assert_eq!(tags(&t), tags(&v));
    }

    #[test]
    fn zero_count_is_empty() {
        let v = DType::vector(2, 1, 3, &DType::I32).unwrap();
        let t = DType::contiguous(0, &v).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::ContigFinal]);
        assert_eq!(program(&t).nodes()[1].count, 0);
    }
}
