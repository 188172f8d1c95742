use itertools::Itertools;
use tessera_error::TesseraResult;
use tessera_program::{Node, NodeKind, ProgramBuilder, StructField, StructLoop, arith};

use super::{Shape, blockindexed, contiguous, empty, indexed, is_foldable};
use crate::DType;

/// Blocks of different types at byte displacements.
///
/// Zero-length fields and bound markers carry no data and are dropped. What remains is
/// lowered to an indexed layout over bytes when every field is gapless, to a block-indexed
/// or indexed layout when only one type is involved, and otherwise to a struct node that
/// owns one child program per field.
pub(crate) fn structure(
    b: &mut ProgramBuilder,
    blocklengths: &[usize],
    displacements: &[i64],
    types: &[DType],
    shape: Shape,
) -> TesseraResult<()> {
    let fields = blocklengths
        .iter()
        .zip(displacements)
        .zip(types)
        .filter(|((len, _), ty)| **len != 0 && !ty.is_marker())
        .map(|((&len, &disp), ty)| (len, disp, ty))
        .collect::<Vec<_>>();

    if fields.is_empty() {
        return empty(b);
    }

    let mut all_foldable = true;
    for (_, _, ty) in &fields {
        all_foldable &= is_foldable(ty)?;
    }
    if all_foldable {
        // Gapless fields start at their type's origin, so each is a run of raw bytes.
        let mut lengths = Vec::with_capacity(fields.len());
        for (len, _, ty) in &fields {
            lengths.push(arith::bytes(*len, ty.size())?);
        }
        let disps = fields.iter().map(|(_, disp, _)| *disp).collect::<Vec<_>>();
        return indexed(b, &lengths, &disps, &DType::BYTE, shape);
    }

    if let [(len, disp, ty)] = fields.as_slice() {
        return blockindexed(b, *len, &[*disp], ty, shape);
    }

    if fields.iter().map(|(_, _, ty)| *ty).all_equal() {
        let (lengths, disps): (Vec<_>, Vec<_>) =
            fields.iter().map(|(len, disp, _)| (*len, *disp)).unzip();
        return indexed(b, &lengths, &disps, fields[0].2, shape);
    }

    let depth = b.depth();
    let mut children = Vec::with_capacity(fields.len());
    for (len, disp, ty) in fields {
        let mut child = ProgramBuilder::child(depth)?;
        contiguous(&mut child, len, ty)?;
        children.push(StructField {
            elem_size: ty.size(),
            blocklength: len,
            offset: disp,
            program: child.finish(),
        });
    }
    let count = children.len();
    b.push(Node::new(
        NodeKind::Struct(StructLoop { fields: children }),
        count,
        shape.size,
        shape.extent,
    ))
}

#[cfg(test)]
mod tests {
    use tessera_program::{NodeKind, NodeTag};

    use crate::DType;
    use crate::builder::test_support::{program, root, tags};

    fn padded() -> DType {
        DType::resized(&DType::I32, 0, 8).unwrap()
    }

    #[test]
    fn primitive_fields_become_bytes() {
        let t = DType::structure(&[1, 4], &[0, 8], &[DType::I32, DType::I32]).unwrap();
        let NodeKind::IndexedFinal(l) = root(&t) else {
            panic!("expected indexed_final over bytes");
        };
        assert_eq!(l.elem_size, 1);
        assert_eq!(&*l.blocklengths, &[4, 16]);
        assert_eq!(&*l.offsets, &[0, 8]);
    }

    #[test]
    fn adjacent_fields_are_contiguous() {
        let t = DType::structure(&[1, 1], &[0, 8], &[DType::F64, DType::I32]).unwrap();
        assert_eq!(tags(&t), vec![NodeTag::ContigFinal]);
        assert_eq!(program(&t).nodes()[1].count, 12);
    }

    #[test]
    fn markers_and_empty_fields_ignored() {
        let t = DType::structure(
            &[1, 0, 3, 1],
            &[-8, 4, 16, 64],
            &[DType::LB, DType::F64, padded(), DType::UB],
        )
        .unwrap();
        // One real field left, at a non-zero displacement.
        assert_eq!(
            tags(&t),
            vec![NodeTag::BlockIndexed, NodeTag::ContigChild, NodeTag::ContigFinal]
        );
    }

    #[test]
    fn only_markers_is_empty() {
        let t = DType::structure(&[1, 1], &[0, 8], &[DType::LB, DType::UB]).unwrap();
        assert_eq!(program(&t).nodes()[1].count, 0);
    }

    #[test]
    fn one_type_is_indexed() {
        let p = padded();
        let t = DType::structure(&[1, 2], &[0, 24], &[p.clone(), p]).unwrap();
        assert_eq!(root(&t).tag(), NodeTag::Indexed);
    }

    #[test]
    fn mixed_types_own_children() {
        let t = DType::structure(&[2, 1], &[0, 32], &[padded(), DType::F64]).unwrap();
        let program = program(&t);
        assert_eq!(program.len(), 3);
        let NodeKind::Struct(s) = &program.nodes()[1].kind else {
            panic!("expected struct");
        };
        assert_eq!(program.nodes()[1].count, 2);
        assert_eq!(s.fields[0].offset, 0);
        assert_eq!(s.fields[1].offset, 32);
        let first = s.fields[0].program.nodes().iter().map(|n| n.kind.tag()).collect::<Vec<_>>();
        assert_eq!(
            first,
            vec![NodeTag::Exit, NodeTag::ReturnTo, NodeTag::Contig, NodeTag::ContigFinal, NodeTag::Bottom]
        );
        let second = s.fields[1].program.nodes().iter().map(|n| n.kind.tag()).collect::<Vec<_>>();
        assert_eq!(
            second,
            vec![NodeTag::Exit, NodeTag::ReturnTo, NodeTag::ContigFinal, NodeTag::Bottom]
        );
    }

    #[test]
    fn nested_struct_relinearized() {
        let inner = DType::structure(&[1, 1], &[0, 8], &[padded(), DType::F64]).unwrap();
        let outer = DType::contiguous(3, &inner).unwrap();
        let program = program(&outer);
        assert_eq!(
            tags(&outer),
            vec![NodeTag::Contig, NodeTag::Struct]
        );
        let NodeKind::Struct(s) = &program.nodes()[2].kind else {
            panic!("expected struct");
        };
        for field in &s.fields {
            assert!(matches!(field.program.nodes()[2].kind, NodeKind::ReturnTo { target: 2 }));
        }
    }
}
