//! Compilation of a [`DType`] into its layout program.
//!
//! Each constructor shape has one emitter. Emitters append to a [`ProgramBuilder`] and
//! rewrite their shape into a cheaper one whenever the layout allows: a vector with one
//! block is a contiguous run, evenly spaced blocks are a vector, adjacent indexed blocks
//! merge, and so on. Anything whose element type is itself one gapless run becomes a final
//! node that the engine copies block by block without descending further.

mod blockindexed;
mod contiguous;
mod indexed;
mod struct_;
mod vector;

use tessera_error::TesseraResult;
use tessera_program::{ContigLoop, Node, NodeKind, Program, ProgramBuilder, arith};

pub(crate) use self::blockindexed::blockindexed;
pub(crate) use self::contiguous::contiguous;
pub(crate) use self::indexed::indexed;
pub(crate) use self::struct_::structure;
pub(crate) use self::vector::vector;
use crate::DType;
use crate::dtype::Layout;

/// Size and extent of the type being compiled, recorded on its outermost loop node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Shape {
    pub size: usize,
    pub extent: i64,
}

impl Shape {
    pub fn of(dtype: &DType) -> Self {
        Self {
            size: dtype.size(),
            extent: dtype.extent(),
        }
    }
}

/// Build, linearize and validate the program for a derived type.
pub(crate) fn commit(dtype: &DType) -> TesseraResult<Program> {
    let mut builder = ProgramBuilder::new();
    emit(&mut builder, dtype)?;
    let mut program = builder.finish();
    program.linearize(0)?;
    program.validate(0)?;
    log::debug!(
        "committed {} into {} nodes, {} serialized bytes",
        dtype,
        program.len(),
        program.serialized_size(false)
    );
    Ok(program)
}

fn emit(b: &mut ProgramBuilder, dtype: &DType) -> TesseraResult<()> {
    let shape = Shape::of(dtype);
    match dtype.layout() {
        None => contiguous(b, 1, dtype),
        Some(Layout::Contiguous { count, old }) => contiguous(b, *count, old),
        Some(Layout::Vector {
            count,
            blocklength,
            stride,
            old,
        }) => vector(b, *count, *blocklength, *stride, old, shape),
        Some(Layout::BlockIndexed {
            blocklength,
            displacements,
            old,
        }) => blockindexed(b, *blocklength, displacements, old, shape),
        Some(Layout::Indexed {
            blocklengths,
            displacements,
            old,
        }) => indexed(b, blocklengths, displacements, old, shape),
        Some(Layout::Struct {
            blocklengths,
            displacements,
            types,
        }) => structure(b, blocklengths, displacements, types, shape),
        Some(Layout::Alias(old)) => contiguous(b, 1, old),
    }
}

/// Whether `old` can be copied as raw bytes: a primitive, or a derived type whose program
/// is a single contiguous leaf with no gap between elements.
pub(crate) fn is_foldable(old: &DType) -> TesseraResult<bool> {
    old.is_contiguous()
}

/// A leaf run of `count` elements of `old`.
pub(crate) fn contig_final(count: usize, old: &DType) -> TesseraResult<Node> {
    let size = old.size();
    let extent = old.extent();
    Ok(Node::new(
        NodeKind::ContigFinal(ContigLoop {
            base_size: size,
            base_extent: extent,
        }),
        count,
        arith::bytes(count, size)?,
        arith::scale(count, extent)?,
    ))
}

/// The empty layout every zero count degrades to.
pub(crate) fn empty(b: &mut ProgramBuilder) -> TesseraResult<()> {
    b.push(contig_final(0, &DType::I32)?)
}

/// Splice the body of a derived element type, which must have a program.
pub(crate) fn splice(b: &mut ProgramBuilder, old: &DType) -> TesseraResult<()> {
    match old.program()? {
        Some(program) => b.splice(program),
        None => b.push(contig_final(1, old)?),
    }
}
