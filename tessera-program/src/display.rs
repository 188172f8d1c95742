use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::{Node, NodeKind, Program};

impl Display for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())?;
        match self {
            Self::Contig(l) | Self::ContigFinal(l) => {
                write!(f, "(base_size={}, base_extent={})", l.base_size, l.base_extent)
            }
            Self::Vector(l) | Self::Vector1(l) | Self::VectorFinal(l) => write!(
                f,
                "(blocklength={}, elem_size={}, stride={})",
                l.blocklength, l.elem_size, l.stride
            ),
            Self::BlockIndexed(l) | Self::BlockIndexed1(l) | Self::BlockIndexedFinal(l) => write!(
                f,
                "(blocklength={}, elem_size={}, offsets=[{}])",
                l.blocklength,
                l.elem_size,
                l.offsets.iter().join(", ")
            ),
            Self::Indexed(l) | Self::IndexedFinal(l) => write!(
                f,
                "(elem_size={}, blocks=[{}])",
                l.elem_size,
                l.blocklengths
                    .iter()
                    .zip(l.offsets.iter())
                    .map(|(len, off)| format!("{len}@{off}"))
                    .join(", ")
            ),
            Self::Struct(s) => write!(f, "({} fields)", s.fields.len()),
            Self::ContigChild { elem_extent } => write!(f, "(elem_extent={elem_extent})"),
            Self::ReturnTo { target } => write!(f, "({target})"),
            Self::Bottom | Self::Exit => Ok(()),
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} count={} size={} extent={} flags={}",
            self.kind, self.count, self.size, self.extent, self.flags
        )
    }
}

impl Program {
    fn fmt_indented(&self, f: &mut Formatter<'_>, indent: usize) -> std::fmt::Result {
        for (idx, node) in self.nodes().iter().enumerate() {
            // Padding below a child's return point is never visited.
            if indent > 0 && matches!(node.kind, NodeKind::Exit) {
                continue;
            }
            writeln!(f, "{:indent$}{idx:>2}: {node}", "")?;
            if let NodeKind::Struct(s) = &node.kind {
                for (k, field) in s.fields.iter().enumerate() {
                    writeln!(
                        f,
                        "{:w$}field {k} offset={} blocklength={} elem_size={}",
                        "",
                        field.offset,
                        field.blocklength,
                        field.elem_size,
                        w = indent + 4
                    )?;
                    field.program.fmt_indented(f, indent + 8)?;
                }
            }
        }
        Ok(())
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.fmt_indented(f, 0)
    }
}
