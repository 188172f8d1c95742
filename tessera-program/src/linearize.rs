use std::iter;

use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::{MAX_DEPTH, Node, NodeKind, Program};

impl Program {
    /// Move every struct child's return point to the index of its owning struct.
    ///
    /// Splicing a body that contains a struct shifts the struct to a new index while its
    /// children still return to the old one. Each child is rebuilt as `depth` exit nodes,
    /// a `ReturnTo(depth)`, and its previous tail, which works whether the struct moved
    /// deeper or shallower. Nested structs are then fixed up recursively.
    ///
    /// `depth` is the index of this program's own start sentinel: 0 for a top-level program.
    pub fn linearize(&mut self, depth: usize) -> TesseraResult<()> {
        let len = self.len();
        for idx in depth + 1..len {
            let NodeKind::Struct(ref mut s) = self.nodes_mut()[idx].kind else {
                continue;
            };
            for field in s.fields.iter_mut() {
                field.program.relocate(idx)?;
                field.program.linearize(idx)?;
            }
        }
        Ok(())
    }

    fn relocate(&mut self, depth: usize) -> TesseraResult<()> {
        let ret = self
            .nodes()
            .iter()
            .position(|n| !matches!(n.kind, NodeKind::Exit))
            .ok_or_else(|| tessera_err!(InvalidProgram: "struct child has no return point"))?;
        let NodeKind::ReturnTo { target } = self.nodes()[ret].kind else {
            tessera_bail!(
                InvalidProgram: "struct child starts with {} instead of return_to",
                self.nodes()[ret].kind.tag()
            );
        };
        if ret == depth && target == depth {
            return Ok(());
        }

        let tail_len = self.len() - (ret + 1);
        if depth + 1 + tail_len > MAX_DEPTH {
            tessera_bail!(
                "struct child of {} nodes relocated to {} exceeds the maximum of {} levels",
                tail_len,
                depth,
                MAX_DEPTH
            );
        }
        let nodes = self.nodes_mut();
        let tail = nodes.split_off(ret + 1);
        nodes.clear();
        nodes.extend(
            iter::repeat_n(Node::exit(), depth)
                .chain(iter::once(Node::return_to(depth)))
                .chain(tail),
        );
        Ok(())
    }
}
