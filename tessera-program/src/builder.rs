use std::iter;

use tessera_error::{TesseraResult, tessera_bail};

use crate::{MAX_DEPTH, Node, Program};

/// Accumulates the nodes of a program under construction.
///
/// The builder's depth is the index the next pushed node will occupy.
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    nodes: Vec<Node>,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramBuilder {
    /// Start a top-level program.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::exit()],
        }
    }

    /// Start the child program of a struct field for a struct sitting at `depth`.
    pub fn child(depth: usize) -> TesseraResult<Self> {
        if depth + 2 >= MAX_DEPTH {
            tessera_bail!(
                "struct at depth {} leaves no room for its fields within {} levels",
                depth,
                MAX_DEPTH
            );
        }
        let nodes = iter::repeat_n(Node::exit(), depth)
            .chain(iter::once(Node::return_to(depth)))
            .collect();
        Ok(Self { nodes })
    }

    /// Index of the next node.
    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    /// Append one node.
    pub fn push(&mut self, node: Node) -> TesseraResult<()> {
        // One slot stays reserved for the terminating bottom.
        if self.nodes.len() + 2 > MAX_DEPTH {
            tessera_bail!(
                "layout nests deeper than the maximum of {} levels",
                MAX_DEPTH
            );
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Append the body of a finished top-level program one level below the last node.
    pub fn splice(&mut self, program: &Program) -> TesseraResult<()> {
        let body = program.body();
        if self.nodes.len() + body.len() + 1 > MAX_DEPTH {
            tessera_bail!(
                "splicing {} nodes at depth {} exceeds the maximum of {} levels",
                body.len(),
                self.nodes.len(),
                MAX_DEPTH
            );
        }
        self.nodes.extend_from_slice(body);
        Ok(())
    }

    /// Terminate the program with `Bottom`.
    ///
    /// Return points of spliced structs are not yet at their final indices; run
    /// [`Program::linearize`] before executing the result.
    pub fn finish(mut self) -> Program {
        self.nodes.push(Node::bottom());
        Program::from_nodes(self.nodes)
    }
}
