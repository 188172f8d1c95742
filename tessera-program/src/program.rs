use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::{ContigLoop, MAX_DEPTH, Node, NodeKind, arith};

/// A compiled layout program.
///
/// The node at index `i` is processed at stack depth `i`. A top-level program starts with
/// [`NodeKind::Exit`]; the child program of a struct field at index `d` starts with `d`
/// padding `Exit` nodes followed by a [`NodeKind::ReturnTo`] at index `d`. Every program
/// ends with a single [`NodeKind::Bottom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    nodes: Vec<Node>,
}

impl Program {
    /// Wrap and validate a top-level node array.
    pub fn try_new(nodes: Vec<Node>) -> TesseraResult<Self> {
        let program = Self { nodes };
        program.validate(0)?;
        Ok(program)
    }

    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<Node> {
        &mut self.nodes
    }

    /// The program `[Exit, ContigFinal(count), Bottom]` over `count` elements of
    /// `elem_size` bytes each.
    ///
    /// This is the program a segment runs for a primitive type, which has none of its own.
    pub fn primitive(count: usize, elem_size: usize) -> TesseraResult<Self> {
        let size = arith::bytes(count, elem_size)?;
        let extent = arith::offset(size)?;
        let base_extent = arith::offset(elem_size)?;
        Ok(Self {
            nodes: vec![
                Node::exit(),
                Node::new(
                    NodeKind::ContigFinal(ContigLoop {
                        base_size: elem_size,
                        base_extent,
                    }),
                    count,
                    size,
                    extent,
                ),
                Node::bottom(),
            ],
        })
    }

    /// All nodes, including both sentinels.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The node at `idx`.
    pub fn node(&self, idx: usize) -> TesseraResult<&Node> {
        self.nodes.get(idx).ok_or_else(|| {
            tessera_err!(
                InvalidProgram: "node index {} past end of program of {} nodes",
                idx,
                self.nodes.len()
            )
        })
    }

    /// The number of nodes including both sentinels.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Programs are never empty once built, but the check mirrors `len`.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the terminating `Bottom`, which is also the deepest stack level used.
    pub fn depth(&self) -> usize {
        self.nodes
            .iter()
            .position(|n| matches!(n.kind, NodeKind::Bottom))
            .unwrap_or(self.nodes.len())
    }

    /// The nodes strictly between the start sentinel and `Bottom`.
    ///
    /// For a top-level program this is what gets spliced into an enclosing program.
    pub fn body(&self) -> &[Node] {
        let end = self.depth();
        self.nodes.get(1..end).unwrap_or_default()
    }

    /// Whether the program is a single `ContigFinal` leaf.
    pub fn is_contiguous(&self) -> bool {
        matches!(
            self.nodes.as_slice(),
            [_, Node { kind: NodeKind::ContigFinal(_), .. }, Node { kind: NodeKind::Bottom, .. }]
        )
    }

    /// The root node of the body, at index 1.
    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(1)
    }

    /// Check the structural invariants of a program whose start sentinel sits at `depth`.
    ///
    /// `depth` is 0 for a top-level program and the owning struct's index for a child.
    pub fn validate(&self, depth: usize) -> TesseraResult<()> {
        let nodes = &self.nodes;
        if nodes.len() > MAX_DEPTH {
            tessera_bail!(
                InvalidProgram: "program of {} nodes exceeds maximum depth {}",
                nodes.len(),
                MAX_DEPTH
            );
        }
        if nodes.len() < depth + 3 {
            tessera_bail!(
                InvalidProgram: "program of {} nodes has no body past depth {}",
                nodes.len(),
                depth
            );
        }

        for (idx, node) in nodes.iter().enumerate().take(depth) {
            if !matches!(node.kind, NodeKind::Exit) {
                tessera_bail!(InvalidProgram: "expected exit padding at {}, found {}", idx, node.kind.tag());
            }
        }
        match nodes[depth].kind {
            NodeKind::Exit if depth == 0 => {}
            NodeKind::ReturnTo { target } if depth > 0 && target == depth => {}
            ref other => tessera_bail!(
                InvalidProgram: "unexpected {} at program start {}",
                other.tag(),
                depth
            ),
        }

        let bottom = nodes.len() - 1;
        if !matches!(nodes[bottom].kind, NodeKind::Bottom) {
            tessera_bail!(InvalidProgram: "program does not end with bottom");
        }

        for idx in depth + 1..bottom {
            let node = &nodes[idx];
            let next = &nodes[idx + 1].kind;
            match &node.kind {
                NodeKind::Bottom | NodeKind::Exit | NodeKind::ReturnTo { .. } => {
                    tessera_bail!(InvalidProgram: "sentinel {} inside program body at {}", node.kind.tag(), idx)
                }
                NodeKind::ContigFinal(_) if idx + 1 != bottom => {
                    tessera_bail!(InvalidProgram: "contig_final at {} is not the last node", idx)
                }
                NodeKind::Struct(s) => {
                    if idx + 1 != bottom {
                        tessera_bail!(InvalidProgram: "struct at {} is not the last node", idx);
                    }
                    if s.fields.len() != node.count || s.fields.is_empty() {
                        tessera_bail!(
                            InvalidProgram: "struct at {} has {} fields but count {}",
                            idx,
                            s.fields.len(),
                            node.count
                        );
                    }
                    for field in &s.fields {
                        field.program.validate(idx)?;
                    }
                }
                NodeKind::ContigChild { .. } if !nodes[idx - 1].kind.needs_child() => {
                    tessera_bail!(InvalidProgram: "contig_child at {} has no blocked parent", idx)
                }
                NodeKind::BlockIndexed(l) | NodeKind::BlockIndexed1(l) | NodeKind::BlockIndexedFinal(l)
                    if l.offsets.len() != node.count =>
                {
                    tessera_bail!(
                        InvalidProgram: "blockindexed at {} has {} offsets but count {}",
                        idx,
                        l.offsets.len(),
                        node.count
                    )
                }
                NodeKind::Indexed(l) | NodeKind::IndexedFinal(l)
                    if l.offsets.len() != node.count || l.blocklengths.len() != node.count =>
                {
                    tessera_bail!(
                        InvalidProgram: "indexed at {} has {} offsets and {} lengths but count {}",
                        idx,
                        l.offsets.len(),
                        l.blocklengths.len(),
                        node.count
                    )
                }
                _ => {}
            }

            let looping = !matches!(
                node.kind,
                NodeKind::ContigFinal(_) | NodeKind::ContigChild { .. } | NodeKind::Struct(_)
            );
            if looping && node.count == 0 {
                tessera_bail!(InvalidProgram: "{} at {} has zero count", node.kind.tag(), idx);
            }
            if node.kind.is_final_loop() && !matches!(next, NodeKind::ContigFinal(_)) {
                tessera_bail!(
                    InvalidProgram: "{} at {} is followed by {} instead of contig_final",
                    node.kind.tag(),
                    idx,
                    next.tag()
                );
            }
            if node.kind.needs_child() && !matches!(next, NodeKind::ContigChild { .. }) {
                tessera_bail!(
                    InvalidProgram: "{} at {} is followed by {} instead of contig_child",
                    node.kind.tag(),
                    idx,
                    next.tag()
                );
            }
        }

        if !matches!(
            nodes[bottom - 1].kind,
            NodeKind::ContigFinal(_) | NodeKind::Struct(_)
        ) {
            tessera_bail!(InvalidProgram: "program body does not end in a leaf");
        }
        Ok(())
    }
}
