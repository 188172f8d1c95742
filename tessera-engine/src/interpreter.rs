//! The resumable layout-program interpreter.
//!
//! A traversal is a loop over [`Step`]s. Pushing a node starts its first repetition and
//! descends; popping a node finishes one repetition and either starts the next or ascends.
//! Bytes only move at the leaves: `ContigFinal` moves one contiguous run and the Final loop
//! kinds move whole blocks until the budget runs out. When the budget is exhausted the
//! traversal parks in a `ContigFinal` with the cursor holding everything needed to resume.
//!
//! Frame `i` belongs to the node at index `i`. Struct children continue the parent's
//! indexing, so the active program at any depth is recovered from the struct frames alone.

use log::trace;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};
use tessera_program::{ContigLoop, Node, NodeKind, Program, StructField, arith};

use crate::copy::Kernel;
use crate::cursor::{Cursor, Frame};
use crate::mover::Mover;

/// Result of driving a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The budget ran out; the cursor is parked and the next call resumes it.
    Partial,
    /// Every byte was moved.
    Complete,
}

enum Step {
    Push(usize, i64),
    Pop(usize),
    Suspend,
    Complete,
}

/// Run one element of `program` starting at `base`, or resume the element `cursor` is
/// parked in.
pub(crate) fn run<M: Mover>(
    program: &Program,
    cursor: &mut Cursor,
    base: i64,
    mover: &mut M,
    memcpy_threshold: usize,
) -> TesseraResult<Outcome> {
    let mut interpreter = Interpreter {
        current: program,
        parents: Vec::new(),
        cursor,
        mover,
        memcpy_threshold,
        resuming: false,
    };
    interpreter.execute(base)
}

struct Interpreter<'p, 'c, M> {
    current: &'p Program,
    parents: Vec<&'p Program>,
    cursor: &'c mut Cursor,
    mover: &'c mut M,
    memcpy_threshold: usize,
    /// Set until the parked `ContigFinal` has been re-entered.
    resuming: bool,
}

impl<'p, M: Mover> Interpreter<'p, '_, M> {
    fn execute(&mut self, base: i64) -> TesseraResult<Outcome> {
        let mut step = if self.cursor.is_resumed() {
            self.restore()?;
            let sp = self.cursor.sp;
            Step::Push(sp, self.cursor.frames[sp].base)
        } else {
            Step::Push(1, base)
        };
        loop {
            step = match step {
                Step::Push(idx, addr) => self.push(idx, addr)?,
                Step::Pop(idx) => self.pop(idx)?,
                Step::Suspend => {
                    trace!(
                        "suspend at {} with {} bytes of a split element owed",
                        self.cursor.sp,
                        self.cursor.partial
                    );
                    return Ok(Outcome::Partial);
                }
                Step::Complete => return Ok(Outcome::Complete),
            };
        }
    }

    /// Rebuild the active program chain of a parked cursor.
    fn restore(&mut self) -> TesseraResult<()> {
        let sp = self.cursor.sp;
        for idx in 1..sp {
            let current = self.current;
            let node = current.node(idx)?;
            if let NodeKind::Struct(s) = &node.kind {
                let done = node.count.checked_sub(self.cursor.frames[idx].count_left);
                let field = done
                    .and_then(|k| s.fields.get(k))
                    .ok_or_else(|| tessera_err!(InvalidProgram: "cursor frame {} selects no struct field", idx))?;
                self.descend(field);
            }
        }
        if !matches!(self.current.node(sp)?.kind, NodeKind::ContigFinal(_)) {
            tessera_bail!(InvalidProgram: "cursor parked at {}, which is not a contig_final", sp);
        }
        self.resuming = true;
        Ok(())
    }

    fn descend(&mut self, field: &'p StructField) {
        self.parents.push(self.current);
        self.current = &field.program;
    }

    fn enter(&mut self, idx: usize, base: i64, count: usize) {
        self.cursor.frames[idx] = Frame {
            base,
            count_left: count,
        };
    }

    /// Finish one repetition of the node at `idx`. Returns the index of the next repetition,
    /// or `None` when the node is done.
    fn advance(&mut self, idx: usize, count: usize) -> TesseraResult<Option<usize>> {
        let frame = &mut self.cursor.frames[idx];
        frame.count_left = frame.count_left.saturating_sub(1);
        if frame.count_left == 0 {
            return Ok(None);
        }
        completed(count, frame.count_left).map(Some)
    }

    fn push(&mut self, idx: usize, addr: i64) -> TesseraResult<Step> {
        let current = self.current;
        let node = current.node(idx)?;
        trace!(
            "push {} at {} addr {} budget {}",
            node.kind.tag(),
            idx,
            addr,
            self.mover.bytes_left()
        );
        Ok(match &node.kind {
            NodeKind::Contig(_) | NodeKind::Vector1(_) => {
                self.enter(idx, addr, node.count);
                Step::Push(idx + 1, addr)
            }
            NodeKind::Vector(l) => {
                self.enter(idx, addr, node.count);
                self.enter(idx + 1, addr, l.blocklength);
                Step::Push(idx + 1, addr)
            }
            NodeKind::BlockIndexed(l) | NodeKind::BlockIndexed1(l) => {
                self.enter(idx, addr, node.count);
                let start = arith::add(addr, offset_at(&l.offsets, 0)?)?;
                if matches!(node.kind, NodeKind::BlockIndexed(_)) {
                    self.enter(idx + 1, start, l.blocklength);
                }
                Step::Push(idx + 1, start)
            }
            NodeKind::Indexed(l) => {
                self.enter(idx, addr, node.count);
                let start = arith::add(addr, offset_at(&l.offsets, 0)?)?;
                self.enter(idx + 1, start, length_at(&l.blocklengths, 0)?);
                Step::Push(idx + 1, start)
            }
            NodeKind::Struct(s) => {
                self.enter(idx, addr, node.count);
                let field = field_at(&s.fields, 0)?;
                let start = arith::add(addr, field.offset)?;
                self.descend(field);
                Step::Push(idx + 1, start)
            }
            NodeKind::ContigChild { .. } => Step::Push(idx + 1, self.cursor.frames[idx].base),
            NodeKind::VectorFinal(_) | NodeKind::BlockIndexedFinal(_) | NodeKind::IndexedFinal(_) => {
                self.enter(idx, addr, node.count);
                self.bulk(idx, node)?
            }
            NodeKind::ContigFinal(l) => self.contig_final(idx, addr, node, l)?,
            NodeKind::Exit | NodeKind::Bottom | NodeKind::ReturnTo { .. } => {
                tessera_bail!(InvalidProgram: "pushed into {} at {}", node.kind.tag(), idx)
            }
        })
    }

    fn pop(&mut self, idx: usize) -> TesseraResult<Step> {
        let current = self.current;
        let node = current.node(idx)?;
        trace!("pop {} at {}", node.kind.tag(), idx);
        let base = self.cursor.frames[idx].base;
        Ok(match &node.kind {
            NodeKind::Exit => {
                self.cursor.reset();
                Step::Complete
            }
            NodeKind::ReturnTo { target } => {
                self.current = self
                    .parents
                    .pop()
                    .ok_or_else(|| tessera_err!(InvalidProgram: "return_to at {} outside a struct", idx))?;
                Step::Pop(*target)
            }
            NodeKind::Contig(l) => match self.advance(idx, node.count)? {
                Some(k) => Step::Push(idx + 1, arith::add(base, arith::scale(k, l.base_extent)?)?),
                None => Step::Pop(idx - 1),
            },
            NodeKind::Vector(l) | NodeKind::Vector1(l) => match self.advance(idx, node.count)? {
                Some(k) => {
                    let start = arith::add(base, arith::scale(k, l.stride)?)?;
                    if matches!(node.kind, NodeKind::Vector(_)) {
                        self.enter(idx + 1, start, l.blocklength);
                    }
                    Step::Push(idx + 1, start)
                }
                None => Step::Pop(idx - 1),
            },
            NodeKind::BlockIndexed(l) | NodeKind::BlockIndexed1(l) => {
                match self.advance(idx, node.count)? {
                    Some(k) => {
                        let start = arith::add(base, offset_at(&l.offsets, k)?)?;
                        if matches!(node.kind, NodeKind::BlockIndexed(_)) {
                            self.enter(idx + 1, start, l.blocklength);
                        }
                        Step::Push(idx + 1, start)
                    }
                    None => Step::Pop(idx - 1),
                }
            }
            NodeKind::Indexed(l) => match self.advance(idx, node.count)? {
                Some(k) => {
                    let start = arith::add(base, offset_at(&l.offsets, k)?)?;
                    self.enter(idx + 1, start, length_at(&l.blocklengths, k)?);
                    Step::Push(idx + 1, start)
                }
                None => Step::Pop(idx - 1),
            },
            NodeKind::Struct(s) => match self.advance(idx, node.count)? {
                Some(k) => {
                    let field = field_at(&s.fields, k)?;
                    let start = arith::add(base, field.offset)?;
                    self.descend(field);
                    Step::Push(idx + 1, start)
                }
                None => Step::Pop(idx - 1),
            },
            NodeKind::ContigChild { elem_extent } => {
                // The parent seeds the element count, which can differ from the node's own.
                let frame = &mut self.cursor.frames[idx];
                frame.count_left = frame.count_left.saturating_sub(1);
                if frame.count_left == 0 {
                    Step::Pop(idx - 1)
                } else {
                    frame.base = arith::add(base, *elem_extent)?;
                    Step::Push(idx + 1, frame.base)
                }
            }
            NodeKind::VectorFinal(_) | NodeKind::BlockIndexedFinal(_) | NodeKind::IndexedFinal(_) => {
                // The block handed to the ContigFinal below is done.
                match self.advance(idx, node.count)? {
                    Some(_) => self.bulk(idx, node)?,
                    None => Step::Pop(idx - 1),
                }
            }
            NodeKind::Bottom | NodeKind::ContigFinal(_) => {
                tessera_bail!(InvalidProgram: "popped into {} at {}", node.kind.tag(), idx)
            }
        })
    }

    /// Move as many whole blocks of a Final loop as the budget allows. The first block that
    /// does not fit is handed to the `ContigFinal` that follows, which moves what it can and
    /// parks.
    fn bulk(&mut self, idx: usize, node: &Node) -> TesseraResult<Step> {
        let Frame { base, count_left } = self.cursor.frames[idx];
        let mut k = completed(node.count, count_left)?;
        while k < node.count {
            let block = Block::of(node, k)?;
            let len = arith::bytes(block.elements, block.elem_size)?;
            if len > self.mover.bytes_left() || self.mover.slots_left() == 0 {
                break;
            }
            let kernel = Kernel::for_block(len, block.elem_size, node.flags, self.memcpy_threshold);
            self.mover
                .move_run(arith::add(base, block.offset)?, len, kernel)?;
            k += 1;
        }

        self.cursor.frames[idx].count_left = node.count - k;
        if k == node.count {
            return Ok(Step::Pop(idx - 1));
        }
        let block = Block::of(node, k)?;
        let start = arith::add(base, block.offset)?;
        self.enter(idx + 1, start, block.elements);
        Ok(Step::Push(idx + 1, start))
    }

    fn contig_final(&mut self, idx: usize, addr: i64, node: &Node, l: &ContigLoop) -> TesseraResult<Step> {
        if self.resuming {
            self.resuming = false;
        } else {
            self.cursor.partial = 0;
            let seeded = idx
                .checked_sub(1)
                .map(|parent| self.current.node(parent))
                .transpose()?
                .is_some_and(|parent| parent.kind.is_final_loop());
            if !seeded {
                self.enter(idx, addr, node.count);
            }
        }

        let Frame { base, count_left } = self.cursor.frames[idx];
        let owed = arith::bytes(count_left, l.base_size)? + self.cursor.partial;
        if owed == 0 {
            return Ok(Step::Pop(idx - 1));
        }
        let budget = self.mover.bytes_left();
        if budget == 0 || self.mover.slots_left() == 0 {
            self.cursor.sp = idx;
            return Ok(Step::Suspend);
        }

        let len = owed.min(budget);
        let kernel = Kernel::for_run(len, l.base_size, self.memcpy_threshold);
        self.mover.move_run(base, len, kernel)?;
        if len == owed {
            return Ok(Step::Pop(idx - 1));
        }

        // Park with the unmoved tail of the run.
        let rest = owed - len;
        self.cursor.frames[idx] = Frame {
            base: arith::add(base, arith::offset(len)?)?,
            count_left: rest / l.base_size,
        };
        self.cursor.partial = rest % l.base_size;
        self.cursor.sp = idx;
        Ok(Step::Suspend)
    }
}

/// One block of a Final loop.
struct Block {
    offset: i64,
    elements: usize,
    elem_size: usize,
}

impl Block {
    fn of(node: &Node, k: usize) -> TesseraResult<Self> {
        Ok(match &node.kind {
            NodeKind::VectorFinal(l) => Self {
                offset: arith::scale(k, l.stride)?,
                elements: l.blocklength,
                elem_size: l.elem_size,
            },
            NodeKind::BlockIndexedFinal(l) => Self {
                offset: offset_at(&l.offsets, k)?,
                elements: l.blocklength,
                elem_size: l.elem_size,
            },
            NodeKind::IndexedFinal(l) => Self {
                offset: offset_at(&l.offsets, k)?,
                elements: length_at(&l.blocklengths, k)?,
                elem_size: l.elem_size,
            },
            other => tessera_bail!(InvalidProgram: "{} has no blocks", other.tag()),
        })
    }
}

/// Repetitions finished out of `count` when `count_left` remain.
fn completed(count: usize, count_left: usize) -> TesseraResult<usize> {
    count
        .checked_sub(count_left)
        .ok_or_else(|| tessera_err!(InvalidProgram: "{} repetitions left of {}", count_left, count))
}

fn offset_at(offsets: &[i64], k: usize) -> TesseraResult<i64> {
    offsets
        .get(k)
        .copied()
        .ok_or_else(|| tessera_err!(InvalidProgram: "no offset for block {}", k))
}

fn length_at(lengths: &[usize], k: usize) -> TesseraResult<usize> {
    lengths
        .get(k)
        .copied()
        .ok_or_else(|| tessera_err!(InvalidProgram: "no length for block {}", k))
}

fn field_at(fields: &[StructField], k: usize) -> TesseraResult<&StructField> {
    fields
        .get(k)
        .ok_or_else(|| tessera_err!(InvalidProgram: "no struct field {}", k))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;
    use tessera_program::{Node, NodeFlags, NodeKind, Program, VectorLoop};

    use super::*;
    use crate::mover::{PackMover, SpanMover};
    use crate::Span;

    fn pack_all(program: &Program, buffer: &[u8], budget: usize) -> Vec<u8> {
        let mut cursor = Cursor::new();
        let mut out = Vec::new();
        loop {
            let mut chunk = vec![0u8; budget];
            let mut mover = PackMover::new(buffer, 0, &mut chunk);
            let outcome = run(program, &mut cursor, 0, &mut mover, 1024).unwrap();
            let moved = mover.moved();
            out.extend_from_slice(&chunk[..moved]);
            if outcome == Outcome::Complete {
                return out;
            }
        }
    }

    fn vector_program() -> Program {
        // Three blocks of two i32, 16 bytes apart.
        let l = VectorLoop {
            blocklength: 2,
            elem_size: 4,
            stride: 16,
        };
        Program::try_new(vec![
            Node::exit(),
            Node::new(NodeKind::VectorFinal(l), 3, 24, 40).with_flags(NodeFlags::SHORT),
            Node::new(
                NodeKind::ContigFinal(ContigLoop {
                    base_size: 4,
                    base_extent: 4,
                }),
                2,
                8,
                8,
            ),
            Node::bottom(),
        ])
        .unwrap()
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(8)]
    #[case(100)]
    fn vector_chunked(#[case] budget: usize) {
        let buffer = (0u8..48).collect::<Vec<_>>();
        let expected = [0..8, 16..24, 32..40]
            .into_iter()
            .flatten()
            .collect::<Vec<u8>>();
        assert_eq!(pack_all(&vector_program(), &buffer, budget), expected);
    }

    #[test]
    fn primitive_parks_mid_element() {
        let program = Program::primitive(3, 4).unwrap();
        let buffer = (0u8..12).collect::<Vec<_>>();
        let mut cursor = Cursor::new();
        let mut chunk = [0u8; 5];
        let mut mover = PackMover::new(&buffer, 0, &mut chunk);
        assert_eq!(run(&program, &mut cursor, 0, &mut mover, 1024).unwrap(), Outcome::Partial);
        assert_eq!(cursor.stack_pointer(), Some(1));
        assert_eq!(cursor.frames[1].count_left, 1);
        assert_eq!(cursor.partial(), 3);
    }

    #[test]
    fn span_ceiling_parks_before_the_next_block() {
        let program = vector_program();
        let mut cursor = Cursor::new();
        let mut spans = Vec::new();
        let mut mover = SpanMover::new(48, 0, &mut spans, usize::MAX, 2, false);
        assert_eq!(run(&program, &mut cursor, 0, &mut mover, 1024).unwrap(), Outcome::Partial);
        assert_eq!(spans, vec![Span::new(0, 8), Span::new(16, 8)]);

        let mut mover = SpanMover::new(48, 0, &mut spans, usize::MAX, 2, false);
        assert_eq!(run(&program, &mut cursor, 0, &mut mover, 1024).unwrap(), Outcome::Complete);
        assert_eq!(spans[2], Span::new(32, 8));
        assert!(!cursor.is_resumed());
    }

    #[test]
    fn corrupt_cursor_is_invalid() {
        let program = vector_program();
        let mut cursor = Cursor::new();
        cursor.sp = 1;
        let mut chunk = [0u8; 4];
        let buffer = [0u8; 48];
        let mut mover = PackMover::new(&buffer, 0, &mut chunk);
        assert!(run(&program, &mut cursor, 0, &mut mover, 1024).is_err());
    }

    #[test]
    fn shared_program_independent_cursors() {
        let program = Arc::new(vector_program());
        let buffer = (0u8..48).collect::<Vec<_>>();
        let (mut a, mut b) = (Cursor::new(), Cursor::new());
        let mut out_a = [0u8; 3];
        let mut out_b = [0u8; 10];
        run(&program, &mut a, 0, &mut PackMover::new(&buffer, 0, &mut out_a), 1024).unwrap();
        run(&program, &mut b, 0, &mut PackMover::new(&buffer, 0, &mut out_b), 1024).unwrap();
        assert_eq!(out_a, [0, 1, 2]);
        assert_eq!(out_b, [0, 1, 2, 3, 4, 5, 6, 7, 16, 17]);
        assert_ne!(a.frames[2], b.frames[2]);
    }
}
