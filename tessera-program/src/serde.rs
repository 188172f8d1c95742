//! Relocatable byte encoding of a [`Program`].
//!
//! A program is written as a code section of fixed-size little-endian node records,
//! terminated by the `Bottom` record, followed by the arrays its nodes own. A struct's
//! field table is followed by each field's child program, depth first. Every reference to
//! an owned array or child program is stored as the distance from the referencing word to
//! its target, so a blob can be copied anywhere and decoded in place.
//!
//! Record layout, 56 bytes:
//!
//! | bytes  | field                      |
//! |--------|----------------------------|
//! | 0..4   | tag (`u32`)                |
//! | 4..8   | flags (`u32`)              |
//! | 8..16  | count (`u64`)              |
//! | 16..24 | size (`u64`)               |
//! | 24..32 | extent (`i64`)             |
//! | 32..56 | three payload words (`i64`) |

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tessera_error::{TesseraResult, tessera_bail, tessera_err};

use crate::{
    BlockIndexedLoop, ContigLoop, IndexedLoop, MAX_DEPTH, Node, NodeFlags, NodeKind, NodeTag,
    Program, StructField, StructLoop, VectorLoop, arith,
};

/// Bytes per serialized node.
pub const RECORD_SIZE: usize = 56;
const FIELD_SIZE: usize = 32;
const WORD: usize = 8;
const PAYLOAD: usize = 32;

static_assertions::const_assert_eq!(RECORD_SIZE, PAYLOAD + 3 * WORD);

impl Program {
    /// The number of bytes [`Program::serialize`] produces.
    ///
    /// Every node record is counted, including `Bottom` and the records of all child
    /// programs. Owned arrays and struct field tables are added unless `only_primitives`
    /// is set.
    pub fn serialized_size(&self, only_primitives: bool) -> usize {
        self.nodes()
            .iter()
            .map(|node| {
                let arrays = match &node.kind {
                    NodeKind::BlockIndexed(l)
                    | NodeKind::BlockIndexed1(l)
                    | NodeKind::BlockIndexedFinal(l) => l.offsets.len() * WORD,
                    NodeKind::Indexed(l) | NodeKind::IndexedFinal(l) => {
                        (l.offsets.len() + l.blocklengths.len()) * WORD
                    }
                    NodeKind::Struct(s) => s.fields.len() * FIELD_SIZE,
                    _ => 0,
                };
                let children = match &node.kind {
                    NodeKind::Struct(s) => s
                        .fields
                        .iter()
                        .map(|f| f.program.serialized_size(only_primitives))
                        .sum(),
                    _ => 0,
                };
                RECORD_SIZE + children + if only_primitives { 0 } else { arrays }
            })
            .sum()
    }

    /// Encode the program into a single relocatable blob.
    pub fn serialize(&self) -> TesseraResult<Bytes> {
        let mut buf = BytesMut::with_capacity(self.serialized_size(false));
        write_program(&mut buf, self)?;
        log::debug!(
            "serialized program of {} nodes into {} bytes",
            self.len(),
            buf.len()
        );
        Ok(buf.freeze())
    }

    /// Decode a blob produced by [`Program::serialize`].
    ///
    /// The blob is bounds checked throughout and the rebuilt program is relinearized and
    /// validated, so a malformed blob yields an error rather than a program that could
    /// misbehave when executed.
    pub fn deserialize(blob: &[u8]) -> TesseraResult<Self> {
        let mut program = Decoder::new(blob).read_program(0, 0)?;
        program.linearize(0)?;
        program.validate(0)?;
        log::debug!(
            "deserialized program of {} nodes from {} bytes",
            program.len(),
            blob.len()
        );
        Ok(program)
    }
}

fn word(v: usize) -> TesseraResult<i64> {
    arith::offset(v)
}

fn payload(kind: &NodeKind) -> TesseraResult<[i64; 3]> {
    Ok(match kind {
        NodeKind::Contig(l) | NodeKind::ContigFinal(l) => [word(l.base_size)?, l.base_extent, 0],
        NodeKind::Vector(l) | NodeKind::Vector1(l) | NodeKind::VectorFinal(l) => {
            [word(l.blocklength)?, word(l.elem_size)?, l.stride]
        }
        NodeKind::BlockIndexed(l) | NodeKind::BlockIndexed1(l) | NodeKind::BlockIndexedFinal(l) => {
            [word(l.blocklength)?, word(l.elem_size)?, 0]
        }
        NodeKind::Indexed(l) | NodeKind::IndexedFinal(l) => [word(l.elem_size)?, 0, 0],
        NodeKind::ContigChild { elem_extent } => [*elem_extent, 0, 0],
        NodeKind::ReturnTo { target } => [word(*target)?, 0, 0],
        NodeKind::Struct(_) | NodeKind::Bottom | NodeKind::Exit => [0, 0, 0],
    })
}

/// Overwrite the 8-byte word at `at` with the distance from `at` to `target`.
fn patch(buf: &mut BytesMut, at: usize, target: usize) -> TesseraResult<()> {
    let rel = word(target)? - word(at)?;
    buf[at..at + WORD].copy_from_slice(&rel.to_le_bytes());
    Ok(())
}

fn write_program(buf: &mut BytesMut, program: &Program) -> TesseraResult<()> {
    let start = buf.len();
    for node in program.nodes() {
        buf.put_u32_le(node.kind.tag().into());
        buf.put_u32_le(u32::from(node.flags.bits()));
        buf.put_u64_le(u64::try_from(node.count)?);
        buf.put_u64_le(u64::try_from(node.size)?);
        buf.put_i64_le(node.extent);
        for w in payload(&node.kind)? {
            buf.put_i64_le(w);
        }
    }

    for (idx, node) in program.nodes().iter().enumerate() {
        let record = start + idx * RECORD_SIZE + PAYLOAD;
        match &node.kind {
            NodeKind::BlockIndexed(l) | NodeKind::BlockIndexed1(l) | NodeKind::BlockIndexedFinal(l) => {
                let at = buf.len();
                l.offsets.iter().for_each(|o| buf.put_i64_le(*o));
                patch(buf, record + 2 * WORD, at)?;
            }
            NodeKind::Indexed(l) | NodeKind::IndexedFinal(l) => {
                let at = buf.len();
                for b in l.blocklengths.iter() {
                    buf.put_u64_le(u64::try_from(*b)?);
                }
                patch(buf, record + WORD, at)?;
                let at = buf.len();
                l.offsets.iter().for_each(|o| buf.put_i64_le(*o));
                patch(buf, record + 2 * WORD, at)?;
            }
            NodeKind::Struct(s) => {
                let table = buf.len();
                for field in &s.fields {
                    buf.put_u64_le(u64::try_from(field.elem_size)?);
                    buf.put_u64_le(u64::try_from(field.blocklength)?);
                    buf.put_i64_le(field.offset);
                    buf.put_i64_le(0);
                }
                patch(buf, record, table)?;
                for (k, field) in s.fields.iter().enumerate() {
                    let at = buf.len();
                    write_program(buf, &field.program)?;
                    patch(buf, table + k * FIELD_SIZE + 3 * WORD, at)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// A bounds-checked view of `len` bytes at `at`.
fn window(blob: &[u8], at: usize, len: usize) -> TesseraResult<&[u8]> {
    at.checked_add(len)
        .and_then(|end| blob.get(at..end))
        .ok_or_else(|| {
            tessera_err!(
                InvalidSerde: "{} bytes at {} overrun blob of {} bytes",
                len,
                at,
                blob.len()
            )
        })
}

/// Resolve the self-relative reference stored in the word at `at`.
fn follow(at: usize, rel: i64) -> TesseraResult<usize> {
    word(at)
        .ok()
        .and_then(|at| at.checked_add(rel))
        .and_then(|target| usize::try_from(target).ok())
        .ok_or_else(|| tessera_err!(InvalidSerde: "reference {} at {} points outside the blob", rel, at))
}

fn unsigned(v: i64, what: &str) -> TesseraResult<usize> {
    usize::try_from(v).map_err(|_| tessera_err!(InvalidSerde: "negative {} {}", what, v))
}

fn array_bytes(count: usize) -> TesseraResult<usize> {
    count
        .checked_mul(WORD)
        .ok_or_else(|| tessera_err!(InvalidSerde: "array of {} entries overflows", count))
}

fn read_i64s(blob: &[u8], at: usize, count: usize) -> TesseraResult<Arc<[i64]>> {
    let mut data = window(blob, at, array_bytes(count)?)?;
    Ok((0..count).map(|_| data.get_i64_le()).collect())
}

fn read_usizes(blob: &[u8], at: usize, count: usize) -> TesseraResult<Arc<[usize]>> {
    let mut data = window(blob, at, array_bytes(count)?)?;
    (0..count)
        .map(|_| -> TesseraResult<usize> { Ok(usize::try_from(data.get_u64_le())?) })
        .collect()
}

/// Decoding state shared by every program in one blob.
struct Decoder<'a> {
    blob: &'a [u8],
    /// Records the blob can still hold. A well-formed blob never reads a record twice.
    records_left: usize,
}

impl<'a> Decoder<'a> {
    fn new(blob: &'a [u8]) -> Self {
        Self {
            blob,
            records_left: blob.len() / RECORD_SIZE,
        }
    }

    fn read_program(&mut self, start: usize, nesting: usize) -> TesseraResult<Program> {
        if nesting > MAX_DEPTH {
            tessera_bail!(InvalidSerde: "struct nesting exceeds {} levels", MAX_DEPTH);
        }

        let mut nodes = Vec::new();
        loop {
            if nodes.len() == MAX_DEPTH {
                tessera_bail!(InvalidSerde: "no bottom within {} records", MAX_DEPTH);
            }
            let at = start + nodes.len() * RECORD_SIZE;
            let node = self.read_node(at, nesting)?;
            let done = matches!(node.kind, NodeKind::Bottom);
            nodes.push(node);
            if done {
                return Ok(Program::from_nodes(nodes));
            }
        }
    }

    fn read_node(&mut self, at: usize, nesting: usize) -> TesseraResult<Node> {
        if self.records_left == 0 {
            tessera_bail!(
                InvalidSerde: "blob of {} bytes holds no record at {}",
                self.blob.len(),
                at
            );
        }
        self.records_left -= 1;

        let blob = self.blob;
        let mut rec = window(blob, at, RECORD_SIZE)?;
        let raw_tag = rec.get_u32_le();
        let tag = NodeTag::try_from(raw_tag)
            .map_err(|_| tessera_err!(InvalidSerde: "unknown node tag {} at {}", raw_tag, at))?;
        let flags = u8::try_from(rec.get_u32_le())
            .map(NodeFlags::from_bits)
            .map_err(|_| tessera_err!(InvalidSerde: "invalid flags at {}", at))?;
        let count = usize::try_from(rec.get_u64_le())?;
        let size = usize::try_from(rec.get_u64_le())?;
        let extent = rec.get_i64_le();
        let a = rec.get_i64_le();
        let b = rec.get_i64_le();
        let c = rec.get_i64_le();
        let word_at = |k: usize| at + PAYLOAD + k * WORD;

        let kind = match tag {
            NodeTag::Bottom => NodeKind::Bottom,
            NodeTag::Exit => NodeKind::Exit,
            NodeTag::Contig | NodeTag::ContigFinal => {
                let l = ContigLoop {
                    base_size: unsigned(a, "base size")?,
                    base_extent: b,
                };
                if tag == NodeTag::Contig {
                    NodeKind::Contig(l)
                } else {
                    NodeKind::ContigFinal(l)
                }
            }
            NodeTag::Vector | NodeTag::Vector1 | NodeTag::VectorFinal => {
                let l = VectorLoop {
                    blocklength: unsigned(a, "block length")?,
                    elem_size: unsigned(b, "element size")?,
                    stride: c,
                };
                match tag {
                    NodeTag::Vector => NodeKind::Vector(l),
                    NodeTag::Vector1 => NodeKind::Vector1(l),
                    _ => NodeKind::VectorFinal(l),
                }
            }
            NodeTag::BlockIndexed | NodeTag::BlockIndexed1 | NodeTag::BlockIndexedFinal => {
                let l = BlockIndexedLoop {
                    blocklength: unsigned(a, "block length")?,
                    elem_size: unsigned(b, "element size")?,
                    offsets: read_i64s(blob, follow(word_at(2), c)?, count)?,
                };
                match tag {
                    NodeTag::BlockIndexed => NodeKind::BlockIndexed(l),
                    NodeTag::BlockIndexed1 => NodeKind::BlockIndexed1(l),
                    _ => NodeKind::BlockIndexedFinal(l),
                }
            }
            NodeTag::Indexed | NodeTag::IndexedFinal => {
                let l = IndexedLoop {
                    elem_size: unsigned(a, "element size")?,
                    blocklengths: read_usizes(blob, follow(word_at(1), b)?, count)?,
                    offsets: read_i64s(blob, follow(word_at(2), c)?, count)?,
                };
                if tag == NodeTag::Indexed {
                    NodeKind::Indexed(l)
                } else {
                    NodeKind::IndexedFinal(l)
                }
            }
            NodeTag::Struct => {
                NodeKind::Struct(self.read_struct(follow(word_at(0), a)?, count, nesting)?)
            }
            NodeTag::ContigChild => NodeKind::ContigChild { elem_extent: a },
            NodeTag::ReturnTo => NodeKind::ReturnTo {
                target: unsigned(a, "return target")?,
            },
        };

        Ok(Node {
            kind,
            count,
            size,
            extent,
            flags,
        })
    }

    /// Read a field table at `table` and the child programs it references.
    ///
    /// Children are laid out after the table, each one past the records of the last, so a
    /// reference at or before data already claimed is rejected.
    fn read_struct(
        &mut self,
        table: usize,
        count: usize,
        nesting: usize,
    ) -> TesseraResult<StructLoop> {
        let table_len = count
            .checked_mul(FIELD_SIZE)
            .ok_or_else(|| tessera_err!(InvalidSerde: "struct of {} fields overflows", count))?;
        let blob = self.blob;
        let mut entries = window(blob, table, table_len)?;
        let mut next = table + table_len;
        let mut fields = Vec::with_capacity(count.min(self.records_left));
        for k in 0..count {
            let elem_size = usize::try_from(entries.get_u64_le())?;
            let blocklength = usize::try_from(entries.get_u64_le())?;
            let offset = entries.get_i64_le();
            let child = follow(table + k * FIELD_SIZE + 3 * WORD, entries.get_i64_le())?;
            if child < next {
                tessera_bail!(
                    InvalidSerde: "child program of field {} at {} overlaps data ending at {}",
                    k,
                    child,
                    next
                );
            }
            let program = self.read_program(child, nesting + 1)?;
            next = child + program.len() * RECORD_SIZE;
            fields.push(StructField {
                elem_size,
                blocklength,
                offset,
                program,
            });
        }
        Ok(StructLoop { fields })
    }
}
