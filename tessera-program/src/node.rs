use std::fmt::{Display, Formatter};
use std::sync::Arc;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::Program;

/// Copy-routine hints carried by a node.
///
/// Flags never change what bytes are moved, only which kernel moves them.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeFlags(u8);

impl NodeFlags {
    /// Every block start is a multiple of the element width.
    pub const ALIGNED: Self = Self(0x1);
    /// Blocks are short enough that an element-wise loop beats a bulk copy.
    pub const SHORT: Self = Self(0x2);
    /// No hints.
    pub const NONE: Self = Self(0);

    /// Rebuild flags from their raw bits, dropping unknown bits.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & (Self::ALIGNED.0 | Self::SHORT.0))
    }

    /// The raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every bit in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set or clear the bits in `other`.
    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// Return a copy with `other` set or cleared.
    #[must_use]
    pub fn with(mut self, other: Self, value: bool) -> Self {
        self.set(other, value);
        self
    }
}

impl std::fmt::Debug for NodeFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for NodeFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (
            self.contains(Self::ALIGNED),
            self.contains(Self::SHORT),
        ) {
            (false, false) => write!(f, "-"),
            (true, false) => write!(f, "aligned"),
            (false, true) => write!(f, "short"),
            (true, true) => write!(f, "aligned|short"),
        }
    }
}

/// A run of `count` elements laid end to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContigLoop {
    /// Bytes carried by one element.
    pub base_size: usize,
    /// Distance between consecutive elements.
    pub base_extent: i64,
}

/// `count` blocks of `blocklength` elements, each block `stride` bytes after the previous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorLoop {
    /// Elements per block.
    pub blocklength: usize,
    /// Bytes carried by one element of a block.
    pub elem_size: usize,
    /// Byte distance between block starts.
    pub stride: i64,
}

/// `count` equal-length blocks at arbitrary byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndexedLoop {
    /// Elements per block.
    pub blocklength: usize,
    /// Bytes carried by one element of a block.
    pub elem_size: usize,
    /// Byte offset of each block, relative to the node's base.
    pub offsets: Arc<[i64]>,
}

/// `count` blocks of varying length at arbitrary byte offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedLoop {
    /// Bytes carried by one element of a block.
    pub elem_size: usize,
    /// Elements in each block.
    pub blocklengths: Arc<[usize]>,
    /// Byte offset of each block, relative to the node's base.
    pub offsets: Arc<[i64]>,
}

impl IndexedLoop {
    /// Sum of all block lengths.
    pub fn total_elements(&self) -> usize {
        self.blocklengths.iter().sum()
    }
}

/// One field of a [`StructLoop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    /// Bytes carried by one element of the field type.
    pub elem_size: usize,
    /// Elements of the field type in this field.
    pub blocklength: usize,
    /// Byte offset of the field, relative to the struct's base.
    pub offset: i64,
    /// The program that walks this field.
    pub program: Program,
}

/// Heterogeneous fields, each walked by its own child program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLoop {
    /// The fields in declaration order, zero-length and marker fields removed.
    pub fields: Vec<StructField>,
}

/// The kind of a node together with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// End of a program. Popping into it is a corrupt program.
    Bottom,
    /// Start of a program. Popping into it completes a traversal.
    Exit,
    /// Intermediate contiguous loop over a nested element.
    Contig(ContigLoop),
    /// Leaf contiguous run, copied directly.
    ContigFinal(ContigLoop),
    /// Intermediate strided loop whose blocks are walked by a [`NodeKind::ContigChild`].
    Vector(VectorLoop),
    /// Intermediate strided loop with one element per block.
    Vector1(VectorLoop),
    /// Leaf strided loop, copied block by block.
    VectorFinal(VectorLoop),
    /// Intermediate block-indexed loop whose blocks are walked by a [`NodeKind::ContigChild`].
    BlockIndexed(BlockIndexedLoop),
    /// Intermediate block-indexed loop with one element per block.
    BlockIndexed1(BlockIndexedLoop),
    /// Leaf block-indexed loop.
    BlockIndexedFinal(BlockIndexedLoop),
    /// Intermediate indexed loop whose blocks are walked by a [`NodeKind::ContigChild`].
    Indexed(IndexedLoop),
    /// Leaf indexed loop.
    IndexedFinal(IndexedLoop),
    /// Heterogeneous fields with one child program each.
    Struct(StructLoop),
    /// Steps through the elements of one block of the parent loop. Its count and base are
    /// seeded by the parent on every block.
    ContigChild {
        /// Distance between consecutive elements of the block.
        elem_extent: i64,
    },
    /// Hands control from a struct child back to the struct at `target`.
    ReturnTo {
        /// Index of the owning struct node.
        target: usize,
    },
}

impl NodeKind {
    /// The leaf kinds that move whole blocks and are followed by a `ContigFinal`.
    pub fn is_final_loop(&self) -> bool {
        matches!(
            self,
            Self::VectorFinal(_) | Self::BlockIndexedFinal(_) | Self::IndexedFinal(_)
        )
    }

    /// The intermediate kinds that must be followed by a `ContigChild`.
    pub fn needs_child(&self) -> bool {
        matches!(self, Self::Vector(_) | Self::BlockIndexed(_) | Self::Indexed(_))
    }

    /// The discriminant of this kind.
    pub fn tag(&self) -> NodeTag {
        match self {
            Self::Bottom => NodeTag::Bottom,
            Self::Exit => NodeTag::Exit,
            Self::Contig(_) => NodeTag::Contig,
            Self::ContigFinal(_) => NodeTag::ContigFinal,
            Self::Vector(_) => NodeTag::Vector,
            Self::Vector1(_) => NodeTag::Vector1,
            Self::VectorFinal(_) => NodeTag::VectorFinal,
            Self::BlockIndexed(_) => NodeTag::BlockIndexed,
            Self::BlockIndexed1(_) => NodeTag::BlockIndexed1,
            Self::BlockIndexedFinal(_) => NodeTag::BlockIndexedFinal,
            Self::Indexed(_) => NodeTag::Indexed,
            Self::IndexedFinal(_) => NodeTag::IndexedFinal,
            Self::Struct(_) => NodeTag::Struct,
            Self::ContigChild { .. } => NodeTag::ContigChild,
            Self::ReturnTo { .. } => NodeTag::ReturnTo,
        }
    }
}

/// Payload-free discriminant of [`NodeKind`], used as the tag of a serialized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum NodeTag {
    /// See [`NodeKind::Bottom`].
    Bottom = 0,
    /// See [`NodeKind::Exit`].
    Exit = 1,
    /// See [`NodeKind::Contig`].
    Contig = 2,
    /// See [`NodeKind::ContigFinal`].
    ContigFinal = 3,
    /// See [`NodeKind::Vector`].
    Vector = 4,
    /// See [`NodeKind::Vector1`].
    Vector1 = 5,
    /// See [`NodeKind::VectorFinal`].
    VectorFinal = 6,
    /// See [`NodeKind::BlockIndexed`].
    BlockIndexed = 7,
    /// See [`NodeKind::BlockIndexed1`].
    BlockIndexed1 = 8,
    /// See [`NodeKind::BlockIndexedFinal`].
    BlockIndexedFinal = 9,
    /// See [`NodeKind::Indexed`].
    Indexed = 10,
    /// See [`NodeKind::IndexedFinal`].
    IndexedFinal = 11,
    /// See [`NodeKind::Struct`].
    Struct = 12,
    /// See [`NodeKind::ContigChild`].
    ContigChild = 13,
    /// See [`NodeKind::ReturnTo`].
    ReturnTo = 14,
}

impl Display for NodeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bottom => "bottom",
            Self::Exit => "exit",
            Self::Contig => "contig",
            Self::ContigFinal => "contig_final",
            Self::Vector => "vector",
            Self::Vector1 => "vector1",
            Self::VectorFinal => "vector_final",
            Self::BlockIndexed => "blockindexed",
            Self::BlockIndexed1 => "blockindexed1",
            Self::BlockIndexedFinal => "blockindexed_final",
            Self::Indexed => "indexed",
            Self::IndexedFinal => "indexed_final",
            Self::Struct => "struct",
            Self::ContigChild => "contig_child",
            Self::ReturnTo => "return_to",
        };
        write!(f, "{name}")
    }
}

/// One step of a layout program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// What this node does and its payload.
    pub kind: NodeKind,
    /// Repetitions: elements for intermediate kinds, whole blocks for final kinds.
    pub count: usize,
    /// Bytes carried by one full traversal of this node, excluding gaps.
    pub size: usize,
    /// Bytes spanned by one full traversal of this node, including gaps.
    pub extent: i64,
    /// Copy-routine hints.
    pub flags: NodeFlags,
}

impl Node {
    /// A node with the given kind and shape and no flags.
    pub fn new(kind: NodeKind, count: usize, size: usize, extent: i64) -> Self {
        Self {
            kind,
            count,
            size,
            extent,
            flags: NodeFlags::NONE,
        }
    }

    /// The program start sentinel.
    pub fn exit() -> Self {
        Self::new(NodeKind::Exit, 0, 0, 0)
    }

    /// The program end sentinel.
    pub fn bottom() -> Self {
        Self::new(NodeKind::Bottom, 0, 0, 0)
    }

    /// A struct child's hand-back to the struct at `target`.
    pub fn return_to(target: usize) -> Self {
        Self::new(NodeKind::ReturnTo { target }, 0, 0, 0)
    }

    /// Replace the flags.
    #[must_use]
    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags = flags;
        self
    }
}
