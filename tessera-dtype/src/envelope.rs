use std::fmt::{Display, Formatter};

use crate::{DType, Pair};

/// How a type was constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combiner {
    /// A predefined type, or one of the named [`Pair`] types.
    Named,
    /// `count` consecutive copies of one type.
    Contiguous,
    /// Equally spaced blocks, stride in elements.
    Vector,
    /// Equally spaced blocks, stride in bytes.
    Hvector,
    /// Equal-length blocks at element displacements.
    IndexedBlock,
    /// Equal-length blocks at byte displacements.
    HindexedBlock,
    /// Variable-length blocks at element displacements.
    Indexed,
    /// Variable-length blocks at byte displacements.
    Hindexed,
    /// Blocks of different types at byte displacements.
    Struct,
    /// Another type with explicit bounds.
    Resized,
    /// An exact copy of another type.
    Dup,
    /// A rectangular slab of a multi-dimensional array.
    Subarray,
}

impl Display for Combiner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Named => "named",
            Self::Contiguous => "contiguous",
            Self::Vector => "vector",
            Self::Hvector => "hvector",
            Self::IndexedBlock => "indexed_block",
            Self::HindexedBlock => "hindexed_block",
            Self::Indexed => "indexed",
            Self::Hindexed => "hindexed",
            Self::Struct => "struct",
            Self::Resized => "resized",
            Self::Dup => "dup",
            Self::Subarray => "subarray",
        };
        write!(f, "{name}")
    }
}

/// The shape of a type's construction arguments, as returned by [`DType::envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    /// The constructor that produced the type.
    pub combiner: Combiner,
    /// Length of [`Contents::integers`].
    pub num_integers: usize,
    /// Length of [`Contents::addresses`].
    pub num_addresses: usize,
    /// Length of [`Contents::datatypes`].
    pub num_datatypes: usize,
}

impl Envelope {
    /// The constructor that produced the type.
    pub fn combiner(&self) -> Combiner {
        self.combiner
    }
}

/// The arguments a derived type was constructed with.
///
/// Counts, block lengths and element displacements go in `integers`, byte displacements,
/// strides and bounds in `addresses`, and the element types in `datatypes`, in the order
/// the constructor takes them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Contents {
    /// Integer arguments.
    pub integers: Vec<i64>,
    /// Byte-valued arguments.
    pub addresses: Vec<i64>,
    /// Element types.
    pub datatypes: Vec<DType>,
    /// Set for the named pair types, which record no other contents.
    pub pair: Option<Pair>,
}

impl Contents {
    pub(crate) fn envelope(&self, combiner: Combiner) -> Envelope {
        Envelope {
            combiner,
            num_integers: self.integers.len(),
            num_addresses: self.addresses.len(),
            num_datatypes: self.datatypes.len(),
        }
    }
}
