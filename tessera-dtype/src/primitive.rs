use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The predefined element types.
///
/// `Lb` and `Ub` are zero-size markers that pin the lower and upper bound of an enclosing
/// struct. They carry no data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Primitive {
    /// Signed 8-bit integer
    I8,
    /// Unsigned 8-bit integer
    U8,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 16-bit integer
    U16,
    /// Signed 32-bit integer
    I32,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 64-bit integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// An uninterpreted byte
    Byte,
    /// Lower bound marker
    Lb,
    /// Upper bound marker
    Ub,
}

impl Primitive {
    /// Bytes occupied by one element.
    pub const fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Byte => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::Lb | Self::Ub => 0,
        }
    }

    /// Bytes between consecutive elements, which for a primitive is its size.
    pub const fn extent(self) -> i64 {
        match self {
            Self::I8 | Self::U8 | Self::Byte => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::Lb | Self::Ub => 0,
        }
    }

    /// Whether this is one of the bound markers.
    pub const fn is_marker(self) -> bool {
        matches!(self, Self::Lb | Self::Ub)
    }
}

impl Display for Primitive {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::I8 => write!(f, "i8"),
            Self::U8 => write!(f, "u8"),
            Self::I16 => write!(f, "i16"),
            Self::U16 => write!(f, "u16"),
            Self::I32 => write!(f, "i32"),
            Self::U32 => write!(f, "u32"),
            Self::I64 => write!(f, "i64"),
            Self::U64 => write!(f, "u64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::Byte => write!(f, "byte"),
            Self::Lb => write!(f, "lb"),
            Self::Ub => write!(f, "ub"),
        }
    }
}

/// The named value-index pair types used by reductions such as max-loc.
///
/// Each is laid out like the equivalent C struct, including trailing padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pair {
    /// `{ f32, i32 }`
    FloatInt,
    /// `{ f64, i32 }`, padded to 16 bytes
    DoubleInt,
    /// `{ i64, i32 }`, padded to 16 bytes
    LongInt,
    /// `{ i16, i32 }`, the `i32` at offset 4
    ShortInt,
    /// `{ i32, i32 }`
    TwoInt,
}

impl Pair {
    /// The value type, the offset of the trailing `i32`, and the padded extent.
    pub(crate) const fn layout(self) -> (Primitive, i64, i64) {
        match self {
            Self::FloatInt => (Primitive::F32, 4, 8),
            Self::DoubleInt => (Primitive::F64, 8, 16),
            Self::LongInt => (Primitive::I64, 8, 16),
            Self::ShortInt => (Primitive::I16, 4, 8),
            Self::TwoInt => (Primitive::I32, 4, 8),
        }
    }
}

impl Display for Pair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FloatInt => write!(f, "float_int"),
            Self::DoubleInt => write!(f, "double_int"),
            Self::LongInt => write!(f, "long_int"),
            Self::ShortInt => write!(f, "short_int"),
            Self::TwoInt => write!(f, "2int"),
        }
    }
}
