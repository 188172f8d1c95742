use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, OnceLock};

use itertools::Itertools;
use tessera_error::{TesseraResult, tessera_bail, tessera_err};
use tessera_program::{Program, arith};

use crate::bounds::{Bounds, BoundsBuilder};
use crate::{Combiner, Contents, Envelope, Pair, Primitive, builder};

/// A structured memory layout.
///
/// Predefined types are plain values. Derived types are reference counted and immutable;
/// cloning one is cheap and shares its compiled program. Two derived types are equal only
/// if they are the same construction, not merely the same layout.
#[derive(Clone)]
pub struct DType(Repr);

#[derive(Clone)]
enum Repr {
    Primitive(Primitive),
    Derived(Arc<Derived>),
}

pub(crate) struct Derived {
    combiner: Combiner,
    contents: Contents,
    pub(crate) layout: Layout,
    bounds: Bounds,
    program: OnceLock<Arc<Program>>,
}

/// The construction arguments the program builder works from, normalized to bytes.
pub(crate) enum Layout {
    Contiguous {
        count: usize,
        old: DType,
    },
    Vector {
        count: usize,
        blocklength: usize,
        stride: i64,
        old: DType,
    },
    BlockIndexed {
        blocklength: usize,
        displacements: Arc<[i64]>,
        old: DType,
    },
    Indexed {
        blocklengths: Arc<[usize]>,
        displacements: Arc<[i64]>,
        old: DType,
    },
    Struct {
        blocklengths: Arc<[usize]>,
        displacements: Arc<[i64]>,
        types: Arc<[DType]>,
    },
    /// Same data as another type, possibly with different bounds.
    Alias(DType),
}

macro_rules! primitive_consts {
    ($($name:ident => $p:ident),* $(,)?) => {
        $(
            #[doc = concat!("The predefined `", stringify!($p), "` type.")]
            pub const $name: DType = DType::primitive(Primitive::$p);
        )*
    };
}

impl DType {
    primitive_consts! {
        I8 => I8,
        U8 => U8,
        I16 => I16,
        U16 => U16,
        I32 => I32,
        U32 => U32,
        I64 => I64,
        U64 => U64,
        F32 => F32,
        F64 => F64,
        BYTE => Byte,
        LB => Lb,
        UB => Ub,
    }

    /// A predefined type.
    pub const fn primitive(p: Primitive) -> Self {
        Self(Repr::Primitive(p))
    }

    fn derived(combiner: Combiner, contents: Contents, layout: Layout, bounds: Bounds) -> Self {
        Self(Repr::Derived(Arc::new(Derived {
            combiner,
            contents,
            layout,
            bounds,
            program: OnceLock::new(),
        })))
    }

    /// `count` consecutive copies of `old`.
    pub fn contiguous(count: usize, old: &DType) -> TesseraResult<Self> {
        let mut bounds = BoundsBuilder::default();
        bounds.block(0, count, &old.bounds())?;
        let contents = Contents {
            integers: vec![arith::offset(count)?],
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        Ok(Self::derived(
            Combiner::Contiguous,
            contents,
            Layout::Contiguous {
                count,
                old: old.clone(),
            },
            bounds.finish(),
        ))
    }

    /// `count` blocks of `blocklength` copies of `old`, block starts `stride` elements apart.
    pub fn vector(count: usize, blocklength: usize, stride: i64, old: &DType) -> TesseraResult<Self> {
        let bytes = stride
            .checked_mul(old.extent())
            .ok_or_else(|| tessera_err!("vector stride {} overflows", stride))?;
        let contents = Contents {
            integers: vec![arith::offset(count)?, arith::offset(blocklength)?, stride],
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        Self::strided(Combiner::Vector, contents, count, blocklength, bytes, old)
    }

    /// `count` blocks of `blocklength` copies of `old`, block starts `stride` bytes apart.
    pub fn hvector(count: usize, blocklength: usize, stride: i64, old: &DType) -> TesseraResult<Self> {
        let contents = Contents {
            integers: vec![arith::offset(count)?, arith::offset(blocklength)?],
            addresses: vec![stride],
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        Self::strided(Combiner::Hvector, contents, count, blocklength, stride, old)
    }

    fn strided(
        combiner: Combiner,
        contents: Contents,
        count: usize,
        blocklength: usize,
        stride: i64,
        old: &DType,
    ) -> TesseraResult<Self> {
        let elem = old.bounds();
        let mut bounds = BoundsBuilder::default();
        for k in 0..count {
            bounds.block(arith::scale(k, stride)?, blocklength, &elem)?;
        }
        Ok(Self::derived(
            combiner,
            contents,
            Layout::Vector {
                count,
                blocklength,
                stride,
                old: old.clone(),
            },
            bounds.finish(),
        ))
    }

    /// Blocks of `blocklength` copies of `old` at element displacements.
    pub fn indexed_block(blocklength: usize, displacements: &[i64], old: &DType) -> TesseraResult<Self> {
        let mut integers = vec![arith::offset(displacements.len())?, arith::offset(blocklength)?];
        integers.extend_from_slice(displacements);
        let contents = Contents {
            integers,
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        let bytes = element_bytes(displacements, old)?;
        Self::block_indexed(Combiner::IndexedBlock, contents, blocklength, bytes, old)
    }

    /// Blocks of `blocklength` copies of `old` at byte displacements.
    pub fn hindexed_block(blocklength: usize, displacements: &[i64], old: &DType) -> TesseraResult<Self> {
        let contents = Contents {
            integers: vec![arith::offset(displacements.len())?, arith::offset(blocklength)?],
            addresses: displacements.to_vec(),
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        Self::block_indexed(
            Combiner::HindexedBlock,
            contents,
            blocklength,
            displacements.into(),
            old,
        )
    }

    fn block_indexed(
        combiner: Combiner,
        contents: Contents,
        blocklength: usize,
        displacements: Arc<[i64]>,
        old: &DType,
    ) -> TesseraResult<Self> {
        let elem = old.bounds();
        let mut bounds = BoundsBuilder::default();
        for &disp in displacements.iter() {
            bounds.block(disp, blocklength, &elem)?;
        }
        Ok(Self::derived(
            combiner,
            contents,
            Layout::BlockIndexed {
                blocklength,
                displacements,
                old: old.clone(),
            },
            bounds.finish(),
        ))
    }

    /// Blocks of varying numbers of copies of `old` at element displacements.
    pub fn indexed(blocklengths: &[usize], displacements: &[i64], old: &DType) -> TesseraResult<Self> {
        check_lengths(blocklengths.len(), displacements.len())?;
        let mut integers = vec![arith::offset(blocklengths.len())?];
        for &len in blocklengths {
            integers.push(arith::offset(len)?);
        }
        integers.extend_from_slice(displacements);
        let contents = Contents {
            integers,
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        let bytes = element_bytes(displacements, old)?;
        Self::indexed_bytes(Combiner::Indexed, contents, blocklengths, bytes, old)
    }

    /// Blocks of varying numbers of copies of `old` at byte displacements.
    pub fn hindexed(blocklengths: &[usize], displacements: &[i64], old: &DType) -> TesseraResult<Self> {
        check_lengths(blocklengths.len(), displacements.len())?;
        let mut integers = vec![arith::offset(blocklengths.len())?];
        for &len in blocklengths {
            integers.push(arith::offset(len)?);
        }
        let contents = Contents {
            integers,
            addresses: displacements.to_vec(),
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        Self::indexed_bytes(
            Combiner::Hindexed,
            contents,
            blocklengths,
            displacements.into(),
            old,
        )
    }

    fn indexed_bytes(
        combiner: Combiner,
        contents: Contents,
        blocklengths: &[usize],
        displacements: Arc<[i64]>,
        old: &DType,
    ) -> TesseraResult<Self> {
        let elem = old.bounds();
        let mut bounds = BoundsBuilder::default();
        for (&len, &disp) in blocklengths.iter().zip(displacements.iter()) {
            bounds.block(disp, len, &elem)?;
        }
        Ok(Self::derived(
            combiner,
            contents,
            Layout::Indexed {
                blocklengths: blocklengths.into(),
                displacements,
                old: old.clone(),
            },
            bounds.finish(),
        ))
    }

    /// Blocks of different types at byte displacements.
    ///
    /// No alignment padding is added to the extent; use [`DType::resized`] to pad.
    pub fn structure(blocklengths: &[usize], displacements: &[i64], types: &[DType]) -> TesseraResult<Self> {
        check_lengths(blocklengths.len(), displacements.len())?;
        check_lengths(blocklengths.len(), types.len())?;
        let mut bounds = BoundsBuilder::default();
        let mut integers = vec![arith::offset(blocklengths.len())?];
        for ((&len, &disp), ty) in blocklengths.iter().zip(displacements).zip(types) {
            bounds.block(disp, len, &ty.bounds())?;
            integers.push(arith::offset(len)?);
        }
        let contents = Contents {
            integers,
            addresses: displacements.to_vec(),
            datatypes: types.to_vec(),
            ..Default::default()
        };
        Ok(Self::derived(
            Combiner::Struct,
            contents,
            Layout::Struct {
                blocklengths: blocklengths.into(),
                displacements: displacements.into(),
                types: types.into(),
            },
            bounds.finish(),
        ))
    }

    /// `old` with its bounds replaced by `[lb, lb + extent)`.
    pub fn resized(old: &DType, lb: i64, extent: i64) -> TesseraResult<Self> {
        let contents = Contents {
            addresses: vec![lb, extent],
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        Ok(Self::derived(
            Combiner::Resized,
            contents,
            Layout::Alias(old.clone()),
            old.bounds().resized(lb, extent)?,
        ))
    }

    /// A distinct type with the same layout as `old`.
    pub fn dup(old: &DType) -> Self {
        let contents = Contents {
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        Self::derived(
            Combiner::Dup,
            contents,
            Layout::Alias(old.clone()),
            old.bounds(),
        )
    }

    /// One of the named value-index pair types.
    pub fn pair(pair: Pair) -> TesseraResult<Self> {
        let (value, index_at, extent) = pair.layout();
        let fields = Self::structure(&[1, 1], &[0, index_at], &[Self::primitive(value), Self::I32])?;
        let inner = Self::resized(&fields, 0, extent)?;
        let contents = Contents {
            pair: Some(pair),
            ..Default::default()
        };
        let bounds = inner.bounds();
        Ok(Self::derived(
            Combiner::Named,
            contents,
            Layout::Alias(inner),
            bounds,
        ))
    }

    /// Wrap an internally constructed type under another combiner.
    pub(crate) fn alias(combiner: Combiner, contents: Contents, inner: DType) -> Self {
        let bounds = inner.bounds();
        Self::derived(combiner, contents, Layout::Alias(inner), bounds)
    }

    pub(crate) fn bounds(&self) -> Bounds {
        match &self.0 {
            Repr::Primitive(p) => Bounds::primitive(*p),
            Repr::Derived(d) => d.bounds,
        }
    }

    pub(crate) fn layout(&self) -> Option<&Layout> {
        match &self.0 {
            Repr::Primitive(_) => None,
            Repr::Derived(d) => Some(&d.layout),
        }
    }

    /// Bytes of data in one element, excluding gaps.
    pub fn size(&self) -> usize {
        self.bounds().size
    }

    /// Lower bound, in bytes from the type's origin.
    pub fn lb(&self) -> i64 {
        self.bounds().lb
    }

    /// Upper bound, in bytes from the type's origin.
    pub fn ub(&self) -> i64 {
        self.bounds().ub
    }

    /// Distance between consecutive elements: `ub - lb`.
    pub fn extent(&self) -> i64 {
        self.bounds().extent()
    }

    /// Lowest byte of actual data, ignoring markers and resizes.
    pub fn true_lb(&self) -> i64 {
        self.bounds().true_lb
    }

    /// One past the highest byte of actual data, ignoring markers and resizes.
    pub fn true_ub(&self) -> i64 {
        self.bounds().true_ub
    }

    /// `true_ub - true_lb`.
    pub fn true_extent(&self) -> i64 {
        let b = self.bounds();
        b.true_ub - b.true_lb
    }

    /// Whether this is a predefined type.
    pub fn is_primitive(&self) -> bool {
        matches!(self.0, Repr::Primitive(_))
    }

    /// The predefined type, if this is one.
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.0 {
            Repr::Primitive(p) => Some(p),
            Repr::Derived(_) => None,
        }
    }

    /// Whether this is an `Lb` or `Ub` marker.
    pub fn is_marker(&self) -> bool {
        self.as_primitive().is_some_and(Primitive::is_marker)
    }

    /// The constructor that produced this type.
    pub fn combiner(&self) -> Combiner {
        match &self.0 {
            Repr::Primitive(_) => Combiner::Named,
            Repr::Derived(d) => d.combiner,
        }
    }

    /// The constructor and argument counts of this type.
    pub fn envelope(&self) -> Envelope {
        match &self.0 {
            Repr::Primitive(_) => Contents::default().envelope(Combiner::Named),
            Repr::Derived(d) => d.contents.envelope(d.combiner),
        }
    }

    /// The arguments this type was constructed with.
    pub fn contents(&self) -> TesseraResult<&Contents> {
        match &self.0 {
            Repr::Primitive(p) => tessera_bail!("predefined type {} has no contents", p),
            Repr::Derived(d) => Ok(&d.contents),
        }
    }

    /// Compile the layout program, once. Predefined types have none.
    pub fn commit(&self) -> TesseraResult<()> {
        self.program().map(|_| ())
    }

    /// The compiled program, compiling it on first use. `None` for predefined types.
    ///
    /// A failed compile leaves nothing cached, so a later call reports the same error.
    pub fn program(&self) -> TesseraResult<Option<&Arc<Program>>> {
        let Repr::Derived(d) = &self.0 else {
            return Ok(None);
        };
        if let Some(program) = d.program.get() {
            return Ok(Some(program));
        }
        let program = Arc::new(builder::commit(self)?);
        // Losing a race leaves the other thread's identical program in place.
        let _ = d.program.set(program);
        Ok(d.program.get())
    }

    /// The exact serialized size of the compiled program, or 0 for predefined types.
    pub fn program_size(&self) -> TesseraResult<usize> {
        Ok(self.program()?.map_or(0, |p| p.serialized_size(false)))
    }

    /// The depth of the compiled program, or 0 for predefined types.
    pub fn depth(&self) -> TesseraResult<usize> {
        Ok(self.program()?.map_or(0, |p| p.depth()))
    }

    /// Whether consecutive elements form one gapless run of bytes starting at the origin.
    pub fn is_contiguous(&self) -> TesseraResult<bool> {
        if arith::offset(self.size())? != self.extent() {
            return Ok(false);
        }
        Ok(self.program()?.is_none_or(|p| p.is_contiguous()))
    }
}

fn check_lengths(expected: usize, actual: usize) -> TesseraResult<()> {
    if expected != actual {
        tessera_bail!(
            "argument arrays differ in length: {} and {}",
            expected,
            actual
        );
    }
    Ok(())
}

fn element_bytes(displacements: &[i64], old: &DType) -> TesseraResult<Arc<[i64]>> {
    let extent = old.extent();
    displacements
        .iter()
        .map(|&d| {
            d.checked_mul(extent)
                .ok_or_else(|| tessera_err!("displacement {} overflows", d))
        })
        .collect()
}

impl PartialEq for DType {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Repr::Primitive(a), Repr::Primitive(b)) => a == b,
            (Repr::Derived(a), Repr::Derived(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for DType {}

impl From<Primitive> for DType {
    fn from(p: Primitive) -> Self {
        Self::primitive(p)
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let d = match &self.0 {
            Repr::Primitive(p) => return write!(f, "{p}"),
            Repr::Derived(d) => d,
        };
        let c = &d.contents;
        if let Some(pair) = c.pair {
            return write!(f, "{pair}");
        }
        write!(
            f,
            "{}({}",
            d.combiner,
            c.integers.iter().chain(c.addresses.iter()).join(", ")
        )?;
        if !c.datatypes.is_empty() {
            if !c.integers.is_empty() || !c.addresses.is_empty() {
                write!(f, "; ")?;
            }
            write!(f, "{}", c.datatypes.iter().join(", "))?;
        }
        write!(f, ")")
    }
}

impl Debug for DType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn vector_bounds() {
        let v = DType::vector(3, 2, 4, &DType::I32).unwrap();
        assert_eq!(v.size(), 24);
        assert_eq!((v.lb(), v.ub(), v.extent()), (0, 40, 40));
        assert_eq!(v.envelope().combiner(), Combiner::Vector);
        assert_eq!(v.contents().unwrap().integers, vec![3, 2, 4]);
    }

    #[test]
    fn negative_stride() {
        let v = DType::hvector(3, 1, -8, &DType::F64).unwrap();
        assert_eq!((v.lb(), v.ub()), (-16, 8));
        assert_eq!(v.size(), 24);
    }

    #[test]
    fn struct_has_no_padding() {
        let s = DType::structure(&[1, 1], &[0, 8], &[DType::F64, DType::I8]).unwrap();
        assert_eq!(s.size(), 9);
        assert_eq!(s.extent(), 9);
    }

    #[test]
    fn struct_markers() {
        let s = DType::structure(
            &[1, 1, 1],
            &[-4, 0, 16],
            &[DType::LB, DType::I32, DType::UB],
        )
        .unwrap();
        assert_eq!((s.lb(), s.ub(), s.extent()), (-4, 16, 20));
        assert_eq!((s.true_lb(), s.true_ub()), (0, 4));
    }

    #[test]
    fn mismatched_lengths() {
        assert!(DType::indexed(&[1, 2], &[0], &DType::I32).is_err());
        assert!(DType::structure(&[1], &[0], &[]).is_err());
    }

    #[test]
    fn identity() {
        let a = DType::contiguous(2, &DType::I32).unwrap();
        let b = DType::contiguous(2, &DType::I32).unwrap();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a, DType::dup(&a));
        assert_eq!(DType::I32, DType::primitive(Primitive::I32));
    }

    #[rstest]
    #[case(Pair::FloatInt, 8, 8)]
    #[case(Pair::DoubleInt, 12, 16)]
    #[case(Pair::ShortInt, 6, 8)]
    fn pairs(#[case] pair: Pair, #[case] size: usize, #[case] extent: i64) {
        let t = DType::pair(pair).unwrap();
        assert_eq!(t.size(), size);
        assert_eq!(t.extent(), extent);
        assert_eq!(t.envelope().combiner(), Combiner::Named);
        assert_eq!(t.envelope().num_datatypes, 0);
        t.commit().unwrap();
        assert!(t.program().unwrap().is_some());
    }

    #[test]
    fn primitives_have_no_program() {
        assert!(DType::F32.program().unwrap().is_none());
        assert_eq!(DType::F32.program_size().unwrap(), 0);
        assert!(DType::F32.is_contiguous().unwrap());
        assert!(DType::F32.contents().is_err());
    }

    #[test]
    fn contiguity() {
        let c = DType::contiguous(4, &DType::I16).unwrap();
        assert!(c.is_contiguous().unwrap());
        let v = DType::vector(2, 1, 2, &DType::I16).unwrap();
        assert!(!v.is_contiguous().unwrap());
        let r = DType::resized(&DType::I32, 0, 8).unwrap();
        assert!(!r.is_contiguous().unwrap());
    }

    #[test]
    fn display() {
        let v = DType::vector(3, 2, 4, &DType::I32).unwrap();
        assert_eq!(v.to_string(), "vector(3, 2, 4; i32)");
        let r = DType::resized(&v, 0, 64).unwrap();
        assert_eq!(r.to_string(), "resized(0, 64; vector(3, 2, 4; i32))");
        assert_eq!(DType::pair(Pair::TwoInt).unwrap().to_string(), "2int");
    }
}
