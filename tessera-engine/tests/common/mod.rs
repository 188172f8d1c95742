//! A naive model of type layouts used as an oracle for the engine.
//!
//! Each [`Shape`] builds the corresponding [`DType`] and, independently, enumerates the
//! byte runs of one element in stream order by walking the construction arguments directly.

#![allow(dead_code)]

use tessera_dtype::DType;
use tessera_engine::{LAST_UNBOUNDED, Outcome, Segment};

pub enum Shape {
    Prim(DType),
    Contiguous(usize, Box<Shape>),
    Vector(usize, usize, i64, Box<Shape>),
    Hvector(usize, usize, i64, Box<Shape>),
    IndexedBlock(usize, Vec<i64>, Box<Shape>),
    Indexed(Vec<usize>, Vec<i64>, Box<Shape>),
    Hindexed(Vec<usize>, Vec<i64>, Box<Shape>),
    Struct(Vec<(usize, i64, Shape)>),
    Resized(Box<Shape>, i64, i64),
}

impl Shape {
    pub fn dtype(&self) -> DType {
        match self {
            Shape::Prim(p) => p.clone(),
            Shape::Contiguous(n, old) => DType::contiguous(*n, &old.dtype()).unwrap(),
            Shape::Vector(n, bl, stride, old) => DType::vector(*n, *bl, *stride, &old.dtype()).unwrap(),
            Shape::Hvector(n, bl, stride, old) => DType::hvector(*n, *bl, *stride, &old.dtype()).unwrap(),
            Shape::IndexedBlock(bl, disps, old) => DType::indexed_block(*bl, disps, &old.dtype()).unwrap(),
            Shape::Indexed(bls, disps, old) => DType::indexed(bls, disps, &old.dtype()).unwrap(),
            Shape::Hindexed(bls, disps, old) => DType::hindexed(bls, disps, &old.dtype()).unwrap(),
            Shape::Struct(fields) => {
                let lengths = fields.iter().map(|(len, ..)| *len).collect::<Vec<_>>();
                let disps = fields.iter().map(|(_, disp, _)| *disp).collect::<Vec<_>>();
                let types = fields.iter().map(|(.., ty)| ty.dtype()).collect::<Vec<_>>();
                DType::structure(&lengths, &disps, &types).unwrap()
            }
            Shape::Resized(old, lb, extent) => DType::resized(&old.dtype(), *lb, *extent).unwrap(),
        }
    }

    /// Append the runs of one element whose origin is at `base`.
    pub fn runs(&self, base: i64, out: &mut Vec<(i64, usize)>) {
        match self {
            Shape::Prim(p) => {
                if p.size() > 0 {
                    out.push((base, p.size()));
                }
            }
            Shape::Contiguous(n, old) => {
                let ext = old.dtype().extent();
                for i in 0..*n as i64 {
                    old.runs(base + i * ext, out);
                }
            }
            Shape::Vector(n, bl, stride, old) => {
                let ext = old.dtype().extent();
                Shape::Hvector(*n, *bl, stride * ext, Box::new(old.copy())).runs(base, out);
            }
            Shape::Hvector(n, bl, stride, old) => {
                let ext = old.dtype().extent();
                for b in 0..*n as i64 {
                    for j in 0..*bl as i64 {
                        old.runs(base + b * stride + j * ext, out);
                    }
                }
            }
            Shape::IndexedBlock(bl, disps, old) => {
                let ext = old.dtype().extent();
                for d in disps {
                    for j in 0..*bl as i64 {
                        old.runs(base + d * ext + j * ext, out);
                    }
                }
            }
            Shape::Indexed(bls, disps, old) => {
                let ext = old.dtype().extent();
                let bytes = disps.iter().map(|d| d * ext).collect();
                Shape::Hindexed(bls.clone(), bytes, Box::new(old.copy())).runs(base, out);
            }
            Shape::Hindexed(bls, disps, old) => {
                let ext = old.dtype().extent();
                for (bl, d) in bls.iter().zip(disps) {
                    for j in 0..*bl as i64 {
                        old.runs(base + d + j * ext, out);
                    }
                }
            }
            Shape::Struct(fields) => {
                for (len, disp, ty) in fields {
                    let ext = ty.dtype().extent();
                    for j in 0..*len as i64 {
                        ty.runs(base + disp + j * ext, out);
                    }
                }
            }
            Shape::Resized(old, ..) => old.runs(base, out),
        }
    }

    fn copy(&self) -> Shape {
        match self {
            Shape::Prim(p) => Shape::Prim(p.clone()),
            Shape::Contiguous(n, old) => Shape::Contiguous(*n, Box::new(old.copy())),
            Shape::Vector(n, bl, s, old) => Shape::Vector(*n, *bl, *s, Box::new(old.copy())),
            Shape::Hvector(n, bl, s, old) => Shape::Hvector(*n, *bl, *s, Box::new(old.copy())),
            Shape::IndexedBlock(bl, d, old) => Shape::IndexedBlock(*bl, d.clone(), Box::new(old.copy())),
            Shape::Indexed(bl, d, old) => Shape::Indexed(bl.clone(), d.clone(), Box::new(old.copy())),
            Shape::Hindexed(bl, d, old) => Shape::Hindexed(bl.clone(), d.clone(), Box::new(old.copy())),
            Shape::Struct(fields) => Shape::Struct(
                fields
                    .iter()
                    .map(|(len, disp, ty)| (*len, *disp, ty.copy()))
                    .collect(),
            ),
            Shape::Resized(old, lb, ext) => Shape::Resized(Box::new(old.copy()), *lb, *ext),
        }
    }
}

pub fn prim(dtype: DType) -> Box<Shape> {
    Box::new(Shape::Prim(dtype))
}

/// A buffer holding `count` elements of `shape`, with its origin and the stream the oracle
/// expects from packing it.
pub struct Fixture {
    pub dtype: DType,
    pub count: usize,
    pub origin: usize,
    pub buffer: Vec<u8>,
    pub expected: Vec<u8>,
    pub runs: Vec<(usize, usize)>,
}

impl Fixture {
    pub fn new(shape: &Shape, count: usize) -> Self {
        let dtype = shape.dtype();
        let extent = dtype.extent();
        let mut runs = Vec::new();
        for k in 0..count as i64 {
            shape.runs(k * extent, &mut runs);
        }
        let low = runs.iter().map(|(addr, _)| *addr).min().unwrap_or(0).min(0);
        let high = runs
            .iter()
            .map(|(addr, len)| addr + *len as i64)
            .max()
            .unwrap_or(0)
            .max(0);
        let origin = usize::try_from(-low).unwrap();
        // Trailing slack catches writes past the last run.
        let len = usize::try_from(high - low).unwrap() + 8;
        let buffer = (1u8..=251).cycle().take(len).collect::<Vec<u8>>();
        let runs = runs
            .into_iter()
            .map(|(addr, len)| (usize::try_from(addr - low).unwrap(), len))
            .collect::<Vec<_>>();
        let expected = runs
            .iter()
            .flat_map(|&(start, len)| buffer[start..start + len].iter().copied())
            .collect();
        Self {
            dtype,
            count,
            origin,
            buffer,
            expected,
            runs,
        }
    }

    pub fn segment(&self) -> Segment {
        Segment::new(self.buffer.len(), self.origin, self.count, &self.dtype).unwrap()
    }
}

/// Pack everything, `budget` bytes per call.
pub fn pack_chunked(segment: &mut Segment, buffer: &[u8], budget: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let first = out.len() as i64;
        let mut chunk = vec![0u8; budget];
        let mut last = LAST_UNBOUNDED;
        let outcome = segment.pack(buffer, first, &mut last, &mut chunk).unwrap();
        let moved = usize::try_from(last - first).unwrap();
        out.extend_from_slice(&chunk[..moved]);
        if outcome == Outcome::Complete {
            return out;
        }
        assert!(moved > 0 || budget == 0, "no progress at {first}");
    }
}

/// Unpack all of `stream`, `budget` bytes per call.
pub fn unpack_chunked(segment: &mut Segment, buffer: &mut [u8], stream: &[u8], budget: usize) {
    let mut first = 0usize;
    loop {
        let end = (first + budget).min(stream.len());
        let mut last = LAST_UNBOUNDED;
        let outcome = segment
            .unpack(buffer, first as i64, &mut last, &stream[first..end])
            .unwrap();
        first = usize::try_from(last).unwrap();
        if outcome == Outcome::Complete {
            assert_eq!(first, stream.len());
            return;
        }
    }
}
