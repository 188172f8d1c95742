use arbitrary::{Arbitrary, Error, Result, Unstructured};

use crate::{DType, Primitive};

impl<'a> Arbitrary<'a> for DType {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self> {
        random_dtype(u, 3)
    }
}

impl<'a> Arbitrary<'a> for Primitive {
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self> {
        Ok(match u.int_in_range(0..=10)? {
            0 => Primitive::I8,
            1 => Primitive::U8,
            2 => Primitive::I16,
            3 => Primitive::U16,
            4 => Primitive::I32,
            5 => Primitive::U32,
            6 => Primitive::I64,
            7 => Primitive::U64,
            8 => Primitive::F32,
            9 => Primitive::F64,
            10 => Primitive::Byte,
            _ => unreachable!("Number out of range"),
        })
    }
}

/// Generated types have non-negative bounds and a positive extent, so `count` elements fit
/// in `(count - 1) * extent + true_ub` bytes past the origin.
fn random_dtype(u: &mut Unstructured<'_>, depth: u8) -> Result<DType> {
    const BASE_TYPE_COUNT: i32 = 1;
    const DERIVED_TYPE_COUNT: i32 = 7;
    let max_kind = if depth == 0 {
        BASE_TYPE_COUNT
    } else {
        BASE_TYPE_COUNT + DERIVED_TYPE_COUNT
    };
    let dtype = match u.int_in_range(1..=max_kind)? {
        1 => Ok(DType::primitive(u.arbitrary()?)),
        2 => {
            let old = random_dtype(u, depth - 1)?;
            DType::contiguous(u.int_in_range(0..=4)?, &old)
        }
        3 => {
            let old = random_dtype(u, depth - 1)?;
            let blocklength: u8 = u.int_in_range(0..=3)?;
            let gap: u8 = u.int_in_range(0..=3)?;
            let stride = i64::from(blocklength + gap);
            DType::vector(u.int_in_range(0..=4)?, usize::from(blocklength), stride, &old)
        }
        4 => {
            let old = random_dtype(u, depth - 1)?;
            let displacements = random_displacements(u)?;
            DType::indexed_block(u.int_in_range(0..=3)?, &displacements, &old)
        }
        5 => {
            let old = random_dtype(u, depth - 1)?;
            let displacements = random_displacements(u)?;
            let blocklengths = displacements
                .iter()
                .map(|_| u.int_in_range(0..=3))
                .collect::<Result<Vec<usize>>>()?;
            DType::indexed(&blocklengths, &displacements, &old)
        }
        6 => {
            let len = u.int_in_range(1..=3)?;
            let mut types = Vec::with_capacity(len);
            let mut blocklengths = Vec::with_capacity(len);
            let mut displacements = Vec::with_capacity(len);
            let mut at = 0i64;
            for _ in 0..len {
                let ty = random_dtype(u, depth - 1)?;
                let count: u8 = u.int_in_range(0..=2)?;
                at += i64::from(u.int_in_range(0u8..=8)?);
                displacements.push(at);
                at += ty.extent() * i64::from(count);
                blocklengths.push(usize::from(count));
                types.push(ty);
            }
            DType::structure(&blocklengths, &displacements, &types)
        }
        7 => {
            let old = random_dtype(u, depth - 1)?;
            let pad = i64::from(u.int_in_range(0u8..=16)?);
            DType::resized(&old, 0, old.true_ub().max(old.extent()) + pad)
        }
        8 => {
            let old = random_dtype(u, depth - 1)?;
            Ok(DType::dup(&old))
        }
        _ => unreachable!("Number out of range"),
    };
    let dtype = dtype.map_err(|_| Error::IncorrectFormat)?;
    if dtype.extent() <= 0 || dtype.lb() < 0 || dtype.true_lb() < 0 {
        // Zero-extent and negative-bound types fold consecutive elements onto one another.
        return Err(Error::IncorrectFormat);
    }
    Ok(dtype)
}

fn random_displacements(u: &mut Unstructured<'_>) -> Result<Vec<i64>> {
    let len = u.int_in_range(1..=4)?;
    (0..len)
        .map(|_| u.int_in_range(0u8..=12).map(i64::from))
        .collect()
}
