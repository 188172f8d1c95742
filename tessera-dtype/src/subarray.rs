use tessera_error::{TesseraResult, tessera_bail, tessera_err};
use tessera_program::arith;

use crate::{Combiner, Contents, DType};

/// Storage order of a multi-dimensional array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Order {
    /// Row-major: the last dimension varies fastest.
    C,
    /// Column-major: the first dimension varies fastest.
    Fortran,
}

fn product(values: &[usize]) -> TesseraResult<usize> {
    values.iter().try_fold(1usize, |acc, &v| {
        acc.checked_mul(v)
            .ok_or_else(|| tessera_err!("array dimensions overflow"))
    })
}

impl DType {
    /// The `subsizes` slab at `starts` of an array of `sizes` elements of `old`.
    ///
    /// The result's extent is that of the whole array, so consecutive elements of the
    /// subarray type address consecutive whole arrays.
    pub fn subarray(
        sizes: &[usize],
        subsizes: &[usize],
        starts: &[usize],
        order: Order,
        old: &DType,
    ) -> TesseraResult<Self> {
        let ndims = sizes.len();
        if ndims == 0 || subsizes.len() != ndims || starts.len() != ndims {
            tessera_bail!(
                "subarray needs matching non-empty dimensions, got {}, {} and {}",
                sizes.len(),
                subsizes.len(),
                starts.len()
            );
        }
        for dim in 0..ndims {
            let end = starts[dim].checked_add(subsizes[dim]);
            if sizes[dim] == 0 || subsizes[dim] == 0 || end.is_none_or(|end| end > sizes[dim]) {
                tessera_bail!(
                    "subarray dimension {} of size {} cannot hold {} elements from {}",
                    dim,
                    sizes[dim],
                    subsizes[dim],
                    starts[dim]
                );
            }
        }

        // Work fastest-varying dimension first.
        let (mut sizes, mut subsizes, mut starts) = (sizes.to_vec(), subsizes.to_vec(), starts.to_vec());
        if order == Order::C {
            sizes.reverse();
            subsizes.reverse();
            starts.reverse();
        }

        let extent = old.extent();
        let mut slab = if ndims == 1 {
            DType::contiguous(subsizes[0], old)?
        } else {
            DType::vector(subsizes[1], subsizes[0], arith::offset(sizes[0])?, old)?
        };
        let mut stride = arith::scale(sizes[0], extent)?;
        for dim in 2..ndims {
            stride = arith::scale(sizes[dim - 1], stride)?;
            slab = DType::hvector(subsizes[dim], 1, stride, &slab)?;
        }

        let mut disp = 0i64;
        for dim in 0..ndims {
            let step = arith::offset(product(&sizes[..dim])?)?;
            disp = arith::add(disp, arith::scale(starts[dim], step)?)?;
        }
        let disp = disp
            .checked_mul(extent)
            .ok_or_else(|| tessera_err!("subarray displacement overflows"))?;

        let placed = DType::hindexed_block(1, &[disp], &slab)?;
        let full = DType::resized(&placed, 0, arith::scale(product(&sizes)?, extent)?)?;

        // Record the arguments in the caller's order.
        let mut integers = vec![arith::offset(ndims)?];
        if order == Order::C {
            sizes.reverse();
            subsizes.reverse();
            starts.reverse();
        }
        for v in sizes.iter().chain(&subsizes).chain(&starts) {
            integers.push(arith::offset(*v)?);
        }
        integers.push(match order {
            Order::C => 0,
            Order::Fortran => 1,
        });
        let contents = Contents {
            integers,
            datatypes: vec![old.clone()],
            ..Default::default()
        };
        Ok(DType::alias(Combiner::Subarray, contents, full))
    }
}
