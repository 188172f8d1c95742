//! Size and bound bookkeeping for type construction.
//!
//! A type's lower and upper bounds are the lowest and highest byte its copies may touch,
//! measured from the type's origin, and its extent is their difference. Bounds come from
//! the data unless an `Lb`/`Ub` marker or a resize pinned them; pinned bounds are sticky
//! and win over data-derived ones in every enclosing type. The true bounds always track
//! the data alone.

use tessera_error::{TesseraResult, tessera_err};
use tessera_program::arith;

use crate::Primitive;

/// Where a bound came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pin {
    /// Derived from the data.
    Natural,
    /// Set by a marker or a resize.
    Sticky,
    /// Nothing contributed to this bound.
    Absent,
}

/// Size and bounds of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bounds {
    pub size: usize,
    pub lb: i64,
    pub ub: i64,
    pub true_lb: i64,
    pub true_ub: i64,
    pub lb_pin: Pin,
    pub ub_pin: Pin,
}

impl Bounds {
    pub fn primitive(p: Primitive) -> Self {
        let size = p.extent();
        let (lb_pin, ub_pin) = match p {
            Primitive::Lb => (Pin::Sticky, Pin::Absent),
            Primitive::Ub => (Pin::Absent, Pin::Sticky),
            _ => (Pin::Natural, Pin::Natural),
        };
        Self {
            size: p.size(),
            lb: 0,
            ub: size,
            true_lb: 0,
            true_ub: size,
            lb_pin,
            ub_pin,
        }
    }

    pub fn extent(&self) -> i64 {
        self.ub - self.lb
    }

    /// The same data with bounds pinned to `[lb, lb + extent)`.
    pub fn resized(&self, lb: i64, extent: i64) -> TesseraResult<Self> {
        Ok(Self {
            lb,
            ub: arith::add(lb, extent)?,
            lb_pin: Pin::Sticky,
            ub_pin: Pin::Sticky,
            ..*self
        })
    }
}

#[derive(Debug, Default)]
struct Extreme {
    natural: Option<i64>,
    sticky: Option<i64>,
}

impl Extreme {
    fn offer(&mut self, pin: Pin, value: i64, pick: fn(i64, i64) -> i64) {
        let slot = match pin {
            Pin::Natural => &mut self.natural,
            Pin::Sticky => &mut self.sticky,
            Pin::Absent => return,
        };
        *slot = Some(slot.map_or(value, |cur| pick(cur, value)));
    }

    fn resolve(&self) -> (i64, Pin) {
        match (self.sticky, self.natural) {
            (Some(v), _) => (v, Pin::Sticky),
            (None, Some(v)) => (v, Pin::Natural),
            (None, None) => (0, Pin::Absent),
        }
    }
}

/// Folds blocks of an element type placed at byte displacements into the bounds of the
/// enclosing type.
#[derive(Debug, Default)]
pub(crate) struct BoundsBuilder {
    size: usize,
    lb: Extreme,
    ub: Extreme,
    true_lb: Option<i64>,
    true_ub: Option<i64>,
}

impl BoundsBuilder {
    /// Add `count` consecutive copies of `elem` starting at byte `disp`.
    pub fn block(&mut self, disp: i64, count: usize, elem: &Bounds) -> TesseraResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.size = self
            .size
            .checked_add(arith::bytes(count, elem.size)?)
            .ok_or_else(|| tessera_err!("type size overflows"))?;

        let last = arith::scale(count - 1, elem.extent())?;
        let lo = arith::add(disp, last.min(0))?;
        let hi = arith::add(disp, last.max(0))?;
        self.lb.offer(elem.lb_pin, arith::add(lo, elem.lb)?, i64::min);
        self.ub.offer(elem.ub_pin, arith::add(hi, elem.ub)?, i64::max);

        if elem.size > 0 {
            let true_lo = arith::add(lo, elem.true_lb)?;
            let true_hi = arith::add(hi, elem.true_ub)?;
            self.true_lb = Some(self.true_lb.map_or(true_lo, |v| v.min(true_lo)));
            self.true_ub = Some(self.true_ub.map_or(true_hi, |v| v.max(true_hi)));
        }
        Ok(())
    }

    pub fn finish(self) -> Bounds {
        let (lb, lb_pin) = self.lb.resolve();
        let (ub, ub_pin) = self.ub.resolve();
        // An absent bound collapses onto the present one so the extent stays zero.
        let (lb, ub) = match (lb_pin, ub_pin) {
            (Pin::Absent, Pin::Absent) => (0, 0),
            (Pin::Absent, _) => (ub, ub),
            (_, Pin::Absent) => (lb, lb),
            _ => (lb, ub),
        };
        Bounds {
            size: self.size,
            lb,
            ub,
            true_lb: self.true_lb.unwrap_or(lb),
            true_ub: self.true_ub.unwrap_or(lb),
            lb_pin,
            ub_pin,
        }
    }
}
