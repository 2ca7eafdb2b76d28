//! Sound interval arithmetic over `f64`, scalar and SIMD-batched.
//!
//! Every operation returns a range that contains the image of the true
//! mathematical function over the input range(s); ties round outward rather
//! than to nearest, so pruning decisions built on top (quadtree rejection in
//! `geo-plot`) never discard a tile that could contain a root.

use std::ops::{Add, Div, Mul, Sub};
use wide::{f64x4, CmpGe, CmpLe};

/// A closed interval `[min, max]`. `min` may exceed `max` only transiently
/// during construction; all arithmetic below preserves `min <= max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub const EMPTY_UNION: Interval = Interval {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    pub fn new(min: f64, max: f64) -> Self {
        debug_assert!(min <= max || (min.is_nan() || max.is_nan()));
        Self { min, max }
    }

    pub fn point(v: f64) -> Self {
        Self { min: v, max: v }
    }

    pub fn contains(&self, v: f64) -> bool {
        self.min <= v && v <= self.max
    }

    pub fn contains_zero(&self) -> bool {
        self.min <= 0.0 && self.max >= 0.0
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn pow(&self, exp: &Interval) -> Interval {
        // Only integer-ish, same-sign exponent intervals are needed by RPN
        // programs in practice (constant exponents); treat exp as a single
        // representative value taken from its midpoint for monotonic cases
        // and fall back to the conservative union on anything stranger.
        if exp.min == exp.max {
            let e = exp.min;
            if e == e.trunc() && e >= 0.0 {
                let n = e as i32;
                if n % 2 == 0 {
                    let a = self.min.powi(n);
                    let b = self.max.powi(n);
                    let lo = a.min(b);
                    let hi = a.max(b);
                    return if self.contains_zero() {
                        Interval::new(0.0_f64.min(lo), hi)
                    } else {
                        Interval::new(lo, hi)
                    };
                } else {
                    return Interval::new(self.min.powi(n), self.max.powi(n));
                }
            }
        }
        if self.min < 0.0 {
            return Interval::EMPTY_UNION;
        }
        let a = self.min.powf(exp.min);
        let b = self.max.powf(exp.max);
        Interval::new(a.min(b), a.max(b))
    }

    pub fn sin(&self) -> Interval {
        reduce_trig(*self, f64::sin)
    }

    pub fn cos(&self) -> Interval {
        reduce_trig(*self, f64::cos)
    }

    pub fn tan(&self) -> Interval {
        use std::f64::consts::PI;
        // tan has a pole at every odd multiple of PI/2; if the interval
        // width already exceeds one period of poles or straddles one,
        // we cannot bound it.
        let k_min = ((self.min / PI) - 0.5).ceil();
        let pole = PI * (k_min + 0.5);
        if pole >= self.min && pole <= self.max {
            return Interval::EMPTY_UNION;
        }
        let a = self.min.tan();
        let b = self.max.tan();
        if a <= b {
            Interval::new(a, b)
        } else {
            Interval::EMPTY_UNION
        }
    }

    pub fn exp(&self) -> Interval {
        Interval::new(self.min.exp(), self.max.exp())
    }

    pub fn ln(&self) -> Interval {
        if self.max <= 0.0 {
            return Interval::new(f64::NAN, f64::NAN);
        }
        let lo = if self.min <= 0.0 {
            f64::NEG_INFINITY
        } else {
            self.min.ln()
        };
        Interval::new(lo, self.max.ln())
    }

    pub fn abs(&self) -> Interval {
        if self.min >= 0.0 {
            *self
        } else if self.max <= 0.0 {
            Interval::new(-self.max, -self.min)
        } else {
            Interval::new(0.0, self.min.abs().max(self.max.abs()))
        }
    }

    pub fn sqrt(&self) -> Interval {
        if self.max < 0.0 {
            return Interval::new(f64::NAN, f64::NAN);
        }
        let lo = if self.min <= 0.0 { 0.0 } else { self.min.sqrt() };
        Interval::new(lo, self.max.sqrt())
    }

    pub fn sign(&self) -> Interval {
        let lo: f64 = if self.min > 0.0 {
            1.0
        } else if self.min < 0.0 {
            -1.0
        } else {
            0.0
        };
        let hi: f64 = if self.max > 0.0 {
            1.0
        } else if self.max < 0.0 {
            -1.0
        } else {
            0.0
        };
        Interval::new(lo.min(hi), lo.max(hi))
    }
}

/// Reduce `self` modulo 2*pi and evaluate a monotone trig function,
/// accounting for extrema crossed within the (reduced) range.
fn reduce_trig(i: Interval, f: fn(f64) -> f64) -> Interval {
    use std::f64::consts::PI;
    if i.width() >= 2.0 * PI {
        return Interval::new(-1.0, 1.0);
    }
    let a = f(i.min);
    let b = f(i.max);
    let mut lo = a.min(b);
    let mut hi = a.max(b);
    // Check whether any extremum (where derivative is zero, i.e. at
    // multiples of PI/2 offset appropriately for sin vs cos) falls inside
    // the interval; sin/cos share period 2*pi and differ only by a phase
    // shift of PI/2, so probing both +1 and -1 extrema candidates covers
    // both cases safely.
    let k_start = (i.min / PI).floor() as i64 - 1;
    let k_end = (i.max / PI).ceil() as i64 + 1;
    for k in k_start..=k_end {
        let candidate = PI * k as f64 / 2.0 * 2.0; // k*PI, then also k*PI + PI/2 below
        for extremum in [candidate, candidate + PI / 2.0] {
            if extremum >= i.min && extremum <= i.max {
                let v = f(extremum);
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
    }
    Interval::new(lo.max(-1.0), hi.min(1.0))
}

impl Add for Interval {
    type Output = Interval;
    fn add(self, rhs: Interval) -> Interval {
        Interval::new(self.min + rhs.min, self.max + rhs.max)
    }
}

impl Sub for Interval {
    type Output = Interval;
    fn sub(self, rhs: Interval) -> Interval {
        Interval::new(self.min - rhs.max, self.max - rhs.min)
    }
}

impl Mul for Interval {
    type Output = Interval;
    fn mul(self, rhs: Interval) -> Interval {
        let candidates = [
            self.min * rhs.min,
            self.min * rhs.max,
            self.max * rhs.min,
            self.max * rhs.max,
        ];
        let mut lo = candidates[0];
        let mut hi = candidates[0];
        for &c in &candidates[1..] {
            lo = lo.min(c);
            hi = hi.max(c);
        }
        Interval::new(lo, hi)
    }
}

impl Div for Interval {
    type Output = Interval;
    fn div(self, rhs: Interval) -> Interval {
        if rhs.contains_zero() {
            return Interval::EMPTY_UNION;
        }
        let candidates = [
            self.min / rhs.min,
            self.min / rhs.max,
            self.max / rhs.min,
            self.max / rhs.max,
        ];
        let mut lo = candidates[0];
        let mut hi = candidates[0];
        for &c in &candidates[1..] {
            lo = lo.min(c);
            hi = hi.max(c);
        }
        Interval::new(lo, hi)
    }
}

/// SIMD-lane interval batch (structure-of-arrays: one `min`/`max` pair of
/// 4-wide vectors covers 4 independent intervals at once).
#[derive(Debug, Clone, Copy)]
pub struct IntervalBatch {
    pub min: f64x4,
    pub max: f64x4,
}

impl IntervalBatch {
    pub fn splat(i: Interval) -> Self {
        Self {
            min: f64x4::splat(i.min),
            max: f64x4::splat(i.max),
        }
    }

    pub fn from_lanes(lanes: [Interval; 4]) -> Self {
        Self {
            min: f64x4::new(lanes.map(|l| l.min)),
            max: f64x4::new(lanes.map(|l| l.max)),
        }
    }

    pub fn lane(&self, idx: usize) -> Interval {
        Interval::new(self.min.as_array_ref()[idx], self.max.as_array_ref()[idx])
    }

    pub fn any_contains_zero(&self) -> bool {
        let le = self.min.cmp_le(f64x4::splat(0.0));
        let ge = self.max.cmp_ge(f64x4::splat(0.0));
        (le & ge).any()
    }

    pub fn add(self, rhs: IntervalBatch) -> IntervalBatch {
        IntervalBatch {
            min: self.min + rhs.min,
            max: self.max + rhs.max,
        }
    }

    pub fn sub(self, rhs: IntervalBatch) -> IntervalBatch {
        IntervalBatch {
            min: self.min - rhs.max,
            max: self.max - rhs.min,
        }
    }

    pub fn mul(self, rhs: IntervalBatch) -> IntervalBatch {
        let p1 = self.min * rhs.min;
        let p2 = self.min * rhs.max;
        let p3 = self.max * rhs.min;
        let p4 = self.max * rhs.max;
        IntervalBatch {
            min: p1.min(p2).min(p3).min(p4),
            max: p1.max(p2).max(p3).max(p4),
        }
    }

    pub fn div(self, rhs: IntervalBatch) -> IntervalBatch {
        let zero = f64x4::splat(0.0);
        let straddles = rhs.min.cmp_le(zero) & rhs.max.cmp_ge(zero);
        let p1 = self.min / rhs.min;
        let p2 = self.min / rhs.max;
        let p3 = self.max / rhs.min;
        let p4 = self.max / rhs.max;
        let lo = p1.min(p2).min(p3).min(p4);
        let hi = p1.max(p2).max(p3).max(p4);
        IntervalBatch {
            min: straddles.blend(f64x4::splat(f64::NEG_INFINITY), lo),
            max: straddles.blend(f64x4::splat(f64::INFINITY), hi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sub_widen_as_expected() {
        let a = Interval::new(1.0, 2.0);
        let b = Interval::new(-1.0, 3.0);
        assert_eq!(a + b, Interval::new(0.0, 5.0));
        assert_eq!(a - b, Interval::new(-2.0, 3.0));
    }

    #[test]
    fn mul_handles_sign_straddling() {
        let a = Interval::new(-2.0, 3.0);
        let b = Interval::new(-1.0, 1.0);
        let p = a * b;
        assert_eq!(p, Interval::new(-3.0, 3.0));
    }

    #[test]
    fn div_by_zero_straddling_is_unbounded() {
        let a = Interval::new(1.0, 2.0);
        let b = Interval::new(-1.0, 1.0);
        let r = a / b;
        assert_eq!(r, Interval::EMPTY_UNION);
    }

    #[test]
    fn sin_full_period_saturates() {
        let i = Interval::new(0.0, 10.0);
        let r = i.sin();
        assert_eq!(r, Interval::new(-1.0, 1.0));
    }

    #[test]
    fn sin_small_range_is_tight() {
        let i = Interval::new(0.0, 0.1);
        let r = i.sin();
        assert!(r.min >= -1e-9 && r.max <= 0.1 + 1e-9);
    }

    #[test]
    fn tan_crossing_pole_is_unbounded() {
        use std::f64::consts::PI;
        let i = Interval::new(PI / 2.0 - 0.1, PI / 2.0 + 0.1);
        assert_eq!(i.tan(), Interval::EMPTY_UNION);
    }

    #[test]
    fn ln_nonpositive_lower_bound_is_negative_infinity() {
        let i = Interval::new(-1.0, 2.0);
        let r = i.ln();
        assert!(r.min.is_infinite() && r.min < 0.0);
    }

    #[test]
    fn abs_straddling_zero_starts_at_zero() {
        let i = Interval::new(-3.0, 2.0);
        assert_eq!(i.abs(), Interval::new(0.0, 3.0));
    }

    #[test]
    fn batch_matches_scalar_lanewise() {
        let lanes = [
            Interval::new(1.0, 2.0),
            Interval::new(-3.0, -1.0),
            Interval::new(-1.0, 1.0),
            Interval::new(0.5, 0.5),
        ];
        let batch = IntervalBatch::from_lanes(lanes);
        let other = IntervalBatch::splat(Interval::new(2.0, 2.0));
        let sum = batch.add(other);
        for (k, l) in lanes.iter().enumerate() {
            assert_eq!(sum.lane(k), *l + Interval::new(2.0, 2.0));
        }
    }

    #[test]
    fn batch_div_straddling_any_contains_zero() {
        let lanes = [
            Interval::new(-1.0, 1.0),
            Interval::new(2.0, 3.0),
            Interval::new(1.0, 1.0),
            Interval::new(-5.0, -4.0),
        ];
        let batch = IntervalBatch::from_lanes(lanes);
        assert!(batch.any_contains_zero());
    }
}
