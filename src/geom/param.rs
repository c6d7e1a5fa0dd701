//! Parameter-space primitives: intervals, 2-D positions/vectors/directions and
//! boxes.
//!
//! Everything here is a small `Copy` value. Intervals and boxes only ever grow
//! through `union`; an empty interval is a distinct state rather than an
//! inverted pair of bounds.

use serde::{Deserialize, Serialize};

use super::core::Tolerance;

// ─────────────────────────────────────────────────────────────────────────────
// Interval
// ─────────────────────────────────────────────────────────────────────────────

/// Closed 1-D interval `[low, high]`, or the empty interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    low: f64,
    high: f64,
    empty: bool,
}

impl Interval {
    pub const EMPTY: Self = Self {
        low: 0.0,
        high: 0.0,
        empty: true,
    };

    /// Interval spanning `a` and `b` in either order. Non-finite bounds give
    /// the empty interval.
    #[must_use]
    pub fn new(a: f64, b: f64) -> Self {
        if !a.is_finite() || !b.is_finite() {
            return Self::EMPTY;
        }
        Self {
            low: a.min(b),
            high: a.max(b),
            empty: false,
        }
    }

    #[must_use]
    pub fn point(x: f64) -> Self {
        Self::new(x, x)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.empty
    }

    #[must_use]
    pub const fn low(&self) -> f64 {
        self.low
    }

    #[must_use]
    pub const fn high(&self) -> f64 {
        self.high
    }

    /// Zero for an empty interval.
    #[must_use]
    pub fn length(&self) -> f64 {
        if self.empty { 0.0 } else { self.high - self.low }
    }

    #[must_use]
    pub fn mid(&self) -> f64 {
        0.5 * (self.low + self.high)
    }

    /// `low + t * length`.
    #[must_use]
    pub fn lerp(&self, t: f64) -> f64 {
        self.low + (self.high - self.low) * t
    }

    /// Inverse of [`Self::lerp`]; zero for a degenerate interval.
    #[must_use]
    pub fn normalize(&self, x: f64) -> f64 {
        let len = self.length();
        if len > 0.0 { (x - self.low) / len } else { 0.0 }
    }

    #[must_use]
    pub fn clamp(&self, x: f64) -> f64 {
        if self.empty { x } else { x.clamp(self.low, self.high) }
    }

    #[must_use]
    pub fn contains(&self, x: f64, tol: Tolerance) -> bool {
        !self.empty && x >= self.low - tol.eps && x <= self.high + tol.eps
    }

    /// True for empty intervals and intervals no longer than `tol`.
    #[must_use]
    pub fn is_degenerate(&self, tol: Tolerance) -> bool {
        self.empty || tol.is_zero_length(self.length())
    }

    /// Smallest interval enclosing both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        match (self.empty, other.empty) {
            (true, _) => *other,
            (_, true) => *self,
            _ => Self {
                low: self.low.min(other.low),
                high: self.high.max(other.high),
                empty: false,
            },
        }
    }

    #[must_use]
    pub fn union_value(&self, x: f64) -> Self {
        self.union(&Self::point(x))
    }

    /// Overlap of two intervals; empty when disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        if self.empty || other.empty {
            return Self::EMPTY;
        }
        let low = self.low.max(other.low);
        let high = self.high.min(other.high);
        if low > high { Self::EMPTY } else { Self::new(low, high) }
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self::EMPTY
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ParPos / ParVec / ParDir
// ─────────────────────────────────────────────────────────────────────────────

/// A point in (u, v) parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParPos {
    pub u: f64,
    pub v: f64,
}

impl ParPos {
    #[must_use]
    pub const fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }

    #[must_use]
    pub const fn offset(self, d: ParVec) -> Self {
        Self::new(self.u + d.du, self.v + d.dv)
    }

    #[must_use]
    pub const fn vector_to(self, other: Self) -> ParVec {
        ParVec::new(other.u - self.u, other.v - self.v)
    }

    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        Self::new(0.5 * (self.u + other.u), 0.5 * (self.v + other.v))
    }

    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        self.vector_to(other).length()
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 2] {
        [self.u, self.v]
    }
}

/// A free vector in parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParVec {
    pub du: f64,
    pub dv: f64,
}

impl ParVec {
    #[must_use]
    pub const fn new(du: f64, dv: f64) -> Self {
        Self { du, dv }
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.du.hypot(self.dv)
    }

    #[must_use]
    pub const fn scale(self, s: f64) -> Self {
        Self::new(self.du * s, self.dv * s)
    }

    #[must_use]
    pub const fn dot(self, other: Self) -> f64 {
        self.du * other.du + self.dv * other.dv
    }
}

/// A unit direction in parameter space.
///
/// Built only through [`ParDir::new`], which refuses zero-length and
/// non-finite input instead of producing an undefined direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParDir {
    du: f64,
    dv: f64,
}

impl ParDir {
    pub const U: Self = Self { du: 1.0, dv: 0.0 };
    pub const V: Self = Self { du: 0.0, dv: 1.0 };

    /// Normalized direction of `vec`, or `None` if `vec` has zero length
    /// (below [`Tolerance::ZERO_LENGTH`]) or a non-finite component.
    #[must_use]
    pub fn new(vec: ParVec) -> Option<Self> {
        let len = vec.length();
        if !len.is_finite() || Tolerance::ZERO_LENGTH.is_zero_length(len) {
            return None;
        }
        Some(Self {
            du: vec.du / len,
            dv: vec.dv / len,
        })
    }

    #[must_use]
    pub const fn du(self) -> f64 {
        self.du
    }

    #[must_use]
    pub const fn dv(self) -> f64 {
        self.dv
    }

    #[must_use]
    pub const fn to_vec(self) -> ParVec {
        ParVec::new(self.du, self.dv)
    }
}

/// One of the two parametric directions of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamAxis {
    U,
    V,
}

impl ParamAxis {
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::U => Self::V,
            Self::V => Self::U,
        }
    }

    /// Coordinate of `p` along this axis.
    #[must_use]
    pub const fn of(self, p: ParPos) -> f64 {
        match self {
            Self::U => p.u,
            Self::V => p.v,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::U => "u",
            Self::V => "v",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ParBox
// ─────────────────────────────────────────────────────────────────────────────

/// Axis-aligned box in parameter space. Empty iff either side is empty.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParBox {
    pub u: Interval,
    pub v: Interval,
}

impl ParBox {
    pub const EMPTY: Self = Self {
        u: Interval::EMPTY,
        v: Interval::EMPTY,
    };

    #[must_use]
    pub const fn new(u: Interval, v: Interval) -> Self {
        Self { u, v }
    }

    #[must_use]
    pub fn from_corners(a: ParPos, b: ParPos) -> Self {
        Self::new(Interval::new(a.u, b.u), Interval::new(a.v, b.v))
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.u.is_empty() || self.v.is_empty()
    }

    #[must_use]
    pub fn low(&self) -> ParPos {
        ParPos::new(self.u.low(), self.v.low())
    }

    #[must_use]
    pub fn high(&self) -> ParPos {
        ParPos::new(self.u.high(), self.v.high())
    }

    #[must_use]
    pub fn center(&self) -> ParPos {
        ParPos::new(self.u.mid(), self.v.mid())
    }

    #[must_use]
    pub fn contains(&self, p: ParPos, tol: Tolerance) -> bool {
        self.u.contains(p.u, tol) && self.v.contains(p.v, tol)
    }

    /// Zero measure: empty, or collapsed in at least one direction.
    #[must_use]
    pub fn is_degenerate(&self, tol: Tolerance) -> bool {
        self.u.is_degenerate(tol) || self.v.is_degenerate(tol)
    }

    /// Smallest box enclosing both. An empty operand is ignored.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::new(self.u.union(&other.u), self.v.union(&other.v))
    }

    #[must_use]
    pub fn union_point(&self, p: ParPos) -> Self {
        self.union(&Self::new(Interval::point(p.u), Interval::point(p.v)))
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self::new(self.u.intersect(&other.u), self.v.intersect(&other.v))
    }

    #[must_use]
    pub const fn along(&self, axis: ParamAxis) -> Interval {
        match axis {
            ParamAxis::U => self.u,
            ParamAxis::V => self.v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_orders_bounds() {
        let i = Interval::new(3.0, -1.0);
        assert_eq!(i.low(), -1.0);
        assert_eq!(i.high(), 3.0);
        assert!((i.length() - 4.0).abs() < 1e-15);
    }

    #[test]
    fn interval_union_grows_only() {
        let a = Interval::new(0.0, 1.0);
        let b = Interval::new(2.0, 3.0);
        let u = a.union(&b);
        assert_eq!((u.low(), u.high()), (0.0, 3.0));
        assert_eq!(a.union(&Interval::EMPTY), a);
        assert_eq!(Interval::EMPTY.union(&b), b);
        assert_eq!(a.union_value(0.5), a);
    }

    #[test]
    fn empty_interval_has_no_members() {
        let e = Interval::EMPTY;
        assert!(e.is_empty());
        assert!(!e.contains(0.0, Tolerance::DEFAULT));
        assert!(e.is_degenerate(Tolerance::DEFAULT));
        assert_eq!(e.length(), 0.0);
        assert!(Interval::new(f64::NAN, 1.0).is_empty());
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = Interval::new(0.0, 1.0);
        assert!(a.intersect(&Interval::new(2.0, 3.0)).is_empty());
        let overlap = a.intersect(&Interval::new(0.5, 3.0));
        assert_eq!((overlap.low(), overlap.high()), (0.5, 1.0));
    }

    #[test]
    fn direction_refuses_zero_vector() {
        assert!(ParDir::new(ParVec::new(0.0, 0.0)).is_none());
        assert!(ParDir::new(ParVec::new(1e-14, 0.0)).is_none());
        assert!(ParDir::new(ParVec::new(f64::INFINITY, 0.0)).is_none());
        let d = ParDir::new(ParVec::new(3.0, 4.0)).unwrap();
        assert!((d.du() - 0.6).abs() < 1e-15);
        assert!((d.dv() - 0.8).abs() < 1e-15);
    }

    #[test]
    fn box_union_is_smallest_enclosing() {
        let a = ParBox::from_corners(ParPos::new(0.0, 0.0), ParPos::new(1.0, 1.0));
        let b = ParBox::from_corners(ParPos::new(2.0, -1.0), ParPos::new(3.0, 0.5));
        let u = a.union(&b);
        assert_eq!(u.low(), ParPos::new(0.0, -1.0));
        assert_eq!(u.high(), ParPos::new(3.0, 1.0));
        assert_eq!(ParBox::EMPTY.union(&a), a);
    }

    #[test]
    fn box_degeneracy() {
        let flat = ParBox::from_corners(ParPos::new(0.0, 1.0), ParPos::new(1.0, 1.0));
        assert!(flat.is_degenerate(Tolerance::PARAM));
        assert!(!flat.is_empty());
        assert!(flat.contains(ParPos::new(0.5, 1.0), Tolerance::PARAM));
    }
}
