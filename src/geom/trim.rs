//! Trimming loops in parameter space.
//!
//! A [`TrimRegion`] is one outer loop plus optional holes. Faceting cuts the
//! grid cells the loops pass through and keeps only their inside part.

use std::fmt;

use super::core::Tolerance;
use super::param::{ParBox, ParPos};

#[derive(Debug, Clone, PartialEq)]
pub enum TrimError {
    NonFinitePoints,
    InsufficientPoints { count: usize },
    /// A hole's bounds are not inside the outer loop's bounds.
    HoleOutsideBoundary { hole: usize },
}

impl fmt::Display for TrimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonFinitePoints => write!(f, "trim loop points must be finite"),
            Self::InsufficientPoints { count } => {
                write!(f, "trim loop needs at least 3 distinct points, got {count}")
            }
            Self::HoleOutsideBoundary { hole } => {
                write!(f, "trim hole {hole} is not inside the outer loop")
            }
        }
    }
}

impl std::error::Error for TrimError {}

/// Closed polygon in parameter space. The closing point is implicit.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimLoop {
    points: Vec<ParPos>,
}

impl TrimLoop {
    /// Builds a loop, dropping consecutive duplicates and an explicit closing
    /// point.
    pub fn new(points: Vec<ParPos>) -> Result<Self, TrimError> {
        if points.iter().any(|p| !p.u.is_finite() || !p.v.is_finite()) {
            return Err(TrimError::NonFinitePoints);
        }
        let tol = Tolerance::PARAM.eps;
        let mut cleaned: Vec<ParPos> = Vec::with_capacity(points.len());
        for p in points {
            if cleaned.last().is_none_or(|q| q.distance_to(p) > tol) {
                cleaned.push(p);
            }
        }
        while cleaned.len() > 1 && cleaned[0].distance_to(cleaned[cleaned.len() - 1]) <= tol {
            cleaned.pop();
        }
        if cleaned.len() < 3 {
            return Err(TrimError::InsufficientPoints { count: cleaned.len() });
        }
        Ok(Self { points: cleaned })
    }

    /// Axis-aligned rectangle, counter-clockwise.
    #[must_use]
    pub fn rectangle(b: &ParBox) -> Self {
        let (lo, hi) = (b.low(), b.high());
        Self {
            points: vec![
                lo,
                ParPos::new(hi.u, lo.v),
                hi,
                ParPos::new(lo.u, hi.v),
            ],
        }
    }

    #[must_use]
    pub fn points(&self) -> &[ParPos] {
        &self.points
    }

    #[must_use]
    pub fn bounds(&self) -> ParBox {
        self.points
            .iter()
            .fold(ParBox::EMPTY, |b, &p| b.union_point(p))
    }

    /// Shoelace area; positive for counter-clockwise loops.
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        let twice: f64 = (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                a.u * b.v - b.u * a.v
            })
            .sum();
        0.5 * twice
    }

    /// Crossing-number containment. Points within `tol` of an edge count as
    /// inside.
    #[must_use]
    pub fn contains(&self, p: ParPos, tol: Tolerance) -> bool {
        let n = self.points.len();
        let mut inside = false;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            if distance_to_segment(p, a, b) <= tol.eps {
                return true;
            }
            if (a.v > p.v) != (b.v > p.v) {
                let t = (p.v - a.v) / (b.v - a.v);
                if p.u < a.u + t * (b.u - a.u) {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

fn distance_to_segment(p: ParPos, a: ParPos, b: ParPos) -> f64 {
    let ab = a.vector_to(b);
    let len2 = ab.dot(ab);
    if len2 <= 0.0 {
        return p.distance_to(a);
    }
    let t = (a.vector_to(p).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance_to(a.offset(ab.scale(t)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimRegion {
    outer: TrimLoop,
    holes: Vec<TrimLoop>,
}

impl TrimRegion {
    pub fn new(outer: TrimLoop, holes: Vec<TrimLoop>) -> Result<Self, TrimError> {
        let bounds = outer.bounds();
        for (i, hole) in holes.iter().enumerate() {
            let hb = hole.bounds();
            let inside = bounds.contains(hb.low(), Tolerance::PARAM)
                && bounds.contains(hb.high(), Tolerance::PARAM);
            if !inside {
                return Err(TrimError::HoleOutsideBoundary { hole: i });
            }
        }
        Ok(Self { outer, holes })
    }

    #[must_use]
    pub fn outer(&self) -> &TrimLoop {
        &self.outer
    }

    #[must_use]
    pub fn holes(&self) -> &[TrimLoop] {
        &self.holes
    }

    #[must_use]
    pub fn bounds(&self) -> ParBox {
        self.outer.bounds()
    }

    /// Inside the outer loop and strictly outside every hole.
    #[must_use]
    pub fn contains(&self, p: ParPos, tol: Tolerance) -> bool {
        self.outer.contains(p, tol)
            && !self
                .holes
                .iter()
                .any(|h| h.contains(p, Tolerance::new(-tol.eps)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Interval;

    fn square(lo: f64, hi: f64) -> TrimLoop {
        TrimLoop::rectangle(&ParBox::new(Interval::new(lo, hi), Interval::new(lo, hi)))
    }

    #[test]
    fn closing_point_is_dropped() {
        let l = TrimLoop::new(vec![
            ParPos::new(0.0, 0.0),
            ParPos::new(1.0, 0.0),
            ParPos::new(1.0, 1.0),
            ParPos::new(0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(l.points().len(), 3);
        assert!((l.signed_area() - 0.5).abs() < 1e-15);
    }

    #[test]
    fn too_few_points_rejected() {
        let points = vec![ParPos::new(0.0, 0.0), ParPos::new(0.0, 0.0), ParPos::new(1.0, 0.0)];
        let err = TrimLoop::new(points);
        assert_eq!(err, Err(TrimError::InsufficientPoints { count: 2 }));
    }

    #[test]
    fn region_with_hole() {
        let region = TrimRegion::new(square(0.0, 1.0), vec![square(0.4, 0.6)]).unwrap();
        let tol = Tolerance::PARAM;
        assert!(region.contains(ParPos::new(0.1, 0.1), tol));
        assert!(!region.contains(ParPos::new(0.5, 0.5), tol));
        assert!(!region.contains(ParPos::new(1.5, 0.5), tol));
        assert!(region.contains(ParPos::new(1.0, 0.5), tol));
    }

    #[test]
    fn hole_outside_is_rejected() {
        let err = TrimRegion::new(square(0.0, 1.0), vec![square(0.8, 1.4)]);
        assert_eq!(err, Err(TrimError::HoleOutsideBoundary { hole: 0 }));
    }
}
