//! Ladders: 1-D partitions of one parametric direction into rungs.
//!
//! A ladder lives in the local frame of its [`ParTransform`]: altitudes are
//! the first local coordinate, the cross parameter along a rung is the
//! second. A ladder with `count` intervals has `count + 1` rung altitudes,
//! the first and last equal to the ends of its range.
//!
//! A ladder whose range has collapsed keeps a single interval of zero
//! length. [`Ladder::is_degenerate`] reports it; callers treat it as "no
//! subdivision needed".

use crate::geom::{Interval, ParPos, ParTransform, ParamArray, ParamAxis, Tolerance};

use super::error::FacetError;

/// How the rungs of a ladder are placed.
#[derive(Debug, Clone, PartialEq)]
pub enum LadderKind {
    /// `altitude(i) = low + i * step`.
    Uniform { step: f64 },
    /// Explicit, strictly ascending altitudes; `count + 1` of them.
    NonUniform { altitudes: ParamArray },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ladder<'t> {
    direction: ParamAxis,
    transform: &'t ParTransform,
    range: Interval,
    count: usize,
    kind: LadderKind,
}

/// Local altitude of application parameter `t` along `direction`.
fn local_altitude(transform: &ParTransform, direction: ParamAxis, t: f64) -> f64 {
    let p = match direction {
        ParamAxis::U => ParPos::new(t, 0.0),
        ParamAxis::V => ParPos::new(0.0, t),
    };
    transform.forward(p).u
}

fn check_direction(transform: &ParTransform, direction: ParamAxis) -> Result<(), FacetError> {
    let found = transform.altitude_direction();
    if found != direction {
        return Err(FacetError::TransformDirection {
            expected: direction.name(),
            found: found.name(),
        });
    }
    Ok(())
}

fn validate_altitudes(altitudes: &[f64]) -> Result<(), FacetError> {
    if altitudes.len() < 2 || altitudes.iter().any(|a| !a.is_finite()) {
        return Err(FacetError::EmptyAltitudes {
            count: altitudes.iter().filter(|a| a.is_finite()).count(),
        });
    }
    let tol = Tolerance::PARAM.eps;
    if let Some(index) = altitudes.windows(2).position(|w| w[1] - w[0] <= tol) {
        return Err(FacetError::NonAscendingAltitudes { index: index + 1 });
    }
    Ok(())
}

impl<'t> Ladder<'t> {
    /// Uniform ladder over the application-space `range` along `direction`.
    ///
    /// A collapsed range gives the degenerate single-rung ladder regardless
    /// of `count`.
    pub fn uniform(
        transform: &'t ParTransform,
        direction: ParamAxis,
        range: &Interval,
        count: usize,
    ) -> Result<Self, FacetError> {
        check_direction(transform, direction)?;
        let a = local_altitude(transform, direction, range.low());
        let b = local_altitude(transform, direction, range.high());
        let local = if range.is_empty() { Interval::point(0.0) } else { Interval::new(a, b) };
        let mut ladder = Self {
            direction,
            transform,
            range: local,
            count: 1,
            kind: LadderKind::Uniform { step: 0.0 },
        };
        ladder.reset_uniform(count);
        Ok(ladder)
    }

    /// Single rung at application parameter `at`.
    pub fn degenerate(
        transform: &'t ParTransform,
        direction: ParamAxis,
        at: f64,
    ) -> Result<Self, FacetError> {
        Self::uniform(transform, direction, &Interval::point(at), 1)
    }

    /// Non-uniform ladder from explicit application-space parameters, which
    /// may be given in either order.
    pub fn from_params(
        transform: &'t ParTransform,
        direction: ParamAxis,
        params: &[f64],
    ) -> Result<Self, FacetError> {
        check_direction(transform, direction)?;
        let mut altitudes: Vec<f64> = params
            .iter()
            .map(|&t| local_altitude(transform, direction, t))
            .collect();
        altitudes.sort_by(f64::total_cmp);
        validate_altitudes(&altitudes)?;
        let range = Interval::new(altitudes[0], altitudes[altitudes.len() - 1]);
        Ok(Self {
            direction,
            transform,
            range,
            count: altitudes.len() - 1,
            kind: LadderKind::NonUniform {
                altitudes: ParamArray::from_values(altitudes, Tolerance::PARAM),
            },
        })
    }

    #[must_use]
    pub const fn direction(&self) -> ParamAxis {
        self.direction
    }

    #[must_use]
    pub const fn transform(&self) -> &'t ParTransform {
        self.transform
    }

    /// Local altitude range.
    #[must_use]
    pub const fn range(&self) -> Interval {
        self.range
    }

    /// Number of rung intervals.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn kind(&self) -> &LadderKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_uniform(&self) -> bool {
        matches!(self.kind, LadderKind::Uniform { .. })
    }

    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.range.is_degenerate(Tolerance::PARAM)
    }

    /// Uniform step in local altitude; `None` for non-uniform ladders.
    #[must_use]
    pub const fn step(&self) -> Option<f64> {
        match self.kind {
            LadderKind::Uniform { step } => Some(step),
            LadderKind::NonUniform { .. } => None,
        }
    }

    /// Altitude of rung `i`, `0 <= i <= count`.
    #[must_use]
    pub fn altitude_at(&self, i: usize) -> Option<f64> {
        if i > self.count {
            return None;
        }
        match &self.kind {
            LadderKind::Uniform { step } => {
                if i == self.count {
                    Some(self.range.high())
                } else {
                    Some(self.range.low() + *step * i as f64)
                }
            }
            LadderKind::NonUniform { altitudes } => altitudes.get(i),
        }
    }

    /// All `count + 1` altitudes, ascending.
    #[must_use]
    pub fn altitudes(&self) -> Vec<f64> {
        (0..=self.count).filter_map(|i| self.altitude_at(i)).collect()
    }

    /// Application-space parameter of rung `i` along the ladder direction.
    #[must_use]
    pub fn param_at(&self, i: usize) -> Option<f64> {
        let alt = self.altitude_at(i)?;
        Some(self.direction.of(self.transform.invert(ParPos::new(alt, 0.0))))
    }

    /// Application-space rung parameters, ascending.
    #[must_use]
    pub fn params(&self) -> Vec<f64> {
        let mut params: Vec<f64> = (0..=self.count).filter_map(|i| self.param_at(i)).collect();
        params.sort_by(f64::total_cmp);
        params
    }

    /// Application-space point on rung `i` at local cross parameter `cross`.
    #[must_use]
    pub fn rung_point(&self, i: usize, cross: f64) -> Option<ParPos> {
        let alt = self.altitude_at(i)?;
        Some(self.transform.invert(ParPos::new(alt, cross)))
    }

    /// Smallest rung span `(i0, i1)` whose altitudes bracket `local`
    /// (clipped to the ladder range); `None` when they do not overlap.
    #[must_use]
    pub fn select_range(&self, local: &Interval) -> Option<(usize, usize)> {
        let tol = Tolerance::PARAM;
        if local.is_empty()
            || local.high() < self.range.low() - tol.eps
            || local.low() > self.range.high() + tol.eps
        {
            return None;
        }
        let lo = local.low().max(self.range.low());
        let hi = local.high().min(self.range.high());
        let mut i0 = 0;
        for i in 0..=self.count {
            match self.altitude_at(i) {
                Some(a) if a <= lo + tol.eps => i0 = i,
                _ => break,
            }
        }
        let mut i1 = self.count;
        for i in (0..=self.count).rev() {
            match self.altitude_at(i) {
                Some(a) if a >= hi - tol.eps => i1 = i,
                _ => break,
            }
        }
        Some((i0.min(i1), i1.max(i0)))
    }

    /// [`Self::select_range`] for an application-space interval. The indices
    /// refer to [`Self::params`], which is ascending in application space.
    #[must_use]
    pub fn select_params(&self, params: &Interval) -> Option<(usize, usize)> {
        if params.is_empty() {
            return None;
        }
        let a = local_altitude(self.transform, self.direction, params.low());
        let b = local_altitude(self.transform, self.direction, params.high());
        let (i0, i1) = self.select_range(&Interval::new(a, b))?;
        let ends = (self.param_at(0), self.param_at(self.count));
        let descending = matches!(ends, (Some(p0), Some(pn)) if p0 > pn);
        if descending {
            Some((self.count - i1, self.count - i0))
        } else {
            Some((i0, i1))
        }
    }

    /// Re-derives a uniform step for `count` intervals, dropping any explicit
    /// altitudes. A degenerate ladder stays at one interval.
    pub fn reset_uniform(&mut self, count: usize) {
        let count = if self.is_degenerate() { 1 } else { count.max(1) };
        let step = if self.is_degenerate() {
            0.0
        } else {
            self.range.length() / count as f64
        };
        self.count = count;
        self.kind = LadderKind::Uniform { step };
    }

    /// Replaces the rungs with explicit local altitudes. The range becomes
    /// `[first, last]`.
    pub fn reset_altitudes(&mut self, altitudes: Vec<f64>) -> Result<(), FacetError> {
        validate_altitudes(&altitudes)?;
        self.range = Interval::new(altitudes[0], altitudes[altitudes.len() - 1]);
        self.count = altitudes.len() - 1;
        self.kind = LadderKind::NonUniform {
            altitudes: ParamArray::from_values(altitudes, Tolerance::PARAM),
        };
        Ok(())
    }

    /// Application-space interval spanned by the rungs.
    #[must_use]
    pub fn param_range(&self) -> Interval {
        match (self.param_at(0), self.param_at(self.count)) {
            (Some(a), Some(b)) => Interval::new(a, b),
            _ => Interval::EMPTY,
        }
    }

    /// Replaces the rungs with explicit application-space parameters, given
    /// in either order. The outermost two are pinned to the current
    /// [`Self::param_range`], so the ladder keeps spanning the same edge.
    pub fn reset_params(&mut self, params: &[f64]) -> Result<(), FacetError> {
        let span = self.param_range();
        let mut sorted = params.to_vec();
        sorted.sort_by(f64::total_cmp);
        if let Some(first) = sorted.first_mut() {
            *first = span.low();
        }
        if let Some(last) = sorted.last_mut() {
            *last = span.high();
        }
        let mut altitudes: Vec<f64> = sorted
            .iter()
            .map(|&t| local_altitude(self.transform, self.direction, t))
            .collect();
        altitudes.sort_by(f64::total_cmp);
        self.reset_altitudes(altitudes)
    }

    /// Converts a uniform ladder to the equivalent explicit form. A
    /// degenerate or already non-uniform ladder is left alone.
    pub fn promote_to_variable(&mut self) {
        if self.is_uniform() && !self.is_degenerate() {
            let altitudes = self.altitudes();
            self.kind = LadderKind::NonUniform {
                altitudes: ParamArray::from_values(altitudes, Tolerance::PARAM),
            };
        }
    }

    /// Raises the interval count to `count`, keeping every existing rung.
    ///
    /// Uniform ladders are re-stepped when `count` is a multiple of the
    /// current count; otherwise they are promoted first. Explicit ladders
    /// gain rungs by bisecting their widest gaps.
    pub fn refine_to(&mut self, count: usize) {
        if count <= self.count || self.is_degenerate() {
            return;
        }
        if self.is_uniform() && count % self.count == 0 {
            self.reset_uniform(count);
            return;
        }
        self.promote_to_variable();
        let mut altitudes = self.altitudes();
        while altitudes.len() < count + 1 {
            let widest = altitudes
                .windows(2)
                .enumerate()
                .max_by(|(_, a), (_, b)| (a[1] - a[0]).total_cmp(&(b[1] - b[0])))
                .map(|(i, _)| i);
            let Some(i) = widest else { break };
            let mid = 0.5 * (altitudes[i] + altitudes[i + 1]);
            if mid - altitudes[i] <= Tolerance::PARAM.eps {
                break;
            }
            altitudes.insert(i + 1, mid);
        }
        self.count = altitudes.len() - 1;
        self.kind = LadderKind::NonUniform {
            altitudes: ParamArray::from_values(altitudes, Tolerance::PARAM),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_covers_range_exactly() {
        let t = ParTransform::Identity;
        let ladder = Ladder::uniform(&t, ParamAxis::U, &Interval::new(0.0, 1.0), 3).unwrap();
        let alts = ladder.altitudes();
        assert_eq!(alts.len(), 4);
        assert_eq!(alts[0], 0.0);
        assert_eq!(alts[3], 1.0);
        assert_eq!(ladder.altitude_at(4), None);
    }

    #[test]
    fn flipped_ladder_reports_ascending_params() {
        let t = ParTransform::FlipU;
        let ladder = Ladder::uniform(&t, ParamAxis::U, &Interval::new(2.0, 4.0), 4).unwrap();
        assert_eq!(ladder.range(), Interval::new(-4.0, -2.0));
        assert_eq!(ladder.params(), vec![2.0, 2.5, 3.0, 3.5, 4.0]);
        assert_eq!(ladder.rung_point(0, 0.25), Some(ParPos::new(4.0, 0.25)));
    }

    #[test]
    fn wrong_transform_direction_is_rejected() {
        let t = ParTransform::Swap;
        let err = Ladder::uniform(&t, ParamAxis::U, &Interval::new(0.0, 1.0), 2).unwrap_err();
        assert_eq!(err, FacetError::TransformDirection { expected: "u", found: "v" });
    }

    #[test]
    fn reset_altitudes_validates_order() {
        let t = ParTransform::Identity;
        let mut ladder = Ladder::uniform(&t, ParamAxis::U, &Interval::new(0.0, 1.0), 2).unwrap();
        assert_eq!(
            ladder.reset_altitudes(vec![0.0, 0.5, 0.5, 1.0]),
            Err(FacetError::NonAscendingAltitudes { index: 2 })
        );
        assert_eq!(ladder.reset_altitudes(vec![0.0]), Err(FacetError::EmptyAltitudes { count: 1 }));
        ladder.reset_altitudes(vec![0.0, 0.1, 1.0]).unwrap();
        assert_eq!(ladder.count(), 2);
        assert!(!ladder.is_uniform());
    }

    #[test]
    fn refine_keeps_existing_rungs() {
        let t = ParTransform::Identity;
        let mut ladder = Ladder::from_params(&t, ParamAxis::U, &[0.0, 0.1, 1.0]).unwrap();
        ladder.refine_to(5);
        assert_eq!(ladder.count(), 5);
        let alts = ladder.altitudes();
        for old in [0.0, 0.1, 1.0] {
            assert!(alts.iter().any(|&a| a == old));
        }
        assert!(alts.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn reset_params_pins_the_ends() {
        let t = ParTransform::FlipU;
        let mut ladder = Ladder::uniform(&t, ParamAxis::U, &Interval::new(2.0, 4.0), 2).unwrap();
        ladder.reset_params(&[3.5, 2.0 + 1e-13, 2.4, 4.0 - 1e-13]).unwrap();
        assert_eq!(ladder.params(), vec![2.0, 2.4, 3.5, 4.0]);
        assert_eq!(ladder.range(), Interval::new(-4.0, -2.0));
    }

    #[test]
    fn select_range_brackets() {
        let t = ParTransform::Identity;
        let ladder = Ladder::uniform(&t, ParamAxis::U, &Interval::new(0.0, 1.0), 10).unwrap();
        assert_eq!(ladder.select_range(&Interval::new(0.25, 0.61)), Some((2, 7)));
        assert_eq!(ladder.select_range(&Interval::new(0.3, 0.6)), Some((3, 6)));
        assert_eq!(ladder.select_range(&Interval::new(2.0, 3.0)), None);
    }
}
