//! Dual-ruling reconciliation.
//!
//! Two ladders that must tile the same edge (the two sides of a shared patch
//! boundary, or the u and v ladders of a face when equalization is on) are
//! brought to the same rung count. Counts only ever go up, bounded by the rung
//! ceiling. Mixed representations are resolved by promoting the uniform side
//! to an explicit ladder before either is touched.
//!
//! Along a shared boundary the two faces may parameterize the common edge
//! differently. Rungs are matched through a [`BoundaryCurve`] per side: a
//! chord-length table of the edge in world space. Each rung of one side is
//! carried to the other by arc-length fraction and then snapped onto the
//! nearest point of that side's curve, so both faces place their boundary
//! nodes on the same world points.

use crate::geom::{Interval, Point3, Tolerance};

use super::diagnostics::{QualityWarning, WarningKind};
use super::ladder::Ladder;

/// Arc-length fractions closer than this are the same rung.
const ALIGN_TOLERANCE: Tolerance = Tolerance::new(1e-9);
/// Chords per boundary curve in the arc-length table.
const BOUNDARY_SAMPLES: usize = 128;
/// Bisection steps when inverting the arc-length table.
const INVERSION_STEPS: usize = 60;
/// Ternary-search steps when snapping onto a curve.
const SNAP_STEPS: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// Counts (and distributions, where aligned) already agreed.
    Unchanged,
    /// A ladder gained rungs.
    Raised { from: usize, to: usize },
    /// Counts already agreed; boundary rungs were moved to coincide.
    Aligned { count: usize },
    /// The ceiling kept the ladders apart.
    Capped {
        count_a: usize,
        count_b: usize,
        warning: QualityWarning,
    },
}

impl ReconcileOutcome {
    /// Whether any ladder changed.
    #[must_use]
    pub const fn changed(&self) -> bool {
        matches!(self, Self::Raised { .. } | Self::Aligned { .. })
    }

    #[must_use]
    pub fn into_warning(self) -> Option<QualityWarning> {
        match self {
            Self::Capped { warning, .. } => Some(warning),
            _ => None,
        }
    }
}

fn raise(ladder: &mut Ladder<'_>, to: usize, other_uniform: bool) {
    if ladder.is_uniform() && other_uniform {
        ladder.reset_uniform(to);
    } else {
        ladder.promote_to_variable();
        ladder.refine_to(to);
    }
}

/// Raises the smaller rung count to the larger, up to `ceiling`.
///
/// A degenerate ladder has nothing to tile and is left alone. When the
/// representations differ the uniform ladder is promoted first, so both
/// sides end up explicit.
pub fn reconcile_ladders(
    a: &mut Ladder<'_>,
    b: &mut Ladder<'_>,
    ceiling: usize,
) -> ReconcileOutcome {
    if a.is_degenerate() || b.is_degenerate() {
        return ReconcileOutcome::Unchanged;
    }
    if a.is_uniform() != b.is_uniform() {
        a.promote_to_variable();
        b.promote_to_variable();
    }
    let (count_a, count_b) = (a.count(), b.count());
    if count_a == count_b {
        return ReconcileOutcome::Unchanged;
    }

    let target = count_a.max(count_b).min(ceiling.max(1));
    let both_uniform = a.is_uniform() && b.is_uniform();
    let from = count_a.min(count_b);
    if count_a < target {
        raise(a, target, both_uniform);
    }
    if count_b < target {
        raise(b, target, both_uniform);
    }
    log::debug!("reconcile: {count_a}/{count_b} rungs -> {}/{}", a.count(), b.count());

    if a.count() != b.count() {
        let warning = QualityWarning::new(
            WarningKind::ReconciliationCapped,
            format!(
                "cannot equalize {count_a} and {count_b} rungs under ceiling {ceiling}: {}/{}",
                a.count(),
                b.count()
            ),
        );
        return ReconcileOutcome::Capped {
            count_a: a.count(),
            count_b: b.count(),
            warning,
        };
    }
    if a.count() > from {
        ReconcileOutcome::Raised {
            from,
            to: a.count(),
        }
    } else {
        ReconcileOutcome::Unchanged
    }
}

/// One side of a shared boundary: the world-space edge traced over its
/// ladder's application-space parameter range, with a chord-length table.
pub struct BoundaryCurve<F> {
    eval: F,
    range: Interval,
    params: Vec<f64>,
    points: Vec<Point3>,
    /// Cumulative chord length at each of `params`.
    lengths: Vec<f64>,
}

impl<F: Fn(f64) -> Point3> BoundaryCurve<F> {
    #[must_use]
    pub fn new(range: Interval, eval: F) -> Self {
        let n = if range.is_degenerate(Tolerance::PARAM) { 1 } else { BOUNDARY_SAMPLES };
        let params: Vec<f64> = (0..=n).map(|i| range.lerp(i as f64 / n as f64)).collect();
        let points: Vec<Point3> = params.iter().map(|&t| eval(t)).collect();
        let mut lengths = Vec::with_capacity(points.len());
        let mut total = 0.0;
        lengths.push(total);
        for pair in points.windows(2) {
            total += pair[0].distance_to(pair[1]);
            lengths.push(total);
        }
        Self {
            eval,
            range,
            params,
            points,
            lengths,
        }
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        self.lengths.last().copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn point_at(&self, t: f64) -> Point3 {
        (self.eval)(t)
    }

    /// A side collapsed onto a pole has no arc length to match by.
    fn is_collapsed(&self) -> bool {
        Tolerance::ZERO_LENGTH.is_zero_length(self.length())
    }

    /// Table chord `k` with `params[k] <= t <= params[k + 1]`.
    fn chord_of_param(&self, t: f64) -> usize {
        let last = self.params.len().saturating_sub(2);
        self.params.partition_point(|&p| p <= t).saturating_sub(1).min(last)
    }

    fn length_to(&self, k: usize, t: f64) -> f64 {
        self.lengths[k] + self.points[k].distance_to(self.point_at(t))
    }

    /// Arc-length fraction of parameter `t`, in `[0, 1]`.
    #[must_use]
    pub fn fraction_at(&self, t: f64) -> f64 {
        let t = self.range.clamp(t);
        if self.is_collapsed() {
            return self.range.normalize(t);
        }
        let k = self.chord_of_param(t);
        (self.length_to(k, t) / self.length()).clamp(0.0, 1.0)
    }

    /// Parameter at arc-length fraction `f`.
    #[must_use]
    pub fn param_at_fraction(&self, f: f64) -> f64 {
        let f = f.clamp(0.0, 1.0);
        if self.is_collapsed() {
            return self.range.lerp(f);
        }
        let target = f * self.length();
        let last = self.params.len().saturating_sub(2);
        let k = self.lengths.partition_point(|&l| l <= target).saturating_sub(1).min(last);
        let (mut lo, mut hi) = (self.params[k], self.params[k + 1]);
        for _ in 0..INVERSION_STEPS {
            let mid = 0.5 * (lo + hi);
            if self.length_to(k, mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// Parameter of the point of this curve nearest `target`, searched over
    /// the table chords around `guess`.
    #[must_use]
    pub fn snap(&self, target: Point3, guess: f64) -> f64 {
        if self.is_collapsed() {
            return self.range.clamp(guess);
        }
        let k = self.chord_of_param(self.range.clamp(guess));
        let mut lo = self.params[k.saturating_sub(1)];
        let mut hi = self.params[(k + 2).min(self.params.len() - 1)];
        for _ in 0..SNAP_STEPS {
            let third = (hi - lo) / 3.0;
            let (m1, m2) = (lo + third, hi - third);
            if self.point_at(m1).distance_to(target) <= self.point_at(m2).distance_to(target) {
                hi = m2;
            } else {
                lo = m1;
            }
        }
        0.5 * (lo + hi)
    }
}

/// Which side a boundary rung came from, with its parameter there.
#[derive(Debug, Clone, Copy)]
enum Rung {
    A(f64),
    B(f64),
}

/// Reconciles the two ladders along a shared boundary and moves their rungs
/// so the boundary nodes of both faces land on the same world points.
///
/// `curves` trace the edge on each side over the ladders' parameter ranges.
/// `reversed` means the ladders run in opposite directions along the edge.
/// The aligned distribution is the union of both sides, so neither side
/// loses a rung. Rungs already within `weld` of their partner are left
/// where they are.
pub fn reconcile_shared_boundary<FA, FB>(
    a: &mut Ladder<'_>,
    b: &mut Ladder<'_>,
    curves: (&BoundaryCurve<FA>, &BoundaryCurve<FB>),
    reversed: bool,
    ceiling: usize,
    weld: Tolerance,
) -> ReconcileOutcome
where
    FA: Fn(f64) -> Point3,
    FB: Fn(f64) -> Point3,
{
    let counted = reconcile_ladders(a, b, ceiling);
    let capped = matches!(counted, ReconcileOutcome::Capped { .. });
    if capped || a.is_degenerate() || b.is_degenerate() {
        return counted;
    }
    let (curve_a, curve_b) = curves;
    let along_a = |f: f64| if reversed { 1.0 - f } else { f };

    let (params_a, params_b) = (a.params(), b.params());
    let count = a.count();
    let partner = |i: usize| if reversed { params_b.len().checked_sub(i + 1) } else { Some(i) };
    let in_place = params_a.len() == params_b.len()
        && params_a.iter().enumerate().all(|(i, &s)| {
            partner(i)
                .and_then(|j| params_b.get(j))
                .is_some_and(|&t| weld.approx_eq_point3(curve_a.point_at(s), curve_b.point_at(t)))
        });
    if in_place {
        return counted;
    }

    let mut rungs: Vec<(f64, Rung)> = params_a
        .iter()
        .map(|&s| (curve_a.fraction_at(s), Rung::A(s)))
        .chain(params_b.iter().map(|&t| (along_a(curve_b.fraction_at(t)), Rung::B(t))))
        .collect();
    rungs.sort_by(|x, y| x.0.total_cmp(&y.0));
    rungs.dedup_by(|later, earlier| {
        if later.0 - earlier.0 > ALIGN_TOLERANCE.eps {
            return false;
        }
        if matches!(later.1, Rung::A(_)) {
            *earlier = *later;
        }
        true
    });

    let aligned = rungs.len().saturating_sub(1);
    if aligned > ceiling {
        let warning = QualityWarning::new(
            WarningKind::ReconciliationCapped,
            format!("aligning {count}-rung boundary needs {aligned} rungs, ceiling is {ceiling}"),
        );
        return ReconcileOutcome::Capped {
            count_a: count,
            count_b: b.count(),
            warning,
        };
    }

    let (for_a, for_b): (Vec<f64>, Vec<f64>) = rungs
        .iter()
        .map(|&(f, rung)| match rung {
            Rung::A(s) => {
                let guess = curve_b.param_at_fraction(along_a(f));
                (s, curve_b.snap(curve_a.point_at(s), guess))
            }
            Rung::B(t) => (curve_a.snap(curve_b.point_at(t), curve_a.param_at_fraction(f)), t),
        })
        .unzip();
    if let Err(err) = a.reset_params(&for_a).and_then(|()| b.reset_params(&for_b)) {
        log::debug!("reconcile: boundary alignment rejected ({err})");
        return counted;
    }
    log::debug!("reconcile: aligned boundary {count} -> {aligned} rungs");
    match counted {
        ReconcileOutcome::Raised { from, .. } => ReconcileOutcome::Raised { from, to: aligned },
        _ if aligned > count => ReconcileOutcome::Raised { from: count, to: aligned },
        _ => ReconcileOutcome::Aligned { count: aligned },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{ParTransform, ParamAxis};

    #[test]
    fn uniform_pair_is_raised_uniformly() {
        let t = ParTransform::Identity;
        let mut a = Ladder::uniform(&t, ParamAxis::U, &Interval::new(0.0, 1.0), 4).unwrap();
        let mut b = Ladder::uniform(&t, ParamAxis::U, &Interval::new(0.0, 2.0), 7).unwrap();
        let outcome = reconcile_ladders(&mut a, &mut b, 100);
        assert_eq!(outcome, ReconcileOutcome::Raised { from: 4, to: 7 });
        assert!(a.is_uniform());
        assert_eq!(a.count(), 7);
        assert_eq!(reconcile_ladders(&mut a, &mut b, 100), ReconcileOutcome::Unchanged);
    }

    #[test]
    fn ceiling_caps_with_warning() {
        let t = ParTransform::Identity;
        let mut a = Ladder::uniform(&t, ParamAxis::U, &Interval::new(0.0, 1.0), 2).unwrap();
        let mut b = Ladder::uniform(&t, ParamAxis::U, &Interval::new(0.0, 1.0), 10).unwrap();
        let outcome = reconcile_ladders(&mut a, &mut b, 6);
        assert!(matches!(outcome, ReconcileOutcome::Capped { count_a: 6, count_b: 10, .. }));
        assert_eq!(
            outcome.into_warning().map(|w| w.kind),
            Some(WarningKind::ReconciliationCapped)
        );
    }

    #[test]
    fn mixed_representations_promote_the_uniform_side() {
        let t = ParTransform::Identity;
        let mut a = Ladder::uniform(&t, ParamAxis::U, &Interval::new(0.0, 1.0), 4).unwrap();
        let mut b = Ladder::from_params(&t, ParamAxis::U, &[0.0, 0.05, 0.1, 1.0]).unwrap();
        let outcome = reconcile_ladders(&mut a, &mut b, 100);
        assert_eq!(outcome, ReconcileOutcome::Raised { from: 3, to: 4 });
        assert!(!a.is_uniform());
        assert!(!b.is_uniform());
        assert_eq!(a.params(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    fn assert_coincident<FA, FB>(
        a: &Ladder<'_>,
        b: &Ladder<'_>,
        curves: (&BoundaryCurve<FA>, &BoundaryCurve<FB>),
        reversed: bool,
    ) where
        FA: Fn(f64) -> Point3,
        FB: Fn(f64) -> Point3,
    {
        let (pa, mut pb) = (a.params(), b.params());
        if reversed {
            pb.reverse();
        }
        assert_eq!(pa.len(), pb.len());
        for (&s, &t) in pa.iter().zip(&pb) {
            let gap = curves.0.point_at(s).distance_to(curves.1.point_at(t));
            assert!(gap < 1e-9, "rungs {s} / {t} are {gap} apart");
        }
    }

    #[test]
    fn reversed_boundary_aligns_mirrored_rungs() {
        let t = ParTransform::Identity;
        let flipped = ParTransform::FlipU;
        let mut a = Ladder::from_params(&t, ParamAxis::U, &[0.0, 0.2, 1.0]).unwrap();
        let mut b = Ladder::uniform(&flipped, ParamAxis::U, &Interval::new(3.0, 5.0), 2).unwrap();
        let curve_a = BoundaryCurve::new(a.param_range(), |s| Point3::new(4.0 * s, 0.0, 0.0));
        let curve_b =
            BoundaryCurve::new(b.param_range(), |t| Point3::new(2.0 * (5.0 - t), 0.0, 0.0));
        assert!((curve_b.length() - 4.0).abs() < 1e-12);

        let curves = (&curve_a, &curve_b);
        let outcome = reconcile_shared_boundary(&mut a, &mut b, curves, true, 100, Tolerance::WELD);
        assert_eq!(outcome, ReconcileOutcome::Raised { from: 2, to: 3 });
        assert_coincident(&a, &b, curves, true);
    }

    #[test]
    fn differently_parameterized_sides_meet_in_world_space() {
        let t = ParTransform::Identity;
        let mut a = Ladder::uniform(&t, ParamAxis::V, &Interval::new(0.0, 1.0), 4).unwrap();
        let mut b = Ladder::uniform(&t, ParamAxis::V, &Interval::new(0.0, 1.0), 4).unwrap();
        // Same segment, but the second side runs quadratically along it.
        let curve_a = BoundaryCurve::new(a.param_range(), |s| Point3::new(1.0, 4.0 * s, 0.0));
        let curve_b =
            BoundaryCurve::new(b.param_range(), |t| Point3::new(1.0, 0.8 * t + 3.2 * t * t, 0.0));
        assert!((curve_b.fraction_at(0.5) - 0.3).abs() < 1e-12);
        assert!((curve_b.param_at_fraction(0.3) - 0.5).abs() < 1e-12);

        let curves = (&curve_a, &curve_b);
        let outcome =
            reconcile_shared_boundary(&mut a, &mut b, curves, false, 100, Tolerance::WELD);
        assert_eq!(outcome, ReconcileOutcome::Raised { from: 4, to: 7 });
        assert_coincident(&a, &b, curves, false);
        assert_eq!(
            reconcile_shared_boundary(&mut a, &mut b, curves, false, 100, Tolerance::WELD),
            ReconcileOutcome::Unchanged
        );
    }

    #[test]
    fn collapsed_side_falls_back_to_parameter_fractions() {
        let pole = BoundaryCurve::new(Interval::new(0.0, 2.0), |_| Point3::ORIGIN);
        assert_eq!(pole.length(), 0.0);
        assert_eq!(pole.fraction_at(0.5), 0.25);
        assert_eq!(pole.param_at_fraction(0.75), 1.5);
        assert_eq!(pole.snap(Point3::new(1.0, 0.0, 0.0), 1.2), 1.2);
    }
}
