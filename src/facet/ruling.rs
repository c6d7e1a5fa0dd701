//! Ruling setup: how many rungs a curvature family needs, and where they go.
//!
//! Counts are derived in application space from world lengths
//! (`parameter length * arc ratio`), so they do not depend on the ladder
//! frame. Each active constraint contributes a demand:
//!
//! - normal angle: `length * turning / angle`, turning = `hypot(k, twist)`;
//! - sag: `length / arc`, where `arc = 4 asin(sqrt(sag k / 2)) / k` is the
//!   longest circular arc whose chord stays within `sag`;
//! - edge: `length / max_edge`;
//! - aspect: `length / (max_aspect * cross_world_step)`.
//!
//! The ladder takes the largest demand over the family's governing samples,
//! clamped to the rung bounds. When the sampled curvature varies enough the
//! rungs are spaced by the local demand instead (inverse-CDF placement).

use crate::geom::{
    CurvatureSamples, FamilyCurvature, FamilySample, Interval, ParBox, ParTransform, ParamAxis,
    Tolerance,
};

use super::diagnostics::{QualityWarning, WarningKind};
use super::error::{FacetError, check_rung_bounds, check_tolerance};
use super::ladder::Ladder;
use super::options::FacetOptions;

/// Slack subtracted before rounding a demand up, so an exact integer demand
/// computed with rounding noise does not gain a rung.
const COUNT_SLACK: f64 = 1e-9;
/// Rung counts above this are treated as unbounded before clamping.
const COUNT_LIMIT: f64 = 1e15;

/// Parametric step of the other direction, for aspect-ratio coupling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossStep {
    /// Application-space step between rungs of the other ladder.
    pub step: f64,
    /// Arc length per unit of the other parameter.
    pub arc_ratio: f64,
    /// Permitted ratio between the world lengths of the two cell sides.
    pub max_aspect: f64,
}

impl CrossStep {
    fn world_step(&self) -> f64 {
        self.step * self.arc_ratio
    }
}

/// Everything ruling needs to know about one family of one face.
#[derive(Debug, Clone, Copy)]
pub struct RulingInput<'a> {
    pub family: &'a FamilyCurvature,
    /// Application-space region; the ladder spans it along `direction`.
    pub region: ParBox,
    pub direction: ParamAxis,
    pub max_sag: f64,
    pub max_edge_length: f64,
    pub max_normal_angle_deg: f64,
    pub cross_step: Option<CrossStep>,
    pub min_rungs: usize,
    pub max_rungs: usize,
    pub variable_threshold: f64,
}

impl<'a> RulingInput<'a> {
    /// Input with every tolerance disabled and the default rung bounds.
    #[must_use]
    pub fn new(family: &'a FamilyCurvature, region: ParBox, direction: ParamAxis) -> Self {
        let defaults = FacetOptions::new();
        Self {
            family,
            region,
            direction,
            max_sag: f64::INFINITY,
            max_edge_length: f64::INFINITY,
            max_normal_angle_deg: f64::INFINITY,
            cross_step: None,
            min_rungs: defaults.min_rungs,
            max_rungs: defaults.max_rungs,
            variable_threshold: defaults.variable_threshold,
        }
    }

    /// Takes tolerances and bounds from `options`. Aspect coupling is left to
    /// [`Self::with_cross_step`].
    #[must_use]
    pub fn with_options(mut self, options: &FacetOptions) -> Self {
        self.max_sag = options.sag_limit();
        self.max_edge_length = options.edge_limit();
        self.max_normal_angle_deg = options.angle_limit_deg();
        self.min_rungs = options.min_rungs;
        self.max_rungs = options.max_rungs;
        self.variable_threshold = options.variable_threshold;
        self
    }

    #[must_use]
    pub fn with_cross_step(mut self, cross_step: CrossStep) -> Self {
        self.cross_step = Some(cross_step);
        self
    }

    /// Application-space range the ladder covers.
    #[must_use]
    pub const fn range(&self) -> Interval {
        self.region.along(self.direction)
    }

    fn validate(&self) -> Result<(), FacetError> {
        check_tolerance("max_sag", self.max_sag)?;
        check_tolerance("max_edge_length", self.max_edge_length)?;
        check_tolerance("max_normal_angle_deg", self.max_normal_angle_deg)?;
        if let Some(cross) = &self.cross_step {
            check_tolerance("max_aspect_ratio", cross.max_aspect)?;
        }
        check_rung_bounds(self.min_rungs, self.max_rungs)
    }
}

/// Rungs demanded by each constraint, as unrounded counts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RungDemand {
    pub angle: f64,
    pub sag: f64,
    pub edge: f64,
    pub aspect: f64,
}

impl RungDemand {
    /// The most demanding constraint.
    #[must_use]
    pub fn governing(&self) -> f64 {
        self.angle.max(self.sag).max(self.edge).max(self.aspect)
    }

    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            angle: self.angle.max(other.angle),
            sag: self.sag.max(other.sag),
            edge: self.edge.max(other.edge),
            aspect: self.aspect.max(other.aspect),
        }
    }
}

/// Longest circular arc of curvature `k` whose chord sags at most `sag`.
fn sag_arc(k: f64, sag: f64) -> f64 {
    let x = (0.5 * sag * k).min(1.0);
    4.0 * x.sqrt().asin() / k
}

/// Demand of one sample over `length` units of application parameter.
#[must_use]
pub fn rung_demand(sample: &FamilySample, length: f64, input: &RulingInput<'_>) -> RungDemand {
    let world = length * sample.arc_ratio;
    if world.is_nan() || world <= Tolerance::ZERO_LENGTH.eps {
        return RungDemand::default();
    }
    let angle = if input.max_normal_angle_deg.is_finite() {
        world * sample.normal_turning() / input.max_normal_angle_deg.to_radians()
    } else {
        0.0
    };
    let sag = if input.max_sag.is_finite() && sample.curvature > Tolerance::ZERO_LENGTH.eps {
        world / sag_arc(sample.curvature, input.max_sag)
    } else {
        0.0
    };
    let edge = if input.max_edge_length.is_finite() {
        world / input.max_edge_length
    } else {
        0.0
    };
    let aspect = match &input.cross_step {
        Some(cross)
            if cross.max_aspect.is_finite() && cross.world_step() > Tolerance::ZERO_LENGTH.eps =>
        {
            world / (cross.max_aspect * cross.world_step())
        }
        _ => 0.0,
    };
    RungDemand {
        angle,
        sag,
        edge,
        aspect,
    }
}

/// Worst demand over the family's governing samples across the full range.
#[must_use]
pub fn family_demand(input: &RulingInput<'_>) -> RungDemand {
    let length = input.range().length();
    let family = input.family;
    let summary = FamilySample::new(family.curvature, family.twist, family.arc_ratio);
    let governing: &[FamilySample] = if input.family.governing.is_empty() {
        std::slice::from_ref(&summary)
    } else {
        &input.family.governing
    };
    governing
        .iter()
        .map(|s| rung_demand(s, length, input))
        .fold(RungDemand::default(), RungDemand::max)
}

fn ceil_count(demand: f64) -> usize {
    if demand.is_nan() {
        return 0;
    }
    let n = (demand - COUNT_SLACK).ceil().clamp(0.0, COUNT_LIMIT);
    n as usize
}

/// Frame in which a ladder along `direction` runs; `reversed` walks the
/// altitude axis backwards.
#[must_use]
pub const fn ladder_frame(direction: ParamAxis, reversed: bool) -> ParTransform {
    match (direction, reversed) {
        (ParamAxis::U, false) => ParTransform::Identity,
        (ParamAxis::U, true) => ParTransform::FlipU,
        (ParamAxis::V, false) => ParTransform::Swap,
        (ParamAxis::V, true) => ParTransform::Rotate90,
    }
}

/// Result of ruling one family.
#[derive(Debug, Clone, PartialEq)]
pub enum RulingOutcome<'t> {
    /// All active tolerances are met by the ladder.
    Satisfied(Ladder<'t>),
    /// The rung ceiling was hit; the ladder is the best available.
    Degraded {
        ladder: Ladder<'t>,
        warning: QualityWarning,
    },
}

impl<'t> RulingOutcome<'t> {
    #[must_use]
    pub const fn ladder(&self) -> &Ladder<'t> {
        match self {
            Self::Satisfied(ladder) | Self::Degraded { ladder, .. } => ladder,
        }
    }

    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    #[must_use]
    pub fn into_parts(self) -> (Ladder<'t>, Option<QualityWarning>) {
        match self {
            Self::Satisfied(ladder) => (ladder, None),
            Self::Degraded { ladder, warning } => (ladder, Some(warning)),
        }
    }
}

/// Piecewise-linear rung density (rungs per unit parameter) between
/// sampling stations, held constant out to the range ends.
struct DensityProfile {
    knots: Vec<(f64, f64)>,
    /// Cumulative rungs at each knot.
    cumulative: Vec<f64>,
}

impl DensityProfile {
    fn new(samples: &CurvatureSamples, input: &RulingInput<'_>, range: &Interval) -> Option<Self> {
        let floor = input.min_rungs as f64 / range.length();
        let mut stations: Vec<(f64, f64)> = samples
            .params
            .as_slice()
            .iter()
            .zip(&samples.samples)
            .filter(|(t, _)| range.contains(**t, Tolerance::PARAM))
            .map(|(&t, s)| (t, rung_demand(s, 1.0, input).governing().max(floor)))
            .collect();
        if stations.len() < 2 {
            return None;
        }
        stations.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut knots = Vec::with_capacity(stations.len() + 2);
        if let Some(&(t, rho)) = stations.first() {
            if t > range.low() {
                knots.push((range.low(), rho));
            }
        }
        knots.extend(stations.iter().copied());
        if let Some(&(t, rho)) = stations.last() {
            if t < range.high() {
                knots.push((range.high(), rho));
            }
        }

        let mut cumulative = Vec::with_capacity(knots.len());
        let mut total = 0.0;
        cumulative.push(total);
        for pair in knots.windows(2) {
            let ((ta, ra), (tb, rb)) = (pair[0], pair[1]);
            total += 0.5 * (ra + rb) * (tb - ta);
            cumulative.push(total);
        }
        total.is_finite().then_some(Self { knots, cumulative })
    }

    fn total(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Parameter at which `target` rungs have accumulated.
    fn invert(&self, target: f64) -> f64 {
        let seg = self
            .cumulative
            .windows(2)
            .position(|w| target <= w[1])
            .unwrap_or(self.knots.len().saturating_sub(2));
        let (ta, ra) = self.knots[seg];
        let (tb, rb) = self.knots[seg + 1];
        let h = tb - ta;
        let r = (target - self.cumulative[seg]).max(0.0);
        // F(s) = ra s + (rb - ra) s^2 / 2h; solved in the cancellation-free form.
        let a = (rb - ra) / (2.0 * h);
        let disc = (ra * ra + 4.0 * a * r).max(0.0);
        let denom = ra + disc.sqrt();
        let s = if denom > 0.0 { 2.0 * r / denom } else { 0.0 };
        ta + s.clamp(0.0, h)
    }

    /// `count + 1` application parameters from the range start to its end.
    fn place(&self, count: usize, range: &Interval) -> Vec<f64> {
        let total = self.total();
        let mut params = Vec::with_capacity(count + 1);
        params.push(range.low());
        for i in 1..count {
            params.push(self.invert(total * i as f64 / count as f64));
        }
        params.push(range.high());
        params
    }
}

fn variable_density(input: &RulingInput<'_>, range: &Interval) -> Option<DensityProfile> {
    let samples = input.family.samples.as_ref()?;
    if samples.curvature_spread() <= input.variable_threshold {
        return None;
    }
    DensityProfile::new(samples, input, range)
}

/// Builds the ladder for one family over `input.region`.
///
/// Invalid configuration fails before anything else is looked at. A
/// collapsed range yields the degenerate single-rung ladder.
pub fn setup_ruling<'t>(
    input: &RulingInput<'_>,
    transform: &'t ParTransform,
) -> Result<RulingOutcome<'t>, FacetError> {
    input.validate()?;
    let range = input.range();
    if range.is_degenerate(Tolerance::PARAM) {
        let at = if range.is_empty() { 0.0 } else { range.low() };
        log::debug!("ruling {}: degenerate range at {at}", input.direction.name());
        return Ok(RulingOutcome::Satisfied(Ladder::degenerate(transform, input.direction, at)?));
    }

    let demand = family_demand(input);
    let density = variable_density(input, &range);
    let needed = match &density {
        Some(profile) => ceil_count(profile.total()),
        None => ceil_count(demand.governing()),
    };
    let count = needed.clamp(input.min_rungs, input.max_rungs);

    let mut ladder = Ladder::uniform(transform, input.direction, &range, count)?;
    if let Some(profile) = &density {
        let params = profile.place(count, &range);
        match Ladder::from_params(transform, input.direction, &params) {
            Ok(variable) => ladder = variable,
            Err(err) => log::debug!(
                "ruling {}: variable placement rejected ({err}), keeping uniform",
                input.direction.name()
            ),
        }
    }

    log::debug!(
        "ruling {}: {} rungs ({}) demand angle={:.2} sag={:.2} edge={:.2} aspect={:.2}",
        input.direction.name(),
        ladder.count(),
        if ladder.is_uniform() { "uniform" } else { "variable" },
        demand.angle,
        demand.sag,
        demand.edge,
        demand.aspect
    );

    if needed > input.max_rungs {
        let warning = QualityWarning::new(
            WarningKind::RungCeilingReached,
            format!(
                "{} ruling needs {needed} rungs, capped at {}",
                input.direction.name(),
                input.max_rungs
            ),
        );
        return Ok(RulingOutcome::Degraded { ladder, warning });
    }
    Ok(RulingOutcome::Satisfied(ladder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::ParamArray;

    fn flat(arc_ratio: f64) -> FamilyCurvature {
        FamilyCurvature {
            curvature: 0.0,
            arc_ratio,
            twist: 0.0,
            twisted: false,
            governing: vec![FamilySample::new(0.0, 0.0, arc_ratio)],
            samples: None,
        }
    }

    #[test]
    fn sag_arc_matches_chord_height() {
        let (r, sag) = (5.0, 0.05);
        let arc = sag_arc(1.0 / r, sag);
        let half_angle = arc / (2.0 * r);
        let height = r * (1.0 - half_angle.cos());
        assert!((height - sag).abs() < 1e-12, "height {height}");
    }

    #[test]
    fn exact_integer_demand_is_not_rounded_up() {
        assert_eq!(ceil_count(10.0), 10);
        assert_eq!(ceil_count(10.0 + 1e-12), 10);
        assert_eq!(ceil_count(10.001), 11);
        assert_eq!(ceil_count(f64::INFINITY), COUNT_LIMIT as usize);
    }

    #[test]
    fn edge_length_counts_world_units() {
        let family = flat(2.0);
        let region = ParBox::new(Interval::new(0.0, 5.0), Interval::new(0.0, 1.0));
        let mut input = RulingInput::new(&family, region, ParamAxis::U);
        input.max_edge_length = 1.0;
        let t = ladder_frame(ParamAxis::U, false);
        let outcome = setup_ruling(&input, &t).unwrap();
        assert_eq!(outcome.ladder().count(), 10);
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn aspect_coupling_adds_rungs() {
        let family = flat(1.0);
        let region = ParBox::new(Interval::new(0.0, 10.0), Interval::new(0.0, 1.0));
        let input = RulingInput::new(&family, region, ParamAxis::U).with_cross_step(CrossStep {
            step: 0.5,
            arc_ratio: 1.0,
            max_aspect: 4.0,
        });
        let demand = family_demand(&input);
        assert!((demand.aspect - 5.0).abs() < 1e-12);
        let t = ParTransform::Identity;
        assert_eq!(setup_ruling(&input, &t).unwrap().ladder().count(), 5);
    }

    #[test]
    fn variable_ladder_concentrates_rungs() {
        let params = ParamArray::from_values(vec![0.1, 0.5, 0.9], Tolerance::PARAM);
        let stations = vec![
            FamilySample::new(10.0, 0.0, 1.0),
            FamilySample::new(0.1, 0.0, 1.0),
            FamilySample::new(0.1, 0.0, 1.0),
        ];
        let family = FamilyCurvature {
            curvature: 10.0,
            arc_ratio: 1.0,
            twist: 0.0,
            twisted: false,
            governing: stations.clone(),
            samples: Some(CurvatureSamples {
                params,
                samples: stations,
            }),
        };
        let region = ParBox::new(Interval::new(0.0, 1.0), Interval::new(0.0, 1.0));
        let mut input = RulingInput::new(&family, region, ParamAxis::U);
        input.max_normal_angle_deg = 5.0;
        let t = ParTransform::Identity;
        let ladder = setup_ruling(&input, &t).unwrap().into_parts().0;
        assert!(!ladder.is_uniform());
        let params = ladder.params();
        assert_eq!(params.first().copied(), Some(0.0));
        assert_eq!(params.last().copied(), Some(1.0));
        let below_half = params.iter().filter(|&&p| p < 0.5).count();
        assert!(below_half * 2 > params.len(), "{params:?}");
    }
}
