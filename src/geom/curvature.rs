//! Curvature oracle for faceting.
//!
//! [`analyze_surface_curvature`] evaluates the first and second fundamental
//! forms at one parametric point. [`curvature_profile`] summarises a whole
//! parametric region per family, in closed form for analytic surfaces and by
//! interior sampling otherwise.
//!
//! A family is named after the parameter that varies along it: family `u`
//! describes the iso-v curves, so its arc ratio is `|dP/du|` and its curvature
//! is the normal curvature of the surface in the `dP/du` direction. Twist is
//! the geodesic torsion in that direction, i.e. how fast the surface normal
//! rolls about the curve while walking along it.
//!
//! Curvature values are clamped to [`CURVATURE_SENTINEL`]; poles and
//! zero-measure regions never produce NaN or infinity.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use super::array::ParamArray;
use super::core::{Point3, Tolerance, Vec3};
use super::param::{Interval, ParBox, ParamAxis};
use super::surface::{SphereSurface, Surface, SurfaceKind};

/// Upper bound for any curvature or twist magnitude reported by this module.
pub const CURVATURE_SENTINEL: f64 = 1e10;

/// Twist is flagged once it reaches this fraction of the normal curvature.
const TWIST_FLAG_RATIO: f64 = 0.25;
/// Absolute twist (1/length) below which a family is never flagged.
const TWIST_FLOOR: f64 = 1e-6;
/// Refinement may grow the station count to this multiple of the base count.
const MAX_REFINEMENT_FACTOR: usize = 4;

fn clamp_curvature(k: f64) -> f64 {
    if k.is_finite() { k.abs().min(CURVATURE_SENTINEL) } else { CURVATURE_SENTINEL }
}

// ─────────────────────────────────────────────────────────────────────────────
// Point analysis
// ─────────────────────────────────────────────────────────────────────────────

/// Curvature data for one family at one location.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FamilySample {
    /// Absolute normal curvature along the family direction.
    pub curvature: f64,
    /// Absolute geodesic torsion along the family direction.
    pub twist: f64,
    /// Arc length per unit parameter.
    pub arc_ratio: f64,
}

impl FamilySample {
    #[must_use]
    pub const fn new(curvature: f64, twist: f64, arc_ratio: f64) -> Self {
        Self {
            curvature,
            twist,
            arc_ratio,
        }
    }

    /// Rate at which the surface normal turns, per unit arc length.
    #[must_use]
    pub fn normal_turning(&self) -> f64 {
        clamp_curvature(self.curvature.hypot(self.twist))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceCurvatureAnalysis {
    pub point: Point3,
    /// `None` where the tangents are parallel or vanish (poles, creases).
    pub normal: Option<Vec3>,
    pub du: Vec3,
    pub dv: Vec3,
    /// Larger principal curvature.
    pub k1: f64,
    /// Smaller principal curvature.
    pub k2: f64,
    pub gaussian: f64,
    pub mean: f64,
    pub u: FamilySample,
    pub v: FamilySample,
    /// False when the metric is degenerate and the family samples fell back
    /// to iso-curve curvature or the sentinel.
    pub valid: bool,
}

/// Curvature of the space curve with derivatives `d1`, `d2`; the sentinel
/// where `d1` vanishes.
fn curve_curvature(d1: Vec3, d2: Vec3) -> f64 {
    let speed = d1.length();
    if Tolerance::ZERO_LENGTH.is_zero_length(speed) {
        return CURVATURE_SENTINEL;
    }
    clamp_curvature(d1.cross(d2).length() / (speed * speed * speed))
}

/// Fundamental-form analysis at `(u, v)`.
#[must_use]
pub fn analyze_surface_curvature<S: Surface + ?Sized>(
    surface: &S,
    u: f64,
    v: f64,
) -> SurfaceCurvatureAnalysis {
    let point = surface.point_at(u, v);
    let (du, dv) = surface.partial_derivatives_at(u, v);
    let (duu, duv, dvv) = surface.second_partial_derivatives_at(u, v);

    let e = du.dot(du);
    let f = du.dot(dv);
    let g = dv.dot(dv);
    let det_i = e * g - f * f;
    let normal = du.cross(dv).normalized();

    let degenerate = || SurfaceCurvatureAnalysis {
        point,
        normal,
        du,
        dv,
        k1: 0.0,
        k2: 0.0,
        gaussian: 0.0,
        mean: 0.0,
        u: FamilySample::new(curve_curvature(du, duu), 0.0, e.sqrt()),
        v: FamilySample::new(curve_curvature(dv, dvv), 0.0, g.sqrt()),
        valid: false,
    };

    let Some(n) = normal else {
        return degenerate();
    };
    if det_i.is_nan() || det_i <= Tolerance::ZERO_LENGTH.eps_squared() {
        return degenerate();
    }

    let l = n.dot(duu);
    let m = n.dot(duv);
    let nn = n.dot(dvv);

    let gaussian = (l * nn - m * m) / det_i;
    let mean = (e * nn - 2.0 * f * m + g * l) / (2.0 * det_i);
    let disc = (mean * mean - gaussian).max(0.0).sqrt();

    let root = det_i.sqrt();
    let twist_u = (e * m - f * l) / (e * root);
    let twist_v = (f * nn - g * m) / (g * root);

    SurfaceCurvatureAnalysis {
        point,
        normal,
        du,
        dv,
        k1: mean + disc,
        k2: mean - disc,
        gaussian,
        mean,
        u: FamilySample::new(clamp_curvature(l / e), clamp_curvature(twist_u), e.sqrt()),
        v: FamilySample::new(clamp_curvature(nn / g), clamp_curvature(twist_v), g.sqrt()),
        valid: true,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile
// ─────────────────────────────────────────────────────────────────────────────

/// Raw per-station samples along one family, ordered by parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvatureSamples {
    pub params: ParamArray,
    pub samples: Vec<FamilySample>,
}

impl CurvatureSamples {
    /// Relative spread `(max - min) / max` of the normal turning rate; zero
    /// for flat or empty sample sets.
    #[must_use]
    pub fn curvature_spread(&self) -> f64 {
        let mut lo = f64::INFINITY;
        let mut hi = 0.0_f64;
        for s in &self.samples {
            let k = s.normal_turning();
            lo = lo.min(k);
            hi = hi.max(k);
        }
        if hi <= Tolerance::ZERO_LENGTH.eps || !lo.is_finite() {
            0.0
        } else {
            (hi - lo) / hi
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyCurvature {
    /// Worst-case (or averaged) normal curvature.
    pub curvature: f64,
    /// Worst-case (or averaged) arc length per unit parameter.
    pub arc_ratio: f64,
    pub twist: f64,
    pub twisted: bool,
    /// Locations where the faceting constraints peak. Ruling takes the most
    /// demanding of these.
    pub governing: Vec<FamilySample>,
    /// Stations along the family, present for sampled profiles.
    pub samples: Option<CurvatureSamples>,
}

impl FamilyCurvature {
    fn from_governing(governing: Vec<FamilySample>, samples: Option<CurvatureSamples>) -> Self {
        let curvature = governing.iter().map(|s| s.curvature).fold(0.0, f64::max);
        let arc_ratio = governing.iter().map(|s| s.arc_ratio).fold(0.0, f64::max);
        let twist = governing.iter().map(|s| s.twist).fold(0.0, f64::max);
        Self {
            curvature,
            arc_ratio,
            twist,
            twisted: twist > TWIST_FLOOR && twist >= TWIST_FLAG_RATIO * curvature,
            governing,
            samples,
        }
    }

    fn single(sample: FamilySample) -> Self {
        Self::from_governing(vec![sample], None)
    }

    /// Radius of curvature; `None` when the family is straight.
    #[must_use]
    pub fn radius(&self) -> Option<f64> {
        (self.curvature > Tolerance::ZERO_LENGTH.eps).then(|| 1.0 / self.curvature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileSource {
    ClosedForm,
    Sampled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceCurvatureProfile {
    pub region: ParBox,
    pub u: FamilyCurvature,
    pub v: FamilyCurvature,
    pub source: ProfileSource,
    /// A pole or degenerate metric was met and clamped.
    pub pole_clamped: bool,
}

impl SurfaceCurvatureProfile {
    #[must_use]
    pub const fn family(&self, axis: ParamAxis) -> &FamilyCurvature {
        match axis {
            ParamAxis::U => &self.u,
            ParamAxis::V => &self.v,
        }
    }
}

/// Sampling controls for free-form surfaces. Closed-form profiles ignore them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileOptions {
    /// Interior stations per direction before refinement.
    pub samples_per_direction: usize,
    /// Combine across the cross direction by maximum rather than mean.
    pub worst_case: bool,
    /// Chord sag between adjacent stations that triggers an extra station.
    pub permitted_sag: f64,
    /// Normal change between adjacent stations (degrees) that triggers an
    /// extra station.
    pub permitted_angle_deg: f64,
}

impl ProfileOptions {
    #[must_use]
    pub const fn new(samples_per_direction: usize, worst_case: bool) -> Self {
        Self {
            samples_per_direction,
            worst_case,
            permitted_sag: f64::INFINITY,
            permitted_angle_deg: f64::INFINITY,
        }
    }
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self::new(8, true)
    }
}

/// Curvature profile of `surface` over `region` (the whole domain when
/// `None`).
#[must_use]
pub fn curvature_profile<S: Surface + ?Sized>(
    surface: &S,
    region: Option<&ParBox>,
    options: &ProfileOptions,
) -> SurfaceCurvatureProfile {
    let region = region.copied().unwrap_or_else(|| surface.domain());
    closed_form_profile(surface.kind(), &region)
        .unwrap_or_else(|| sampled_profile(surface, &region, options))
}

/// Closed-form profile for analytic kinds; `None` for free-form.
#[must_use]
pub fn closed_form_profile(kind: SurfaceKind, region: &ParBox) -> Option<SurfaceCurvatureProfile> {
    let (u, v, pole_clamped) = match kind {
        SurfaceKind::Plane { u_axis, v_axis } => (
            FamilyCurvature::single(FamilySample::new(0.0, 0.0, u_axis.length())),
            FamilyCurvature::single(FamilySample::new(0.0, 0.0, v_axis.length())),
            false,
        ),
        SurfaceKind::Cylinder { radius, height } => (
            FamilyCurvature::single(FamilySample::new(
                clamp_curvature(1.0 / radius),
                0.0,
                TAU * radius,
            )),
            FamilyCurvature::single(FamilySample::new(0.0, 0.0, height)),
            false,
        ),
        SurfaceKind::Cone {
            radius0,
            radius1,
            height,
        } => cone_families(radius0, radius1, height, &region.v),
        SurfaceKind::Sphere { radius } => sphere_families(radius, &region.v),
        SurfaceKind::Torus {
            major_radius,
            minor_radius,
        } => (
            torus_major_family(major_radius, minor_radius, &region.v),
            FamilyCurvature::single(FamilySample::new(
                clamp_curvature(1.0 / minor_radius),
                0.0,
                TAU * minor_radius,
            )),
            false,
        ),
        SurfaceKind::FreeForm => return None,
    };
    Some(SurfaceCurvatureProfile {
        region: *region,
        u,
        v,
        source: ProfileSource::ClosedForm,
        pole_clamped,
    })
}

fn cone_families(
    r0: f64,
    r1: f64,
    height: f64,
    v_range: &Interval,
) -> (FamilyCurvature, FamilyCurvature, bool) {
    let slant = height.hypot(r1 - r0);
    let cos_tilt = if slant > 0.0 { height / slant } else { 0.0 };
    let radius_at = |v: f64| (r0 + (r1 - r0) * v.clamp(0.0, 1.0)).max(0.0);
    let (ra, rb) = if v_range.is_empty() {
        (radius_at(0.0), radius_at(1.0))
    } else {
        (radius_at(v_range.low()), radius_at(v_range.high()))
    };
    let r_max = ra.max(rb);
    let pole = ra.min(rb) <= Tolerance::ZERO_LENGTH.eps;

    // Sag and edge demands both peak at the widest circle; normal turning per
    // unit u is the same on every circle.
    let u = if r_max <= Tolerance::ZERO_LENGTH.eps {
        FamilySample::new(CURVATURE_SENTINEL, 0.0, 0.0)
    } else {
        FamilySample::new(clamp_curvature(cos_tilt / r_max), 0.0, TAU * r_max)
    };
    (
        FamilyCurvature::single(u),
        FamilyCurvature::single(FamilySample::new(0.0, 0.0, slant)),
        pole,
    )
}

fn sphere_families(radius: f64, v_range: &Interval) -> (FamilyCurvature, FamilyCurvature, bool) {
    let k = clamp_curvature(1.0 / radius);
    let (lo, hi) = if v_range.is_empty() {
        (0.0, 1.0)
    } else {
        (v_range.low().clamp(0.0, 1.0), v_range.high().clamp(0.0, 1.0))
    };
    let widest = if lo <= 0.5 && hi >= 0.5 {
        1.0
    } else {
        SphereSurface::latitude(lo).cos().max(SphereSurface::latitude(hi).cos())
    };
    let pole = lo <= Tolerance::PARAM.eps || hi >= 1.0 - Tolerance::PARAM.eps;
    (
        FamilyCurvature::single(FamilySample::new(k, 0.0, TAU * radius * widest.max(0.0))),
        FamilyCurvature::single(FamilySample::new(k, 0.0, PI * radius)),
        pole,
    )
}

/// Whether angle `phi` (radians) is reached by `TAU * v` for some `v` in the
/// range.
fn range_hits_angle(v_range: &Interval, phi: f64) -> bool {
    if v_range.is_empty() {
        return true;
    }
    let target = phi / TAU;
    let k = (v_range.low() - target).ceil();
    target + k <= v_range.high()
}

fn torus_major_family(major: f64, minor: f64, v_range: &Interval) -> FamilyCurvature {
    // Along the major circle at tube angle phi: radius R + r cos(phi), normal
    // curvature cos(phi) / (R + r cos(phi)). Demands peak at the range ends,
    // at phi = 0 or pi, or where cos(phi) = -R / 2r.
    let mut angles = vec![0.0, PI];
    if minor > 0.0 && major <= 2.0 * minor {
        let c = (-major / (2.0 * minor)).acos();
        angles.extend([c, TAU - c]);
    }
    let mut candidates: Vec<f64> = angles
        .into_iter()
        .filter(|&phi| range_hits_angle(v_range, phi))
        .collect();
    if !v_range.is_empty() {
        candidates.push(TAU * v_range.low());
        candidates.push(TAU * v_range.high());
    }

    let governing = candidates
        .into_iter()
        .map(|phi| {
            let cos_phi = phi.cos();
            let rho = major + minor * cos_phi;
            if rho <= Tolerance::ZERO_LENGTH.eps {
                FamilySample::new(CURVATURE_SENTINEL, 0.0, 0.0)
            } else {
                FamilySample::new(clamp_curvature(cos_phi / rho), 0.0, TAU * rho)
            }
        })
        .collect();
    FamilyCurvature::from_governing(governing, None)
}

// ─────────────────────────────────────────────────────────────────────────────
// Sampled profile
// ─────────────────────────────────────────────────────────────────────────────

fn interior_stations(range: &Interval, count: usize) -> Vec<f64> {
    if range.is_degenerate(Tolerance::PARAM) {
        return vec![range.mid()];
    }
    let count = count.max(1);
    (0..count)
        .map(|i| range.lerp((i as f64 + 0.5) / count as f64))
        .collect()
}

fn eval_on<S: Surface + ?Sized>(
    surface: &S,
    axis: ParamAxis,
    along: f64,
    across: f64,
) -> (Point3, Option<Vec3>) {
    let (u, v) = match axis {
        ParamAxis::U => (along, across),
        ParamAxis::V => (across, along),
    };
    (surface.point_at(u, v), surface.normal_at(u, v))
}

/// Inserts midpoint stations where neighbouring stations disagree in normal
/// by more than the permitted angle or their chord sags more than the
/// permitted sag, on any cross station.
fn refine_stations<S: Surface + ?Sized>(
    surface: &S,
    axis: ParamAxis,
    mut stations: Vec<f64>,
    cross: &[f64],
    options: &ProfileOptions,
) -> Vec<f64> {
    let check_sag = options.permitted_sag.is_finite() && options.permitted_sag > 0.0;
    let check_angle = options.permitted_angle_deg.is_finite() && options.permitted_angle_deg > 0.0;
    if !check_sag && !check_angle {
        return stations;
    }
    let min_dot = options.permitted_angle_deg.to_radians().cos();
    let limit = options.samples_per_direction.max(2) * MAX_REFINEMENT_FACTOR;

    loop {
        let mut budget = limit.saturating_sub(stations.len());
        if budget == 0 {
            break;
        }
        let mut next = Vec::with_capacity(stations.len() * 2);
        let mut inserted = false;
        for pair in stations.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            next.push(a);
            if budget == 0 || b - a <= Tolerance::PARAM.eps {
                continue;
            }
            let mid = 0.5 * (a + b);
            let split = cross.iter().any(|&q| {
                let (pa, na) = eval_on(surface, axis, a, q);
                let (pb, nb) = eval_on(surface, axis, b, q);
                let angle_fail = check_angle
                    && match (na, nb) {
                        (Some(na), Some(nb)) => na.dot(nb) < min_dot,
                        _ => false,
                    };
                let sag_fail = check_sag && {
                    let (pm, _) = eval_on(surface, axis, mid, q);
                    pm.distance_to(pa.lerp(pb, 0.5)) > options.permitted_sag
                };
                angle_fail || sag_fail
            });
            if split {
                next.push(mid);
                budget -= 1;
                inserted = true;
            }
        }
        if let Some(&last) = stations.last() {
            next.push(last);
        }
        stations = next;
        if !inserted {
            break;
        }
    }
    stations
}

/// Merges samples across the cross direction. Samples with a vanishing arc
/// ratio (poles) constrain nothing and are skipped.
fn combine(samples: &[FamilySample], worst_case: bool) -> FamilySample {
    let live: Vec<FamilySample> = samples
        .iter()
        .copied()
        .filter(|s| s.arc_ratio > Tolerance::ZERO_LENGTH.eps)
        .collect();
    let samples = live.as_slice();
    if samples.is_empty() {
        return FamilySample::default();
    }
    if worst_case {
        samples.iter().fold(FamilySample::default(), |acc, s| {
            FamilySample::new(
                acc.curvature.max(s.curvature),
                acc.twist.max(s.twist),
                acc.arc_ratio.max(s.arc_ratio),
            )
        })
    } else {
        let n = samples.len() as f64;
        let sum = samples.iter().fold(FamilySample::default(), |acc, s| {
            FamilySample::new(
                acc.curvature + s.curvature,
                acc.twist + s.twist,
                acc.arc_ratio + s.arc_ratio,
            )
        });
        FamilySample::new(sum.curvature / n, sum.twist / n, sum.arc_ratio / n)
    }
}

/// Sampling profile for free-form surfaces.
#[must_use]
pub fn sampled_profile<S: Surface + ?Sized>(
    surface: &S,
    region: &ParBox,
    options: &ProfileOptions,
) -> SurfaceCurvatureProfile {
    let n = options.samples_per_direction.max(2);
    let base_u = interior_stations(&region.u, n);
    let base_v = interior_stations(&region.v, n);
    let mut pole_clamped = false;

    let mut family = |axis: ParamAxis| -> FamilyCurvature {
        let (base, cross) = match axis {
            ParamAxis::U => (&base_u, &base_v),
            ParamAxis::V => (&base_v, &base_u),
        };
        let stations = refine_stations(surface, axis, base.clone(), cross, options);

        let mut params = ParamArray::with_capacity(stations.len(), Tolerance::PARAM);
        let mut per_station = Vec::with_capacity(stations.len());
        for &t in &stations {
            let column: Vec<FamilySample> = cross
                .iter()
                .map(|&q| {
                    let (u, v) = match axis {
                        ParamAxis::U => (t, q),
                        ParamAxis::V => (q, t),
                    };
                    let analysis = analyze_surface_curvature(surface, u, v);
                    if !analysis.valid {
                        pole_clamped = true;
                    }
                    match axis {
                        ParamAxis::U => analysis.u,
                        ParamAxis::V => analysis.v,
                    }
                })
                .collect();
            params.push(t);
            per_station.push(combine(&column, options.worst_case));
        }

        let summary = combine(&per_station, options.worst_case);
        let mut fam = FamilyCurvature::from_governing(
            per_station.clone(),
            Some(CurvatureSamples {
                params,
                samples: per_station,
            }),
        );
        if !options.worst_case {
            fam.curvature = summary.curvature;
            fam.arc_ratio = summary.arc_ratio;
            fam.twist = summary.twist;
            fam.governing = vec![summary];
        }
        fam
    };

    let u = family(ParamAxis::U);
    let v = family(ParamAxis::V);
    log::debug!(
        "sampled profile: u k={:.3e} ratio={:.3e} twisted={} | v k={:.3e} ratio={:.3e} twisted={}",
        u.curvature,
        u.arc_ratio,
        u.twisted,
        v.curvature,
        v.arc_ratio,
        v.twisted
    );

    SurfaceCurvatureProfile {
        region: *region,
        u,
        v,
        source: ProfileSource::Sampled,
        pole_clamped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_never_returns_non_finite() {
        assert_eq!(clamp_curvature(f64::INFINITY), CURVATURE_SENTINEL);
        assert_eq!(clamp_curvature(f64::NAN), CURVATURE_SENTINEL);
        assert_eq!(clamp_curvature(-2.0), 2.0);
    }

    #[test]
    fn range_hits_angle_wraps() {
        assert!(range_hits_angle(&Interval::new(0.9, 1.1), 0.0));
        assert!(!range_hits_angle(&Interval::new(0.1, 0.4), 0.0));
        assert!(range_hits_angle(&Interval::new(0.1, 0.6), PI));
    }

    #[test]
    fn interior_stations_avoid_ends() {
        let s = interior_stations(&Interval::new(0.0, 1.0), 4);
        assert_eq!(s, vec![0.125, 0.375, 0.625, 0.875]);
        assert_eq!(interior_stations(&Interval::point(0.3), 8), vec![0.3]);
    }
}
