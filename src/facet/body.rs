//! Body-level orchestration.
//!
//! Faceting a body runs in four phases:
//!
//! 1. per face: curvature profile, then u and v ruling (with an
//!    aspect-coupled second pass when an aspect limit is set);
//! 2. shared boundaries are reconciled until no ladder changes;
//! 3. per face: grid assembly, trimming, post-check and node merge;
//! 4. the face meshes are appended and welded into the body mesh.
//!
//! Phases 1 and 3 run on rayon when the `parallel` feature is enabled.
//! Cancellation is checked before each face in those phases.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::geom::{
    FacetMesh, FamilyCurvature, Interval, ParBox, ParPos, ParTransform, ParamAxis, Point3, Surface,
    Tolerance, curvature_profile,
};

use super::assembly::{FaceSurface, WorkingFace, assemble_grid};
use super::diagnostics::{BodyDiagnostics, FaceDiagnostics, QualityWarning, WarningKind};
use super::error::FacetError;
use super::ladder::Ladder;
use super::metrics::{FacetMetrics, TimingBucket};
use super::options::FacetOptions;
use super::post_check::post_check;
use super::reconcile::{BoundaryCurve, reconcile_ladders, reconcile_shared_boundary};
use super::ruling::{CrossStep, RulingInput, RulingOutcome, ladder_frame, setup_ruling};

/// Side of a rectangular patch, named by the parameter bound it lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatchSide {
    UMin,
    UMax,
    VMin,
    VMax,
}

impl PatchSide {
    /// Direction of the ladder whose rungs tile this side. A `u` bound is an
    /// iso-u curve, along which `v` varies.
    #[must_use]
    pub const fn ruling_axis(self) -> ParamAxis {
        match self {
            Self::UMin | Self::UMax => ParamAxis::V,
            Self::VMin | Self::VMax => ParamAxis::U,
        }
    }

    /// Parameter of the bound this side lies on.
    #[must_use]
    pub const fn bound(self, region: &ParBox) -> f64 {
        match self {
            Self::UMin => region.along(ParamAxis::U).low(),
            Self::UMax => region.along(ParamAxis::U).high(),
            Self::VMin => region.along(ParamAxis::V).low(),
            Self::VMax => region.along(ParamAxis::V).high(),
        }
    }
}

/// Two face sides that meet in the body and must share their nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedBoundary {
    pub face_a: usize,
    pub side_a: PatchSide,
    pub face_b: usize,
    pub side_b: PatchSide,
    /// The two sides are parameterized in opposite directions.
    pub reversed: bool,
}

/// Cooperative cancellation shared between a caller and a running faceter.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FacetContext {
    pub cancel: CancelFlag,
}

impl FacetContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancel(cancel: CancelFlag) -> Self {
        Self { cancel }
    }

    fn check(&self) -> Result<(), FacetError> {
        if self.cancel.is_cancelled() {
            return Err(FacetError::Cancelled);
        }
        Ok(())
    }
}

/// Mesh and diagnostics of a single face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceFacets {
    pub mesh: FacetMesh,
    pub diagnostics: FaceDiagnostics,
}

/// Welded body mesh plus the per-face meshes it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyFacets {
    pub mesh: FacetMesh,
    /// Face meshes in input order, each with UVs.
    pub faces: Vec<FacetMesh>,
    pub diagnostics: BodyDiagnostics,
}

/// Ladders of one face between ruling and assembly.
struct RuledFace<'t> {
    u: Ladder<'t>,
    v: Ladder<'t>,
    diagnostics: FaceDiagnostics,
    metrics: FacetMetrics,
}

impl<'t> RuledFace<'t> {
    fn ladder_mut(&mut self, axis: ParamAxis) -> &mut Ladder<'t> {
        match axis {
            ParamAxis::U => &mut self.u,
            ParamAxis::V => &mut self.v,
        }
    }
}

/// Ladder frames for one face: u first, then v.
fn face_frames(face: &WorkingFace<'_>) -> [ParTransform; 2] {
    [
        ladder_frame(ParamAxis::U, face.is_reversed()),
        ladder_frame(ParamAxis::V, face.is_reversed()),
    ]
}

fn cross_step(ladder: &Ladder<'_>, family: &FamilyCurvature, max_aspect: f64) -> Option<CrossStep> {
    if ladder.is_degenerate() {
        return None;
    }
    Some(CrossStep {
        step: ladder.param_range().length() / ladder.count() as f64,
        arc_ratio: family.arc_ratio,
        max_aspect,
    })
}

fn rule_face<'t>(
    index: usize,
    face: &WorkingFace<'_>,
    frames: &'t [ParTransform; 2],
    options: &FacetOptions,
    ctx: &FacetContext,
) -> Result<RuledFace<'t>, FacetError> {
    ctx.check()?;
    let mut metrics = FacetMetrics::default();
    metrics.begin();
    let mut diagnostics = FaceDiagnostics::new(index);

    let region = face.active_region();
    let profile = metrics.time(TimingBucket::Curvature, || {
        curvature_profile(face.surface(), Some(&region), &options.profile_options())
    });
    diagnostics.pole_clamped = profile.pole_clamped;

    let (u, v) = metrics.time(TimingBucket::Ruling, || -> Result<_, FacetError> {
        let u_input = RulingInput::new(&profile.u, region, ParamAxis::U).with_options(options);
        let v_input = RulingInput::new(&profile.v, region, ParamAxis::V).with_options(options);
        let mut u = setup_ruling(&u_input, &frames[0])?;
        let mut v = setup_ruling(&v_input, &frames[1])?;
        if let Some(max_aspect) = options.max_aspect_ratio {
            if let Some(cross) = cross_step(v.ladder(), &profile.v, max_aspect) {
                u = setup_ruling(&u_input.with_cross_step(cross), &frames[0])?;
            }
            if let Some(cross) = cross_step(u.ladder(), &profile.u, max_aspect) {
                v = setup_ruling(&v_input.with_cross_step(cross), &frames[1])?;
            }
        }
        Ok((u, v))
    })?;

    let mut take = |outcome: RulingOutcome<'t>| {
        let (ladder, warning) = outcome.into_parts();
        if let Some(warning) = warning {
            diagnostics.add_warning(warning);
        }
        ladder
    };
    let (u, v) = (take(u), take(v));
    Ok(RuledFace {
        u,
        v,
        diagnostics,
        metrics,
    })
}

#[cfg(feature = "parallel")]
fn rule_faces<'t>(
    faces: &[WorkingFace<'_>],
    frames: &'t [[ParTransform; 2]],
    options: &FacetOptions,
    ctx: &FacetContext,
) -> Result<Vec<RuledFace<'t>>, FacetError> {
    faces
        .par_iter()
        .zip(frames.par_iter())
        .enumerate()
        .map(|(i, (face, frames))| rule_face(i, face, frames, options, ctx))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn rule_faces<'t>(
    faces: &[WorkingFace<'_>],
    frames: &'t [[ParTransform; 2]],
    options: &FacetOptions,
    ctx: &FacetContext,
) -> Result<Vec<RuledFace<'t>>, FacetError> {
    faces
        .iter()
        .zip(frames)
        .enumerate()
        .map(|(i, (face, frames))| rule_face(i, face, frames, options, ctx))
        .collect()
}

/// Two distinct elements of a slice, mutably.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> Option<(&mut T, &mut T)> {
    if a == b || a.max(b) >= items.len() {
        return None;
    }
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        Some((lo.get_mut(a)?, hi.first_mut()?))
    } else {
        let (lo, hi) = items.split_at_mut(a);
        Some((hi.first_mut()?, lo.get_mut(b)?))
    }
}

fn boundary_ladders<'a, 't>(
    ruled: &'a mut [RuledFace<'t>],
    boundary: &SharedBoundary,
) -> Option<(&'a mut Ladder<'t>, &'a mut Ladder<'t>)> {
    let (axis_a, axis_b) = (boundary.side_a.ruling_axis(), boundary.side_b.ruling_axis());
    if boundary.face_a == boundary.face_b {
        let face = ruled.get_mut(boundary.face_a)?;
        return match (axis_a, axis_b) {
            (ParamAxis::U, ParamAxis::V) => Some((&mut face.u, &mut face.v)),
            (ParamAxis::V, ParamAxis::U) => Some((&mut face.v, &mut face.u)),
            _ => None,
        };
    }
    let (fa, fb) = pair_mut(ruled, boundary.face_a, boundary.face_b)?;
    Some((fa.ladder_mut(axis_a), fb.ladder_mut(axis_b)))
}

fn equalize_face(
    face: &mut RuledFace<'_>,
    options: &FacetOptions,
) -> (bool, Option<QualityWarning>) {
    let outcome = reconcile_ladders(&mut face.u, &mut face.v, options.max_rungs);
    (outcome.changed(), outcome.into_warning())
}

/// The side of a face as a world-space curve over `range`, the parameter
/// range of the ladder that tiles it.
fn boundary_curve(
    surface: &FaceSurface,
    region: ParBox,
    side: PatchSide,
    range: Interval,
) -> BoundaryCurve<impl Fn(f64) -> Point3> {
    let fixed = side.bound(&region);
    BoundaryCurve::new(range, move |t| match side.ruling_axis() {
        ParamAxis::U => surface.point_at(t, fixed),
        ParamAxis::V => surface.point_at(fixed, t),
    })
}

/// Reconciles shared boundaries (and in-face rulings when requested) until
/// nothing changes. Returns the number of passes and whether it settled.
fn reconcile_body(
    faces: &[WorkingFace<'_>],
    ruled: &mut [RuledFace<'_>],
    shared: &[SharedBoundary],
    options: &FacetOptions,
) -> (usize, bool) {
    if shared.is_empty() && !options.equalize_rulings {
        return (0, true);
    }
    let mut passes = 0;
    let mut capped: Vec<(usize, QualityWarning)> = Vec::new();
    let mut settled = false;
    let weld = Tolerance::new(options.merge_tolerance);
    while !settled && passes < options.max_reconcile_passes {
        passes += 1;
        capped.clear();
        let mut changed = false;
        for boundary in shared {
            let (Some(face_a), Some(face_b)) =
                (faces.get(boundary.face_a), faces.get(boundary.face_b))
            else {
                continue;
            };
            let Some((a, b)) = boundary_ladders(ruled, boundary) else {
                continue;
            };
            let curve_a =
                boundary_curve(face_a.surface(), face_a.region(), boundary.side_a, a.param_range());
            let curve_b =
                boundary_curve(face_b.surface(), face_b.region(), boundary.side_b, b.param_range());
            let curves = (&curve_a, &curve_b);
            let outcome =
                reconcile_shared_boundary(a, b, curves, boundary.reversed, options.max_rungs, weld);
            changed |= outcome.changed();
            if let Some(warning) = outcome.into_warning() {
                capped.push((boundary.face_a, warning));
            }
        }
        if options.equalize_rulings {
            for (i, face) in ruled.iter_mut().enumerate() {
                let (face_changed, warning) = equalize_face(face, options);
                changed |= face_changed;
                if let Some(warning) = warning {
                    capped.push((i, warning));
                }
            }
        }
        settled = !changed;
        log::trace!("reconcile pass {passes}: changed={changed}");
    }
    for (face, warning) in capped {
        if let Some(ruled) = ruled.get_mut(face) {
            ruled.diagnostics.add_warning(warning);
        }
    }
    (passes, settled)
}

/// Rung parameters used by the grid; trimmed faces keep only the rungs that
/// bracket the trimming region.
fn grid_params(face: &WorkingFace<'_>, u: &Ladder<'_>, v: &Ladder<'_>) -> (Vec<f64>, Vec<f64>) {
    let select = |ladder: &Ladder<'_>, axis: ParamAxis| {
        let params = ladder.params();
        let Some(trim) = face.trim() else {
            return params;
        };
        match ladder.select_params(&trim.bounds().along(axis)) {
            Some((i0, i1)) if i1 < params.len() => params[i0..=i1].to_vec(),
            Some(_) => params,
            None => Vec::new(),
        }
    };
    (select(u, ParamAxis::U), select(v, ParamAxis::V))
}

fn mesh_face(
    face: &WorkingFace<'_>,
    ruled: RuledFace<'_>,
    options: &FacetOptions,
    ctx: &FacetContext,
) -> Result<FaceFacets, FacetError> {
    ctx.check()?;
    let RuledFace {
        u,
        v,
        mut diagnostics,
        mut metrics,
    } = ruled;
    diagnostics.u_rungs = u.count();
    diagnostics.v_rungs = v.count();
    diagnostics.u_variable = !u.is_uniform();
    diagnostics.v_variable = !v.is_uniform();

    let (u_params, v_params) = grid_params(face, &u, &v);
    let grid = metrics.time(TimingBucket::Grid, || assemble_grid(face, &u_params, &v_params));
    let mut mesh = grid.mesh;
    diagnostics.trimmed_triangle_count = grid.trimmed_triangles;

    if options.post_check {
        let report = metrics.time(TimingBucket::PostCheck, || {
            post_check(face.surface(), &mut mesh, options)
        });
        if report.violations > 0 {
            diagnostics.add_warning(QualityWarning::new(
                WarningKind::ToleranceViolation,
                format!(
                    "{} facet checks still fail after {} passes (max deviation {:.3e})",
                    report.violations, report.passes, report.max_deviation
                ),
            ));
        }
        diagnostics.post_check = Some(report);
    }

    let stats = metrics.time(TimingBucket::NodeMerge, || {
        let stats = mesh.merge_nodes(Tolerance::new(options.merge_tolerance));
        mesh.remove_unused_vertices();
        stats
    });
    mesh.compute_normals();

    diagnostics.merged_node_count = stats.merged_nodes;
    diagnostics.culled_triangle_count = stats.culled_triangles;
    diagnostics.vertex_count = mesh.vertex_count();
    diagnostics.triangle_count = mesh.triangle_count();
    diagnostics.open_edge_count = mesh.edge_topology().0;
    diagnostics.timing = metrics.end();
    log::debug!("{}", diagnostics.summary());
    Ok(FaceFacets { mesh, diagnostics })
}

/// Nodes in `side` with no node of `other` within `tol`.
fn lonely_nodes(side: &[Point3], other: &FacetMesh, tol: Tolerance) -> usize {
    side.iter()
        .filter(|&&p| {
            !other
                .positions
                .iter()
                .any(|&q| tol.approx_eq_point3(p, Point3::from_array(q)))
        })
        .count()
}

/// World positions of the nodes of a face mesh lying on `side` of `region`.
fn side_nodes(mesh: &FacetMesh, region: &ParBox, side: PatchSide) -> Vec<Point3> {
    let Some(uvs) = mesh.uvs.as_deref() else {
        return Vec::new();
    };
    let (fixed, axis) = (side.bound(region), side.ruling_axis().other());
    uvs.iter()
        .zip(&mesh.positions)
        .filter(|(uv, _)| Tolerance::PARAM.approx_eq_f64(axis.of(ParPos::new(uv[0], uv[1])), fixed))
        .map(|(_, &p)| Point3::from_array(p))
        .collect()
}

/// Shared boundaries whose nodes will not all weld: every node on either
/// side needs a coincident node in the other face.
fn boundary_cracks(
    faces: &[WorkingFace<'_>],
    meshes: &[FacetMesh],
    shared: &[SharedBoundary],
    tol: Tolerance,
) -> Vec<QualityWarning> {
    shared
        .iter()
        .filter(|boundary| boundary.face_a != boundary.face_b)
        .filter_map(|boundary| {
            let (mesh_a, mesh_b) = (meshes.get(boundary.face_a)?, meshes.get(boundary.face_b)?);
            let side_a = side_nodes(mesh_a, &faces.get(boundary.face_a)?.region(), boundary.side_a);
            let side_b = side_nodes(mesh_b, &faces.get(boundary.face_b)?.region(), boundary.side_b);
            let lonely = lonely_nodes(&side_a, mesh_b, tol) + lonely_nodes(&side_b, mesh_a, tol);
            (lonely > 0).then(|| {
                QualityWarning::new(
                    WarningKind::BoundaryCrack,
                    format!(
                        "{lonely} nodes on {:?} of face {} / {:?} of face {} will not weld",
                        boundary.side_a, boundary.face_a, boundary.side_b, boundary.face_b
                    ),
                )
                .with_face(boundary.face_a)
            })
        })
        .collect()
}

#[cfg(feature = "parallel")]
fn mesh_faces(
    faces: &[WorkingFace<'_>],
    ruled: Vec<RuledFace<'_>>,
    options: &FacetOptions,
    ctx: &FacetContext,
) -> Result<Vec<FaceFacets>, FacetError> {
    ruled
        .into_par_iter()
        .zip(faces.par_iter())
        .map(|(ruled, face)| mesh_face(face, ruled, options, ctx))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn mesh_faces(
    faces: &[WorkingFace<'_>],
    ruled: Vec<RuledFace<'_>>,
    options: &FacetOptions,
    ctx: &FacetContext,
) -> Result<Vec<FaceFacets>, FacetError> {
    ruled
        .into_iter()
        .zip(faces)
        .map(|(ruled, face)| mesh_face(face, ruled, options, ctx))
        .collect()
}

/// Facets a body of faces, welding them along their shared boundaries.
///
/// # Arguments
/// * `faces` - The faces of the body, indexed by [`SharedBoundary`].
/// * `shared` - Face sides that must tile identically.
/// * `options` - Tolerances and limits; validated before any work is done.
/// * `ctx` - Cancellation, checked before each face.
///
/// # Errors
/// Invalid options, a boundary naming an unknown face, or cancellation.
/// Unreachable tolerances are reported as warnings in the diagnostics.
pub fn facet_body(
    faces: &[WorkingFace<'_>],
    shared: &[SharedBoundary],
    options: &FacetOptions,
    ctx: &FacetContext,
) -> Result<BodyFacets, FacetError> {
    options.validate()?;
    for boundary in shared {
        for index in [boundary.face_a, boundary.face_b] {
            if index >= faces.len() {
                return Err(FacetError::UnknownFace { index });
            }
        }
    }

    let frames: Vec<[ParTransform; 2]> = faces.iter().map(face_frames).collect();
    let mut ruled = rule_faces(faces, &frames, options, ctx)?;

    let mut body_metrics = FacetMetrics::default();
    body_metrics.begin();
    let (passes, settled) = body_metrics.time(TimingBucket::Reconciliation, || {
        reconcile_body(faces, &mut ruled, shared, options)
    });

    let mut diagnostics = BodyDiagnostics {
        reconcile_passes: passes,
        ..BodyDiagnostics::default()
    };
    if !settled {
        diagnostics.warnings.push(
            QualityWarning::new(
                WarningKind::ReconciliationUnsettled,
                format!("shared boundaries still changing after {passes} passes"),
            )
            .emit(),
        );
    }

    let faceted = mesh_faces(faces, ruled, options, ctx)?;

    let mut mesh = FacetMesh::default();
    let mut face_meshes = Vec::with_capacity(faceted.len());
    for FaceFacets {
        mesh: face_mesh,
        diagnostics: face_diagnostics,
    } in faceted
    {
        mesh.append(&face_mesh);
        face_meshes.push(face_mesh);
        diagnostics.merge_face(face_diagnostics);
    }
    mesh.uvs = None;

    let weld = Tolerance::new(options.merge_tolerance);
    for warning in boundary_cracks(faces, &face_meshes, shared, weld) {
        diagnostics.warnings.push(warning.emit());
    }

    let stats = body_metrics.time(TimingBucket::NodeMerge, || {
        let stats = mesh.merge_nodes(Tolerance::new(options.merge_tolerance));
        mesh.remove_unused_vertices();
        stats
    });
    mesh.compute_normals();

    let (open, non_manifold) = mesh.edge_topology();
    diagnostics.vertex_count = mesh.vertex_count();
    diagnostics.triangle_count = mesh.triangle_count();
    diagnostics.merged_node_count = stats.merged_nodes;
    diagnostics.culled_triangle_count = stats.culled_triangles;
    diagnostics.open_edge_count = open;
    diagnostics.non_manifold_edge_count = non_manifold;
    if let Some(report) = body_metrics.end() {
        diagnostics
            .timing
            .get_or_insert_with(Default::default)
            .merge(&report);
    }
    log::debug!("body: {}", diagnostics.summary());

    Ok(BodyFacets {
        mesh,
        faces: face_meshes,
        diagnostics,
    })
}

/// Facets one face on its own.
pub fn facet_face(
    face: &WorkingFace<'_>,
    options: &FacetOptions,
) -> Result<FaceFacets, FacetError> {
    options.validate()?;
    let ctx = FacetContext::default();
    let frames = face_frames(face);
    let mut ruled = rule_face(0, face, &frames, options, &ctx)?;
    if options.equalize_rulings {
        if let (_, Some(warning)) = equalize_face(&mut ruled, options) {
            ruled.diagnostics.add_warning(warning);
        }
    }
    mesh_face(face, ruled, options, &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_map_to_ruling_axes() {
        assert_eq!(PatchSide::UMin.ruling_axis(), ParamAxis::V);
        assert_eq!(PatchSide::VMax.ruling_axis(), ParamAxis::U);
    }

    #[test]
    fn pair_mut_handles_both_orders() {
        let mut items = [1, 2, 3];
        let (a, b) = pair_mut(&mut items, 2, 0).unwrap();
        std::mem::swap(a, b);
        assert_eq!(items, [3, 2, 1]);
        assert!(pair_mut(&mut items, 1, 1).is_none());
        assert!(pair_mut(&mut items, 0, 3).is_none());
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let ctx = FacetContext::with_cancel(flag.clone());
        assert!(ctx.check().is_ok());
        flag.cancel();
        assert_eq!(ctx.check(), Err(FacetError::Cancelled));
    }
}
