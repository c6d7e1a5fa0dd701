//! Reconciling ladders ruled on neighbouring surfaces.

use crate::facet::{
    BoundaryCurve, FacetOptions, Ladder, ReconcileOutcome, RulingInput, ladder_frame,
    reconcile_shared_boundary, setup_ruling,
};
use crate::geom::{
    CylinderSurface, Interval, ParTransform, ParamAxis, PlaneSurface, Point3, ProfileOptions,
    Surface, Tolerance, Vec3, curvature_profile,
};

fn rule<'t, S: Surface>(
    surface: &S,
    options: &FacetOptions,
    frame: &'t ParTransform,
) -> Ladder<'t> {
    let profile = curvature_profile(surface, None, &ProfileOptions::default());
    let input = RulingInput::new(&profile.u, surface.domain(), ParamAxis::U).with_options(options);
    setup_ruling(&input, frame).unwrap().into_parts().0
}

/// Both ladders tile the same 10-unit segment in proportion to their
/// parameters; a reversed side walks it backwards.
fn segment(range: Interval, reversed: bool) -> BoundaryCurve<impl Fn(f64) -> Point3> {
    BoundaryCurve::new(range, move |t| {
        let f = range.normalize(t);
        Point3::new(10.0 * if reversed { 1.0 - f } else { f }, 0.0, 0.0)
    })
}

fn reconcile(
    a: &mut Ladder<'_>,
    b: &mut Ladder<'_>,
    reversed: bool,
    ceiling: usize,
) -> ReconcileOutcome {
    let (curve_a, curve_b) = (segment(a.param_range(), false), segment(b.param_range(), reversed));
    reconcile_shared_boundary(a, b, (&curve_a, &curve_b), reversed, ceiling, Tolerance::WELD)
}

fn pair<'t>(frame: &'t ParTransform) -> (Ladder<'t>, Ladder<'t>) {
    let plane =
        PlaneSurface::new(Point3::ORIGIN, Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0));
    let cyl = CylinderSurface::new(Point3::ORIGIN, Vec3::new(0.0, 0.0, 10.0), 5.0).unwrap();
    let mut plane_options = FacetOptions::with_sag(0.05);
    plane_options.max_edge_length = Some(1.0);
    (
        rule(&plane, &plane_options, frame),
        rule(&cyl, &FacetOptions::with_sag(0.05), frame),
    )
}

#[test]
fn coarser_side_is_raised_to_the_finer() {
    let frame = ladder_frame(ParamAxis::U, false);
    let (mut flat, mut round) = pair(&frame);
    assert_eq!((flat.count(), round.count()), (10, 23));

    let outcome = reconcile(&mut flat, &mut round, false, 512);
    assert_eq!(outcome, ReconcileOutcome::Raised { from: 10, to: 23 });
    assert_eq!(flat.count(), round.count());
    let (span_a, span_b) = (flat.param_range(), round.param_range());
    for (a, b) in flat.params().iter().zip(round.params()) {
        assert!((span_a.normalize(*a) - span_b.normalize(b)).abs() < 1e-9);
    }
}

#[test]
fn settled_boundary_is_unchanged() {
    let frame = ladder_frame(ParamAxis::U, false);
    let (mut flat, mut round) = pair(&frame);
    reconcile(&mut flat, &mut round, false, 512);
    assert_eq!(reconcile(&mut flat, &mut round, false, 512), ReconcileOutcome::Unchanged);
    assert_eq!(reconcile(&mut flat, &mut round, true, 512), ReconcileOutcome::Unchanged);
}

#[test]
fn ceiling_below_both_counts_caps() {
    let frame = ladder_frame(ParamAxis::U, false);
    let (mut flat, mut round) = pair(&frame);
    let outcome = reconcile(&mut flat, &mut round, false, 12);
    assert!(matches!(outcome, ReconcileOutcome::Capped { count_a: 12, count_b: 23, .. }));
    assert!(!outcome.changed());
}
