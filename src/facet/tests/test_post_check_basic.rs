//! Post-check on assembled grids.

use crate::facet::{FacetOptions, WarningKind, WorkingFace, assemble_grid, facet_face, post_check};
use crate::geom::{BezierSurface, CylinderSurface, PlaneSurface, Point3, Vec3};

/// Bilinear patch over a non-planar quad: straight rulings, so ruling alone
/// leaves a single cell whose diagonal sags.
fn twisted_quad() -> BezierSurface {
    BezierSurface::bilinear(
        Point3::ORIGIN,
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(1.0, 1.0, 1.0),
    )
    .unwrap()
}

#[test]
fn long_diagonals_are_bisected() {
    let plane = PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::Y);
    let face = WorkingFace::new(&plane);
    let mut mesh = assemble_grid(&face, &[0.0, 0.5, 1.0], &[0.0, 0.5, 1.0]).mesh;
    let mut options = FacetOptions::new();
    options.max_edge_length = Some(0.6);

    let report = post_check(&plane, &mut mesh, &options);
    assert_eq!(report.split_edges, 4);
    assert_eq!(report.violations, 0);
    assert_eq!(mesh.triangle_count(), 16);
    assert_eq!(mesh.edge_topology(), (8, 0));
    assert!((mesh.surface_area() - 1.0).abs() < 1e-12);
}

#[test]
fn ruled_cylinder_needs_no_splits() {
    let cyl = CylinderSurface::new(Point3::ORIGIN, Vec3::new(0.0, 0.0, 10.0), 5.0).unwrap();
    let face = WorkingFace::new(&cyl);
    let facets = facet_face(&face, &FacetOptions::with_sag(0.05)).unwrap();
    let report = facets.diagnostics.post_check.clone().unwrap();
    assert_eq!(report.split_edges, 0);
    assert_eq!(report.violations, 0);
    assert!(report.max_deviation <= 0.05);
    assert_eq!(facets.diagnostics.u_rungs, 23);
    assert!(!facets.diagnostics.has_warnings());
}

#[test]
fn report_serializes() {
    let plane = PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::Y);
    let face = WorkingFace::new(&plane);
    let mut mesh = assemble_grid(&face, &[0.0, 1.0], &[0.0, 1.0]).mesh;
    let report = post_check(&plane, &mut mesh, &FacetOptions::new());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["split_edges"], 0);
    assert!(json.get("max_deviation").is_some());
}

#[test]
fn retry_bound_stops_splitting_and_reports_the_shortfall() {
    let quad = twisted_quad();
    let face = WorkingFace::new(&quad);
    let deviations: Vec<f64> = [0, 1, 4]
        .into_iter()
        .map(|retries| {
            let mut options = FacetOptions::with_sag(1e-4);
            options.max_edge_retries = retries;
            let facets = facet_face(&face, &options).unwrap();
            let report = facets.diagnostics.post_check.clone().unwrap();
            assert!(report.violations > 0, "retries {retries}: {report:?}");
            assert!(
                facets
                    .diagnostics
                    .warnings
                    .iter()
                    .any(|w| w.kind == WarningKind::ToleranceViolation),
                "retries {retries}: no tolerance warning"
            );
            facets.mesh.validate().unwrap();
            report.max_deviation
        })
        .collect();

    assert!(deviations[0] > 0.1, "{deviations:?}");
    assert!(deviations.windows(2).all(|w| w[1] <= w[0] + 1e-12), "{deviations:?}");
    assert!(deviations[2] < 0.5 * deviations[0], "{deviations:?}");
}
