//! Multi-face bodies: shared boundaries, welding and cancellation.

use std::collections::HashMap;

use facet_engine::facet::{
    CancelFlag, FacetContext, FacetError, FacetOptions, PatchSide, SharedBoundary, WarningKind,
    WorkingFace, facet_body,
};
use facet_engine::geom::{
    BezierSurface, CylinderSurface, FacetMesh, Interval, ParBox, PlaneSurface, Point3, Vec3,
};

/// Quadratic patch raised in the middle, with control rows at the given y.
fn bump_with_rows(origin_x: f64, rows: [f64; 3]) -> BezierSurface {
    let mut points = Vec::with_capacity(9);
    for i in 0..3_u8 {
        for (j, &y) in rows.iter().enumerate() {
            let z = if i == 1 && j == 1 { 1.5 } else { 0.0 };
            points.push(Point3::new(origin_x + f64::from(i), y, z));
        }
    }
    BezierSurface::new(points, 2, 2).unwrap()
}

fn bump(origin_x: f64) -> BezierSurface {
    bump_with_rows(origin_x, [0.0, 2.0, 4.0])
}

fn assert_seam_closed(mesh: &FacetMesh) {
    for (a, b) in open_edges(mesh) {
        let (pa, pb) = (mesh.positions[a as usize], mesh.positions[b as usize]);
        let on_seam = (pa[0] - 1.0).abs() < 1e-9 && (pb[0] - 1.0).abs() < 1e-9;
        assert!(!on_seam, "crack between {pa:?} and {pb:?}");
    }
}

fn open_edges(mesh: &FacetMesh) -> Vec<(u32, u32)> {
    let mut counts: HashMap<(u32, u32), usize> = HashMap::new();
    for tri in mesh.indices.chunks_exact(3) {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            *counts.entry((a.min(b), a.max(b))).or_default() += 1;
        }
    }
    counts.into_iter().filter(|&(_, n)| n == 1).map(|(e, _)| e).collect()
}

fn joined() -> SharedBoundary {
    SharedBoundary {
        face_a: 0,
        side_a: PatchSide::UMax,
        face_b: 1,
        side_b: PatchSide::UMin,
        reversed: false,
    }
}

#[test]
fn plane_and_bump_weld_without_cracks() {
    let plane = PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::new(0.0, 4.0, 0.0));
    let bump = bump(1.0);
    let faces = [WorkingFace::new(&plane), WorkingFace::new(&bump)];
    let options = FacetOptions::with_sag(0.01);

    let body = facet_body(&faces, &[joined()], &options, &FacetContext::new()).unwrap();
    let diagnostics = &body.diagnostics;
    assert_eq!(diagnostics.faces.len(), 2);
    assert!(diagnostics.reconcile_passes >= 1);
    assert_eq!(diagnostics.faces[0].v_rungs, diagnostics.faces[1].v_rungs);
    assert!(diagnostics.faces[1].v_rungs > 1);
    assert_eq!(diagnostics.non_manifold_edge_count, 0);

    // No open edge may run along the shared line x = 1.
    assert_seam_closed(&body.mesh);
    assert_eq!(body.faces.len(), 2);
    assert!(body.faces.iter().all(|f| f.uvs.is_some()));
    assert!(body.mesh.uvs.is_none());
    body.mesh.validate().unwrap();
}

#[test]
fn unevenly_parameterized_edge_welds_by_arc_length() {
    // The bump's u = 0 edge runs y = 0.8v + 3.2v^2 while the plane's runs
    // y = 4v, so equal parameters land at different points.
    let plane = PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::new(0.0, 4.0, 0.0));
    let bump = bump_with_rows(1.0, [0.0, 0.4, 4.0]);
    let faces = [WorkingFace::new(&plane), WorkingFace::new(&bump)];

    let options = FacetOptions::with_sag(0.01);
    let body = facet_body(&faces, &[joined()], &options, &FacetContext::new()).unwrap();
    let diagnostics = &body.diagnostics;
    assert_eq!(diagnostics.faces[0].v_rungs, diagnostics.faces[1].v_rungs);
    assert!(diagnostics.faces[1].v_rungs > 1);
    assert!(
        diagnostics.warnings.iter().all(|w| w.kind != WarningKind::BoundaryCrack),
        "{:?}",
        diagnostics.warnings
    );
    assert_eq!(diagnostics.non_manifold_edge_count, 0);
    assert_seam_closed(&body.mesh);
    body.mesh.validate().unwrap();
}

#[test]
fn sides_that_never_meet_are_reported_as_cracks() {
    let lifted = PlaneSurface::new(Point3::new(0.0, 0.0, 0.5), Vec3::X, Vec3::new(0.0, 4.0, 0.0));
    let bump = bump(1.0);
    let faces = [WorkingFace::new(&lifted), WorkingFace::new(&bump)];

    let options = FacetOptions::with_sag(0.01);
    let body = facet_body(&faces, &[joined()], &options, &FacetContext::new()).unwrap();
    let crack = body
        .diagnostics
        .warnings
        .iter()
        .find(|w| w.kind == WarningKind::BoundaryCrack)
        .expect("crack warning");
    assert_eq!(crack.face, Some(0));
}

#[test]
fn split_cylinder_closes_both_seams() {
    let cyl = CylinderSurface::new(Point3::ORIGIN, Vec3::new(0.0, 0.0, 4.0), 2.0).unwrap();
    let half = |lo: f64, hi: f64| ParBox::new(Interval::new(lo, hi), Interval::new(0.0, 1.0));
    let faces = [
        WorkingFace::new(&cyl).with_region(half(0.0, 0.5)),
        WorkingFace::new(&cyl).with_region(half(0.5, 1.0)),
    ];
    let shared = [
        joined(),
        SharedBoundary {
            face_a: 1,
            side_a: PatchSide::UMax,
            face_b: 0,
            side_b: PatchSide::UMin,
            reversed: false,
        },
    ];
    let options = FacetOptions::with_sag(0.01);
    let body = facet_body(&faces, &shared, &options, &FacetContext::new()).unwrap();

    for (a, b) in open_edges(&body.mesh) {
        let (za, zb) = (body.mesh.positions[a as usize][2], body.mesh.positions[b as usize][2]);
        let rim = |z: f64| z.abs() < 1e-9 || (z - 4.0).abs() < 1e-9;
        assert!(rim(za) && rim(zb), "open edge off the rims at z={za},{zb}");
    }
    assert_eq!(body.diagnostics.open_edge_count, open_edges(&body.mesh).len());
    assert_eq!(body.diagnostics.faces[0].u_rungs, body.diagnostics.faces[1].u_rungs);
}

#[test]
fn unknown_face_is_rejected() {
    let plane = PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::Y);
    let faces = [WorkingFace::new(&plane)];
    let err =
        facet_body(&faces, &[joined()], &FacetOptions::new(), &FacetContext::new()).unwrap_err();
    assert_eq!(err, FacetError::UnknownFace { index: 1 });
}

#[test]
fn cancelled_run_stops() {
    let plane = PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::Y);
    let faces = [WorkingFace::new(&plane), WorkingFace::new(&plane)];
    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = facet_body(&faces, &[], &FacetOptions::new(), &FacetContext::with_cancel(cancel));
    assert_eq!(result.unwrap_err(), FacetError::Cancelled);
}

#[test]
fn body_diagnostics_serialize() {
    let plane = PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::Y);
    let faces = [WorkingFace::new(&plane)];
    let body = facet_body(&faces, &[], &FacetOptions::new(), &FacetContext::new()).unwrap();
    let json = serde_json::to_value(&body.diagnostics).unwrap();
    assert_eq!(json["faces"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["reconcile_passes"], 0);
    assert!(body.diagnostics.to_string().contains("Faces: 1"));
}
