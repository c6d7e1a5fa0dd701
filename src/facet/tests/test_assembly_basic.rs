//! Grid assembly: vertex layout, diagonal choice, trimming and orientation.

use std::collections::HashMap;

use crate::facet::{FacetOptions, WorkingFace, assemble_grid, facet_face};
use crate::geom::{
    FacetMesh, Interval, ParBox, ParPos, PlaneSurface, Point3, TrimLoop, TrimRegion, Vec3,
};

fn unit_plane() -> PlaneSurface {
    PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::Y)
}

fn first_normal_z(mesh: &FacetMesh) -> f64 {
    let p = |i: usize| mesh.positions[mesh.indices[i] as usize];
    let (a, b, c) = (p(0), p(1), p(2));
    let (ab, ac) = ([b[0] - a[0], b[1] - a[1]], [c[0] - a[0], c[1] - a[1]]);
    ab[0] * ac[1] - ab[1] * ac[0]
}

/// Regular polygon approximating a circle, counter-clockwise.
fn circle_trim(center: ParPos, radius: f64, sides: u32) -> TrimRegion {
    let points = (0..sides)
        .map(|k| {
            let angle = std::f64::consts::TAU * f64::from(k) / f64::from(sides);
            ParPos::new(center.u + radius * angle.cos(), center.v + radius * angle.sin())
        })
        .collect();
    TrimRegion::new(TrimLoop::new(points).unwrap(), Vec::new()).unwrap()
}

fn polygon_area(radius: f64, sides: u32) -> f64 {
    let n = f64::from(sides);
    0.5 * n * radius * radius * (std::f64::consts::TAU / n).sin()
}

/// Vertices on edges used by a single triangle.
fn open_edge_vertices(mesh: &FacetMesh) -> Vec<[f64; 3]> {
    let mut counts: HashMap<(u32, u32), usize> = HashMap::new();
    for tri in mesh.indices.chunks_exact(3) {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            *counts.entry((a.min(b), a.max(b))).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|&(_, n)| n == 1)
        .flat_map(|((a, b), _)| [mesh.positions[a as usize], mesh.positions[b as usize]])
        .collect()
}

fn assert_on_circle(mesh: &FacetMesh, radius: f64, sides: u32) {
    let inner = radius * (std::f64::consts::PI / f64::from(sides)).cos();
    let boundary = open_edge_vertices(mesh);
    assert!(!boundary.is_empty());
    for p in boundary {
        let r = (p[0] - 0.5).hypot(p[1] - 0.5);
        assert!(r >= inner - 1e-9 && r <= radius + 1e-9, "boundary vertex {p:?} at radius {r}");
    }
}

#[test]
fn grid_nodes_and_triangles() {
    let plane = unit_plane();
    let face = WorkingFace::new(&plane);
    let grid = assemble_grid(&face, &[0.0, 0.5, 1.0], &[0.0, 0.5, 1.0]);
    assert_eq!(grid.mesh.vertex_count(), 9);
    assert_eq!(grid.mesh.triangle_count(), 8);
    assert_eq!(grid.trimmed_triangles, 0);
    let uvs = grid.mesh.uvs.as_ref().unwrap();
    assert_eq!(uvs[4], [0.5, 0.5]);
    assert_eq!(grid.mesh.positions[5], [1.0, 0.5, 0.0]);
    assert!(first_normal_z(&grid.mesh) > 0.0);
    grid.mesh.validate().unwrap();
}

#[test]
fn shorter_diagonal_is_used() {
    // Shear the plane so that the (1,0)-(0,1) diagonal is the short one.
    let plane = PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::new(0.8, 1.0, 0.0));
    let face = WorkingFace::new(&plane);
    let grid = assemble_grid(&face, &[0.0, 1.0], &[0.0, 1.0]);
    assert_eq!(grid.mesh.indices, vec![0, 1, 2, 1, 3, 2]);
}

#[test]
fn reversed_face_flips_winding() {
    let plane = unit_plane();
    let face = WorkingFace::new(&plane).reversed(true);
    let grid = assemble_grid(&face, &[0.0, 0.5, 1.0], &[0.0, 1.0]);
    assert!(first_normal_z(&grid.mesh) < 0.0);
}

#[test]
fn trimmed_cells_are_dropped() {
    let plane = unit_plane();
    let half = ParBox::new(Interval::new(0.0, 0.5), Interval::new(0.0, 1.0));
    let trim = TrimRegion::new(TrimLoop::rectangle(&half), Vec::new()).unwrap();
    let face = WorkingFace::new(&plane).with_trim(trim);
    assert_eq!(face.active_region(), half);

    let grid = assemble_grid(&face, &[0.0, 0.5, 1.0], &[0.0, 0.5, 1.0]);
    assert_eq!(grid.trimmed_triangles, 4);
    assert_eq!(grid.mesh.triangle_count(), 4);
    assert_eq!(grid.mesh.vertex_count(), 6);
    assert!(grid.mesh.positions.iter().all(|p| p[0] <= 0.5));
}

#[test]
fn too_few_params_give_an_empty_mesh() {
    let plane = unit_plane();
    let face = WorkingFace::new(&plane);
    let grid = assemble_grid(&face, &[0.5], &[0.0, 1.0]);
    assert!(grid.mesh.is_empty());
    assert_eq!(grid.mesh.vertex_count(), 0);
}

#[test]
fn circular_trim_is_cut_along_the_loop() {
    let plane = unit_plane();
    let face = WorkingFace::new(&plane).with_trim(circle_trim(ParPos::new(0.5, 0.5), 0.3, 64));
    let lines: Vec<f64> = (0..=6).map(|k| 0.2 + 0.1 * f64::from(k)).collect();

    let grid = assemble_grid(&face, &lines, &lines);
    assert!(grid.trimmed_triangles > 0);
    assert!((grid.mesh.surface_area() - polygon_area(0.3, 64)).abs() < 1e-9);
    assert_on_circle(&grid.mesh, 0.3, 64);
    for t in 0..grid.mesh.triangle_count() {
        let [a, b, c] = grid.mesh.triangle(t).unwrap();
        let turn = (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
        assert!(turn > 0.0, "triangle {t} is not counter-clockwise");
    }
    grid.mesh.validate().unwrap();
}

#[test]
fn hole_inside_one_cell_is_bridged() {
    let plane = unit_plane();
    let unit = ParBox::new(Interval::new(0.0, 1.0), Interval::new(0.0, 1.0));
    let small = ParBox::new(Interval::new(0.3, 0.4), Interval::new(0.3, 0.4));
    let trim =
        TrimRegion::new(TrimLoop::rectangle(&unit), vec![TrimLoop::rectangle(&small)]).unwrap();
    let face = WorkingFace::new(&plane).with_trim(trim);

    let grid = assemble_grid(&face, &[0.0, 0.5, 1.0], &[0.0, 0.5, 1.0]);
    assert_eq!(grid.trimmed_triangles, 2);
    assert_eq!(grid.mesh.vertex_count(), 13);
    assert!((grid.mesh.surface_area() - 0.99).abs() < 1e-12);
    for t in 0..grid.mesh.triangle_count() {
        let [a, b, c] = grid.mesh.triangle(t).unwrap();
        let (x, y) = ((a.x + b.x + c.x) / 3.0, (a.y + b.y + c.y) / 3.0);
        let in_hole = x > 0.3 && x < 0.4 && y > 0.3 && y < 0.4;
        assert!(!in_hole, "triangle {t} covers the hole");
    }
    grid.mesh.validate().unwrap();
}

#[test]
fn trimmed_face_ends_on_the_trim_loop() {
    let plane = unit_plane();
    let face = WorkingFace::new(&plane).with_trim(circle_trim(ParPos::new(0.5, 0.5), 0.3, 64));
    let mut options = FacetOptions::new();
    options.max_edge_length = Some(0.1);

    let facets = facet_face(&face, &options).unwrap();
    assert!(facets.diagnostics.trimmed_triangle_count > 0);
    assert!((facets.mesh.surface_area() - polygon_area(0.3, 64)).abs() < 1e-9);
    assert_on_circle(&facets.mesh, 0.3, 64);
    facets.mesh.validate().unwrap();
}
