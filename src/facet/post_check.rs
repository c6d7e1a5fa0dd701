//! Post-check subdivision of an assembled face mesh.
//!
//! Every facet is compared against the surface it approximates: centroid and
//! edge-midpoint deviation, edge length, shape quality and the normal change
//! across interior edges. Edges that fail are marked and split at their UV
//! midpoint (evaluated on the surface), and every facet touching a marked
//! edge is re-tiled so the mesh stays conforming:
//!
//! - one marked edge: bisection into two facets;
//! - two marked edges: three facets, the quad split along its shorter diagonal;
//! - three marked edges: four facets (regular split).
//!
//! Boundary edges are locked so the tiling shared with neighbouring faces is
//! untouched. The exceptions are seam edges: boundary edges whose endpoints
//! coincide with another boundary edge of the same face (closed directions)
//! are split together with their twin and welded afterwards. Edges collapsed
//! onto a pole are never split.
//!
//! Each edge carries an [`EdgeErrorCache`]. Its `change_count` grows with
//! every split in its lineage; once it reaches `max_edge_retries` the edge is
//! frozen and a facet that still fails is accepted and counted as a
//! violation.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::geom::{FacetMesh, Point3, Surface, Tolerance, Vec3};

use super::options::FacetOptions;

/// Hard bound on subdivision passes, independent of the retry limit.
const MAX_PASSES: usize = 16;
/// Relative slack on every tolerance comparison.
const CHECK_SLACK: f64 = 1e-9;

type EdgeKey = (u32, u32);

fn edge_key(a: u32, b: u32) -> EdgeKey {
    (a.min(b), a.max(b))
}

/// Per-edge tolerances and split history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeErrorCache {
    pub permitted_sag: f64,
    /// Minimum facet quality; zero disables the check.
    pub min_aspect: f64,
    pub permitted_edge_length: f64,
    /// Cosine of the permitted normal change; `-inf` disables the check.
    pub min_normal_dot: f64,
    /// Splits in this edge's lineage.
    pub change_count: u32,
    pub centroid_test: bool,
}

impl EdgeErrorCache {
    #[must_use]
    pub fn new(options: &FacetOptions) -> Self {
        Self {
            permitted_sag: options.sag_limit(),
            min_aspect: options.min_aspect_quality,
            permitted_edge_length: options.edge_limit(),
            min_normal_dot: options
                .max_normal_angle_deg
                .map_or(f64::NEG_INFINITY, |deg| deg.to_radians().cos()),
            change_count: 0,
            centroid_test: options.centroid_test,
        }
    }

    /// Cache for an edge born from a split of this one.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            change_count: self.change_count.saturating_add(1),
            ..*self
        }
    }

    /// Whether any check can fail at all.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.permitted_sag.is_finite()
            || self.permitted_edge_length.is_finite()
            || self.min_normal_dot > -1.0
            || self.min_aspect > 0.0
    }

    #[must_use]
    pub fn exceeds_sag(&self, deviation: f64) -> bool {
        deviation > self.permitted_sag * (1.0 + CHECK_SLACK)
    }

    #[must_use]
    pub fn exceeds_length(&self, length: f64) -> bool {
        length > self.permitted_edge_length * (1.0 + CHECK_SLACK)
    }

    #[must_use]
    pub fn normals_too_far(&self, dot: f64) -> bool {
        dot < self.min_normal_dot - CHECK_SLACK
    }

    #[must_use]
    pub fn poor_quality(&self, quality: f64) -> bool {
        quality < self.min_aspect - CHECK_SLACK
    }
}

/// What post-check did to one face.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PostCheckReport {
    pub passes: usize,
    pub split_edges: usize,
    pub added_nodes: usize,
    /// Failing checks in the final pass that no split could address.
    pub violations: usize,
    /// Largest centroid or midpoint deviation measured in the final pass.
    pub max_deviation: f64,
}

/// Edge adjacency of one pass, with node position classes for seam and pole
/// detection.
struct EdgeTopology {
    classes: Vec<u32>,
    adjacency: HashMap<EdgeKey, Vec<usize>>,
    twins: HashMap<EdgeKey, Vec<EdgeKey>>,
}

impl EdgeTopology {
    fn build(mesh: &FacetMesh, tol: Tolerance) -> Self {
        let classes = mesh.position_classes(tol);
        let mut adjacency: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
        for (t, tri) in mesh.indices.chunks_exact(3).enumerate() {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                adjacency.entry(edge_key(a, b)).or_default().push(t);
            }
        }

        let mut by_class: HashMap<EdgeKey, Vec<EdgeKey>> = HashMap::new();
        for (&edge, tris) in &adjacency {
            let (ca, cb) = (classes[edge.0 as usize], classes[edge.1 as usize]);
            if tris.len() == 1 && ca != cb {
                by_class.entry(edge_key(ca, cb)).or_default().push(edge);
            }
        }
        let mut twins = HashMap::new();
        for group in by_class.into_values().filter(|g| g.len() > 1) {
            for &edge in &group {
                let others: Vec<EdgeKey> = group.iter().copied().filter(|&e| e != edge).collect();
                twins.insert(edge, others);
            }
        }

        Self {
            classes,
            adjacency,
            twins,
        }
    }

    fn is_pole(&self, edge: EdgeKey) -> bool {
        self.classes[edge.0 as usize] == self.classes[edge.1 as usize]
    }

    fn is_locked(&self, edge: EdgeKey) -> bool {
        let boundary = self.adjacency.get(&edge).is_none_or(|tris| tris.len() < 2);
        boundary && !self.twins.contains_key(&edge)
    }

    fn twins_of(&self, edge: EdgeKey) -> &[EdgeKey] {
        self.twins.get(&edge).map_or(&[], Vec::as_slice)
    }

    /// Edges in a stable order so passes are reproducible.
    fn sorted_edges(&self) -> Vec<EdgeKey> {
        let mut edges: Vec<EdgeKey> = self.adjacency.keys().copied().collect();
        edges.sort_unstable();
        edges
    }
}

struct Marker<'a> {
    topology: &'a EdgeTopology,
    cache: &'a HashMap<EdgeKey, EdgeErrorCache>,
    base: EdgeErrorCache,
    max_retries: u32,
    marked: HashSet<EdgeKey>,
    refused: usize,
}

impl Marker<'_> {
    fn cache_of(&self, edge: EdgeKey) -> EdgeErrorCache {
        self.cache.get(&edge).copied().unwrap_or(self.base)
    }

    fn can_split(&self, edge: EdgeKey) -> bool {
        if self.topology.is_pole(edge) || self.topology.is_locked(edge) {
            return false;
        }
        std::iter::once(&edge)
            .chain(self.topology.twins_of(edge))
            .all(|&e| self.cache_of(e).change_count < self.max_retries)
    }

    fn mark(&mut self, edge: EdgeKey) -> bool {
        if self.marked.contains(&edge) {
            return true;
        }
        if !self.can_split(edge) {
            return false;
        }
        self.marked.insert(edge);
        self.marked.extend(self.topology.twins_of(edge).iter().copied());
        true
    }

    /// Marks every splittable edge of a failing check; a check with none is
    /// a violation.
    fn mark_any(&mut self, edges: &[EdgeKey]) {
        let mut any = false;
        for &edge in edges {
            any |= self.mark(edge);
        }
        if !any {
            self.refused += 1;
        }
    }
}

fn point(mesh: &FacetMesh, i: u32) -> Point3 {
    mesh.point(i).unwrap_or(Point3::ORIGIN)
}

fn uv_mid(uvs: &[[f64; 2]], nodes: &[u32]) -> [f64; 2] {
    let n = nodes.len() as f64;
    let (su, sv) = nodes.iter().fold((0.0, 0.0), |(su, sv), &i| {
        let uv = uvs.get(i as usize).copied().unwrap_or([0.0, 0.0]);
        (su + uv[0], sv + uv[1])
    });
    [su / n, sv / n]
}

fn facet_normal(mesh: &FacetMesh, tri: &[u32]) -> Option<Vec3> {
    let (a, b, c) = (point(mesh, tri[0]), point(mesh, tri[1]), point(mesh, tri[2]));
    b.sub_point(a).cross(c.sub_point(a)).normalized()
}

/// Runs every check once, marking edges. Returns the largest deviation seen.
fn evaluate<S: Surface + ?Sized>(surface: &S, mesh: &FacetMesh, marker: &mut Marker<'_>) -> f64 {
    let Some(uvs) = mesh.uvs.as_deref() else {
        return 0.0;
    };
    let base = marker.base;
    let topology = marker.topology;
    let edges = topology.sorted_edges();
    let mut max_deviation = 0.0_f64;

    for &edge in &edges {
        if topology.is_pole(edge) {
            continue;
        }
        let cache = marker.cache_of(edge);
        let (pa, pb) = (point(mesh, edge.0), point(mesh, edge.1));
        let mut fail = cache.exceeds_length(pa.distance_to(pb));
        if cache.permitted_sag.is_finite() {
            let [u, v] = uv_mid(uvs, &[edge.0, edge.1]);
            let deviation = surface.point_at(u, v).distance_to(pa.lerp(pb, 0.5));
            max_deviation = max_deviation.max(deviation);
            fail |= cache.exceeds_sag(deviation);
        }
        if fail {
            marker.mark_any(&[edge]);
        }
    }

    for tri in mesh.indices.chunks_exact(3) {
        let (a, b, c) = (tri[0], tri[1], tri[2]);
        let keys = [edge_key(a, b), edge_key(b, c), edge_key(c, a)];
        if keys.iter().any(|&k| topology.is_pole(k)) {
            continue;
        }
        let (pa, pb, pc) = (point(mesh, a), point(mesh, b), point(mesh, c));
        let twice_area = pb.sub_point(pa).cross(pc.sub_point(pa)).length();
        let lengths = [pa.distance_to(pb), pb.distance_to(pc), pc.distance_to(pa)];
        let sum_sq: f64 = lengths.iter().map(|l| l * l).sum();
        if twice_area <= Tolerance::ZERO_LENGTH.eps * sum_sq {
            continue;
        }

        if base.centroid_test && base.permitted_sag.is_finite() {
            let [u, v] = uv_mid(uvs, tri);
            let deviation = surface.point_at(u, v).distance_to(Point3::centroid3(pa, pb, pc));
            max_deviation = max_deviation.max(deviation);
            if base.exceeds_sag(deviation) {
                marker.mark_any(&keys);
            }
        }

        if base.min_aspect > 0.0 {
            // 4 sqrt(3) area / sum(l^2); one for an equilateral facet.
            let quality = 2.0 * 3.0_f64.sqrt() * twice_area / sum_sq;
            if base.poor_quality(quality) {
                let longest = (0..3)
                    .max_by(|&i, &j| lengths[i].total_cmp(&lengths[j]))
                    .unwrap_or(0);
                marker.mark_any(&[keys[longest]]);
            }
        }
    }

    if base.min_normal_dot > -1.0 {
        for &edge in &edges {
            let Some(tris) = topology.adjacency.get(&edge) else {
                continue;
            };
            let [t0, t1] = tris.as_slice() else {
                continue;
            };
            let n0 = facet_normal(mesh, &mesh.indices[t0 * 3..t0 * 3 + 3]);
            let n1 = facet_normal(mesh, &mesh.indices[t1 * 3..t1 * 3 + 3]);
            if let (Some(n0), Some(n1)) = (n0, n1) {
                if base.normals_too_far(n0.dot(n1)) {
                    marker.mark_any(&[edge]);
                }
            }
        }
    }

    max_deviation
}

/// Re-tiles one facet given the midpoint nodes of its marked edges, keeping
/// its winding.
fn split_triangle(
    mesh: &FacetMesh,
    tri: [u32; 3],
    mids: [Option<u32>; 3],
    out: &mut Vec<[u32; 3]>,
) {
    let rotated = |r: usize| {
        (
            [tri[r], tri[(r + 1) % 3], tri[(r + 2) % 3]],
            [mids[r], mids[(r + 1) % 3], mids[(r + 2) % 3]],
        )
    };
    match mids.iter().filter(|m| m.is_some()).count() {
        1 => {
            let r = mids.iter().position(Option::is_some).unwrap_or(0);
            let ([a, b, c], [m0, ..]) = rotated(r);
            let Some(m) = m0 else {
                out.push(tri);
                return;
            };
            out.extend([[a, m, c], [m, b, c]]);
        }
        2 => {
            let free = mids.iter().position(Option::is_none).unwrap_or(2);
            let ([a, b, c], [m0, m1, _]) = rotated((free + 1) % 3);
            let (Some(m0), Some(m1)) = (m0, m1) else {
                out.push(tri);
                return;
            };
            out.push([m0, b, m1]);
            let diag_a = point(mesh, a).distance_to(point(mesh, m1));
            let diag_b = point(mesh, m0).distance_to(point(mesh, c));
            if diag_a <= diag_b {
                out.extend([[a, m0, m1], [a, m1, c]]);
            } else {
                out.extend([[a, m0, c], [m0, m1, c]]);
            }
        }
        3 => {
            let [a, b, c] = tri;
            let (Some(m0), Some(m1), Some(m2)) = (mids[0], mids[1], mids[2]) else {
                out.push(tri);
                return;
            };
            out.extend([[a, m0, m2], [m0, b, m1], [m2, m1, c], [m0, m1, m2]]);
        }
        _ => out.push(tri),
    }
}

/// Splits every marked edge and re-tiles the facets around them. Returns the
/// number of nodes added.
fn split_marked<S: Surface + ?Sized>(
    surface: &S,
    mesh: &mut FacetMesh,
    marked: &HashSet<EdgeKey>,
    cache: &mut HashMap<EdgeKey, EdgeErrorCache>,
    base: EdgeErrorCache,
) -> usize {
    let mut order: Vec<EdgeKey> = marked.iter().copied().collect();
    order.sort_unstable();

    let first_new = mesh.positions.len() as u32;
    let mut mids: HashMap<EdgeKey, u32> = HashMap::with_capacity(order.len());
    for edge in order {
        let Some(uvs) = mesh.uvs.as_mut() else {
            return 0;
        };
        let [u, v] = uv_mid(uvs, &[edge.0, edge.1]);
        let node = mesh.positions.len() as u32;
        mesh.positions.push(surface.point_at(u, v).to_array());
        uvs.push([u, v]);
        mids.insert(edge, node);

        let child = cache.get(&edge).copied().unwrap_or(base).child();
        cache.insert(edge_key(edge.0, node), child);
        cache.insert(edge_key(node, edge.1), child);
    }

    let mut tiles: Vec<[u32; 3]> = Vec::with_capacity(mesh.triangle_count() * 2);
    for tri in mesh.indices.chunks_exact(3) {
        let tri = [tri[0], tri[1], tri[2]];
        let keys = [edge_key(tri[0], tri[1]), edge_key(tri[1], tri[2]), edge_key(tri[2], tri[0])];
        let facet_mids = keys.map(|k| mids.get(&k).copied());
        if facet_mids.iter().all(Option::is_none) {
            tiles.push(tri);
            continue;
        }

        let depth = keys
            .iter()
            .map(|k| cache.get(k).map_or(0, |c| c.change_count))
            .max()
            .unwrap_or(0);
        let inner = EdgeErrorCache {
            change_count: depth.saturating_add(1),
            ..base
        };
        let start = tiles.len();
        split_triangle(mesh, tri, facet_mids, &mut tiles);
        for child in &tiles[start..] {
            for (a, b) in [(child[0], child[1]), (child[1], child[2]), (child[2], child[0])] {
                if a >= first_new || b >= first_new {
                    cache.entry(edge_key(a, b)).or_insert(inner);
                }
            }
        }
    }

    mesh.indices = tiles.into_iter().flatten().collect();
    mesh.normals = None;
    mids.len()
}

/// Checks `mesh` against `surface` and subdivides the facets that miss a
/// tolerance.
///
/// # Arguments
/// * `surface` - The surface the mesh approximates; evaluated at UV midpoints.
/// * `mesh` - A face mesh carrying UVs. Meshes without UVs are left alone.
/// * `options` - Tolerances, retry limit and merge tolerance (for seams).
///
/// # Returns
/// What was split and how many failing checks were accepted.
pub fn post_check<S: Surface + ?Sized>(
    surface: &S,
    mesh: &mut FacetMesh,
    options: &FacetOptions,
) -> PostCheckReport {
    let mut report = PostCheckReport::default();
    let base = EdgeErrorCache::new(options);
    if mesh.uvs.is_none() || mesh.is_empty() || !base.is_active() {
        return report;
    }
    let merge_tol = Tolerance::new(options.merge_tolerance);
    let mut cache: HashMap<EdgeKey, EdgeErrorCache> = HashMap::new();

    loop {
        report.passes += 1;
        let topology = EdgeTopology::build(mesh, merge_tol);
        let mut marker = Marker {
            topology: &topology,
            cache: &cache,
            base,
            max_retries: options.max_edge_retries,
            marked: HashSet::new(),
            refused: 0,
        };
        report.max_deviation = evaluate(surface, mesh, &mut marker);
        report.violations = marker.refused;
        let marked = marker.marked;
        if marked.is_empty() {
            break;
        }
        if report.passes >= MAX_PASSES {
            report.violations += marked.len();
            break;
        }
        let added = split_marked(surface, mesh, &marked, &mut cache, base);
        report.split_edges += marked.len();
        report.added_nodes += added;
        log::trace!(
            "post-check pass {}: split {} edges, {} facets",
            report.passes,
            marked.len(),
            mesh.triangle_count()
        );
    }

    log::debug!(
        "post-check: {} passes, {} splits, {} violations, max deviation {:.3e}",
        report.passes,
        report.split_edges,
        report.violations,
        report.max_deviation
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::PlaneSurface;

    fn flat_square() -> (PlaneSurface, FacetMesh) {
        let plane = PlaneSurface::new(Point3::ORIGIN, Vec3::X, Vec3::Y);
        let mesh = FacetMesh::with_uvs(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
            vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            vec![0, 1, 2, 0, 2, 3],
        );
        (plane, mesh)
    }

    #[test]
    fn child_cache_counts_splits() {
        let cache = EdgeErrorCache::new(&FacetOptions::new());
        assert_eq!(cache.child().child().change_count, 2);
        assert!(cache.exceeds_sag(0.02));
        assert!(!cache.exceeds_sag(0.01));
    }

    #[test]
    fn one_marked_edge_bisects_with_same_winding() {
        let (_, mesh) = flat_square();
        let mut out = Vec::new();
        split_triangle(&mesh, [0, 1, 2], [Some(9), None, None], &mut out);
        assert_eq!(out, vec![[0, 9, 2], [9, 1, 2]]);
        out.clear();
        split_triangle(&mesh, [0, 1, 2], [Some(7), Some(8), Some(9)], &mut out);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn diagonal_is_split_on_flat_square_with_locked_boundary() {
        let (plane, mut mesh) = flat_square();
        let mut options = FacetOptions::new();
        options.max_edge_length = Some(1.2);
        let report = post_check(&plane, &mut mesh, &options);
        // The diagonal (1.41) splits once; the boundary edges already comply.
        assert_eq!(report.split_edges, 1);
        assert_eq!(report.violations, 0);
        assert_eq!(mesh.triangle_count(), 4);
        mesh.validate().unwrap();
        assert!((mesh.surface_area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn locked_boundary_edge_is_a_violation() {
        let (plane, mut mesh) = flat_square();
        let mut options = FacetOptions::new();
        options.max_edge_length = Some(0.9);
        let report = post_check(&plane, &mut mesh, &options);
        assert!(report.violations > 0);
        assert_eq!(mesh.edge_topology(), (4, 0));
    }
}
