//! Cutting grid cells along a trimming region.
//!
//! Every trim loop is split where it crosses a grid line, so each piece of
//! loop lies in a single cell. A cell no piece enters is kept or dropped
//! whole. A cell the loop passes through is traced into the polygons of its
//! kept part: follow a loop piece to where it leaves the cell, walk the cell
//! border counter-clockwise to the next piece, and repeat. The polygons are
//! then ear clipped, with holes lying wholly inside the cell bridged in.
//!
//! Nodes on a grid line are shared by the cells on either side of it, so
//! neighbouring cells stay conforming.

use std::collections::HashMap;
use std::ops::Range;

use crate::geom::{ParPos, Tolerance, TrimLoop, TrimRegion};

/// What a grid cell keeps of itself.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellFill {
    Whole,
    Empty,
    /// Triangles over grid and cut nodes, counter-clockwise in (u, v).
    Cut(Vec<[u32; 3]>),
}

/// Grid cells cut by a trimming region.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrimCut {
    /// Nodes added on the trim loops, numbered after the grid nodes.
    pub nodes: Vec<ParPos>,
    /// One entry per cell, rows of constant v in turn.
    pub cells: Vec<CellFill>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Vertex {
    node: u32,
    at: ParPos,
}

#[derive(Debug, Default)]
struct CellWork {
    /// Loop nodes lying on the cell border, corners excluded.
    border: Vec<Vertex>,
    /// Loop pieces entering and leaving the cell.
    chains: Vec<Vec<Vertex>>,
    /// Loops lying wholly in the cell, with their orientation.
    closed: Vec<(Vec<Vertex>, bool)>,
}

#[derive(Debug, Clone, Copy)]
struct CellBox {
    low: ParPos,
    high: ParPos,
}

impl CellBox {
    /// Counter-clockwise position along the border in `[0, 4)`, one unit
    /// per side, starting at the low corner.
    fn perimeter(&self, p: ParPos) -> f64 {
        let (lo, hi) = (self.low, self.high);
        let sides = [
            (p.v - lo.v).abs(),
            (p.u - hi.u).abs(),
            (p.v - hi.v).abs(),
            (p.u - lo.u).abs(),
        ];
        let side = (0..4).min_by(|&a, &b| sides[a].total_cmp(&sides[b])).unwrap_or(0);
        let (du, dv) = (hi.u - lo.u, hi.v - lo.v);
        let t = match side {
            0 => (p.u - lo.u) / du,
            1 => 1.0 + (p.v - lo.v) / dv,
            2 => 2.0 + (hi.u - p.u) / du,
            _ => 3.0 + (hi.v - p.v) / dv,
        };
        t.rem_euclid(4.0)
    }

    fn center(&self) -> ParPos {
        self.low.midpoint(self.high)
    }
}

/// Distance walked counter-clockwise from perimeter position `from` to `to`.
fn ahead(from: f64, to: f64) -> f64 {
    (to - from).rem_euclid(4.0)
}

/// Index of the grid line within `PARAM` of `x`.
fn line_at(lines: &[f64], x: f64) -> Option<usize> {
    let i = lines.partition_point(|&l| l < x);
    [i.checked_sub(1), Some(i)]
        .into_iter()
        .flatten()
        .filter(|&k| k < lines.len())
        .find(|&k| Tolerance::PARAM.approx_eq_f64(lines[k], x))
}

fn snap(lines: &[f64], x: f64) -> f64 {
    line_at(lines, x).map_or(x, |k| lines[k])
}

/// Spans whose closed extent holds `x`.
fn spans_holding(lines: &[f64], x: f64) -> Range<usize> {
    let spans = lines.len().saturating_sub(1);
    if let Some(k) = line_at(lines, x) {
        return k.saturating_sub(1)..(k + 1).min(spans);
    }
    let i = lines.partition_point(|&l| l < x);
    if i == 0 || i >= lines.len() {
        return 0..0;
    }
    i - 1..i
}

/// Span strictly holding `x`; `None` on a line or outside the grid.
fn span_inside(lines: &[f64], x: f64) -> Option<usize> {
    let i = lines.partition_point(|&l| l <= x);
    (i > 0 && i < lines.len() && lines[i - 1] < x).then(|| i - 1)
}

fn orient(a: ParPos, b: ParPos, c: ParPos) -> f64 {
    (b.u - a.u) * (c.v - a.v) - (b.v - a.v) * (c.u - a.u)
}

/// Signed distance of `p` from the line through `a` and `b`; positive on the
/// left.
fn side_of(a: ParPos, b: ParPos, p: ParPos) -> f64 {
    let len = a.distance_to(b);
    if len <= 0.0 { 0.0 } else { orient(a, b, p) / len }
}

fn signed_area(ring: &[Vertex]) -> f64 {
    let n = ring.len();
    0.5 * (0..n)
        .map(|i| {
            let (a, b) = (ring[i].at, ring[(i + 1) % n].at);
            a.u * b.v - b.u * a.v
        })
        .sum::<f64>()
}

fn ring_contains(ring: &[Vertex], p: ParPos) -> bool {
    let n = ring.len();
    let mut inside = false;
    for i in 0..n {
        let (a, b) = (ring[i].at, ring[(i + 1) % n].at);
        if (a.v > p.v) != (b.v > p.v) {
            let x = a.u + (p.v - a.v) / (b.v - a.v) * (b.u - a.u);
            if p.u < x {
                inside = !inside;
            }
        }
    }
    inside
}

struct Cutter<'g> {
    u: &'g [f64],
    v: &'g [f64],
    nodes: Vec<ParPos>,
    work: HashMap<usize, CellWork>,
    /// Cell each loop lies wholly in, if any.
    enclosed: Vec<Option<usize>>,
}

impl Cutter<'_> {
    fn spans_u(&self) -> usize {
        self.u.len() - 1
    }

    fn grid_node(&self, i: usize, j: usize) -> Vertex {
        Vertex {
            node: (j * self.u.len() + i) as u32,
            at: ParPos::new(self.u[i], self.v[j]),
        }
    }

    fn cell_box(&self, cell: usize) -> CellBox {
        let (i, j) = (cell % self.spans_u(), cell / self.spans_u());
        CellBox {
            low: ParPos::new(self.u[i], self.v[j]),
            high: ParPos::new(self.u[i + 1], self.v[j + 1]),
        }
    }

    fn vertex(&mut self, p: ParPos) -> Vertex {
        if let (Some(i), Some(j)) = (line_at(self.u, p.u), line_at(self.v, p.v)) {
            return self.grid_node(i, j);
        }
        let node = (self.u.len() * self.v.len() + self.nodes.len()) as u32;
        self.nodes.push(p);
        Vertex { node, at: p }
    }

    /// Cell holding the open segment `a`-`b`, judged by its midpoint.
    fn cell_of(&self, a: ParPos, b: ParPos) -> Option<usize> {
        let mid = a.midpoint(b);
        let i = span_inside(self.u, mid.u)?;
        let j = span_inside(self.v, mid.v)?;
        Some(j * self.spans_u() + i)
    }

    /// The loop as a ring with a node wherever it crosses a grid line.
    fn refine(&mut self, points: &[ParPos]) -> Vec<Vertex> {
        let snapped: Vec<ParPos> = points
            .iter()
            .map(|p| ParPos::new(snap(self.u, p.u), snap(self.v, p.v)))
            .collect();
        let n = snapped.len();
        let mut ring = Vec::with_capacity(n * 2);
        for k in 0..n {
            let (a, b) = (snapped[k], snapped[(k + 1) % n]);
            ring.push(self.vertex(a));
            let crossings = |lines: &[f64], from: f64, to: f64| -> Vec<f64> {
                let (lo, hi) = (from.min(to), from.max(to));
                lines
                    .iter()
                    .copied()
                    .filter(|&x| x > lo && x < hi)
                    .map(|x| (x - from) / (to - from))
                    .collect()
            };
            let mut cuts: Vec<(f64, ParPos)> = crossings(self.u, a.u, b.u)
                .into_iter()
                .chain(crossings(self.v, a.v, b.v))
                .map(|t| {
                    let p = ParPos::new(a.u + t * (b.u - a.u), a.v + t * (b.v - a.v));
                    (t, ParPos::new(snap(self.u, p.u), snap(self.v, p.v)))
                })
                .collect();
            cuts.sort_by(|x, y| x.0.total_cmp(&y.0));
            let mut last = a;
            for (_, p) in cuts {
                let tol = Tolerance::PARAM.eps;
                if p.distance_to(last) > tol && p.distance_to(b) > tol {
                    ring.push(self.vertex(p));
                    last = p;
                }
            }
        }
        ring
    }

    /// Splits one oriented loop into the cells it passes through.
    fn add_loop(&mut self, points: &[ParPos]) {
        let ring = self.refine(points);
        let m = ring.len();
        for vertex in &ring {
            let on_u = line_at(self.u, vertex.at.u).is_some();
            let on_v = line_at(self.v, vertex.at.v).is_some();
            if on_u == on_v {
                continue;
            }
            for j in spans_holding(self.v, vertex.at.v) {
                for i in spans_holding(self.u, vertex.at.u) {
                    let cell = j * self.spans_u() + i;
                    self.work.entry(cell).or_default().border.push(*vertex);
                }
            }
        }

        let cells: Vec<Option<usize>> = (0..m)
            .map(|k| self.cell_of(ring[k].at, ring[(k + 1) % m].at))
            .collect();
        if cells.iter().all(|&c| c == cells[0]) {
            self.enclosed.push(cells[0]);
            if let Some(cell) = cells[0] {
                let ccw = signed_area(&ring) > 0.0;
                self.work.entry(cell).or_default().closed.push((ring, ccw));
            }
            return;
        }
        self.enclosed.push(None);

        let start = (0..m).find(|&k| cells[k] != cells[(k + m - 1) % m]).unwrap_or(0);
        let mut k = 0;
        while k < m {
            let first = (start + k) % m;
            let cell = cells[first];
            let mut chain = vec![ring[first]];
            while k < m && cells[(start + k) % m] == cell {
                chain.push(ring[(start + k + 1) % m]);
                k += 1;
            }
            if let Some(cell) = cell {
                self.work.entry(cell).or_default().chains.push(chain);
            }
        }
    }

    /// Whether the cell lies inside the region, ignoring loops wholly
    /// inside it. Only meaningful when no loop crosses the cell.
    fn background_inside(&self, loops: &[&TrimLoop], cell: usize) -> bool {
        let center = self.cell_box(cell).center();
        let crossing_only = Tolerance::new(-1.0);
        let containing = loops
            .iter()
            .zip(&self.enclosed)
            .filter(|&(_, &enclosed)| enclosed != Some(cell))
            .filter(|(l, _)| l.contains(center, crossing_only))
            .count();
        containing % 2 == 1
    }

    fn fill(&self, loops: &[&TrimLoop], cell: usize, work: CellWork) -> CellFill {
        let cell_box = self.cell_box(cell);
        let (i, j) = (cell % self.spans_u(), cell / self.spans_u());
        let corners = [
            self.grid_node(i, j),
            self.grid_node(i + 1, j),
            self.grid_node(i + 1, j + 1),
            self.grid_node(i, j + 1),
        ];
        let mut border: Vec<(f64, Vertex)> = work
            .border
            .iter()
            .chain(&corners)
            .map(|&v| (cell_box.perimeter(v.at), v))
            .collect();
        border.sort_by(|a, b| a.0.total_cmp(&b.0));
        border.dedup_by_key(|(_, v)| v.node);

        let mut outers = trace(&work.chains, &border, &cell_box);
        let mut holes = Vec::new();
        for (ring, ccw) in work.closed {
            if ccw {
                outers.push(ring);
            } else {
                holes.push(ring);
            }
        }
        if work.chains.is_empty() && self.background_inside(loops, cell) {
            outers.push(border.into_iter().map(|(_, v)| v).collect());
        }

        let mut owned: Vec<Vec<Vec<Vertex>>> = vec![Vec::new(); outers.len()];
        for hole in holes {
            let Some(start) = hole.first().map(|v| v.at) else {
                continue;
            };
            let owner = outers
                .iter()
                .enumerate()
                .filter(|(_, outer)| ring_contains(outer, start))
                .min_by(|(_, a), (_, b)| signed_area(a).abs().total_cmp(&signed_area(b).abs()))
                .map(|(k, _)| k);
            if let Some(k) = owner {
                owned[k].push(hole);
            }
        }

        let triangles: Vec<[u32; 3]> = outers
            .into_iter()
            .zip(owned)
            .flat_map(|(outer, holes)| triangulate(outer, holes))
            .collect();
        if triangles.is_empty() { CellFill::Empty } else { CellFill::Cut(triangles) }
    }
}

/// Polygons of the kept part of a cell, from the loop pieces crossing it.
fn trace(chains: &[Vec<Vertex>], border: &[(f64, Vertex)], cell: &CellBox) -> Vec<Vec<Vertex>> {
    let entries: Vec<f64> = chains
        .iter()
        .map(|c| c.first().map_or(0.0, |v| cell.perimeter(v.at)))
        .collect();
    let mut used = vec![false; chains.len()];
    let mut polygons = Vec::new();
    for first in 0..chains.len() {
        if used[first] {
            continue;
        }
        let mut ring: Vec<Vertex> = Vec::new();
        let mut current = first;
        loop {
            used[current] = true;
            ring.extend_from_slice(&chains[current]);
            let Some(exit) = chains[current].last() else {
                break;
            };
            let exit_at = cell.perimeter(exit.at);
            let next = (0..chains.len())
                .filter(|&k| k == first || !used[k])
                .min_by(|&a, &b| ahead(exit_at, entries[a]).total_cmp(&ahead(exit_at, entries[b])));
            let Some(next) = next else {
                break;
            };
            let gap = ahead(exit_at, entries[next]);
            let mut passed: Vec<(f64, Vertex)> = border
                .iter()
                .filter_map(|&(t, v)| {
                    let d = ahead(exit_at, t);
                    (d > 0.0 && d < gap).then_some((d, v))
                })
                .collect();
            passed.sort_by(|a, b| a.0.total_cmp(&b.0));
            ring.extend(passed.into_iter().map(|(_, v)| v));
            if next == first {
                break;
            }
            current = next;
        }
        ring.dedup_by_key(|v| v.node);
        if ring.len() > 1 && ring.first().map(|v| v.node) == ring.last().map(|v| v.node) {
            ring.pop();
        }
        if ring.len() >= 3 {
            polygons.push(ring);
        }
    }
    polygons
}

fn edges(ring: &[Vertex]) -> impl Iterator<Item = (ParPos, ParPos)> + '_ {
    let n = ring.len();
    (0..n).map(move |k| (ring[k].at, ring[(k + 1) % n].at))
}

fn crosses(p: ParPos, q: ParPos, a: ParPos, b: ParPos) -> bool {
    orient(p, q, a) * orient(p, q, b) < 0.0 && orient(a, b, p) * orient(a, b, q) < 0.0
}

fn leftmost(ring: &[Vertex]) -> usize {
    (0..ring.len())
        .min_by(|&a, &b| {
            let (pa, pb) = (ring[a].at, ring[b].at);
            pa.u.total_cmp(&pb.u).then(pa.v.total_cmp(&pb.v))
        })
        .unwrap_or(0)
}

/// Joins `hole` into `ring` through a cut from its leftmost vertex to a
/// visible ring vertex on its left.
fn bridge(ring: &[Vertex], hole: &[Vertex]) -> Option<Vec<Vertex>> {
    let h = leftmost(hole);
    let p = hole[h].at;
    let n = ring.len();
    let visible = |q: ParPos| !edges(ring).chain(edges(hole)).any(|(a, b)| crosses(p, q, a, b));

    let mut best: Option<(f64, usize)> = None;
    for k in 0..n {
        let (a, b) = (ring[k].at, ring[(k + 1) % n].at);
        if (a.v > p.v) != (b.v > p.v) {
            let x = a.u + (p.v - a.v) / (b.v - a.v) * (b.u - a.u);
            if x <= p.u + Tolerance::PARAM.eps && best.is_none_or(|(bx, _)| x > bx) {
                best = Some((x, k));
            }
        }
    }
    let mut candidates: Vec<usize> = match best {
        Some((_, k)) => {
            let (e0, e1) = (k, (k + 1) % n);
            if ring[e0].at.u < ring[e1].at.u { vec![e0, e1] } else { vec![e1, e0] }
        }
        None => Vec::new(),
    };
    let mut rest: Vec<usize> = (0..n)
        .filter(|&k| ring[k].at.u <= p.u + Tolerance::PARAM.eps)
        .collect();
    rest.sort_by(|&a, &b| ring[a].at.distance_to(p).total_cmp(&ring[b].at.distance_to(p)));
    candidates.extend(rest);

    let k = candidates.into_iter().find(|&k| visible(ring[k].at))?;
    let mut merged = Vec::with_capacity(n + hole.len() + 2);
    merged.extend_from_slice(&ring[..=k]);
    merged.extend_from_slice(&hole[h..]);
    merged.extend_from_slice(&hole[..=h]);
    merged.push(ring[k]);
    merged.extend_from_slice(&ring[k + 1..]);
    Some(merged)
}

/// Whether the corner at `i` can be cut off: convex, not flat, and with no
/// other vertex on or inside the triangle.
fn is_ear(ring: &[Vertex], i: usize) -> bool {
    let n = ring.len();
    let (a, b, c) = (ring[(i + n - 1) % n].at, ring[i].at, ring[(i + 1) % n].at);
    if side_of(a, c, b) >= -Tolerance::PARAM.eps {
        return false;
    }
    let tol = -Tolerance::PARAM.eps;
    !ring.iter().any(|v| {
        let p = v.at;
        p != a
            && p != b
            && p != c
            && side_of(a, b, p) >= tol
            && side_of(b, c, p) >= tol
            && side_of(c, a, p) >= tol
    })
}

/// Ear clips a counter-clockwise ring. When no clean ear is left the
/// widest convex corner goes, so the clip always ends.
fn ear_clip(mut ring: Vec<Vertex>) -> Vec<[u32; 3]> {
    let mut triangles = Vec::with_capacity(ring.len().saturating_sub(2));
    while ring.len() > 3 {
        let n = ring.len();
        let corner = |i: usize| (ring[(i + n - 1) % n], ring[i], ring[(i + 1) % n]);
        let area = |i: usize| {
            let (a, b, c) = corner(i);
            orient(a.at, b.at, c.at)
        };
        let ear = (0..n).find(|&i| is_ear(&ring, i)).or_else(|| {
            (0..n)
                .filter(|&i| area(i) > 0.0)
                .max_by(|&x, &y| area(x).total_cmp(&area(y)))
        });
        let Some(i) = ear else {
            log::debug!("clip: {} corners left with no convex one", n);
            break;
        };
        let (a, b, c) = corner(i);
        triangles.push([a.node, b.node, c.node]);
        ring.remove(i);
    }
    if let &[a, b, c] = ring.as_slice() {
        if orient(a.at, b.at, c.at) > 0.0 {
            triangles.push([a.node, b.node, c.node]);
        }
    }
    triangles
}

fn triangulate(outer: Vec<Vertex>, mut holes: Vec<Vec<Vertex>>) -> Vec<[u32; 3]> {
    holes.sort_by(|a, b| a[leftmost(a)].at.u.total_cmp(&b[leftmost(b)].at.u));
    let mut ring = outer;
    for hole in holes {
        match bridge(&ring, &hole) {
            Some(merged) => ring = merged,
            None => log::debug!("clip: no bridge to a hole of {} corners", hole.len()),
        }
    }
    ear_clip(ring)
}

impl TrimCut {
    /// Cuts the cells of the grid spanned by ascending `u_params` and
    /// `v_params`, each holding at least two values.
    #[must_use]
    pub(crate) fn new(trim: &TrimRegion, u_params: &[f64], v_params: &[f64]) -> Self {
        let loops: Vec<&TrimLoop> = std::iter::once(trim.outer()).chain(trim.holes()).collect();
        let mut cutter = Cutter {
            u: u_params,
            v: v_params,
            nodes: Vec::new(),
            work: HashMap::new(),
            enclosed: Vec::with_capacity(loops.len()),
        };
        for (k, l) in loops.iter().enumerate() {
            // Outer loop counter-clockwise, holes clockwise: the region is
            // always on the left.
            let mut points = l.points().to_vec();
            if (l.signed_area() > 0.0) != (k == 0) {
                points.reverse();
            }
            cutter.add_loop(&points);
        }

        let count = cutter.spans_u() * (v_params.len() - 1);
        let mut work = std::mem::take(&mut cutter.work);
        let cells = (0..count)
            .map(|cell| match work.remove(&cell) {
                Some(cell_work) => cutter.fill(&loops, cell, cell_work),
                None if cutter.background_inside(&loops, cell) => CellFill::Whole,
                None => CellFill::Empty,
            })
            .collect();
        log::trace!("clip: {} cut nodes over {} cells", cutter.nodes.len(), count);
        Self {
            nodes: cutter.nodes,
            cells,
        }
    }
}
