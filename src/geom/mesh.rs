use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Point3, Tolerance};

/// Indexed triangle mesh produced by faceting.
///
/// `uvs` carries the application-space parameter of every node while the mesh
/// belongs to a single face; body-level meshes drop it because parameters of
/// different faces are unrelated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FacetMesh {
    pub positions: Vec<[f64; 3]>,
    pub indices: Vec<u32>,
    pub uvs: Option<Vec<[f64; 2]>>,
    pub normals: Option<Vec<[f64; 3]>>,
}

/// Counts reported by [`FacetMesh::merge_nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeMergeStats {
    pub merged_nodes: usize,
    pub culled_triangles: usize,
}

impl FacetMesh {
    #[must_use]
    pub fn new(positions: Vec<[f64; 3]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            uvs: None,
            normals: None,
        }
    }

    #[must_use]
    pub fn with_uvs(positions: Vec<[f64; 3]>, uvs: Vec<[f64; 2]>, indices: Vec<u32>) -> Self {
        Self {
            positions,
            indices,
            uvs: Some(uvs),
            normals: None,
        }
    }

    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    #[must_use]
    pub fn point(&self, index: u32) -> Option<Point3> {
        self.positions.get(index as usize).copied().map(Point3::from_array)
    }

    /// Corner points of triangle `t`.
    #[must_use]
    pub fn triangle(&self, t: usize) -> Option<[Point3; 3]> {
        let tri = self.indices.get(t * 3..t * 3 + 3)?;
        Some([self.point(tri[0])?, self.point(tri[1])?, self.point(tri[2])?])
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err("mesh indices are not a triangle list (len % 3 != 0)".to_string());
        }
        if self
            .positions
            .iter()
            .any(|p| !p[0].is_finite() || !p[1].is_finite() || !p[2].is_finite())
        {
            return Err("mesh has invalid vertex coordinates (NaN/Inf)".to_string());
        }
        let n = self.positions.len();
        if self.indices.iter().any(|&i| i as usize >= n) {
            return Err("mesh has out-of-bounds vertex indices".to_string());
        }
        let uv_ok = self.uvs.as_ref().is_none_or(|uvs| uvs.len() == n);
        let normals_ok = self.normals.as_ref().is_none_or(|normals| normals.len() == n);
        if !uv_ok || !normals_ok {
            return Err("mesh attribute buffers do not match vertex count".to_string());
        }
        Ok(())
    }

    /// Appends `other`, offsetting its indices. UVs survive only when both
    /// sides carry them; normals are dropped and must be recomputed.
    pub fn append(&mut self, other: &Self) {
        let base = self.positions.len() as u32;
        let keep_uvs = (self.positions.is_empty() || self.uvs.is_some()) && other.uvs.is_some();
        self.uvs = if keep_uvs {
            let mut uvs = self.uvs.take().unwrap_or_default();
            uvs.extend(other.uvs.iter().flatten().copied());
            Some(uvs)
        } else {
            None
        };
        self.positions.extend_from_slice(&other.positions);
        self.indices.extend(other.indices.iter().map(|&i| i + base));
        self.normals = None;
    }

    /// Reverses the winding of every triangle.
    pub fn flip_winding(&mut self) {
        for tri in self.indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
    }

    /// Welds nodes closer than `tol` and culls the triangles that collapse.
    pub fn merge_nodes(&mut self, tol: Tolerance) -> NodeMergeStats {
        let merged_nodes = self.weld_vertices(tol);
        let culled_triangles = self.cull_degenerate_triangles(tol);
        NodeMergeStats {
            merged_nodes,
            culled_triangles,
        }
    }

    /// For every node, the index of the first node within `tol` of it; a
    /// node with no earlier neighbour is its own class. Nodes with
    /// non-finite coordinates are never clustered.
    #[must_use]
    pub fn position_classes(&self, tol: Tolerance) -> Vec<u32> {
        let count = self.positions.len();
        if !tol.eps.is_finite() || tol.eps <= 0.0 {
            return (0..count as u32).collect();
        }

        let inv = 1.0 / tol.eps;

        fn quantize(value: f64, inv: f64) -> Option<i64> {
            if !value.is_finite() {
                return None;
            }
            let q = (value * inv).floor();
            Some(q.clamp(i64::MIN as f64, i64::MAX as f64) as i64)
        }

        let mut buckets: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
        let mut classes = Vec::with_capacity(count);

        for (i, &p) in self.positions.iter().enumerate() {
            let key = match (quantize(p[0], inv), quantize(p[1], inv), quantize(p[2], inv)) {
                (Some(kx), Some(ky), Some(kz)) => Some((kx, ky, kz)),
                _ => None,
            };

            let found = key.and_then(|key| {
                let point = Point3::from_array(p);
                neighbour_cells(key).find_map(|cell| {
                    buckets.get(&cell)?.iter().copied().find(|&cand| {
                        let existing = Point3::from_array(self.positions[cand as usize]);
                        tol.approx_eq_point3(existing, point)
                    })
                })
            });

            let class = found.unwrap_or_else(|| {
                if let Some(key) = key {
                    buckets.entry(key).or_default().push(i as u32);
                }
                i as u32
            });
            classes.push(class);
        }
        classes
    }

    /// Spatial-hash weld. The first node seen in a cluster survives, together
    /// with its UV. Returns the number of nodes removed.
    pub fn weld_vertices(&mut self, tol: Tolerance) -> usize {
        let classes = self.position_classes(tol);
        let count = classes.len();
        let mut remap: Vec<u32> = vec![0; count];
        let mut out_points: Vec<[f64; 3]> = Vec::with_capacity(count);
        let mut out_uvs: Option<Vec<[f64; 2]>> =
            self.uvs.as_ref().map(|_| Vec::with_capacity(count));

        for (i, &class) in classes.iter().enumerate() {
            if class as usize != i {
                remap[i] = remap[class as usize];
                continue;
            }
            remap[i] = out_points.len() as u32;
            out_points.push(self.positions[i]);
            if let (Some(src), Some(dst)) = (self.uvs.as_ref(), out_uvs.as_mut()) {
                dst.push(src.get(i).copied().unwrap_or([0.0, 0.0]));
            }
        }

        for idx in &mut self.indices {
            if let Some(&mapped) = remap.get(*idx as usize) {
                *idx = mapped;
            }
        }

        let welded = count.saturating_sub(out_points.len());
        self.positions = out_points;
        self.uvs = out_uvs;
        if welded > 0 {
            self.normals = None;
        }
        welded
    }

    /// Drops triangles with repeated nodes or (near) zero area. Returns the
    /// number removed.
    pub fn cull_degenerate_triangles(&mut self, tol: Tolerance) -> usize {
        let mut out = Vec::with_capacity(self.indices.len());
        let mut removed = 0usize;

        for tri in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0], tri[1], tri[2]);
            if i0 == i1 || i1 == i2 || i0 == i2 {
                removed += 1;
                continue;
            }
            let (Some(a), Some(b), Some(c)) = (self.point(i0), self.point(i1), self.point(i2))
            else {
                removed += 1;
                continue;
            };
            let area2 = b.sub_point(a).cross(c.sub_point(a)).length_squared();
            if !area2.is_finite() || area2 <= tol.eps_squared() * tol.eps_squared() {
                removed += 1;
                continue;
            }
            out.extend_from_slice(&[i0, i1, i2]);
        }

        self.indices = out;
        removed
    }

    /// Drops nodes no triangle references and compacts the attribute
    /// buffers. Returns the number removed.
    pub fn remove_unused_vertices(&mut self) -> usize {
        let count = self.positions.len();
        let mut used = vec![false; count];
        for &i in &self.indices {
            if let Some(flag) = used.get_mut(i as usize) {
                *flag = true;
            }
        }
        let kept = used.iter().filter(|&&u| u).count();
        if kept == count {
            return 0;
        }

        let mut remap = vec![0u32; count];
        let mut next = 0u32;
        for (slot, &keep) in remap.iter_mut().zip(&used) {
            if keep {
                *slot = next;
                next += 1;
            }
        }
        for idx in &mut self.indices {
            *idx = remap[*idx as usize];
        }
        self.positions = compact(&self.positions, &used);
        self.uvs = self.uvs.as_deref().map(|uvs| compact(uvs, &used));
        self.normals = self.normals.as_deref().map(|normals| compact(normals, &used));
        count - kept
    }

    /// `(open, non-manifold)` edge counts. An edge is open when exactly one
    /// triangle uses it.
    #[must_use]
    pub fn edge_topology(&self) -> (usize, usize) {
        let mut edge_counts: HashMap<(u32, u32), u32> = HashMap::new();
        for tri in self.indices.chunks_exact(3) {
            let (i0, i1, i2) = (tri[0], tri[1], tri[2]);
            if i0 == i1 || i1 == i2 || i0 == i2 {
                continue;
            }
            for (ea, eb) in [(i0, i1), (i1, i2), (i2, i0)] {
                *edge_counts.entry((ea.min(eb), ea.max(eb))).or_insert(0) += 1;
            }
        }

        edge_counts.values().fold((0, 0), |(open, non_manifold), &count| {
            match count {
                1 => (open + 1, non_manifold),
                c if c > 2 => (open, non_manifold + 1),
                _ => (open, non_manifold),
            }
        })
    }

    /// Area-weighted vertex normals following the triangle winding.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![[0.0, 0.0, 0.0]; self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let (Some(a), Some(b), Some(c)) =
                (self.point(tri[0]), self.point(tri[1]), self.point(tri[2]))
            else {
                continue;
            };
            let n = b.sub_point(a).cross(c.sub_point(a));
            for &i in tri {
                let acc = &mut normals[i as usize];
                acc[0] += n.x;
                acc[1] += n.y;
                acc[2] += n.z;
            }
        }

        for n in &mut normals {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            if len.is_finite() && len > 0.0 {
                let inv = 1.0 / len;
                n[0] *= inv;
                n[1] *= inv;
                n[2] *= inv;
            } else {
                *n = [0.0, 0.0, 1.0];
            }
        }
        self.normals = Some(normals);
    }

    #[must_use]
    pub fn surface_area(&self) -> f64 {
        (0..self.triangle_count())
            .filter_map(|t| self.triangle(t))
            .map(|[a, b, c]| 0.5 * b.sub_point(a).cross(c.sub_point(a)).length())
            .sum()
    }
}

fn compact<T: Copy>(values: &[T], used: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(used)
        .filter_map(|(&v, &keep)| keep.then_some(v))
        .collect()
}

fn neighbour_cells(key: (i64, i64, i64)) -> impl Iterator<Item = (i64, i64, i64)> {
    (-1i64..=1).flat_map(move |dx| {
        (-1i64..=1).flat_map(move |dy| {
            (-1i64..=1).map(move |dz| {
                (
                    key.0.saturating_add(dx),
                    key.1.saturating_add(dy),
                    key.2.saturating_add(dz),
                )
            })
        })
    })
}
