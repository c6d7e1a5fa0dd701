//! Working faces and grid assembly.
//!
//! A face is faceted on the product of its u and v rung parameters. Each grid
//! cell becomes two triangles split along the shorter 3-D diagonal. Cells on a
//! pole keep their collapsed triangle until node merge so that post-check
//! sees a conforming index mesh. On a trimmed face the cells the trim loops
//! pass through are cut along the loops instead.

use std::fmt;

use super::clip::{CellFill, TrimCut};
use crate::geom::{FacetMesh, ParBox, Surface, TrimRegion};

cfg_if::cfg_if! {
    if #[cfg(feature = "parallel")] {
        /// Surface evaluator as borrowed by a face; shared across worker
        /// threads when faces are faceted in parallel.
        pub type FaceSurface = dyn Surface + Sync;
    } else {
        /// Surface evaluator as borrowed by a face.
        pub type FaceSurface = dyn Surface;
    }
}

/// One face to facet: a surface, the parametric region in use, an optional
/// trimming region and its orientation within the body.
#[derive(Clone)]
pub struct WorkingFace<'s> {
    surface: &'s FaceSurface,
    region: ParBox,
    trim: Option<TrimRegion>,
    reversed: bool,
}

impl<'s> WorkingFace<'s> {
    /// Face over the whole surface domain.
    #[must_use]
    pub fn new(surface: &'s FaceSurface) -> Self {
        Self {
            surface,
            region: surface.domain(),
            trim: None,
            reversed: false,
        }
    }

    #[must_use]
    pub fn with_region(mut self, region: ParBox) -> Self {
        self.region = region;
        self
    }

    #[must_use]
    pub fn with_trim(mut self, trim: TrimRegion) -> Self {
        self.trim = Some(trim);
        self
    }

    /// Reversed faces emit their facets with flipped winding.
    #[must_use]
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    #[must_use]
    pub fn surface(&self) -> &'s FaceSurface {
        self.surface
    }

    #[must_use]
    pub const fn region(&self) -> ParBox {
        self.region
    }

    #[must_use]
    pub const fn trim(&self) -> Option<&TrimRegion> {
        self.trim.as_ref()
    }

    #[must_use]
    pub const fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Part of the region the trimming region can reach.
    #[must_use]
    pub fn active_region(&self) -> ParBox {
        match &self.trim {
            Some(trim) => self.region.intersect(&trim.bounds()),
            None => self.region,
        }
    }
}

impl fmt::Debug for WorkingFace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkingFace")
            .field("kind", &self.surface.kind())
            .field("region", &self.region)
            .field("trimmed", &self.trim.is_some())
            .field("reversed", &self.reversed)
            .finish()
    }
}

/// Grid mesh of one face before post-check.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAssembly {
    pub mesh: FacetMesh,
    /// Grid triangles the trim dropped or re-cut along its loops.
    pub trimmed_triangles: usize,
}

/// Triangulates the product of ascending `u_params` and `v_params` on the
/// face's surface.
#[must_use]
pub fn assemble_grid(face: &WorkingFace<'_>, u_params: &[f64], v_params: &[f64]) -> GridAssembly {
    let (nu, nv) = (u_params.len(), v_params.len());
    if nu < 2 || nv < 2 {
        return GridAssembly {
            mesh: FacetMesh::with_uvs(Vec::new(), Vec::new(), Vec::new()),
            trimmed_triangles: 0,
        };
    }

    let surface = face.surface();
    let cut = face.trim().map(|trim| TrimCut::new(trim, u_params, v_params));
    let mut positions = Vec::with_capacity(nu * nv);
    let mut uvs = Vec::with_capacity(nu * nv);
    for &v in v_params {
        for &u in u_params {
            positions.push(surface.point_at(u, v).to_array());
            uvs.push([u, v]);
        }
    }
    for p in cut.iter().flat_map(|cut| &cut.nodes) {
        positions.push(surface.point_at(p.u, p.v).to_array());
        uvs.push(p.to_array());
    }
    let mut mesh = FacetMesh::with_uvs(positions, uvs, Vec::with_capacity((nu - 1) * (nv - 1) * 6));

    let node = |i: usize, j: usize| (j * nu + i) as u32;
    let mut trimmed_triangles = 0;
    for j in 0..nv - 1 {
        for i in 0..nu - 1 {
            let fill = cut.as_ref().and_then(|cut| cut.cells.get(j * (nu - 1) + i));
            match fill {
                Some(CellFill::Empty) => {
                    trimmed_triangles += 2;
                    continue;
                }
                Some(CellFill::Cut(triangles)) => {
                    trimmed_triangles += 2;
                    mesh.indices.extend(triangles.iter().flatten());
                    continue;
                }
                Some(CellFill::Whole) | None => {}
            }
            let (p00, p10) = (node(i, j), node(i + 1, j));
            let (p11, p01) = (node(i + 1, j + 1), node(i, j + 1));
            let diagonal = |a: u32, b: u32| match (mesh.point(a), mesh.point(b)) {
                (Some(a), Some(b)) => a.distance_to(b),
                _ => f64::INFINITY,
            };
            let cell = if diagonal(p00, p11) <= diagonal(p10, p01) {
                [[p00, p10, p11], [p00, p11, p01]]
            } else {
                [[p00, p10, p01], [p10, p11, p01]]
            };
            mesh.indices.extend(cell.into_iter().flatten());
        }
    }

    if cut.is_some() {
        mesh.remove_unused_vertices();
    }
    if face.is_reversed() {
        mesh.flip_winding();
    }
    log::debug!(
        "grid {}x{}: {} triangles ({} trimmed)",
        nu - 1,
        nv - 1,
        mesh.triangle_count(),
        trimmed_triangles
    );
    GridAssembly {
        mesh,
        trimmed_triangles,
    }
}
