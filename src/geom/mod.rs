//! Geometry kernel used by the faceter: parameter-space primitives, surfaces,
//! curvature analysis, trimming and the output mesh.

mod array;
mod core;
mod curvature;
mod mesh;
mod param;
mod surface;
mod transform;
mod trim;

pub use array::ParamArray;
pub use core::{Point3, Tolerance, Vec3};
pub use curvature::{
    CURVATURE_SENTINEL, CurvatureSamples, FamilyCurvature, FamilySample, ProfileOptions,
    ProfileSource, SurfaceCurvatureAnalysis, SurfaceCurvatureProfile, analyze_surface_curvature,
    closed_form_profile, curvature_profile, sampled_profile,
};
pub use mesh::{FacetMesh, NodeMergeStats};
pub use param::{Interval, ParBox, ParDir, ParPos, ParVec, ParamAxis};
pub use surface::{
    BezierSurface, ConeSurface, CylinderSurface, PlaneSurface, SphereSurface, Surface, SurfaceKind,
    TorusSurface,
};
pub use transform::{AxisScale, ParTransform, TransformError};
pub use trim::{TrimError, TrimLoop, TrimRegion};

#[cfg(test)]
mod tests;
