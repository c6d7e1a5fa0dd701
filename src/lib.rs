#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Adaptive faceting of parametric surface patches.
//!
//! A face is ruled in `u` and `v` so that every facet meets the requested sag,
//! edge-length, normal-angle and aspect tolerances. Shared patch boundaries
//! are reconciled so neighbouring faces weld without cracks, and a post-check
//! pass splits any facet that still misses a tolerance.
//!
//! ```no_run
//! use facet_engine::facet::{FacetOptions, WorkingFace, facet_face};
//! use facet_engine::geom::{Point3, SphereSurface};
//!
//! let sphere = SphereSurface::new(Point3::ORIGIN, 2.0).unwrap();
//! let facets = facet_face(&WorkingFace::new(&sphere), &FacetOptions::with_sag(0.01)).unwrap();
//! println!("{}", facets.diagnostics.summary());
//! ```

pub mod facet;
pub mod geom;

pub use facet::{
    BodyFacets, CancelFlag, FaceFacets, FacetContext, FacetError, FacetOptions, PatchSide,
    QualityWarning, SharedBoundary, WorkingFace, facet_body, facet_face,
};
pub use geom::{FacetMesh, Surface};
