//! Adaptive faceting: ruling, reconciliation, grid assembly and post-check.

mod assembly;
mod body;
mod clip;
mod diagnostics;
mod error;
mod ladder;
mod metrics;
mod options;
mod post_check;
mod reconcile;
mod ruling;

pub use assembly::{FaceSurface, GridAssembly, WorkingFace, assemble_grid};
pub use body::{
    BodyFacets, CancelFlag, FaceFacets, FacetContext, PatchSide, SharedBoundary, facet_body,
    facet_face,
};
pub use diagnostics::{BodyDiagnostics, FaceDiagnostics, QualityWarning, WarningKind};
pub use error::FacetError;
pub use ladder::{Ladder, LadderKind};
pub use metrics::{FacetMetrics, FacetTimingReport, TimingBucket};
pub use options::FacetOptions;
pub use post_check::{EdgeErrorCache, PostCheckReport, post_check};
pub use reconcile::{BoundaryCurve, ReconcileOutcome, reconcile_ladders, reconcile_shared_boundary};
pub use ruling::{
    CrossStep, RulingInput, RulingOutcome, RungDemand, family_demand, ladder_frame, rung_demand,
    setup_ruling,
};

#[cfg(test)]
mod tests;
