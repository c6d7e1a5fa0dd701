//! Quality warnings and per-face / per-body diagnostics.
//!
//! Faceting never fails because a tolerance cannot be met. The best mesh is
//! returned and the shortfall is recorded here as a [`QualityWarning`].

use std::fmt;

use serde::Serialize;

use super::metrics::FacetTimingReport;
use super::post_check::PostCheckReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WarningKind {
    /// Ruling needed more rungs than the ceiling allows.
    RungCeilingReached,
    /// Reconciliation could not equalize two ladders under the ceiling.
    ReconciliationCapped,
    /// Shared-boundary reconciliation did not settle within its pass budget.
    ReconciliationUnsettled,
    /// Post-check accepted facets that still exceed a tolerance.
    ToleranceViolation,
    /// Nodes on a shared boundary found no partner on the other side.
    BoundaryCrack,
}

impl WarningKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RungCeilingReached => "rung-ceiling",
            Self::ReconciliationCapped => "reconcile-capped",
            Self::ReconciliationUnsettled => "reconcile-unsettled",
            Self::ToleranceViolation => "tolerance-violation",
            Self::BoundaryCrack => "boundary-crack",
        }
    }
}

/// Non-fatal record of a tolerance the faceter could not reach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityWarning {
    /// Index of the face in the body, once known.
    pub face: Option<usize>,
    pub kind: WarningKind,
    pub message: String,
}

impl QualityWarning {
    #[must_use]
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            face: None,
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_face(mut self, face: usize) -> Self {
        self.face = Some(face);
        self
    }

    /// Logs the warning and hands it back, for `push(w.emit())`.
    #[must_use]
    pub fn emit(self) -> Self {
        log::warn!("{self}");
        self
    }
}

impl fmt::Display for QualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.face {
            Some(face) => write!(f, "face {face}: [{}] {}", self.kind.label(), self.message),
            None => write!(f, "[{}] {}", self.kind.label(), self.message),
        }
    }
}

/// What happened while faceting one face.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FaceDiagnostics {
    pub face: usize,
    /// Rung intervals of the final u and v ladders.
    pub u_rungs: usize,
    pub v_rungs: usize,
    pub u_variable: bool,
    pub v_variable: bool,
    /// A pole or degenerate metric was clamped by the curvature oracle.
    pub pole_clamped: bool,
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// Grid triangles dropped by the trimming region.
    pub trimmed_triangle_count: usize,
    pub merged_node_count: usize,
    pub culled_triangle_count: usize,
    pub open_edge_count: usize,
    pub post_check: Option<PostCheckReport>,
    pub timing: Option<FacetTimingReport>,
    pub warnings: Vec<QualityWarning>,
}

impl FaceDiagnostics {
    #[must_use]
    pub fn new(face: usize) -> Self {
        Self {
            face,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Records a warning against this face and logs it.
    pub fn add_warning(&mut self, warning: QualityWarning) {
        self.warnings.push(warning.with_face(self.face).emit());
    }

    /// Short single-line summary for logging.
    #[must_use]
    pub fn summary(&self) -> String {
        let kind = |variable: bool| if variable { "var" } else { "uni" };
        let mut parts = vec![
            format!("face {}", self.face),
            format!(
                "rungs {}x{} ({}/{})",
                self.u_rungs,
                self.v_rungs,
                kind(self.u_variable),
                kind(self.v_variable)
            ),
            format!("V:{} T:{}", self.vertex_count, self.triangle_count),
        ];
        if let Some(post) = &self.post_check {
            if post.split_edges > 0 {
                parts.push(format!("split:{}", post.split_edges));
            }
        }
        if self.merged_node_count > 0 {
            parts.push(format!("merged:{}", self.merged_node_count));
        }
        if self.culled_triangle_count > 0 {
            parts.push(format!("culled:{}", self.culled_triangle_count));
        }
        if self.pole_clamped {
            parts.push("pole".to_string());
        }
        if !self.warnings.is_empty() {
            parts.push(format!("warnings:{}", self.warnings.len()));
        }
        parts.join(" ")
    }
}

/// Aggregate over all faces plus the body-level node merge.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct BodyDiagnostics {
    pub faces: Vec<FaceDiagnostics>,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub merged_node_count: usize,
    pub culled_triangle_count: usize,
    pub open_edge_count: usize,
    pub non_manifold_edge_count: usize,
    pub reconcile_passes: usize,
    /// Warnings not tied to a single face.
    pub warnings: Vec<QualityWarning>,
    pub timing: Option<FacetTimingReport>,
}

impl BodyDiagnostics {
    /// Every warning, face-level first.
    pub fn all_warnings(&self) -> impl Iterator<Item = &QualityWarning> {
        self.faces
            .iter()
            .flat_map(|f| f.warnings.iter())
            .chain(self.warnings.iter())
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.all_warnings().count()
    }

    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.open_edge_count == 0
    }

    /// Folds a face into the totals; counts of the body mesh itself are set
    /// separately after the body-level merge.
    pub fn merge_face(&mut self, face: FaceDiagnostics) {
        if let Some(timing) = &face.timing {
            self.timing.get_or_insert_with(FacetTimingReport::default).merge(timing);
        }
        self.faces.push(face);
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("faces:{}", self.faces.len()),
            format!("V:{} T:{}", self.vertex_count, self.triangle_count),
        ];
        if self.merged_node_count > 0 {
            parts.push(format!("merged:{}", self.merged_node_count));
        }
        if self.open_edge_count > 0 {
            parts.push(format!("open:{}", self.open_edge_count));
        }
        if self.non_manifold_edge_count > 0 {
            parts.push(format!("non-manifold:{}", self.non_manifold_edge_count));
        }
        let warnings = self.warning_count();
        if warnings > 0 {
            parts.push(format!("warnings:{warnings}"));
        }
        parts.join(" ")
    }
}

impl fmt::Display for BodyDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Facet Diagnostics:")?;
        writeln!(f, "  Faces: {}", self.faces.len())?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(f, "  Triangles: {}", self.triangle_count)?;
        if self.merged_node_count > 0 || self.culled_triangle_count > 0 {
            writeln!(f, "  Node merge:")?;
            writeln!(f, "    - Merged nodes: {}", self.merged_node_count)?;
            writeln!(f, "    - Culled triangles: {}", self.culled_triangle_count)?;
        }
        if self.open_edge_count > 0 || self.non_manifold_edge_count > 0 {
            writeln!(f, "  Topology:")?;
            writeln!(f, "    - Open edges: {}", self.open_edge_count)?;
            if self.non_manifold_edge_count > 0 {
                writeln!(f, "    - Non-manifold edges: {}", self.non_manifold_edge_count)?;
            }
        }
        for face in &self.faces {
            writeln!(f, "  {}", face.summary())?;
        }
        let warnings: Vec<&QualityWarning> = self.all_warnings().collect();
        if !warnings.is_empty() {
            writeln!(f, "  Warnings:")?;
            for warning in warnings {
                writeln!(f, "    - {warning}")?;
            }
        }
        if let Some(timing) = &self.timing {
            writeln!(f, "  Timing: {} ms total", timing.total_ms())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_display_names_face() {
        let w =
            QualityWarning::new(WarningKind::RungCeilingReached, "u needs 900 rungs").with_face(3);
        assert_eq!(w.to_string(), "face 3: [rung-ceiling] u needs 900 rungs");
        let w = QualityWarning::new(WarningKind::ReconciliationCapped, "capped");
        assert_eq!(w.to_string(), "[reconcile-capped] capped");
    }

    #[test]
    fn face_warning_gets_face_index() {
        let mut face = FaceDiagnostics::new(2);
        face.add_warning(QualityWarning::new(WarningKind::ToleranceViolation, "sag"));
        assert!(face.has_warnings());
        assert_eq!(face.warnings[0].face, Some(2));
    }

    #[test]
    fn body_collects_face_warnings() {
        let mut body = BodyDiagnostics::default();
        let mut face = FaceDiagnostics::new(0);
        face.add_warning(QualityWarning::new(WarningKind::ToleranceViolation, "sag"));
        body.merge_face(face);
        body.merge_face(FaceDiagnostics::new(1));
        body.warnings
            .push(QualityWarning::new(WarningKind::ReconciliationUnsettled, "passes"));
        body.open_edge_count = 4;

        assert_eq!(body.warning_count(), 2);
        assert!(!body.is_watertight());
        let text = body.to_string();
        assert!(text.contains("Faces: 2"));
        assert!(text.contains("Open edges: 4"));
        assert!(text.contains("reconcile-unsettled"));
        assert!(body.summary().contains("warnings:2"));
    }
}
