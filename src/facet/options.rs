use serde::{Deserialize, Serialize};

use super::error::{FacetError, check_rung_bounds, check_tolerance};
use crate::geom::ProfileOptions;

/// Tolerances and limits for faceting one body.
///
/// Optional tolerances are disabled when `None`. Every field has a default,
/// so a partial JSON document deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetOptions {
    /// Maximum distance between a facet and the surface.
    pub max_sag: Option<f64>,
    /// Maximum facet edge length in world units.
    pub max_edge_length: Option<f64>,
    /// Maximum change of surface normal between neighbouring rungs, in degrees.
    pub max_normal_angle_deg: Option<f64>,
    /// Maximum ratio between the world lengths of the two sides of a grid cell.
    pub max_aspect_ratio: Option<f64>,
    pub min_rungs: usize,
    /// Ceiling for ruling and reconciliation.
    pub max_rungs: usize,
    /// Interior stations per direction when sampling free-form curvature.
    pub curvature_samples: usize,
    /// Worst-case rather than averaged curvature sampling.
    pub worst_case_sampling: bool,
    /// Relative curvature spread above which a variable ladder is built.
    pub variable_threshold: f64,
    pub post_check: bool,
    /// Splits allowed per edge lineage before a facet is accepted as is.
    pub max_edge_retries: u32,
    /// Minimum facet quality `4 sqrt(3) area / sum(edge^2)`; zero disables.
    pub min_aspect_quality: f64,
    /// Compare facet centroids against the surface during post-check.
    pub centroid_test: bool,
    /// Node-merge distance within a face and across a body.
    pub merge_tolerance: f64,
    /// Reconcile the u and v rung counts of every face with each other.
    pub equalize_rulings: bool,
    /// Sweeps over the shared boundaries before reconciliation gives up.
    pub max_reconcile_passes: usize,
}

impl FacetOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_sag: Some(0.01),
            max_edge_length: None,
            max_normal_angle_deg: Some(15.0),
            max_aspect_ratio: None,
            min_rungs: 1,
            max_rungs: 512,
            curvature_samples: 8,
            worst_case_sampling: true,
            variable_threshold: 0.5,
            post_check: true,
            max_edge_retries: 4,
            min_aspect_quality: 0.0,
            centroid_test: true,
            merge_tolerance: 1e-9,
            equalize_rulings: false,
            max_reconcile_passes: 8,
        }
    }

    /// Options with only a sag tolerance; angle and edge limits disabled.
    #[must_use]
    pub const fn with_sag(max_sag: f64) -> Self {
        let mut options = Self::new();
        options.max_sag = Some(max_sag);
        options.max_normal_angle_deg = None;
        options
    }

    pub fn validate(&self) -> Result<(), FacetError> {
        let optional = [
            ("max_sag", self.max_sag),
            ("max_edge_length", self.max_edge_length),
            ("max_normal_angle_deg", self.max_normal_angle_deg),
            ("max_aspect_ratio", self.max_aspect_ratio),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                check_tolerance(name, value)?;
            }
        }
        if let Some(angle) = self.max_normal_angle_deg {
            if angle >= 180.0 {
                return Err(FacetError::InvalidTolerance {
                    name: "max_normal_angle_deg",
                    value: angle,
                });
            }
        }
        check_rung_bounds(self.min_rungs, self.max_rungs)?;
        if self.curvature_samples < 2 {
            return Err(FacetError::InvalidSampleCount {
                count: self.curvature_samples,
            });
        }
        if !self.variable_threshold.is_finite() || self.variable_threshold < 0.0 {
            return Err(FacetError::InvalidTolerance {
                name: "variable_threshold",
                value: self.variable_threshold,
            });
        }
        if !self.min_aspect_quality.is_finite() || !(0.0..=1.0).contains(&self.min_aspect_quality) {
            return Err(FacetError::InvalidTolerance {
                name: "min_aspect_quality",
                value: self.min_aspect_quality,
            });
        }
        check_tolerance("merge_tolerance", self.merge_tolerance)?;
        Ok(())
    }

    /// Sag with `None` mapped to infinity.
    #[must_use]
    pub fn sag_limit(&self) -> f64 {
        self.max_sag.unwrap_or(f64::INFINITY)
    }

    #[must_use]
    pub fn edge_limit(&self) -> f64 {
        self.max_edge_length.unwrap_or(f64::INFINITY)
    }

    #[must_use]
    pub fn angle_limit_deg(&self) -> f64 {
        self.max_normal_angle_deg.unwrap_or(f64::INFINITY)
    }

    /// Sampling options for the curvature oracle. Refinement between
    /// stations uses the same sag and angle tolerances as ruling.
    #[must_use]
    pub fn profile_options(&self) -> ProfileOptions {
        ProfileOptions {
            samples_per_direction: self.curvature_samples,
            worst_case: self.worst_case_sampling,
            permitted_sag: self.sag_limit(),
            permitted_angle_deg: self.angle_limit_deg(),
        }
    }
}

impl Default for FacetOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(FacetOptions::default().validate().is_ok());
        assert!(FacetOptions::with_sag(1e-3).validate().is_ok());
    }

    #[test]
    fn invalid_configuration_fails_fast() {
        let mut options = FacetOptions::new();
        options.min_rungs = 10;
        options.max_rungs = 2;
        assert_eq!(options.validate(), Err(FacetError::RungBounds { min: 10, max: 2 }));

        let mut options = FacetOptions::new();
        options.max_sag = Some(-1.0);
        assert!(matches!(
            options.validate(),
            Err(FacetError::InvalidTolerance { name: "max_sag", .. })
        ));

        let mut options = FacetOptions::new();
        options.curvature_samples = 1;
        assert_eq!(options.validate(), Err(FacetError::InvalidSampleCount { count: 1 }));
    }

    #[test]
    fn disabled_limits_are_infinite() {
        let options = FacetOptions::with_sag(0.5);
        assert_eq!(options.sag_limit(), 0.5);
        assert!(options.angle_limit_deg().is_infinite());
        assert!(options.edge_limit().is_infinite());
        assert_eq!(options.profile_options().permitted_sag, 0.5);
    }
}
