use crate::geom::TransformError;

/// Invalid-configuration failures reported at the setup boundary.
///
/// Degenerate input (collapsed ranges, poles) never produces one of these; it
/// is handled locally. Unreachable tolerances become
/// [`QualityWarning`](super::QualityWarning)s instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FacetError {
    #[error("{name} must be positive (or disabled), got {value}")]
    InvalidTolerance { name: &'static str, value: f64 },

    #[error("rung bounds must satisfy 1 <= min <= max, got min {min}, max {max}")]
    RungBounds { min: usize, max: usize },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(
        "transform maps the {found} parameter onto the altitude axis, ladder runs along {expected}"
    )]
    TransformDirection {
        expected: &'static str,
        found: &'static str,
    },

    #[error("ladder altitudes must be strictly ascending (violated at index {index})")]
    NonAscendingAltitudes { index: usize },

    #[error("ladder needs at least two finite altitudes, got {count}")]
    EmptyAltitudes { count: usize },

    #[error("curvature sampling needs at least 2 samples per direction, got {count}")]
    InvalidSampleCount { count: usize },

    #[error("shared boundary refers to unknown face {index}")]
    UnknownFace { index: usize },

    #[error("faceting cancelled")]
    Cancelled,
}

/// Checks a tolerance that may be disabled with `f64::INFINITY`.
pub(crate) fn check_tolerance(name: &'static str, value: f64) -> Result<(), FacetError> {
    if value.is_nan() || value <= 0.0 {
        return Err(FacetError::InvalidTolerance { name, value });
    }
    Ok(())
}

pub(crate) fn check_rung_bounds(min: usize, max: usize) -> Result<(), FacetError> {
    if min == 0 || min > max {
        return Err(FacetError::RungBounds { min, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinity_disables_a_tolerance() {
        assert!(check_tolerance("max_sag", f64::INFINITY).is_ok());
        assert!(check_tolerance("max_sag", 1e-3).is_ok());
        assert_eq!(
            check_tolerance("max_sag", 0.0),
            Err(FacetError::InvalidTolerance { name: "max_sag", value: 0.0 })
        );
        assert!(check_tolerance("max_sag", f64::NAN).is_err());
    }

    #[test]
    fn rung_bounds_messages() {
        let err = check_rung_bounds(8, 4).unwrap_err();
        assert_eq!(err.to_string(), "rung bounds must satisfy 1 <= min <= max, got min 8, max 4");
        assert!(check_rung_bounds(0, 4).is_err());
        assert!(check_rung_bounds(4, 4).is_ok());
    }
}
