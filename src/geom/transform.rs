//! Closed-form bijections between an application's (u, v) parameter space and a
//! ladder's local (altitude, cross) coordinates.
//!
//! Every variant maps the altitude axis of the ladder onto local `u` (the first
//! coordinate of the result of [`ParTransform::forward`]); the second
//! coordinate is the cross parameter along a rung.

use super::core::Tolerance;
use super::param::{Interval, ParBox, ParPos, ParamAxis};

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("scale factor along {axis} must be finite and non-zero, got {value}")]
    ZeroScale { axis: &'static str, value: f64 },
}

/// Anisotropic scale with two non-zero, finite factors.
///
/// Only constructible through [`ParTransform::scale`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisScale {
    su: f64,
    sv: f64,
}

impl AxisScale {
    #[must_use]
    pub const fn su(&self) -> f64 {
        self.su
    }

    #[must_use]
    pub const fn sv(&self) -> f64 {
        self.sv
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ParTransform {
    #[default]
    Identity,
    /// `(u, v) -> (-u, v)`
    FlipU,
    /// `(u, v) -> (u, -v)`
    FlipV,
    /// `(u, v) -> (v, u)`
    Swap,
    /// Counter-clockwise quarter turn: `(u, v) -> (-v, u)`
    Rotate90,
    /// `(u, v) -> (-u, -v)`
    Rotate180,
    /// Clockwise quarter turn: `(u, v) -> (v, -u)`
    Rotate270,
    /// `(u, v) -> (su * u, sv * v)`
    Scale(AxisScale),
}

impl ParTransform {
    /// Anisotropic scale. Zero or non-finite factors would make the map
    /// singular and are rejected.
    pub fn scale(su: f64, sv: f64) -> Result<Self, TransformError> {
        if !su.is_finite() || su == 0.0 {
            return Err(TransformError::ZeroScale { axis: "u", value: su });
        }
        if !sv.is_finite() || sv == 0.0 {
            return Err(TransformError::ZeroScale { axis: "v", value: sv });
        }
        Ok(Self::Scale(AxisScale { su, sv }))
    }

    /// Application space to local space.
    #[must_use]
    pub fn forward(&self, p: ParPos) -> ParPos {
        match self {
            Self::Identity => p,
            Self::FlipU => ParPos::new(-p.u, p.v),
            Self::FlipV => ParPos::new(p.u, -p.v),
            Self::Swap => ParPos::new(p.v, p.u),
            Self::Rotate90 => ParPos::new(-p.v, p.u),
            Self::Rotate180 => ParPos::new(-p.u, -p.v),
            Self::Rotate270 => ParPos::new(p.v, -p.u),
            Self::Scale(s) => ParPos::new(p.u * s.su, p.v * s.sv),
        }
    }

    /// Local space back to application space.
    #[must_use]
    pub fn invert(&self, q: ParPos) -> ParPos {
        match self {
            Self::Identity => q,
            Self::FlipU => ParPos::new(-q.u, q.v),
            Self::FlipV => ParPos::new(q.u, -q.v),
            Self::Swap => ParPos::new(q.v, q.u),
            Self::Rotate90 => ParPos::new(q.v, -q.u),
            Self::Rotate180 => ParPos::new(-q.u, -q.v),
            Self::Rotate270 => ParPos::new(-q.v, q.u),
            Self::Scale(s) => ParPos::new(q.u / s.su, q.v / s.sv),
        }
    }

    /// The transform whose `forward` is this transform's `invert`.
    #[must_use]
    pub fn inverse(&self) -> Self {
        match self {
            Self::Rotate90 => Self::Rotate270,
            Self::Rotate270 => Self::Rotate90,
            Self::Scale(s) => Self::Scale(AxisScale {
                su: 1.0 / s.su,
                sv: 1.0 / s.sv,
            }),
            other => *other,
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        match self {
            Self::Identity => true,
            Self::Scale(s) => s.su == 1.0 && s.sv == 1.0,
            _ => false,
        }
    }

    /// Whether the map reverses orientation (facet winding flips through it).
    #[must_use]
    pub fn is_reflection(&self) -> bool {
        match self {
            Self::FlipU | Self::FlipV | Self::Swap => true,
            Self::Scale(s) => (s.su < 0.0) != (s.sv < 0.0),
            _ => false,
        }
    }

    /// Application parameter that becomes the local altitude axis.
    #[must_use]
    pub const fn altitude_direction(&self) -> ParamAxis {
        match self {
            Self::Swap | Self::Rotate90 | Self::Rotate270 => ParamAxis::V,
            _ => ParamAxis::U,
        }
    }

    /// `|d altitude / d t|` where `t` is the application parameter along
    /// [`Self::altitude_direction`].
    #[must_use]
    pub fn altitude_scale(&self) -> f64 {
        match self {
            Self::Scale(s) => s.su.abs(),
            _ => 1.0,
        }
    }

    /// `|d cross / d t|` for the other application parameter.
    #[must_use]
    pub fn cross_scale(&self) -> f64 {
        match self {
            Self::Scale(s) => s.sv.abs(),
            _ => 1.0,
        }
    }

    /// Image of an application-space box in local space.
    #[must_use]
    pub fn forward_box(&self, b: &ParBox) -> ParBox {
        if b.is_empty() {
            return ParBox::EMPTY;
        }
        let a = self.forward(b.low());
        let c = self.forward(b.high());
        ParBox::new(Interval::new(a.u, c.u), Interval::new(a.v, c.v))
    }

    /// Round-trip check used by debug assertions and tests.
    #[must_use]
    pub fn round_trips(&self, p: ParPos, tol: Tolerance) -> bool {
        let back = self.invert(self.forward(p));
        tol.approx_eq_f64(back.u, p.u) && tol.approx_eq_f64(back.v, p.v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_scale_is_rejected() {
        assert!(matches!(
            ParTransform::scale(0.0, 1.0),
            Err(TransformError::ZeroScale { axis: "u", .. })
        ));
        assert!(matches!(
            ParTransform::scale(2.0, f64::NAN),
            Err(TransformError::ZeroScale { axis: "v", .. })
        ));
        assert!(ParTransform::scale(-2.0, 0.5).is_ok());
    }

    #[test]
    fn quarter_turns_compose_to_identity() {
        let p = ParPos::new(0.25, -3.5);
        let r = ParTransform::Rotate90;
        let twice = r.forward(r.forward(p));
        assert_eq!(twice, ParTransform::Rotate180.forward(p));
        assert_eq!(ParTransform::Rotate270.forward(ParTransform::Rotate90.forward(p)), p);
    }

    #[test]
    fn inverse_matches_invert() {
        let p = ParPos::new(1.5, 7.0);
        for t in [
            ParTransform::Identity,
            ParTransform::FlipU,
            ParTransform::Swap,
            ParTransform::Rotate90,
            ParTransform::Rotate270,
        ] {
            assert_eq!(t.inverse().forward(p), t.invert(p), "{t:?}");
        }
    }

    #[test]
    fn unit_scale_is_identity() {
        assert!(ParTransform::scale(1.0, 1.0).unwrap().is_identity());
        assert!(!ParTransform::FlipU.is_identity());
    }

    #[test]
    fn altitude_axis_classification() {
        assert_eq!(ParTransform::Identity.altitude_direction(), ParamAxis::U);
        assert_eq!(ParTransform::FlipV.altitude_direction(), ParamAxis::U);
        assert_eq!(ParTransform::Swap.altitude_direction(), ParamAxis::V);
        assert_eq!(ParTransform::Rotate270.altitude_direction(), ParamAxis::V);
    }

    #[test]
    fn forward_box_of_flip_keeps_extent() {
        let b = ParBox::from_corners(ParPos::new(0.0, 1.0), ParPos::new(2.0, 4.0));
        let f = ParTransform::FlipU.forward_box(&b);
        assert_eq!((f.u.low(), f.u.high()), (-2.0, 0.0));
        assert_eq!((f.v.low(), f.v.high()), (1.0, 4.0));
        let s = ParTransform::Swap.forward_box(&b);
        assert_eq!((s.u.low(), s.u.high()), (1.0, 4.0));
    }
}
