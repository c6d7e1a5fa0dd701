use std::f64::consts::{PI, TAU};

use super::core::{Point3, Tolerance, Vec3};
use super::param::{Interval, ParBox};

fn wrap_param(value: f64, start: f64, end: f64) -> f64 {
    let span = end - start;
    if !span.is_finite() || span == 0.0 {
        return start;
    }
    let mut t = (value - start) % span;
    if t < 0.0 {
        t += span;
    }
    start + t
}

fn orthogonal_unit_vector(reference: Vec3) -> Vec3 {
    let candidate = if reference.x.abs() < reference.y.abs() {
        Vec3::new(0.0, -reference.z, reference.y)
    } else {
        Vec3::new(-reference.z, 0.0, reference.x)
    };
    candidate.normalized().unwrap_or(Vec3::X)
}

/// Right-handed frame `(x, y, z)` with `z` along `axis`.
fn frame_from_axis(axis: Vec3) -> Option<(Vec3, Vec3, Vec3)> {
    let z = axis.normalized()?;
    let x = orthogonal_unit_vector(z);
    let y = z.cross(x).normalized()?;
    Some((x, y, z))
}

/// Closed-form description of a surface, used by the curvature oracle to skip
/// sampling. Parameter conventions match the evaluators in this module.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceKind {
    /// `P = origin + u * u_axis + v * v_axis`
    Plane { u_axis: Vec3, v_axis: Vec3 },
    /// `u` in `[0, 1]` is one revolution, `v` runs along an axis of length `height`.
    Cylinder { radius: f64, height: f64 },
    /// Radius varies linearly from `radius0` at `v = 0` to `radius1` at `v = 1`.
    Cone {
        radius0: f64,
        radius1: f64,
        height: f64,
    },
    /// `u` is longitude (one revolution), `v` is latitude from pole to pole.
    Sphere { radius: f64 },
    /// `u` sweeps the major circle, `v` the tube.
    Torus { major_radius: f64, minor_radius: f64 },
    FreeForm,
}

/// Evaluation oracle for a parametric surface.
///
/// Only `point_at` is required. Derivatives default to finite differences,
/// which is adequate for faceting; evaluators with exact derivatives may
/// override them.
pub trait Surface {
    fn point_at(&self, u: f64, v: f64) -> Point3;

    #[must_use]
    fn domain_u(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    #[must_use]
    fn domain_v(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    #[must_use]
    fn domain(&self) -> ParBox {
        let (u0, u1) = self.domain_u();
        let (v0, v1) = self.domain_v();
        ParBox::new(Interval::new(u0, u1), Interval::new(v0, v1))
    }

    #[must_use]
    fn is_u_closed(&self) -> bool {
        false
    }

    #[must_use]
    fn is_v_closed(&self) -> bool {
        false
    }

    #[must_use]
    fn pole_v_start(&self) -> bool {
        false
    }

    #[must_use]
    fn pole_v_end(&self) -> bool {
        false
    }

    #[must_use]
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::FreeForm
    }

    /// `(dP/du, dP/dv)` by one-sided or central differences.
    #[must_use]
    fn partial_derivatives_at(&self, u: f64, v: f64) -> (Vec3, Vec3) {
        let (u0, u1) = self.domain_u();
        let (v0, v1) = self.domain_v();
        let u_closed = self.is_u_closed();
        let v_closed = self.is_v_closed();
        let u = if u_closed { wrap_param(u, u0, u1) } else { u.clamp(u0, u1) };
        let v = if v_closed { wrap_param(v, v0, v1) } else { v.clamp(v0, v1) };

        let du = difference_step(u, u0, u1, u_closed, Tolerance::DERIVATIVE)
            .map_or(Vec3::ZERO, |(a, b)| {
                self.point_at(b, v).sub_point(self.point_at(a, v)).mul_scalar(1.0 / (b - a))
            });
        let dv = difference_step(v, v0, v1, v_closed, Tolerance::DERIVATIVE)
            .map_or(Vec3::ZERO, |(a, b)| {
                self.point_at(u, b).sub_point(self.point_at(u, a)).mul_scalar(1.0 / (b - a))
            });
        (du, dv)
    }

    #[must_use]
    fn normal_at(&self, u: f64, v: f64) -> Option<Vec3> {
        let (du, dv) = self.partial_derivatives_at(u, v);
        du.cross(dv).normalized()
    }

    /// `(d²P/du², d²P/dudv, d²P/dv²)` by differencing the first derivatives.
    #[must_use]
    fn second_partial_derivatives_at(&self, u: f64, v: f64) -> (Vec3, Vec3, Vec3) {
        let (u0, u1) = self.domain_u();
        let (v0, v1) = self.domain_v();
        let u_closed = self.is_u_closed();
        let v_closed = self.is_v_closed();
        let u = if u_closed { wrap_param(u, u0, u1) } else { u.clamp(u0, u1) };
        let v = if v_closed { wrap_param(v, v0, v1) } else { v.clamp(v0, v1) };

        let u_step = difference_step(u, u0, u1, u_closed, Tolerance::SECOND_DERIVATIVE);
        let v_step = difference_step(v, v0, v1, v_closed, Tolerance::SECOND_DERIVATIVE);

        let mut duu = Vec3::ZERO;
        let mut duv = Vec3::ZERO;
        let mut dvv = Vec3::ZERO;

        if let Some((a, b)) = u_step {
            let (du_a, dv_a) = self.partial_derivatives_at(a, v);
            let (du_b, dv_b) = self.partial_derivatives_at(b, v);
            let inv = 1.0 / (b - a);
            duu = du_b.sub(du_a).mul_scalar(inv);
            duv = dv_b.sub(dv_a).mul_scalar(inv);
        }
        if let Some((a, b)) = v_step {
            let (_, dv_a) = self.partial_derivatives_at(u, a);
            let (_, dv_b) = self.partial_derivatives_at(u, b);
            dvv = dv_b.sub(dv_a).mul_scalar(1.0 / (b - a));
        }
        (duu, duv, dvv)
    }
}

/// Bracketing parameters for a finite difference around `t`, kept inside the
/// domain unless it is closed. `None` for an empty or non-finite domain.
fn difference_step(t: f64, t0: f64, t1: f64, closed: bool, rel: Tolerance) -> Option<(f64, f64)> {
    let span = t1 - t0;
    if !span.is_finite() || span == 0.0 {
        return None;
    }
    let h = rel.relative_to(span);
    let (a, b) = if closed {
        (t - h, t + h)
    } else {
        ((t - h).max(t0), (t + h).min(t1))
    };
    (b > a).then_some((a, b))
}

// ─────────────────────────────────────────────────────────────────────────────
// Analytic evaluators
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneSurface {
    pub origin: Point3,
    pub u_axis: Vec3,
    pub v_axis: Vec3,
}

impl PlaneSurface {
    #[must_use]
    pub const fn new(origin: Point3, u_axis: Vec3, v_axis: Vec3) -> Self {
        Self {
            origin,
            u_axis,
            v_axis,
        }
    }
}

impl Surface for PlaneSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        self.origin
            .add_vec(self.u_axis.mul_scalar(u))
            .add_vec(self.v_axis.mul_scalar(v))
    }

    fn partial_derivatives_at(&self, _u: f64, _v: f64) -> (Vec3, Vec3) {
        (self.u_axis, self.v_axis)
    }

    fn second_partial_derivatives_at(&self, _u: f64, _v: f64) -> (Vec3, Vec3, Vec3) {
        (Vec3::ZERO, Vec3::ZERO, Vec3::ZERO)
    }

    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Plane {
            u_axis: self.u_axis,
            v_axis: self.v_axis,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CylinderSurface {
    pub base: Point3,
    pub axis: Vec3,
    pub x_axis: Vec3,
    pub y_axis: Vec3,
    pub radius: f64,
}

impl CylinderSurface {
    pub fn new(base: Point3, axis: Vec3, radius: f64) -> Result<Self, String> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err("cylinder radius must be finite and > 0".to_string());
        }
        let (x_axis, y_axis, _) =
            frame_from_axis(axis).ok_or_else(|| "cylinder axis must be non-zero".to_string())?;
        Ok(Self {
            base,
            axis,
            x_axis,
            y_axis,
            radius,
        })
    }
}

impl Surface for CylinderSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        let angle = TAU * u;
        let radial = self
            .x_axis
            .mul_scalar(angle.cos())
            .add(self.y_axis.mul_scalar(angle.sin()))
            .mul_scalar(self.radius);
        self.base.add_vec(self.axis.mul_scalar(v)).add_vec(radial)
    }

    fn is_u_closed(&self) -> bool {
        true
    }

    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Cylinder {
            radius: self.radius,
            height: self.axis.length(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeSurface {
    pub base: Point3,
    pub axis: Vec3,
    pub x_axis: Vec3,
    pub y_axis: Vec3,
    pub radius0: f64,
    pub radius1: f64,
}

impl ConeSurface {
    pub fn new(base: Point3, axis: Vec3, radius0: f64, radius1: f64) -> Result<Self, String> {
        if !radius0.is_finite() || radius0 < 0.0 || !radius1.is_finite() || radius1 < 0.0 {
            return Err("cone radii must be finite and >= 0".to_string());
        }
        if radius0 == 0.0 && radius1 == 0.0 {
            return Err("cone needs at least one non-zero radius".to_string());
        }
        let (x_axis, y_axis, _) =
            frame_from_axis(axis).ok_or_else(|| "cone axis must be non-zero".to_string())?;
        Ok(Self {
            base,
            axis,
            x_axis,
            y_axis,
            radius0,
            radius1,
        })
    }
}

impl Surface for ConeSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        let angle = TAU * u;
        let radius = self.radius0 + (self.radius1 - self.radius0) * v;
        let radial = self
            .x_axis
            .mul_scalar(angle.cos())
            .add(self.y_axis.mul_scalar(angle.sin()))
            .mul_scalar(radius);
        self.base.add_vec(self.axis.mul_scalar(v)).add_vec(radial)
    }

    fn is_u_closed(&self) -> bool {
        true
    }

    fn pole_v_start(&self) -> bool {
        self.radius0 == 0.0
    }

    fn pole_v_end(&self) -> bool {
        self.radius1 == 0.0
    }

    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Cone {
            radius0: self.radius0,
            radius1: self.radius1,
            height: self.axis.length(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereSurface {
    pub center: Point3,
    pub x_axis: Vec3,
    pub y_axis: Vec3,
    pub z_axis: Vec3,
    pub radius: f64,
}

impl SphereSurface {
    pub fn new(center: Point3, radius: f64) -> Result<Self, String> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err("sphere radius must be finite and > 0".to_string());
        }
        Ok(Self {
            center,
            x_axis: Vec3::X,
            y_axis: Vec3::Y,
            z_axis: Vec3::Z,
            radius,
        })
    }

    /// Latitude in radians for parameter `v`.
    #[must_use]
    pub fn latitude(v: f64) -> f64 {
        PI * (v.clamp(0.0, 1.0) - 0.5)
    }
}

impl Surface for SphereSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        let theta = TAU * u;
        let phi = Self::latitude(v);
        let (sin_phi, cos_phi) = phi.sin_cos();

        let dir = self
            .x_axis
            .mul_scalar(cos_phi * theta.cos())
            .add(self.y_axis.mul_scalar(cos_phi * theta.sin()))
            .add(self.z_axis.mul_scalar(sin_phi));
        self.center.add_vec(dir.mul_scalar(self.radius))
    }

    fn normal_at(&self, u: f64, v: f64) -> Option<Vec3> {
        self.point_at(u, v).sub_point(self.center).normalized()
    }

    fn is_u_closed(&self) -> bool {
        true
    }

    fn pole_v_start(&self) -> bool {
        true
    }

    fn pole_v_end(&self) -> bool {
        true
    }

    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Sphere {
            radius: self.radius,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorusSurface {
    pub center: Point3,
    pub x_axis: Vec3,
    pub y_axis: Vec3,
    pub z_axis: Vec3,
    pub major_radius: f64,
    pub minor_radius: f64,
}

impl TorusSurface {
    pub fn new(
        center: Point3,
        axis: Vec3,
        major_radius: f64,
        minor_radius: f64,
    ) -> Result<Self, String> {
        if !major_radius.is_finite() || major_radius <= 0.0 {
            return Err("torus major radius must be finite and > 0".to_string());
        }
        if !minor_radius.is_finite() || minor_radius <= 0.0 {
            return Err("torus minor radius must be finite and > 0".to_string());
        }
        let (x_axis, y_axis, z_axis) =
            frame_from_axis(axis).ok_or_else(|| "torus axis must be non-zero".to_string())?;
        Ok(Self {
            center,
            x_axis,
            y_axis,
            z_axis,
            major_radius,
            minor_radius,
        })
    }
}

impl Surface for TorusSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        let theta = TAU * u;
        let phi = TAU * v;
        let (sin_phi, cos_phi) = phi.sin_cos();

        let radial = self
            .x_axis
            .mul_scalar(theta.cos())
            .add(self.y_axis.mul_scalar(theta.sin()));
        let tube = radial.mul_scalar(self.major_radius + self.minor_radius * cos_phi);
        let vertical = self.z_axis.mul_scalar(self.minor_radius * sin_phi);
        self.center.add_vec(tube.add(vertical))
    }

    fn is_u_closed(&self) -> bool {
        true
    }

    fn is_v_closed(&self) -> bool {
        true
    }

    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Torus {
            major_radius: self.major_radius,
            minor_radius: self.minor_radius,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Free-form evaluator
// ─────────────────────────────────────────────────────────────────────────────

/// Tensor-product Bézier patch over `[0, 1]²`, evaluated by de Casteljau.
///
/// Control points are stored row-major: `points[i * (degree_v + 1) + j]` is
/// the point at u-index `i`, v-index `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct BezierSurface {
    points: Vec<Point3>,
    degree_u: usize,
    degree_v: usize,
}

impl BezierSurface {
    pub fn new(points: Vec<Point3>, degree_u: usize, degree_v: usize) -> Result<Self, String> {
        if degree_u == 0 || degree_v == 0 {
            return Err("bezier surface degrees must be >= 1".to_string());
        }
        let expected = (degree_u + 1) * (degree_v + 1);
        if points.len() != expected {
            return Err(format!(
                "bezier surface of degree {degree_u}x{degree_v} needs {expected} points, got {}",
                points.len()
            ));
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err("bezier control points must be finite".to_string());
        }
        Ok(Self {
            points,
            degree_u,
            degree_v,
        })
    }

    /// Bilinear patch through four corners, in `(u, v)` order
    /// `(0,0), (1,0), (0,1), (1,1)`. A non-planar quad gives a twisted patch.
    pub fn bilinear(p00: Point3, p10: Point3, p01: Point3, p11: Point3) -> Result<Self, String> {
        Self::new(vec![p00, p01, p10, p11], 1, 1)
    }

    #[must_use]
    pub const fn degrees(&self) -> (usize, usize) {
        (self.degree_u, self.degree_v)
    }

    fn de_casteljau(scratch: &mut [Point3], t: f64) -> Point3 {
        let n = scratch.len();
        for level in 1..n {
            for i in 0..n - level {
                scratch[i] = scratch[i].lerp(scratch[i + 1], t);
            }
        }
        scratch.first().copied().unwrap_or(Point3::ORIGIN)
    }
}

impl Surface for BezierSurface {
    fn point_at(&self, u: f64, v: f64) -> Point3 {
        let u = u.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);
        let stride = self.degree_v + 1;

        let mut column: Vec<Point3> = self
            .points
            .chunks_exact(stride)
            .map(|row| {
                let mut scratch = row.to_vec();
                Self::de_casteljau(&mut scratch, v)
            })
            .collect();
        Self::de_casteljau(&mut column, u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bezier_interpolates_corners() {
        let s = BezierSurface::bilinear(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        )
        .unwrap();
        assert_eq!(s.point_at(1.0, 0.0), Point3::new(1.0, 0.0, 0.0));
        assert_eq!(s.point_at(0.0, 1.0), Point3::new(0.0, 1.0, 0.0));
        assert_eq!(s.point_at(1.0, 1.0), Point3::new(1.0, 1.0, 1.0));
        let mid = s.point_at(0.5, 0.5);
        assert!((mid.z - 0.25).abs() < 1e-12);
    }

    #[test]
    fn bezier_rejects_wrong_point_count() {
        assert!(BezierSurface::new(vec![Point3::ORIGIN; 3], 1, 1).is_err());
        assert!(BezierSurface::new(vec![Point3::ORIGIN; 4], 0, 3).is_err());
    }

    #[test]
    fn sphere_poles_collapse() {
        let s = SphereSurface::new(Point3::ORIGIN, 2.0).unwrap();
        let a = s.point_at(0.0, 0.0);
        let b = s.point_at(0.37, 0.0);
        assert!(a.distance_to(b) < 1e-12);
        assert!((a.z + 2.0).abs() < 1e-12);
    }

    #[test]
    fn finite_difference_matches_cylinder_tangent() {
        let c = CylinderSurface::new(Point3::ORIGIN, Vec3::new(0.0, 0.0, 3.0), 2.0).unwrap();
        let (du, dv) = c.partial_derivatives_at(0.25, 0.5);
        assert!((du.length() - TAU * 2.0).abs() < 1e-4);
        assert!((dv.length() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn invalid_radii_are_rejected() {
        assert!(SphereSurface::new(Point3::ORIGIN, 0.0).is_err());
        assert!(ConeSurface::new(Point3::ORIGIN, Vec3::Z, 0.0, 0.0).is_err());
        assert!(TorusSurface::new(Point3::ORIGIN, Vec3::ZERO, 2.0, 1.0).is_err());
    }
}
