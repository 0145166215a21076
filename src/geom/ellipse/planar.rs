use crate::math::conic::{self, ShapeError};
use nalgebra as na;
use std::fmt::{self, Display, Formatter};

/// Exponent applied to the gradient magnitude when normalizing algebraic distances.
///
/// A value of 1 gives the first-order (Sampson-like) approximation of the geometric
/// distance; slightly smaller values penalize points near the flat ends of elongated
/// ellipses less (Rosin, 1996).
pub const GRADIENT_NORM_EXPONENT: f64 = 0.45;

/// Geometric form of an ellipse: center, full axis lengths and rotation in degrees.
///
/// The first axis (`width`) points along `angle_deg`, the second one is perpendicular to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: na::Point2<f64>,
    pub width: f64,
    pub height: f64,
    pub angle_deg: f64,
}

impl RotatedRect {
    pub fn new(center: na::Point2<f64>, width: f64, height: f64, angle_deg: f64) -> Self {
        Self {
            center,
            width,
            height,
            angle_deg,
        }
    }

    /// Swaps the axes so that `width <= height` and wraps the angle into `[0, 180)`.
    fn canonical(self) -> Result<Self, ShapeError> {
        let Self {
            center,
            width,
            height,
            angle_deg,
        } = self;

        if !(width > 0.0 && height > 0.0) {
            return Err(ShapeError::NonPositiveAxes(width, height));
        }
        if !(center.x.is_finite() && center.y.is_finite() && angle_deg.is_finite()) {
            return Err(ShapeError::NonFinite);
        }

        let (width, height, angle_deg) = if width > height {
            (height, width, angle_deg + 90.0)
        } else {
            (width, height, angle_deg)
        };

        Ok(Self {
            center,
            width,
            height,
            angle_deg: angle_deg.rem_euclid(180.0),
        })
    }
}

/// An ellipse in the image plane, held both as a rotated rectangle and as the implicit conic
/// `Ax² + Bxy + Cy² + Dx + Ey + F = 0`.
///
/// The conic is scaled so that it evaluates to `-1` at the center: negative inside, positive
/// outside. The rectangle is always canonical, `width` is the minor axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    coeffs: [f64; 6],
    rect: RotatedRect,
}

impl Ellipse {
    pub fn from_rotated_rect(
        center: na::Point2<f64>,
        width: f64,
        height: f64,
        angle_deg: f64,
    ) -> Result<Self, ShapeError> {
        Self::from_rect(RotatedRect::new(center, width, height, angle_deg))
    }

    pub fn from_rect(rect: RotatedRect) -> Result<Self, ShapeError> {
        let rect = rect.canonical()?;
        let coeffs = conic::compute_coeffs(
            rect.center.x,
            rect.center.y,
            rect.width,
            rect.height,
            rect.angle_deg,
        );
        conic::check_ellipse_conditions(&coeffs)?;
        Ok(Self { coeffs, rect })
    }

    /// Builds an ellipse from coefficients of any scale or sign.
    ///
    /// The stored coefficients are re-derived from the recovered rectangle, so they follow the
    /// canonical scaling rather than the input's.
    pub fn from_coeffs(coeffs: [f64; 6]) -> Result<Self, ShapeError> {
        let params = conic::compute_rect(&coeffs)?;
        Self::from_rect(RotatedRect::new(
            na::Point2::from(params.center),
            params.axes[0],
            params.axes[1],
            params.angle_deg,
        ))
    }

    pub fn coeffs(&self) -> &[f64; 6] {
        &self.coeffs
    }

    pub fn rect(&self) -> &RotatedRect {
        &self.rect
    }

    pub fn center(&self) -> na::Point2<f64> {
        self.rect.center
    }

    pub fn minor_axis(&self) -> f64 {
        self.rect.width
    }

    pub fn major_axis(&self) -> f64 {
        self.rect.height
    }

    pub fn angle_deg(&self) -> f64 {
        self.rect.angle_deg
    }

    pub fn axis_ratio(&self) -> f64 {
        self.rect.height / self.rect.width
    }

    pub fn to_matrix(&self) -> na::Matrix3<f64> {
        conic::coeffs_to_matrix(&self.coeffs)
    }

    /// The same ellipse moved by `offset`, e.g. from eye-region into full-frame coordinates.
    pub fn translated(&self, offset: &na::Vector2<f64>) -> Self {
        let rect = RotatedRect {
            center: self.rect.center + offset,
            ..self.rect
        };
        let coeffs = conic::compute_coeffs(
            rect.center.x,
            rect.center.y,
            rect.width,
            rect.height,
            rect.angle_deg,
        );
        Self { coeffs, rect }
    }

    /// Point on the curve at parameter `t` (radians, measured from the minor axis).
    pub fn point_at(&self, t: f64) -> na::Point2<f64> {
        let (sin_a, cos_a) = self.rect.angle_deg.to_radians().sin_cos();
        let minor_dir = na::Vector2::new(cos_a, sin_a);
        let major_dir = na::Vector2::new(-sin_a, cos_a);
        self.rect.center
            + minor_dir * (self.rect.width / 2.0 * t.cos())
            + major_dir * (self.rect.height / 2.0 * t.sin())
    }

    /// Value of the conic polynomial at `p`.
    pub fn algebraic_distance(&self, p: &na::Point2<f64>) -> f64 {
        let [a, b, c, d, e, f] = self.coeffs;
        a * p.x * p.x + b * p.x * p.y + c * p.y * p.y + d * p.x + e * p.y + f
    }

    pub fn algebraic_distances(&self, points: &[na::Point2<f64>]) -> Vec<f64> {
        points.iter().map(|p| self.algebraic_distance(p)).collect()
    }

    /// Analytic gradient of the conic polynomial at `p`.
    pub fn gradient(&self, p: &na::Point2<f64>) -> Result<na::Vector2<f64>, ShapeError> {
        let [a, b, c, d, e, _] = self.coeffs;
        let grad = na::Vector2::new(
            2.0 * a * p.x + b * p.y + d,
            b * p.x + 2.0 * c * p.y + e,
        );
        if grad.x == 0.0 && grad.y == 0.0 {
            return Err(ShapeError::ZeroGradient(p.x, p.y));
        }
        Ok(grad)
    }

    pub fn gradient_dir(&self, p: &na::Point2<f64>) -> Result<na::Unit<na::Vector2<f64>>, ShapeError> {
        Ok(na::Unit::new_normalize(self.gradient(p)?))
    }

    /// Algebraic distance divided by `|∇Q|^0.45`, a cheap stand-in for the perpendicular
    /// distance to the curve.
    pub fn normalized_distance(&self, p: &na::Point2<f64>) -> Result<f64, ShapeError> {
        let grad = self.gradient(p)?;
        Ok(self.algebraic_distance(p) / grad.norm_squared().powf(GRADIENT_NORM_EXPONENT / 2.0))
    }

    pub fn normalized_distances(&self, points: &[na::Point2<f64>]) -> Result<Vec<f64>, ShapeError> {
        points.iter().map(|p| self.normalized_distance(p)).collect()
    }

    /// Factor converting normalized distances into approximate pixels: the inverse of the
    /// normalized distance of a point one pixel beyond the end of the major axis.
    pub fn residual_scale(&self) -> Result<f64, ShapeError> {
        let (sin_a, cos_a) = self.rect.angle_deg.to_radians().sin_cos();
        let major_dir = na::Vector2::new(-sin_a, cos_a);
        let probe = self.rect.center + major_dir * (self.rect.height / 2.0 + 1.0);

        let one_px = self.normalized_distance(&probe)?;
        if one_px == 0.0 || !one_px.is_finite() {
            return Err(ShapeError::ZeroGradient(probe.x, probe.y));
        }
        Ok(1.0 / one_px)
    }
}

impl Display for Ellipse {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(({:.2}, {:.2}), ({:.2}, {:.2}), {:.1}°)",
            self.rect.center.x, self.rect.center.y, self.rect.width, self.rect.height, self.rect.angle_deg
        )
    }
}
