use nalgebra as na;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("Axis lengths must be positive, got {0} and {1}")]
    NonPositiveAxes(f64, f64),

    #[error("Conic coefficients are not finite")]
    NonFinite,

    #[error("Conic does not define an ellipse, 4AC - B^2 = {0}")]
    NotAnEllipse(f64),

    #[error("Ellipse has no real points, value at center = {0}")]
    Imaginary(f64),

    #[error("Conic gradient vanishes at ({0}, {1})")]
    ZeroGradient(f64, f64),

    #[error("Limbus cone is degenerate, eigenvalue spread = {0}")]
    DegenerateCone(f64),
}

/// Coefficients `[A, B, C, D, E, F]` of `Ax² + Bxy + Cy² + Dx + Ey + F = 0` for a rotated
/// rectangle whose `width` axis points along `angle_deg` and `height` axis is perpendicular to it.
///
/// The polynomial is scaled so that it evaluates to `-1` at the center and `0` on the curve.
pub fn compute_coeffs(cx: f64, cy: f64, width: f64, height: f64, angle_deg: f64) -> [f64; 6] {
    let (sin_t, cos_t) = angle_deg.to_radians().sin_cos();
    let a2 = width * width / 4.0;
    let b2 = height * height / 4.0;

    let a_quad = cos_t * cos_t / a2 + sin_t * sin_t / b2;
    let b_quad = 2.0 * cos_t * sin_t / a2 - 2.0 * cos_t * sin_t / b2;
    let c_quad = sin_t * sin_t / a2 + cos_t * cos_t / b2;
    let d_quad = -2.0 * a_quad * cx - b_quad * cy;
    let e_quad = -b_quad * cx - 2.0 * c_quad * cy;
    let f_quad = a_quad * cx * cx + b_quad * cx * cy + c_quad * cy * cy - 1.0;

    [a_quad, b_quad, c_quad, d_quad, e_quad, f_quad]
}

/// Symmetric 3x3 matrix of the conic, `[x y 1] M [x y 1]ᵀ = Q(x, y)`.
pub fn coeffs_to_matrix(coeffs: &[f64; 6]) -> na::Matrix3<f64> {
    let [a, b, c, d, e, f] = *coeffs;
    na::Matrix3::new(
        a,
        b / 2.0,
        d / 2.0,
        b / 2.0,
        c,
        e / 2.0,
        d / 2.0,
        e / 2.0,
        f,
    )
}

pub(crate) fn check_ellipse_conditions(coeffs: &[f64; 6]) -> Result<(), ShapeError> {
    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(ShapeError::NonFinite);
    }

    let [a, b, c, ..] = *coeffs;
    let discriminant = 4.0 * a * c - b * b;
    if discriminant <= 0.0 {
        return Err(ShapeError::NotAnEllipse(discriminant));
    }

    Ok(())
}

/// Geometric parameters recovered from conic coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectParams {
    pub center: [f64; 2],
    /// `[minor, major]` full axis lengths.
    pub axes: [f64; 2],
    /// Direction of the minor axis in degrees, in `[0, 180)`.
    pub angle_deg: f64,
}

/// Recovers center, full axis lengths and minor-axis direction from any scaling of the
/// coefficients of a real ellipse.
pub fn compute_rect(coeffs: &[f64; 6]) -> Result<RectParams, ShapeError> {
    check_ellipse_conditions(coeffs)?;

    // Sign-normalize so that the polynomial is negative inside
    let [a, b, c, d, e, f] = if coeffs[0] + coeffs[2] < 0.0 {
        coeffs.map(|v| -v)
    } else {
        *coeffs
    };

    let det = 4.0 * a * c - b * b;
    let x0 = (b * e - 2.0 * c * d) / det;
    let y0 = (b * d - 2.0 * a * e) / det;

    let value_at_center = f + (d * x0 + e * y0) / 2.0;
    if value_at_center >= 0.0 {
        return Err(ShapeError::Imaginary(value_at_center));
    }

    // Eigenvalues of the quadratic block [[a, b/2], [b/2, c]], l1 >= l2 > 0
    let mean = (a + c) / 2.0;
    let spread = (((a - c) / 2.0).powi(2) + (b / 2.0).powi(2)).sqrt();
    let l1 = mean + spread;
    let l2 = mean - spread;

    let minor = 2.0 * (-value_at_center / l1).sqrt();
    let major = 2.0 * (-value_at_center / l2).sqrt();
    if !(minor > 0.0 && major > 0.0) {
        return Err(ShapeError::NonPositiveAxes(minor, major));
    }

    // Eigenvector of l1 is the direction of the short axis
    let (dir_x, dir_y) = if b.abs() > f64::EPSILON * (a.abs() + c.abs()) {
        (b / 2.0, l1 - a)
    } else if a >= c {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };
    let angle_deg = dir_y.atan2(dir_x).to_degrees().rem_euclid(180.0);

    Ok(RectParams {
        center: [x0, y0],
        axes: [minor, major],
        angle_deg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_coeffs_eq(a: &[f64; 6], b: &[f64; 6]) {
        for (x, y) in a.iter().zip(b) {
            assert_relative_eq!(x, y, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_circle_at_origin() {
        let c = compute_coeffs(0.0, 0.0, 2.0, 2.0, 0.0);
        assert_coeffs_eq(&c, &[1.0, 0.0, 1.0, 0.0, 0.0, -1.0]);

        let c = compute_coeffs(0.0, 0.0, 4.0, 2.0, 0.0);
        assert_coeffs_eq(&c, &[0.25, 0.0, 1.0, 0.0, 0.0, -1.0]);
    }

    #[test]
    fn test_circle_rotation_invariance() {
        let c1 = compute_coeffs(3.0, -2.0, 5.0, 5.0, 0.0);
        let c2 = compute_coeffs(3.0, -2.0, 5.0, 5.0, 45.0);
        assert_coeffs_eq(&c1, &c2);
    }

    #[test]
    fn test_translated_circle() {
        // (x-1)² + (y-1)² = 1  =>  x² + y² - 2x - 2y + 1 = 0
        let c = compute_coeffs(1.0, 1.0, 2.0, 2.0, 0.0);
        assert_coeffs_eq(&c, &[1.0, 0.0, 1.0, -2.0, -2.0, 1.0]);
    }

    #[test]
    fn test_matrix_is_symmetric() {
        let m = coeffs_to_matrix(&compute_coeffs(10.0, 20.0, 6.0, 9.0, 33.0));
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(m[(i, j)], m[(j, i)]);
            }
        }
        assert!(m[(0, 1)].abs() > 1e-10);
    }

    #[test]
    fn test_rect_roundtrip() -> anyhow::Result<()> {
        for &angle in &[0.0, 17.0, 45.0, 90.0, 135.5, 179.0] {
            let coeffs = compute_coeffs(12.0, -7.0, 8.0, 14.0, angle);
            let rect = compute_rect(&coeffs)?;
            assert_relative_eq!(rect.center[0], 12.0, epsilon = 1e-9);
            assert_relative_eq!(rect.center[1], -7.0, epsilon = 1e-9);
            assert_relative_eq!(rect.axes[0], 8.0, epsilon = 1e-9);
            assert_relative_eq!(rect.axes[1], 14.0, epsilon = 1e-9);
            assert_relative_eq!(rect.angle_deg, angle, epsilon = 1e-7);
        }
        Ok(())
    }

    #[test]
    fn test_rect_ignores_scale_and_sign() -> anyhow::Result<()> {
        let coeffs = compute_coeffs(5.0, 5.0, 4.0, 10.0, 30.0).map(|c| -3.5 * c);
        let rect = compute_rect(&coeffs)?;
        assert_relative_eq!(rect.axes[0], 4.0, epsilon = 1e-9);
        assert_relative_eq!(rect.axes[1], 10.0, epsilon = 1e-9);
        assert_relative_eq!(rect.angle_deg, 30.0, epsilon = 1e-7);
        Ok(())
    }

    #[test]
    fn test_not_ellipse() {
        // x²/4 - y² - 1 = 0 is a hyperbola
        let hyperbola = [0.25, 0.0, -1.0, 0.0, 0.0, -1.0];
        assert!(matches!(
            compute_rect(&hyperbola),
            Err(ShapeError::NotAnEllipse(_))
        ));
    }

    #[test]
    fn test_imaginary_ellipse() {
        // x² + y² + 1 = 0 has no real points
        let imaginary = [1.0, 0.0, 1.0, 0.0, 0.0, 1.0];
        assert!(matches!(
            compute_rect(&imaginary),
            Err(ShapeError::Imaginary(_))
        ));
    }

    #[test]
    fn test_non_finite() {
        let bad = [f64::NAN, 0.0, 1.0, 0.0, 0.0, -1.0];
        assert_eq!(compute_rect(&bad), Err(ShapeError::NonFinite));
    }
}
