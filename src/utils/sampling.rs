use nalgebra as na;

use crate::camera::CameraIntrinsics;
use crate::geom::ellipse::spatial::plane_frame;
use crate::Ellipse;

/// Evenly spaced points around the full ellipse, starting at the end of the minor axis.
pub fn sample_ellipse_points(ellipse: &Ellipse, num_points: usize) -> Vec<na::Point2<f64>> {
    (0..num_points)
        .map(|i| ellipse.point_at(i as f64 * std::f64::consts::TAU / num_points as f64))
        .collect()
}

/// Points on the ellipse whose polar angle around the center (degrees, image convention with
/// `y` pointing down) runs from `start_deg` to `end_deg`.
pub fn sample_ellipse_arc(
    ellipse: &Ellipse,
    start_deg: f64,
    end_deg: f64,
    num_points: usize,
) -> Vec<na::Point2<f64>> {
    let center = ellipse.center();
    let step = if num_points > 1 {
        (end_deg - start_deg) / (num_points - 1) as f64
    } else {
        0.0
    };

    (0..num_points)
        .map(|i| {
            let (sin_t, cos_t) = (start_deg + step * i as f64).to_radians().sin_cos();
            let dir = na::Vector2::new(cos_t, sin_t);
            // Q(center + r·dir) = -1 + r²·(dirᵀ A dir), solve for the boundary crossing
            let [a, b, c, ..] = *ellipse.coeffs();
            let quad = a * dir.x * dir.x + b * dir.x * dir.y + c * dir.y * dir.y;
            center + dir / quad.sqrt()
        })
        .collect()
}

/// Points on a circle of `radius` lying in the plane through `center` with the given `normal`.
pub fn sample_circle_3d(
    center: &na::Point3<f64>,
    normal: &na::Unit<na::Vector3<f64>>,
    radius: f64,
    num_points: usize,
) -> Vec<na::Point3<f64>> {
    let frame = plane_frame(normal);

    (0..num_points)
        .map(|i| {
            let (sin_t, cos_t) = (i as f64 * std::f64::consts::TAU / num_points as f64).sin_cos();
            *center + frame * na::Vector3::new(radius * cos_t, radius * sin_t, 0.0)
        })
        .collect()
}

/// Image of a limbus-sized circle as seen by the camera. Rim points behind the camera are
/// skipped.
pub fn project_circle_3d(
    intrinsics: &CameraIntrinsics,
    center: &na::Point3<f64>,
    normal: &na::Unit<na::Vector3<f64>>,
    radius: f64,
    num_points: usize,
) -> Vec<na::Point2<f64>> {
    sample_circle_3d(center, normal, radius, num_points)
        .iter()
        .filter_map(|p| intrinsics.project(p))
        .collect()
}
