use nalgebra as na;
use std::fmt::{self, Display, Formatter};

use super::planar::Ellipse;
use crate::pose::PoseError;

/// The limbus of one eye, recovered from a single frame.
///
/// A circle in 3D: center in millimetres in the camera frame (see [`crate::camera`]), unit
/// normal pointing out of the eye, and the image ellipse it was recovered from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limbus {
    /// Center position in camera coordinates (mm)
    pub center_mm: na::Point3<f64>,
    /// Optical axis, normal to the limbus plane
    pub normal: na::Unit<na::Vector3<f64>>,
    /// Ellipse in full-frame image coordinates
    pub ellipse: Ellipse,
}

impl Limbus {
    pub fn new(
        center_mm: na::Point3<f64>,
        normal: na::Unit<na::Vector3<f64>>,
        ellipse: Ellipse,
    ) -> Self {
        Self {
            center_mm,
            normal,
            ellipse,
        }
    }

    /// Intersection of the gaze ray with the screen plane `z = 0`.
    pub fn gaze_point_mm(&self) -> Result<na::Point2<f64>, PoseError> {
        let dir = self.normal.into_inner();
        if dir.z == 0.0 {
            return Err(PoseError::DegenerateGazeRay);
        }

        let t = -self.center_mm.z / dir.z;
        Ok(na::Point2::new(
            self.center_mm.x + dir.x * t,
            self.center_mm.y + dir.y * t,
        ))
    }

    /// Euclidean distance between the centers of two limbuses.
    pub fn center_distance(&self, other: &Limbus) -> f64 {
        na::distance(&self.center_mm, &other.center_mm)
    }

    /// Get the local-to-world transformation matrix
    ///
    /// The local frame has its origin at the limbus center and its `z` axis along the normal.
    pub fn local_to_world(&self) -> na::Matrix4<f64> {
        let mut transform = na::Matrix4::identity();
        transform
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(plane_frame(&self.normal).matrix());
        transform
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&self.center_mm.coords);

        transform
    }

    /// Points on the limbus rim for a limbus of the given radius.
    pub fn rim_points(&self, radius_mm: f64, num_points: usize) -> Vec<na::Point3<f64>> {
        let transform = self.local_to_world();

        (0..num_points)
            .map(|i| {
                let (sin_t, cos_t) = (i as f64 * std::f64::consts::TAU / num_points as f64).sin_cos();
                transform.transform_point(&na::Point3::new(
                    radius_mm * cos_t,
                    radius_mm * sin_t,
                    0.0,
                ))
            })
            .collect()
    }
}

impl Display for Limbus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "center ({:.1}, {:.1}, {:.1}) mm, normal ({:.3}, {:.3}, {:.3})",
            self.center_mm.x,
            self.center_mm.y,
            self.center_mm.z,
            self.normal.x,
            self.normal.y,
            self.normal.z
        )
    }
}

/// Right-handed orthonormal frame whose third column is `normal`.
pub fn plane_frame(normal: &na::Unit<na::Vector3<f64>>) -> na::Rotation3<f64> {
    let z = normal.into_inner();

    // Seed with the axis along the smallest component of the normal
    let seed = if z.x.abs() <= z.y.abs() && z.x.abs() <= z.z.abs() {
        na::Vector3::x()
    } else if z.y.abs() <= z.z.abs() {
        na::Vector3::y()
    } else {
        na::Vector3::z()
    };

    let y = z.cross(&seed).normalize();
    let x = y.cross(&z);

    na::Rotation3::from_matrix_unchecked(na::Matrix3::from_columns(&[x, y, z]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn limbus(center: na::Point3<f64>, normal: na::Vector3<f64>) -> Limbus {
        let ellipse =
            Ellipse::from_rotated_rect(na::Point2::new(320.0, 240.0), 18.0, 20.0, 0.0).unwrap();
        Limbus::new(center, na::Unit::new_normalize(normal), ellipse)
    }

    #[test]
    fn test_gaze_point_along_axis() -> anyhow::Result<()> {
        let l = limbus(na::Point3::new(10.0, 20.0, 50.0), na::Vector3::new(0.0, 0.0, -1.0));
        let gaze = l.gaze_point_mm()?;
        assert_eq!(gaze, na::Point2::new(10.0, 20.0));
        Ok(())
    }

    #[test]
    fn test_gaze_point_tilted() -> anyhow::Result<()> {
        // 45° tilt moves the intersection by the depth
        let l = limbus(na::Point3::new(0.0, 0.0, 100.0), na::Vector3::new(1.0, 0.0, -1.0));
        let gaze = l.gaze_point_mm()?;
        assert_relative_eq!(gaze.x, 100.0, epsilon = 1e-9);
        assert_relative_eq!(gaze.y, 0.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn test_gaze_ray_parallel_to_screen() {
        let l = limbus(na::Point3::new(0.0, 0.0, 100.0), na::Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(l.gaze_point_mm(), Err(PoseError::DegenerateGazeRay));
    }

    #[test]
    fn test_plane_frame_is_orthonormal() {
        for normal in [
            na::Vector3::new(0.0, 0.0, -1.0),
            na::Vector3::new(1.0, 0.0, 0.0),
            na::Vector3::new(0.3, -0.2, -0.9),
            na::Vector3::new(1.0, 1.0, 1.0),
        ] {
            let normal = na::Unit::new_normalize(normal);
            let m = plane_frame(&normal).into_inner();

            assert_relative_eq!(m.transpose() * m, na::Matrix3::identity(), epsilon = 1e-12);
            assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(m.column(2).into_owned(), normal.into_inner(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rim_points() {
        let l = limbus(na::Point3::new(-4.0, 2.0, 250.0), na::Vector3::new(0.1, 0.2, -1.0));
        let rim = l.rim_points(5.6, 12);

        assert_eq!(rim.len(), 12);
        for p in rim {
            assert_relative_eq!(na::distance(&p, &l.center_mm), 5.6, epsilon = 1e-10);
            assert_relative_eq!(l.normal.dot(&(p - l.center_mm)), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_center_distance() {
        let a = limbus(na::Point3::new(-30.0, 0.0, 300.0), na::Vector3::new(0.0, 0.0, -1.0));
        let b = limbus(na::Point3::new(30.0, 0.0, 300.0), na::Vector3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(a.center_distance(&b), 60.0);
    }
}
