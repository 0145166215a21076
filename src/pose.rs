//! Limbus pose from a single image ellipse.
//!
//! The limbus is a circle of known radius. Its image ellipse together with the camera center
//! spans an oblique elliptic cone, and the circle's supporting plane is one of the two
//! circular sections of that cone (Safaee-Rad et al., 1992). The cone is diagonalised, the two
//! plane normals (each up to sign) are enumerated and a prior on where the eye sits picks one.

use nalgebra as na;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::{CameraIntrinsics, Device};
use crate::geom::ellipse::fit::rms_normalized_distance;
use crate::geom::ellipse::{Ellipse, Limbus};
use crate::math::conic::ShapeError;
use crate::math::eigen;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("Gaze ray is parallel to the screen plane")]
    DegenerateGazeRay,
}

const REPROJECTION_RIM_POINTS: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Anatomical limbus radius.
    pub limbus_radius_mm: f64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            limbus_radius_mm: 5.6,
        }
    }
}

/// The four plane normals `R·(±h, 0, ±g)` of the limbus cone.
///
/// Expressed in the camera's image-aligned frame, where `x` grows with pixel columns. Entry `i`
/// uses `-h` when bit 0 of `i` is set and `-g` when bit 1 is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalCandidates([na::Vector3<f64>; 4]);

impl NormalCandidates {
    pub fn new(candidates: [na::Vector3<f64>; 4]) -> Self {
        Self(candidates)
    }

    pub fn index(negative_h: bool, negative_g: bool) -> usize {
        usize::from(negative_h) | (usize::from(negative_g) << 1)
    }

    pub fn get(&self, negative_h: bool, negative_g: bool) -> na::Vector3<f64> {
        self.0[Self::index(negative_h, negative_g)]
    }

    pub fn as_array(&self) -> &[na::Vector3<f64>; 4] {
        &self.0
    }
}

/// What is known about the eye before picking a normal: which side of the camera axis it is on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalPrior {
    /// Limbus center `x` in the limbus frame (mm).
    pub x_mm: f64,
}

/// Picks one of the candidate normals and fixes its signs.
///
/// Assumes the eye faces the camera (`nz < 0`), the screen lies on the negative `y` side of the
/// camera (`ny·nz >= 0`) and, in the image-aligned frame, the normal leans the same way along
/// `x` as the mirrored limbus position. A candidate satisfying all of these is taken as is;
/// otherwise the closest one is forced into agreement. The result is returned in the limbus
/// frame, with `x` mirrored.
pub fn resolve_normal_sign(
    candidates: &NormalCandidates,
    prior: &NormalPrior,
) -> na::Unit<na::Vector3<f64>> {
    let facing = candidates.0.map(|n| if n.z > 0.0 { -n } else { n });

    let x_agrees = |n: &na::Vector3<f64>| prior.x_mm == 0.0 || n.x * prior.x_mm > 0.0;
    let y_agrees = |n: &na::Vector3<f64>| n.y * n.z >= 0.0;

    let fallback = NormalCandidates::index(false, prior.x_mm <= 0.0);
    let mut normal = facing
        .iter()
        .find(|n| x_agrees(n) && y_agrees(n))
        .or_else(|| facing.iter().find(|n| x_agrees(n)))
        .copied()
        .unwrap_or(facing[fallback]);

    if !y_agrees(&normal) {
        normal.y = -normal.y;
    }
    if !x_agrees(&normal) {
        normal.x = -normal.x;
    }

    na::Unit::new_normalize(na::Vector3::new(-normal.x, normal.y, normal.z))
}

/// Symmetric matrix of the cone through the camera center and the ellipse, with image
/// coordinates relative to the principal point and scaled by the focal length.
pub fn limbus_cone(ellipse: &Ellipse, intrinsics: &CameraIntrinsics) -> na::Matrix3<f64> {
    let centered = ellipse.translated(&-intrinsics.principal_point().coords);
    let [a, b, c, d, e, f] = *centered.coeffs();
    let focal = intrinsics.focal_z();

    na::Matrix3::new(
        a,
        b / 2.0,
        d / (2.0 * focal),
        b / 2.0,
        c,
        e / (2.0 * focal),
        d / (2.0 * focal),
        e / (2.0 * focal),
        f / (focal * focal),
    )
}

/// Enumerates the limbus plane normals for `ellipse`.
pub fn normal_candidates(
    ellipse: &Ellipse,
    intrinsics: &CameraIntrinsics,
) -> Result<NormalCandidates, PoseError> {
    let cone = limbus_cone(ellipse, intrinsics);
    let (values, rotation) = eigen::sorted_symmetric_eigen(&cone);
    let (l1, l2, l3) = (values[0], values[1], values[2]);

    let spread = l1 - l3;
    if !(spread > f64::EPSILON * l1.abs().max(l3.abs())) {
        return Err(ShapeError::DegenerateCone(spread).into());
    }

    let g = ((l2 - l3) / spread).max(0.0).sqrt();
    let h = ((l1 - l2) / spread).max(0.0).sqrt();

    let candidates = [0, 1, 2, 3].map(|i| {
        let sh = if i & 1 == 0 { h } else { -h };
        let sg = if i & 2 == 0 { g } else { -g };
        rotation * na::Vector3::new(sh, 0.0, sg)
    });
    Ok(NormalCandidates::new(candidates))
}

/// Recovers 3D limbuses from image ellipses for one device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazePoseRecovery {
    device: Device,
    config: PoseConfig,
}

impl GazePoseRecovery {
    pub fn new(device: Device, config: PoseConfig) -> Self {
        Self { device, config }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &PoseConfig {
        &self.config
    }

    /// Limbus center from the ellipse center, at the depth where a limbus of the configured
    /// radius spans the ellipse's major axis.
    pub fn limbus_center_mm(&self, ellipse: &Ellipse) -> na::Point3<f64> {
        let intrinsics = &self.device.intrinsics;
        let depth =
            2.0 * self.config.limbus_radius_mm * intrinsics.focal_z() / ellipse.major_axis();
        intrinsics.back_project(&ellipse.center(), depth)
    }

    /// Full perspective recovery. `ellipse` must be in full-frame pixel coordinates.
    pub fn recover_pose(&self, ellipse: &Ellipse) -> Result<Limbus, PoseError> {
        let center_mm = self.limbus_center_mm(ellipse);
        let candidates = normal_candidates(ellipse, &self.device.intrinsics)?;
        let normal = resolve_normal_sign(&candidates, &NormalPrior { x_mm: center_mm.x });

        Ok(Limbus::new(center_mm, normal, *ellipse))
    }

    /// Weak-perspective approximation: the tilt follows from the axis ratio and the ellipse
    /// rotation, then it is corrected by the angle between the camera axis and the limbus.
    pub fn recover_pose_weak_perspective(&self, ellipse: &Ellipse) -> Limbus {
        let center_mm = self.limbus_center_mm(ellipse);

        let psi = ellipse.angle_deg().to_radians();
        let theta = (ellipse.minor_axis() / ellipse.major_axis()).clamp(0.0, 1.0).acos();
        let tilted = na::Vector3::new(
            theta.sin() * psi.cos(),
            -theta.sin() * psi.sin(),
            -theta.cos(),
        );

        let yaw = (center_mm.x / center_mm.z).atan();
        let pitch = -(center_mm.y / center_mm.z).atan();
        let correction = na::Rotation3::from_axis_angle(&na::Vector3::x_axis(), pitch)
            * na::Rotation3::from_axis_angle(&na::Vector3::y_axis(), yaw);

        Limbus::new(center_mm, na::Unit::new_normalize(correction * tilted), *ellipse)
    }

    pub fn gaze_point_mm(&self, limbus: &Limbus) -> Result<na::Point2<f64>, PoseError> {
        limbus.gaze_point_mm()
    }

    pub fn to_screen_px(&self, point_mm: &na::Point2<f64>) -> na::Point2<f64> {
        self.device.screen.to_px(point_mm)
    }

    /// How far, roughly in pixels, the reprojected rim of `limbus` lies from the ellipse it was
    /// recovered from.
    pub fn reprojection_error_px(&self, limbus: &Limbus) -> Result<f64, PoseError> {
        let rim: Vec<_> = limbus
            .rim_points(self.config.limbus_radius_mm, REPROJECTION_RIM_POINTS)
            .iter()
            .filter_map(|p| self.device.intrinsics.project(p))
            .collect();

        Ok(rms_normalized_distance(&limbus.ellipse, &rim) * limbus.ellipse.residual_scale()?)
    }
}
