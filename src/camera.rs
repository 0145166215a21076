//! Camera intrinsics and screen geometry of the tracking device.
//!
//! Limbus geometry is expressed in millimetres in a camera-centred frame: `z` points from the
//! camera towards the user, `y` grows downwards like image rows and `x` is mirrored with
//! respect to image columns. The screen lies in the `z = 0` plane.

use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics of the front camera, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in x direction (pixels)
    pub fx: f64,
    /// Focal length in y direction (pixels)
    pub fy: f64,
    /// Principal point x coordinate (pixels)
    pub cx: f64,
    /// Principal point y coordinate (pixels)
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Focal length used along the optical axis, the mean of `fx` and `fy`.
    pub fn focal_z(&self) -> f64 {
        (self.fx + self.fy) / 2.0
    }

    pub fn principal_point(&self) -> na::Point2<f64> {
        na::Point2::new(self.cx, self.cy)
    }

    /// Camera-frame point (mm) seen at `pixel` at the given depth.
    pub fn back_project(&self, pixel: &na::Point2<f64>, depth_mm: f64) -> na::Point3<f64> {
        na::Point3::new(
            -depth_mm * (pixel.x - self.cx) / self.fx,
            depth_mm * (pixel.y - self.cy) / self.fy,
            depth_mm,
        )
    }

    /// Image position of a camera-frame point, `None` when it lies behind the camera.
    pub fn project(&self, point: &na::Point3<f64>) -> Option<na::Point2<f64>> {
        if point.z <= 0.0 {
            return None;
        }
        Some(na::Point2::new(
            self.cx - self.fx * point.x / point.z,
            self.cy + self.fy * point.y / point.z,
        ))
    }
}

/// Physical and pixel extent of the screen and where it sits relative to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width_mm: f64,
    pub height_mm: f64,
    pub width_px: f64,
    pub height_px: f64,
    /// Added to a camera-frame gaze point to obtain its position relative to the screen's
    /// top-left corner.
    pub offset_mm: [f64; 2],
    /// Rows hidden by the system status bar at the top of the screen.
    pub status_bar_px: f64,
}

impl ScreenGeometry {
    /// Maps a gaze point on the screen plane (mm) to device pixels.
    pub fn to_px(&self, point_mm: &na::Point2<f64>) -> na::Point2<f64> {
        na::Point2::new(
            (point_mm.x + self.offset_mm[0]) / self.width_mm * self.width_px,
            (point_mm.y + self.offset_mm[1]) / self.height_mm * self.height_px - self.status_bar_px,
        )
    }
}

/// Read-only description of the tracking device, constant for a session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub intrinsics: CameraIntrinsics,
    pub screen: ScreenGeometry,
}

const NEXUS7_INTRINSICS: CameraIntrinsics = CameraIntrinsics {
    fx: 1062.348,
    fy: 1065.308,
    cx: 344.629,
    cy: 626.738,
};

const NEXUS7_SCREEN: ScreenGeometry = ScreenGeometry {
    width_mm: 94.0,
    height_mm: 151.0,
    width_px: 800.0,
    height_px: 1280.0,
    offset_mm: [47.0, -16.0],
    status_bar_px: 32.0,
};

impl Device {
    /// Nexus 7 tablet in portrait orientation, camera above the screen.
    pub fn nexus7() -> Self {
        Self {
            intrinsics: NEXUS7_INTRINSICS,
            screen: NEXUS7_SCREEN,
        }
    }

    /// Nexus 7 held upside down, camera below the screen.
    pub fn nexus7_inverted() -> Self {
        Self {
            intrinsics: NEXUS7_INTRINSICS,
            screen: ScreenGeometry {
                offset_mm: [47.0, NEXUS7_SCREEN.height_mm + 16.0],
                ..NEXUS7_SCREEN
            },
        }
    }

    /// Generic webcam. Not calibrated: borrows the Nexus 7 intrinsics and screen size.
    pub fn webcam() -> Self {
        Self {
            intrinsics: NEXUS7_INTRINSICS,
            screen: ScreenGeometry {
                offset_mm: [0.0, 0.0],
                status_bar_px: 0.0,
                ..NEXUS7_SCREEN
            },
        }
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::nexus7()
    }
}
