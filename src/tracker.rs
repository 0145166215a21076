//! Per-frame pipeline for a pair of eyes.

use nalgebra as na;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::camera::Device;
use crate::geom::ellipse::{Ellipse, Limbus};
use crate::pose::{GazePoseRecovery, PoseConfig, PoseError};
use crate::ransac::{
    EllipseEstimate, EstimateError, GradientField, RansacConfig, RansacEllipseEstimator,
};
use crate::stabilizer::{GazeStabilizer, StabilizerConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub ransac: RansacConfig,
    pub pose: PoseConfig,
    pub stabilizer: StabilizerConfig,
}

/// Why an eye has no result in a frame. Never affects the other eye.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EyeError {
    #[error("Eye not observed")]
    NoObservation,

    #[error(transparent)]
    Estimate(#[from] EstimateError),

    #[error(transparent)]
    Pose(#[from] PoseError),

    #[error("Limbus rejected as an outlier")]
    Rejected,
}

/// Limbus edge candidates of one eye region.
#[derive(Debug, Clone)]
pub struct EyeObservation {
    /// Edge points in eye-region pixel coordinates.
    pub points: Vec<na::Point2<f64>>,
    /// Intensity gradients of the eye region.
    pub gradients: GradientField,
    /// Top-left corner of the eye region in the full frame.
    pub roi_origin: na::Vector2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EyeTrack {
    /// RANSAC result in eye-region coordinates.
    pub estimate: EllipseEstimate,
    /// Limbus ellipse in full-frame coordinates.
    pub ellipse: Ellipse,
    pub limbus: Limbus,
    /// Distance between the reprojected limbus rim and `ellipse`, roughly in pixels.
    pub reprojection_px: f64,
    pub gaze_mm: na::Point2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameGaze {
    pub eyes: [Result<EyeTrack, EyeError>; 2],
    /// Smoothed gaze on the screen plane.
    pub gaze_mm: na::Point2<f64>,
    pub gaze_px: na::Point2<f64>,
}

/// Runs the estimator and pose recovery for both eyes, then the stabilizer once both are done.
#[derive(Debug, Clone)]
pub struct GazeTracker {
    estimator: RansacEllipseEstimator,
    pose: GazePoseRecovery,
    stabilizer: GazeStabilizer,
}

impl GazeTracker {
    pub fn new(config: TrackerConfig, device: Device) -> Self {
        Self {
            estimator: RansacEllipseEstimator::new(config.ransac),
            pose: GazePoseRecovery::new(device, config.pose),
            stabilizer: GazeStabilizer::new(config.stabilizer, device.screen),
        }
    }

    pub fn stabilizer(&self) -> &GazeStabilizer {
        &self.stabilizer
    }

    /// Processes one frame. A missing observation or a failure for one eye leaves that eye
    /// without a result and the other eye untouched.
    pub fn process_frame(&mut self, observations: [Option<&EyeObservation>; 2]) -> FrameGaze {
        let tracked = observations.map(|observation| self.track_eye(observation));

        // Join: outlier rejection needs both eyes
        let limbuses = tracked.each_ref().map(|t| t.as_ref().ok().map(|t| t.limbus));
        let kept = self.stabilizer.reject_outliers(limbuses);

        let mut eyes = tracked;
        for (eye, (result, kept)) in eyes.iter_mut().zip(kept).enumerate() {
            if result.is_ok() && kept.is_none() {
                *result = Err(EyeError::Rejected);
            }
            if let Err(error) = result {
                warn!(eye, %error, "No gaze for eye");
            }
        }

        let gaze_points = eyes.each_ref().map(|e| e.as_ref().ok().map(|t| t.gaze_mm));
        let gaze_mm = self.stabilizer.smooth(gaze_points);

        FrameGaze {
            eyes,
            gaze_mm,
            gaze_px: self.pose.to_screen_px(&gaze_mm),
        }
    }

    fn track_eye(&self, observation: Option<&EyeObservation>) -> Result<EyeTrack, EyeError> {
        let observation = observation.ok_or(EyeError::NoObservation)?;

        let estimate = self
            .estimator
            .estimate(&observation.points, &observation.gradients)?;
        let ellipse = estimate.ellipse.translated(&observation.roi_origin);
        let limbus = self.pose.recover_pose(&ellipse)?;
        let reprojection_px = self.pose.reprojection_error_px(&limbus)?;
        let gaze_mm = limbus.gaze_point_mm()?;

        Ok(EyeTrack {
            estimate,
            ellipse,
            limbus,
            reprojection_px,
            gaze_mm,
        })
    }
}
