pub mod camera;
mod error;
pub mod geom;
pub mod math;
pub mod pose;
pub mod ransac;
pub mod stabilizer;
pub mod tracker;
pub mod utils;

pub use camera::{CameraIntrinsics, Device, ScreenGeometry};
pub use error::{Error, Result};
pub use geom::ellipse::{fit_ellipse, Ellipse, FitError, Limbus, RotatedRect};
pub use math::ShapeError;
pub use pose::{GazePoseRecovery, PoseConfig, PoseError};
pub use ransac::{
    EllipseEstimate, EstimateError, GradientField, GradientFieldError, RansacConfig,
    RansacEllipseEstimator,
};
pub use stabilizer::{GazeStabilizer, HistoryWeighting, StabilizerConfig};
pub use tracker::{EyeError, EyeObservation, EyeTrack, FrameGaze, GazeTracker, TrackerConfig};
