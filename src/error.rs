use crate::geom::ellipse::FitError;
use crate::math::conic::ShapeError;
use crate::pose::PoseError;
use crate::ransac::{EstimateError, GradientFieldError};
use crate::tracker::EyeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    GradientField(#[from] GradientFieldError),

    #[error(transparent)]
    Estimate(#[from] EstimateError),

    #[error(transparent)]
    Pose(#[from] PoseError),

    #[error(transparent)]
    Eye(#[from] EyeError),
}

pub type Result<T> = std::result::Result<T, Error>;
