//! Robust limbus ellipse estimation.
//!
//! A sample-consensus search over candidate edge points in which every minimal sample is drawn
//! from both sides of the eye region, checked against the image gradients, refined on its
//! inliers and scored by how well the curve agrees with the intensity edges.

pub mod coverage;
pub mod gradient;

use nalgebra as na;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::geom::ellipse::fit::{fit_ellipse, FitError, MIN_FIT_POINTS};
use crate::geom::ellipse::Ellipse;
use crate::math::conic::ShapeError;
pub use coverage::angular_coverage;
pub use gradient::{GradientField, GradientFieldError};

/// Points drawn from each side of the region for one minimal sample.
const SAMPLE_PER_SIDE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    /// Number of minimal samples drawn.
    pub max_iterations: usize,
    /// Refit-on-inliers rounds per accepted sample.
    pub refine_iterations: usize,
    /// Inlier threshold on the scaled residual, roughly in pixels.
    pub max_residual: f64,
    /// Largest accepted major/minor axis ratio.
    pub max_axis_ratio: f64,
    /// Smallest accepted angular coverage of the inliers, in percent.
    pub min_coverage_pct: f64,
    pub coverage_bin_deg: f64,
    /// Inlier fraction above which the search stops early.
    pub early_exit_inlier_fraction: f64,
    pub min_inliers: usize,
    /// Points needed on each side of the region before sampling starts.
    pub min_points_per_side: usize,
    /// Seed for reproducible runs, `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            refine_iterations: 3,
            max_residual: 2.0,
            max_axis_ratio: 3.0,
            min_coverage_pct: 25.0,
            coverage_bin_deg: 5.0,
            early_exit_inlier_fraction: 0.95,
            min_inliers: 5,
            min_points_per_side: 5,
            seed: None,
        }
    }
}

/// Reasons a single sample is abandoned. Never surfaced to callers of
/// [`RansacEllipseEstimator::estimate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleRejection {
    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("Axis ratio {0:.2} too large")]
    AxisRatio(f64),

    #[error("Center ({0:.1}, {1:.1}) out of bounds")]
    CenterOutOfBounds(f64, f64),

    #[error("Image and ellipse gradients disagree at ({0:.1}, {1:.1})")]
    GradientDisagreement(f64, f64),

    #[error("No image gradient at ({0:.1}, {1:.1})")]
    MissingGradient(f64, f64),

    #[error("Only {0} inliers")]
    NotEnoughInliers(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimateError {
    #[error("No points to fit")]
    EmptyPointSet,

    #[error("No ellipse found")]
    NoEllipseFound,

    #[error("Inlier coverage {actual:.1}% is below the minimum of {min:.1}%")]
    CoverageTooLow { actual: f64, min: f64 },
}

/// Best-supported ellipse of a RANSAC run.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipseEstimate {
    pub ellipse: Ellipse,
    /// Input points within `max_residual` of `ellipse`.
    pub inliers: Vec<na::Point2<f64>>,
    /// Summed agreement between image gradients and ellipse normals over the inliers.
    pub support: f64,
    pub coverage_pct: f64,
    pub inlier_fraction: f64,
    /// Samples drawn before the search ended.
    pub iterations: usize,
}

/// A refined candidate with its consensus set.
struct Candidate {
    ellipse: Ellipse,
    inliers: Vec<na::Point2<f64>>,
    support: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RansacEllipseEstimator {
    config: RansacConfig,
}

impl RansacEllipseEstimator {
    pub fn new(config: RansacConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }

    /// Fits the limbus ellipse to `points`, given in the pixel frame of `gradients`.
    ///
    /// The gradient field also defines the region bounds: samples are split at half its width
    /// and candidate centers must lie strictly inside it.
    pub fn estimate(
        &self,
        points: &[na::Point2<f64>],
        gradients: &GradientField,
    ) -> Result<EllipseEstimate, EstimateError> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.estimate_with_rng(points, gradients, &mut rng)
    }

    pub fn estimate_with_rng<R: Rng + ?Sized>(
        &self,
        points: &[na::Point2<f64>],
        gradients: &GradientField,
        rng: &mut R,
    ) -> Result<EllipseEstimate, EstimateError> {
        if points.is_empty() {
            return Err(EstimateError::EmptyPointSet);
        }

        let mid_x = gradients.width() as f64 / 2.0;
        let left: Vec<_> = points.iter().copied().filter(|p| p.x < mid_x).collect();
        let right: Vec<_> = points.iter().copied().filter(|p| p.x > mid_x).collect();

        let min_per_side = self.config.min_points_per_side.max(SAMPLE_PER_SIDE);
        if left.len() < min_per_side || right.len() < min_per_side {
            debug!(
                left = left.len(),
                right = right.len(),
                "Not enough points on both sides to sample"
            );
            return Err(EstimateError::NoEllipseFound);
        }

        let mut best: Option<Candidate> = None;
        let mut iterations = 0;

        for iteration in 0..self.config.max_iterations {
            iterations = iteration + 1;

            let sample: Vec<_> = rand::seq::index::sample(rng, left.len(), SAMPLE_PER_SIDE)
                .iter()
                .map(|i| left[i])
                .chain(
                    rand::seq::index::sample(rng, right.len(), SAMPLE_PER_SIDE)
                        .iter()
                        .map(|i| right[i]),
                )
                .collect();

            let candidate = match self.evaluate_sample(&sample, points, gradients) {
                Ok(candidate) => candidate,
                Err(reason) => {
                    trace!(iteration, %reason, "Sample rejected");
                    continue;
                }
            };

            let inlier_fraction = candidate.inliers.len() as f64 / points.len() as f64;
            if best.as_ref().map_or(true, |b| candidate.support > b.support) {
                best = Some(candidate);
            }

            if inlier_fraction > self.config.early_exit_inlier_fraction {
                debug!(iteration, inlier_fraction, "Early termination");
                break;
            }
        }

        let Some(best) = best else {
            debug!(iterations, "No sample produced a valid ellipse");
            return Err(EstimateError::NoEllipseFound);
        };

        let coverage_pct = angular_coverage(
            &best.ellipse.center(),
            &best.inliers,
            self.config.coverage_bin_deg,
        );
        debug!(
            iterations,
            support = best.support,
            inliers = best.inliers.len(),
            coverage_pct,
            ellipse = %best.ellipse,
            "RANSAC finished"
        );

        if coverage_pct < self.config.min_coverage_pct {
            return Err(EstimateError::CoverageTooLow {
                actual: coverage_pct,
                min: self.config.min_coverage_pct,
            });
        }

        Ok(EllipseEstimate {
            inlier_fraction: best.inliers.len() as f64 / points.len() as f64,
            ellipse: best.ellipse,
            inliers: best.inliers,
            support: best.support,
            coverage_pct,
            iterations,
        })
    }

    fn evaluate_sample(
        &self,
        sample: &[na::Point2<f64>],
        points: &[na::Point2<f64>],
        gradients: &GradientField,
    ) -> Result<Candidate, SampleRejection> {
        let mut ellipse = self.fit_plausible(sample, gradients)?;

        // Every sample point must sit on an edge running the same way as the curve
        for p in sample {
            let image_grad = gradients
                .at(p)
                .ok_or(SampleRejection::MissingGradient(p.x, p.y))?;
            if image_grad.dot(&ellipse.gradient_dir(p)?.into_inner()) <= 0.0 {
                return Err(SampleRejection::GradientDisagreement(p.x, p.y));
            }
        }

        let mut inliers = self.inliers(&ellipse, points)?;
        for _ in 0..self.config.refine_iterations {
            ellipse = self.fit_plausible(&inliers, gradients)?;
            inliers = self.inliers(&ellipse, points)?;
        }

        let support = image_support(&ellipse, &inliers, gradients);
        Ok(Candidate {
            ellipse,
            inliers,
            support,
        })
    }

    /// Least-squares fit that also rejects elongated ellipses and ones centered outside the
    /// region.
    fn fit_plausible(
        &self,
        points: &[na::Point2<f64>],
        gradients: &GradientField,
    ) -> Result<Ellipse, SampleRejection> {
        let ellipse = fit_ellipse(points)?;

        let ratio = ellipse.axis_ratio();
        if ratio > self.config.max_axis_ratio {
            return Err(SampleRejection::AxisRatio(ratio));
        }

        let c = ellipse.center();
        let (w, h) = (gradients.width() as f64, gradients.height() as f64);
        if !(c.x > 0.0 && c.x < w && c.y > 0.0 && c.y < h) {
            return Err(SampleRejection::CenterOutOfBounds(c.x, c.y));
        }

        Ok(ellipse)
    }

    fn inliers(
        &self,
        ellipse: &Ellipse,
        points: &[na::Point2<f64>],
    ) -> Result<Vec<na::Point2<f64>>, SampleRejection> {
        let scale = ellipse.residual_scale()?;

        let inliers: Vec<_> = points
            .iter()
            .copied()
            .filter(|p| {
                ellipse
                    .normalized_distance(p)
                    .is_ok_and(|d| (scale * d).abs() < self.config.max_residual)
            })
            .collect();

        if inliers.len() < self.config.min_inliers.max(MIN_FIT_POINTS) {
            return Err(SampleRejection::NotEnoughInliers(inliers.len()));
        }
        Ok(inliers)
    }
}

/// Sum over `points` of the image gradient projected on the ellipse normal. Points without an
/// image gradient contribute nothing.
pub fn image_support(ellipse: &Ellipse, points: &[na::Point2<f64>], gradients: &GradientField) -> f64 {
    points
        .iter()
        .filter_map(|p| {
            let image_grad = gradients.at(p)?;
            let normal = ellipse.gradient_dir(p).ok()?.into_inner();
            Some(image_grad.dot(&normal))
        })
        .sum()
}
