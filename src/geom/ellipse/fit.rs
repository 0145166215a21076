//! Direct least-squares ellipse fitting (Fitzgibbon, Pilu & Fisher, 1999), solved in the
//! numerically stable reduced form of Halíř & Flusser (1998).

use nalgebra as na;
use thiserror::Error;

use super::planar::Ellipse;
use crate::math::conic::ShapeError;
use crate::math::eigen;

/// Minimum number of points that determine a conic.
pub const MIN_FIT_POINTS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("At least {MIN_FIT_POINTS} points are needed, got {0}")]
    TooFewPoints(usize),

    #[error("Scatter matrix is singular")]
    SingularScatter,

    #[error("No eigenvector satisfies the ellipse constraint")]
    NoEllipticSolution,

    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Fits an ellipse through `points` by minimizing the algebraic error subject to
/// `4AC - B² = 1`.
///
/// Only the algebra is solved here. Plausibility checks (axis ratio, position) are up to the
/// caller.
pub fn fit_ellipse(points: &[na::Point2<f64>]) -> Result<Ellipse, FitError> {
    let coeffs = fit_conic(points)?;
    Ok(Ellipse::from_coeffs(coeffs)?)
}

/// Raw conic coefficients `[A, B, C, D, E, F]` of the least-squares ellipse.
pub fn fit_conic(points: &[na::Point2<f64>]) -> Result<[f64; 6], FitError> {
    let n = points.len();
    if n < MIN_FIT_POINTS {
        return Err(FitError::TooFewPoints(n));
    }

    let normalization = Normalization::of(points);

    // Quadratic and linear parts of the design matrix, D = [D1 | D2]
    let mut d1 = na::DMatrix::<f64>::zeros(n, 3);
    let mut d2 = na::DMatrix::<f64>::zeros(n, 3);
    for (i, p) in points.iter().enumerate() {
        let (x, y) = normalization.apply(p);
        d1.row_mut(i).copy_from_slice(&[x * x, x * y, y * y]);
        d2.row_mut(i).copy_from_slice(&[x, y, 1.0]);
    }

    // Blocks of the scatter matrix S = DᵀD
    let s1: na::Matrix3<f64> = (d1.transpose() * &d1).fixed_view::<3, 3>(0, 0).into_owned();
    let s2: na::Matrix3<f64> = (d1.transpose() * &d2).fixed_view::<3, 3>(0, 0).into_owned();
    let s3: na::Matrix3<f64> = (d2.transpose() * &d2).fixed_view::<3, 3>(0, 0).into_owned();

    // Collinear points leave the linear block rank deficient
    if s3.determinant().abs() <= 1e-12 * s3.norm().powi(3) {
        return Err(FitError::SingularScatter);
    }
    let s3_inv = s3.try_inverse().ok_or(FitError::SingularScatter)?;
    let t = -s3_inv * s2.transpose();
    let m = s1 + s2 * t;

    // Premultiplying by the inverse of the constraint matrix [[0, 0, 2], [0, -1, 0], [2, 0, 0]]
    let system = na::Matrix3::from_rows(&[
        (m.row(2) / 2.0).into_owned(),
        (-m.row(1)).into_owned(),
        (m.row(0) / 2.0).into_owned(),
    ]);

    // Of the eigenvectors satisfying the ellipse constraint, the one with the eigenvalue of
    // smallest magnitude has the least algebraic error. In terms of S⁻¹C this is the eigenvalue
    // of largest magnitude.
    let quadratic = eigen::real_eigenvalues(&system)
        .into_iter()
        .filter_map(|lambda| {
            let shifted = system - na::Matrix3::identity() * lambda;
            let v = eigen::null_vector(&shifted)?;
            (4.0 * v[0] * v[2] - v[1] * v[1] > 0.0).then_some((lambda.abs(), v))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, v)| v)
        .ok_or(FitError::NoEllipticSolution)?;
    let linear = t * quadratic;

    let normalized = [
        quadratic[0],
        quadratic[1],
        quadratic[2],
        linear[0],
        linear[1],
        linear[2],
    ];
    Ok(normalization.denormalize(&normalized))
}

/// Similarity transform moving the centroid to the origin with mean distance √2.
struct Normalization {
    mean_x: f64,
    mean_y: f64,
    scale: f64,
}

impl Normalization {
    fn of(points: &[na::Point2<f64>]) -> Self {
        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
        let mean_dist = points
            .iter()
            .map(|p| (p.x - mean_x).hypot(p.y - mean_y))
            .sum::<f64>()
            / n;

        let scale = if mean_dist > 1e-12 {
            std::f64::consts::SQRT_2 / mean_dist
        } else {
            1.0
        };

        Self {
            mean_x,
            mean_y,
            scale,
        }
    }

    fn apply(&self, p: &na::Point2<f64>) -> (f64, f64) {
        ((p.x - self.mean_x) * self.scale, (p.y - self.mean_y) * self.scale)
    }

    /// Substitutes x' = s(x - mx), y' = s(y - my) back into the normalized conic.
    fn denormalize(&self, c: &[f64; 6]) -> [f64; 6] {
        let Self {
            mean_x: mx,
            mean_y: my,
            scale: s,
        } = *self;
        let [a, b, c_, d, e, f] = *c;
        let s2 = s * s;

        [
            a * s2,
            b * s2,
            c_ * s2,
            -2.0 * a * s2 * mx - b * s2 * my + d * s,
            -b * s2 * mx - 2.0 * c_ * s2 * my + e * s,
            a * s2 * mx * mx + b * s2 * mx * my + c_ * s2 * my * my - d * s * mx - e * s * my + f,
        ]
    }
}

/// Root-mean-square normalized distance of `points` to `ellipse`, skipping points where the
/// conic gradient vanishes.
pub fn rms_normalized_distance(ellipse: &Ellipse, points: &[na::Point2<f64>]) -> f64 {
    let residuals: Vec<f64> = points
        .iter()
        .filter_map(|p| ellipse.normalized_distance(p).ok())
        .collect();
    if residuals.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = residuals.iter().map(|r| r * r).sum();
    (sum_sq / residuals.len() as f64).sqrt()
}
