//! Cross-frame filtering of the two eyes' gaze.

use std::collections::VecDeque;

use itertools::izip;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::ScreenGeometry;
use crate::geom::ellipse::Limbus;

/// Relative weight of each history slot, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryWeighting {
    /// `1, 2, ..., N`: recent points count more.
    Triangular,
    Uniform,
}

impl HistoryWeighting {
    /// Weights for a history of `len` points, normalized to sum to one.
    pub fn weights(&self, len: usize) -> Vec<f64> {
        let raw: Vec<f64> = match self {
            Self::Triangular => (1..=len).map(|w| w as f64).collect(),
            Self::Uniform => vec![1.0; len],
        };
        let total: f64 = raw.iter().sum();
        raw.into_iter().map(|w| w / total).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Gaze points kept per eye.
    pub history_len: usize,
    pub weighting: HistoryWeighting,
    /// Weighted distance to the history under which gaze counts as fixated.
    pub fixation_threshold_mm: f64,
    /// While fixated, points further than this from their history are dropped.
    pub jitter_threshold_mm: f64,
    /// Largest plausible distance between the two limbus centers.
    pub max_interpupillary_mm: f64,
    /// Accepted gaze `x` range, in screen widths either side of the camera.
    pub screen_x_margin: f64,
    /// Accepted gaze `y` range, in screen heights on the negative side of the camera.
    pub screen_y_margin: f64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            history_len: 8,
            weighting: HistoryWeighting::Triangular,
            fixation_threshold_mm: 20.0,
            jitter_threshold_mm: 40.0,
            max_interpupillary_mm: 80.0,
            screen_x_margin: 1.0,
            screen_y_margin: 1.5,
        }
    }
}

/// Per-session gaze filter for a pair of eyes. Index 0 and 1 refer to the same eye on every
/// call.
///
/// Holds the only state that outlives a frame: a history of gaze points per eye, seeded with
/// zeros, and the midpoint between the limbus centers the last time both were accepted,
/// starting at the origin.
#[derive(Debug, Clone)]
pub struct GazeStabilizer {
    config: StabilizerConfig,
    screen: ScreenGeometry,
    weights: Vec<f64>,
    histories: [VecDeque<na::Point2<f64>>; 2],
    last_midpoint: na::Point3<f64>,
}

impl GazeStabilizer {
    pub fn new(config: StabilizerConfig, screen: ScreenGeometry) -> Self {
        let len = config.history_len.max(1);
        let weights = config.weighting.weights(len);
        let history = VecDeque::from(vec![na::Point2::origin(); len]);

        Self {
            config,
            screen,
            weights,
            histories: [history.clone(), history],
            last_midpoint: na::Point3::origin(),
        }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn last_midpoint(&self) -> &na::Point3<f64> {
        &self.last_midpoint
    }

    pub fn history(&self, eye: usize) -> Option<&VecDeque<na::Point2<f64>>> {
        self.histories.get(eye)
    }

    /// Drops limbuses whose gaze leaves the region around the screen, then resolves an
    /// implausibly wide pair by keeping the eye nearer the last accepted midpoint.
    pub fn reject_outliers(&mut self, limbuses: [Option<Limbus>; 2]) -> [Option<Limbus>; 2] {
        let mut kept = limbuses.map(|limbus| limbus.filter(|l| self.gaze_in_range(l)));

        if let [Some(first), Some(second)] = kept {
            let separation = first.center_distance(&second);

            if separation > self.config.max_interpupillary_mm {
                let d0 = na::distance_squared(&self.last_midpoint, &first.center_mm);
                let d1 = na::distance_squared(&self.last_midpoint, &second.center_mm);
                let dropped = if d0 <= d1 { 1 } else { 0 };
                debug!(separation, dropped, "Limbus pair too far apart");
                kept[dropped] = None;
            } else {
                self.last_midpoint = na::center(&first.center_mm, &second.center_mm);
            }
        }

        kept
    }

    fn gaze_in_range(&self, limbus: &Limbus) -> bool {
        let Ok(gaze) = limbus.gaze_point_mm() else {
            return false;
        };
        let x_limit = self.screen.width_mm * self.config.screen_x_margin;
        let y_limit = self.screen.height_mm * self.config.screen_y_margin;

        let in_range = (-x_limit..=x_limit).contains(&gaze.x) && (-y_limit..=0.0).contains(&gaze.y);
        if !in_range {
            debug!(x = gaze.x, y = gaze.y, "Gaze point off screen");
        }
        in_range
    }

    /// Weighted mean distance between `point` and the history of `eye`.
    pub fn weighted_distance(&self, eye: usize, point: &na::Point2<f64>) -> f64 {
        izip!(&self.weights, &self.histories[eye])
            .map(|(w, past)| w * na::distance(past, point))
            .sum()
    }

    /// Folds this frame's gaze points into the histories and returns the smoothed gaze.
    ///
    /// If either eye is close to its recent history the gaze is treated as a fixation, and
    /// points that jump away from their history are ignored for this frame.
    pub fn smooth(&mut self, gaze_points: [Option<na::Point2<f64>>; 2]) -> na::Point2<f64> {
        let distances = [0, 1].map(|eye| gaze_points[eye].map(|p| self.weighted_distance(eye, &p)));

        let fixated = distances
            .iter()
            .flatten()
            .any(|&d| d < self.config.fixation_threshold_mm);

        for (eye, point) in gaze_points.into_iter().enumerate() {
            let Some(point) = point else {
                continue;
            };
            if fixated && distances[eye].is_some_and(|d| d > self.config.jitter_threshold_mm) {
                debug!(eye, "Dropping jitter during fixation");
                continue;
            }

            let history = &mut self.histories[eye];
            history.push_back(point);
            while history.len() > self.weights.len() {
                history.pop_front();
            }
        }

        let smoothed = self.histories.each_ref().map(|history| {
            izip!(&self.weights, history).fold(na::Vector2::zeros(), |acc, (w, p)| acc + p.coords * *w)
        });
        na::Point2::from((smoothed[0] + smoothed[1]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::ellipse::Ellipse;
    use crate::Device;
    use approx::assert_relative_eq;

    fn stabilizer() -> GazeStabilizer {
        GazeStabilizer::new(StabilizerConfig::default(), Device::nexus7().screen)
    }

    /// Limbus at `center` whose gaze lands on `target` in the screen plane.
    fn limbus_looking_at(center: na::Point3<f64>, target: na::Point2<f64>) -> Limbus {
        let ellipse =
            Ellipse::from_rotated_rect(na::Point2::new(300.0, 500.0), 18.0, 20.0, 0.0).unwrap();
        let normal = na::Unit::new_normalize(na::Point3::new(target.x, target.y, 0.0) - center);
        Limbus::new(center, normal, ellipse)
    }

    #[test]
    fn test_triangular_weights() {
        let weights = HistoryWeighting::Triangular.weights(4);
        assert_relative_eq!(weights.as_slice(), [0.1, 0.2, 0.3, 0.4].as_slice(), epsilon = 1e-12);
        assert_relative_eq!(weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);

        let uniform = HistoryWeighting::Uniform.weights(5);
        assert!(uniform.iter().all(|&w| (w - 0.2).abs() < 1e-12));
    }

    #[test]
    fn test_off_screen_gaze_rejected() {
        let mut s = stabilizer();
        let on_screen = limbus_looking_at(na::Point3::new(-30.0, -20.0, 300.0), na::Point2::new(0.0, -80.0));
        // Below the camera, outside [-1.5h, 0]
        let below = limbus_looking_at(na::Point3::new(30.0, -20.0, 300.0), na::Point2::new(0.0, 40.0));

        let kept = s.reject_outliers([Some(on_screen), Some(below)]);
        assert_eq!(kept, [Some(on_screen), None]);
        // The midpoint is only updated when both eyes survive
        assert_eq!(*s.last_midpoint(), na::Point3::origin());

        let sideways = limbus_looking_at(na::Point3::new(30.0, -20.0, 300.0), na::Point2::new(120.0, -80.0));
        assert_eq!(s.reject_outliers([None, Some(sideways)]), [None, None]);
    }

    #[test]
    fn test_parallel_gaze_rejected() {
        let mut s = stabilizer();
        let ellipse =
            Ellipse::from_rotated_rect(na::Point2::new(300.0, 500.0), 18.0, 20.0, 0.0).unwrap();
        let sideways = Limbus::new(
            na::Point3::new(0.0, 0.0, 300.0),
            na::Vector3::x_axis(),
            ellipse,
        );
        assert_eq!(s.reject_outliers([Some(sideways), None]), [None, None]);
    }

    #[test]
    fn test_wide_pair_keeps_eye_nearer_midpoint() {
        let mut s = stabilizer();
        let target = na::Point2::new(0.0, -70.0);

        // A plausible pair sets the midpoint
        let left = limbus_looking_at(na::Point3::new(-30.0, -10.0, 300.0), target);
        let right = limbus_looking_at(na::Point3::new(30.0, -10.0, 300.0), target);
        assert_eq!(s.reject_outliers([Some(left), Some(right)]), [Some(left), Some(right)]);
        assert_relative_eq!(*s.last_midpoint(), na::Point3::new(0.0, -10.0, 300.0));

        // 200 mm apart: only the eye closer to the midpoint survives
        let near = limbus_looking_at(na::Point3::new(-20.0, -10.0, 300.0), target);
        let far = limbus_looking_at(na::Point3::new(180.0, -10.0, 300.0), target);
        assert_eq!(s.reject_outliers([Some(far), Some(near)]), [None, Some(near)]);
        assert_eq!(s.reject_outliers([Some(near), Some(far)]), [Some(near), None]);
        assert_relative_eq!(*s.last_midpoint(), na::Point3::new(0.0, -10.0, 300.0));
    }

    #[test]
    fn test_equidistant_pair_drops_second_eye() {
        let mut s = stabilizer();
        let target = na::Point2::new(0.0, -70.0);
        let a = limbus_looking_at(na::Point3::new(-100.0, 0.0, 0.5), target);
        let b = limbus_looking_at(na::Point3::new(100.0, 0.0, 0.5), target);

        assert_eq!(s.reject_outliers([Some(a), Some(b)]), [Some(a), None]);
    }

    #[test]
    fn test_fixation_blends_with_history() {
        let mut s = stabilizer();
        let rest = na::Point2::new(10.0, -50.0);
        for _ in 0..8 {
            s.smooth([Some(rest), Some(rest)]);
        }
        assert_relative_eq!(s.smooth([Some(rest), Some(rest)]), rest, epsilon = 1e-12);

        let moved = na::Point2::new(15.0, -50.0);
        let out = s.smooth([Some(moved), Some(moved)]);

        // Newest slot carries weight 8/36
        let expected = rest + (moved - rest) * (8.0 / 36.0);
        assert_relative_eq!(out, expected, epsilon = 1e-12);
        assert!(out.x > rest.x && out.x < moved.x);
    }

    #[test]
    fn test_jitter_dropped_during_fixation() {
        let mut s = stabilizer();
        let rest = na::Point2::new(0.0, -60.0);
        for _ in 0..8 {
            s.smooth([Some(rest), Some(rest)]);
        }

        // Eye 0 is steady, eye 1 jumps by 100 mm
        let out = s.smooth([Some(rest), Some(na::Point2::new(100.0, -60.0))]);
        assert_relative_eq!(out, rest, epsilon = 1e-12);
        assert!(s.history(1).unwrap().iter().all(|p| *p == rest));
    }

    #[test]
    fn test_saccade_accepted() {
        let mut s = stabilizer();
        let rest = na::Point2::new(0.0, -60.0);
        for _ in 0..8 {
            s.smooth([Some(rest), Some(rest)]);
        }

        // Both eyes move far: not a fixation, so both points enter the history
        let target = na::Point2::new(80.0, -60.0);
        s.smooth([Some(target), Some(target)]);
        assert_eq!(s.history(0).unwrap().back(), Some(&target));
        assert_eq!(s.history(1).unwrap().back(), Some(&target));
        assert_eq!(s.history(0).unwrap().len(), 8);
    }

    #[test]
    fn test_history_starts_at_zero() {
        let mut s = stabilizer();
        let p = na::Point2::new(36.0, -72.0);
        // Far from the zero history, so not fixated; one slot of weight 8/36 is filled
        let out = s.smooth([Some(p), None]);
        assert_relative_eq!(out, na::Point2::new(4.0, -8.0), epsilon = 1e-12);
    }

    #[test]
    fn test_deterministic_given_state() {
        let mut a = stabilizer();
        let mut b = stabilizer();
        let frames = [
            [Some(na::Point2::new(5.0, -40.0)), Some(na::Point2::new(7.0, -42.0))],
            [None, Some(na::Point2::new(6.0, -41.0))],
            [Some(na::Point2::new(5.5, -40.5)), None],
        ];

        for frame in frames {
            assert_eq!(a.smooth(frame), b.smooth(frame));
        }
        // Repeating a frame changes the history but stays reproducible
        let first = a.smooth(frames[0]);
        let second = a.smooth(frames[0]);
        assert_eq!(first, b.smooth(frames[0]));
        assert_eq!(second, b.smooth(frames[0]));
    }

    #[test]
    fn test_config_from_json() -> anyhow::Result<()> {
        let config: StabilizerConfig =
            serde_json::from_str(r#"{"history_len": 4, "weighting": "uniform"}"#)?;
        assert_eq!(config.history_len, 4);
        assert_eq!(config.weighting, HistoryWeighting::Uniform);
        assert_relative_eq!(config.max_interpupillary_mm, 80.0);
        Ok(())
    }
}
