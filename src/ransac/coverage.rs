use nalgebra as na;

/// Percentage of the full turn around `center` in which at least one of `points` lies.
///
/// The turn is split into bins of `bin_deg` degrees starting at -180°. The number of bins is
/// kept within `1..=360`: widths under a degree, zero and NaN give 1° bins, widths over a full
/// turn or negative give a single bin.
pub fn angular_coverage(center: &na::Point2<f64>, points: &[na::Point2<f64>], bin_deg: f64) -> f64 {
    let num_bins = num_bins(bin_deg);
    let bin_width = 360.0 / num_bins as f64;
    let mut covered = vec![false; num_bins];

    for p in points {
        let angle = (p.y - center.y).atan2(p.x - center.x).to_degrees();
        let bin = ((angle + 180.0) / bin_width).floor() as usize % num_bins;
        covered[bin] = true;
    }

    let count = covered.iter().filter(|&&c| c).count();
    count as f64 / num_bins as f64 * 100.0
}

fn num_bins(bin_deg: f64) -> usize {
    let bins = 360.0 / bin_deg;
    if bins.is_finite() {
        bins.round().clamp(1.0, 360.0) as usize
    } else {
        360
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ring(center: na::Point2<f64>, start_deg: f64, end_deg: f64, n: usize) -> Vec<na::Point2<f64>> {
        (0..n)
            .map(|i| {
                let t = (start_deg + (end_deg - start_deg) * i as f64 / (n - 1) as f64).to_radians();
                center + na::Vector2::new(t.cos(), t.sin()) * 20.0
            })
            .collect()
    }

    #[test]
    fn test_full_ring() {
        let center = na::Point2::new(50.0, 50.0);
        let points = ring(center, -179.0, 179.0, 720);
        assert_relative_eq!(angular_coverage(&center, &points, 5.0), 100.0);
    }

    #[test]
    fn test_narrow_arc() {
        let center = na::Point2::new(50.0, 50.0);
        let points = ring(center, 76.0, 104.0, 60);
        let coverage = angular_coverage(&center, &points, 5.0);
        // Bins [255, 260) through [280, 285) after shifting by 180°
        assert_relative_eq!(coverage, 6.0 / 72.0 * 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_point_and_empty() {
        let center = na::Point2::new(0.0, 0.0);
        assert_relative_eq!(angular_coverage(&center, &[], 5.0), 0.0);
        assert_relative_eq!(
            angular_coverage(&center, &[na::Point2::new(3.0, 0.0)], 5.0),
            100.0 / 72.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_bin_width() {
        let center = na::Point2::new(0.0, 0.0);
        let points = ring(center, -170.0, 170.0, 400);
        assert_relative_eq!(angular_coverage(&center, &points, 90.0), 100.0);
        assert_relative_eq!(angular_coverage(&center, &points[..1], 90.0), 25.0);
    }

    #[test]
    fn test_degenerate_bin_widths() {
        let center = na::Point2::new(0.0, 0.0);
        let point = [na::Point2::new(3.0, 1.0)];

        for bin_deg in [0.0, -0.0, 1e-9, f64::NAN] {
            assert_relative_eq!(angular_coverage(&center, &point, bin_deg), 100.0 / 360.0);
        }
        // Wider than a full turn, or negative: a single bin
        assert_relative_eq!(angular_coverage(&center, &point, 720.0), 100.0);
        assert_relative_eq!(angular_coverage(&center, &point, f64::INFINITY), 100.0);
        assert_relative_eq!(angular_coverage(&center, &point, -5.0), 100.0);
    }
}
