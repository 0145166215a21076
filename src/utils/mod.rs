pub mod sampling;

/// Smallest difference between two axis directions in degrees, in `[0, 90]`.
///
/// Axis directions are only defined modulo 180°, so 1° and 179° are 2° apart.
pub fn axis_angle_diff_deg(a: f64, b: f64) -> f64 {
    ((a - b + 90.0).rem_euclid(180.0) - 90.0).abs()
}
