//! Small vector helpers shared by the reflection routines.

use nalgebra::{Rotation3, Unit, Vector3};

use crate::config::VEC_LENGTH_THRESHOLD;


/// Law of reflection: flips twice the projection of `dir` on `normal`, returning a unit vector.
pub fn reflect(dir: &Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
    let perp = dir.dot(normal);
    (dir - 2.0 * perp * normal).normalize()
}

/// Splits `dir` into its signed component along `normal` and the tangential remainder.
pub fn decompose(dir: &Vector3<f64>, normal: &Vector3<f64>) -> (f64, Vector3<f64>) {
    let perp = dir.dot(normal);
    (perp, dir - perp * normal)
}

/// Unit vector along `v`, or `None` if `v` is too short to have a direction.
pub fn unit(v: &Vector3<f64>) -> Option<Vector3<f64>> {
    v.try_normalize(VEC_LENGTH_THRESHOLD)
}

/// Signed angle from `from` to `to`, measured about `axis` (right-handed).
/// Only the components perpendicular to `axis` contribute.
pub fn azim_angle(from: &Vector3<f64>, to: &Vector3<f64>, axis: &Vector3<f64>) -> f64 {
    let axis = match unit(axis) {
        Some(a) => a,
        None => return 0.0,
    };
    let a = from - from.dot(&axis) * axis;
    let b = to - to.dot(&axis) * axis;
    a.cross(&b).dot(&axis).atan2(a.dot(&b))
}

/// Rotates `v` by `angle` about `axis`.
pub fn rotate(v: &Vector3<f64>, axis: &Vector3<f64>, angle: f64) -> Vector3<f64> {
    match unit(axis) {
        Some(a) => Rotation3::from_axis_angle(&Unit::new_unchecked(a), angle) * v,
        None => *v,
    }
}
