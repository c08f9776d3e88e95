//! Angle and rotation utilities shared by the target function and the optimisation driver.

use crate::error::{FrameOrderError, Result};
use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

const WINDOW_TOLERANCE: f64 = 1e-7;

/// Wraps `angle` into `[lower, upper)`, where `window` must equal `upper - lower`.
pub fn wrap_angles(angle: f64, lower: f64, upper: f64, window: f64) -> Result<f64> {
    if (window - (upper - lower)).abs() > WINDOW_TOLERANCE || window <= 0.0 {
        return Err(FrameOrderError::InvalidWrapWindow {
            window,
            lower,
            upper,
        });
    }
    if !angle.is_finite() || (angle >= lower && angle < upper) {
        return Ok(angle);
    }

    let mut wrapped = lower + (angle - lower).rem_euclid(window);
    // rem_euclid can round up to the window itself.
    if wrapped >= upper {
        wrapped -= window;
    }
    if wrapped < lower {
        wrapped = lower;
    }
    Ok(wrapped)
}

/// Wraps into the canonical `[0, 2pi)` window.
pub fn wrap_positive(angle: f64) -> Result<f64> {
    wrap_angles(angle, 0.0, 2.0 * PI, 2.0 * PI)
}

/// Unit vector for the polar angle `theta` and azimuth `phi`.
pub fn spherical_to_cartesian(theta: f64, phi: f64) -> Vector3<f64> {
    let (sin_theta, cos_theta) = theta.sin_cos();
    let (sin_phi, cos_phi) = phi.sin_cos();
    Vector3::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
}

/// Inverse of [`spherical_to_cartesian`] for any non-zero vector.
pub fn cartesian_to_spherical(vector: &Vector3<f64>) -> (f64, f64, f64) {
    let r = vector.norm();
    if r == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let theta = (vector.z / r).clamp(-1.0, 1.0).acos();
    let phi = vector.y.atan2(vector.x);
    (r, theta, phi)
}

pub fn rotation_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

pub fn rotation_y(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

/// ZYZ Euler rotation `R = Rz(gamma) Ry(beta) Rz(alpha)`.
pub fn euler_to_r_zyz(alpha: f64, beta: f64, gamma: f64) -> Matrix3<f64> {
    rotation_z(gamma) * rotation_y(beta) * rotation_z(alpha)
}

/// Rotation taking the z-axis onto the unit vector at `(theta, phi)`.
pub fn axis_frame(theta: f64, phi: f64) -> Matrix3<f64> {
    euler_to_r_zyz(0.0, theta, phi)
}

/// Tilt and torsion rotation `R = Rz(phi) Ry(theta) Rz(sigma - phi)`.
///
/// `theta` tilts the z-axis away from the eigenframe z, `phi` is the tilt
/// direction and `sigma` is the torsion about the tilted axis.
pub fn tilt_torsion_to_r(phi: f64, theta: f64, sigma: f64) -> Matrix3<f64> {
    rotation_z(phi) * rotation_y(theta) * rotation_z(sigma - phi)
}

/// Expands the five independent components `[Axx, Ayy, Axy, Axz, Ayz]` into
/// the traceless symmetric matrix.
pub fn tensor_5d_to_matrix(components: &[f64; 5]) -> Matrix3<f64> {
    let [axx, ayy, axy, axz, ayz] = *components;
    let azz = -axx - ayy;
    Matrix3::new(axx, axy, axz, axy, ayy, ayz, axz, ayz, azz)
}

pub fn matrix_to_tensor_5d(matrix: &Matrix3<f64>) -> [f64; 5] {
    [
        matrix[(0, 0)],
        matrix[(1, 1)],
        matrix[(0, 1)],
        matrix[(0, 2)],
        matrix[(1, 2)],
    ]
}
