//! Cone shapes bounding the motional distribution.
//!
//! The azimuth around the cone axis is `theta` and the polar tilt away from
//! the axis is `phi`. `phi_max(theta)` gives the cone edge along a given azimuth.

use serde::{Deserialize, Serialize};

pub trait ConeShape {
    /// Maximum polar tilt along the azimuth `theta`.
    fn phi_max(&self, theta: f64) -> f64;

    /// Azimuth in `[0, pi/2]` at which the cone edge reaches the tilt `phi`,
    /// or `None` where the inverse is undefined.
    fn theta_max(&self, phi: f64) -> Option<f64>;

    /// True when the orientation `(phi, theta)` lies inside the cone.
    fn limit_check(&self, phi: f64, theta: f64) -> bool {
        phi <= self.phi_max(theta)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IsoCone {
    pub theta: f64,
}

impl IsoCone {
    pub fn new(theta: f64) -> Self {
        Self { theta }
    }
}

impl ConeShape for IsoCone {
    fn phi_max(&self, _theta: f64) -> f64 {
        self.theta
    }

    fn theta_max(&self, _phi: f64) -> Option<f64> {
        None
    }
}

/// Pseudo-elliptic cone with `phi_max = sqrt((phi_x cos theta)^2 + (phi_y sin theta)^2)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PseudoElliptic {
    pub phi_x: f64,
    pub phi_y: f64,
}

impl PseudoElliptic {
    pub fn new(phi_x: f64, phi_y: f64) -> Self {
        Self { phi_x, phi_y }
    }
}

impl ConeShape for PseudoElliptic {
    fn phi_max(&self, theta: f64) -> f64 {
        let (sin_theta, cos_theta) = theta.sin_cos();
        ((self.phi_x * cos_theta).powi(2) + (self.phi_y * sin_theta).powi(2)).sqrt()
    }

    fn theta_max(&self, phi: f64) -> Option<f64> {
        inverse_cos_squared(
            phi * phi,
            self.phi_x * self.phi_x,
            self.phi_y * self.phi_y,
        )
    }
}

/// Pseudo-elliptic cone in the reciprocal form
/// `phi_max = 1 / sqrt((cos theta / phi_x)^2 + (sin theta / phi_y)^2)`.
///
/// This is the form bounding the pseudo-ellipse integration domain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReciprocalPseudoElliptic {
    pub phi_x: f64,
    pub phi_y: f64,
}

impl ReciprocalPseudoElliptic {
    pub fn new(phi_x: f64, phi_y: f64) -> Self {
        Self { phi_x, phi_y }
    }
}

impl ConeShape for ReciprocalPseudoElliptic {
    fn phi_max(&self, theta: f64) -> f64 {
        if self.phi_x == 0.0 || self.phi_y == 0.0 {
            return 0.0;
        }
        let (sin_theta, cos_theta) = theta.sin_cos();
        1.0 / ((cos_theta / self.phi_x).powi(2) + (sin_theta / self.phi_y).powi(2)).sqrt()
    }

    fn theta_max(&self, phi: f64) -> Option<f64> {
        if phi == 0.0 || self.phi_x == 0.0 || self.phi_y == 0.0 {
            return None;
        }
        inverse_cos_squared(
            1.0 / (phi * phi),
            1.0 / (self.phi_x * self.phi_x),
            1.0 / (self.phi_y * self.phi_y),
        )
    }
}

/// Elliptic cone defined on the unit sphere through the sines of its half-angles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Elliptic {
    pub phi_x: f64,
    pub phi_y: f64,
}

impl Elliptic {
    pub fn new(phi_x: f64, phi_y: f64) -> Self {
        Self { phi_x, phi_y }
    }
}

impl ConeShape for Elliptic {
    fn phi_max(&self, theta: f64) -> f64 {
        let (sin_theta, cos_theta) = theta.sin_cos();
        let denominator = ((cos_theta / self.phi_x.sin()).powi(2)
            + (sin_theta / self.phi_y.sin()).powi(2))
        .sqrt();
        (1.0 / denominator).clamp(-1.0, 1.0).asin()
    }

    fn theta_max(&self, phi: f64) -> Option<f64> {
        let sin_phi = phi.sin();
        if sin_phi == 0.0 {
            return None;
        }
        inverse_cos_squared(
            1.0 / (sin_phi * sin_phi),
            1.0 / self.phi_x.sin().powi(2),
            1.0 / self.phi_y.sin().powi(2),
        )
    }
}

/// Cone whose edge follows `scale cos(2 theta) + shift`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Cosine {
    pub phi_x: f64,
    pub phi_y: f64,
    scale: f64,
    shift: f64,
}

impl Cosine {
    pub fn new(phi_x: f64, phi_y: f64) -> Self {
        Self {
            phi_x,
            phi_y,
            scale: (phi_x - phi_y) / 2.0,
            shift: (phi_x + phi_y) / 2.0,
        }
    }
}

impl ConeShape for Cosine {
    fn phi_max(&self, theta: f64) -> f64 {
        self.scale * (2.0 * theta).cos() + self.shift
    }

    fn theta_max(&self, phi: f64) -> Option<f64> {
        if self.scale == 0.0 {
            return None;
        }
        let ratio = (phi - self.shift) / self.scale;
        if !(-1.0..=1.0).contains(&ratio) {
            return None;
        }
        Some(ratio.acos() / 2.0)
    }
}

/// Solves `value = a cos^2(theta) + b sin^2(theta)` for `theta` in `[0, pi/2]`.
fn inverse_cos_squared(value: f64, a: f64, b: f64) -> Option<f64> {
    let span = a - b;
    if span == 0.0 || !span.is_finite() {
        return None;
    }
    let cos_squared = (value - b) / span;
    if !(0.0..=1.0).contains(&cos_squared) {
        return None;
    }
    Some(cos_squared.sqrt().acos())
}
