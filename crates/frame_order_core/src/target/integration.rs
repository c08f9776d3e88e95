//! Numerical integration over the motional distribution.
//!
//! Motion is described in the eigenframe by tilt-torsion angles: the polar
//! tilt `theta`, the tilt direction `phi` and the torsion `sigma`. The
//! distribution is uniform over the allowed region, measured by
//! `sin(theta) dtheta dphi dsigma`.

use super::sobol::Sobol;
use crate::cones::{ConeShape, IsoCone, ReciprocalPseudoElliptic};
use crate::error::{FrameOrderError, Result};
use crate::geometry::{rotation_z, tilt_torsion_to_r};
use crate::model::{ConeKind, ModelKind, TorsionKind};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const MAX_QUADRATURE_NODES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    /// Quasi-random Sobol' points filtered to the motional domain.
    #[default]
    QuasiRandom,
    /// Gauss-Legendre product quadrature.
    Quadrature,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrationSettings {
    pub num_int_pts: usize,
    pub method: IntegrationMethod,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            num_int_pts: 200_000,
            method: IntegrationMethod::QuasiRandom,
        }
    }
}

/// Cone and torsion limits of one parameter set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionLimits {
    pub cone_theta: f64,
    pub cone_theta_x: f64,
    pub cone_theta_y: f64,
    pub sigma_max: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct WeightedRotation {
    pub rotation: Matrix3<f64>,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Domain {
    Static,
    Torsion(TorsionKind),
    Cone(ConeKind, TorsionKind),
}

impl Domain {
    fn of(model: ModelKind) -> Domain {
        match (model.cone(), model.torsion()) {
            (ConeKind::None, TorsionKind::None) => Domain::Static,
            (ConeKind::None, torsion) => Domain::Torsion(torsion),
            (cone, torsion) => Domain::Cone(cone, torsion),
        }
    }

    fn dimensions(self) -> usize {
        match self {
            Domain::Static => 0,
            Domain::Torsion(_) => 1,
            Domain::Cone(_, TorsionKind::None) => 2,
            Domain::Cone(_, _) => 3,
        }
    }
}

struct SamplePoint {
    theta: f64,
    phi: f64,
    sigma: f64,
    rotation: Matrix3<f64>,
}

pub struct Integrator {
    domain: Domain,
    method: IntegrationMethod,
    samples: Vec<SamplePoint>,
    /// Gauss-Legendre nodes and weights on `[0, 1]`.
    quadrature: Vec<(f64, f64)>,
}

impl Integrator {
    pub fn new(model: ModelKind, settings: &IntegrationSettings) -> Result<Self> {
        if settings.num_int_pts == 0 {
            return Err(FrameOrderError::InvalidSettings(
                "num_int_pts must be greater than zero.".to_string(),
            ));
        }

        let domain = Domain::of(model);
        let mut integrator = Self {
            domain,
            method: settings.method,
            samples: Vec::new(),
            quadrature: Vec::new(),
        };

        match (settings.method, domain) {
            (_, Domain::Static) => {}
            (IntegrationMethod::QuasiRandom, _) => {
                integrator.samples = sobol_samples(domain, settings.num_int_pts);
            }
            (IntegrationMethod::Quadrature, _) => {
                let per_axis = (settings.num_int_pts as f64)
                    .powf(1.0 / domain.dimensions() as f64)
                    .round() as usize;
                integrator.quadrature =
                    gauss_legendre(per_axis.clamp(2, MAX_QUADRATURE_NODES));
            }
        }

        Ok(integrator)
    }

    pub fn method(&self) -> IntegrationMethod {
        self.method
    }

    /// Rotations in the eigenframe with weights summing to one. A closed
    /// cone reduces to its torsion, and an empty domain to the identity.
    pub fn rotations(&self, limits: &MotionLimits) -> Vec<WeightedRotation> {
        let rotations = match (self.domain, self.method) {
            (Domain::Static, _) => Vec::new(),
            (_, IntegrationMethod::QuasiRandom) => self.sobol_rotations(limits),
            (Domain::Torsion(torsion), IntegrationMethod::Quadrature) => {
                self.quadrature_torsion(torsion, limits)
            }
            (Domain::Cone(cone, torsion), IntegrationMethod::Quadrature) => {
                self.quadrature_cone(cone, torsion, limits)
            }
        };

        if !rotations.is_empty() {
            return rotations;
        }
        // A closed cone leaves only the torsion.
        let torsion = self.torsion_only(limits);
        if !torsion.is_empty() {
            return torsion;
        }
        vec![WeightedRotation {
            rotation: Matrix3::identity(),
            weight: 1.0,
        }]
    }

    fn torsion_only(&self, limits: &MotionLimits) -> Vec<WeightedRotation> {
        let torsion = match self.domain {
            Domain::Cone(_, torsion) if torsion != TorsionKind::None => torsion,
            _ => return Vec::new(),
        };
        if self.method == IntegrationMethod::Quadrature {
            return self.quadrature_torsion(torsion, limits);
        }

        let sigmas: Vec<f64> = self
            .samples
            .iter()
            .map(|point| point.sigma)
            .filter(|sigma| torsion != TorsionKind::Restricted || sigma.abs() <= limits.sigma_max)
            .collect();
        if sigmas.is_empty() {
            return Vec::new();
        }
        let weight = 1.0 / sigmas.len() as f64;
        sigmas
            .into_iter()
            .map(|sigma| WeightedRotation {
                rotation: rotation_z(sigma),
                weight,
            })
            .collect()
    }

    fn sobol_rotations(&self, limits: &MotionLimits) -> Vec<WeightedRotation> {
        let cone = match self.domain {
            Domain::Cone(kind, _) => Some(cone_shape(kind, limits)),
            _ => None,
        };
        let torsion = match self.domain {
            Domain::Torsion(torsion) | Domain::Cone(_, torsion) => torsion,
            Domain::Static => TorsionKind::None,
        };

        let accepted: Vec<&SamplePoint> = self
            .samples
            .iter()
            .filter(|point| {
                cone.as_ref()
                    .map_or(true, |shape| shape.limit_check(point.theta, point.phi))
            })
            .filter(|point| {
                torsion != TorsionKind::Restricted || point.sigma.abs() <= limits.sigma_max
            })
            .collect();

        if accepted.is_empty() {
            return Vec::new();
        }
        let weight = 1.0 / accepted.len() as f64;
        log::debug!(
            "{} of {} integration points lie within the motional domain.",
            accepted.len(),
            self.samples.len()
        );
        accepted
            .into_iter()
            .map(|point| WeightedRotation {
                rotation: point.rotation,
                weight,
            })
            .collect()
    }

    fn quadrature_torsion(
        &self,
        torsion: TorsionKind,
        limits: &MotionLimits,
    ) -> Vec<WeightedRotation> {
        let (lower, upper) = torsion_range(torsion, limits);
        self.quadrature
            .iter()
            .map(|&(node, weight)| WeightedRotation {
                rotation: rotation_z(lower + node * (upper - lower)),
                weight,
            })
            .collect()
    }

    fn quadrature_cone(
        &self,
        kind: ConeKind,
        torsion: TorsionKind,
        limits: &MotionLimits,
    ) -> Vec<WeightedRotation> {
        let shape = cone_shape(kind, limits);
        let torsion_nodes: Vec<(f64, f64)> = match torsion {
            TorsionKind::None => vec![(0.0, 1.0)],
            _ => {
                let (lower, upper) = torsion_range(torsion, limits);
                self.quadrature
                    .iter()
                    .map(|&(node, weight)| (lower + node * (upper - lower), weight))
                    .collect()
            }
        };

        let mut rotations = Vec::new();
        let mut total = 0.0;
        for &(phi_node, phi_weight) in &self.quadrature {
            let phi = 2.0 * PI * phi_node;
            let theta_max = shape.phi_max(phi);
            for &(theta_node, theta_weight) in &self.quadrature {
                let theta = theta_node * theta_max;
                let area = phi_weight * theta_weight * theta_max * theta.sin();
                if area <= 0.0 {
                    continue;
                }
                for &(sigma, sigma_weight) in &torsion_nodes {
                    let weight = area * sigma_weight;
                    total += weight;
                    rotations.push(WeightedRotation {
                        rotation: tilt_torsion_to_r(phi, theta, sigma),
                        weight,
                    });
                }
            }
        }

        if total <= 0.0 {
            return Vec::new();
        }
        for rotation in &mut rotations {
            rotation.weight /= total;
        }
        rotations
    }
}

fn cone_shape(kind: ConeKind, limits: &MotionLimits) -> Box<dyn ConeShape> {
    match kind {
        ConeKind::Ellipse => Box::new(ReciprocalPseudoElliptic::new(
            limits.cone_theta_x,
            limits.cone_theta_y,
        )),
        _ => Box::new(IsoCone::new(limits.cone_theta)),
    }
}

fn torsion_range(torsion: TorsionKind, limits: &MotionLimits) -> (f64, f64) {
    match torsion {
        TorsionKind::Restricted => (-limits.sigma_max, limits.sigma_max),
        TorsionKind::Free => (-PI, PI),
        TorsionKind::None => (0.0, 0.0),
    }
}

fn sobol_samples(domain: Domain, count: usize) -> Vec<SamplePoint> {
    let mut sobol = Sobol::new(domain.dimensions());
    (0..count)
        .map(|_| {
            let u = sobol.next_point();
            match domain {
                Domain::Torsion(_) => {
                    let sigma = 2.0 * PI * (u[0] - 0.5);
                    SamplePoint {
                        theta: 0.0,
                        phi: 0.0,
                        sigma,
                        rotation: rotation_z(sigma),
                    }
                }
                _ => {
                    let theta = (2.0 * u[0] - 1.0).clamp(-1.0, 1.0).acos();
                    let phi = 2.0 * PI * u[1];
                    let sigma = u.get(2).map_or(0.0, |x| 2.0 * PI * (x - 0.5));
                    SamplePoint {
                        theta,
                        phi,
                        sigma,
                        rotation: tilt_torsion_to_r(phi, theta, sigma),
                    }
                }
            }
        })
        .collect()
}

/// Gauss-Legendre nodes and weights mapped onto `[0, 1]`.
fn gauss_legendre(n: usize) -> Vec<(f64, f64)> {
    let m = (n + 1) / 2;
    let mut rule = vec![(0.0, 0.0); n];
    for i in 0..m {
        let mut x = f64::cos(PI * (i as f64 + 0.75) / (n as f64 + 0.5));
        let mut dp = 1.0;
        for _ in 0..100 {
            let (p, derivative) = legendre_eval(n, x);
            dp = derivative;
            let dx = -p / dp;
            x += dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (_, derivative) = legendre_eval(n, x);
        if derivative.is_finite() && derivative != 0.0 {
            dp = derivative;
        }
        let weight = 1.0 / ((1.0 - x * x) * dp * dp);
        rule[i] = (0.5 * (1.0 - x), weight);
        rule[n - i - 1] = (0.5 * (1.0 + x), weight);
    }
    rule
}

fn legendre_eval(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut p0 = 1.0;
    let mut p1 = x;
    for k in 2..=n {
        let kf = k as f64;
        let pn = ((2.0 * kf - 1.0) * x * p1 - (kf - 1.0) * p0) / kf;
        p0 = p1;
        p1 = pn;
    }
    let dp = (n as f64) * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}
