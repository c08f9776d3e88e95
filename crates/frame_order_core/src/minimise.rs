//! Local minimisers for the chi-squared target and grid point evaluation.

use crate::error::{FrameOrderError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type Objective<'a> = dyn FnMut(&[f64]) -> f64 + 'a;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Simplex,
    Bfgs,
    SteepestDescent,
}

impl FromStr for Algorithm {
    type Err = FrameOrderError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "simplex" | "nelder-mead" => Ok(Algorithm::Simplex),
            "bfgs" => Ok(Algorithm::Bfgs),
            "steepest descent" | "steepest_descent" | "sd" => Ok(Algorithm::SteepestDescent),
            _ => Err(FrameOrderError::UnknownAlgorithm(name.to_string())),
        }
    }
}

/// Names of the constrained optimisation wrappers.
pub fn is_constraint_method(name: &str) -> bool {
    matches!(
        name.trim().to_lowercase().as_str(),
        "log barrier" | "method of multipliers" | "mom"
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinimiseSettings {
    /// Algorithm name, or a constraint wrapper name followed by the algorithm in `min_options`.
    pub algorithm: String,
    #[serde(default)]
    pub min_options: Vec<String>,
    pub func_tol: f64,
    pub grad_tol: Option<f64>,
    pub max_iterations: usize,
    pub constraints: bool,
    pub scaling: bool,
}

impl Default for MinimiseSettings {
    fn default() -> Self {
        Self {
            algorithm: "simplex".to_string(),
            min_options: Vec::new(),
            func_tol: 1e-25,
            grad_tol: None,
            max_iterations: 10_000,
            constraints: false,
            scaling: true,
        }
    }
}

/// Tolerances shared by all minimisers.
#[derive(Debug, Clone, Copy)]
pub struct Tolerances {
    pub func_tol: f64,
    pub grad_tol: Option<f64>,
    pub max_iterations: usize,
}

impl From<&MinimiseSettings> for Tolerances {
    fn from(settings: &MinimiseSettings) -> Self {
        Self {
            func_tol: settings.func_tol,
            grad_tol: settings.grad_tol,
            max_iterations: settings.max_iterations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimiseResult {
    pub params: Vec<f64>,
    pub chi2: f64,
    pub iterations: usize,
    pub f_count: usize,
    pub g_count: usize,
    pub h_count: usize,
    pub warning: Option<String>,
}

pub trait Minimiser {
    fn minimise(&mut self, objective: &mut Objective, x0: &[f64], tol: Tolerances) -> MinimiseResult;
}

impl Algorithm {
    pub fn minimiser(self) -> Box<dyn Minimiser> {
        match self {
            Algorithm::Simplex => Box::new(NelderMead::default()),
            Algorithm::Bfgs => Box::new(Bfgs::default()),
            Algorithm::SteepestDescent => Box::new(SteepestDescent::default()),
        }
    }
}

const MAX_ITER_WARNING: &str = "Maximum number of iterations reached";

/// Derivative-free downhill simplex.
pub struct NelderMead {
    pub initial_step: f64,
    pub reflection: f64,
    pub expansion: f64,
    pub contraction: f64,
    pub shrink: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            initial_step: 1.0,
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrink: 0.5,
        }
    }
}

fn lerp(a: &[f64], b: &[f64], t: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x + t * (y - x)).collect()
}

impl Minimiser for NelderMead {
    fn minimise(&mut self, objective: &mut Objective, x0: &[f64], tol: Tolerances) -> MinimiseResult {
        let n = x0.len();
        let mut f_count = 0usize;
        let mut eval = |x: &[f64], count: &mut usize| {
            *count += 1;
            objective(x)
        };

        let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
        simplex.push((x0.to_vec(), eval(x0, &mut f_count)));
        for i in 0..n {
            let mut vertex = x0.to_vec();
            vertex[i] += self.initial_step;
            let value = eval(&vertex, &mut f_count);
            simplex.push((vertex, value));
        }

        let mut iterations = 0usize;
        let mut warning = None;
        loop {
            simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
            let best = simplex[0].1;
            let worst = simplex[n].1;
            if n == 0 || (worst - best).abs() <= tol.func_tol || simplex_collapsed(&simplex) {
                break;
            }
            if iterations >= tol.max_iterations {
                warning = Some(MAX_ITER_WARNING.to_string());
                break;
            }
            iterations += 1;

            let mut centroid = vec![0.0; n];
            for (vertex, _) in &simplex[..n] {
                for (c, x) in centroid.iter_mut().zip(vertex) {
                    *c += x / n as f64;
                }
            }

            let reflected = lerp(&centroid, &simplex[n].0, -self.reflection);
            let f_reflected = eval(&reflected, &mut f_count);

            if f_reflected < best {
                let expanded = lerp(&centroid, &simplex[n].0, -self.expansion);
                let f_expanded = eval(&expanded, &mut f_count);
                simplex[n] = if f_expanded < f_reflected {
                    (expanded, f_expanded)
                } else {
                    (reflected, f_reflected)
                };
                continue;
            }
            if f_reflected < simplex[n - 1].1 {
                simplex[n] = (reflected, f_reflected);
                continue;
            }

            let (towards, f_towards) = if f_reflected < worst {
                (reflected, f_reflected)
            } else {
                (simplex[n].0.clone(), worst)
            };
            let contracted = lerp(&centroid, &towards, self.contraction);
            let f_contracted = eval(&contracted, &mut f_count);
            if f_contracted < f_towards {
                simplex[n] = (contracted, f_contracted);
                continue;
            }

            let anchor = simplex[0].0.clone();
            for vertex in simplex.iter_mut().skip(1) {
                let shrunk = lerp(&anchor, &vertex.0, self.shrink);
                let value = eval(&shrunk, &mut f_count);
                *vertex = (shrunk, value);
            }
        }

        let (params, chi2) = simplex.swap_remove(0);
        log::debug!("Simplex finished after {} iterations, chi2 = {}.", iterations, chi2);
        MinimiseResult {
            params,
            chi2,
            iterations,
            f_count,
            g_count: 0,
            h_count: 0,
            warning,
        }
    }
}

fn simplex_collapsed(simplex: &[(Vec<f64>, f64)]) -> bool {
    let best = &simplex[0].0;
    simplex[1..].iter().all(|(vertex, _)| {
        vertex
            .iter()
            .zip(best)
            .all(|(x, b)| (x - b).abs() <= 1e-14 * (1.0 + b.abs()))
    })
}

/// Central difference gradient; counts as one gradient call.
fn numerical_gradient(objective: &mut Objective, x: &DVector<f64>) -> DVector<f64> {
    let mut gradient = DVector::zeros(x.len());
    let mut shifted = x.clone();
    for i in 0..x.len() {
        let h = 6e-6 * x[i].abs().max(1.0);
        shifted[i] = x[i] + h;
        let forward = objective(shifted.as_slice());
        shifted[i] = x[i] - h;
        let backward = objective(shifted.as_slice());
        shifted[i] = x[i];
        gradient[i] = (forward - backward) / (2.0 * h);
    }
    gradient
}

/// Backtracking line search satisfying the Armijo condition.
fn backtrack(
    objective: &mut Objective,
    x: &DVector<f64>,
    f: f64,
    gradient: &DVector<f64>,
    direction: &DVector<f64>,
    f_count: &mut usize,
) -> Option<(DVector<f64>, f64)> {
    let slope = gradient.dot(direction);
    let mut alpha = 1.0;
    for _ in 0..60 {
        let candidate = x + direction * alpha;
        let value = objective(candidate.as_slice());
        *f_count += 1;
        if value <= f + 1e-4 * alpha * slope && value < f {
            return Some((candidate, value));
        }
        alpha *= 0.5;
    }
    None
}

fn gradient_converged(gradient: &DVector<f64>, tol: &Tolerances) -> bool {
    tol.grad_tol.map_or(false, |limit| gradient.norm() <= limit)
}

/// Quasi-Newton BFGS with finite difference gradients.
#[derive(Default)]
pub struct Bfgs;

impl Minimiser for Bfgs {
    fn minimise(&mut self, objective: &mut Objective, x0: &[f64], tol: Tolerances) -> MinimiseResult {
        descent(objective, x0, tol, true)
    }
}

#[derive(Default)]
pub struct SteepestDescent;

impl Minimiser for SteepestDescent {
    fn minimise(&mut self, objective: &mut Objective, x0: &[f64], tol: Tolerances) -> MinimiseResult {
        descent(objective, x0, tol, false)
    }
}

fn descent(objective: &mut Objective, x0: &[f64], tol: Tolerances, quasi_newton: bool) -> MinimiseResult {
    let n = x0.len();
    let mut x = DVector::from_column_slice(x0);
    let mut f = objective(x.as_slice());
    let mut f_count = 1usize;
    let mut g_count = 0usize;
    let mut iterations = 0usize;
    let mut warning = None;

    let mut gradient = numerical_gradient(objective, &x);
    g_count += 1;
    let mut inverse_hessian = DMatrix::<f64>::identity(n, n);

    while n > 0 {
        if gradient_converged(&gradient, &tol) {
            break;
        }
        if iterations >= tol.max_iterations {
            warning = Some(MAX_ITER_WARNING.to_string());
            break;
        }
        iterations += 1;

        let mut direction = if quasi_newton {
            -(&inverse_hessian * &gradient)
        } else {
            -gradient.clone()
        };
        if gradient.dot(&direction) >= 0.0 {
            inverse_hessian = DMatrix::identity(n, n);
            direction = -gradient.clone();
        }

        let Some((x_new, f_new)) = backtrack(objective, &x, f, &gradient, &direction, &mut f_count)
        else {
            break;
        };
        let gradient_new = numerical_gradient(objective, &x_new);
        g_count += 1;

        if quasi_newton {
            let s = &x_new - &x;
            let y = &gradient_new - &gradient;
            let sy = s.dot(&y);
            if sy > 1e-300 {
                let rho = 1.0 / sy;
                let identity = DMatrix::<f64>::identity(n, n);
                let left = &identity - (&s * y.transpose()) * rho;
                let right = &identity - (&y * s.transpose()) * rho;
                inverse_hessian = left * &inverse_hessian * right + (&s * s.transpose()) * rho;
            }
        }

        let improvement = f - f_new;
        x = x_new;
        f = f_new;
        gradient = gradient_new;
        log::debug!("Iteration {}: chi2 = {}.", iterations, f);
        if improvement.abs() <= tol.func_tol {
            break;
        }
    }

    MinimiseResult {
        params: x.iter().copied().collect(),
        chi2: f,
        iterations,
        f_count,
        g_count,
        h_count: 0,
        warning,
    }
}

/// The best point of a grid search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOutcome {
    pub params: Vec<f64>,
    pub chi2: f64,
    pub f_count: usize,
    pub iterations: usize,
}

impl GridOutcome {
    /// Records one evaluated point, keeping the lowest chi-squared.
    pub fn consider(best: &mut Option<GridOutcome>, point: &[f64], chi2: f64) {
        let (f_count, iterations) = best
            .as_ref()
            .map_or((1, 1), |current| (current.f_count + 1, current.iterations + 1));
        let replace = match best.as_ref() {
            None => true,
            Some(current) => chi2 < current.chi2 || (current.chi2.is_nan() && !chi2.is_nan()),
        };

        if replace {
            *best = Some(GridOutcome {
                params: point.to_vec(),
                chi2,
                f_count,
                iterations,
            });
        } else if let Some(current) = best.as_mut() {
            current.f_count = f_count;
            current.iterations = iterations;
        }
    }
}

impl From<GridOutcome> for MinimiseResult {
    fn from(outcome: GridOutcome) -> Self {
        MinimiseResult {
            params: outcome.params,
            chi2: outcome.chi2,
            iterations: outcome.iterations,
            f_count: outcome.f_count,
            g_count: 0,
            h_count: 0,
            warning: None,
        }
    }
}
