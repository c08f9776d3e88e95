//! Grid search axes, the capped Cartesian product and a stepped runner.

use crate::error::{FrameOrderError, Result};
use crate::minimise::GridOutcome;
use crate::model::GridPolicy;
use crate::state::AnalysisState;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Largest grid that will be searched.
pub const MAX_GRID_POINTS: f64 = 50e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spacing {
    Linear,
    /// Uniform in the cosine, for polar angles.
    ArcCosine,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Increments {
    /// One increment count for every parameter.
    All(usize),
    /// Per-parameter counts; `None` holds the parameter at its current value.
    PerParam(Vec<Option<usize>>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSettings {
    pub increments: Increments,
    /// Replacement lower bounds, one per parameter.
    pub lower: Option<Vec<f64>>,
    pub upper: Option<Vec<f64>>,
    pub constraints: bool,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            increments: Increments::All(11),
            lower: None,
            upper: None,
            constraints: false,
        }
    }
}

/// One row of grid values between `lower` and `upper`.
pub fn grid_row(incs: usize, lower: f64, upper: f64, spacing: Spacing, end_point: bool) -> Vec<f64> {
    let mut row: Vec<f64> = match spacing {
        Spacing::Linear => {
            if incs == 1 {
                vec![lower]
            } else {
                (0..incs)
                    .map(|i| lower + i as f64 * (upper - lower) / (incs as f64 - 1.0))
                    .collect()
            }
        }
        Spacing::ArcCosine => grid_row(incs, lower.cos(), upper.cos(), Spacing::Linear, true)
            .into_iter()
            .map(|v| v.clamp(-1.0, 1.0).acos())
            .collect(),
    };
    if !end_point {
        row.pop();
    }
    row
}

/// The grid axes, one per optimised parameter, in scaled units.
#[derive(Debug, Clone)]
pub struct GridSpace {
    pub axes: Vec<Vec<f64>>,
}

impl GridSpace {
    pub fn new(axes: Vec<Vec<f64>>) -> Result<Self> {
        let total: f64 = axes.iter().map(|axis| axis.len() as f64).product();
        if total > MAX_GRID_POINTS {
            return Err(FrameOrderError::GridTooLarge {
                total,
                max: MAX_GRID_POINTS,
            });
        }
        Ok(Self { axes })
    }

    pub fn total_points(&self) -> usize {
        self.axes.iter().map(Vec::len).product()
    }

    /// The point at `index`, with the first parameter varying fastest.
    pub fn point(&self, mut index: usize) -> Vec<f64> {
        self.axes
            .iter()
            .map(|axis| {
                let value = axis[index % axis.len()];
                index /= axis.len();
                value
            })
            .collect()
    }

    pub fn points(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        (0..self.total_points()).map(move |index| self.point(index))
    }
}

fn bound_override(bounds: &Option<Vec<f64>>, index: usize, count: usize) -> Result<Option<f64>> {
    match bounds {
        None => Ok(None),
        Some(values) if values.len() != count => Err(FrameOrderError::BoundCount {
            expected: count,
            got: values.len(),
        }),
        Some(values) => Ok(Some(values[index])),
    }
}

/// Builds the grid axes for the current parameters. `scaling` is the
/// diagonal of the scaling matrix; the axes are returned in scaled units.
pub fn build_grid(
    state: &AnalysisState,
    settings: &GridSettings,
    scaling: &[f64],
    sim_index: Option<usize>,
) -> Result<GridSpace> {
    let n = state.params.len();
    let values = state.values_for(sim_index)?;

    let (increments, single): (Vec<Option<usize>>, bool) = match &settings.increments {
        Increments::All(inc) => (vec![Some(*inc); n], true),
        Increments::PerParam(list) if list.len() != n => {
            return Err(FrameOrderError::IncrementCount {
                expected: n,
                got: list.len(),
            })
        }
        Increments::PerParam(list) => (list.clone(), false),
    };
    if increments.iter().any(|inc| *inc == Some(0)) {
        return Err(FrameOrderError::InvalidSettings(
            "grid increments must be greater than zero.".to_string(),
        ));
    }

    let mut axes = Vec::with_capacity(n);
    for (i, &param) in state.params.iter().enumerate() {
        let current = values.or_zero(param);
        let Some(inc) = increments[i] else {
            axes.push(vec![current / scaling[i]]);
            continue;
        };

        let incs_f = inc as f64;
        let (mut lower, mut upper, mut incs, spacing, end_point) = match param.grid_policy() {
            GridPolicy::Pivot => (current - 10.0, current + 10.0, inc, Spacing::Linear, true),
            GridPolicy::Translation => (-5.0, 5.0, inc, Spacing::Linear, true),
            GridPolicy::FullAngle => (0.0, 2.0 * PI * (1.0 - 1.0 / incs_f), inc, Spacing::Linear, true),
            GridPolicy::PolarAngle => {
                let incs = if single { (inc + 1) / 2 + 1 } else { inc };
                (0.0, PI, incs, Spacing::ArcCosine, false)
            }
            GridPolicy::BoundedAngle => (PI / incs_f, PI * (1.0 - 1.0 / incs_f), inc, Spacing::Linear, true),
            GridPolicy::OrderParameter => (-0.125, 1.0, inc, Spacing::Linear, true),
        };
        if let Some(value) = bound_override(&settings.lower, i, n)? {
            lower = value;
        }
        if let Some(value) = bound_override(&settings.upper, i, n)? {
            upper = value;
        }
        // A single point cannot drop its end point.
        if !end_point && incs < 2 {
            incs = 2;
        }

        let row = grid_row(incs, lower, upper, spacing, end_point);
        axes.push(row.into_iter().map(|x| x / scaling[i]).collect());
    }

    GridSpace::new(axes)
}

/// Evaluates a grid in caller-sized batches.
pub struct GridSearchRunner<F: FnMut(&[f64]) -> f64> {
    space: GridSpace,
    objective: F,
    next: usize,
    total: usize,
    best: Option<GridOutcome>,
}

impl<F: FnMut(&[f64]) -> f64> GridSearchRunner<F> {
    pub fn new(space: GridSpace, objective: F) -> Self {
        let total = space.total_points();
        Self {
            space,
            objective,
            next: 0,
            total,
            best: None,
        }
    }

    /// Evaluates up to `batch` further points and returns how many were evaluated.
    pub fn step(&mut self, batch: usize) -> usize {
        let end = (self.next + batch).min(self.total);
        for index in self.next..end {
            let point = self.space.point(index);
            let chi2 = (self.objective)(&point);
            GridOutcome::consider(&mut self.best, &point, chi2);
        }
        let evaluated = end - self.next;
        self.next = end;
        log::debug!("Grid search: {} of {} points evaluated.", self.next, self.total);
        evaluated
    }

    pub fn is_done(&self) -> bool {
        self.next >= self.total
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.next, self.total)
    }

    pub fn best(&self) -> Option<&GridOutcome> {
        self.best.as_ref()
    }

    pub fn run_to_completion(mut self) -> Option<GridOutcome> {
        while !self.is_done() {
            self.step(10_000);
        }
        self.best
    }
}
