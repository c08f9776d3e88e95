//! Monte Carlo simulations for the parameter errors.
//!
//! The base data (RDCs and PCSs of the moving domain) are randomised with
//! Gaussian noise of their measured errors, every selected simulation is
//! optimised independently, and the parameter errors are the standard
//! deviations over the simulations.

use crate::data::DataLayout;
use crate::elimination::eliminate;
use crate::error::{FrameOrderError, Result};
use crate::minimise::MinimiseSettings;
use crate::optimisation::{calculate, commit, optimise, OptimisationReport, Search};
use crate::parameters::get_param_names;
use crate::state::{AnalysisState, SimulationStore};
use crate::target::{DEFAULT_PCS_ERROR, DEFAULT_RDC_ERROR};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Identifies one base data point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataId {
    Rdc {
        spin_id1: String,
        spin_id2: String,
        align_id: String,
    },
    Pcs {
        spin_id: String,
        align_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McMethod {
    /// Randomise the values back-calculated from the best fit.
    #[default]
    BackCalc,
    /// Randomise the measured values.
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McSettings {
    pub number: usize,
    pub method: McMethod,
    pub seed: u64,
}

impl Default for McSettings {
    fn default() -> Self {
        Self {
            number: 500,
            method: McMethod::BackCalc,
            seed: 0,
        }
    }
}

/// All base data identifiers: the RDCs of each interatomic pair for every
/// RDC alignment, then the PCSs of each spin for every PCS alignment.
/// The sequence is rebuilt on every call.
pub fn base_data_loop(state: &AnalysisState) -> impl Iterator<Item = DataId> + '_ {
    let layout = DataLayout::build(state, false);

    let rdcs = layout.interatoms.into_iter().flat_map(move |index| {
        let interatom = &state.interatoms[index];
        state.rdc_ids.iter().map(move |align_id| DataId::Rdc {
            spin_id1: interatom.spin_id1.clone(),
            spin_id2: interatom.spin_id2.clone(),
            align_id: align_id.clone(),
        })
    });
    let pcs = layout.spins.into_iter().flat_map(move |index| {
        let spin = &state.spins[index];
        state.pcs_ids.iter().map(move |align_id| DataId::Pcs {
            spin_id: spin.id.clone(),
            align_id: align_id.clone(),
        })
    });

    rdcs.chain(pcs)
}

fn interatom_index(state: &AnalysisState, spin_id1: &str, spin_id2: &str) -> Result<usize> {
    state
        .interatoms
        .iter()
        .position(|interatom| {
            (interatom.spin_id1 == spin_id1 && interatom.spin_id2 == spin_id2)
                || (interatom.spin_id1 == spin_id2 && interatom.spin_id2 == spin_id1)
        })
        .ok_or_else(|| FrameOrderError::UnknownDataId(format!("{} - {}", spin_id1, spin_id2)))
}

fn spin_index(state: &AnalysisState, spin_id: &str) -> Result<usize> {
    state
        .spins
        .iter()
        .position(|spin| spin.id == spin_id)
        .ok_or_else(|| FrameOrderError::UnknownDataId(spin_id.to_string()))
}

/// The back-calculated value of one data point, running `calculate` first
/// when no back-calculated data exists yet.
pub fn create_mc_data(state: &mut AnalysisState, id: &DataId) -> Result<Option<f64>> {
    match id {
        DataId::Rdc {
            spin_id1,
            spin_id2,
            align_id,
        } => {
            let index = interatom_index(state, spin_id1, spin_id2)?;
            if state.interatoms[index].rdc_bc.is_empty() {
                calculate(state, None)?;
            }
            Ok(state.interatoms[index].rdc_bc.get(align_id).copied())
        }
        DataId::Pcs { spin_id, align_id } => {
            let index = spin_index(state, spin_id)?;
            if state.spins[index].pcs_bc.is_empty() {
                calculate(state, None)?;
            }
            Ok(state.spins[index].pcs_bc.get(align_id).copied())
        }
    }
}

/// The measured error of one data point.
pub fn return_error(state: &AnalysisState, id: &DataId) -> Result<Option<f64>> {
    match id {
        DataId::Rdc {
            spin_id1,
            spin_id2,
            align_id,
        } => {
            let interatom = &state.interatoms[interatom_index(state, spin_id1, spin_id2)?];
            if interatom.rdc_err.is_empty() {
                return Err(FrameOrderError::MissingErrors { kind: "RDC" });
            }
            Ok(interatom.rdc_err.get(align_id).copied())
        }
        DataId::Pcs { spin_id, align_id } => {
            let spin = &state.spins[spin_index(state, spin_id)?];
            if spin.pcs_err.is_empty() {
                return Err(FrameOrderError::MissingErrors { kind: "PCS" });
            }
            Ok(spin.pcs_err.get(align_id).copied())
        }
    }
}

fn measured_value(state: &AnalysisState, id: &DataId) -> Result<Option<f64>> {
    match id {
        DataId::Rdc {
            spin_id1,
            spin_id2,
            align_id,
        } => {
            let interatom = &state.interatoms[interatom_index(state, spin_id1, spin_id2)?];
            Ok(interatom.rdc.get(align_id).copied())
        }
        DataId::Pcs { spin_id, align_id } => {
            let spin = &state.spins[spin_index(state, spin_id)?];
            Ok(spin.pcs.get(align_id).copied())
        }
    }
}

/// Sizes the simulation arrays, discarding any earlier simulations.
pub fn monte_carlo_setup(state: &mut AnalysisState, number: usize) -> Result<()> {
    if number == 0 {
        return Err(FrameOrderError::InvalidSettings(
            "the number of simulations must be greater than zero.".to_string(),
        ));
    }
    state.sims = Some(SimulationStore::new(number));
    Ok(())
}

/// Randomises every base data point and packs the simulated values.
///
/// Points without a value are skipped; points without an error use the
/// default error of their data type.
pub fn create_data<R: Rng + ?Sized>(state: &mut AnalysisState, method: McMethod, rng: &mut R) -> Result<()> {
    let number = state.simulations()?.number;
    let ids: Vec<DataId> = base_data_loop(state).collect();

    for id in &ids {
        let value = match method {
            McMethod::BackCalc => create_mc_data(state, id)?,
            McMethod::Direct => measured_value(state, id)?,
        };
        let Some(value) = value else {
            continue;
        };
        let default = match id {
            DataId::Rdc { .. } => DEFAULT_RDC_ERROR,
            DataId::Pcs { .. } => DEFAULT_PCS_ERROR * 1e6,
        };
        let error = return_error(state, id)?.unwrap_or(default);
        let normal = Normal::new(value, error)
            .map_err(|err| FrameOrderError::InvalidSettings(format!("the error {} is invalid: {}", error, err)))?;

        let sim_data: Vec<f64> = (0..number).map(|_| normal.sample(&mut *rng)).collect();
        sim_pack_data(state, id, &sim_data)?;
    }

    log::info!("Randomised {} base data points for {} simulations.", ids.len(), number);
    Ok(())
}

/// Stores the simulated values of one data point.
pub fn sim_pack_data(state: &mut AnalysisState, id: &DataId, sim_data: &[f64]) -> Result<()> {
    let number = state.simulations()?.number;
    if sim_data.len() != number {
        return Err(FrameOrderError::SimDataLength {
            expected: number,
            got: sim_data.len(),
        });
    }

    match id {
        DataId::Rdc {
            spin_id1,
            spin_id2,
            align_id,
        } => {
            let index = interatom_index(state, spin_id1, spin_id2)?;
            state.interatoms[index]
                .rdc_sim
                .insert(align_id.clone(), sim_data.to_vec());
        }
        DataId::Pcs { spin_id, align_id } => {
            let index = spin_index(state, spin_id)?;
            state.spins[index]
                .pcs_sim
                .insert(align_id.clone(), sim_data.to_vec());
        }
    }
    Ok(())
}

/// Copies the current parameter values and statistics into every simulation.
pub fn sim_init_values(state: &mut AnalysisState) -> Result<()> {
    state.require_model()?;
    let values = state.values;
    let stats = state.stats.clone().unwrap_or_default();

    let sims = state.simulations_mut()?;
    if sims.values.is_some() {
        return Err(FrameOrderError::SimulationsAlreadySet);
    }
    sims.values = Some(vec![values; sims.number]);
    sims.stats = Some(vec![stats; sims.number]);
    Ok(())
}

/// The simulation values of the parameter at `index` of `get_param_names`.
pub fn sim_return_param(state: &AnalysisState, index: usize) -> Result<Vec<f64>> {
    let names = get_param_names(state)?;
    let param = *names
        .get(index)
        .ok_or_else(|| FrameOrderError::MissingParameter(format!("#{}", index)))?;
    let values = state
        .simulations()?
        .values
        .as_ref()
        .ok_or(FrameOrderError::NoSimulations)?;
    values.iter().map(|sim| sim.require(param)).collect()
}

pub fn set_selected_sim(state: &mut AnalysisState, selected: Vec<bool>) -> Result<()> {
    let sims = state.simulations_mut()?;
    if selected.len() != sims.number {
        return Err(FrameOrderError::SimDataLength {
            expected: sims.number,
            got: selected.len(),
        });
    }
    sims.selected = selected;
    Ok(())
}

pub fn sim_return_selected(state: &AnalysisState) -> Result<Vec<bool>> {
    Ok(state.simulations()?.selected.clone())
}

/// Deselects the simulations with parameters outside their allowed range and
/// returns how many were deselected.
pub fn eliminate_simulations(state: &mut AnalysisState) -> Result<usize> {
    let names = get_param_names(state)?;
    let sims = state.simulations()?;
    let values = sims.values.as_ref().ok_or(FrameOrderError::NoSimulations)?;

    let eliminated: Vec<usize> = (0..sims.number)
        .filter(|&index| sims.selected[index])
        .filter(|&index| {
            names.iter().any(|&param| {
                values[index]
                    .get(param)
                    .map_or(false, |value| eliminate(state, param, value, Some(index)))
            })
        })
        .collect();

    let sims = state.simulations_mut()?;
    for &index in &eliminated {
        sims.selected[index] = false;
    }
    Ok(eliminated.len())
}

/// Minimises every selected simulation. The searches run in parallel and
/// each result is written to its own simulation index.
pub fn minimise_simulations(
    state: &mut AnalysisState,
    settings: &MinimiseSettings,
) -> Result<Vec<OptimisationReport>> {
    let sims = state.simulations()?;
    if sims.values.is_none() {
        return Err(FrameOrderError::NoSimulations);
    }
    let indices: Vec<usize> = (0..sims.number).filter(|&i| sims.selected[i]).collect();

    let shared: &AnalysisState = state;
    let optimised: Vec<_> = indices
        .par_iter()
        .map(|&index| optimise(shared, Search::Local(settings), Some(index)))
        .collect();

    let mut reports = Vec::with_capacity(indices.len());
    for (index, outcome) in indices.into_iter().zip(optimised) {
        reports.push(commit(state, outcome?, Some(index))?);
    }
    log::info!("Optimised {} simulations.", reports.len());
    Ok(reports)
}

/// Sets each parameter error to the sample standard deviation over the
/// selected simulations.
pub fn error_analysis(state: &mut AnalysisState) -> Result<()> {
    let names = get_param_names(state)?;
    let sims = state.simulations()?;
    let values = sims.values.as_ref().ok_or(FrameOrderError::NoSimulations)?;
    let selected: Vec<usize> = (0..sims.number).filter(|&i| sims.selected[i]).collect();
    if selected.len() < 2 {
        return Err(FrameOrderError::InvalidSettings(
            "at least two selected simulations are required for the error analysis.".to_string(),
        ));
    }

    let mut errors = state.errors;
    for param in names {
        let samples: Vec<f64> = selected
            .iter()
            .map(|&index| values[index].require(param))
            .collect::<Result<_>>()?;
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
        errors.set(param, variance.sqrt());
    }
    state.errors = errors;
    Ok(())
}

/// Sets up and runs the simulations, then performs the error analysis.
pub fn run_monte_carlo<R: Rng + ?Sized>(
    state: &mut AnalysisState,
    mc: &McSettings,
    settings: &MinimiseSettings,
    rng: &mut R,
) -> Result<Vec<OptimisationReport>> {
    monte_carlo_setup(state, mc.number)?;
    create_data(state, mc.method, rng)?;
    sim_init_values(state)?;
    let reports = minimise_simulations(state, settings)?;
    let eliminated = eliminate_simulations(state)?;
    if eliminated > 0 {
        log::info!("Eliminated {} simulations.", eliminated);
    }
    error_analysis(state)?;
    Ok(reports)
}
