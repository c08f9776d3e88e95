//! Dense optimisation arrays built over the fixed data layout.
//!
//! Rows are alignments and columns are interatomic pairs or spins. Missing
//! measurements are stored as NaN at their fixed positions.

use crate::constants::{frequency_to_tesla, gyromagnetic_ratio, rdc_constant};
use crate::data::{opt_uses_pcs, opt_uses_rdc, DataLayout};
use crate::error::{push_warning, FrameOrderError, Result, Warning};
use crate::state::{AnalysisState, SpinContainer};
use nalgebra::{DMatrix, Vector3};
use std::collections::BTreeMap;

/// PCS values are stored in ppm.
const PPM: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct RdcData {
    pub values: DMatrix<f64>,
    pub errors: DMatrix<f64>,
    pub weights: DMatrix<f64>,
    pub absolute: DMatrix<bool>,
    pub vectors: Vec<Vector3<f64>>,
    pub constants: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct PcsData {
    /// Unitless shifts.
    pub values: DMatrix<f64>,
    pub errors: DMatrix<f64>,
    pub weights: DMatrix<f64>,
    /// Per alignment, NaN for alignments without PCS data.
    pub temperatures: Vec<f64>,
    /// Field strengths in Tesla, NaN for alignments without PCS data.
    pub frequencies: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct AtomicPositions {
    pub positions: Vec<Vector3<f64>>,
    pub paramagnetic_centre: Vector3<f64>,
}

#[derive(Debug, Clone)]
pub struct TensorData {
    /// Full tensor components, one per used alignment.
    pub full: Vec<[f64; 5]>,
    pub full_errors: Vec<[f64; 5]>,
    pub full_in_ref_frame: Vec<bool>,
    /// Names of the reduced tensors receiving the back-calculated values.
    pub reduced: Vec<String>,
}

fn measured_value(
    values: &BTreeMap<String, f64>,
    sims: &BTreeMap<String, Vec<f64>>,
    align_id: &str,
    sim_index: Option<usize>,
) -> Result<f64> {
    if !values.contains_key(align_id) {
        return Ok(f64::NAN);
    }
    match sim_index {
        None => Ok(values[align_id]),
        Some(index) => sims
            .get(align_id)
            .and_then(|sim| sim.get(index))
            .copied()
            .ok_or(FrameOrderError::NoSimulations),
    }
}

pub fn minimise_setup_rdcs(
    state: &AnalysisState,
    layout: &DataLayout,
    sim_index: Option<usize>,
    warnings: &mut Vec<Warning>,
) -> Result<RdcData> {
    if layout.interatoms.is_empty() {
        return Err(FrameOrderError::NoInteratomicVectors);
    }
    let verbose = sim_index.is_none();
    let rows = layout.align_ids.len();
    let cols = layout.rdc_count();

    let mut vectors = Vec::with_capacity(cols);
    let mut constants = Vec::with_capacity(cols);
    for &index in &layout.interatoms {
        let interatom = &state.interatoms[index];

        let mut vector = Vector3::zeros();
        for v in &interatom.vector {
            vector += Vector3::from(*v);
        }
        if interatom.vector.len() > 1 {
            push_warning(
                warnings,
                Warning::AveragedVectors {
                    spin_id1: interatom.spin_id1.clone(),
                    spin_id2: interatom.spin_id2.clone(),
                    count: interatom.vector.len(),
                },
                verbose,
            );
        }
        let norm = vector.norm();
        if norm == 0.0 {
            return Err(FrameOrderError::NoInteratomicVectors);
        }
        vectors.push(vector / norm);

        let g1 = spin_gyromagnetic_ratio(state, &interatom.spin_id1)?;
        let g2 = spin_gyromagnetic_ratio(state, &interatom.spin_id2)?;
        constants.push(rdc_constant(g1, g2, interatom.r));
    }

    let mut values = DMatrix::from_element(rows, cols, f64::NAN);
    let mut errors = DMatrix::from_element(rows, cols, f64::NAN);
    let mut weights = DMatrix::from_element(rows, cols, 1.0);
    let mut absolute = DMatrix::from_element(rows, cols, false);
    for (i, align_id) in layout.align_ids.iter().enumerate() {
        if !opt_uses_rdc(state, align_id) {
            continue;
        }
        for (j, &index) in layout.interatoms.iter().enumerate() {
            let interatom = &state.interatoms[index];
            values[(i, j)] =
                measured_value(&interatom.rdc, &interatom.rdc_sim, align_id, sim_index)?;
            if let Some(&error) = interatom.rdc_err.get(align_id) {
                errors[(i, j)] = error;
            }
            if let Some(&weight) = interatom.rdc_weight.get(align_id) {
                weights[(i, j)] = weight;
            }
            if let Some(&flag) = interatom.absolute_rdc.get(align_id) {
                absolute[(i, j)] = flag;
            }
        }
    }

    Ok(RdcData {
        values,
        errors,
        weights,
        absolute,
        vectors,
        constants,
    })
}

fn spin_gyromagnetic_ratio(state: &AnalysisState, spin_id: &str) -> Result<f64> {
    let spin = state
        .spin(spin_id)
        .ok_or_else(|| FrameOrderError::UnknownDataId(spin_id.to_string()))?;
    let isotope = spin
        .isotope
        .as_deref()
        .ok_or_else(|| FrameOrderError::MissingIsotope(spin_id.to_string()))?;
    gyromagnetic_ratio(isotope)
}

pub fn minimise_setup_pcs(
    state: &AnalysisState,
    layout: &DataLayout,
    sim_index: Option<usize>,
) -> Result<PcsData> {
    if state.paramagnetic_centre.is_none() {
        return Err(FrameOrderError::NoParamagneticCentre);
    }
    let rows = layout.align_ids.len();
    let cols = layout.pcs_count();

    let mut values = DMatrix::from_element(rows, cols, f64::NAN);
    let mut errors = DMatrix::from_element(rows, cols, f64::NAN);
    let mut weights = DMatrix::from_element(rows, cols, 1.0);
    let mut temperatures = vec![f64::NAN; rows];
    let mut frequencies = vec![f64::NAN; rows];

    for (i, align_id) in layout.align_ids.iter().enumerate() {
        if !opt_uses_pcs(state, align_id) {
            continue;
        }
        temperatures[i] = *state
            .temperature
            .get(align_id)
            .ok_or_else(|| FrameOrderError::NoValue {
                kind: "temperature",
                align_id: align_id.clone(),
            })?;
        let frq = state
            .spectrometer_frq
            .get(align_id)
            .ok_or_else(|| FrameOrderError::NoValue {
                kind: "spectrometer frequency",
                align_id: align_id.clone(),
            })?;
        frequencies[i] = frequency_to_tesla(*frq);

        for (j, &index) in layout.spins.iter().enumerate() {
            let spin = &state.spins[index];
            values[(i, j)] = measured_value(&spin.pcs, &spin.pcs_sim, align_id, sim_index)? * PPM;
            if let Some(&error) = spin.pcs_err.get(align_id) {
                errors[(i, j)] = error * PPM;
            }
            if let Some(&weight) = spin.pcs_weight.get(align_id) {
                weights[(i, j)] = weight;
            }
        }
    }

    Ok(PcsData {
        values,
        errors,
        weights,
        temperatures,
        frequencies,
    })
}

/// Average position of a spin over all structural models.
fn average_position(spin: &SpinContainer) -> Vector3<f64> {
    let mut sum = Vector3::zeros();
    for pos in &spin.pos {
        sum += Vector3::from(*pos);
    }
    sum / spin.pos.len().max(1) as f64
}

pub fn minimise_setup_atomic_pos(
    state: &AnalysisState,
    layout: &DataLayout,
    sim_index: Option<usize>,
    warnings: &mut Vec<Warning>,
) -> AtomicPositions {
    let positions = layout
        .spins
        .iter()
        .map(|&index| {
            let spin = &state.spins[index];
            if spin.pos.len() > 1 {
                push_warning(
                    warnings,
                    Warning::AveragedPositions {
                        spin_id: spin.id.clone(),
                        count: spin.pos.len(),
                    },
                    sim_index.is_none(),
                );
            }
            average_position(spin)
        })
        .collect();

    AtomicPositions {
        positions,
        paramagnetic_centre: state
            .paramagnetic_centre
            .map(Vector3::from)
            .unwrap_or_else(Vector3::zeros),
    }
}

pub fn minimise_setup_tensors(state: &AnalysisState, layout: &DataLayout) -> Result<TensorData> {
    let reference = state
        .ref_domain
        .as_deref()
        .ok_or(FrameOrderError::NoReferenceDomain)?;
    if state.reductions.is_empty() {
        return Err(FrameOrderError::NoTensorReductions);
    }
    if let Some(tensor) = state.tensors.iter().find(|tensor| tensor.domain.is_none()) {
        return Err(FrameOrderError::MissingTensorDomain(tensor.name.clone()));
    }

    let mut data = TensorData {
        full: Vec::with_capacity(layout.align_ids.len()),
        full_errors: Vec::with_capacity(layout.align_ids.len()),
        full_in_ref_frame: Vec::with_capacity(layout.align_ids.len()),
        reduced: Vec::with_capacity(layout.align_ids.len()),
    };

    for align_id in &layout.align_ids {
        let (full, reduction) = state
            .reductions
            .iter()
            .find_map(|reduction| {
                state
                    .tensor(&reduction.full)
                    .filter(|tensor| &tensor.align_id == align_id)
                    .map(|tensor| (tensor, reduction))
            })
            .ok_or_else(|| FrameOrderError::MissingTensor(align_id.clone()))?;

        data.full.push(full.components);
        data.full_errors.push(full.errors.unwrap_or([1e-5; 5]));
        data.full_in_ref_frame
            .push(full.domain.as_deref() == Some(reference));
        data.reduced.push(reduction.reduced.clone());
    }

    Ok(data)
}
