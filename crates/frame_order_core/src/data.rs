//! Data availability rules and the single iteration order over the measured data.

use crate::constants::isotope_mass;
use crate::error::{push_warning, FrameOrderError, Result, Warning};
use crate::model::ModelKind;
use crate::state::AnalysisState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Rdc,
    Pcs,
}

/// The base data present for the moving domain.
pub fn base_data_types(state: &AnalysisState) -> Vec<DataType> {
    let mut types = Vec::with_capacity(2);

    let has_rdc = state.interatoms.iter().any(|interatom| {
        !interatom.rdc.is_empty()
            && state
                .spin(&interatom.spin_id1)
                .map(|spin| state.is_moving(spin))
                .unwrap_or(false)
    });
    if has_rdc {
        types.push(DataType::Rdc);
    }

    let has_pcs = state
        .spins
        .iter()
        .any(|spin| !spin.pcs.is_empty() && state.is_moving(spin));
    if has_pcs {
        types.push(DataType::Pcs);
    }

    types
}

/// The pivot is fixed unless the model moves a domain, PCS data can locate
/// it and it has explicitly been released.
pub fn pivot_fixed(state: &AnalysisState) -> bool {
    match state.model {
        Some(ModelKind::Rigid) | None => true,
        Some(_) => state.pivot_fixed || !base_data_types(state).contains(&DataType::Pcs),
    }
}

/// Translation is only optimised when requested and PCS data is present.
pub fn translation_fixed(state: &AnalysisState) -> bool {
    !(state.translation && base_data_types(state).contains(&DataType::Pcs))
}

pub fn opt_uses_rdc(state: &AnalysisState, align_id: &str) -> bool {
    state.rdc_ids.iter().any(|id| id == align_id)
}

pub fn opt_uses_pcs(state: &AnalysisState, align_id: &str) -> bool {
    state.pcs_ids.iter().any(|id| id == align_id)
}

/// True if the RDC or PCS data of the alignment, or of any alignment when
/// `align_id` is `None`, is used for optimisation.
pub fn opt_uses_align_data(state: &AnalysisState, align_id: Option<&str>) -> bool {
    match align_id {
        Some(id) => opt_uses_rdc(state, id) || opt_uses_pcs(state, id),
        None => state
            .align_ids
            .iter()
            .any(|id| opt_uses_rdc(state, id) || opt_uses_pcs(state, id)),
    }
}

/// The fixed iteration order over alignments, interatomic pairs and spins,
/// established once per calculation.
#[derive(Debug, Clone, Default)]
pub struct DataLayout {
    pub align_ids: Vec<String>,
    /// Indices into `AnalysisState::interatoms` of the RDC pairs.
    pub interatoms: Vec<usize>,
    /// Indices into `AnalysisState::spins` of the PCS spins.
    pub spins: Vec<usize>,
    pub warnings: Vec<Warning>,
}

impl DataLayout {
    /// `verbose` is false for simulations, where warnings are only logged at debug level.
    pub fn build(state: &AnalysisState, verbose: bool) -> DataLayout {
        let mut layout = DataLayout {
            align_ids: state
                .align_ids
                .iter()
                .filter(|id| opt_uses_align_data(state, Some(id.as_str())))
                .cloned()
                .collect(),
            ..DataLayout::default()
        };

        for (index, interatom) in state.interatoms.iter().enumerate() {
            if !interatom.select || interatom.rdc.is_empty() {
                continue;
            }
            let Some(spin1) = state.spin(&interatom.spin_id1) else {
                continue;
            };
            if !state.is_moving(spin1) {
                continue;
            }
            if interatom.vector.is_empty() {
                push_warning(
                    &mut layout.warnings,
                    Warning::MissingVector {
                        spin_id1: interatom.spin_id1.clone(),
                        spin_id2: interatom.spin_id2.clone(),
                    },
                    verbose,
                );
                continue;
            }

            let pseudo = [&interatom.spin_id1, &interatom.spin_id2]
                .into_iter()
                .filter_map(|id| state.spin(id))
                .find_map(|spin| {
                    spin.members
                        .as_ref()
                        .filter(|members| members.len() != 3)
                        .map(|members| (spin.id.clone(), members.len()))
                });
            if let Some((spin_id, members)) = pseudo {
                push_warning(
                    &mut layout.warnings,
                    Warning::PseudoAtom { spin_id, members },
                    verbose,
                );
                continue;
            }

            layout.interatoms.push(index);
        }

        for (index, spin) in state.spins.iter().enumerate() {
            if !spin.select || spin.pcs.is_empty() || !state.is_moving(spin) {
                continue;
            }
            if spin.pos.is_empty() {
                push_warning(
                    &mut layout.warnings,
                    Warning::MissingPosition {
                        spin_id: spin.id.clone(),
                    },
                    verbose,
                );
                continue;
            }
            layout.spins.push(index);
        }

        layout
    }

    pub fn rdc_count(&self) -> usize {
        self.interatoms.len()
    }

    pub fn pcs_count(&self) -> usize {
        self.spins.len()
    }
}

/// Mass-weighted centre of the moving domain spin positions.
///
/// Spins without positions are ignored; the origin is returned when no
/// positions exist.
pub fn moving_centre_of_mass(state: &AnalysisState) -> Result<[f64; 3]> {
    let mut total_mass = 0.0;
    let mut centre = [0.0; 3];

    for spin in state.spins.iter().filter(|spin| state.is_moving(spin)) {
        if spin.pos.is_empty() {
            continue;
        }
        let isotope = spin
            .isotope
            .as_deref()
            .ok_or_else(|| FrameOrderError::MissingIsotope(spin.id.clone()))?;
        let mass = isotope_mass(isotope)?;
        for pos in &spin.pos {
            for (c, x) in centre.iter_mut().zip(pos) {
                *c += mass * x;
            }
            total_mass += mass;
        }
    }

    if total_mass == 0.0 {
        return Ok([0.0; 3]);
    }
    Ok(centre.map(|c| c / total_mass))
}
