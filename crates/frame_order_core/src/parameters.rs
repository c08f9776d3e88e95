//! Model selection and the parameter vector assembled from the analysis state.

use crate::data::{pivot_fixed, translation_fixed};
use crate::error::{FrameOrderError, Result};
use crate::model::{ConeKind, EigenFrameKind, ModelKind, Param, TorsionKind};
use crate::order_parameters::iso_cone_s_to_theta;
use crate::state::{AnalysisState, AveragePositionPivot};
use crate::target::integration::IntegrationSettings;
use nalgebra::{DMatrix, DVector};

/// Scaling factor applied to the pivot coordinates during optimisation.
pub const PIVOT_SCALE: f64 = 1e2;

/// Selects the model by name, discarding the previous parameter list.
pub fn select_model(state: &mut AnalysisState, name: &str) -> Result<()> {
    let model: ModelKind = name.parse()?;
    state.model = Some(model);
    state.params.clear();
    state.stats = None;
    log::info!("Frame order model set to '{}'.", model);
    update_model(state)
}

/// Rebuilds the ordered parameter list and back-fills missing values with zero.
pub fn update_model(state: &mut AnalysisState) -> Result<()> {
    let model = state.require_model()?;
    state.params = model.param_list(pivot_fixed(state), translation_fixed(state));

    for &param in &state.params {
        if !param.is_pivot() && state.values.get(param).is_none() {
            state.values.set(param, 0.0);
        }
    }
    if model == ModelKind::IsoConeFreeRotor {
        if let Some(s1) = state.values.get(Param::ConeS1) {
            state.values.set(Param::ConeTheta, iso_cone_s_to_theta(s1));
        }
    }
    Ok(())
}

/// The number of optimised parameters, counted from the model description.
pub fn param_num(state: &AnalysisState) -> Result<usize> {
    let model = state.require_model()?;
    let mut num = 0;
    if !pivot_fixed(state) {
        num += 3;
    }
    if !translation_fixed(state) {
        num += 3;
    }
    num += if model.has_reduced_average_position() { 2 } else { 3 };
    num += match model.eigenframe() {
        EigenFrameKind::Euler => 3,
        EigenFrameKind::Axis => 2,
        EigenFrameKind::None => 0,
    };
    num += match model.cone() {
        ConeKind::Ellipse => 2,
        ConeKind::Theta | ConeKind::OrderParameter => 1,
        ConeKind::None => 0,
    };
    if model.torsion() == TorsionKind::Restricted {
        num += 1;
    }
    Ok(num)
}

/// The parameter values of the current state, or of one simulation, in the
/// order of `state.params`.
pub fn assemble_param_vector(state: &AnalysisState, sim_index: Option<usize>) -> Result<DVector<f64>> {
    state.require_model()?;
    let values = state.values_for(sim_index)?;
    let mut vector = DVector::zeros(state.params.len());
    for (i, &param) in state.params.iter().enumerate() {
        vector[i] = match values.get(param) {
            Some(value) => value,
            None if param.is_pivot() => return Err(FrameOrderError::NoPivot),
            None => return Err(FrameOrderError::MissingParameter(param.name().to_string())),
        };
    }
    Ok(vector)
}

/// Diagonal scaling matrix; the pivot coordinates are scaled when `scaling` is set.
pub fn assemble_scaling_matrix(state: &AnalysisState, scaling: bool) -> DMatrix<f64> {
    let n = state.params.len();
    let mut matrix = DMatrix::identity(n, n);
    if scaling {
        for (i, param) in state.params.iter().enumerate() {
            if param.is_pivot() {
                matrix[(i, i)] = PIVOT_SCALE;
            }
        }
    }
    matrix
}

/// The optimised parameters followed by any derived parameters.
pub fn get_param_names(state: &AnalysisState) -> Result<Vec<Param>> {
    let model = state.require_model()?;
    let mut names = state.params.clone();
    names.extend_from_slice(model.derived_params());
    Ok(names)
}

pub fn get_param_values(state: &AnalysisState, sim_index: Option<usize>) -> Result<Vec<(Param, f64)>> {
    let values = state.values_for(sim_index)?;
    get_param_names(state)?
        .into_iter()
        .map(|param| Ok((param, values.require(param)?)))
        .collect()
}

/// Display bounds of one parameter for chi-squared space mapping.
pub fn map_bounds(state: &AnalysisState, param: Param) -> [f64; 2] {
    param.map_bounds(state.values.or_zero(param))
}

pub fn set_pivot(state: &mut AnalysisState, pivot: [f64; 3], fix: bool) -> Result<()> {
    state.values.set(Param::PivotX, pivot[0]);
    state.values.set(Param::PivotY, pivot[1]);
    state.values.set(Param::PivotZ, pivot[2]);
    state.pivot_fixed = fix;
    if state.model.is_some() {
        update_model(state)?;
    }
    Ok(())
}

pub fn set_average_position(
    state: &mut AnalysisState,
    pivot: &str,
    translation: bool,
) -> Result<()> {
    state.ave_pos_pivot = match pivot {
        "com" => AveragePositionPivot::Com,
        "motional" => AveragePositionPivot::Motional,
        other => return Err(FrameOrderError::InvalidPivotKeyword(other.to_string())),
    };
    state.translation = translation;
    if state.model.is_some() {
        update_model(state)?;
    }
    Ok(())
}

pub fn set_ref_domain(state: &mut AnalysisState, domain: &str) -> Result<()> {
    state.require_model()?;
    let exists = state
        .tensors
        .iter()
        .any(|tensor| tensor.domain.as_deref() == Some(domain));
    if !exists {
        return Err(FrameOrderError::UnknownReferenceDomain(domain.to_string()));
    }
    state.ref_domain = Some(domain.to_string());
    update_model(state)
}

pub fn set_integration(state: &mut AnalysisState, settings: IntegrationSettings) -> Result<()> {
    if settings.num_int_pts == 0 {
        return Err(FrameOrderError::InvalidSettings(
            "num_int_pts must be greater than zero.".to_string(),
        ));
    }
    state.integration = settings;
    Ok(())
}
