//! The optimisation driver.
//!
//! Every entry point runs `setup -> (grid search | local minimisation) ->
//! unpack -> store`. The search itself only reads the analysis state, so a
//! failing call leaves the state untouched and independent simulations can
//! be searched in parallel before their results are committed one by one.

use crate::assembly::{
    minimise_setup_atomic_pos, minimise_setup_pcs, minimise_setup_rdcs, minimise_setup_tensors,
};
use crate::data::{base_data_types, moving_centre_of_mass, opt_uses_pcs, opt_uses_rdc, DataLayout, DataType};
use crate::error::{push_warning, FrameOrderError, Result, Warning};
use crate::geometry::wrap_angles;
use crate::grid::{build_grid, GridSearchRunner, GridSettings};
use crate::minimise::{is_constraint_method, Algorithm, MinimiseResult, MinimiseSettings, Tolerances};
use crate::model::{ModelKind, Param};
use crate::monte_carlo::base_data_loop;
use crate::order_parameters::iso_cone_s_to_theta;
use crate::parameters::{assemble_param_vector, assemble_scaling_matrix};
use crate::state::{AnalysisState, MinimisationStats};
use crate::target::integration::IntegrationMethod;
use crate::target::{BackCalculated, FrameOrderTarget, TargetData};
use nalgebra::Vector3;
use serde::Serialize;
use std::f64::consts::PI;

/// A target function instance together with the layout needed to store its results.
pub struct TargetSetup {
    pub target: FrameOrderTarget,
    pub layout: DataLayout,
    /// Names of the reduced tensors, one per alignment row.
    pub reduced_tensors: Vec<String>,
    /// Starting parameter vector in scaled units.
    pub initial: Vec<f64>,
    /// Diagonal of the scaling matrix.
    pub scaling: Vec<f64>,
    pub warnings: Vec<Warning>,
}

/// The outcome of one driver call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OptimisationReport {
    pub chi2: f64,
    /// False when a worse result than the stored one was discarded.
    pub stored: bool,
    pub warnings: Vec<Warning>,
}

/// A finished search which has not yet been written into the state.
pub struct Optimised {
    setup: TargetSetup,
    result: MinimiseResult,
    warnings: Vec<Warning>,
}

impl Optimised {
    pub fn result(&self) -> &MinimiseResult {
        &self.result
    }
}

pub enum Search<'a> {
    Grid(&'a GridSettings),
    Local(&'a MinimiseSettings),
}

fn check_chi2(chi2: f64) -> Result<()> {
    if chi2.is_infinite() {
        return Err(FrameOrderError::InfiniteChiSquared);
    }
    if chi2.is_nan() {
        return Err(FrameOrderError::NaNChiSquared);
    }
    Ok(())
}

fn integration_name(method: IntegrationMethod) -> &'static str {
    match method {
        IntegrationMethod::QuasiRandom => "Quasi-random Sobol' sequence",
        IntegrationMethod::Quadrature => "Gauss-Legendre quadrature",
    }
}

/// Assembles the data arrays and builds the target function.
pub fn target_fn_setup(
    state: &AnalysisState,
    sim_index: Option<usize>,
    scaling: bool,
) -> Result<TargetSetup> {
    let model = state.require_model()?;
    let verbose = sim_index.is_none();

    let data_types = base_data_types(state);
    if data_types.is_empty() {
        return Err(FrameOrderError::NoBaseData);
    }
    let layout = DataLayout::build(state, verbose);
    let mut warnings = layout.warnings.clone();

    let param_vector = assemble_param_vector(state, sim_index)?;
    let scaling: Vec<f64> = assemble_scaling_matrix(state, scaling)
        .diagonal()
        .iter()
        .copied()
        .collect();
    let initial = param_vector
        .iter()
        .zip(&scaling)
        .map(|(x, scale)| x / scale)
        .collect();

    let fixed = *state.values_for(sim_index)?;
    if model != ModelKind::Rigid && fixed.pivot().is_none() {
        return Err(FrameOrderError::NoPivot);
    }

    let tensors = minimise_setup_tensors(state, &layout)?;

    let rdcs = if data_types.contains(&DataType::Rdc) {
        if layout.interatoms.is_empty() {
            return Err(FrameOrderError::NoRdcData);
        }
        Some(minimise_setup_rdcs(state, &layout, sim_index, &mut warnings)?)
    } else {
        None
    };

    let (pcs, atoms, com) = if data_types.contains(&DataType::Pcs) {
        if layout.spins.is_empty() {
            return Err(FrameOrderError::NoPcsData);
        }
        let pcs = minimise_setup_pcs(state, &layout, sim_index)?;
        let atoms = minimise_setup_atomic_pos(state, &layout, sim_index, &mut warnings);
        let com = moving_centre_of_mass(state)?;
        (Some(pcs), Some(atoms), Vector3::from(com))
    } else {
        (None, None, Vector3::zeros())
    };

    if verbose {
        log::info!(
            "The average domain rotation centroid, taken as the CoM of the atoms defined as the moving domain, is: [{}, {}, {}]",
            com.x,
            com.y,
            com.z
        );
        if model != ModelKind::Rigid {
            log::info!("Numerical integration: {}.", integration_name(state.integration.method));
            log::info!("Number of integration points: {}", state.integration.num_int_pts);
        }
        let base_data: Vec<&str> = [(rdcs.is_some(), "RDCs"), (pcs.is_some(), "PCSs")]
            .into_iter()
            .filter_map(|(present, name)| present.then_some(name))
            .collect();
        log::info!("Base data: {:?}", base_data);
    }

    let reduced_tensors = tensors.reduced.clone();
    let target = FrameOrderTarget::new(TargetData {
        model,
        params: state.params.clone(),
        fixed,
        scaling: scaling.clone(),
        tensors,
        rdcs,
        pcs,
        atoms,
        ave_pos_pivot: state.ave_pos_pivot,
        com,
        integration: state.integration,
    })?;

    Ok(TargetSetup {
        target,
        layout,
        reduced_tensors,
        initial,
        scaling,
        warnings,
    })
}

/// Chi-squared and back-calculated data for the current parameter values.
pub fn calculate(state: &mut AnalysisState, sim_index: Option<usize>) -> Result<OptimisationReport> {
    let mut setup = target_fn_setup(state, sim_index, true)?;
    let chi2 = setup.target.func(&setup.initial);
    check_chi2(chi2)?;

    match sim_index {
        None => {
            state.stats.get_or_insert_with(MinimisationStats::default).chi2 = chi2;
            store_bc_data(state, &setup.layout, &setup.reduced_tensors, setup.target.back_calc());
            log::info!("Chi2: {}", chi2);
        }
        Some(index) => {
            let stats = state
                .simulations_mut()?
                .stats
                .as_mut()
                .ok_or(FrameOrderError::NoSimulations)?;
            stats[index].chi2 = chi2;
        }
    }

    Ok(OptimisationReport {
        chi2,
        stored: true,
        warnings: setup.warnings,
    })
}

/// The local minimisation algorithm, with constraint requests downgraded.
fn resolve_algorithm(
    settings: &MinimiseSettings,
    warnings: &mut Vec<Warning>,
    verbose: bool,
) -> Result<Algorithm> {
    let mut name = settings.algorithm.as_str();
    let mut constrained = settings.constraints;
    if is_constraint_method(name) {
        constrained = true;
        name = settings
            .min_options
            .first()
            .map(String::as_str)
            .unwrap_or("simplex");
    }
    if constrained {
        push_warning(warnings, Warning::ConstraintsDisabled, verbose);
    }
    name.parse()
}

/// Runs a grid search or a local minimisation without touching the state.
pub fn optimise(state: &AnalysisState, search: Search, sim_index: Option<usize>) -> Result<Optimised> {
    state.require_model()?;
    let verbose = sim_index.is_none();
    let mut warnings = Vec::new();

    let (mut setup, result) = match search {
        Search::Grid(settings) => {
            if settings.constraints {
                push_warning(&mut warnings, Warning::ConstraintsDisabled, verbose);
            }
            let mut setup = target_fn_setup(state, sim_index, true)?;
            let space = build_grid(state, settings, &setup.scaling, sim_index)?;
            if verbose {
                log::info!("Grid search over {} points.", space.total_points());
            }
            let target = &mut setup.target;
            let best = GridSearchRunner::new(space, |x: &[f64]| target.func(x))
                .run_to_completion()
                .ok_or_else(|| FrameOrderError::InvalidSettings("the grid contains no points.".to_string()))?;
            (setup, MinimiseResult::from(best))
        }
        Search::Local(settings) => {
            let algorithm = resolve_algorithm(settings, &mut warnings, verbose)?;
            let mut setup = target_fn_setup(state, sim_index, settings.scaling)?;
            let x0 = setup.initial.clone();
            let target = &mut setup.target;
            let mut objective = |x: &[f64]| target.func(x);
            let result = algorithm
                .minimiser()
                .minimise(&mut objective, &x0, Tolerances::from(settings));
            (setup, result)
        }
    };

    check_chi2(result.chi2)?;
    // Leave the back-calculated data at the final point.
    setup.target.func(&result.params);
    warnings.append(&mut setup.warnings);

    Ok(Optimised {
        setup,
        result,
        warnings,
    })
}

/// Writes a finished search into the state. Outside of simulations, a result
/// worse than the stored chi-squared is discarded.
pub fn commit(
    state: &mut AnalysisState,
    optimised: Optimised,
    sim_index: Option<usize>,
) -> Result<OptimisationReport> {
    let Optimised {
        setup,
        result,
        warnings,
    } = optimised;

    match sim_index {
        Some(index) => log::debug!("Simulation {}", index + 1),
        None => match state.stats.as_ref().map(|stats| stats.chi2) {
            Some(current) if result.chi2 > current => {
                log::info!(
                    "Discarding the optimisation results, the optimised chi-squared value is higher than the current value ({} > {}).",
                    result.chi2,
                    current
                );
                return Ok(OptimisationReport {
                    chi2: result.chi2,
                    stored: false,
                    warnings,
                });
            }
            Some(current) => log::info!(
                "Storing the optimisation results, the optimised chi-squared value is lower than the current value ({} < {}).",
                result.chi2,
                current
            ),
            None => log::info!("Storing the optimisation results, no optimised values currently exist."),
        },
    }

    unpack_opt_results(state, &result, &setup.scaling, sim_index)?;
    if sim_index.is_none() {
        store_bc_data(state, &setup.layout, &setup.reduced_tensors, setup.target.back_calc());
    }

    Ok(OptimisationReport {
        chi2: result.chi2,
        stored: true,
        warnings,
    })
}

pub fn grid_search(
    state: &mut AnalysisState,
    settings: &GridSettings,
    sim_index: Option<usize>,
) -> Result<OptimisationReport> {
    let optimised = optimise(state, Search::Grid(settings), sim_index)?;
    commit(state, optimised, sim_index)
}

pub fn minimise(
    state: &mut AnalysisState,
    settings: &MinimiseSettings,
    sim_index: Option<usize>,
) -> Result<OptimisationReport> {
    let optimised = optimise(state, Search::Local(settings), sim_index)?;
    commit(state, optimised, sim_index)
}

/// Stores a scaled parameter vector and the optimisation statistics.
///
/// Angles are wrapped into `[0, 2pi)`, or for simulations into a window of
/// `2pi` centred on the best-fit value.
pub fn unpack_opt_results(
    state: &mut AnalysisState,
    result: &MinimiseResult,
    scaling: &[f64],
    sim_index: Option<usize>,
) -> Result<()> {
    check_chi2(result.chi2)?;
    let n = state.params.len();
    if result.params.len() != n || scaling.len() != n {
        return Err(FrameOrderError::ParamVectorLength {
            expected: n,
            got: result.params.len(),
        });
    }

    let mut values = *state.values_for(sim_index)?;
    for ((&param, &x), &scale) in state.params.iter().zip(&result.params).zip(scaling) {
        let mut value = x * scale;
        if param.is_wrapped_angle() {
            value = match sim_index {
                None => wrap_angles(value, 0.0, 2.0 * PI, 2.0 * PI)?,
                Some(_) => {
                    let best = state.values.or_zero(param);
                    wrap_angles(value, best - PI, best + PI, 2.0 * PI)?
                }
            };
        }
        values.set(param, value);
        if param == Param::ConeS1 {
            values.set(Param::ConeTheta, iso_cone_s_to_theta(value));
        }
    }

    let stats = MinimisationStats {
        chi2: result.chi2,
        iter: result.iterations,
        f_count: result.f_count,
        g_count: result.g_count,
        h_count: result.h_count,
        warning: result.warning.clone(),
    };

    match sim_index {
        None => {
            state.values = values;
            state.stats = Some(stats);
        }
        Some(index) => {
            let sims = state.simulations_mut()?;
            match (sims.values.as_mut(), sims.stats.as_mut()) {
                (Some(sim_values), Some(sim_stats)) => {
                    sim_values[index] = values;
                    sim_stats[index] = stats;
                }
                _ => return Err(FrameOrderError::NoSimulations),
            }
        }
    }
    Ok(())
}

/// Writes the back-calculated tensors, RDCs and PCSs (in ppm) into the state.
pub fn store_bc_data(
    state: &mut AnalysisState,
    layout: &DataLayout,
    reduced_tensors: &[String],
    back_calc: &BackCalculated,
) {
    for (name, components) in reduced_tensors.iter().zip(&back_calc.tensors) {
        if let Some(tensor) = state.tensors.iter_mut().find(|tensor| &tensor.name == name) {
            tensor.bc = Some(*components);
        }
    }

    for (row, align_id) in layout.align_ids.iter().enumerate() {
        if opt_uses_rdc(state, align_id) {
            for (col, &index) in layout.interatoms.iter().enumerate() {
                if col < back_calc.rdc.ncols() {
                    state.interatoms[index]
                        .rdc_bc
                        .insert(align_id.clone(), back_calc.rdc[(row, col)]);
                }
            }
        }
        if opt_uses_pcs(state, align_id) {
            for (col, &index) in layout.spins.iter().enumerate() {
                let spin = &mut state.spins[index];
                if col < back_calc.pcs.ncols() && spin.pcs.contains_key(align_id) {
                    spin.pcs_bc
                        .insert(align_id.clone(), back_calc.pcs[(row, col)] * 1e6);
                }
            }
        }
    }
}

/// The number of parameters, the number of base data points and the chi-squared value.
pub fn model_statistics(state: &AnalysisState) -> Result<(usize, usize, f64)> {
    let k = state.params.len();
    let n = base_data_loop(state).count();
    let chi2 = state
        .stats
        .as_ref()
        .map(|stats| stats.chi2)
        .ok_or(FrameOrderError::NoStatistics)?;
    Ok((k, n, chi2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{select_model, set_pivot};
    use crate::state::{AlignTensor, SpinContainer};

    fn state_with_pcs() -> AnalysisState {
        let mut state = AnalysisState::new();
        for (name, domain) in [("N", "N"), ("C", "C")] {
            state.tensors.push(AlignTensor {
                name: name.to_string(),
                align_id: "dy".to_string(),
                domain: Some(domain.to_string()),
                ..AlignTensor::default()
            });
        }
        state.ref_domain = Some("N".to_string());
        let mut spin = SpinContainer {
            id: ":5@H".to_string(),
            select: true,
            domain: Some("C".to_string()),
            isotope: Some("1H".to_string()),
            pos: vec![[1.0, 2.0, 3.0]],
            ..SpinContainer::default()
        };
        spin.pcs.insert("dy".to_string(), 0.3);
        state.spins.push(spin);
        state.register_pcs_id("dy");
        state
    }

    fn result_for(params: Vec<f64>, chi2: f64) -> MinimiseResult {
        MinimiseResult {
            params,
            chi2,
            iterations: 7,
            f_count: 20,
            g_count: 3,
            h_count: 0,
            warning: None,
        }
    }

    #[test]
    fn unpacking_an_assembled_vector_restores_every_model() {
        let mut state = state_with_pcs();
        for model in ModelKind::ALL {
            for (fixed, translation) in [(true, false), (false, false), (true, true), (false, true)] {
                state.pivot_fixed = fixed;
                state.translation = translation;
                select_model(&mut state, model.name()).unwrap();
                set_pivot(&mut state, [10.0, -20.0, 30.0], fixed).unwrap();
                for (i, &param) in state.params.iter().enumerate() {
                    let value = match param {
                        Param::ConeS1 => 0.6,
                        _ => 0.2 + 0.3 * i as f64,
                    };
                    state.values.set(param, value);
                }
                let before = state.values;

                let scaling: Vec<f64> = assemble_scaling_matrix(&state, true).diagonal().iter().copied().collect();
                let scaled: Vec<f64> = assemble_param_vector(&state, None)
                    .unwrap()
                    .iter()
                    .zip(&scaling)
                    .map(|(x, s)| x / s)
                    .collect();
                unpack_opt_results(&mut state, &result_for(scaled, 1.0), &scaling, None).unwrap();

                for &param in &state.params {
                    let (a, b) = (before.or_zero(param), state.values.or_zero(param));
                    assert!((a - b).abs() < 1e-12, "{} {}: {} != {}", model, param, a, b);
                }
                if model == ModelKind::IsoConeFreeRotor {
                    let theta = state.values.get(Param::ConeTheta).unwrap();
                    assert!((theta - iso_cone_s_to_theta(0.6)).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn angles_are_wrapped_on_unpacking() {
        let mut state = AnalysisState::new();
        select_model(&mut state, "rigid").unwrap();
        let result = result_for(vec![-0.5, 7.0, 2.0 * PI], 2.0);
        unpack_opt_results(&mut state, &result, &[1.0; 3], None).unwrap();
        assert!((state.values.or_zero(Param::AvePosAlpha) - (2.0 * PI - 0.5)).abs() < 1e-12);
        assert!((state.values.or_zero(Param::AvePosBeta) - (7.0 - 2.0 * PI)).abs() < 1e-12);
        assert!(state.values.or_zero(Param::AvePosGamma).abs() < 1e-12);
        let stats = state.stats.as_ref().unwrap();
        assert_eq!((stats.chi2, stats.iter, stats.f_count, stats.g_count), (2.0, 7, 20, 3));
    }

    #[test]
    fn simulation_angles_are_wrapped_around_the_best_fit() {
        let mut state = AnalysisState::new();
        select_model(&mut state, "rigid").unwrap();
        state.values.set(Param::AvePosAlpha, 0.1);
        crate::monte_carlo::monte_carlo_setup(&mut state, 2).unwrap();
        crate::monte_carlo::sim_init_values(&mut state).unwrap();

        let result = result_for(vec![-0.3, 0.0, 0.0], 1.5);
        unpack_opt_results(&mut state, &result, &[1.0; 3], Some(1)).unwrap();
        let sims = state.sims.as_ref().unwrap();
        let alpha = sims.values.as_ref().unwrap()[1].or_zero(Param::AvePosAlpha);
        assert!((alpha + 0.3).abs() < 1e-12);
        assert_eq!(sims.stats.as_ref().unwrap()[1].chi2, 1.5);
        assert!(state.stats.is_none());
    }

    #[test]
    fn non_finite_chi_squared_leaves_the_state_untouched() {
        let mut state = AnalysisState::new();
        select_model(&mut state, "rigid").unwrap();
        let before = state.values;
        let result = unpack_opt_results(&mut state, &result_for(vec![1.0; 3], f64::NAN), &[1.0; 3], None);
        assert!(matches!(result, Err(FrameOrderError::NaNChiSquared)));
        let result = unpack_opt_results(&mut state, &result_for(vec![1.0; 3], f64::INFINITY), &[1.0; 3], None);
        assert!(matches!(result, Err(FrameOrderError::InfiniteChiSquared)));
        assert_eq!(state.values, before);
        assert!(state.stats.is_none());
    }

    #[test]
    fn constraint_requests_are_downgraded() {
        let settings = MinimiseSettings {
            algorithm: "Log barrier".to_string(),
            min_options: vec!["bfgs".to_string()],
            ..MinimiseSettings::default()
        };
        let mut warnings = Vec::new();
        assert_eq!(resolve_algorithm(&settings, &mut warnings, true).unwrap(), Algorithm::Bfgs);
        assert_eq!(warnings, vec![Warning::ConstraintsDisabled]);

        let settings = MinimiseSettings {
            constraints: true,
            ..MinimiseSettings::default()
        };
        let mut warnings = Vec::new();
        assert_eq!(resolve_algorithm(&settings, &mut warnings, false).unwrap(), Algorithm::Simplex);
        assert_eq!(warnings.len(), 1);

        let mut warnings = Vec::new();
        let settings = MinimiseSettings::default();
        resolve_algorithm(&settings, &mut warnings, true).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn setup_requires_a_model_and_base_data() {
        let mut state = AnalysisState::new();
        assert!(matches!(
            target_fn_setup(&state, None, true).err(),
            Some(FrameOrderError::NoModel)
        ));
        select_model(&mut state, "rotor").unwrap();
        assert!(matches!(
            target_fn_setup(&state, None, true).err(),
            Some(FrameOrderError::NoBaseData)
        ));
    }

    #[test]
    fn missing_pivot_is_fatal_for_moving_models() {
        let mut state = state_with_pcs();
        select_model(&mut state, "rotor").unwrap();
        assert!(matches!(
            target_fn_setup(&state, None, true).err(),
            Some(FrameOrderError::NoPivot)
        ));
    }

    #[test]
    fn statistics_require_an_optimisation() {
        let mut state = state_with_pcs();
        select_model(&mut state, "rigid").unwrap();
        assert!(matches!(model_statistics(&state), Err(FrameOrderError::NoStatistics)));
        state.stats = Some(MinimisationStats {
            chi2: 3.0,
            ..MinimisationStats::default()
        });
        assert_eq!(model_statistics(&state).unwrap(), (3, 1, 3.0));
    }
}
