mod common;

use common::{
    adopt_back_calculated_pcs, angle_difference, pcs_state, rigid_rdc_state, ALIGNMENTS, PAIRS,
};
use frame_order_core::grid::{GridSettings, Increments};
use frame_order_core::minimise::MinimiseSettings;
use frame_order_core::monte_carlo::{run_monte_carlo, McMethod, McSettings};
use frame_order_core::optimisation::{calculate, grid_search, minimise, model_statistics};
use frame_order_core::geometry::axis_frame;
use frame_order_core::parameters::{
    assemble_scaling_matrix, select_model, set_average_position, set_pivot, PIVOT_SCALE,
};
use frame_order_core::target::integration::{IntegrationMethod, IntegrationSettings};
use frame_order_core::{FrameOrderError, Param};
use rand::SeedableRng;
use nalgebra::Vector3;
use rand_chacha::ChaCha8Rng;

const TRUE_ANGLES: [f64; 3] = [0.7, 1.2, 2.3];

fn rigid_state_at(angles: [f64; 3]) -> frame_order_core::AnalysisState {
    let mut state = rigid_rdc_state(TRUE_ANGLES[0], TRUE_ANGLES[1], TRUE_ANGLES[2]);
    select_model(&mut state, "rigid").unwrap();
    state.values.set(Param::AvePosAlpha, angles[0]);
    state.values.set(Param::AvePosBeta, angles[1]);
    state.values.set(Param::AvePosGamma, angles[2]);
    state
}

fn bfgs() -> MinimiseSettings {
    MinimiseSettings {
        algorithm: "BFGS".to_string(),
        max_iterations: 2000,
        ..MinimiseSettings::default()
    }
}

#[test]
fn calculate_vanishes_at_the_true_rotation() {
    let mut state = rigid_state_at(TRUE_ANGLES);
    let report = calculate(&mut state, None).unwrap();
    assert!(report.chi2 < 1e-6, "chi2 = {}", report.chi2);
    assert!(report.warnings.is_empty());

    let (k, n, chi2) = model_statistics(&state).unwrap();
    assert_eq!((k, n), (3, PAIRS * ALIGNMENTS.len()));
    assert_eq!(chi2, report.chi2);

    for interatom in &state.interatoms {
        for (align_id, _) in ALIGNMENTS {
            let measured = interatom.rdc[align_id];
            let back_calc = interatom.rdc_bc[align_id];
            assert!((measured - back_calc).abs() < 1e-8, "{} != {}", measured, back_calc);
        }
    }
    let reduced = state.tensor("dy red").unwrap();
    assert!(reduced.bc.is_some());
}

#[test]
fn calculate_away_from_the_minimum_is_positive() {
    let mut state = rigid_state_at([0.8, 1.2, 2.3]);
    let report = calculate(&mut state, None).unwrap();
    assert!(report.chi2 > 1.0);
}

#[test]
fn bfgs_recovers_the_rotation() {
    let mut state = rigid_state_at([0.65, 1.26, 2.25]);
    let report = minimise(&mut state, &bfgs(), None).unwrap();
    assert!(report.stored);
    assert!(report.chi2 < 1e-4, "chi2 = {}", report.chi2);

    for (param, expected) in [Param::AvePosAlpha, Param::AvePosBeta, Param::AvePosGamma]
        .into_iter()
        .zip(TRUE_ANGLES)
    {
        let value = state.values.get(param).unwrap();
        assert!(angle_difference(value, expected) < 1e-3, "{} = {}", param, value);
    }
    let stats = state.stats.as_ref().unwrap();
    assert!(stats.iter > 0);
    assert!(stats.g_count > 0);
}

#[test]
fn simplex_lowers_the_chi_squared() {
    let mut state = rigid_state_at([0.6, 1.3, 2.2]);
    let start = calculate(&mut state, None).unwrap().chi2;
    let settings = MinimiseSettings {
        max_iterations: 500,
        ..MinimiseSettings::default()
    };
    let report = minimise(&mut state, &settings, None).unwrap();
    assert!(report.chi2 < start);
    assert_eq!(state.stats.as_ref().unwrap().g_count, 0);
}

#[test]
fn grid_search_then_minimise() {
    let mut state = rigid_state_at([0.0, 0.0, 0.0]);
    let settings = GridSettings {
        increments: Increments::All(8),
        ..GridSettings::default()
    };
    let grid = grid_search(&mut state, &settings, None).unwrap();
    assert!(grid.stored);
    let stats = state.stats.clone().unwrap();
    // 8 alpha x 4 beta x 8 gamma points.
    assert_eq!(stats.f_count, 256);
    assert_eq!(stats.iter, 256);
    assert_eq!(stats.g_count, 0);

    let local = minimise(&mut state, &bfgs(), None).unwrap();
    assert!(local.chi2 <= grid.chi2 + 1e-9);
}

#[test]
fn worse_results_are_discarded() {
    let mut state = rigid_state_at(TRUE_ANGLES);
    calculate(&mut state, None).unwrap();
    let settings = GridSettings {
        increments: Increments::All(3),
        ..GridSettings::default()
    };
    let report = grid_search(&mut state, &settings, None).unwrap();
    assert!(!report.stored);
    assert_eq!(state.values.get(Param::AvePosAlpha), Some(TRUE_ANGLES[0]));
}

#[test]
fn oversized_grid_is_rejected() {
    let mut state = rigid_state_at(TRUE_ANGLES);
    let settings = GridSettings {
        increments: Increments::All(1000),
        ..GridSettings::default()
    };
    assert!(matches!(
        grid_search(&mut state, &settings, None),
        Err(FrameOrderError::GridTooLarge { .. })
    ));
    assert!(state.stats.is_none());
}

#[test]
fn monte_carlo_errors_are_small_and_reproducible() {
    let run = || {
        let mut state = rigid_state_at(TRUE_ANGLES);
        calculate(&mut state, None).unwrap();
        let mc = McSettings {
            number: 6,
            method: McMethod::BackCalc,
            seed: 11,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(mc.seed);
        let reports = run_monte_carlo(&mut state, &mc, &bfgs(), &mut rng).unwrap();
        assert_eq!(reports.len(), 6);
        state
    };

    let state = run();
    for param in [Param::AvePosAlpha, Param::AvePosBeta, Param::AvePosGamma] {
        let error = state.errors.get(param).unwrap();
        assert!(error > 0.0 && error < 0.2, "{} error = {}", param, error);
    }
    // The best-fit values are not touched by the simulations.
    assert_eq!(state.values.get(Param::AvePosBeta), Some(TRUE_ANGLES[1]));

    let again = run();
    assert_eq!(again.errors, state.errors);
}

#[test]
fn rotor_without_torsion_matches_the_rigid_pcs() {
    let angles = [0.3, 0.9, -1.1];
    let mut rigid = pcs_state();
    select_model(&mut rigid, "rigid").unwrap();
    let mut rotor = pcs_state();
    select_model(&mut rotor, "rotor").unwrap();
    set_pivot(&mut rotor, [10.0, -2.0, 14.0], true).unwrap();
    rotor.integration = IntegrationSettings {
        num_int_pts: 500,
        method: IntegrationMethod::Quadrature,
    };
    for state in [&mut rigid, &mut rotor] {
        state.values.set(Param::AvePosAlpha, angles[0]);
        state.values.set(Param::AvePosBeta, angles[1]);
        state.values.set(Param::AvePosGamma, angles[2]);
    }
    rotor.values.set(Param::AxisTheta, 0.4);
    rotor.values.set(Param::AxisPhi, 1.9);
    rotor.values.set(Param::ConeSigmaMax, 0.0);

    let rigid_chi2 = calculate(&mut rigid, None).unwrap().chi2;
    let rotor_chi2 = calculate(&mut rotor, None).unwrap().chi2;
    assert!((rigid_chi2 - rotor_chi2).abs() <= 1e-9 * rigid_chi2.max(1.0));

    for (a, b) in rigid.spins.iter().zip(&rotor.spins) {
        for (align_id, value) in &a.pcs_bc {
            assert!((value - b.pcs_bc[align_id]).abs() < 1e-9);
        }
    }

    rotor.values.set(Param::ConeSigmaMax, 1.5);
    let moving_chi2 = calculate(&mut rotor, None).unwrap().chi2;
    assert!((moving_chi2 - rigid_chi2).abs() > 1e-6);
}

#[test]
fn pcs_needs_a_temperature() {
    let mut state = pcs_state();
    select_model(&mut state, "rigid").unwrap();
    state.temperature.remove("tb");
    let err = calculate(&mut state, None).unwrap_err();
    assert!(err.to_string().contains("temperature"), "{}", err);
    assert!(state.stats.is_none());
}

fn translation(state: &frame_order_core::AnalysisState) -> Vector3<f64> {
    Vector3::new(
        state.values.or_zero(Param::AvePosX),
        state.values.or_zero(Param::AvePosY),
        state.values.or_zero(Param::AvePosZ),
    )
}

fn pivot(state: &frame_order_core::AnalysisState) -> Vector3<f64> {
    Vector3::new(
        state.values.or_zero(Param::PivotX),
        state.values.or_zero(Param::PivotY),
        state.values.or_zero(Param::PivotZ),
    )
}

#[test]
fn translation_is_found_by_grid_search_and_minimisation() {
    let shift = Vector3::new(1.5, -2.0, 0.8);
    let mut state = pcs_state();
    select_model(&mut state, "rigid").unwrap();
    set_average_position(&mut state, "com", true).unwrap();
    assert_eq!(
        &state.params[..3],
        &[Param::AvePosX, Param::AvePosY, Param::AvePosZ]
    );
    for (param, value) in [
        (Param::AvePosX, shift.x),
        (Param::AvePosY, shift.y),
        (Param::AvePosZ, shift.z),
        (Param::AvePosAlpha, 0.3),
        (Param::AvePosBeta, 0.9),
        (Param::AvePosGamma, 2.1),
    ] {
        state.values.set(param, value);
    }
    calculate(&mut state, None).unwrap();
    adopt_back_calculated_pcs(&mut state, 0.01);

    for param in [Param::AvePosX, Param::AvePosY, Param::AvePosZ] {
        state.values.set(param, 0.0);
    }
    let settings = GridSettings {
        increments: Increments::PerParam(vec![Some(11), Some(11), Some(11), None, None, None]),
        ..GridSettings::default()
    };
    let grid = grid_search(&mut state, &settings, None).unwrap();
    assert!(grid.stored);
    assert_eq!(state.stats.as_ref().unwrap().f_count, 11 * 11 * 11);
    // The grid runs from -5 to 5 Angstrom in steps of one.
    assert!((translation(&state) - shift).norm() < 1.5, "{}", translation(&state));

    let report = minimise(&mut state, &bfgs(), None).unwrap();
    assert!(report.chi2 < 1e-4, "chi2 = {}", report.chi2);
    assert!(report.chi2 <= grid.chi2);
    assert!((translation(&state) - shift).norm() < 1e-2, "{}", translation(&state));
}

#[test]
fn free_pivot_and_translation_are_recovered() {
    let true_pivot = Vector3::new(10.0, -2.0, 14.0);
    let shift = Vector3::new(0.6, 1.1, -0.9);
    let (axis_theta, axis_phi) = (0.4, 1.9);

    let mut state = pcs_state();
    select_model(&mut state, "rotor").unwrap();
    set_pivot(&mut state, [10.0, -2.0, 14.0], false).unwrap();
    set_average_position(&mut state, "com", true).unwrap();
    state.integration = IntegrationSettings {
        num_int_pts: 500,
        method: IntegrationMethod::Quadrature,
    };
    for (param, value) in [
        (Param::AvePosX, shift.x),
        (Param::AvePosY, shift.y),
        (Param::AvePosZ, shift.z),
        (Param::AvePosAlpha, 0.3),
        (Param::AvePosBeta, 0.9),
        (Param::AvePosGamma, 2.1),
        (Param::AxisTheta, axis_theta),
        (Param::AxisPhi, axis_phi),
        (Param::ConeSigmaMax, 0.8),
    ] {
        state.values.set(param, value);
    }

    let scaling = assemble_scaling_matrix(&state, true);
    assert_eq!(
        &state.params[..6],
        &[
            Param::PivotX,
            Param::PivotY,
            Param::PivotZ,
            Param::AvePosX,
            Param::AvePosY,
            Param::AvePosZ
        ]
    );
    assert_eq!(scaling[(0, 0)], PIVOT_SCALE);
    assert_eq!(scaling[(3, 3)], 1.0);

    calculate(&mut state, None).unwrap();
    adopt_back_calculated_pcs(&mut state, 0.01);

    set_pivot(&mut state, [10.4, -2.3, 13.5], false).unwrap();
    state.values.set(Param::AvePosX, 0.2);
    state.values.set(Param::AvePosY, 1.4);
    state.values.set(Param::AvePosZ, -0.5);
    let start = calculate(&mut state, None).unwrap().chi2;
    assert!(start > 1.0, "chi2 = {}", start);

    let report = minimise(&mut state, &bfgs(), None).unwrap();
    assert!(report.stored);
    assert!(report.chi2 < 1e-4, "chi2 = {}", report.chi2);
    assert!((translation(&state) - shift).norm() < 1e-2, "{}", translation(&state));

    // Sliding the pivot along the rotor axis leaves the motion unchanged.
    let axis = axis_frame(
        state.values.or_zero(Param::AxisTheta),
        state.values.or_zero(Param::AxisPhi),
    ) * Vector3::z();
    let offset = pivot(&state) - true_pivot;
    assert!(offset.cross(&axis).norm() < 1e-2, "pivot offset {}", offset);
}
