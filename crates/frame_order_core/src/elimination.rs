//! Model and simulation elimination for parameters outside their physical range.

use crate::model::Param;
use crate::parameters::get_param_names;
use crate::state::AnalysisState;
use std::f64::consts::PI;

/// Lower cone angle limit of the pseudo-ellipse, above zero as the numerical
/// integration truncates at the boundary.
const PSEUDO_ELLIPSE_MIN_ANGLE: f64 = 0.001;

/// Allowed `[lower, upper)` range and description of an eliminable parameter.
/// `cone_s1` also accepts its upper bound.
fn limits(param: Param) -> Option<(&'static str, f64, f64)> {
    match param {
        Param::ConeS1 => Some(("cone S1 order", -0.125, 1.0)),
        Param::ConeTheta => Some(("cone opening angle theta", 0.0, PI)),
        Param::ConeThetaX => Some(("cone opening angle theta x", PSEUDO_ELLIPSE_MIN_ANGLE, PI)),
        Param::ConeThetaY => Some(("cone opening angle theta y", PSEUDO_ELLIPSE_MIN_ANGLE, PI)),
        Param::ConeSigmaMax => Some(("torsion angle sigma_max", 0.0, PI)),
        _ => None,
    }
}

/// True if `value` of `param` lies outside its allowed range and the model,
/// or simulation `sim_index`, should be eliminated. Parameters the current
/// model does not use never eliminate.
pub fn eliminate(state: &AnalysisState, param: Param, value: f64, sim_index: Option<usize>) -> bool {
    let Some((description, lower, upper)) = limits(param) else {
        return false;
    };
    let active = get_param_names(state)
        .map(|names| names.contains(&param))
        .unwrap_or(false);
    if !active {
        return false;
    }

    let above = if param == Param::ConeS1 {
        value > upper
    } else {
        value >= upper
    };
    let (relation, bound) = if above {
        ("greater", upper)
    } else if value < lower {
        ("less", lower)
    } else {
        return false;
    };

    let target = match sim_index {
        None => "the model".to_string(),
        Some(index) => format!("simulation {}", index),
    };
    log::info!(
        "The {} parameter of {:.5} is {} than {:.5}, eliminating {}.",
        description,
        value,
        relation,
        bound,
        target
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::select_model;

    fn state_for(model: &str) -> AnalysisState {
        let mut state = AnalysisState::new();
        select_model(&mut state, model).unwrap();
        state
    }

    #[test]
    fn order_parameter_range() {
        let state = state_for("iso cone, free rotor");
        assert!(eliminate(&state, Param::ConeS1, 1.5, None));
        assert!(!eliminate(&state, Param::ConeS1, 0.5, None));
        assert!(!eliminate(&state, Param::ConeS1, 1.0, None));
        assert!(eliminate(&state, Param::ConeS1, -0.2, Some(3)));
        // The derived cone angle is checked as well.
        assert!(eliminate(&state, Param::ConeTheta, PI, None));
    }

    #[test]
    fn pseudo_ellipse_angles_stop_short_of_zero() {
        let state = state_for("pseudo-ellipse");
        assert!(eliminate(&state, Param::ConeThetaX, 0.0005, None));
        assert!(!eliminate(&state, Param::ConeThetaX, 0.002, None));
        assert!(eliminate(&state, Param::ConeThetaY, 3.2, None));
        assert!(eliminate(&state, Param::ConeSigmaMax, -0.1, None));
        assert!(!eliminate(&state, Param::ConeSigmaMax, 0.0, None));
    }

    #[test]
    fn inactive_parameters_never_eliminate() {
        let state = state_for("rigid");
        assert!(!eliminate(&state, Param::ConeThetaX, 0.0005, None));
        assert!(!eliminate(&state, Param::ConeS1, 1.5, None));
        assert!(!eliminate(&AnalysisState::new(), Param::ConeTheta, -1.0, None));
        let state = state_for("iso cone, torsionless");
        assert!(!eliminate(&state, Param::AvePosBeta, 10.0, None));
    }
}
