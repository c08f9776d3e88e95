//! Fatal error kinds and the skip-and-continue warning channel.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FrameOrderError>;

#[derive(Debug, Error)]
pub enum FrameOrderError {
    #[error("The frame order model has not been set up.")]
    NoModel,

    #[error("The model name '{0}' is invalid.")]
    InvalidModel(String),

    #[error("The pivot point has not been set.")]
    NoPivot,

    #[error("The reference domain has not been set.")]
    NoReferenceDomain,

    #[error("The reference domain '{0}' does not match any alignment tensor domain.")]
    UnknownReferenceDomain(String),

    #[error("The average position pivot '{0}' must be one of 'com' or 'motional'.")]
    InvalidPivotKeyword(String),

    #[error("Neither RDCs nor PCSs are present.")]
    NoBaseData,

    #[error("No PCS data could be found.")]
    NoPcsData,

    #[error("No RDC data could be found.")]
    NoRdcData,

    #[error("No {kind} value has been set for the alignment '{align_id}'.")]
    NoValue { kind: &'static str, align_id: String },

    #[error("The paramagnetic centre has not been set.")]
    NoParamagneticCentre,

    #[error("The domain of the alignment tensor '{0}' has not been set.")]
    MissingTensorDomain(String),

    #[error("No alignment tensor reductions have been defined.")]
    NoTensorReductions,

    #[error("No full alignment tensor could be found for the alignment '{0}'.")]
    MissingTensor(String),

    #[error("The chi-squared value is NaN.")]
    NaNChiSquared,

    #[error("The chi-squared value is infinite.")]
    InfiniteChiSquared,

    #[error("A grid search of size {total} is too large (the maximum is {max} points).")]
    GridTooLarge { total: f64, max: f64 },

    #[error("The number of grid search increments ({got}) does not match the number of parameters ({expected}).")]
    IncrementCount { expected: usize, got: usize },

    #[error("The grid search bound list ({got}) does not match the number of parameters ({expected}).")]
    BoundCount { expected: usize, got: usize },

    #[error("Monte Carlo parameter values have already been set.")]
    SimulationsAlreadySet,

    #[error("Monte Carlo simulations have not been set up.")]
    NoSimulations,

    #[error("The simulation index {index} is out of range for {number} simulations.")]
    InvalidSimIndex { index: usize, number: usize },

    #[error("The parameter '{0}' has no value.")]
    MissingParameter(String),

    #[error("No interatomic vectors could be found.")]
    NoInteratomicVectors,

    #[error("The simulated data set has {got} values, but {expected} are required.")]
    SimDataLength { expected: usize, got: usize },

    #[error("The isotope '{0}' is unknown.")]
    UnknownIsotope(String),

    #[error("The isotope of the spin '{0}' has not been set.")]
    MissingIsotope(String),

    #[error("The model has not been optimised, no statistics are available.")]
    NoStatistics,

    #[error("The {kind} errors are missing for all data.")]
    MissingErrors { kind: &'static str },

    #[error("No data for the base data identifier '{0}' could be found.")]
    UnknownDataId(String),

    #[error("The window size of {window} is not equal to the difference of {upper} and {lower}.")]
    InvalidWrapWindow { window: f64, lower: f64, upper: f64 },

    #[error("The minimisation algorithm '{0}' is unknown.")]
    UnknownAlgorithm(String),

    #[error("The settings are invalid: {0}")]
    InvalidSettings(String),

    #[error("The parameter vector has {got} elements, but {expected} are required.")]
    ParamVectorLength { expected: usize, got: usize },
}

/// Non-fatal per-datum issues. The affected datum is skipped or averaged and
/// the calculation continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Warning {
    MissingVector { spin_id1: String, spin_id2: String },
    PseudoAtom { spin_id: String, members: usize },
    MissingPosition { spin_id: String },
    AveragedPositions { spin_id: String, count: usize },
    AveragedVectors { spin_id1: String, spin_id2: String, count: usize },
    ConstraintsDisabled,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MissingVector { spin_id1, spin_id2 } => write!(
                f,
                "No interatomic vectors present for the '{}' and '{}' pair, skipping the RDC.",
                spin_id1, spin_id2
            ),
            Warning::PseudoAtom { spin_id, members } => write!(
                f,
                "Only methyl group pseudo-atoms are supported for RDCs, the pseudo-atom '{}' has {} members and will be skipped.",
                spin_id, members
            ),
            Warning::MissingPosition { spin_id } => write!(
                f,
                "The spin '{}' has no atomic position, skipping the PCS.",
                spin_id
            ),
            Warning::AveragedPositions { spin_id, count } => write!(
                f,
                "The spin '{}' has {} positions, the PCS will be calculated from the average position.",
                spin_id, count
            ),
            Warning::AveragedVectors {
                spin_id1,
                spin_id2,
                count,
            } => write!(
                f,
                "The '{}' and '{}' pair has {} interatomic vectors, these will be averaged.",
                spin_id1, spin_id2, count
            ),
            Warning::ConstraintsDisabled => write!(
                f,
                "Constraints are as of yet not implemented - turning this option off."
            ),
        }
    }
}

/// Records a warning and forwards it to the log.
pub(crate) fn push_warning(warnings: &mut Vec<Warning>, warning: Warning, verbose: bool) {
    if verbose {
        log::warn!("{}", warning);
    } else {
        log::debug!("{}", warning);
    }
    warnings.push(warning);
}
