//! The `frame_order_core` crate is the computational engine of the frame order
//! analysis of two-domain molecules from RDC and PCS data.
//!
//! Key components:
//! - **Model registry**: the twelve motional models and their ordered parameters (`model`, `parameters`).
//! - **Data assembly**: dense RDC, PCS, atomic position and tensor arrays over one data layout (`data`, `assembly`).
//! - **Target function**: back-calculation of the averaged tensors, RDCs and PCSs with numerical integration (`target`).
//! - **Optimisation**: grid search, local minimisation and result storage (`grid`, `minimise`, `optimisation`).
//! - **Error analysis**: model elimination and Monte Carlo simulations (`elimination`, `monte_carlo`).
//!
//! Every operation takes the analysis context, [`state::AnalysisState`], explicitly.

pub mod assembly;
pub mod cones;
pub mod constants;
pub mod data;
pub mod elimination;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod minimise;
pub mod model;
pub mod monte_carlo;
pub mod optimisation;
pub mod order_parameters;
pub mod parameters;
pub mod state;
pub mod target;

pub use error::{FrameOrderError, Result, Warning};
pub use model::{ModelKind, Param};
pub use state::AnalysisState;
