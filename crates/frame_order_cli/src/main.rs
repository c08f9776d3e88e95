//! Frame order command line interface.
//!
//! Each invocation loads an analysis state from JSON, applies one command and
//! writes the state back, either over the input or to `--output`. Listing the
//! models needs no state.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use frame_order_core::grid::{GridSettings, Increments};
use frame_order_core::minimise::MinimiseSettings;
use frame_order_core::monte_carlo::{run_monte_carlo, McMethod, McSettings};
use frame_order_core::optimisation::{calculate, grid_search, minimise, model_statistics, OptimisationReport};
use frame_order_core::parameters::{
    get_param_values, select_model, set_average_position, set_integration, set_pivot, set_ref_domain,
};
use frame_order_core::target::integration::{IntegrationMethod, IntegrationSettings};
use frame_order_core::{AnalysisState, ModelKind};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "frame-order")]
#[command(about = "Frame order analysis of domain motions from RDC and PCS data")]
#[command(version)]
struct Cli {
    /// Analysis state (JSON). Required by every command except `models`.
    state: Option<PathBuf>,

    /// Where to write the updated state. Defaults to overwriting the input.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the frame order model
    SelectModel {
        /// Model name, e.g. "rigid" or "pseudo-ellipse, torsionless"
        name: String,
    },

    /// List the model names
    Models,

    /// Set the pivot point of the motion (Angstrom)
    Pivot {
        x: f64,
        y: f64,
        z: f64,

        /// Exclude the pivot from the optimisation.
        #[arg(long)]
        fix: bool,
    },

    /// Choose the average domain position pivot and translation
    AvePos {
        /// "com" or "motional"
        #[arg(default_value = "com")]
        pivot: String,

        /// Optimise the average domain translation.
        #[arg(long)]
        translation: bool,
    },

    /// Set the reference domain
    RefDomain { domain: String },

    /// Numerical integration settings
    Integration {
        #[arg(long, default_value = "200000")]
        points: usize,

        #[arg(long, value_enum, default_value = "quasi-random")]
        method: IntegrationArg,
    },

    /// Back-calculate the data and chi-squared at the current parameter values
    Calculate,

    /// Grid search over the model parameters
    GridSearch {
        /// Increments per dimension
        #[arg(long, default_value = "11")]
        inc: usize,
    },

    /// Local minimisation
    Minimise {
        #[arg(long, default_value = "simplex")]
        algorithm: String,

        #[arg(long, default_value = "10000")]
        max_iter: usize,

        /// Disable pivot scaling.
        #[arg(long)]
        no_scaling: bool,
    },

    /// Monte Carlo error analysis
    MonteCarlo {
        #[arg(long, default_value = "500")]
        sims: usize,

        /// Randomise the measured values rather than the back-calculated ones.
        #[arg(long)]
        direct: bool,

        #[arg(long, default_value = "0")]
        seed: u64,

        #[arg(long, default_value = "simplex")]
        algorithm: String,
    },

    /// Print the parameter values, errors and model statistics
    Params,
}

#[derive(Clone, Copy, ValueEnum)]
enum IntegrationArg {
    QuasiRandom,
    Quadrature,
}

impl From<IntegrationArg> for IntegrationMethod {
    fn from(arg: IntegrationArg) -> Self {
        match arg {
            IntegrationArg::QuasiRandom => IntegrationMethod::QuasiRandom,
            IntegrationArg::Quadrature => IntegrationMethod::Quadrature,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    if let Commands::Models = cli.command {
        for model in ModelKind::ALL {
            println!("{}", model);
        }
        return Ok(());
    }

    let Some(path) = cli.state.as_deref() else {
        bail!("An analysis state file is required for this command.");
    };
    let mut state = load_state(path)?;
    let changed = run(&mut state, &cli.command)?;
    if changed {
        let output = cli.output.as_deref().unwrap_or(path);
        save_state(output, &state)?;
    }
    Ok(())
}

/// Applies one command, returning whether the state should be written back.
fn run(state: &mut AnalysisState, command: &Commands) -> Result<bool> {
    match command {
        Commands::Models => Ok(false),
        Commands::SelectModel { name } => {
            select_model(state, name)?;
            Ok(true)
        }
        Commands::Pivot { x, y, z, fix } => {
            set_pivot(state, [*x, *y, *z], *fix)?;
            Ok(true)
        }
        Commands::AvePos { pivot, translation } => {
            set_average_position(state, pivot, *translation)?;
            Ok(true)
        }
        Commands::RefDomain { domain } => {
            set_ref_domain(state, domain)?;
            Ok(true)
        }
        Commands::Integration { points, method } => {
            set_integration(
                state,
                IntegrationSettings {
                    num_int_pts: *points,
                    method: (*method).into(),
                },
            )?;
            Ok(true)
        }
        Commands::Calculate => {
            let report = calculate(state, None)?;
            print_report(&report)?;
            Ok(true)
        }
        Commands::GridSearch { inc } => {
            let settings = GridSettings {
                increments: Increments::All(*inc),
                ..GridSettings::default()
            };
            let report = grid_search(state, &settings, None)?;
            print_report(&report)?;
            Ok(true)
        }
        Commands::Minimise {
            algorithm,
            max_iter,
            no_scaling,
        } => {
            let settings = MinimiseSettings {
                algorithm: algorithm.clone(),
                max_iterations: *max_iter,
                scaling: !no_scaling,
                ..MinimiseSettings::default()
            };
            let report = minimise(state, &settings, None)?;
            print_report(&report)?;
            Ok(true)
        }
        Commands::MonteCarlo {
            sims,
            direct,
            seed,
            algorithm,
        } => {
            if *sims < 2 {
                bail!("At least two simulations are required, got {}.", sims);
            }
            let mc = McSettings {
                number: *sims,
                method: if *direct { McMethod::Direct } else { McMethod::BackCalc },
                seed: *seed,
            };
            let settings = MinimiseSettings {
                algorithm: algorithm.clone(),
                ..MinimiseSettings::default()
            };
            let mut rng = ChaCha8Rng::seed_from_u64(mc.seed);
            let reports = run_monte_carlo(state, &mc, &settings, &mut rng)?;
            log::info!("Monte Carlo simulations complete ({} optimised).", reports.len());
            print_params(state)?;
            Ok(true)
        }
        Commands::Params => {
            print_params(state)?;
            Ok(false)
        }
    }
}

fn load_state(path: &Path) -> Result<AnalysisState> {
    log::info!("Loading the analysis state from {}.", path.display());
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("failed to parse {}", path.display()))
}

fn save_state(path: &Path, state: &AnalysisState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    log::info!("Saved the analysis state to {}.", path.display());
    Ok(())
}

fn print_report(report: &OptimisationReport) -> Result<()> {
    println!("{}", report_json(report)?);
    Ok(())
}

/// Warnings are already logged by the core, so they only appear in the JSON.
fn report_json(report: &OptimisationReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn print_params(state: &AnalysisState) -> Result<()> {
    let params: serde_json::Map<String, serde_json::Value> = get_param_values(state, None)?
        .into_iter()
        .map(|(param, value)| {
            let entry = json!({ "value": value, "error": state.errors.get(param) });
            (param.name().to_string(), entry)
        })
        .collect();
    let statistics = model_statistics(state)
        .ok()
        .map(|(k, n, chi2)| json!({ "k": k, "n": n, "chi2": chi2 }));

    let output = json!({
        "model": state.model.map(|model| model.name()),
        "params": params,
        "statistics": statistics,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use frame_order_core::Warning;

    #[test]
    fn models_needs_no_state() {
        let cli = Cli::try_parse_from(["frame-order", "models"]).unwrap();
        assert!(cli.state.is_none());
        assert!(matches!(cli.command, Commands::Models));
    }

    #[test]
    fn state_comes_before_the_command() {
        let args = ["frame-order", "state.json", "grid-search", "--inc", "5", "-o", "out.json"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.state.as_deref(), Some(Path::new("state.json")));
        assert_eq!(cli.output.as_deref(), Some(Path::new("out.json")));
        assert!(matches!(cli.command, Commands::GridSearch { inc: 5 }));
    }

    #[test]
    fn report_carries_the_warnings() {
        let report = OptimisationReport {
            chi2: 2.5,
            stored: true,
            warnings: vec![Warning::MissingPosition {
                spin_id: ":3@H".to_string(),
            }],
        };
        let json = report_json(&report).unwrap();
        assert!(json.contains("MissingPosition"), "{}", json);
        assert!(json.contains(":3@H"), "{}", json);
        assert!(json.contains("2.5"));
    }
}
