//! The explicit analysis context passed to every operation.
//!
//! `AnalysisState` owns the selected model, the parameter values, the
//! alignment tensors, the spin and interatomic containers carrying the
//! measured data, the minimisation statistics and the Monte Carlo arrays.

use crate::error::{FrameOrderError, Result};
use crate::model::{ModelKind, Param};
use crate::target::integration::IntegrationSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One optional value per parameter of the registry, indexed by [`Param`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamValues {
    values: [Option<f64>; Param::COUNT],
}

impl ParamValues {
    pub fn get(&self, param: Param) -> Option<f64> {
        self.values[param.index()]
    }

    pub fn set(&mut self, param: Param, value: f64) {
        self.values[param.index()] = Some(value);
    }

    pub fn clear(&mut self, param: Param) {
        self.values[param.index()] = None;
    }

    pub fn require(&self, param: Param) -> Result<f64> {
        self.get(param)
            .ok_or_else(|| FrameOrderError::MissingParameter(param.name().to_string()))
    }

    /// The value, or 0.0 for parameters the current model does not use.
    pub fn or_zero(&self, param: Param) -> f64 {
        self.get(param).unwrap_or(0.0)
    }

    pub fn pivot(&self) -> Option<[f64; 3]> {
        Some([
            self.get(Param::PivotX)?,
            self.get(Param::PivotY)?,
            self.get(Param::PivotZ)?,
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinimisationStats {
    pub chi2: f64,
    pub iter: usize,
    pub f_count: usize,
    pub g_count: usize,
    pub h_count: usize,
    pub warning: Option<String>,
}

/// The centroid used to rotate the moving domain into its average position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AveragePositionPivot {
    /// Centre of mass of the moving domain.
    #[default]
    Com,
    /// The motional pivot point.
    Motional,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlignTensor {
    pub name: String,
    pub align_id: String,
    pub domain: Option<String>,
    /// `[Axx, Ayy, Axy, Axz, Ayz]`.
    pub components: [f64; 5],
    pub errors: Option<[f64; 5]>,
    /// Back-calculated components, written for reduced tensors.
    pub bc: Option<[f64; 5]>,
}

/// A full tensor and its reduced counterpart, identified by tensor name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorReduction {
    pub full: String,
    pub reduced: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpinContainer {
    pub id: String,
    #[serde(default = "default_true")]
    pub select: bool,
    pub domain: Option<String>,
    pub isotope: Option<String>,
    /// One position per structural model, in Angstrom.
    #[serde(default)]
    pub pos: Vec<[f64; 3]>,
    /// Spin IDs of the atoms a pseudo-atom stands for.
    pub members: Option<Vec<String>>,
    #[serde(default)]
    pub pcs: BTreeMap<String, f64>,
    #[serde(default)]
    pub pcs_err: BTreeMap<String, f64>,
    #[serde(default)]
    pub pcs_weight: BTreeMap<String, f64>,
    #[serde(default)]
    pub pcs_bc: BTreeMap<String, f64>,
    #[serde(default)]
    pub pcs_sim: BTreeMap<String, Vec<f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interatom {
    pub spin_id1: String,
    pub spin_id2: String,
    #[serde(default = "default_true")]
    pub select: bool,
    /// One vector per structural model.
    #[serde(default)]
    pub vector: Vec<[f64; 3]>,
    /// Interatomic distance in metres.
    pub r: f64,
    #[serde(default)]
    pub rdc: BTreeMap<String, f64>,
    #[serde(default)]
    pub rdc_err: BTreeMap<String, f64>,
    #[serde(default)]
    pub rdc_weight: BTreeMap<String, f64>,
    #[serde(default)]
    pub absolute_rdc: BTreeMap<String, bool>,
    #[serde(default)]
    pub rdc_bc: BTreeMap<String, f64>,
    #[serde(default)]
    pub rdc_sim: BTreeMap<String, Vec<f64>>,
}

fn default_true() -> bool {
    true
}

/// Monte Carlo arrays, sized once by `monte_carlo_setup` and never resized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationStore {
    pub number: usize,
    pub selected: Vec<bool>,
    pub values: Option<Vec<ParamValues>>,
    pub stats: Option<Vec<MinimisationStats>>,
}

impl SimulationStore {
    pub fn new(number: usize) -> Self {
        Self {
            number,
            selected: vec![true; number],
            values: None,
            stats: None,
        }
    }

    pub fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.number {
            return Err(FrameOrderError::InvalidSimIndex {
                index,
                number: self.number,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisState {
    pub model: Option<ModelKind>,
    /// The ordered optimised parameters of the current model.
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub values: ParamValues,
    /// Parameter errors from the Monte Carlo error analysis.
    #[serde(default)]
    pub errors: ParamValues,

    /// The explicit pivot fix flag; a pivot may still be fixed by the data.
    #[serde(default = "default_true")]
    pub pivot_fixed: bool,
    #[serde(default)]
    pub translation: bool,
    #[serde(default)]
    pub ave_pos_pivot: AveragePositionPivot,
    #[serde(default)]
    pub integration: IntegrationSettings,

    #[serde(default)]
    pub align_ids: Vec<String>,
    #[serde(default)]
    pub rdc_ids: Vec<String>,
    #[serde(default)]
    pub pcs_ids: Vec<String>,

    #[serde(default)]
    pub tensors: Vec<AlignTensor>,
    #[serde(default)]
    pub reductions: Vec<TensorReduction>,
    pub ref_domain: Option<String>,

    pub paramagnetic_centre: Option<[f64; 3]>,
    #[serde(default)]
    pub temperature: BTreeMap<String, f64>,
    /// Proton spectrometer frequencies in Hz.
    #[serde(default)]
    pub spectrometer_frq: BTreeMap<String, f64>,

    #[serde(default)]
    pub spins: Vec<SpinContainer>,
    #[serde(default)]
    pub interatoms: Vec<Interatom>,

    pub stats: Option<MinimisationStats>,
    pub sims: Option<SimulationStore>,
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self {
            model: None,
            params: Vec::new(),
            values: ParamValues::default(),
            errors: ParamValues::default(),
            pivot_fixed: true,
            translation: false,
            ave_pos_pivot: AveragePositionPivot::default(),
            integration: IntegrationSettings::default(),
            align_ids: Vec::new(),
            rdc_ids: Vec::new(),
            pcs_ids: Vec::new(),
            tensors: Vec::new(),
            reductions: Vec::new(),
            ref_domain: None,
            paramagnetic_centre: None,
            temperature: BTreeMap::new(),
            spectrometer_frq: BTreeMap::new(),
            spins: Vec::new(),
            interatoms: Vec::new(),
            stats: None,
            sims: None,
        }
    }
}

impl AnalysisState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require_model(&self) -> Result<ModelKind> {
        self.model.ok_or(FrameOrderError::NoModel)
    }

    pub fn require_pivot(&self) -> Result<[f64; 3]> {
        self.values.pivot().ok_or(FrameOrderError::NoPivot)
    }

    pub fn spin(&self, id: &str) -> Option<&SpinContainer> {
        self.spins.iter().find(|spin| spin.id == id)
    }

    pub fn tensor(&self, name: &str) -> Option<&AlignTensor> {
        self.tensors.iter().find(|tensor| tensor.name == name)
    }

    /// The domain which is not the reference domain.
    pub fn moving_domain(&self) -> Option<&str> {
        let reference = self.ref_domain.as_deref()?;
        self.tensors
            .iter()
            .filter_map(|tensor| tensor.domain.as_deref())
            .find(|domain| *domain != reference)
    }

    pub fn is_moving(&self, spin: &SpinContainer) -> bool {
        match (self.moving_domain(), spin.domain.as_deref()) {
            (Some(moving), Some(domain)) => moving == domain,
            _ => false,
        }
    }

    fn register_align_id(&mut self, align_id: &str) {
        if !self.align_ids.iter().any(|id| id == align_id) {
            self.align_ids.push(align_id.to_string());
        }
    }

    pub fn register_rdc_id(&mut self, align_id: &str) {
        self.register_align_id(align_id);
        if !self.rdc_ids.iter().any(|id| id == align_id) {
            self.rdc_ids.push(align_id.to_string());
        }
    }

    pub fn register_pcs_id(&mut self, align_id: &str) {
        self.register_align_id(align_id);
        if !self.pcs_ids.iter().any(|id| id == align_id) {
            self.pcs_ids.push(align_id.to_string());
        }
    }

    pub fn set_temperature(&mut self, align_id: &str, kelvin: f64) {
        self.temperature.insert(align_id.to_string(), kelvin);
    }

    pub fn set_spectrometer_frq(&mut self, align_id: &str, hertz: f64) {
        self.spectrometer_frq.insert(align_id.to_string(), hertz);
    }

    pub fn simulations(&self) -> Result<&SimulationStore> {
        self.sims.as_ref().ok_or(FrameOrderError::NoSimulations)
    }

    pub fn simulations_mut(&mut self) -> Result<&mut SimulationStore> {
        self.sims.as_mut().ok_or(FrameOrderError::NoSimulations)
    }

    /// Parameter values of the current state or of one simulation.
    pub fn values_for(&self, sim_index: Option<usize>) -> Result<&ParamValues> {
        match sim_index {
            None => Ok(&self.values),
            Some(index) => {
                let sims = self.simulations()?;
                sims.check_index(index)?;
                sims.values
                    .as_ref()
                    .and_then(|values| values.get(index))
                    .ok_or(FrameOrderError::NoSimulations)
            }
        }
    }
}
