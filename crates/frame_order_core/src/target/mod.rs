//! The frame order target function.
//!
//! Given a scaled parameter vector the target rotates the moving domain into
//! its average position, averages the full alignment tensors over the
//! motional distribution and back-calculates the RDCs and PCSs of the moving
//! domain. The returned value is the chi-squared against the measured data.

pub mod integration;
pub mod sobol;

use crate::assembly::{AtomicPositions, PcsData, RdcData, TensorData};
use crate::constants::pcs_constant;
use crate::error::{FrameOrderError, Result};
use crate::geometry::{axis_frame, euler_to_r_zyz, matrix_to_tensor_5d, tensor_5d_to_matrix};
use crate::model::{EigenFrameKind, ModelKind, Param};
use crate::order_parameters::iso_cone_s_to_theta;
use crate::state::{AveragePositionPivot, ParamValues};
use integration::{IntegrationSettings, Integrator, MotionLimits};
use nalgebra::{DMatrix, Matrix3, Vector3};

/// Error used for RDCs without a measured error, in Hz.
pub const DEFAULT_RDC_ERROR: f64 = 1.0;
/// Error used for PCSs without a measured error, unitless.
pub const DEFAULT_PCS_ERROR: f64 = 0.1e-6;

/// Everything the target needs, assembled from the analysis state.
#[derive(Debug, Clone)]
pub struct TargetData {
    pub model: ModelKind,
    pub params: Vec<Param>,
    /// Values of the parameters which are not optimised, such as a fixed pivot.
    pub fixed: ParamValues,
    /// Diagonal of the scaling matrix.
    pub scaling: Vec<f64>,
    pub tensors: TensorData,
    pub rdcs: Option<RdcData>,
    pub pcs: Option<PcsData>,
    pub atoms: Option<AtomicPositions>,
    pub ave_pos_pivot: AveragePositionPivot,
    /// Centre of mass of the moving domain.
    pub com: Vector3<f64>,
    pub integration: IntegrationSettings,
}

/// The back-calculated data of the last target function call.
#[derive(Debug, Clone)]
pub struct BackCalculated {
    pub rdc: DMatrix<f64>,
    /// Unitless PCSs.
    pub pcs: DMatrix<f64>,
    /// Reduced tensors, one per alignment.
    pub tensors: Vec<[f64; 5]>,
}

struct RdcTerms {
    data: RdcData,
    errors: DMatrix<f64>,
}

struct PcsTerms {
    data: PcsData,
    errors: DMatrix<f64>,
    constants: Vec<f64>,
    positions: Vec<Vector3<f64>>,
    paramagnetic_centre: Vector3<f64>,
}

pub struct FrameOrderTarget {
    model: ModelKind,
    params: Vec<Param>,
    fixed: ParamValues,
    scaling: Vec<f64>,
    full_tensors: Vec<Matrix3<f64>>,
    full_in_ref_frame: Vec<bool>,
    rdc: Option<RdcTerms>,
    pcs: Option<PcsTerms>,
    ave_pos_pivot: AveragePositionPivot,
    com: Vector3<f64>,
    integrator: Integrator,
    back_calc: BackCalculated,
}

/// Measured errors with defaults filled in and the weights folded in.
fn effective_errors(errors: &DMatrix<f64>, weights: &DMatrix<f64>, default: f64) -> DMatrix<f64> {
    errors.zip_map(weights, |error, weight| {
        let error = if error.is_nan() { default } else { error };
        error / weight.sqrt()
    })
}

impl FrameOrderTarget {
    pub fn new(data: TargetData) -> Result<Self> {
        if data.scaling.len() != data.params.len() {
            return Err(FrameOrderError::ParamVectorLength {
                expected: data.params.len(),
                got: data.scaling.len(),
            });
        }
        let integrator = Integrator::new(data.model, &data.integration)?;
        let rows = data.tensors.full.len();

        let rdc = data.rdcs.map(|rdcs| RdcTerms {
            errors: effective_errors(&rdcs.errors, &rdcs.weights, DEFAULT_RDC_ERROR),
            data: rdcs,
        });

        let pcs = match (data.pcs, data.atoms) {
            (Some(pcs), Some(atoms)) => Some(PcsTerms {
                errors: effective_errors(&pcs.errors, &pcs.weights, DEFAULT_PCS_ERROR),
                constants: pcs
                    .temperatures
                    .iter()
                    .zip(&pcs.frequencies)
                    .map(|(&temperature, &field)| pcs_constant(temperature, field, 1.0) * 1e30)
                    .collect(),
                positions: atoms.positions,
                paramagnetic_centre: atoms.paramagnetic_centre,
                data: pcs,
            }),
            (Some(_), None) => return Err(FrameOrderError::NoPcsData),
            _ => None,
        };

        let rdc_cols = rdc.as_ref().map_or(0, |terms| terms.data.values.ncols());
        let pcs_cols = pcs.as_ref().map_or(0, |terms| terms.data.values.ncols());

        Ok(Self {
            model: data.model,
            params: data.params,
            fixed: data.fixed,
            scaling: data.scaling,
            full_tensors: data.tensors.full.iter().map(tensor_5d_to_matrix).collect(),
            full_in_ref_frame: data.tensors.full_in_ref_frame,
            rdc,
            pcs,
            ave_pos_pivot: data.ave_pos_pivot,
            com: data.com,
            integrator,
            back_calc: BackCalculated {
                rdc: DMatrix::from_element(rows, rdc_cols, f64::NAN),
                pcs: DMatrix::from_element(rows, pcs_cols, f64::NAN),
                tensors: vec![[0.0; 5]; rows],
            },
        })
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn back_calc(&self) -> &BackCalculated {
        &self.back_calc
    }

    pub fn into_back_calc(self) -> BackCalculated {
        self.back_calc
    }

    /// Named parameter values for a scaled parameter vector.
    pub fn unscaled_values(&self, scaled: &[f64]) -> ParamValues {
        let mut values = self.fixed;
        for ((&param, &x), &scale) in self.params.iter().zip(scaled).zip(&self.scaling) {
            values.set(param, x * scale);
        }
        if self.model == ModelKind::IsoConeFreeRotor {
            values.set(Param::ConeTheta, iso_cone_s_to_theta(values.or_zero(Param::ConeS1)));
        }
        values
    }

    /// Chi-squared for the scaled parameter vector. The back-calculated data
    /// is updated as a side effect.
    pub fn func(&mut self, scaled: &[f64]) -> f64 {
        let values = self.unscaled_values(scaled);

        let ave_pos = euler_to_r_zyz(
            values.or_zero(Param::AvePosAlpha),
            values.or_zero(Param::AvePosBeta),
            values.or_zero(Param::AvePosGamma),
        );
        let eigenframe = match self.model.eigenframe() {
            EigenFrameKind::Euler => euler_to_r_zyz(
                values.or_zero(Param::EigenAlpha),
                values.or_zero(Param::EigenBeta),
                values.or_zero(Param::EigenGamma),
            ),
            EigenFrameKind::Axis => {
                axis_frame(values.or_zero(Param::AxisTheta), values.or_zero(Param::AxisPhi))
            }
            EigenFrameKind::None => Matrix3::identity(),
        };
        let limits = MotionLimits {
            cone_theta: values.or_zero(Param::ConeTheta),
            cone_theta_x: values.or_zero(Param::ConeThetaX),
            cone_theta_y: values.or_zero(Param::ConeThetaY),
            sigma_max: values.or_zero(Param::ConeSigmaMax),
        };

        // Motional rotations in the molecular frame.
        let rotations: Vec<(Matrix3<f64>, f64)> = self
            .integrator
            .rotations(&limits)
            .into_iter()
            .map(|r| (eigenframe * r.rotation * eigenframe.transpose(), r.weight))
            .collect();

        let translation = Vector3::new(
            values.or_zero(Param::AvePosX),
            values.or_zero(Param::AvePosY),
            values.or_zero(Param::AvePosZ),
        );
        let pivot = Vector3::new(
            values.or_zero(Param::PivotX),
            values.or_zero(Param::PivotY),
            values.or_zero(Param::PivotZ),
        );

        let mut chi2 = 0.0;
        for (row, full) in self.full_tensors.iter().enumerate() {
            let in_ref = self.full_in_ref_frame[row];
            let mut averaged = Matrix3::zeros();
            for (rotation, weight) in &rotations {
                let rotated = if in_ref {
                    rotation.transpose() * full * rotation
                } else {
                    rotation * full * rotation.transpose()
                };
                averaged += rotated * *weight;
            }
            let reduced = if in_ref {
                ave_pos.transpose() * averaged * ave_pos
            } else {
                ave_pos * averaged * ave_pos.transpose()
            };
            self.back_calc.tensors[row] = matrix_to_tensor_5d(&reduced);

            if let Some(terms) = &self.rdc {
                chi2 += rdc_row(terms, row, &reduced, &mut self.back_calc.rdc);
            }
            if let Some(terms) = &self.pcs {
                let centroid = match self.ave_pos_pivot {
                    AveragePositionPivot::Com => self.com,
                    AveragePositionPivot::Motional => pivot,
                };
                let frame = AveragePosition {
                    rotation: if in_ref { ave_pos } else { ave_pos.transpose() },
                    centroid,
                    translation,
                    pivot,
                };
                chi2 += pcs_row(
                    terms,
                    row,
                    full,
                    &frame,
                    &rotations,
                    in_ref,
                    &mut self.back_calc.pcs,
                );
            }
        }

        chi2
    }
}

fn rdc_row(terms: &RdcTerms, row: usize, reduced: &Matrix3<f64>, out: &mut DMatrix<f64>) -> f64 {
    let mut chi2 = 0.0;
    for (col, (vector, constant)) in terms
        .data
        .vectors
        .iter()
        .zip(&terms.data.constants)
        .enumerate()
    {
        let mut value = constant * vector.dot(&(reduced * vector));
        if terms.data.absolute[(row, col)] {
            value = value.abs();
        }
        out[(row, col)] = value;

        let measured = terms.data.values[(row, col)];
        if !measured.is_nan() {
            chi2 += ((measured - value) / terms.errors[(row, col)]).powi(2);
        }
    }
    chi2
}

struct AveragePosition {
    rotation: Matrix3<f64>,
    centroid: Vector3<f64>,
    translation: Vector3<f64>,
    pivot: Vector3<f64>,
}

fn pcs_row(
    terms: &PcsTerms,
    row: usize,
    full: &Matrix3<f64>,
    frame: &AveragePosition,
    rotations: &[(Matrix3<f64>, f64)],
    in_ref: bool,
    out: &mut DMatrix<f64>,
) -> f64 {
    let constant = terms.constants[row];
    let pivot_to_centre = frame.pivot - terms.paramagnetic_centre;
    let mut chi2 = 0.0;

    for (col, position) in terms.positions.iter().enumerate() {
        let measured = terms.data.values[(row, col)];
        if constant.is_nan() {
            continue;
        }
        let moved = frame.rotation * (position - frame.centroid) + frame.centroid + frame.translation;
        let from_pivot = moved - frame.pivot;

        let mut value = 0.0;
        for (rotation, weight) in rotations {
            let rotated = if in_ref {
                rotation * from_pivot
            } else {
                rotation.transpose() * from_pivot
            };
            let v = pivot_to_centre + rotated;
            let r = v.norm();
            value += weight * constant / r.powi(5) * v.dot(&(full * v));
        }
        out[(row, col)] = value;

        if !measured.is_nan() {
            chi2 += ((measured - value) / terms.errors[(row, col)]).powi(2);
        }
    }
    chi2
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rigid_rdc_data(alpha: f64, beta: f64, gamma: f64) -> TargetData {
        let full = [4e-4, -2e-4, 1e-4, -3e-4, 2e-4];
        let tensor = tensor_5d_to_matrix(&full);
        let rotation = euler_to_r_zyz(alpha, beta, gamma);
        let reduced = rotation.transpose() * tensor * rotation;

        let vectors: Vec<Vector3<f64>> = (0..12)
            .map(|i| {
                let t = i as f64 * 0.7;
                Vector3::new(t.cos(), t.sin(), (1.3 * t).cos()).normalize()
            })
            .collect();
        let constants = vec![-21_000.0; vectors.len()];
        let values = DMatrix::from_fn(1, vectors.len(), |_, j| {
            constants[j] * vectors[j].dot(&(reduced * vectors[j]))
        });

        TargetData {
            model: ModelKind::Rigid,
            params: vec![Param::AvePosAlpha, Param::AvePosBeta, Param::AvePosGamma],
            fixed: ParamValues::default(),
            scaling: vec![1.0; 3],
            tensors: TensorData {
                full: vec![full],
                full_errors: vec![[1e-5; 5]],
                full_in_ref_frame: vec![true],
                reduced: vec!["red".to_string()],
            },
            rdcs: Some(RdcData {
                errors: DMatrix::from_element(1, vectors.len(), f64::NAN),
                weights: DMatrix::from_element(1, vectors.len(), 1.0),
                absolute: DMatrix::from_element(1, vectors.len(), false),
                values,
                vectors,
                constants,
            }),
            pcs: None,
            atoms: None,
            ave_pos_pivot: AveragePositionPivot::Com,
            com: Vector3::zeros(),
            integration: IntegrationSettings::default(),
        }
    }

    #[test]
    fn rigid_rdcs_vanish_at_the_true_rotation() {
        let mut target = FrameOrderTarget::new(rigid_rdc_data(0.4, 1.1, 2.5)).unwrap();
        let chi2 = target.func(&[0.4, 1.1, 2.5]);
        assert!(chi2 < 1e-6, "chi2 = {}", chi2);
        assert!(target.func(&[0.5, 1.1, 2.5]) > 1.0);
    }

    #[test]
    fn back_calculated_tensor_is_stored() {
        let mut target = FrameOrderTarget::new(rigid_rdc_data(0.0, 0.0, 0.0)).unwrap();
        target.func(&[0.0, 0.0, 0.0]);
        let tensor = target.back_calc().tensors[0];
        assert!((tensor[0] - 4e-4).abs() < 1e-15);
        assert!((tensor[4] - 2e-4).abs() < 1e-15);
        assert_eq!(target.back_calc().rdc.ncols(), 12);
    }

    #[test]
    fn weights_shrink_errors() {
        let errors = DMatrix::from_row_slice(1, 2, &[f64::NAN, 2.0]);
        let weights = DMatrix::from_row_slice(1, 2, &[4.0, 1.0]);
        let effective = effective_errors(&errors, &weights, 1.0);
        assert_eq!(effective[(0, 0)], 0.5);
        assert_eq!(effective[(0, 1)], 2.0);
    }

    #[test]
    fn mismatched_scaling_is_rejected() {
        let mut data = rigid_rdc_data(0.0, 0.0, 0.0);
        data.scaling.pop();
        assert!(FrameOrderTarget::new(data).is_err());
    }

    #[test]
    fn full_cone_averages_the_tensor_away() {
        let mut data = rigid_rdc_data(0.0, 0.0, 0.0);
        data.model = ModelKind::IsoConeFreeRotor;
        data.params = vec![Param::ConeS1];
        data.scaling = vec![1.0];
        data.integration = IntegrationSettings {
            num_int_pts: 20_000,
            method: integration::IntegrationMethod::Quadrature,
        };
        let mut target = FrameOrderTarget::new(data).unwrap();
        // S1 = 1 closes the cone, leaving the free rotation about z which
        // keeps only the axial part of the tensor.
        target.func(&[1.0]);
        let axial = target.back_calc().tensors[0];
        assert!((axial[0] - 1e-4).abs() < 1e-12);
        assert!((axial[1] - 1e-4).abs() < 1e-12);
        assert!(axial[2..].iter().all(|x| x.abs() < 1e-12));
        // A free rotor in a cone of 90 degrees scales Azz by S = 0.
        target.func(&[0.0]);
        let wide = target.back_calc().tensors[0];
        assert!(wide.iter().map(|x| x.abs()).sum::<f64>() < 1e-7);
    }

    #[test]
    fn circular_pseudo_ellipse_averages_like_the_iso_cone() {
        let quadrature = IntegrationSettings {
            num_int_pts: 4_000,
            method: integration::IntegrationMethod::Quadrature,
        };

        let mut iso = rigid_rdc_data(0.0, 0.0, 0.0);
        iso.model = ModelKind::IsoConeTorsionless;
        iso.params = vec![Param::ConeTheta];
        iso.scaling = vec![1.0];
        iso.integration = quadrature;
        let mut iso = FrameOrderTarget::new(iso).unwrap();
        iso.func(&[0.6]);

        let mut ellipse = rigid_rdc_data(0.0, 0.0, 0.0);
        ellipse.model = ModelKind::PseudoEllipseTorsionless;
        ellipse.params = vec![Param::ConeThetaX, Param::ConeThetaY];
        ellipse.scaling = vec![1.0; 2];
        ellipse.integration = quadrature;
        let mut ellipse = FrameOrderTarget::new(ellipse).unwrap();
        ellipse.func(&[0.6, 0.6]);

        let expected = iso.back_calc().tensors[0];
        let tensor = ellipse.back_calc().tensors[0];
        for (a, b) in tensor.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-12, "{:?} vs {:?}", tensor, expected);
        }
        // Narrowing one axis changes the average.
        ellipse.func(&[0.2, 0.6]);
        let narrowed = ellipse.back_calc().tensors[0];
        assert!((narrowed[0] - expected[0]).abs() > 1e-7);
    }
}
