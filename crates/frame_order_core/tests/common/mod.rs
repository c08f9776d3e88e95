//! Synthetic analysis states shared by the integration tests.

#![allow(dead_code)]

use frame_order_core::constants::{gyromagnetic_ratio, rdc_constant, NH_BOND_LENGTH};
use frame_order_core::geometry::{euler_to_r_zyz, tensor_5d_to_matrix};
use frame_order_core::state::{AlignTensor, Interatom, SpinContainer, TensorReduction};
use frame_order_core::AnalysisState;
use nalgebra::Vector3;

pub const ALIGNMENTS: [(&str, [f64; 5]); 2] = [
    ("dy", [4.2e-4, -1.6e-4, 1.1e-4, -2.9e-4, 1.7e-4]),
    ("tb", [-2.5e-4, 3.3e-4, -0.8e-4, 1.2e-4, 2.4e-4]),
];

pub const PAIRS: usize = 16;

fn bond_vector(i: usize) -> Vector3<f64> {
    let t = i as f64 * 0.83 + 0.2;
    Vector3::new(t.cos() * (0.9 * t).sin(), (1.7 * t).sin(), (0.6 * t).cos() + 0.3).normalize()
}

fn nitrogen_position(i: usize) -> [f64; 3] {
    let t = i as f64;
    [8.0 + 1.3 * t.cos(), -4.0 + 0.9 * t, 12.0 + 2.1 * (0.7 * t).sin()]
}

/// Two domains, `N` as the reference and `C` moving, with one full and one
/// reduced tensor per alignment but no data.
pub fn two_domain_state() -> AnalysisState {
    let mut state = AnalysisState::new();
    state.ref_domain = Some("N".to_string());
    for (align_id, components) in ALIGNMENTS {
        for (suffix, domain) in [("full", "N"), ("red", "C")] {
            state.tensors.push(AlignTensor {
                name: format!("{} {}", align_id, suffix),
                align_id: align_id.to_string(),
                domain: Some(domain.to_string()),
                components,
                ..AlignTensor::default()
            });
        }
        state.reductions.push(TensorReduction {
            full: format!("{} full", align_id),
            reduced: format!("{} red", align_id),
        });
    }

    for i in 0..PAIRS {
        let n = nitrogen_position(i);
        let v = bond_vector(i);
        let h = [n[0] + v.x, n[1] + v.y, n[2] + v.z];
        for (atom, isotope, pos) in [("N", "15N", n), ("H", "1H", h)] {
            state.spins.push(SpinContainer {
                id: format!(":{}@{}", i + 1, atom),
                select: true,
                domain: Some("C".to_string()),
                isotope: Some(isotope.to_string()),
                pos: vec![pos],
                ..SpinContainer::default()
            });
        }
    }
    state
}

/// RDCs of the moving domain rotated by the ZYZ Euler angles, with 1 Hz errors.
pub fn rigid_rdc_state(alpha: f64, beta: f64, gamma: f64) -> AnalysisState {
    let mut state = two_domain_state();
    let rotation = euler_to_r_zyz(alpha, beta, gamma);
    let constant = rdc_constant(
        gyromagnetic_ratio("15N").unwrap(),
        gyromagnetic_ratio("1H").unwrap(),
        NH_BOND_LENGTH,
    );

    for i in 0..PAIRS {
        let vector = bond_vector(i);
        let mut interatom = Interatom {
            spin_id1: format!(":{}@N", i + 1),
            spin_id2: format!(":{}@H", i + 1),
            select: true,
            vector: vec![[vector.x, vector.y, vector.z]],
            r: NH_BOND_LENGTH,
            ..Interatom::default()
        };
        for (align_id, components) in ALIGNMENTS {
            let reduced = rotation.transpose() * tensor_5d_to_matrix(&components) * rotation;
            let rdc = constant * vector.dot(&(reduced * vector));
            interatom.rdc.insert(align_id.to_string(), rdc);
            interatom.rdc_err.insert(align_id.to_string(), 1.0);
        }
        state.interatoms.push(interatom);
    }
    for (align_id, _) in ALIGNMENTS {
        state.register_rdc_id(align_id);
    }
    state
}

/// PCSs on the amide protons for a lanthanide at the origin. The values
/// are placeholders; only back-calculated data is compared.
pub fn pcs_state() -> AnalysisState {
    let mut state = two_domain_state();
    state.paramagnetic_centre = Some([0.0, 0.0, 0.0]);
    for (align_id, _) in ALIGNMENTS {
        state.register_pcs_id(align_id);
        state.set_temperature(align_id, 303.0);
        state.set_spectrometer_frq(align_id, 800e6);
    }
    for (i, spin) in state.spins.iter_mut().enumerate() {
        if spin.id.ends_with("@H") {
            for (align_id, _) in ALIGNMENTS {
                spin.pcs.insert(align_id.to_string(), 0.05 * i as f64 - 0.4);
                spin.pcs_err.insert(align_id.to_string(), 0.1);
            }
        }
    }
    state
}

/// Replaces the measured PCSs with the back-calculated ones and forgets the
/// stored statistics, so the current parameter values become the truth.
pub fn adopt_back_calculated_pcs(state: &mut AnalysisState, error: f64) {
    for spin in &mut state.spins {
        for (align_id, value) in &spin.pcs_bc {
            spin.pcs.insert(align_id.clone(), *value);
            spin.pcs_err.insert(align_id.clone(), error);
        }
    }
    state.stats = None;
}

pub fn angle_difference(a: f64, b: f64) -> f64 {
    let two_pi = 2.0 * std::f64::consts::PI;
    let d = (a - b).rem_euclid(two_pi);
    d.min(two_pi - d)
}
