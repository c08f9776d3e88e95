//! Physical constants and isotope lookups in SI units.

use crate::error::{FrameOrderError, Result};
use std::f64::consts::PI;

/// Permeability of free space.
pub const MU0: f64 = 4.0 * PI * 1e-7;
/// Planck's constant.
pub const H: f64 = 6.62606876e-34;
/// Reduced Planck's constant.
pub const H_BAR: f64 = H / (2.0 * PI);
/// Boltzmann's constant.
pub const K_B: f64 = 1.3806503e-23;
/// Proton gyromagnetic ratio, used to convert spectrometer frequencies into field strengths.
pub const G1H: f64 = 26.7522212e7;

pub const NH_BOND_LENGTH: f64 = 1.02e-10;

struct IsotopeEntry {
    name: &'static str,
    gyromagnetic_ratio: f64,
    mass: f64,
}

const ISOTOPES: &[IsotopeEntry] = &[
    IsotopeEntry { name: "1H", gyromagnetic_ratio: G1H, mass: 1.00782503207 },
    IsotopeEntry { name: "2H", gyromagnetic_ratio: 4.1066e7, mass: 2.0141017778 },
    IsotopeEntry { name: "12C", gyromagnetic_ratio: 0.0, mass: 12.0 },
    IsotopeEntry { name: "13C", gyromagnetic_ratio: 6.728e7, mass: 13.0033548378 },
    IsotopeEntry { name: "14N", gyromagnetic_ratio: 1.9331e7, mass: 14.0030740048 },
    IsotopeEntry { name: "15N", gyromagnetic_ratio: -2.7126e7, mass: 15.0001088982 },
    IsotopeEntry { name: "16O", gyromagnetic_ratio: 0.0, mass: 15.99491461956 },
    IsotopeEntry { name: "17O", gyromagnetic_ratio: -3.6281e7, mass: 16.99913170 },
    IsotopeEntry { name: "19F", gyromagnetic_ratio: 25.18148e7, mass: 18.99840322 },
    IsotopeEntry { name: "31P", gyromagnetic_ratio: 10.8394e7, mass: 30.97376163 },
    IsotopeEntry { name: "32S", gyromagnetic_ratio: 0.0, mass: 31.97207100 },
];

fn lookup(isotope: &str) -> Result<&'static IsotopeEntry> {
    ISOTOPES
        .iter()
        .find(|entry| entry.name == isotope)
        .ok_or_else(|| FrameOrderError::UnknownIsotope(isotope.to_string()))
}

pub fn gyromagnetic_ratio(isotope: &str) -> Result<f64> {
    lookup(isotope).map(|entry| entry.gyromagnetic_ratio)
}

pub fn isotope_mass(isotope: &str) -> Result<f64> {
    lookup(isotope).map(|entry| entry.mass)
}

/// Dipolar constant `-mu0 / (4 pi) * g1 g2 hbar / r^3`.
pub fn dipolar_constant(g1: f64, g2: f64, r: f64) -> f64 {
    -MU0 / (4.0 * PI) * g1 * g2 * H_BAR / r.powi(3)
}

/// The RDC prefactor in Hz, `3 / (2 pi)` times the dipolar constant.
pub fn rdc_constant(g1: f64, g2: f64, r: f64) -> f64 {
    3.0 / (2.0 * PI) * dipolar_constant(g1, g2, r)
}

/// PCS prefactor `mu0 15 kB T / (4 pi Bo^2 r^3)`.
pub fn pcs_constant(temperature: f64, field: f64, r: f64) -> f64 {
    MU0 * 15.0 * K_B * temperature / (4.0 * PI * field * field * r.powi(3))
}

/// Field strength in Tesla of a spectrometer with the given proton frequency in Hz.
pub fn frequency_to_tesla(frequency: f64) -> f64 {
    frequency * 2.0 * PI / G1H
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nh_dipolar_constant_magnitude() {
        let g1 = gyromagnetic_ratio("15N").unwrap();
        let g2 = gyromagnetic_ratio("1H").unwrap();
        let d = dipolar_constant(g1, g2, NH_BOND_LENGTH);
        // Positive because the 15N gyromagnetic ratio is negative.
        assert!(d > 0.0);
        assert!((d / (2.0 * PI) - 11_000.0).abs() < 1_000.0);
    }

    #[test]
    fn proton_frequency_round_trip() {
        let tesla = frequency_to_tesla(600e6);
        assert!((tesla - 14.09).abs() < 0.01);
    }

    #[test]
    fn unknown_isotope_is_rejected() {
        assert!(gyromagnetic_ratio("99X").is_err());
        assert!((isotope_mass("13C").unwrap() - 13.0033548378).abs() < 1e-12);
    }
}
