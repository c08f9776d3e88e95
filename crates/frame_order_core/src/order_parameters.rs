//! Isotropic cone order parameter conversions.
//!
//! For a uniform distribution within an isotropic cone of half-angle theta,
//! `S = cos(theta) (1 + cos(theta)) / 2`. S is monotonic on `[0, 2pi/3]`,
//! reaching its minimum of -1/8 at `theta = 2pi/3`.

pub const ISO_CONE_S_MIN: f64 = -0.125;

pub fn iso_cone_theta_to_s(theta: f64) -> f64 {
    let cos_theta = theta.cos();
    0.5 * cos_theta * (1.0 + cos_theta)
}

/// Inverse of [`iso_cone_theta_to_s`] on `[0, 2pi/3]`. Values outside
/// `[-1/8, 1]` are mapped onto the nearest end of that range.
pub fn iso_cone_s_to_theta(s: f64) -> f64 {
    let root = (1.0 + 8.0 * s).max(0.0).sqrt();
    ((root - 1.0) / 2.0).clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn limits() {
        assert!((iso_cone_s_to_theta(1.0)).abs() < 1e-12);
        assert!((iso_cone_s_to_theta(ISO_CONE_S_MIN) - 2.0 * PI / 3.0).abs() < 1e-12);
        assert!((iso_cone_theta_to_s(PI / 2.0)).abs() < 1e-12);
    }

    #[test]
    fn round_trip_over_monotonic_range() {
        let mut theta = 0.0;
        while theta <= 2.0 * PI / 3.0 {
            let back = iso_cone_s_to_theta(iso_cone_theta_to_s(theta));
            assert!((back - theta).abs() < 1e-6, "theta {} came back as {}", theta, back);
            theta += 0.05;
        }
    }

    #[test]
    fn out_of_range_order_parameters_are_clamped() {
        assert_eq!(iso_cone_s_to_theta(1.5), 0.0);
        assert!((iso_cone_s_to_theta(-0.5) - 2.0 * PI / 3.0).abs() < 1e-12);
    }
}
