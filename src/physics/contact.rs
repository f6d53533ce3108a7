//! Elastic contact mechanics used by the stress/fracture penetration model.
//!
//! Hertzian contact of a rounded indenter (the projectile tip) against a flat
//! half-space (the target). All quantities are SI.

use std::f32::consts::PI;

/// Effective (reduced) elastic modulus of two bodies in contact.
///
/// `1 / E* = (1 - ν₀²) / E₀ + (1 - ν₁²) / E₁`
///
/// # Arguments
/// * `e0`, `nu0` - Young's modulus (Pa) and Poisson ratio of the first body
/// * `e1`, `nu1` - Young's modulus (Pa) and Poisson ratio of the second body
///
/// # Returns
/// The effective modulus in Pa, or zero if either modulus is non-positive
pub fn effective_elastic_modulus(e0: f32, nu0: f32, e1: f32, nu1: f32) -> f32 {
    if e0 <= 0.0 || e1 <= 0.0 {
        return 0.0;
    }
    let compliance = (1.0 - nu0 * nu0) / e0 + (1.0 - nu1 * nu1) / e1;
    if compliance <= 0.0 {
        return 0.0;
    }
    1.0 / compliance
}

/// Principal stresses at a point (Pa, compression negative).
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct PrincipalStresses {
    pub s1: f32,
    pub s2: f32,
    pub s3: f32,
}

impl PrincipalStresses {
    /// Von Mises equivalent stress.
    pub fn von_mises(&self) -> f32 {
        let a = self.s1 - self.s2;
        let b = self.s2 - self.s3;
        let c = self.s3 - self.s1;
        (0.5 * (a * a + b * b + c * c)).sqrt()
    }

    /// Largest principal stress magnitude.
    pub fn max_magnitude(&self) -> f32 {
        self.s1.abs().max(self.s2.abs()).max(self.s3.abs())
    }
}

/// Hertzian contact between a sphere-like tip and a flat target.
#[derive(Clone, Copy, Debug)]
pub struct HertzContact {
    /// Normal load (N).
    pub force: f32,
    /// Tip radius of curvature (m).
    pub radius: f32,
    /// Effective elastic modulus (Pa).
    pub effective_modulus: f32,
}

impl HertzContact {
    pub fn new(force: f32, radius: f32, effective_modulus: f32) -> Self {
        Self {
            force,
            radius,
            effective_modulus,
        }
    }

    fn is_degenerate(&self) -> bool {
        self.force <= 0.0 || self.radius <= 0.0 || self.effective_modulus <= 0.0
    }

    /// Mutual approach of the bodies, `d = (9F² / (16 E*² R))^⅓` (m).
    pub fn indentation_depth(&self) -> f32 {
        if self.is_degenerate() {
            return 0.0;
        }
        let e = self.effective_modulus;
        (9.0 * self.force * self.force / (16.0 * e * e * self.radius)).cbrt()
    }

    /// Contact patch radius, `a = √(R d)` (m).
    pub fn contact_radius(&self) -> f32 {
        (self.radius * self.indentation_depth()).sqrt()
    }

    /// Peak contact pressure, `P₀ = (1/π) (6 F E*² / R²)^⅓` (Pa).
    pub fn max_pressure(&self) -> f32 {
        if self.is_degenerate() {
            return 0.0;
        }
        let e = self.effective_modulus;
        (6.0 * self.force * e * e / (self.radius * self.radius)).cbrt() / PI
    }

    /// Principal stresses on the load axis at depth `z` below the surface.
    ///
    /// # Arguments
    /// * `z` - Depth below the contact surface (m)
    /// * `nu` - Poisson ratio of the loaded body
    pub fn axial_stresses(&self, z: f32, nu: f32) -> PrincipalStresses {
        let a = self.contact_radius();
        let p0 = self.max_pressure();
        if a <= 0.0 || p0 <= 0.0 {
            return PrincipalStresses::default();
        }
        let zeta = (z / a).max(1e-4);
        let sz = -p0 / (1.0 + zeta * zeta);
        let sr = p0 * (-(1.0 + nu) * (1.0 - zeta * (1.0 / zeta).atan()) + 0.5 / (1.0 + zeta * zeta));
        PrincipalStresses {
            s1: sr,
            s2: sr,
            s3: sz,
        }
    }

    /// Largest von Mises stress along the load axis.
    ///
    /// The maximum sits just below the surface (about half the contact radius
    /// for ν ≈ 0.3), so the axis is sampled down to 1.6 contact radii.
    pub fn peak_von_mises(&self, nu: f32) -> f32 {
        let a = self.contact_radius();
        if a <= 0.0 {
            return 0.0;
        }
        (1..=32)
            .map(|i| self.axial_stresses(a * 0.05 * i as f32, nu).von_mises())
            .fold(0.0, f32::max)
    }
}

/// Mode I stress intensity `K = σ √(π a)` for a crack of length `a` (Pa·m½).
pub fn stress_intensity(stress: f32, crack_length: f32) -> f32 {
    if crack_length <= 0.0 {
        return 0.0;
    }
    stress.abs() * (PI * crack_length).sqrt()
}

/// Elastic strain energy per unit volume, `σ² / 2E` (J/m³).
pub fn strain_energy_density(stress: f32, youngs_modulus: f32) -> f32 {
    if youngs_modulus <= 0.0 {
        return 0.0;
    }
    stress * stress / (2.0 * youngs_modulus)
}

/// Tate target resistance for a ductile material (Pa).
///
/// `R = Y (2/3 + ln(0.57 E / Y))`, with the logarithm floored so the result
/// never drops below the flow stress itself.
pub fn target_resistance(flow_stress: f32, youngs_modulus: f32) -> f32 {
    if flow_stress <= 0.0 {
        return 0.0;
    }
    let ratio = (0.57 * youngs_modulus / flow_stress).max((1.0_f32 / 3.0).exp());
    flow_stress * (2.0 / 3.0 + ratio.ln())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_modulus_of_identical_bodies() {
        let e = 200.0e9;
        let nu = 0.3;
        let expected = e / (2.0 * (1.0 - nu * nu));
        let actual = effective_elastic_modulus(e, nu, e, nu);
        assert!((actual - expected).abs() / expected < 1e-5);
        assert_eq!(effective_elastic_modulus(0.0, nu, e, nu), 0.0);
    }

    #[test]
    fn test_peak_von_mises_matches_hertz_ratio() {
        let contact = HertzContact::new(1000.0, 0.004, 100.0e9);
        let ratio = contact.peak_von_mises(0.3) / contact.max_pressure();
        assert!((ratio - 0.62).abs() < 0.02, "ratio was {ratio}");
    }

    #[test]
    fn test_degenerate_contact_is_zero() {
        let contact = HertzContact::new(0.0, 0.004, 100.0e9);
        assert_eq!(contact.max_pressure(), 0.0);
        assert_eq!(contact.indentation_depth(), 0.0);
        assert_eq!(contact.peak_von_mises(0.3), 0.0);
    }

    #[test]
    fn test_pure_hydrostatic_has_no_von_mises() {
        let s = PrincipalStresses {
            s1: -5.0,
            s2: -5.0,
            s3: -5.0,
        };
        assert_eq!(s.von_mises(), 0.0);
        assert_eq!(s.max_magnitude(), 5.0);
    }

    #[test]
    fn test_target_resistance_exceeds_flow_stress() {
        let steel = target_resistance(456.0e6, 200.0e9);
        assert!(steel > 456.0e6 * 5.0);
        assert!(target_resistance(1.0e6, 1.0e3) >= 1.0e6);
    }
}
