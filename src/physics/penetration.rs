//! Penetration and exit-velocity models.
//!
//! Three strategies, chosen per material:
//! - **Complex** (default): staged tip/body penetration with Hertzian contact,
//!   von Mises yield and fracture-toughness tests, Tate target resistance,
//!   elastic strain energy and fracture energy.
//! - **Simplified**: threshold comparison of penetration value and kinetic
//!   energy against the material's requirements, with a fixed energy loss per
//!   centimeter.
//! - **Fluid**: exponential drag inside the medium.
//!
//! Thickness and depth are in cm; velocities in cm/s.

use bevy::prelude::*;

use super::contact::{
    effective_elastic_modulus, strain_energy_density, stress_intensity, target_resistance,
    HertzContact,
};
use super::units::{
    cm_to_m, kinetic_energy, m_to_cm, map_range_clamped, obliquity_degrees, speed_from_energy,
};
use super::Penetrator;
use crate::materials::{MaterialProperties, PenetrationComplexity, PenetrationRequirement};

/// Speed (m/s) at which a body inside a fluid is considered stopped.
const FLUID_STOP_SPEED: f32 = 0.1;

/// Smallest cosine used when stretching thickness by obliquity.
const MIN_OBLIQUITY_COSINE: f32 = 0.2;

/// Body lengths travelled inside a target before a long body yaws.
const STABLE_NECK_LENGTHS: f32 = 4.0;

/// Outcome of pushing a projectile into a slab of material.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct PenetrationResult {
    /// Velocity on leaving the far face (cm/s); zero when stopped.
    pub exit_velocity: Vec3,
    /// Depth reached, measured along the surface normal (cm).
    pub depth: f32,
    /// Kinetic energy lost inside the material (J).
    pub energy_loss: f32,
    /// True when the projectile came out the other side.
    pub penetrated: bool,
    /// False when the inputs were unusable; every other field is then zero.
    pub is_valid: bool,
}

impl PenetrationResult {
    fn invalid() -> Self {
        Self::default()
    }

    fn stopped(depth: f32, energy_loss: f32) -> Self {
        Self {
            exit_velocity: Vec3::ZERO,
            depth: depth.max(0.0),
            energy_loss,
            penetrated: false,
            is_valid: true,
        }
    }

    /// Exit speed (cm/s).
    pub fn exit_speed(&self) -> f32 {
        self.exit_velocity.length()
    }
}

/// Calculates exit velocity and depth using the material's strategy.
///
/// # Arguments
/// * `penetrator` - The moving body
/// * `impact_velocity` - Velocity at the entry face (cm/s)
/// * `surface_normal` - Normal of the entry face
/// * `thickness` - Material thickness along the travel path (cm)
/// * `material` - Target material
///
/// # Returns
/// The penetration result. The exit speed never exceeds the impact speed, and
/// a stopped projectile reports its full kinetic energy as `energy_loss`.
pub fn calculate_exit_velocity(
    penetrator: &Penetrator,
    impact_velocity: Vec3,
    surface_normal: Vec3,
    thickness: f32,
    material: &MaterialProperties,
) -> PenetrationResult {
    if !penetrator.is_valid() || !material.is_valid() || thickness <= 0.0 {
        return PenetrationResult::invalid();
    }

    if impact_velocity.length_squared() <= f32::EPSILON {
        return PenetrationResult::stopped(0.0, 0.0);
    }

    let result = if material.is_fluid {
        fluid_penetration(penetrator, impact_velocity, thickness, material)
    } else {
        match material.complexity {
            PenetrationComplexity::Simplified => {
                simple_exit_velocity(penetrator, impact_velocity, surface_normal, thickness, material)
            }
            PenetrationComplexity::Complex => {
                complex_exit_velocity(penetrator, impact_velocity, surface_normal, thickness, material)
            }
        }
    };

    clamp_to_impact(result, impact_velocity, penetrator.mass)
}

fn clamp_to_impact(mut result: PenetrationResult, impact_velocity: Vec3, mass: f32) -> PenetrationResult {
    let impact_speed = impact_velocity.length();
    if result.exit_speed() > impact_speed {
        result.exit_velocity = result.exit_velocity.normalize_or_zero() * impact_speed;
    }
    if result.exit_speed() <= 0.0 {
        result.exit_velocity = Vec3::ZERO;
        result.penetrated = false;
        result.energy_loss = kinetic_energy(mass, cm_to_m(impact_speed));
    }
    result
}

/// Shapes the exit velocity: travel direction kept, the component along the
/// surface damped by 5-15% depending on obliquity.
fn exit_velocity_vector(impact_velocity: Vec3, surface_normal: Vec3, exit_speed: f32) -> Vec3 {
    let direction = impact_velocity.normalize_or_zero();
    let normal = surface_normal.normalize_or_zero();
    let velocity = direction * exit_speed;
    if normal == Vec3::ZERO {
        return velocity;
    }
    let perpendicular = velocity.dot(normal) * normal;
    let parallel = velocity - perpendicular;
    let modifier = map_range_clamped(
        0.0,
        90.0,
        0.95,
        0.85,
        obliquity_degrees(impact_velocity, surface_normal),
    );
    parallel * modifier + perpendicular
}

/// Threshold-based penetration.
///
/// The requirement ratio (how far the projectile exceeds the requirement)
/// divides the per-centimeter energy loss, so projectiles far above the
/// requirement lose less energy per unit length.
pub fn simple_exit_velocity(
    penetrator: &Penetrator,
    impact_velocity: Vec3,
    surface_normal: Vec3,
    thickness: f32,
    material: &MaterialProperties,
) -> PenetrationResult {
    let simple = &material.simple;
    let impact_speed = cm_to_m(impact_velocity.length());
    let energy = kinetic_energy(penetrator.mass, impact_speed);
    let multiplier = 1.0 / material.penetration_resistance_multiplier.max(0.01);

    let pen_ratio = penetrator.penetration_value / simple.penetration_resistance.max(f32::EPSILON);
    let energy_ratio = energy / simple.energy_required.max(f32::EPSILON);
    let pen_met = penetrator.penetration_value * multiplier >= simple.penetration_resistance;
    let energy_met = energy * multiplier >= simple.energy_required;

    let (can_penetrate, ratio) = match simple.requirement {
        PenetrationRequirement::ResistanceThreshold => (pen_met, pen_ratio),
        PenetrationRequirement::EnergyThreshold => (energy_met, energy_ratio),
        PenetrationRequirement::Both => (pen_met && energy_met, (pen_ratio + energy_ratio) / 2.0),
    };

    if !can_penetrate {
        let depth = (ratio * thickness).clamp(0.0, thickness);
        return PenetrationResult::stopped(depth, energy);
    }

    let loss_per_cm = simple.energy_loss_per_cm / ratio.max(1e-3) / multiplier;
    let energy_loss = thickness * loss_per_cm;
    let exit_speed = speed_from_energy(energy - energy_loss, penetrator.mass);

    if exit_speed <= 0.0 {
        let depth = if loss_per_cm > 0.0 { energy / loss_per_cm } else { thickness };
        return PenetrationResult::stopped(depth.min(thickness), energy);
    }

    PenetrationResult {
        exit_velocity: exit_velocity_vector(impact_velocity, surface_normal, m_to_cm(exit_speed)),
        depth: thickness,
        energy_loss,
        penetrated: true,
        is_valid: true,
    }
}

/// Exponential drag inside a fluid: `v(x) = v₀ e^(-k x)`, `k = ρ Cd A / 2m`.
pub fn fluid_penetration(
    penetrator: &Penetrator,
    impact_velocity: Vec3,
    thickness: f32,
    material: &MaterialProperties,
) -> PenetrationResult {
    let impact_speed = cm_to_m(impact_velocity.length());
    let energy = kinetic_energy(penetrator.mass, impact_speed);
    let k = material.density_si() * penetrator.nose.nose_coefficient() * penetrator.frontal_area()
        / (2.0 * penetrator.mass);
    if k <= 0.0 {
        return PenetrationResult::invalid();
    }

    let stop_depth = (impact_speed / FLUID_STOP_SPEED).max(1.0).ln() / k;
    let path = cm_to_m(thickness);
    if path >= stop_depth {
        return PenetrationResult::stopped(m_to_cm(stop_depth), energy);
    }

    let exit_speed = impact_speed * (-k * path).exp();
    PenetrationResult {
        exit_velocity: impact_velocity.normalize_or_zero() * m_to_cm(exit_speed),
        depth: thickness,
        energy_loss: energy - kinetic_energy(penetrator.mass, exit_speed),
        penetrated: true,
        is_valid: true,
    }
}

/// Resistance law `F = A (a + b v²)` integrated over one path segment.
#[derive(Clone, Copy, Debug)]
struct Segment {
    /// Presented area (m²).
    area: f32,
    /// Velocity-independent resistance (Pa).
    strength: f32,
    /// Inertial coefficient (kg/m³).
    inertia: f32,
    /// Segment length (m).
    length: f32,
}

impl Segment {
    /// Returns `(speed out, distance covered)`; speed out is zero if the body
    /// stops inside the segment.
    fn traverse(&self, mass: f32, speed: f32) -> (f32, f32) {
        if speed <= 0.0 || self.length <= 0.0 {
            return (speed.max(0.0), 0.0);
        }
        let (a, b) = (self.strength, self.inertia);
        if b <= 0.0 {
            let energy = kinetic_energy(mass, speed) - a * self.area * self.length;
            if energy <= 0.0 {
                let depth = kinetic_energy(mass, speed) / (a * self.area).max(f32::EPSILON);
                return (0.0, depth.min(self.length));
            }
            return (speed_from_energy(energy, mass), self.length);
        }
        let k = 2.0 * self.area * b / mass;
        let v2 = ((a + b * speed * speed) * (-k * self.length).exp() - a) / b;
        if v2 <= 0.0 {
            let depth = if a > 0.0 {
                (1.0 + b * speed * speed / a).ln() / k
            } else {
                self.length
            };
            return (0.0, depth.min(self.length));
        }
        (v2.sqrt(), self.length)
    }
}

/// Intermediate values of the stress/fracture model, exposed for debugging.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ContactAnalysis {
    pub effective_modulus: f32,
    pub peak_pressure: f32,
    pub von_mises: f32,
    pub stress_intensity: f32,
    pub indentation: f32,
    pub yielded: bool,
    pub fractured: bool,
}

/// Contact stresses at first impact.
///
/// The impact load is the stagnation force `½ ρ_t v² A` applied through the
/// tip radius of curvature.
pub fn analyze_contact(
    penetrator: &Penetrator,
    impact_speed: f32,
    material: &MaterialProperties,
) -> ContactAnalysis {
    let projectile = penetrator.material;
    let effective_modulus = effective_elastic_modulus(
        projectile.youngs_modulus_si(),
        projectile.poissons_ratio,
        material.youngs_modulus_si(),
        material.poissons_ratio,
    );
    let force = 0.5 * material.density_si() * impact_speed * impact_speed * penetrator.frontal_area();
    let tip_radius = penetrator.radius * penetrator.nose.tip_radius_factor();
    let contact = HertzContact::new(force, tip_radius, effective_modulus);

    let peak_pressure = contact.max_pressure();
    let von_mises = contact.peak_von_mises(material.poissons_ratio);
    let intensity = stress_intensity(peak_pressure, contact.contact_radius());

    ContactAnalysis {
        effective_modulus,
        peak_pressure,
        von_mises,
        stress_intensity: intensity,
        indentation: contact.indentation_depth(),
        yielded: von_mises >= material.dynamic_yield_si(),
        fractured: intensity >= material.fracture_toughness_si(),
    }
}

/// Stress/fracture-based penetration.
///
/// The path is staged into a tip segment (half the frontal area on average,
/// over the nose length), a stable body segment (full frontal area), and for
/// long bodies a tumbling segment (side-on area, blunt-body inertia) once the
/// body has travelled a few lengths inside the target.
///
/// Each segment resists with `F = A (a + b v²)` where
/// - `a` sums Tate target resistance, elastic strain energy density and, when
///   the fracture criterion is met, fracture surface energy per unit volume,
///   all scaled by a density factor `clamp(√(ρ_t / ρ_p), 0.25, 1.5)`;
/// - `b = ½ ρ_t C_n`, the inertial term of the displaced material.
///
/// If the contact stress neither yields nor fractures the target, the
/// projectile stops at the elastic indentation depth.
pub fn complex_exit_velocity(
    penetrator: &Penetrator,
    impact_velocity: Vec3,
    surface_normal: Vec3,
    thickness: f32,
    material: &MaterialProperties,
) -> PenetrationResult {
    let impact_speed = cm_to_m(impact_velocity.length());
    let energy = kinetic_energy(penetrator.mass, impact_speed);
    let obliquity = obliquity_degrees(impact_velocity, surface_normal);
    let cos_obliquity = obliquity.to_radians().cos().max(MIN_OBLIQUITY_COSINE);
    let path_length = cm_to_m(thickness) / cos_obliquity;

    let contact = analyze_contact(penetrator, impact_speed, material);
    if !contact.yielded && !contact.fractured {
        let depth = contact.indentation.min(cm_to_m(thickness));
        return PenetrationResult::stopped(m_to_cm(depth), energy);
    }

    let dynamic_yield = material.dynamic_yield_si();
    let flow_stress = if contact.fractured && material.compressive_strength > material.yield_strength {
        dynamic_yield.max(material.compressive_strength_si())
    } else {
        dynamic_yield
    };
    let resistance = target_resistance(flow_stress, material.youngs_modulus_si());
    let elastic = strain_energy_density(dynamic_yield, material.youngs_modulus_si());
    let fracture = if contact.fractured {
        2.0 * material.critical_energy_release_rate() / penetrator.radius
    } else {
        0.0
    };

    let density_factor = (material.density_si() / penetrator.bulk_density().max(f32::EPSILON))
        .sqrt()
        .clamp(0.25, 1.5);
    let strength = (resistance + elastic + fracture)
        * density_factor
        * material.penetration_resistance_multiplier;
    let inertia = 0.5 * material.density_si() * penetrator.nose.nose_coefficient();

    let area = penetrator.frontal_area();
    let tip_length = penetrator.nose_length().min(path_length);
    let neck_length = if penetrator.can_tumble() {
        (STABLE_NECK_LENGTHS * penetrator.length - tip_length).max(0.0)
    } else {
        f32::INFINITY
    };
    let body_length = (path_length - tip_length).min(neck_length);
    let tumble_length = path_length - tip_length - body_length;

    let segments = [
        Segment {
            area: 0.5 * area,
            strength,
            inertia,
            length: tip_length,
        },
        Segment {
            area,
            strength,
            inertia,
            length: body_length,
        },
        Segment {
            area: penetrator.side_area(),
            strength,
            inertia: 0.5 * material.density_si(),
            length: tumble_length.max(0.0),
        },
    ];

    let mut speed = impact_speed;
    let mut travelled = 0.0;
    for segment in segments {
        let (out, covered) = segment.traverse(penetrator.mass, speed);
        travelled += covered;
        speed = out;
        if speed <= 0.0 {
            let depth = (travelled * cos_obliquity).min(cm_to_m(thickness));
            return PenetrationResult::stopped(m_to_cm(depth), energy);
        }
    }

    let exit_speed = m_to_cm(speed);
    let exit_velocity = exit_velocity_vector(impact_velocity, surface_normal, exit_speed);
    PenetrationResult {
        exit_velocity,
        depth: thickness,
        energy_loss: energy - kinetic_energy(penetrator.mass, cm_to_m(exit_velocity.length())),
        penetrated: true,
        is_valid: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::{presets, SimplePenetrationProperties};
    use crate::physics::test_support::*;

    const MUZZLE: f32 = 83_000.0;

    fn fire(material: &MaterialProperties, thickness_cm: f32, speed: f32) -> PenetrationResult {
        let copper = copper();
        let bullet = rifle_bullet(&copper);
        calculate_exit_velocity(&bullet, Vec3::NEG_Y * speed, Vec3::Y, thickness_cm, material)
    }

    #[test]
    fn test_zero_speed_has_no_motion() {
        for material in presets::all() {
            let result = fire(&material, 10.0, 0.0);
            assert_eq!(result.exit_velocity, Vec3::ZERO, "{}", material.name);
            assert_eq!(result.depth, 0.0, "{}", material.name);
            assert!(!result.penetrated);
        }
    }

    #[test]
    fn test_one_meter_of_any_solid_stops_rifle_bullet() {
        for material in presets::all().into_iter().filter(|m| !m.is_fluid) {
            let result = fire(&material, 100.0, MUZZLE);
            assert!(result.is_valid, "{}", material.name);
            assert_eq!(result.exit_velocity, Vec3::ZERO, "{} was penetrated", material.name);
            assert!(result.depth <= 100.0, "{}", material.name);
        }
    }

    #[test]
    fn test_rifle_bullet_through_one_centimeter_of_steel() {
        let result = fire(&presets::steel(), 1.0, MUZZLE);
        assert!(result.penetrated);
        assert!(result.exit_speed() > 0.0);
        assert!(result.exit_speed() < MUZZLE);
        assert!(result.energy_loss > 0.0);
    }

    #[test]
    fn test_rifle_bullet_stops_in_fifty_centimeters_of_steel() {
        let result = fire(&presets::steel(), 50.0, MUZZLE);
        assert!(!result.penetrated);
        assert_eq!(result.exit_velocity, Vec3::ZERO);
        assert!(result.depth > 0.0 && result.depth <= 50.0);
        let full_energy = kinetic_energy(0.0095, 830.0);
        assert!((result.energy_loss - full_energy).abs() < 1.0);
    }

    #[test]
    fn test_exit_never_faster_than_impact() {
        for material in presets::all() {
            for thickness in [0.1, 1.0, 5.0] {
                let result = fire(&material, thickness, MUZZLE);
                assert!(result.exit_speed() <= MUZZLE, "{}", material.name);
            }
        }
    }

    #[test]
    fn test_thicker_plates_slow_more() {
        let aluminum = presets::aluminum();
        let thin = fire(&aluminum, 0.5, MUZZLE);
        let thick = fire(&aluminum, 2.0, MUZZLE);
        assert!(thin.exit_speed() > thick.exit_speed());
    }

    #[test]
    fn test_oblique_impact_is_harder() {
        let copper = copper();
        let bullet = rifle_bullet(&copper);
        let steel = presets::steel();
        let square = calculate_exit_velocity(&bullet, Vec3::NEG_Y * MUZZLE, Vec3::Y, 1.0, &steel);
        let angled_dir = Vec3::new(1.0, -1.0, 0.0).normalize();
        let angled = calculate_exit_velocity(&bullet, angled_dir * MUZZLE, Vec3::Y, 1.0, &steel);
        assert!(angled.exit_speed() < square.exit_speed());
    }

    #[test]
    fn test_invalid_inputs_are_flagged() {
        let steel = presets::steel();
        assert!(!fire(&steel, 0.0, MUZZLE).is_valid);
        assert!(!fire(&steel, -2.0, MUZZLE).is_valid);
        assert!(!fire(&MaterialProperties::default(), 1.0, MUZZLE).is_valid);
    }

    #[test]
    fn test_simple_model_thresholds() {
        let copper = copper();
        let bullet = rifle_bullet(&copper);
        let board = presets::softwood().with_simple(SimplePenetrationProperties {
            penetration_resistance: 1.0,
            requirement: PenetrationRequirement::EnergyThreshold,
            energy_loss_per_cm: 100.0,
            energy_required: 5000.0,
        });
        // 3.3 kJ is below the 5 kJ requirement.
        let result = calculate_exit_velocity(&bullet, Vec3::NEG_Y * MUZZLE, Vec3::Y, 2.0, &board);
        assert!(!result.penetrated);
        assert!(result.depth <= 2.0);

        let thin = presets::softwood().with_simple(SimplePenetrationProperties {
            energy_required: 100.0,
            ..board.simple
        });
        let result = calculate_exit_velocity(&bullet, Vec3::NEG_Y * MUZZLE, Vec3::Y, 2.0, &thin);
        assert!(result.penetrated);
        assert!(result.exit_speed() < MUZZLE);
    }

    #[test]
    fn test_fluid_slows_exponentially() {
        let water = presets::water();
        let shallow = fire(&water, 10.0, MUZZLE);
        let deeper = fire(&water, 40.0, MUZZLE);
        assert!(shallow.penetrated && deeper.penetrated);
        assert!(deeper.exit_speed() < shallow.exit_speed());
        let deep = fire(&water, 5_000.0, MUZZLE);
        assert!(!deep.penetrated);
        assert!(deep.depth < 5_000.0);
    }

    #[test]
    fn test_low_speed_contact_stays_elastic() {
        let copper = copper();
        let bullet = rifle_bullet(&copper);
        let analysis = analyze_contact(&bullet, 1.0, &presets::hardened_steel());
        assert!(!analysis.yielded);
        assert!(!analysis.fractured);
    }
}
