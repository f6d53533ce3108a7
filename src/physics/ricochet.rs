//! Ricochet decision.
//!
//! The impact angle is the obliquity: 0° head-on, 90° grazing. Critical and
//! cutoff angles are measured from the surface plane, so a ricochet needs
//! `90° - obliquity` below the critical angle.

use bevy::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::contact::target_resistance;
use super::units::{cm_to_m, kinetic_energy, m_to_cm, obliquity_degrees, speed_from_energy};
use super::Penetrator;
use crate::materials::{MaterialProperties, RicochetProperties};

/// Below this speed (m/s) nothing ricochets.
pub const MIN_RICOCHET_SPEED: f32 = 25.0;

/// Critical angle for fluids at equal densities (degrees from surface).
const FLUID_CRITICAL_ANGLE: f32 = 18.0;

/// Standard deviation of the outgoing direction scatter (radians).
const RICOCHET_SCATTER: f32 = 0.02;

/// Result of a ricochet decision.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RicochetOutcome {
    pub ricochet: bool,
    /// Outgoing velocity (cm/s); zero when there is no ricochet.
    pub velocity: Vec3,
    /// Energy left in the surface (J).
    pub imparted_energy: f32,
    /// Likelihood the decision was drawn against.
    pub probability: f32,
}

/// Picks the policy that applies: the material's own when it carries one,
/// otherwise the projectile's.
pub fn select_policy<'a>(
    material: &'a MaterialProperties,
    projectile_policy: &'a RicochetProperties,
) -> &'a RicochetProperties {
    if material.use_custom_ricochet {
        &material.ricochet
    } else {
        projectile_policy
    }
}

/// Reflects a direction about a surface normal.
pub fn reflect(direction: Vec3, normal: Vec3) -> Vec3 {
    let n = normal.normalize_or_zero();
    direction - 2.0 * direction.dot(n) * n
}

fn flow_stress(material: &MaterialProperties) -> f32 {
    material.yield_strength_si().max(material.compressive_strength_si())
        * material.strain_rate_factor.max(1.0)
}

/// Largest angle from the surface plane (degrees) at which a ricochet is
/// still possible.
///
/// Solids balance the target's flow stress against the projectile's dynamic
/// pressure; fluids use a density-scaled skip angle. The result is capped by
/// the policy's limit and cutoff angles.
pub fn critical_angle(
    penetrator: &Penetrator,
    speed: f32,
    material: &MaterialProperties,
    policy: &RicochetProperties,
) -> f32 {
    let projectile_density = penetrator.material.density_si();
    if projectile_density <= 0.0 || speed <= 0.0 {
        return 0.0;
    }

    let angle = if material.is_fluid {
        FLUID_CRITICAL_ANGLE * (material.density_si() / projectile_density).sqrt()
    } else {
        let dynamic_pressure = 0.5 * projectile_density * speed * speed;
        (flow_stress(material) / dynamic_pressure).sqrt().atan().to_degrees()
    };

    let angle = match policy.limit_angle {
        Some(limit) => angle.min(limit),
        None => angle,
    };
    angle.min(policy.cutoff_angle).max(0.0)
}

/// Coefficient of restitution from the yield strengths of the pair.
pub fn restitution(projectile: &MaterialProperties, target: &MaterialProperties) -> f32 {
    let yt = target.yield_strength_si();
    let yp = projectile.yield_strength_si();
    if yt + yp <= 0.0 {
        return 0.05;
    }
    (0.7 * (yt / (yt + yp)).sqrt()).clamp(0.05, 0.8)
}

/// Deformation energy left in the surface (J).
///
/// Only the normal velocity component is lost: `½ m vₙ² (1 - e²) (1 + μ)`.
///
/// # Arguments
/// * `mass` - Projectile mass (kg)
/// * `speed` - Impact speed (m/s)
/// * `obliquity` - Impact obliquity (degrees)
/// * `restitution` - Coefficient of restitution
/// * `friction` - Surface friction coefficient
pub fn imparted_energy(mass: f32, speed: f32, obliquity: f32, restitution: f32, friction: f32) -> f32 {
    let normal_speed = speed * obliquity.to_radians().cos().max(0.0);
    kinetic_energy(mass, normal_speed) * (1.0 - restitution * restitution) * (1.0 + friction.max(0.0))
}

/// Most energy the surface can absorb without the projectile digging in (J).
///
/// Target resistance over the frontal area, acting across one caliber radius
/// or the whole thickness, whichever is smaller.
pub fn max_energy_transfer(penetrator: &Penetrator, material: &MaterialProperties, thickness: f32) -> f32 {
    let resistance = target_resistance(flow_stress(material), material.youngs_modulus_si());
    resistance * penetrator.frontal_area() * penetrator.radius.min(cm_to_m(thickness).max(0.0))
}

/// Deterministic ricochet likelihood in `[0, 1]`.
///
/// Non-decreasing as the obliquity approaches grazing: both the angle margin
/// and the energy margin grow with obliquity.
///
/// # Arguments
/// * `penetrator` - The moving body
/// * `velocity` - Impact velocity (cm/s)
/// * `normal` - Surface normal at the impact
/// * `thickness` - Material thickness (cm)
/// * `material` - Target material
/// * `policy` - Ricochet policy in force
pub fn ricochet_probability(
    penetrator: &Penetrator,
    velocity: Vec3,
    normal: Vec3,
    thickness: f32,
    material: &MaterialProperties,
    policy: &RicochetProperties,
) -> f32 {
    let speed = cm_to_m(velocity.length());
    if !policy.allow_ricochet || speed < MIN_RICOCHET_SPEED {
        return 0.0;
    }
    if policy.probability_overrides_calculation {
        return policy.probability.clamp(0.0, 1.0);
    }

    let crit = critical_angle(penetrator, speed, material, policy);
    if crit <= 0.0 {
        return 0.0;
    }
    let obliquity = obliquity_degrees(velocity, normal);
    let grazing = 90.0 - obliquity;
    let angle_margin = (1.0 - grazing / crit).clamp(0.0, 1.0);
    if angle_margin <= 0.0 {
        return 0.0;
    }

    let imparted = imparted_energy(
        penetrator.mass,
        speed,
        obliquity,
        restitution(penetrator.material, material),
        material.friction,
    );
    let max_transfer = max_energy_transfer(penetrator, material, thickness);
    let energy_margin = if max_transfer > 0.0 {
        (1.0 - imparted / max_transfer).clamp(0.0, 1.0)
    } else if material.is_fluid {
        1.0
    } else {
        0.0
    };

    angle_margin * energy_margin
}

/// Decides whether the impact ricochets and computes the outgoing velocity.
///
/// With `add_randomness` the decision is a draw against
/// [`ricochet_probability`] and the outgoing direction is scattered slightly;
/// without it any non-zero likelihood ricochets. A probability override draws
/// against the configured probability and skips the angle and energy tests.
pub fn should_ricochet<R: Rng + ?Sized>(
    penetrator: &Penetrator,
    velocity: Vec3,
    normal: Vec3,
    thickness: f32,
    material: &MaterialProperties,
    policy: &RicochetProperties,
    rng: &mut R,
) -> RicochetOutcome {
    let probability = ricochet_probability(penetrator, velocity, normal, thickness, material, policy);
    let ricochet = if policy.probability_overrides_calculation || policy.add_randomness {
        probability > 0.0 && rng.random::<f32>() < probability
    } else {
        probability > 0.0
    };
    if !ricochet {
        return RicochetOutcome {
            probability,
            ..Default::default()
        };
    }

    let speed = cm_to_m(velocity.length());
    let obliquity = obliquity_degrees(velocity, normal);
    let imparted = imparted_energy(
        penetrator.mass,
        speed,
        obliquity,
        restitution(penetrator.material, material),
        material.friction,
    );
    let energy = kinetic_energy(penetrator.mass, speed);
    let imparted = imparted.min(energy);
    let out_speed = speed_from_energy(energy - imparted, penetrator.mass);

    let reflected = reflect(velocity.normalize_or_zero(), normal);
    let direction = if policy.add_randomness {
        scatter(reflected, normal, rng)
    } else {
        reflected
    };

    RicochetOutcome {
        ricochet: true,
        velocity: direction * m_to_cm(out_speed),
        imparted_energy: imparted,
        probability,
    }
}

/// Small normal-distributed scatter of the outgoing direction, rejected if it
/// would send the body back into the surface.
fn scatter<R: Rng + ?Sized>(direction: Vec3, normal: Vec3, rng: &mut R) -> Vec3 {
    let Ok(distribution) = Normal::new(0.0_f32, RICOCHET_SCATTER) else {
        return direction;
    };
    let rotation = Quat::from_euler(
        EulerRot::XYZ,
        distribution.sample(rng),
        distribution.sample(rng),
        0.0,
    );
    let scattered = (rotation * direction).normalize_or_zero();
    if scattered.dot(normal) * direction.dot(normal) > 0.0 {
        scattered
    } else {
        direction
    }
}
