//! Aerodynamic drag and flight integration (RK4 and Euler).
//!
//! Integration runs in SI; positions and velocities enter and leave in world
//! units (cm, cm/s).

use bevy::prelude::*;

use super::units::{vec_cm_to_m, vec_m_to_cm};
use super::Penetrator;

/// Aerodynamic description of a body in flight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AeroBody {
    /// Mass (kg).
    pub mass: f32,
    pub drag_coefficient: f32,
    /// Reference (frontal) area (m²).
    pub reference_area: f32,
}

impl From<&Penetrator<'_>> for AeroBody {
    fn from(penetrator: &Penetrator<'_>) -> Self {
        Self {
            mass: penetrator.mass,
            drag_coefficient: penetrator.drag_coefficient,
            reference_area: penetrator.frontal_area(),
        }
    }
}

/// Air conditions around the body, SI.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AirState {
    /// Gravity (m/s²), already scaled by any per-launch multiplier.
    pub gravity: Vec3,
    /// Wind velocity (m/s).
    pub wind: Vec3,
    /// Air density (kg/m³).
    pub air_density: f32,
}

impl Default for AirState {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            wind: Vec3::ZERO,
            air_density: 1.225,
        }
    }
}

/// Drag acceleration opposing the velocity relative to the air.
///
/// Uses the drag equation: F_drag = 0.5 * ρ * v² * Cd * A
///
/// # Arguments
/// * `body` - Mass and aerodynamic properties
/// * `velocity` - Ground velocity (m/s)
/// * `air` - Wind and density
///
/// # Returns
/// Acceleration (m/s²); zero for a body at rest relative to the air
pub fn drag_acceleration(body: &AeroBody, velocity: Vec3, air: &AirState) -> Vec3 {
    if body.mass <= 0.0 {
        return Vec3::ZERO;
    }

    // Velocity relative to air (accounting for wind)
    let relative_vel = velocity - air.wind;
    let speed = relative_vel.length();

    if speed < 0.001 {
        return Vec3::ZERO;
    }

    let direction = relative_vel / speed;
    let drag_magnitude =
        0.5 * air.air_density * speed * speed * body.drag_coefficient * body.reference_area;

    -direction * (drag_magnitude / body.mass)
}

/// Total acceleration on a body from gravity and aerodynamic drag.
pub fn calculate_acceleration(body: &AeroBody, velocity: Vec3, air: &AirState) -> Vec3 {
    air.gravity + drag_acceleration(body, velocity, air)
}

/// RK4 (Runge-Kutta 4th order) integration step.
///
/// # Arguments
/// * `position` - World position (cm)
/// * `velocity` - World velocity (cm/s)
/// * `dt` - Time step (s)
/// * `body` - Aerodynamic body
/// * `air` - Air conditions
///
/// # Returns
/// New `(position, velocity)` in world units
pub fn integrate_rk4(
    position: Vec3,
    velocity: Vec3,
    dt: f32,
    body: &AeroBody,
    air: &AirState,
) -> (Vec3, Vec3) {
    let vel = vec_cm_to_m(velocity);

    let k1 = calculate_acceleration(body, vel, air);
    let k2 = calculate_acceleration(body, vel + k1 * (dt / 2.0), air);
    let k3 = calculate_acceleration(body, vel + k2 * (dt / 2.0), air);
    let k4 = calculate_acceleration(body, vel + k3 * dt, air);

    let final_accel = (k1 + k2 * 2.0 + k3 * 2.0 + k4) / 6.0;

    let new_vel = vel + final_accel * dt;
    let new_velocity = vec_m_to_cm(new_vel);
    (position + new_velocity * dt, new_velocity)
}

/// Simple Euler integration step. Same units as [`integrate_rk4`].
pub fn integrate_euler(
    position: Vec3,
    velocity: Vec3,
    dt: f32,
    body: &AeroBody,
    air: &AirState,
) -> (Vec3, Vec3) {
    let vel = vec_cm_to_m(velocity);
    let accel = calculate_acceleration(body, vel, air);
    let new_velocity = vec_m_to_cm(vel + accel * dt);
    (position + new_velocity * dt, new_velocity)
}
