//! Global resources for the ballistics system.

use std::time::Duration;

use bevy::prelude::*;

use crate::materials::SurfaceType;
use crate::types::{EnvironmentProvider, PhysicsModel};

/// Global environment settings affecting all projectiles.
///
/// The worker receives a snapshot of this resource whenever it changes.
///
/// # Fields
/// * `gravity` - Gravity vector in meters per second squared
/// * `air_density` - Sea-level air density in kg/m³ affecting drag calculations
/// * `wind` - Wind velocity vector in meters per second
/// * `temperature` - Ambient temperature in Celsius affecting air density
/// * `altitude` - Altitude in meters affecting air density
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_terminal_ballistics::resources::BallisticsEnvironment;
///
/// let env = BallisticsEnvironment {
///     gravity: Vec3::new(0.0, -9.81, 0.0),
///     air_density: 1.1,
///     wind: Vec3::new(2.0, 0.0, 0.0),
///     temperature: 25.0,
///     altitude: 100.0,
/// };
/// assert!(env.effective_air_density() < 1.1);
/// ```
#[derive(Resource, Reflect, Clone, Debug, PartialEq)]
#[reflect(Resource)]
pub struct BallisticsEnvironment {
    /// Gravity vector (m/s²)
    pub gravity: Vec3,
    /// Air density affecting drag (kg/m³)
    pub air_density: f32,
    /// Wind velocity vector (m/s)
    pub wind: Vec3,
    /// Temperature affecting air density calculations (Celsius)
    pub temperature: f32,
    /// Altitude affecting air density (meters)
    pub altitude: f32,
}

impl Default for BallisticsEnvironment {
    /// Earth-like conditions: 9.81 m/s² downward, 1.225 kg/m³ at sea level,
    /// no wind, 15°C.
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            air_density: 1.225, // Standard at sea level
            wind: Vec3::ZERO,
            temperature: 15.0,
            altitude: 0.0,
        }
    }
}

impl BallisticsEnvironment {
    /// Calm air with no gravity; useful for tests and space scenes.
    pub fn vacuum() -> Self {
        Self {
            gravity: Vec3::ZERO,
            air_density: 0.0,
            ..Default::default()
        }
    }

    pub fn with_wind(mut self, wind: Vec3) -> Self {
        self.wind = wind;
        self
    }

    /// Calculate adjusted air density based on altitude and temperature.
    ///
    /// Uses a simplified barometric formula to adjust air density based on
    /// the current altitude and temperature conditions.
    pub fn effective_air_density(&self) -> f32 {
        // Simplified barometric formula
        let temp_kelvin = self.temperature + 273.15;
        if temp_kelvin <= 0.0 {
            return 0.0;
        }
        let pressure_ratio = (-self.altitude / 8500.0).exp();
        self.air_density * pressure_ratio * (288.15 / temp_kelvin)
    }

    /// Speed of sound in air (m/s): `c = 331.3 √(1 + T / 273.15)`.
    pub fn speed_of_sound(&self) -> f32 {
        331.3 * (1.0 + self.temperature / 273.15).max(0.0).sqrt()
    }
}

impl EnvironmentProvider for BallisticsEnvironment {
    fn wind_at(&self, _location: Vec3) -> Vec3 {
        self.wind
    }

    fn air_density_at(&self, location: Vec3) -> f32 {
        // World height is in centimeters.
        let local = Self {
            altitude: self.altitude + location.y / 100.0,
            ..self.clone()
        };
        local.effective_air_density()
    }

    fn gravity(&self) -> Vec3 {
        self.gravity
    }
}

/// Global configuration for the ballistics system.
///
/// # Fields
/// * `max_launches_per_tick` - Launches dispatched per tick; the rest wait
/// * `max_results_per_tick` - Worker messages drained per tick
/// * `worker_frequency_hz` - Fixed worker step rate
/// * `max_iterations` - Integration steps before a task is killed
/// * `min_penetration_depth` - Objects thinner than this (cm) are passed through
/// * `min_speed` - Speed (m/s) below which a body is spent
/// * `lifetime_range_factor` - Lifetime is this many times range over speed
/// * `shutdown_timeout` - Grace period for the worker to stop
/// * `default_surface` - Material used when a surface is unknown
/// * `physics_model` - Flight integration method
///
/// # Example
/// ```
/// use bevy_terminal_ballistics::resources::BallisticsConfig;
///
/// let config = BallisticsConfig {
///     max_launches_per_tick: 8,
///     ..Default::default()
/// };
/// assert!((config.fixed_step() - 1.0 / 64.0).abs() < 1e-6);
/// ```
#[derive(Resource, Reflect, Clone, Debug, PartialEq)]
#[reflect(Resource)]
pub struct BallisticsConfig {
    pub max_launches_per_tick: usize,
    pub max_results_per_tick: usize,
    pub worker_frequency_hz: f32,
    pub max_iterations: u32,
    pub min_penetration_depth: f32,
    pub min_speed: f32,
    pub lifetime_range_factor: f32,
    pub shutdown_timeout: Duration,
    pub default_surface: SurfaceType,
    pub physics_model: PhysicsModel,
}

impl Default for BallisticsConfig {
    fn default() -> Self {
        Self {
            max_launches_per_tick: 32,
            max_results_per_tick: 256,
            worker_frequency_hz: 64.0,
            max_iterations: 4096,
            min_penetration_depth: 0.01,
            min_speed: 0.5,
            lifetime_range_factor: 3.0,
            shutdown_timeout: Duration::from_secs(5),
            default_surface: SurfaceType::Concrete,
            physics_model: PhysicsModel::RK4,
        }
    }
}

impl BallisticsConfig {
    /// Worker step length (s).
    pub fn fixed_step(&self) -> f32 {
        1.0 / self.worker_frequency_hz.max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_density_falls_with_altitude() {
        let env = BallisticsEnvironment::default();
        let sea = env.air_density_at(Vec3::ZERO);
        let high = env.air_density_at(Vec3::Y * 300_000.0);
        assert!((sea - 1.225).abs() < 1e-3);
        assert!(high < sea);
    }

    #[test]
    fn test_speed_of_sound() {
        let env = BallisticsEnvironment {
            temperature: 0.0,
            ..Default::default()
        };
        assert!((env.speed_of_sound() - 331.3).abs() < 1e-3);
    }

    #[test]
    fn test_vacuum_has_no_drag_or_gravity() {
        let env = BallisticsEnvironment::vacuum();
        assert_eq!(env.gravity(), Vec3::ZERO);
        assert_eq!(env.air_density_at(Vec3::ZERO), 0.0);
    }
}
