//! Unit conversions between world space (centimeters) and physics space (SI).
//!
//! World positions, velocities and thicknesses arrive in centimeters. Every
//! physics function converts at its boundary and computes in meters, kilograms,
//! seconds and Pascals.

use bevy::prelude::*;

/// Centimeters per meter.
pub const CM_PER_M: f32 = 100.0;

/// Pascals per megapascal.
pub const PA_PER_MPA: f32 = 1.0e6;

/// Pascals per gigapascal.
pub const PA_PER_GPA: f32 = 1.0e9;

/// Converts a scalar length or speed from centimeters to meters.
#[inline]
pub fn cm_to_m(value: f32) -> f32 {
    value / CM_PER_M
}

/// Converts a scalar length or speed from meters to centimeters.
#[inline]
pub fn m_to_cm(value: f32) -> f32 {
    value * CM_PER_M
}

/// Converts a world-space vector (cm or cm/s) into SI (m or m/s).
#[inline]
pub fn vec_cm_to_m(value: Vec3) -> Vec3 {
    value / CM_PER_M
}

/// Converts an SI vector (m or m/s) into world space (cm or cm/s).
#[inline]
pub fn vec_m_to_cm(value: Vec3) -> Vec3 {
    value * CM_PER_M
}

/// Converts a density in g/cm³ to kg/m³.
#[inline]
pub fn g_cm3_to_kg_m3(value: f32) -> f32 {
    value * 1000.0
}

/// Kinetic energy (J) of a mass (kg) moving at a speed (m/s).
#[inline]
pub fn kinetic_energy(mass: f32, speed: f32) -> f32 {
    0.5 * mass * speed * speed
}

/// Speed (m/s) of a mass (kg) carrying the given kinetic energy (J).
///
/// Non-positive energy or mass yields zero.
#[inline]
pub fn speed_from_energy(energy: f32, mass: f32) -> f32 {
    if energy <= 0.0 || mass <= 0.0 {
        return 0.0;
    }
    (2.0 * energy / mass).sqrt()
}

/// Obliquity in degrees between a travel direction and a surface normal.
///
/// 0° is a head-on impact and 90° is grazing, regardless of which side of the
/// surface the normal points to.
pub fn obliquity_degrees(direction: Vec3, normal: Vec3) -> f32 {
    let dir = direction.normalize_or_zero();
    let n = normal.normalize_or_zero();
    if dir == Vec3::ZERO || n == Vec3::ZERO {
        return 0.0;
    }
    dir.dot(n).abs().clamp(0.0, 1.0).acos().to_degrees()
}

/// Linear remap of `value` from `[in_a, in_b]` to `[out_a, out_b]`, clamped to
/// the output range.
pub fn map_range_clamped(in_a: f32, in_b: f32, out_a: f32, out_b: f32, value: f32) -> f32 {
    if (in_b - in_a).abs() <= f32::EPSILON {
        return out_a;
    }
    let t = ((value - in_a) / (in_b - in_a)).clamp(0.0, 1.0);
    out_a + (out_b - out_a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_round_trip() {
        let energy = kinetic_energy(0.0095, 830.0);
        assert!((energy - 3272.275).abs() < 0.1);
        assert!((speed_from_energy(energy, 0.0095) - 830.0).abs() < 0.01);
        assert_eq!(speed_from_energy(-1.0, 0.0095), 0.0);
    }

    #[test]
    fn test_obliquity() {
        assert!(obliquity_degrees(Vec3::NEG_Y, Vec3::Y) < 0.01);
        assert!((obliquity_degrees(Vec3::X, Vec3::Y) - 90.0).abs() < 0.01);
        let angled = Vec3::new(1.0, -1.0, 0.0);
        assert!((obliquity_degrees(angled, Vec3::Y) - 45.0).abs() < 0.01);
    }

    #[test]
    fn test_map_range_clamps() {
        assert_eq!(map_range_clamped(0.0, 90.0, 0.95, 0.85, -10.0), 0.95);
        assert_eq!(map_range_clamped(0.0, 90.0, 0.95, 0.85, 180.0), 0.85);
    }
}
