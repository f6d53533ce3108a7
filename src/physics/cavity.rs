//! Wound cavity sizing for tissue-like targets.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::units::{cm_to_m, m_to_cm};

/// Temporary and permanent cavity dimensions (cm).
#[derive(Clone, Copy, Debug, PartialEq, Default, Reflect, Serialize, Deserialize)]
pub struct WoundCavity {
    pub temporary_radius: f32,
    pub permanent_radius: f32,
    pub permanent_depth: f32,
}

impl WoundCavity {
    /// True when any cavity was formed.
    pub fn is_empty(&self) -> bool {
        self.temporary_radius <= 0.0 && self.permanent_radius <= 0.0 && self.permanent_depth <= 0.0
    }
}

/// Computes cavity radii from the energy deposited in the target.
///
/// The temporary cavity follows a cube-root energy relation
/// `r = 1.18 ((E / ρ) √(d / t))^⅓`; the permanent cavity radius scales with the
/// square of the speed and the cube root of the tissue density, and its depth
/// is the penetration depth.
///
/// # Arguments
/// * `speed` - Impact speed (m/s)
/// * `imparted_energy` - Energy deposited in the target (J)
/// * `depth` - Penetration depth (cm)
/// * `thickness` - Target thickness along the path (cm)
/// * `projectile_radius` - Caliber radius (m)
/// * `target_density` - Tissue density (kg/m³)
///
/// # Returns
/// The cavity; all zeros if any input is non-positive
pub fn calculate_cavity(
    speed: f32,
    imparted_energy: f32,
    depth: f32,
    thickness: f32,
    projectile_radius: f32,
    target_density: f32,
) -> WoundCavity {
    if speed <= 0.0
        || imparted_energy <= 0.0
        || depth <= 0.0
        || thickness <= 0.0
        || projectile_radius <= 0.0
        || target_density <= 0.0
    {
        return WoundCavity::default();
    }

    let diameter = 2.0 * projectile_radius;
    let q = (imparted_energy / target_density) * (diameter / cm_to_m(thickness)).sqrt();
    let temporary_radius = 1.18 * q.cbrt();
    let permanent_radius =
        0.29 * diameter * (speed / 1000.0).powi(2) * (target_density / 1000.0).cbrt();

    WoundCavity {
        temporary_radius: m_to_cm(temporary_radius),
        permanent_radius: m_to_cm(permanent_radius),
        permanent_depth: depth,
    }
}
