//! Ballistic physics library.
//!
//! Pure functions with no shared state: aerodynamic drag and integration,
//! elastic contact mechanics, penetration and exit velocity, the ricochet
//! decision, and wound-cavity sizing. World-space values (cm, cm/s) are
//! converted to SI at each function boundary.

pub mod cavity;
pub mod contact;
pub mod drag;
pub mod penetration;
pub mod ricochet;
pub mod units;

use std::f32::consts::PI;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::materials::MaterialProperties;

/// Nose geometry of a bullet or projectile.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Default, Reflect, Serialize, Deserialize,
)]
pub enum NoseShape {
    /// Pointed ogive, typical of rifle bullets.
    #[default]
    Spitzer,
    RoundNose,
    FlatNose,
    HollowPoint,
    /// Spheres and other blunt round bodies.
    Sphere,
}

impl NoseShape {
    /// Share of the body length taken by the nose.
    pub fn nose_fraction(self) -> f32 {
        match self {
            NoseShape::Spitzer => 0.4,
            NoseShape::RoundNose => 0.25,
            NoseShape::FlatNose => 0.1,
            NoseShape::HollowPoint => 0.2,
            NoseShape::Sphere => 0.5,
        }
    }

    /// Inertial resistance coefficient of the nose inside a target.
    pub fn nose_coefficient(self) -> f32 {
        match self {
            NoseShape::Spitzer => 0.35,
            NoseShape::RoundNose => 0.5,
            NoseShape::FlatNose => 0.9,
            NoseShape::HollowPoint => 1.1,
            NoseShape::Sphere => 0.5,
        }
    }

    /// Tip radius of curvature as a multiple of the caliber radius.
    pub fn tip_radius_factor(self) -> f32 {
        match self {
            NoseShape::Spitzer => 0.5,
            NoseShape::RoundNose => 1.0,
            NoseShape::FlatNose => 2.0,
            NoseShape::HollowPoint => 1.5,
            NoseShape::Sphere => 1.0,
        }
    }
}

/// Everything the physics functions need to know about the moving body.
///
/// Built from a bullet or projectile description plus the resolved material
/// of the body itself. All values are SI.
#[derive(Clone, Copy, Debug)]
pub struct Penetrator<'a> {
    /// Mass (kg).
    pub mass: f32,
    /// Caliber radius (m).
    pub radius: f32,
    /// Overall length (m).
    pub length: f32,
    /// Aerodynamic drag coefficient.
    pub drag_coefficient: f32,
    pub nose: NoseShape,
    /// Empirical penetration value for the simplified model.
    pub penetration_value: f32,
    /// What the body is made of.
    pub material: &'a MaterialProperties,
}

impl<'a> Penetrator<'a> {
    /// Frontal cross-section area (m²).
    pub fn frontal_area(&self) -> f32 {
        PI * self.radius * self.radius
    }

    /// Side-on area presented once the body tumbles (m²).
    pub fn side_area(&self) -> f32 {
        2.0 * self.radius * self.length
    }

    /// Sectional density, mass over frontal area (kg/m²).
    pub fn sectional_density(&self) -> f32 {
        let area = self.frontal_area();
        if area <= 0.0 {
            return 0.0;
        }
        self.mass / area
    }

    /// Mean density of the body treated as a cylinder (kg/m³).
    pub fn bulk_density(&self) -> f32 {
        let volume = self.frontal_area() * self.length;
        if volume <= 0.0 {
            return 0.0;
        }
        self.mass / volume
    }

    /// Length of the nose (m).
    pub fn nose_length(&self) -> f32 {
        self.length * self.nose.nose_fraction()
    }

    /// Long bodies yaw once they have travelled a few body lengths inside a
    /// target; spheres and stubby bodies never do.
    pub fn can_tumble(&self) -> bool {
        self.nose != NoseShape::Sphere && self.radius > 0.0 && self.length / (2.0 * self.radius) > 2.5
    }

    /// Mass, radius and length are all positive.
    pub fn is_valid(&self) -> bool {
        self.mass > 0.0 && self.radius > 0.0 && self.length > 0.0
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::materials::presets;

    /// Copper-jacketed 7.62×51mm ball: 9.5 g, 7.82 mm, 28.5 mm.
    pub fn rifle_bullet(material: &MaterialProperties) -> Penetrator<'_> {
        Penetrator {
            mass: 0.0095,
            radius: 0.00391,
            length: 0.0285,
            drag_coefficient: 0.295,
            nose: NoseShape::Spitzer,
            penetration_value: 2.0,
            material,
        }
    }

    pub fn copper() -> MaterialProperties {
        presets::copper()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;

    #[test]
    fn test_penetrator_geometry() {
        let copper = copper();
        let bullet = rifle_bullet(&copper);
        assert!(bullet.is_valid());
        assert!(bullet.can_tumble());
        assert!(bullet.side_area() > bullet.frontal_area());
        assert!((bullet.nose_length() - 0.0114).abs() < 1e-6);
        assert!(bullet.bulk_density() > 6000.0);
    }
}
