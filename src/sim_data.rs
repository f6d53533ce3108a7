//! Simulation records for bullets and projectiles.
//!
//! A [`SimData`] is created inactive by the registry, handed to the worker by
//! value when fired, and dropped when the worker reports its result. Bullets and
//! projectiles share every kinematic and lifecycle field; only their physical
//! description differs ([`PhysicalProperties`]).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::materials::{MaterialProperties, RicochetProperties, SurfaceType};
use crate::observer::SimCallbacks;
use crate::physics::units::cm_to_m;
use crate::physics::{NoseShape, Penetrator};
use crate::types::ProjectileId;

/// Which collections a record lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
pub enum SimKind {
    Bullet,
    Projectile,
}

/// Where a record is in its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Reflect)]
pub enum Lifecycle {
    /// Registered but not fired.
    #[default]
    Inactive,
    /// Owned by the worker.
    Active,
}

/// Physical description of a bullet.
///
/// Lengths are in centimeters, mass in kilograms.
#[derive(Clone, Debug, PartialEq, Reflect, Serialize, Deserialize)]
pub struct BulletProperties {
    pub name: String,
    pub mass: f32,
    /// Caliber radius (cm).
    pub radius: f32,
    /// Overall length (cm).
    pub length: f32,
    pub drag_coefficient: f32,
    pub nose: NoseShape,
    /// Empirical penetration value used by threshold materials.
    pub penetration_value: f32,
    /// What the bullet (jacket) is made of.
    pub material: SurfaceType,
    /// Ricochet policy used unless the struck material carries its own.
    pub ricochet: RicochetProperties,
    /// Typical muzzle velocity (m/s).
    pub muzzle_velocity: f32,
    /// Typical effective range (m).
    pub effective_range: f32,
}

/// Physical description of a generic projectile (balls, fragments, arrows).
#[derive(Clone, Debug, PartialEq, Reflect, Serialize, Deserialize)]
pub struct ProjectileProperties {
    pub name: String,
    pub mass: f32,
    /// Radius (cm).
    pub radius: f32,
    /// Length (cm); equal to the diameter for spheres.
    pub length: f32,
    pub drag_coefficient: f32,
    pub nose: NoseShape,
    pub penetration_value: f32,
    pub material: SurfaceType,
    pub ricochet: RicochetProperties,
}

impl Default for ProjectileProperties {
    fn default() -> Self {
        Self {
            name: "Projectile".into(),
            mass: 0.01,
            radius: 0.5,
            length: 1.0,
            drag_coefficient: 0.47,
            nose: NoseShape::Sphere,
            penetration_value: 1.0,
            material: SurfaceType::Steel,
            ricochet: RicochetProperties::default(),
        }
    }
}

/// Physical properties of either kind of simulated body.
#[derive(Clone, Debug, PartialEq, Reflect, Serialize, Deserialize)]
pub enum PhysicalProperties {
    Bullet(BulletProperties),
    Projectile(ProjectileProperties),
}

impl PhysicalProperties {
    pub fn kind(&self) -> SimKind {
        match self {
            PhysicalProperties::Bullet(_) => SimKind::Bullet,
            PhysicalProperties::Projectile(_) => SimKind::Projectile,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PhysicalProperties::Bullet(b) => &b.name,
            PhysicalProperties::Projectile(p) => &p.name,
        }
    }

    pub fn mass(&self) -> f32 {
        match self {
            PhysicalProperties::Bullet(b) => b.mass,
            PhysicalProperties::Projectile(p) => p.mass,
        }
    }

    /// Radius (cm).
    pub fn radius(&self) -> f32 {
        match self {
            PhysicalProperties::Bullet(b) => b.radius,
            PhysicalProperties::Projectile(p) => p.radius,
        }
    }

    /// Length (cm).
    pub fn length(&self) -> f32 {
        match self {
            PhysicalProperties::Bullet(b) => b.length,
            PhysicalProperties::Projectile(p) => p.length,
        }
    }

    pub fn drag_coefficient(&self) -> f32 {
        match self {
            PhysicalProperties::Bullet(b) => b.drag_coefficient,
            PhysicalProperties::Projectile(p) => p.drag_coefficient,
        }
    }

    pub fn nose(&self) -> NoseShape {
        match self {
            PhysicalProperties::Bullet(b) => b.nose,
            PhysicalProperties::Projectile(p) => p.nose,
        }
    }

    pub fn penetration_value(&self) -> f32 {
        match self {
            PhysicalProperties::Bullet(b) => b.penetration_value,
            PhysicalProperties::Projectile(p) => p.penetration_value,
        }
    }

    /// Material the body itself is made of.
    pub fn material(&self) -> SurfaceType {
        match self {
            PhysicalProperties::Bullet(b) => b.material,
            PhysicalProperties::Projectile(p) => p.material,
        }
    }

    pub fn ricochet(&self) -> &RicochetProperties {
        match self {
            PhysicalProperties::Bullet(b) => &b.ricochet,
            PhysicalProperties::Projectile(p) => &p.ricochet,
        }
    }

    /// Mass, radius and length are positive and finite.
    pub fn is_valid(&self) -> bool {
        [self.mass(), self.radius(), self.length(), self.drag_coefficient()]
            .iter()
            .all(|v| v.is_finite())
            && self.mass() > 0.0
            && self.radius() > 0.0
            && self.length() > 0.0
            && self.drag_coefficient() >= 0.0
    }

    /// SI view of the body for the physics functions.
    pub fn penetrator<'a>(&self, material: &'a MaterialProperties) -> Penetrator<'a> {
        Penetrator {
            mass: self.mass(),
            radius: cm_to_m(self.radius()),
            length: cm_to_m(self.length()),
            drag_coefficient: self.drag_coefficient(),
            nose: self.nose(),
            penetration_value: self.penetration_value(),
            material,
        }
    }
}

impl From<BulletProperties> for PhysicalProperties {
    fn from(bullet: BulletProperties) -> Self {
        PhysicalProperties::Bullet(bullet)
    }
}

impl From<ProjectileProperties> for PhysicalProperties {
    fn from(projectile: ProjectileProperties) -> Self {
        PhysicalProperties::Projectile(projectile)
    }
}

/// Opaque caller data carried alongside a record.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Mutable simulation record owned by the registry.
///
/// # Example
/// ```
/// use bevy_terminal_ballistics::sim_data::{presets, SimData, SimKind};
///
/// let data = SimData::bullet(presets::rifle_762x51());
/// assert_eq!(data.kind(), SimKind::Bullet);
/// assert!(!data.id.is_valid());
/// ```
#[derive(Clone)]
pub struct SimData {
    /// Assigned by the registry on add.
    pub id: ProjectileId,
    pub properties: PhysicalProperties,
    /// Last known position (cm).
    pub position: Vec3,
    /// Last known velocity (cm/s).
    pub velocity: Vec3,
    pub owner: Option<Entity>,
    pub instigator: Option<Entity>,
    pub lifecycle: Lifecycle,
    pub payload: Option<Payload>,
    pub callbacks: SimCallbacks,
}

impl SimData {
    pub fn new(properties: impl Into<PhysicalProperties>) -> Self {
        Self {
            id: ProjectileId::NONE,
            properties: properties.into(),
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            owner: None,
            instigator: None,
            lifecycle: Lifecycle::Inactive,
            payload: None,
            callbacks: SimCallbacks::default(),
        }
    }

    pub fn bullet(properties: BulletProperties) -> Self {
        Self::new(properties)
    }

    pub fn projectile(properties: ProjectileProperties) -> Self {
        Self::new(properties)
    }

    pub fn with_callbacks(mut self, callbacks: SimCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_owner(mut self, owner: Entity) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn kind(&self) -> SimKind {
        self.properties.kind()
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// Downcasts the payload.
    pub fn payload<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }
}

impl fmt::Debug for SimData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimData")
            .field("id", &self.id)
            .field("properties", &self.properties)
            .field("position", &self.position)
            .field("velocity", &self.velocity)
            .field("owner", &self.owner)
            .field("lifecycle", &self.lifecycle)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

/// Common cartridges and projectiles.
pub mod presets {
    use super::*;

    /// 7.62×51mm NATO ball: 9.5 g at 830 m/s.
    pub fn rifle_762x51() -> BulletProperties {
        BulletProperties {
            name: "7.62x51mm NATO".into(),
            mass: 0.0095,
            radius: 0.391,
            length: 2.85,
            drag_coefficient: 0.295,
            nose: NoseShape::Spitzer,
            penetration_value: 2.0,
            material: SurfaceType::Copper,
            ricochet: RicochetProperties::default(),
            muzzle_velocity: 830.0,
            effective_range: 800.0,
        }
    }

    /// 5.56×45mm NATO: 4 g at 940 m/s.
    pub fn rifle_556x45() -> BulletProperties {
        BulletProperties {
            name: "5.56x45mm NATO".into(),
            mass: 0.004,
            radius: 0.285,
            length: 2.3,
            drag_coefficient: 0.3,
            nose: NoseShape::Spitzer,
            penetration_value: 1.5,
            material: SurfaceType::Copper,
            ricochet: RicochetProperties::default(),
            muzzle_velocity: 940.0,
            effective_range: 500.0,
        }
    }

    /// 9×19mm Parabellum full metal jacket: 8 g at 360 m/s.
    pub fn pistol_9x19() -> BulletProperties {
        BulletProperties {
            name: "9x19mm Parabellum".into(),
            mass: 0.008,
            radius: 0.4505,
            length: 1.56,
            drag_coefficient: 0.25,
            nose: NoseShape::RoundNose,
            penetration_value: 0.6,
            material: SurfaceType::Copper,
            ricochet: RicochetProperties::default(),
            muzzle_velocity: 360.0,
            effective_range: 50.0,
        }
    }

    /// .50 BMG ball: 42 g at 890 m/s.
    pub fn rifle_50bmg() -> BulletProperties {
        BulletProperties {
            name: ".50 BMG".into(),
            mass: 0.042,
            radius: 0.6475,
            length: 5.8,
            drag_coefficient: 0.3,
            nose: NoseShape::Spitzer,
            penetration_value: 5.0,
            material: SurfaceType::Copper,
            ricochet: RicochetProperties::default(),
            muzzle_velocity: 890.0,
            effective_range: 1800.0,
        }
    }

    /// 12 mm steel ball bearing.
    pub fn steel_ball() -> ProjectileProperties {
        ProjectileProperties {
            name: "Steel ball".into(),
            mass: 0.007,
            radius: 0.6,
            length: 1.2,
            drag_coefficient: 0.47,
            nose: NoseShape::Sphere,
            penetration_value: 0.5,
            material: SurfaceType::Steel,
            ricochet: RicochetProperties::default(),
        }
    }

    /// Lead round ball for a .69 caliber musket.
    pub fn musket_ball() -> ProjectileProperties {
        ProjectileProperties {
            name: "Musket ball".into(),
            mass: 0.031,
            radius: 0.88,
            length: 1.76,
            drag_coefficient: 0.47,
            nose: NoseShape::Sphere,
            penetration_value: 0.8,
            material: SurfaceType::Lead,
            ricochet: RicochetProperties::default(),
        }
    }
}
