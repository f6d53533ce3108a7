//! Common types shared by the registry, the worker and the world adapters.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::materials::SurfaceType;

/// Unique identifier of a simulated bullet or projectile.
///
/// Ids are handed out by the [`Registry`](crate::registry::Registry) and are
/// the only key shared between the owning thread and the worker. Zero is
/// never assigned.
///
/// # Example
/// ```
/// use bevy_terminal_ballistics::types::ProjectileId;
///
/// assert!(!ProjectileId::NONE.is_valid());
/// assert!(ProjectileId(7).is_valid());
/// ```
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Reflect, Serialize, Deserialize,
)]
pub struct ProjectileId(pub u64);

impl ProjectileId {
    /// The unassigned id.
    pub const NONE: Self = Self(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ProjectileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projectile #{}", self.0)
    }
}

/// Per-launch debug switches.
///
/// # Example
/// ```
/// use bevy_terminal_ballistics::types::DebugFlags;
///
/// let flags = DebugFlags::DRAW_PATH | DebugFlags::DRAW_IMPACTS;
/// assert!(flags.contains(DebugFlags::DRAW_PATH));
/// assert!(!flags.contains(DebugFlags::PRINT_DEBUG_INFO));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Reflect)]
pub struct DebugFlags(u8);

impl DebugFlags {
    pub const NONE: Self = Self(0);
    /// Draw the flight path once the simulation completes.
    pub const DRAW_PATH: Self = Self(1 << 0);
    /// Draw a marker at every impact.
    pub const DRAW_IMPACTS: Self = Self(1 << 1);
    /// Log every impact decision.
    pub const PRINT_DEBUG_INFO: Self = Self(1 << 2);
    /// Call the observer's `on_update` after every integration step.
    pub const REPORT_UPDATES: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for DebugFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DebugFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Integration method used by the worker.
///
/// # Variants
/// * `Euler` - Simple Euler integration (faster but less accurate)
/// * `RK4` - Runge-Kutta 4th order integration (more accurate, slightly slower)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Reflect, Serialize, Deserialize)]
pub enum PhysicsModel {
    /// Simple Euler integration (fast, less accurate)
    Euler,
    /// Runge-Kutta 4th order (accurate, slightly slower)
    #[default]
    RK4,
}

/// Gameplay tags attached to a surface by the world.
///
/// Tags are checked before any physics runs on a hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Reflect)]
pub struct SurfaceTags {
    /// Pass through as if the surface was not there.
    pub ignore: bool,
    /// Stop dead on contact.
    pub impenetrable: bool,
    /// Report the hit but keep going at the same speed.
    pub ignore_penetration: bool,
    /// Part of a living target; hits also raise an injury.
    pub hit_zone: bool,
    /// A dead target; treated as plain material.
    pub dead: bool,
}

impl SurfaceTags {
    /// Living hit zone, as opposed to a corpse or scenery. Flesh counts as a
    /// hit zone even when untagged.
    pub fn is_live_hit_zone(&self, is_flesh: bool) -> bool {
        (self.hit_zone || is_flesh) && !self.dead
    }
}

/// Collision layer mask for world queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub layers: u32,
}

impl CollisionFilter {
    pub const ALL: Self = Self { layers: u32::MAX };
    pub const NONE: Self = Self { layers: 0 };

    pub fn new(layers: u32) -> Self {
        Self { layers }
    }

    /// True if a collider on `layers` should be considered.
    pub fn matches(&self, layers: u32) -> bool {
        self.layers & layers != 0
    }
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self::ALL
    }
}

/// First surface struck by a trace.
///
/// # Fields
/// * `entity` - The entity that was hit
/// * `point` - World-space hit point (cm)
/// * `normal` - Surface normal at the hit point, facing the incoming trace
/// * `distance` - Distance from the trace start (cm)
/// * `surface` - Material identifier of the surface
/// * `face_index` - Face or sub-shape index within the entity
/// * `tags` - Gameplay tags of the surface
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitResult {
    pub entity: Entity,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub surface: SurfaceType,
    pub face_index: u32,
    pub tags: SurfaceTags,
}

impl HitResult {
    /// Same entity and same face.
    pub fn same_face(&self, other: &HitResult) -> bool {
        self.entity == other.entity && self.face_index == other.face_index
    }

    /// Bit-for-bit the same impact.
    pub fn is_identical(&self, other: &HitResult) -> bool {
        self.same_face(other) && self.point == other.point && self.normal == other.normal
    }
}

/// A hit plus what lies behind it along the trace direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceTrace {
    pub hit: HitResult,
    /// Where the trace leaves the struck object (cm).
    pub exit_point: Vec3,
    /// Material thickness between entry and exit along the trace (cm).
    pub thickness: f32,
}

/// World collision queries used by the worker.
///
/// Implementations are called from the worker thread and must be safe to
/// share. Positions and distances are in world units (cm).
pub trait WorldQuery: Send + Sync + 'static {
    /// Returns the first surface between `start` and `end`, skipping
    /// entities in `ignore` and colliders outside `filter`.
    fn trace(
        &self,
        start: Vec3,
        end: Vec3,
        ignore: &[Entity],
        filter: CollisionFilter,
    ) -> Option<SurfaceTrace>;
}

/// Air conditions queried by the worker.
pub trait EnvironmentProvider: Send + Sync + 'static {
    /// Wind velocity at a location (m/s).
    fn wind_at(&self, location: Vec3) -> Vec3;

    /// Air density at a location (kg/m³).
    fn air_density_at(&self, location: Vec3) -> f32;

    /// Gravitational acceleration (m/s²).
    fn gravity(&self) -> Vec3;
}
