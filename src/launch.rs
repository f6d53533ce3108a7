//! Launch parameters.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{BallisticsError, BallisticsResult};
use crate::types::CollisionFilter;

/// Where a shot starts and where it points.
#[derive(Clone, Copy, Debug, PartialEq, Reflect, Serialize, Deserialize)]
pub struct FireTransform {
    /// Muzzle location (cm).
    pub location: Vec3,
    /// Unit firing direction.
    pub direction: Vec3,
}

impl FireTransform {
    /// Creates a fire transform; the direction is normalized.
    pub fn new(location: Vec3, direction: Vec3) -> Self {
        Self {
            location,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Fires along the transform's forward axis.
    pub fn from_transform(transform: &Transform) -> Self {
        Self::new(transform.translation, *transform.forward())
    }
}

impl Default for FireTransform {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            direction: Vec3::NEG_Z,
        }
    }
}

/// Immutable description of how a bullet or projectile is fired.
///
/// # Fields
/// * `speed` - Launch speed (m/s)
/// * `effective_range` - Effective range (m); bounds the simulated lifetime
/// * `fire_transform` - Muzzle location (cm) and direction
/// * `ignore` - Entities the traces pass through
/// * `filter` - Collision layers the traces consider
/// * `owner` - Firing entity
/// * `instigator` - Entity credited with the shot
/// * `owner_velocity` - Velocity of the owner at launch (cm/s)
/// * `add_to_owner_velocity` - Add `owner_velocity` to the launch velocity
/// * `ignore_owner` - Skip the owner until `owner_ignore_distance` is travelled
/// * `owner_ignore_distance` - Distance (cm) after which the owner can be hit
/// * `time_scale` - Per-launch simulation speed multiplier
/// * `gravity_multiplier` - Scale applied to gravity
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_terminal_ballistics::launch::{FireTransform, LaunchParams};
///
/// let params = LaunchParams::new(830.0, 800.0, FireTransform::new(Vec3::ZERO, Vec3::X))
///     .with_owner(Entity::PLACEHOLDER)
///     .with_gravity_multiplier(0.5);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchParams {
    pub speed: f32,
    pub effective_range: f32,
    pub fire_transform: FireTransform,
    pub ignore: Vec<Entity>,
    pub filter: CollisionFilter,
    pub owner: Option<Entity>,
    pub instigator: Option<Entity>,
    pub owner_velocity: Vec3,
    pub add_to_owner_velocity: bool,
    pub ignore_owner: bool,
    pub owner_ignore_distance: f32,
    pub time_scale: f32,
    pub gravity_multiplier: f32,
}

impl Default for LaunchParams {
    fn default() -> Self {
        Self {
            speed: 0.0,
            effective_range: 0.0,
            fire_transform: FireTransform::default(),
            ignore: Vec::new(),
            filter: CollisionFilter::ALL,
            owner: None,
            instigator: None,
            owner_velocity: Vec3::ZERO,
            add_to_owner_velocity: false,
            ignore_owner: false,
            owner_ignore_distance: 0.0,
            time_scale: 1.0,
            gravity_multiplier: 1.0,
        }
    }
}

impl LaunchParams {
    /// Creates launch parameters for a shot at `speed` (m/s) with the given
    /// effective range (m).
    pub fn new(speed: f32, effective_range: f32, fire_transform: FireTransform) -> Self {
        Self {
            speed,
            effective_range,
            fire_transform,
            ..Default::default()
        }
    }

    /// Sets the owner; the owner is ignored by traces for the first 50 cm.
    pub fn with_owner(mut self, owner: Entity) -> Self {
        self.owner = Some(owner);
        self.instigator.get_or_insert(owner);
        self.ignore_owner = true;
        if self.owner_ignore_distance <= 0.0 {
            self.owner_ignore_distance = 50.0;
        }
        self
    }

    pub fn with_instigator(mut self, instigator: Entity) -> Self {
        self.instigator = Some(instigator);
        self
    }

    /// Adds the owner's velocity (cm/s) to the launch velocity.
    pub fn with_owner_velocity(mut self, velocity: Vec3) -> Self {
        self.owner_velocity = velocity;
        self.add_to_owner_velocity = true;
        self
    }

    pub fn with_owner_ignore_distance(mut self, distance: f32) -> Self {
        self.owner_ignore_distance = distance;
        self
    }

    /// Stops ignoring the owner.
    pub fn hitting_owner(mut self) -> Self {
        self.ignore_owner = false;
        self
    }

    pub fn with_ignored(mut self, entities: impl IntoIterator<Item = Entity>) -> Self {
        self.ignore.extend(entities);
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_time_scale(mut self, time_scale: f32) -> Self {
        self.time_scale = time_scale;
        self
    }

    pub fn with_gravity_multiplier(mut self, multiplier: f32) -> Self {
        self.gravity_multiplier = multiplier;
        self
    }

    /// Initial velocity in world units (cm/s).
    pub fn start_velocity(&self) -> Vec3 {
        let velocity = self.fire_transform.direction * self.speed * 100.0;
        if self.add_to_owner_velocity {
            velocity + self.owner_velocity
        } else {
            velocity
        }
    }

    /// Longest time the shot may be simulated (s).
    pub fn max_lifetime(&self, range_factor: f32) -> f32 {
        if self.speed <= 0.0 {
            return 0.0;
        }
        range_factor * self.effective_range / self.speed
    }

    /// Checks the parameters before a launch.
    pub fn validate(&self) -> BallisticsResult<()> {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            return Err(BallisticsError::InvalidLaunchParams("speed must be positive"));
        }
        if !self.effective_range.is_finite() || self.effective_range <= 0.0 {
            return Err(BallisticsError::InvalidLaunchParams(
                "effective range must be positive",
            ));
        }
        if self.fire_transform.direction.length_squared() < 0.5 {
            return Err(BallisticsError::InvalidLaunchParams(
                "fire direction must be a unit vector",
            ));
        }
        if !self.fire_transform.location.is_finite() {
            return Err(BallisticsError::InvalidLaunchParams("fire location is not finite"));
        }
        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            return Err(BallisticsError::InvalidLaunchParams("time scale must be positive"));
        }
        if !self.gravity_multiplier.is_finite() {
            return Err(BallisticsError::InvalidLaunchParams(
                "gravity multiplier is not finite",
            ));
        }
        if (self.ignore_owner || self.add_to_owner_velocity) && self.owner.is_none() {
            return Err(BallisticsError::MissingOwner);
        }
        Ok(())
    }

    /// Entities traces skip right after launch.
    pub fn initial_ignore_list(&self) -> Vec<Entity> {
        let mut ignore = self.ignore.clone();
        if self.ignore_owner {
            if let Some(owner) = self.owner {
                if !ignore.contains(&owner) {
                    ignore.push(owner);
                }
            }
        }
        ignore
    }
}
