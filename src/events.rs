//! Simulation events and results.
//!
//! The worker produces [`SimEvent`]s; the registry drains them on the owning
//! thread, dispatches the bound callbacks, and the plugin mirrors them as Bevy
//! messages.
//!
//! Note: In Bevy 0.18, buffered events use the `Message` trait instead of `Event`.

use bevy::ecs::message::Message;
use bevy::prelude::*;

use crate::materials::SurfaceType;
pub use crate::physics::cavity::WoundCavity;
use crate::sim_data::SimKind;
use crate::types::{DebugFlags, ProjectileId};

/// One surface interaction.
///
/// # Fields
/// * `id` - The simulated body
/// * `kind` - Bullet or projectile
/// * `entity` - The struck entity
/// * `location` - Impact (or exit) point (cm)
/// * `normal` - Surface normal
/// * `surface` - Material of the struck surface
/// * `impact_velocity` - Velocity before the interaction (cm/s)
/// * `exit_velocity` - Velocity after the interaction (cm/s)
/// * `penetration_depth` - Depth reached (cm)
/// * `thickness` - Material thickness along the path (cm)
/// * `energy_delta` - Kinetic energy lost (J)
/// * `ricochet` - The body bounced off
/// * `is_exit` - This is the far-side exit of a penetration
#[derive(Clone, Debug, PartialEq)]
pub struct ImpactParams {
    pub id: ProjectileId,
    pub kind: SimKind,
    pub entity: Entity,
    pub location: Vec3,
    pub normal: Vec3,
    pub surface: SurfaceType,
    pub impact_velocity: Vec3,
    pub exit_velocity: Vec3,
    pub penetration_depth: f32,
    pub thickness: f32,
    pub energy_delta: f32,
    pub ricochet: bool,
    pub is_exit: bool,
    pub owner: Option<Entity>,
    pub instigator: Option<Entity>,
}

impl ImpactParams {
    /// Impact speed (m/s).
    pub fn impact_speed(&self) -> f32 {
        self.impact_velocity.length() / 100.0
    }

    /// Exit speed (m/s).
    pub fn exit_speed(&self) -> f32 {
        self.exit_velocity.length() / 100.0
    }

    /// The body came out the other side.
    pub fn penetrated(&self) -> bool {
        !self.ricochet && self.exit_velocity.length_squared() > 0.0
    }
}

/// Injury raised when a live hit zone is struck.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InjuryParams {
    pub id: ProjectileId,
    pub entity: Entity,
    pub location: Vec3,
    /// Impact speed (m/s).
    pub impact_speed: f32,
    /// Energy deposited (J).
    pub energy_delta: f32,
    /// Depth reached (cm).
    pub penetration_depth: f32,
    pub surface: SurfaceType,
    pub wound: WoundCavity,
}

/// A point along the flight path.
#[derive(Clone, Copy, Debug, PartialEq, Default, Reflect)]
pub struct PathSample {
    /// Position (cm).
    pub location: Vec3,
    /// Velocity (cm/s).
    pub velocity: Vec3,
    /// Simulated time since launch (s).
    pub time: f32,
}

/// Why a simulation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Reflect)]
pub enum ExitCode {
    /// Slowed below the minimum speed.
    ZeroVelocity,
    /// Stopped inside a material.
    Stopped,
    /// Travelled past its range.
    OutOfRange,
    /// Stopped by an impenetrable surface or a repeated hit.
    EarlyTermination,
    /// Could not be simulated.
    InvalidProjectile,
    /// Termination was requested.
    Terminated,
    /// Simulated for longer than its lifetime.
    LifetimeExceeded,
    /// Hit the integration step limit.
    IterationLimit,
    /// The worker shut down.
    Shutdown,
}

impl ExitCode {
    /// Forced endings, as opposed to the body coming to rest naturally.
    pub fn is_kill(self) -> bool {
        !matches!(
            self,
            ExitCode::ZeroVelocity | ExitCode::Stopped | ExitCode::OutOfRange
        )
    }
}

/// Final report of one simulation; exactly one per fired id.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskResult {
    pub id: ProjectileId,
    pub kind: SimKind,
    pub exit_code: ExitCode,
    pub path: Vec<PathSample>,
    /// Position at the end (cm).
    pub final_location: Vec3,
    /// Velocity at the end (cm/s).
    pub final_velocity: Vec3,
    pub penetrations: u32,
    pub ricochets: u32,
    pub iterations: u32,
    /// Simulated flight time (s).
    pub flight_time: f32,
    /// Every impact location, in order (cm).
    pub impacts: Vec<Vec3>,
    /// Debug switches of the launch.
    pub debug: DebugFlags,
}

impl TaskResult {
    /// Result for a body that never flew.
    pub fn empty(id: ProjectileId, kind: SimKind, exit_code: ExitCode) -> Self {
        Self {
            id,
            kind,
            exit_code,
            path: Vec::new(),
            final_location: Vec3::ZERO,
            final_velocity: Vec3::ZERO,
            penetrations: 0,
            ricochets: 0,
            iterations: 0,
            flight_time: 0.0,
            impacts: Vec::new(),
            debug: DebugFlags::NONE,
        }
    }

    pub fn is_killed(&self) -> bool {
        self.exit_code.is_kill()
    }
}

/// Everything the worker reports back, in per-id order.
#[derive(Clone, Debug, PartialEq)]
pub enum SimEvent {
    Hit(ImpactParams),
    ExitHit(ImpactParams),
    Injure(ImpactParams, InjuryParams),
    Update(ProjectileId, PathSample),
    Complete(TaskResult),
}

impl SimEvent {
    pub fn id(&self) -> ProjectileId {
        match self {
            SimEvent::Hit(impact) | SimEvent::ExitHit(impact) | SimEvent::Injure(impact, _) => {
                impact.id
            }
            SimEvent::Update(id, _) => *id,
            SimEvent::Complete(result) => result.id,
        }
    }
}

/// Message sent when a simulated body hits something.
#[derive(Message, Clone, Debug)]
pub struct ProjectileHit(pub ImpactParams);

/// Message sent when a simulated body leaves an object it penetrated.
#[derive(Message, Clone, Debug)]
pub struct ProjectileExitHit(pub ImpactParams);

/// Message sent when a live hit zone is injured.
#[derive(Message, Clone, Debug)]
pub struct ProjectileInjure {
    pub impact: ImpactParams,
    pub injury: InjuryParams,
}

/// Message sent when a simulation ends.
#[derive(Message, Clone, Debug)]
pub struct ProjectileComplete(pub TaskResult);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_classification() {
        assert!(!ExitCode::ZeroVelocity.is_kill());
        assert!(!ExitCode::Stopped.is_kill());
        assert!(!ExitCode::OutOfRange.is_kill());
        for code in [
            ExitCode::EarlyTermination,
            ExitCode::InvalidProjectile,
            ExitCode::Terminated,
            ExitCode::LifetimeExceeded,
            ExitCode::IterationLimit,
            ExitCode::Shutdown,
        ] {
            assert!(code.is_kill(), "{code:?}");
        }
    }

    #[test]
    fn test_event_ids() {
        let result = TaskResult::empty(ProjectileId(3), SimKind::Bullet, ExitCode::Terminated);
        assert!(result.is_killed());
        assert_eq!(SimEvent::Complete(result).id(), ProjectileId(3));
        assert_eq!(
            SimEvent::Update(ProjectileId(9), PathSample::default()).id(),
            ProjectileId(9)
        );
    }
}
