//! Error type for the registry and worker API.

use thiserror::Error;

use crate::types::ProjectileId;

/// Why a registry call was rejected.
///
/// A rejected call changes no state; the registry also logs a warning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BallisticsError {
    /// Physical properties are missing or non-positive.
    #[error("simulation data is invalid (mass, radius and length must be positive)")]
    InvalidSimData,
    #[error("invalid launch parameters: {0}")]
    InvalidLaunchParams(&'static str),
    /// The launch asks to ignore or inherit from an owner but names none.
    #[error("launch requires an owner but none was given")]
    MissingOwner,
    #[error("no simulation data registered for {0}")]
    UnknownProjectile(ProjectileId),
    #[error("{0} is already registered")]
    DuplicateId(ProjectileId),
    /// Fire was called for a record that is in flight or already queued.
    #[error("{0} has already been fired")]
    AlreadyFired(ProjectileId),
    #[error("the registry is shutting down")]
    ShuttingDown,
    #[error("failed to spawn the simulation worker: {0}")]
    WorkerSpawn(String),
}

pub type BallisticsResult<T> = Result<T, BallisticsError>;
