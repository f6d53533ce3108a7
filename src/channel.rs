//! Message plumbing between the owning thread and the simulation worker.
//!
//! Three crossbeam channels connect the two sides:
//! - launches, owner to worker
//! - control messages, owner to worker
//! - simulation events, worker to owner
//!
//! Time dilation is shared through an atomic so the worker reads the latest
//! value every step without a message round trip.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

use crate::error::{BallisticsError, BallisticsResult};
use crate::events::SimEvent;
use crate::launch::LaunchParams;
use crate::sim_data::PhysicalProperties;
use crate::types::{DebugFlags, EnvironmentProvider, ProjectileId, WorldQuery};

/// Everything the worker needs to start one simulation.
#[derive(Clone, Debug)]
pub struct LaunchPayload {
    pub id: ProjectileId,
    pub properties: PhysicalProperties,
    pub params: LaunchParams,
    pub debug: DebugFlags,
}

/// Out-of-band instructions for the worker.
pub enum ControlMessage {
    Pause,
    Resume,
    /// Stop one simulation; its result is reported as terminated.
    Terminate(ProjectileId),
    SetEnvironment(Arc<dyn EnvironmentProvider>),
    SetWorld(Arc<dyn WorldQuery>),
    /// Stop every simulation and exit the worker loop.
    Shutdown,
}

impl fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::Pause => f.write_str("Pause"),
            ControlMessage::Resume => f.write_str("Resume"),
            ControlMessage::Terminate(id) => write!(f, "Terminate({id})"),
            ControlMessage::SetEnvironment(_) => f.write_str("SetEnvironment"),
            ControlMessage::SetWorld(_) => f.write_str("SetWorld"),
            ControlMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Shared simulation speed multiplier.
#[derive(Clone, Debug)]
pub struct TimeDilation(Arc<AtomicU32>);

impl Default for TimeDilation {
    fn default() -> Self {
        Self(Arc::new(AtomicU32::new(1.0f32.to_bits())))
    }
}

impl TimeDilation {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Negative and non-finite values are stored as zero.
    pub fn set(&self, value: f32) {
        let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Creates a connected pair of channel ends.
pub fn simulation_channel() -> (OwnerEnd, WorkerEnd) {
    let (launch_tx, launch_rx) = unbounded();
    let (control_tx, control_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    let dilation = TimeDilation::default();
    (
        OwnerEnd {
            launches: launch_tx,
            control: control_tx,
            events: event_rx,
            dilation: dilation.clone(),
        },
        WorkerEnd {
            launches: launch_rx,
            control: control_rx,
            events: event_tx,
            dilation,
        },
    )
}

/// The owning thread's side.
#[derive(Debug)]
pub struct OwnerEnd {
    launches: Sender<LaunchPayload>,
    control: Sender<ControlMessage>,
    events: Receiver<SimEvent>,
    dilation: TimeDilation,
}

impl OwnerEnd {
    pub fn launch(&self, payload: LaunchPayload) -> BallisticsResult<()> {
        self.launches
            .send(payload)
            .map_err(|_| BallisticsError::ShuttingDown)
    }

    pub fn control(&self, message: ControlMessage) -> BallisticsResult<()> {
        self.control
            .send(message)
            .map_err(|_| BallisticsError::ShuttingDown)
    }

    pub fn set_time_dilation(&self, value: f32) {
        self.dilation.set(value);
    }

    pub fn time_dilation(&self) -> f32 {
        self.dilation.get()
    }

    /// Receives up to `max` pending events without blocking.
    pub fn drain(&self, max: usize) -> Vec<SimEvent> {
        let mut events = Vec::new();
        while events.len() < max {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Events still waiting to be drained.
    pub fn pending(&self) -> usize {
        self.events.len()
    }
}

/// The worker thread's side.
#[derive(Debug)]
pub struct WorkerEnd {
    pub(crate) launches: Receiver<LaunchPayload>,
    pub(crate) control: Receiver<ControlMessage>,
    events: Sender<SimEvent>,
    dilation: TimeDilation,
}

impl WorkerEnd {
    /// Sends an event to the owner; fails once the owner is gone.
    pub fn emit(&self, event: SimEvent) -> BallisticsResult<()> {
        self.events
            .send(event)
            .map_err(|_| BallisticsError::ShuttingDown)
    }

    pub fn time_dilation(&self) -> f32 {
        self.dilation.get()
    }
}
