//! Background simulation thread.
//!
//! The worker owns every live [`SimulationTask`] and steps them at a fixed
//! rate. It blocks while there is nothing to simulate or while paused, so an
//! idle worker costs nothing. It never touches the ECS: collision and air
//! queries go through the shared [`WorldQuery`] and [`EnvironmentProvider`]
//! snapshots, which the owner may replace at any time.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bevy::log::{debug, error, info, warn};
use crossbeam_channel::{select, RecvError};

use crate::channel::{ControlMessage, LaunchPayload, WorkerEnd};
use crate::error::{BallisticsError, BallisticsResult};
use crate::events::{ExitCode, SimEvent, TaskResult};
use crate::materials::MaterialRegistry;
use crate::resources::BallisticsConfig;
use crate::task::{SimulationTask, TaskContext};
use crate::types::{EnvironmentProvider, ProjectileId, WorldQuery};

/// Poll interval while waiting for the thread to stop.
const JOIN_POLL: Duration = Duration::from_millis(1);

/// What the worker simulates against.
#[derive(Clone)]
pub struct WorkerContext {
    pub world: Arc<dyn WorldQuery>,
    pub environment: Arc<dyn EnvironmentProvider>,
    pub materials: Arc<MaterialRegistry>,
    pub config: BallisticsConfig,
}

/// Handle to the worker thread.
#[derive(Debug)]
pub struct SimulationWorker {
    handle: Option<JoinHandle<()>>,
}

impl SimulationWorker {
    /// Starts the worker thread.
    pub fn spawn(end: WorkerEnd, context: WorkerContext) -> BallisticsResult<Self> {
        let worker = WorkerLoop {
            end,
            context,
            tasks: Vec::new(),
            paused: false,
            events: Vec::new(),
        };
        let handle = thread::Builder::new()
            .name("ballistics-worker".into())
            .spawn(move || worker.run())
            .map_err(|e| BallisticsError::WorkerSpawn(e.to_string()))?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Waits up to `timeout` for the thread to exit after a shutdown request.
    ///
    /// Returns false if it did not stop in time; the thread is then detached.
    pub fn join(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("simulation worker did not stop within {:?}, detaching", timeout);
                return false;
            }
            thread::sleep(JOIN_POLL);
        }
        if handle.join().is_err() {
            error!("simulation worker panicked");
        }
        true
    }
}

struct WorkerLoop {
    end: WorkerEnd,
    context: WorkerContext,
    tasks: Vec<SimulationTask>,
    paused: bool,
    events: Vec<SimEvent>,
}

/// Whether the loop keeps running.
type Flow = bool;

impl WorkerLoop {
    fn run(mut self) {
        let step = self.context.config.fixed_step();
        let period = Duration::from_secs_f32(step);
        info!("simulation worker started at {:.0} Hz", 1.0 / step);

        let mut next_tick = Instant::now() + period;
        loop {
            if !self.poll() {
                break;
            }
            if self.tasks.is_empty() || self.paused {
                if !self.wait(None) {
                    break;
                }
                next_tick = Instant::now() + period;
                continue;
            }

            let now = Instant::now();
            if now < next_tick {
                if !self.wait(Some(next_tick - now)) {
                    break;
                }
                continue;
            }
            next_tick += period;
            if next_tick < now {
                next_tick = now + period;
            }

            if !self.step(step) {
                break;
            }
        }

        self.stop_all();
        info!("simulation worker stopped");
    }

    /// Handles everything already queued without blocking.
    fn poll(&mut self) -> Flow {
        while let Ok(message) = self.end.control.try_recv() {
            if !self.handle_control(message) {
                return false;
            }
        }
        while let Ok(payload) = self.end.launches.try_recv() {
            if !self.handle_launch(payload) {
                return false;
            }
        }
        true
    }

    /// Blocks until a message arrives or the timeout elapses.
    fn wait(&mut self, timeout: Option<Duration>) -> Flow {
        let (control, launches) = (&self.end.control, &self.end.launches);
        let received = match timeout {
            Some(timeout) => select! {
                recv(control) -> message => Some(message.map(Incoming::Control)),
                recv(launches) -> payload => Some(payload.map(Incoming::Launch)),
                default(timeout) => None,
            },
            None => select! {
                recv(control) -> message => Some(message.map(Incoming::Control)),
                recv(launches) -> payload => Some(payload.map(Incoming::Launch)),
            },
        };
        match received {
            None => true,
            Some(Ok(Incoming::Control(message))) => self.handle_control(message),
            Some(Ok(Incoming::Launch(payload))) => self.handle_launch(payload),
            Some(Err(RecvError)) => {
                debug!("simulation worker channel closed");
                false
            }
        }
    }

    fn handle_control(&mut self, message: ControlMessage) -> Flow {
        match message {
            ControlMessage::Pause => self.paused = true,
            ControlMessage::Resume => self.paused = false,
            ControlMessage::Terminate(id) => {
                if self.terminate(id) {
                    return true;
                }
                // The launch is sent before its termination, so it may still
                // be queued behind this message.
                while let Ok(payload) = self.end.launches.try_recv() {
                    if !self.handle_launch(payload) {
                        return false;
                    }
                }
                if !self.terminate(id) {
                    debug!("{id} already finished, ignoring termination");
                }
            }
            ControlMessage::SetEnvironment(environment) => self.context.environment = environment,
            ControlMessage::SetWorld(world) => self.context.world = world,
            ControlMessage::Shutdown => return false,
        }
        true
    }

    /// Flags a live task for termination.
    fn terminate(&mut self, id: ProjectileId) -> bool {
        match self.tasks.iter_mut().find(|task| task.id() == id) {
            Some(task) => {
                task.request_termination();
                true
            }
            None => false,
        }
    }

    fn handle_launch(&mut self, payload: LaunchPayload) -> Flow {
        let mut task = SimulationTask::new(payload);
        let context = &self.context;
        task.initialize(&TaskContext {
            world: context.world.as_ref(),
            environment: context.environment.as_ref(),
            materials: context.materials.as_ref(),
            config: &context.config,
        });
        if task.is_finished() {
            return self.end.emit(SimEvent::Complete(task.result())).is_ok();
        }
        self.tasks.push(task);
        true
    }

    /// Advances every task by one fixed step and reports what happened.
    fn step(&mut self, step: f32) -> Flow {
        let dilation = self.end.time_dilation();
        if dilation <= 0.0 {
            return true;
        }

        let ctx = TaskContext {
            world: self.context.world.as_ref(),
            environment: self.context.environment.as_ref(),
            materials: self.context.materials.as_ref(),
            config: &self.context.config,
        };
        for task in &mut self.tasks {
            task.step(step * dilation * task.time_scale(), &ctx, &mut self.events);
        }

        for event in self.events.drain(..) {
            if self.end.emit(event).is_err() {
                return false;
            }
        }

        let mut open = true;
        self.tasks.retain(|task| {
            if !task.is_finished() {
                return true;
            }
            open &= self.end.emit(SimEvent::Complete(task.result())).is_ok();
            false
        });
        open
    }

    /// Ends every remaining task and launch with a shutdown result.
    fn stop_all(&mut self) {
        let mut results: Vec<TaskResult> = self
            .tasks
            .drain(..)
            .map(|mut task| {
                task.kill(ExitCode::Shutdown);
                task.result()
            })
            .collect();
        results.extend(self.end.launches.try_iter().map(|payload| {
            TaskResult::empty(payload.id, payload.properties.kind(), ExitCode::Shutdown)
        }));
        if !results.is_empty() {
            debug!("simulation worker stopping {} live simulations", results.len());
        }
        for result in results {
            if self.end.emit(SimEvent::Complete(result)).is_err() {
                break;
            }
        }
    }
}

enum Incoming {
    Control(ControlMessage),
    Launch(LaunchPayload),
}
