//! Simulation registry: the gameplay-facing API.
//!
//! The registry owns every [`SimData`] record and the channel to the
//! background worker. Records live in per-kind collections, each behind its
//! own lock:
//!
//! - `pending`: added this tick, not yet promoted
//! - `inactive`: known but not fired
//! - `active`: in flight on the worker
//!
//! Ids removed while in flight stay reserved until the worker reports their
//! final result, so a caller-supplied id is never live twice.
//!
//! [`Registry::tick`] runs once per frame on the owning thread and is the only
//! place callbacks are invoked.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bevy::log::{debug, error, warn};
use bevy::prelude::*;

use crate::channel::{simulation_channel, ControlMessage, LaunchPayload, OwnerEnd};
use crate::error::{BallisticsError, BallisticsResult};
use crate::events::SimEvent;
use crate::launch::LaunchParams;
use crate::materials::MaterialRegistry;
use crate::observer::{ImpactHook, SimCallbacks};
use crate::resources::BallisticsConfig;
use crate::sim_data::{Lifecycle, SimData, SimKind};
use crate::types::{DebugFlags, EnvironmentProvider, ProjectileId, WorldQuery};
use crate::worker::{SimulationWorker, WorkerContext};

type Records = HashMap<ProjectileId, SimData>;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// The three collections of one kind.
#[derive(Default)]
struct KindStore {
    pending: RwLock<Records>,
    active: RwLock<Records>,
    inactive: RwLock<Records>,
}

impl KindStore {
    fn contains(&self, id: ProjectileId) -> bool {
        read(&self.pending).contains_key(&id)
            || read(&self.active).contains_key(&id)
            || read(&self.inactive).contains_key(&id)
    }

    fn get(&self, id: ProjectileId) -> Option<SimData> {
        read(&self.pending)
            .get(&id)
            .or(read(&self.active).get(&id))
            .or(read(&self.inactive).get(&id))
            .cloned()
    }

    /// Takes a record that has not been fired yet.
    fn take_unfired(&self, id: ProjectileId) -> Option<SimData> {
        write(&self.pending)
            .remove(&id)
            .or_else(|| write(&self.inactive).remove(&id))
    }

    fn is_unfired(&self, id: ProjectileId) -> bool {
        read(&self.pending).contains_key(&id) || read(&self.inactive).contains_key(&id)
    }

    fn promote_pending(&self) -> usize {
        let drained: Vec<_> = write(&self.pending).drain().collect();
        let count = drained.len();
        write(&self.inactive).extend(drained);
        count
    }

    fn active_callbacks(&self, id: ProjectileId) -> Option<SimCallbacks> {
        read(&self.active).get(&id).map(|data| data.callbacks.clone())
    }
}

/// A launch waiting for quota.
#[derive(Clone, Debug)]
struct LaunchRequest {
    id: ProjectileId,
    params: LaunchParams,
    debug: DebugFlags,
}

/// Thread-safe owner of every simulated bullet and projectile.
///
/// Every method takes `&self`; the registry can be shared across threads,
/// but [`tick`](Self::tick) must be called from one owning thread, which is
/// where callbacks run.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use bevy::prelude::*;
/// use bevy_terminal_ballistics::prelude::*;
///
/// let registry = Registry::headless(Arc::new(SlabWorld::default())).unwrap();
/// let id = registry.add(SimData::bullet(presets::rifle_556x45())).unwrap();
/// assert!(registry.get(id).is_some());
/// assert!(registry.remove(id));
/// assert!(!registry.remove(id));
/// ```
#[derive(Resource)]
pub struct Registry {
    config: BallisticsConfig,
    next_id: AtomicU64,
    bullets: KindStore,
    projectiles: KindStore,
    deferred: RwLock<VecDeque<LaunchRequest>>,
    terminating: RwLock<HashSet<ProjectileId>>,
    launched_this_tick: AtomicUsize,
    hook: RwLock<Option<Arc<dyn ImpactHook>>>,
    worker_paused: AtomicBool,
    shutting_down: AtomicBool,
    channel: OwnerEnd,
    worker: Mutex<SimulationWorker>,
}

impl Registry {
    /// Starts the worker and returns the registry that drives it.
    pub fn new(
        world: Arc<dyn WorldQuery>,
        environment: Arc<dyn EnvironmentProvider>,
        materials: MaterialRegistry,
        config: BallisticsConfig,
    ) -> BallisticsResult<Self> {
        let (channel, end) = simulation_channel();
        let worker = SimulationWorker::spawn(
            end,
            WorkerContext {
                world,
                environment,
                materials: Arc::new(materials),
                config: config.clone(),
            },
        )
        .inspect_err(|e| error!("{e}"))?;

        Ok(Self {
            config,
            next_id: AtomicU64::new(1),
            bullets: KindStore::default(),
            projectiles: KindStore::default(),
            deferred: RwLock::new(VecDeque::new()),
            terminating: RwLock::new(HashSet::new()),
            launched_this_tick: AtomicUsize::new(0),
            hook: RwLock::new(None),
            worker_paused: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            channel,
            worker: Mutex::new(worker),
        })
    }

    /// A registry with the default environment, materials, and config.
    pub fn headless(world: Arc<dyn WorldQuery>) -> BallisticsResult<Self> {
        Self::new(
            world,
            Arc::new(crate::resources::BallisticsEnvironment::default()),
            MaterialRegistry::with_presets(),
            BallisticsConfig::default(),
        )
    }

    pub fn config(&self) -> &BallisticsConfig {
        &self.config
    }

    fn store(&self, kind: SimKind) -> &KindStore {
        match kind {
            SimKind::Bullet => &self.bullets,
            SimKind::Projectile => &self.projectiles,
        }
    }

    fn stores(&self) -> [&KindStore; 2] {
        [&self.bullets, &self.projectiles]
    }

    fn check_running(&self) -> BallisticsResult<()> {
        if self.is_shutting_down() {
            return Err(BallisticsError::ShuttingDown);
        }
        Ok(())
    }

    /// Registers a record and returns its id.
    ///
    /// The record is pending until the next tick, but can be fired
    /// immediately.
    pub fn add(&self, mut data: SimData) -> BallisticsResult<ProjectileId> {
        self.check_running()?;
        if !data.properties.is_valid() {
            warn!("rejected {}: invalid physical properties", data.properties.name());
            return Err(BallisticsError::InvalidSimData);
        }

        if data.id.is_valid() {
            if self.stores().iter().any(|store| store.contains(data.id)) {
                warn!("rejected add: {} is already registered", data.id);
                return Err(BallisticsError::DuplicateId(data.id));
            }
            if read(&self.terminating).contains(&data.id) {
                warn!("rejected add: {} is still terminating", data.id);
                return Err(BallisticsError::DuplicateId(data.id));
            }
            self.next_id.fetch_max(data.id.0 + 1, Ordering::Relaxed);
        } else {
            data.id = ProjectileId(self.next_id.fetch_add(1, Ordering::Relaxed));
        }

        let id = data.id;
        data.lifecycle = Lifecycle::Inactive;
        write(&self.store(data.kind()).pending).insert(id, data);
        Ok(id)
    }

    pub fn add_bullet(&self, data: SimData) -> BallisticsResult<ProjectileId> {
        if data.kind() != SimKind::Bullet {
            warn!("rejected add_bullet: {} is not a bullet", data.properties.name());
            return Err(BallisticsError::InvalidSimData);
        }
        self.add(data)
    }

    pub fn add_projectile(&self, data: SimData) -> BallisticsResult<ProjectileId> {
        if data.kind() != SimKind::Projectile {
            warn!("rejected add_projectile: {} is not a projectile", data.properties.name());
            return Err(BallisticsError::InvalidSimData);
        }
        self.add(data)
    }

    /// Launches a registered record.
    ///
    /// A launch without an owner takes the record's owner before it is
    /// validated.
    ///
    /// Launches beyond the per-tick quota are deferred to later ticks in
    /// call order; they are never dropped.
    pub fn fire(&self, id: ProjectileId, mut params: LaunchParams, debug: DebugFlags) -> BallisticsResult<()> {
        self.check_running()?;
        if params.owner.is_none() {
            params.owner = self.get(id).and_then(|data| data.owner);
        }
        if let Err(e) = params.validate() {
            warn!("rejected fire of {id}: {e}");
            return Err(e);
        }

        let Some(store) = self.stores().into_iter().find(|store| store.contains(id)) else {
            warn!("rejected fire: {id} is not registered");
            return Err(BallisticsError::UnknownProjectile(id));
        };

        let queued = read(&self.deferred).iter().any(|request| request.id == id);
        if queued || !store.is_unfired(id) {
            warn!("rejected fire: {id} has already been fired");
            return Err(BallisticsError::AlreadyFired(id));
        }

        let request = LaunchRequest { id, params, debug };
        if self.take_quota() {
            self.launch(request)
        } else {
            debug!("launch quota reached, deferring {id}");
            write(&self.deferred).push_back(request);
            Ok(())
        }
    }

    /// Adds and fires in one call. Rejected launch parameters leave nothing
    /// registered.
    pub fn add_and_fire(
        &self,
        data: SimData,
        mut params: LaunchParams,
        debug: DebugFlags,
    ) -> BallisticsResult<ProjectileId> {
        if params.owner.is_none() {
            params.owner = data.owner;
        }
        if let Err(e) = params.validate() {
            warn!("rejected add_and_fire of {}: {e}", data.properties.name());
            return Err(e);
        }
        let id = self.add(data)?;
        if let Err(e) = self.fire(id, params, debug) {
            self.remove(id);
            return Err(e);
        }
        Ok(id)
    }

    fn take_quota(&self) -> bool {
        self.launched_this_tick
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.config.max_launches_per_tick).then_some(n + 1)
            })
            .is_ok()
    }

    /// Moves the record to the active collection and hands it to the worker.
    fn launch(&self, request: LaunchRequest) -> BallisticsResult<()> {
        let LaunchRequest { id, params, debug } = request;
        let Some((store, mut data)) = self
            .stores()
            .into_iter()
            .find_map(|store| store.take_unfired(id).map(|data| (store, data)))
        else {
            debug!("{id} was removed before its launch");
            return Ok(());
        };

        data.lifecycle = Lifecycle::Active;
        data.position = params.fire_transform.location;
        data.velocity = params.start_velocity();
        if data.owner.is_none() {
            data.owner = params.owner;
        }
        if data.instigator.is_none() {
            data.instigator = params.instigator.or(data.owner);
        }
        let mut params = params;
        if params.owner.is_none() {
            params.owner = data.owner;
        }
        if params.instigator.is_none() {
            params.instigator = data.instigator;
        }

        let payload = LaunchPayload {
            id,
            properties: data.properties.clone(),
            params,
            debug,
        };
        write(&store.active).insert(id, data);
        if let Err(e) = self.channel.launch(payload) {
            write(&store.active).remove(&id);
            return Err(e);
        }
        Ok(())
    }

    /// Removes a record from whichever collection holds it.
    ///
    /// Returns false when the id is unknown, so removing twice is harmless.
    /// A record in flight is terminated on the worker and its late result is
    /// discarded. Its id cannot be added again until that result arrives.
    pub fn remove(&self, id: ProjectileId) -> bool {
        write(&self.deferred).retain(|request| request.id != id);
        for store in self.stores() {
            if write(&store.pending).remove(&id).is_some() || write(&store.inactive).remove(&id).is_some() {
                return true;
            }
            if write(&store.active).remove(&id).is_some() {
                write(&self.terminating).insert(id);
                if self.channel.control(ControlMessage::Terminate(id)).is_err() {
                    debug!("worker gone while terminating {id}");
                    write(&self.terminating).remove(&id);
                }
                return true;
            }
        }
        false
    }

    /// Looks the record up in pending, then active, then inactive.
    pub fn get(&self, id: ProjectileId) -> Option<SimData> {
        self.stores().into_iter().find_map(|store| store.get(id))
    }

    pub fn num_active(&self, kind: SimKind) -> usize {
        read(&self.store(kind).active).len()
    }

    pub fn num_inactive(&self, kind: SimKind) -> usize {
        read(&self.store(kind).inactive).len()
    }

    pub fn num_pending(&self, kind: SimKind) -> usize {
        read(&self.store(kind).pending).len()
    }

    /// Launches waiting for quota.
    pub fn num_deferred(&self) -> usize {
        read(&self.deferred).len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Installs the game-mode hook that sees every hit.
    pub fn set_impact_hook(&self, hook: Option<Arc<dyn ImpactHook>>) {
        *write(&self.hook) = hook;
    }

    /// Replaces the air conditions the worker simulates in.
    pub fn set_environment(&self, environment: Arc<dyn EnvironmentProvider>) {
        if self.channel.control(ControlMessage::SetEnvironment(environment)).is_err() {
            debug!("worker gone, environment not updated");
        }
    }

    /// Replaces the collision world the worker traces against.
    pub fn set_world(&self, world: Arc<dyn WorldQuery>) {
        if self.channel.control(ControlMessage::SetWorld(world)).is_err() {
            debug!("worker gone, world not updated");
        }
    }

    /// Per-frame update. Runs, in order:
    ///
    /// 1. propagate pause state and time dilation to the worker
    /// 2. promote pending adds to inactive
    /// 3. reset the launch quota and dispatch deferred launches up to it
    /// 4. drain up to `max_results_per_tick` worker events and dispatch
    ///    callbacks, retiring records whose simulation completed
    ///
    /// Returns the dispatched events.
    pub fn tick(&self, paused: bool, time_dilation: f32) -> Vec<SimEvent> {
        if self.is_shutting_down() {
            return Vec::new();
        }

        if self.worker_paused.swap(paused, Ordering::AcqRel) != paused {
            let message = if paused {
                ControlMessage::Pause
            } else {
                ControlMessage::Resume
            };
            if self.channel.control(message).is_err() {
                error!("simulation worker disconnected");
            }
        }
        self.channel.set_time_dilation(time_dilation);

        for store in self.stores() {
            store.promote_pending();
        }

        self.launched_this_tick.store(0, Ordering::Release);
        self.dispatch_deferred();

        let events = self.channel.drain(self.config.max_results_per_tick);
        self.dispatch(events)
    }

    fn dispatch_deferred(&self) {
        while !read(&self.deferred).is_empty() && self.take_quota() {
            let Some(request) = write(&self.deferred).pop_front() else {
                break;
            };
            let id = request.id;
            if let Err(e) = self.launch(request) {
                warn!("deferred launch of {id} failed: {e}");
            }
        }
    }

    fn callbacks(&self, event: &SimEvent) -> Option<SimCallbacks> {
        let id = event.id();
        match event {
            SimEvent::Hit(impact) | SimEvent::ExitHit(impact) | SimEvent::Injure(impact, _) => {
                self.store(impact.kind).active_callbacks(id)
            }
            SimEvent::Complete(result) => self.store(result.kind).active_callbacks(id),
            SimEvent::Update(..) => self
                .stores()
                .into_iter()
                .find_map(|store| store.active_callbacks(id)),
        }
    }

    fn dispatch(&self, events: Vec<SimEvent>) -> Vec<SimEvent> {
        let hook = read(&self.hook).clone();
        let mut dispatched = Vec::with_capacity(events.len());
        for event in events {
            if read(&self.terminating).contains(&event.id()) {
                if let SimEvent::Complete(result) = &event {
                    write(&self.terminating).remove(&result.id);
                }
                debug!("discarding event for removed {}", event.id());
                continue;
            }

            let Some(callbacks) = self.callbacks(&event) else {
                debug!("discarding late event for untracked {}", event.id());
                continue;
            };

            match &event {
                SimEvent::Hit(impact) => {
                    callbacks.dispatch_hit(impact);
                    if let Some(hook) = &hook {
                        hook.on_hit(impact);
                    }
                }
                SimEvent::ExitHit(impact) => {
                    callbacks.dispatch_exit_hit(impact);
                    if let Some(hook) = &hook {
                        hook.on_exit_hit(impact);
                    }
                }
                SimEvent::Injure(impact, injury) => {
                    callbacks.dispatch_injure(impact, injury);
                    if let Some(hook) = &hook {
                        hook.on_injure(impact, injury);
                    }
                }
                SimEvent::Update(id, sample) => {
                    for store in self.stores() {
                        if let Some(data) = write(&store.active).get_mut(id) {
                            data.position = sample.location;
                            data.velocity = sample.velocity;
                        }
                    }
                    callbacks.dispatch_update(*id, sample);
                }
                SimEvent::Complete(result) => {
                    write(&self.store(result.kind).active).remove(&result.id);
                    callbacks.dispatch_complete(result);
                }
            }
            dispatched.push(event);
        }
        dispatched
    }

    /// Stops all dispatch and tears the worker down.
    ///
    /// Waits up to `shutdown_timeout` for the worker; a worker that does not
    /// stop in time is detached. Calling this more than once is harmless.
    pub fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        write(&self.deferred).clear();
        if self.channel.control(ControlMessage::Shutdown).is_err() {
            debug!("simulation worker already stopped");
        }
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if !worker.join(self.config.shutdown_timeout) {
            error!(
                "simulation worker did not stop within {:?}",
                self.config.shutdown_timeout
            );
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::FireTransform;
    use crate::sim_data::presets;
    use crate::world::SlabWorld;

    fn registry() -> Registry {
        Registry::headless(Arc::new(SlabWorld::default())).unwrap()
    }

    fn shot() -> LaunchParams {
        LaunchParams::new(830.0, 800.0, FireTransform::new(Vec3::ZERO, Vec3::X))
    }

    #[test]
    fn test_add_assigns_ids_and_is_pending_until_tick() {
        let registry = registry();
        let a = registry.add(SimData::bullet(presets::rifle_762x51())).unwrap();
        let b = registry.add(SimData::projectile(presets::steel_ball())).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.num_pending(SimKind::Bullet), 1);
        assert_eq!(registry.num_pending(SimKind::Projectile), 1);

        registry.tick(false, 1.0);
        assert_eq!(registry.num_pending(SimKind::Bullet), 0);
        assert_eq!(registry.num_inactive(SimKind::Bullet), 1);
        assert_eq!(registry.num_inactive(SimKind::Projectile), 1);
        assert_eq!(registry.get(a).map(|d| d.lifecycle), Some(Lifecycle::Inactive));
    }

    #[test]
    fn test_invalid_data_is_rejected() {
        let registry = registry();
        let mut bullet = presets::pistol_9x19();
        bullet.radius = 0.0;
        assert_eq!(
            registry.add(SimData::bullet(bullet)),
            Err(BallisticsError::InvalidSimData)
        );
        assert_eq!(
            registry.add_projectile(SimData::bullet(presets::pistol_9x19())),
            Err(BallisticsError::InvalidSimData)
        );
        assert_eq!(registry.num_pending(SimKind::Bullet), 0);
    }

    #[test]
    fn test_caller_ids_are_kept_and_duplicates_rejected() {
        let registry = registry();
        let mut data = SimData::bullet(presets::pistol_9x19());
        data.id = ProjectileId(100);
        assert_eq!(registry.add(data.clone()), Ok(ProjectileId(100)));
        assert_eq!(registry.add(data), Err(BallisticsError::DuplicateId(ProjectileId(100))));
        let next = registry.add(SimData::bullet(presets::pistol_9x19())).unwrap();
        assert!(next.0 > 100);
    }

    #[test]
    fn test_fire_unknown_and_twice() {
        let registry = registry();
        assert_eq!(
            registry.fire(ProjectileId(9), shot(), DebugFlags::NONE),
            Err(BallisticsError::UnknownProjectile(ProjectileId(9)))
        );
        let id = registry.add(SimData::bullet(presets::rifle_762x51())).unwrap();
        registry.fire(id, shot(), DebugFlags::NONE).unwrap();
        assert_eq!(registry.num_active(SimKind::Bullet), 1);
        assert_eq!(
            registry.fire(id, shot(), DebugFlags::NONE),
            Err(BallisticsError::AlreadyFired(id))
        );
    }

    #[test]
    fn test_missing_owner_is_a_no_op() {
        let registry = registry();
        let mut params = shot();
        params.ignore_owner = true;
        let result = registry.add_and_fire(SimData::bullet(presets::rifle_762x51()), params, DebugFlags::NONE);
        assert_eq!(result, Err(BallisticsError::MissingOwner));
        assert_eq!(registry.num_pending(SimKind::Bullet), 0);
        assert_eq!(registry.num_active(SimKind::Bullet), 0);
    }

    #[test]
    fn test_record_owner_satisfies_ignore_owner() {
        let registry = registry();
        let owner = Entity::from_bits(42);
        let mut params = shot();
        params.ignore_owner = true;

        let data = SimData::bullet(presets::rifle_762x51()).with_owner(owner);
        let id = registry.add_and_fire(data, params.clone(), DebugFlags::NONE).unwrap();
        assert_eq!(registry.get(id).and_then(|d| d.owner), Some(owner));

        let id = registry
            .add(SimData::bullet(presets::rifle_762x51()).with_owner(owner))
            .unwrap();
        assert_eq!(registry.fire(id, params, DebugFlags::NONE), Ok(()));
        assert_eq!(registry.num_active(SimKind::Bullet), 2);
    }

    #[test]
    fn test_get_sees_every_collection() {
        let registry = registry();
        let pending = registry.add(SimData::bullet(presets::pistol_9x19())).unwrap();
        assert!(registry.get(pending).is_some());
        registry.tick(false, 1.0);
        assert!(registry.get(pending).is_some());
        registry.fire(pending, shot(), DebugFlags::NONE).unwrap();
        let active = registry.get(pending).unwrap();
        assert!(active.is_active());
        assert_eq!(active.velocity, Vec3::X * 83_000.0);
    }

    #[test]
    fn test_remove_in_flight_terminates_and_twice_is_a_no_op() {
        let registry = registry();
        let id = registry
            .add_and_fire(SimData::bullet(presets::rifle_762x51()), shot(), DebugFlags::NONE)
            .unwrap();
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.num_active(SimKind::Bullet), 0);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let registry = registry();
        registry.shutdown();
        registry.shutdown();
        assert!(registry.is_shutting_down());
        assert_eq!(
            registry.add(SimData::bullet(presets::pistol_9x19())),
            Err(BallisticsError::ShuttingDown)
        );
        assert!(registry.tick(false, 1.0).is_empty());
    }
}
