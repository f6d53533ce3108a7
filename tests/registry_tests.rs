use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bevy::prelude::*;
use bevy_terminal_ballistics::prelude::*;

const TIMEOUT: Duration = Duration::from_secs(20);

fn registry_with(world: SlabWorld, config: BallisticsConfig) -> Registry {
    Registry::new(
        Arc::new(world),
        Arc::new(BallisticsEnvironment::default()),
        MaterialRegistry::with_presets(),
        config,
    )
    .unwrap()
}

fn steel_plate(thickness: f32) -> SlabWorld {
    SlabWorld::default().with_slab(Slab::new(
        Entity::from_bits(100),
        Vec3::new(1000.0 + thickness / 2.0, 0.0, 0.0),
        Vec3::new(thickness / 2.0, 500.0, 500.0),
        SurfaceType::Steel,
    ))
}

fn rifle_shot() -> (SimData, LaunchParams) {
    let bullet = presets::rifle_762x51();
    let params = LaunchParams::new(
        bullet.muzzle_velocity,
        bullet.effective_range,
        FireTransform::new(Vec3::ZERO, Vec3::X),
    );
    (SimData::bullet(bullet), params)
}

/// Ticks until `done` holds or the timeout elapses.
fn pump(registry: &Registry, time_dilation: f32, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        registry.tick(false, time_dilation);
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[derive(Default)]
struct Recorder {
    hits: Mutex<Vec<ImpactParams>>,
    exits: Mutex<Vec<ImpactParams>>,
    completed: Mutex<HashMap<ProjectileId, u32>>,
    paths: Mutex<Vec<usize>>,
}

impl SimObserver for Recorder {
    fn on_hit(&self, impact: &ImpactParams) {
        self.hits.lock().unwrap().push(impact.clone());
    }

    fn on_exit_hit(&self, impact: &ImpactParams) {
        self.exits.lock().unwrap().push(impact.clone());
    }

    fn on_complete(&self, id: ProjectileId, path: &[PathSample]) {
        *self.completed.lock().unwrap().entry(id).or_default() += 1;
        self.paths.lock().unwrap().push(path.len());
    }
}

impl Recorder {
    fn completions(&self) -> usize {
        self.completed.lock().unwrap().values().sum::<u32>() as usize
    }
}

#[test]
fn test_launches_over_quota_are_deferred_not_dropped() {
    let registry = registry_with(
        SlabWorld::default(),
        BallisticsConfig {
            max_launches_per_tick: 4,
            ..Default::default()
        },
    );
    let recorder = Arc::new(Recorder::default());

    let mut ids = Vec::new();
    for _ in 0..10 {
        let (data, params) = rifle_shot();
        let data = data.with_callbacks(SimCallbacks::default().with_observer(recorder.clone()));
        let id = registry.add(data).unwrap();
        registry.fire(id, params, DebugFlags::NONE).unwrap();
        ids.push(id);
    }
    assert_eq!(registry.num_active(SimKind::Bullet), 4);
    assert_eq!(registry.num_deferred(), 6);

    // A deferred launch cannot be queued a second time.
    let (_, params) = rifle_shot();
    assert_eq!(
        registry.fire(ids[9], params, DebugFlags::NONE),
        Err(BallisticsError::AlreadyFired(ids[9]))
    );

    registry.tick(false, 1.0);
    assert_eq!(registry.num_deferred(), 2);
    registry.tick(false, 1.0);
    assert_eq!(registry.num_deferred(), 0);

    assert!(pump(&registry, 10.0, || recorder.completions() >= ids.len()));
    // Give any duplicate a chance to show up.
    for _ in 0..20 {
        registry.tick(false, 10.0);
        thread::sleep(Duration::from_millis(2));
    }

    let completed = recorder.completed.lock().unwrap();
    assert_eq!(completed.len(), ids.len());
    for id in &ids {
        assert_eq!(completed.get(id), Some(&1), "{id}");
    }
    assert_eq!(registry.num_active(SimKind::Bullet), 0);
}

#[test]
fn test_rifle_bullet_through_one_centimeter_of_steel() {
    let registry = registry_with(steel_plate(1.0), BallisticsConfig::default());
    let recorder = Arc::new(Recorder::default());
    let (data, params) = rifle_shot();
    let data = data.with_callbacks(SimCallbacks::default().with_observer(recorder.clone()));
    registry.add_and_fire(data, params, DebugFlags::NONE).unwrap();

    assert!(pump(&registry, 10.0, || recorder.completions() == 1));

    let hits = recorder.hits.lock().unwrap();
    let exits = recorder.exits.lock().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(exits.len(), 1);
    assert_eq!(hits[0].surface, SurfaceType::Steel);
    assert!(exits[0].exit_speed() > 0.0);
    assert!(exits[0].exit_speed() < hits[0].impact_speed());
}

#[test]
fn test_rifle_bullet_stopped_by_fifty_centimeters_of_steel() {
    let registry = registry_with(steel_plate(50.0), BallisticsConfig::default());
    let recorder = Arc::new(Recorder::default());
    let (data, params) = rifle_shot();
    let data = data.with_callbacks(SimCallbacks::default().with_observer(recorder.clone()));
    registry.add_and_fire(data, params, DebugFlags::NONE).unwrap();

    assert!(pump(&registry, 1.0, || recorder.completions() == 1));

    let hits = recorder.hits.lock().unwrap();
    assert_eq!(hits.len(), 1);
    assert!(recorder.exits.lock().unwrap().is_empty());
    assert_eq!(hits[0].exit_velocity, Vec3::ZERO);
    assert!(hits[0].penetration_depth <= 50.0);
    assert!(hits[0].energy_delta > 0.0);
}

#[test]
fn test_removing_twice_dispatches_nothing() {
    let registry = registry_with(SlabWorld::default(), BallisticsConfig::default());
    let recorder = Arc::new(Recorder::default());
    let (data, params) = rifle_shot();
    let data = data.with_callbacks(SimCallbacks::default().with_observer(recorder.clone()));
    let id = registry.add_and_fire(data, params, DebugFlags::NONE).unwrap();

    assert!(registry.remove(id));
    assert!(!registry.remove(id));

    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        registry.tick(false, 10.0);
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(recorder.completions(), 0);
    assert!(registry.get(id).is_none());
}

#[test]
fn test_paused_worker_does_not_advance() {
    let registry = registry_with(SlabWorld::default(), BallisticsConfig::default());
    let updates = Arc::new(Mutex::new(0u32));
    let completed = Arc::new(Mutex::new(false));
    let (counter, done) = (updates.clone(), completed.clone());
    let callbacks = SimCallbacks::default()
        .on_update(move |_, _| *counter.lock().unwrap() += 1)
        .on_complete(move |_, _| *done.lock().unwrap() = true);

    registry.tick(true, 1.0);
    let (data, params) = rifle_shot();
    registry
        .add_and_fire(data.with_callbacks(callbacks), params, DebugFlags::REPORT_UPDATES)
        .unwrap();

    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        registry.tick(true, 1.0);
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(*updates.lock().unwrap(), 0);
    assert!(!*completed.lock().unwrap());

    assert!(pump(&registry, 10.0, || *completed.lock().unwrap()));
    assert!(*updates.lock().unwrap() > 0);
}

#[test]
fn test_impact_hook_sees_every_hit() {
    #[derive(Default)]
    struct Damage {
        hits: Mutex<u32>,
        exits: Mutex<u32>,
    }

    impl ImpactHook for Damage {
        fn on_hit(&self, _impact: &ImpactParams) {
            *self.hits.lock().unwrap() += 1;
        }

        fn on_exit_hit(&self, _impact: &ImpactParams) {
            *self.exits.lock().unwrap() += 1;
        }
    }

    let registry = registry_with(steel_plate(1.0), BallisticsConfig::default());
    let damage = Arc::new(Damage::default());
    registry.set_impact_hook(Some(damage.clone()));

    let ids: Vec<_> = (0..3)
        .map(|_| {
            let (data, params) = rifle_shot();
            registry.add_and_fire(data, params, DebugFlags::NONE).unwrap()
        })
        .collect();
    assert!(pump(&registry, 10.0, || ids.iter().all(|id| registry.get(*id).is_none())));

    assert_eq!(*damage.hits.lock().unwrap(), 3);
    assert_eq!(*damage.exits.lock().unwrap(), 3);
}

#[test]
fn test_removed_id_is_reserved_until_its_result_drains() {
    let registry = registry_with(SlabWorld::default(), BallisticsConfig::default());
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    let with_id = |recorder: &Arc<Recorder>| {
        let (mut data, params) = rifle_shot();
        data.id = ProjectileId(500);
        let data = data.with_callbacks(SimCallbacks::default().with_observer(recorder.clone()));
        (data, params)
    };

    registry.tick(true, 1.0);
    let (data, params) = with_id(&first);
    assert_eq!(
        registry.add_and_fire(data, params, DebugFlags::NONE),
        Ok(ProjectileId(500))
    );
    assert!(registry.remove(ProjectileId(500)));

    // The worker is paused, so the old flight has not reported yet.
    let (data, params) = with_id(&second);
    assert_eq!(
        registry.add_and_fire(data, params, DebugFlags::NONE),
        Err(BallisticsError::DuplicateId(ProjectileId(500)))
    );

    let (data, params) = with_id(&second);
    assert!(pump(&registry, 1.0, || registry.add(data.clone()).is_ok()));
    registry.fire(ProjectileId(500), params, DebugFlags::NONE).unwrap();
    assert!(pump(&registry, 10.0, || second.completions() == 1));

    assert_eq!(first.completions(), 0);
    let paths = second.paths.lock().unwrap();
    assert_eq!(paths.len(), 1);
    assert!(paths[0] > 1);
}
