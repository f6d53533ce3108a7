use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bevy::ecs::message::MessageReader;
use bevy::prelude::*;
use bevy_terminal_ballistics::prelude::*;
use bevy_terminal_ballistics::tick_registry;

#[derive(Resource, Default)]
struct Seen {
    hits: Vec<ImpactParams>,
    completed: Vec<TaskResult>,
}

fn fire_at_plate(registry: Res<Registry>) {
    let bullet = presets::rifle_762x51();
    let params = LaunchParams::new(
        bullet.muzzle_velocity,
        bullet.effective_range,
        FireTransform::new(Vec3::ZERO, Vec3::X),
    );
    registry
        .add_and_fire(SimData::bullet(bullet), params, DebugFlags::DRAW_PATH)
        .unwrap();
}

fn record(
    mut seen: ResMut<Seen>,
    mut hits: MessageReader<ProjectileHit>,
    mut completed: MessageReader<ProjectileComplete>,
) {
    seen.hits.extend(hits.read().map(|ProjectileHit(impact)| impact.clone()));
    seen.completed
        .extend(completed.read().map(|ProjectileComplete(result)| result.clone()));
}

fn app() -> App {
    let plate = Slab::new(
        Entity::from_bits(100),
        Vec3::new(1025.0, 0.0, 0.0),
        Vec3::new(25.0, 500.0, 500.0),
        SurfaceType::Steel,
    );
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugins(TerminalBallisticsPlugin::new(Arc::new(
            SlabWorld::default().with_slab(plate),
        )))
        .init_resource::<Seen>()
        .add_systems(Startup, fire_at_plate)
        .add_systems(Update, record.after(tick_registry));
    app
}

#[test]
fn test_plugin_inserts_resources() {
    let app = app();
    assert!(app.world().contains_resource::<Registry>());
    assert!(app.world().contains_resource::<BallisticsConfig>());
    assert!(app.world().contains_resource::<BallisticsEnvironment>());
}

#[test]
fn test_messages_mirror_dispatches() {
    let mut app = app();
    let deadline = Instant::now() + Duration::from_secs(20);
    while app.world().resource::<Seen>().completed.is_empty() && Instant::now() < deadline {
        app.update();
        thread::sleep(Duration::from_millis(2));
    }

    let seen = app.world().resource::<Seen>();
    assert_eq!(seen.completed.len(), 1);
    assert_eq!(seen.completed[0].exit_code, ExitCode::Stopped);
    assert_eq!(seen.hits.len(), 1);
    assert_eq!(seen.hits[0].surface, SurfaceType::Steel);

    let registry = app.world().resource::<Registry>();
    assert_eq!(registry.num_active(SimKind::Bullet), 0);
}
