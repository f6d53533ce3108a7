//! # Bevy Terminal Ballistics
//!
//! Terminal ballistics simulation for Bevy 0.18.
//!
//! ## Features
//! - Background simulation worker stepping every bullet at a fixed rate
//! - RK4 or Euler flight integration with drag, wind and gravity
//! - Material-science penetration: elastic contact stress, von Mises yield,
//!   fracture toughness, and a threshold model for simple materials
//! - Ricochet decision from critical angle and energy transfer
//! - Wound-cavity sizing for living hit zones
//! - Typed per-record callbacks plus Bevy messages for every impact
//! - Optional avian3d collision backend (`avian` feature)
//!
//! World space is in centimeters; physics runs in SI and converts at the
//! function boundary.
//!
//! ## Quick Start
//! ```rust,no_run
//! use std::sync::Arc;
//! use bevy::prelude::*;
//! use bevy_terminal_ballistics::prelude::*;
//!
//! fn fire(registry: Res<Registry>) {
//!     let bullet = presets::rifle_762x51();
//!     let params = LaunchParams::new(
//!         bullet.muzzle_velocity,
//!         bullet.effective_range,
//!         FireTransform::new(Vec3::ZERO, Vec3::X),
//!     );
//!     let callbacks = SimCallbacks::default().on_hit(|impact| {
//!         info!("hit {:?} at {:.0} m/s", impact.surface, impact.impact_speed());
//!     });
//!     let data = SimData::bullet(bullet).with_callbacks(callbacks);
//!     if let Err(e) = registry.add_and_fire(data, params, DebugFlags::NONE) {
//!         warn!("could not fire: {e}");
//!     }
//! }
//!
//! fn main() {
//!     let world = SlabWorld::default().with_slab(Slab::new(
//!         Entity::from_bits(1),
//!         Vec3::new(1000.5, 0.0, 0.0),
//!         Vec3::new(0.5, 100.0, 100.0),
//!         SurfaceType::Steel,
//!     ));
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(TerminalBallisticsPlugin::new(Arc::new(world)))
//!         .add_systems(Startup, fire)
//!         .run();
//! }
//! ```

use std::sync::Arc;

use bevy::ecs::message::MessageWriter;
use bevy::prelude::*;

pub mod channel;
pub mod debug;
pub mod error;
pub mod events;
pub mod launch;
pub mod materials;
pub mod observer;
pub mod physics;
pub mod registry;
pub mod resources;
pub mod sim_data;
pub mod task;
pub mod types;
pub mod worker;
pub mod world;

pub mod prelude {
    pub use crate::error::{BallisticsError, BallisticsResult};
    pub use crate::events::*;
    pub use crate::launch::{FireTransform, LaunchParams};
    pub use crate::materials::presets as material_presets;
    pub use crate::materials::{
        MaterialProperties, MaterialRegistry, PenetrationComplexity, RicochetProperties,
        SurfaceType,
    };
    pub use crate::observer::{ImpactHook, SimCallbacks, SimObserver};
    pub use crate::physics::NoseShape;
    pub use crate::registry::Registry;
    pub use crate::resources::*;
    pub use crate::sim_data::presets;
    pub use crate::sim_data::{
        BulletProperties, PhysicalProperties, ProjectileProperties, SimData, SimKind,
    };
    pub use crate::types::*;
    pub use crate::world::{BallisticSurface, Slab, SlabWorld};
    pub use crate::TerminalBallisticsPlugin;
}

use crate::events::{
    ProjectileComplete, ProjectileExitHit, ProjectileHit, ProjectileInjure, SimEvent,
};
use crate::materials::MaterialRegistry;
use crate::registry::Registry;
use crate::resources::{BallisticsConfig, BallisticsEnvironment};
use crate::types::WorldQuery;

/// Where the worker gets its collision world from.
#[derive(Clone)]
enum WorldSource {
    Fixed(Arc<dyn WorldQuery>),
    #[cfg(feature = "avian")]
    Avian,
}

/// Wires the simulation into an [`App`].
///
/// Inserts [`BallisticsConfig`], [`BallisticsEnvironment`] and a [`Registry`]
/// resource, adds the impact and completion messages, and ticks the registry
/// every frame in `Update`.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use bevy::prelude::*;
/// use bevy_terminal_ballistics::prelude::*;
///
/// App::new()
///     .add_plugins(MinimalPlugins)
///     .add_plugins(
///         TerminalBallisticsPlugin::new(Arc::new(SlabWorld::default())).with_config(
///             BallisticsConfig {
///                 max_launches_per_tick: 64,
///                 ..Default::default()
///             },
///         ),
///     )
///     .run();
/// ```
pub struct TerminalBallisticsPlugin {
    world: WorldSource,
    config: BallisticsConfig,
    environment: BallisticsEnvironment,
    materials: MaterialRegistry,
    debug_draw: bool,
}

impl TerminalBallisticsPlugin {
    /// Simulates against a fixed world; replace it later with
    /// [`Registry::set_world`].
    pub fn new(world: Arc<dyn WorldQuery>) -> Self {
        Self {
            world: WorldSource::Fixed(world),
            config: BallisticsConfig::default(),
            environment: BallisticsEnvironment::default(),
            materials: MaterialRegistry::with_presets(),
            debug_draw: false,
        }
    }

    /// Simulates against avian3d colliders tagged with
    /// [`BallisticSurface`](crate::world::BallisticSurface). The scene must
    /// be authored in centimeters.
    #[cfg(feature = "avian")]
    pub fn avian() -> Self {
        Self {
            world: WorldSource::Avian,
            ..Self::new(Arc::new(world::SlabWorld::default()))
        }
    }

    pub fn with_config(mut self, config: BallisticsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_environment(mut self, environment: BallisticsEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_materials(mut self, materials: MaterialRegistry) -> Self {
        self.materials = materials;
        self
    }

    /// Draws completed paths and impacts with gizmos. Needs the gizmo
    /// plugin (part of `DefaultPlugins`).
    pub fn with_debug_drawing(mut self) -> Self {
        self.debug_draw = true;
        self
    }
}

impl Plugin for TerminalBallisticsPlugin {
    /// Builds the plugin by starting the worker and scheduling the tick.
    ///
    /// If the worker cannot be started the error is logged and no
    /// [`Registry`] is inserted; the tick system then never runs.
    ///
    /// # Arguments
    /// * `app` - Mutable reference to the Bevy App
    fn build(&self, app: &mut App) {
        let world: Arc<dyn WorldQuery> = match &self.world {
            WorldSource::Fixed(world) => world.clone(),
            #[cfg(feature = "avian")]
            WorldSource::Avian => Arc::new(world::SlabWorld::default()),
        };

        match Registry::new(
            world,
            Arc::new(self.environment.clone()),
            self.materials.clone(),
            self.config.clone(),
        ) {
            Ok(registry) => {
                app.insert_resource(registry);
            }
            Err(e) => error!("terminal ballistics disabled: {e}"),
        }

        app.register_type::<BallisticsConfig>()
            .register_type::<BallisticsEnvironment>()
            .register_type::<world::BallisticSurface>()
            .insert_resource(self.config.clone())
            .insert_resource(self.environment.clone())
            .init_resource::<debug::DebugDrawings>()
            .add_message::<ProjectileHit>()
            .add_message::<ProjectileExitHit>()
            .add_message::<ProjectileInjure>()
            .add_message::<ProjectileComplete>()
            .add_systems(
                Update,
                (tick_registry, debug::collect_debug_paths)
                    .chain()
                    .run_if(resource_exists::<Registry>),
            );

        #[cfg(feature = "avian")]
        if matches!(self.world, WorldSource::Avian) {
            app.add_systems(
                Update,
                world::avian::sync_avian_world
                    .before(tick_registry)
                    .run_if(resource_exists::<Registry>),
            );
        }

        if self.debug_draw {
            app.add_systems(
                Update,
                debug::draw_ballistics_debug.after(debug::collect_debug_paths),
            );
        }
    }
}

/// Ticks the registry and mirrors its dispatches as messages.
///
/// Virtual time drives the worker: a paused clock pauses the simulation and
/// the relative speed becomes the time dilation. Environment changes are
/// pushed to the worker as they happen.
pub fn tick_registry(
    registry: Res<Registry>,
    time: Res<Time<Virtual>>,
    environment: Res<BallisticsEnvironment>,
    mut hits: MessageWriter<ProjectileHit>,
    mut exits: MessageWriter<ProjectileExitHit>,
    mut injuries: MessageWriter<ProjectileInjure>,
    mut completions: MessageWriter<ProjectileComplete>,
) {
    if environment.is_changed() {
        registry.set_environment(Arc::new(environment.clone()));
    }

    for event in registry.tick(time.is_paused(), time.relative_speed()) {
        match event {
            SimEvent::Hit(impact) => {
                hits.write(ProjectileHit(impact));
            }
            SimEvent::ExitHit(impact) => {
                exits.write(ProjectileExitHit(impact));
            }
            SimEvent::Injure(impact, injury) => {
                injuries.write(ProjectileInjure { impact, injury });
            }
            SimEvent::Complete(result) => {
                completions.write(ProjectileComplete(result));
            }
            SimEvent::Update(..) => {}
        }
    }
}
