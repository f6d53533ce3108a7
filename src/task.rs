//! Per-projectile simulation state machine.
//!
//! A task is created by the worker from a launch payload and stepped at the
//! worker's fixed rate. Each step integrates the flight, issues one world
//! trace, and consumes any surface it finds:
//!
//! `Initializing → Integrating → ConsumingHit → {Ricocheted | Penetrating | Stopped} → Complete | Killed`
//!
//! Events are pushed into an output buffer; the worker forwards them to the
//! owning thread. A task produces exactly one result.

use bevy::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::channel::LaunchPayload;
use crate::events::{ExitCode, ImpactParams, InjuryParams, PathSample, SimEvent, TaskResult};
use crate::materials::{MaterialProperties, MaterialRegistry, SurfaceType};
use crate::physics::cavity::calculate_cavity;
use crate::physics::drag::{integrate_euler, integrate_rk4, AeroBody, AirState};
use crate::physics::penetration::calculate_exit_velocity;
use crate::physics::ricochet::{select_policy, should_ricochet};
use crate::physics::units::{cm_to_m, kinetic_energy, obliquity_degrees};
use crate::resources::BallisticsConfig;
use crate::sim_data::{PhysicalProperties, SimKind};
use crate::types::{DebugFlags, EnvironmentProvider, HitResult, PhysicsModel, ProjectileId, SurfaceTrace, WorldQuery};

/// Distance (cm) a body is placed beyond a surface it leaves, so the next
/// trace starts outside the object.
const SURFACE_OFFSET: f32 = 0.05;

/// Task lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Initializing,
    Integrating,
    ConsumingHit,
    Ricocheted,
    Penetrating,
    Stopped,
    Complete,
    Killed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Killed)
    }
}

/// Read-only collaborators shared by every task on the worker.
pub struct TaskContext<'a> {
    pub world: &'a dyn WorldQuery,
    pub environment: &'a dyn EnvironmentProvider,
    pub materials: &'a MaterialRegistry,
    pub config: &'a BallisticsConfig,
}

impl TaskContext<'_> {
    fn material(&self, surface: SurfaceType) -> &MaterialProperties {
        if let Some(material) = self.materials.get(surface) {
            return material;
        }
        if surface != SurfaceType::Default {
            warn!("no material registered for {:?}, using {:?}", surface, self.config.default_surface);
        }
        self.materials
            .get(self.config.default_surface)
            .unwrap_or_else(|| self.materials.fallback())
    }
}

/// What consuming a hit decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HitOutcome {
    /// Keep flying.
    Continue,
    /// The task ended.
    Finished,
}

/// One simulated bullet or projectile.
pub struct SimulationTask {
    id: ProjectileId,
    properties: PhysicalProperties,
    params: crate::launch::LaunchParams,
    debug: DebugFlags,
    state: TaskState,
    body_material: MaterialProperties,
    position: Vec3,
    velocity: Vec3,
    time: f32,
    max_lifetime: f32,
    max_distance: f32,
    distance: f32,
    iterations: u32,
    penetrations: u32,
    ricochets: u32,
    path: Vec<PathSample>,
    impacts: Vec<Vec3>,
    ignore: Vec<Entity>,
    owner_ignored: bool,
    previous_hit: Option<HitResult>,
    rng: StdRng,
    exit_code: Option<ExitCode>,
    termination_requested: bool,
}

impl SimulationTask {
    pub fn new(payload: LaunchPayload) -> Self {
        let LaunchPayload {
            id,
            properties,
            params,
            debug,
        } = payload;
        Self {
            id,
            properties,
            debug,
            state: TaskState::Initializing,
            body_material: MaterialProperties::default(),
            position: params.fire_transform.location,
            velocity: Vec3::ZERO,
            time: 0.0,
            max_lifetime: 0.0,
            max_distance: 0.0,
            distance: 0.0,
            iterations: 0,
            penetrations: 0,
            ricochets: 0,
            path: Vec::new(),
            impacts: Vec::new(),
            ignore: Vec::new(),
            owner_ignored: false,
            previous_hit: None,
            rng: StdRng::seed_from_u64(id.0),
            exit_code: None,
            termination_requested: false,
            params,
        }
    }

    pub fn id(&self) -> ProjectileId {
        self.id
    }

    pub fn kind(&self) -> SimKind {
        self.properties.kind()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Per-launch simulation speed multiplier.
    pub fn time_scale(&self) -> f32 {
        self.params.time_scale
    }

    /// Asks the task to stop; honored at the start of the next step.
    pub fn request_termination(&mut self) {
        self.termination_requested = true;
    }

    /// Derives the initial state from the launch.
    pub fn initialize(&mut self, ctx: &TaskContext) {
        if self.state != TaskState::Initializing {
            return;
        }
        if !self.properties.is_valid() {
            warn!("{}: invalid physical properties, not simulated", self.id);
            self.finish(ExitCode::InvalidProjectile);
            return;
        }

        self.body_material = ctx.material(self.properties.material()).clone();
        self.position = self.params.fire_transform.location;
        self.velocity = self.params.start_velocity();
        self.max_lifetime = self.params.max_lifetime(ctx.config.lifetime_range_factor);
        self.max_distance = ctx.config.lifetime_range_factor * self.params.effective_range * 100.0;
        self.ignore = self.params.initial_ignore_list();
        self.owner_ignored = self.params.ignore_owner
            && self.params.owner.is_some_and(|owner| !self.params.ignore.contains(&owner));
        self.record_sample();
        self.state = TaskState::Integrating;
    }

    /// Advances the task by `dt` seconds of simulated time.
    pub fn step(&mut self, dt: f32, ctx: &TaskContext, out: &mut Vec<SimEvent>) {
        if self.state == TaskState::Initializing {
            self.initialize(ctx);
        }
        if self.is_finished() {
            return;
        }
        if self.termination_requested {
            self.finish(ExitCode::Terminated);
            return;
        }
        if self.iterations >= ctx.config.max_iterations {
            self.finish(ExitCode::IterationLimit);
            return;
        }
        if self.time >= self.max_lifetime {
            self.finish(ExitCode::LifetimeExceeded);
            return;
        }

        let (next_position, next_velocity) = self.integrate(dt, ctx);
        self.iterations += 1;
        self.time += dt;

        let start = self.position;
        match ctx.world.trace(start, next_position, &self.ignore, self.params.filter) {
            Some(trace) => {
                let segment = next_position.distance(start);
                let fraction = if segment > 0.0 {
                    (trace.hit.distance / segment).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                self.distance += trace.hit.distance;
                self.velocity = self.velocity.lerp(next_velocity, fraction);
                self.position = trace.hit.point;
                if self.consume_hit(&trace, ctx, out) == HitOutcome::Finished {
                    return;
                }
                self.state = TaskState::Integrating;
            }
            None => {
                self.distance += next_position.distance(start);
                self.position = next_position;
                self.velocity = next_velocity;
            }
        }

        self.record_sample();
        if self.debug.contains(DebugFlags::REPORT_UPDATES) {
            if let Some(sample) = self.path.last() {
                out.push(SimEvent::Update(self.id, *sample));
            }
        }
        self.release_owner();

        if cm_to_m(self.velocity.length()) < ctx.config.min_speed {
            self.finish(ExitCode::ZeroVelocity);
        } else if self.distance > self.max_distance {
            self.finish(ExitCode::OutOfRange);
        }
    }

    /// Ends the task early with the given code (worker shutdown).
    pub fn kill(&mut self, code: ExitCode) {
        if !self.is_finished() {
            self.finish(code);
        }
    }

    /// Builds the final report. Only meaningful once finished.
    pub fn result(&self) -> TaskResult {
        TaskResult {
            id: self.id,
            kind: self.kind(),
            exit_code: self.exit_code.unwrap_or(ExitCode::Terminated),
            path: self.path.clone(),
            final_location: self.position,
            final_velocity: self.velocity,
            penetrations: self.penetrations,
            ricochets: self.ricochets,
            iterations: self.iterations,
            flight_time: self.time,
            impacts: self.impacts.clone(),
            debug: self.debug,
        }
    }

    fn finish(&mut self, code: ExitCode) {
        self.exit_code = Some(code);
        self.state = if code.is_kill() {
            TaskState::Killed
        } else {
            TaskState::Complete
        };
        if self.debug.contains(DebugFlags::PRINT_DEBUG_INFO) {
            info!(
                "{} finished: {:?} after {} steps, {:.3}s, {} penetrations, {} ricochets",
                self.id, code, self.iterations, self.time, self.penetrations, self.ricochets
            );
        }
    }

    fn integrate(&self, dt: f32, ctx: &TaskContext) -> (Vec3, Vec3) {
        let penetrator = self.properties.penetrator(&self.body_material);
        let body = AeroBody::from(&penetrator);
        let air = AirState {
            gravity: ctx.environment.gravity() * self.params.gravity_multiplier,
            wind: ctx.environment.wind_at(self.position),
            air_density: ctx.environment.air_density_at(self.position),
        };
        match ctx.config.physics_model {
            PhysicsModel::RK4 => integrate_rk4(self.position, self.velocity, dt, &body, &air),
            PhysicsModel::Euler => integrate_euler(self.position, self.velocity, dt, &body, &air),
        }
    }

    fn record_sample(&mut self) {
        self.path.push(PathSample {
            location: self.position,
            velocity: self.velocity,
            time: self.time,
        });
    }

    /// Stops skipping the owner once the body is clear of it.
    fn release_owner(&mut self) {
        if self.owner_ignored && self.distance >= self.params.owner_ignore_distance {
            if let Some(owner) = self.params.owner {
                self.ignore.retain(|e| *e != owner);
            }
            self.owner_ignored = false;
        }
    }

    fn move_through(&mut self, trace: &SurfaceTrace) {
        let direction = self.velocity.normalize_or_zero();
        self.distance += trace.thickness;
        self.position = trace.exit_point + direction * SURFACE_OFFSET;
    }

    fn impact(&self, hit: &HitResult, impact_velocity: Vec3) -> ImpactParams {
        ImpactParams {
            id: self.id,
            kind: self.kind(),
            entity: hit.entity,
            location: hit.point,
            normal: hit.normal,
            surface: hit.surface,
            impact_velocity,
            exit_velocity: impact_velocity,
            penetration_depth: 0.0,
            thickness: 0.0,
            energy_delta: 0.0,
            ricochet: false,
            is_exit: false,
            owner: self.params.owner,
            instigator: self.params.instigator,
        }
    }

    fn exit_impact(&self, trace: &SurfaceTrace, entry: &ImpactParams) -> ImpactParams {
        ImpactParams {
            location: trace.exit_point,
            normal: -trace.hit.normal,
            is_exit: true,
            ..entry.clone()
        }
    }

    fn injury(&self, impact: &ImpactParams, material: &MaterialProperties) -> InjuryParams {
        let wound = calculate_cavity(
            impact.impact_speed(),
            impact.energy_delta,
            impact.penetration_depth,
            impact.thickness,
            cm_to_m(self.properties.radius()),
            material.density_si(),
        );
        InjuryParams {
            id: self.id,
            entity: impact.entity,
            location: impact.location,
            impact_speed: impact.impact_speed(),
            energy_delta: impact.energy_delta,
            penetration_depth: impact.penetration_depth,
            surface: impact.surface,
            wound,
        }
    }

    fn emit_hit(&mut self, impact: ImpactParams, injure: Option<&MaterialProperties>, out: &mut Vec<SimEvent>) {
        self.impacts.push(impact.location);
        if let Some(material) = injure {
            let injury = self.injury(&impact, material);
            out.push(SimEvent::Hit(impact.clone()));
            out.push(SimEvent::Injure(impact, injury));
        } else {
            out.push(SimEvent::Hit(impact));
        }
    }

    fn consume_hit(&mut self, trace: &SurfaceTrace, ctx: &TaskContext, out: &mut Vec<SimEvent>) -> HitOutcome {
        self.state = TaskState::ConsumingHit;
        let hit = trace.hit;
        let tags = hit.tags;

        if tags.ignore {
            self.move_through(trace);
            return HitOutcome::Continue;
        }

        if self.velocity.length_squared() <= f32::EPSILON {
            self.finish(ExitCode::ZeroVelocity);
            return HitOutcome::Finished;
        }

        if self.previous_hit.is_some_and(|previous| previous.is_identical(&hit)) {
            self.finish(ExitCode::EarlyTermination);
            return HitOutcome::Finished;
        }

        self.record_sample();

        if self.previous_hit.is_some_and(|previous| previous.same_face(&hit)) {
            debug!("{}: repeated hit on the same face, skipping", self.id);
            self.move_through(trace);
            return HitOutcome::Continue;
        }
        self.previous_hit = Some(hit);

        let material = ctx.material(hit.surface).clone();
        let impact_velocity = self.velocity;
        let live_zone = tags.is_live_hit_zone(material.is_flesh());
        let injure = live_zone.then_some(&material);
        let mut impact = self.impact(&hit, impact_velocity);
        impact.thickness = trace.thickness;

        if tags.impenetrable {
            impact.exit_velocity = Vec3::ZERO;
            impact.energy_delta = kinetic_energy(self.properties.mass(), cm_to_m(impact_velocity.length()));
            self.emit_hit(impact, injure, out);
            self.velocity = Vec3::ZERO;
            self.finish(ExitCode::EarlyTermination);
            return HitOutcome::Finished;
        }

        if tags.ignore_penetration || trace.thickness < ctx.config.min_penetration_depth {
            impact.penetration_depth = trace.thickness;
            let exit = self.exit_impact(trace, &impact);
            self.emit_hit(impact, injure, out);
            out.push(SimEvent::ExitHit(exit));
            self.move_through(trace);
            return HitOutcome::Continue;
        }

        let penetrator = self.properties.penetrator(&self.body_material);

        if !live_zone || material.is_bone() {
            let policy = select_policy(&material, self.properties.ricochet());
            let outcome = should_ricochet(
                &penetrator,
                impact_velocity,
                hit.normal,
                trace.thickness,
                &material,
                policy,
                &mut self.rng,
            );
            if outcome.ricochet {
                self.state = TaskState::Ricocheted;
                self.ricochets += 1;
                impact.ricochet = true;
                impact.exit_velocity = outcome.velocity;
                impact.energy_delta = outcome.imparted_energy;
                impact.penetration_depth = self.properties.radius() / 2.0;
                if self.debug.contains(DebugFlags::PRINT_DEBUG_INFO) {
                    info!(
                        "{} ricocheted off {} at {:.1}°: {:.0} -> {:.0} m/s",
                        self.id,
                        material.name,
                        obliquity_degrees(impact_velocity, hit.normal),
                        impact.impact_speed(),
                        impact.exit_speed()
                    );
                }
                self.emit_hit(impact, injure, out);
                let away = if impact_velocity.dot(hit.normal) < 0.0 {
                    hit.normal
                } else {
                    -hit.normal
                };
                self.position = hit.point + away * SURFACE_OFFSET;
                self.velocity = outcome.velocity;
                return HitOutcome::Continue;
            }
        }

        self.state = TaskState::Penetrating;
        let result = calculate_exit_velocity(
            &penetrator,
            impact_velocity,
            hit.normal,
            trace.thickness,
            &material,
        );
        impact.exit_velocity = result.exit_velocity;
        impact.penetration_depth = result.depth;
        impact.energy_delta = result.energy_loss;

        if self.debug.contains(DebugFlags::PRINT_DEBUG_INFO) {
            info!(
                "{} hit {} ({:.1} cm) at {:.1}°: {:.0} -> {:.0} m/s, depth {:.2} cm, dE {:.1} J",
                self.id,
                material.name,
                trace.thickness,
                obliquity_degrees(impact_velocity, hit.normal),
                impact.impact_speed(),
                impact.exit_speed(),
                result.depth,
                result.energy_loss
            );
        }

        if !result.is_valid || !result.penetrated {
            self.state = TaskState::Stopped;
            if !result.is_valid {
                warn!("{}: could not resolve penetration into {}", self.id, material.name);
            }
            impact.exit_velocity = Vec3::ZERO;
            let direction = impact_velocity.normalize_or_zero();
            self.emit_hit(impact.clone(), injure, out);
            self.position = hit.point + direction * impact.penetration_depth;
            self.velocity = Vec3::ZERO;
            self.record_sample();
            self.finish(ExitCode::Stopped);
            return HitOutcome::Finished;
        }

        self.penetrations += 1;
        let mut exit = self.exit_impact(trace, &impact);
        exit.penetration_depth = trace.thickness;
        self.emit_hit(impact, injure, out);
        out.push(SimEvent::ExitHit(exit));
        self.velocity = result.exit_velocity;
        self.move_through(trace);
        HitOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::{FireTransform, LaunchParams};
    use crate::resources::BallisticsEnvironment;
    use crate::sim_data::presets;
    use crate::types::{CollisionFilter, SurfaceTags};
    use crate::world::{Slab, SlabWorld};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Fixture {
        world: SlabWorld,
        environment: BallisticsEnvironment,
        materials: MaterialRegistry,
        config: BallisticsConfig,
    }

    impl Fixture {
        fn new(world: SlabWorld) -> Self {
            Self {
                world,
                environment: BallisticsEnvironment::default(),
                materials: MaterialRegistry::with_presets(),
                config: BallisticsConfig::default(),
            }
        }

        fn ctx(&self) -> TaskContext<'_> {
            TaskContext {
                world: &self.world,
                environment: &self.environment,
                materials: &self.materials,
                config: &self.config,
            }
        }

        /// A 7.62 launch from `location` along `direction`.
        fn shot(location: Vec3, direction: Vec3) -> LaunchParams {
            let bullet = presets::rifle_762x51();
            LaunchParams::new(
                bullet.muzzle_velocity,
                bullet.effective_range,
                FireTransform::new(location, direction),
            )
        }

        /// Fires a 7.62 along +X from the origin and runs it to completion.
        fn run(&self, debug: DebugFlags) -> (TaskResult, Vec<SimEvent>) {
            self.run_with(Self::shot(Vec3::ZERO, Vec3::X), debug)
        }

        fn run_with(&self, params: LaunchParams, debug: DebugFlags) -> (TaskResult, Vec<SimEvent>) {
            let bullet = presets::rifle_762x51();
            let mut task = SimulationTask::new(LaunchPayload {
                id: ProjectileId(1),
                properties: bullet.into(),
                params,
                debug,
            });
            let ctx = self.ctx();
            let mut events = Vec::new();
            task.initialize(&ctx);
            while !task.is_finished() {
                task.step(self.config.fixed_step(), &ctx, &mut events);
            }
            (task.result(), events)
        }
    }

    fn plate(entity: u64, x: f32, thickness: f32, surface: SurfaceType) -> Slab {
        Slab::new(
            Entity::from_bits(entity),
            Vec3::new(x + thickness / 2.0, 0.0, 0.0),
            Vec3::new(thickness / 2.0, 500.0, 500.0),
            surface,
        )
    }

    /// Reports the same face of one drywall panel on every trace. The hit
    /// point moves by `drift` cm per call.
    struct RepeatingFace {
        drift: f32,
        calls: AtomicU32,
    }

    impl RepeatingFace {
        fn new(drift: f32) -> Self {
            Self {
                drift,
                calls: AtomicU32::new(0),
            }
        }
    }

    impl WorldQuery for RepeatingFace {
        fn trace(&self, start: Vec3, _end: Vec3, _ignore: &[Entity], _filter: CollisionFilter) -> Option<SurfaceTrace> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) as f32;
            let point = Vec3::new(100.0 + n * self.drift, 0.0, 0.0);
            Some(SurfaceTrace {
                hit: HitResult {
                    entity: Entity::from_bits(30),
                    point,
                    normal: Vec3::NEG_X,
                    distance: start.distance(point),
                    surface: SurfaceType::Drywall,
                    face_index: 0,
                    tags: SurfaceTags {
                        ignore_penetration: true,
                        ..Default::default()
                    },
                },
                exit_point: point + Vec3::X,
                thickness: 1.0,
            })
        }
    }

    fn step_against(world: &dyn WorldQuery, steps: usize) -> (SimulationTask, Vec<SimEvent>) {
        let fixture = Fixture::new(SlabWorld::default());
        let ctx = TaskContext { world, ..fixture.ctx() };
        let mut task = SimulationTask::new(LaunchPayload {
            id: ProjectileId(8),
            properties: presets::rifle_762x51().into(),
            params: Fixture::shot(Vec3::ZERO, Vec3::X),
            debug: DebugFlags::NONE,
        });
        let mut events = Vec::new();
        for _ in 0..steps {
            task.step(fixture.config.fixed_step(), &ctx, &mut events);
        }
        (task, events)
    }

    fn hits(events: &[SimEvent]) -> usize {
        events.iter().filter(|e| matches!(e, SimEvent::Hit(_))).count()
    }

    fn exits(events: &[SimEvent]) -> usize {
        events.iter().filter(|e| matches!(e, SimEvent::ExitHit(_))).count()
    }

    #[test]
    fn test_free_flight_ends_by_lifetime_or_range() {
        let fixture = Fixture::new(SlabWorld::default());
        let (result, events) = fixture.run(DebugFlags::NONE);
        assert!(events.is_empty());
        assert!(matches!(
            result.exit_code,
            ExitCode::LifetimeExceeded | ExitCode::OutOfRange
        ));
        assert!(result.path.len() > 2);
        assert!(result.final_location.x > 0.0);
    }

    #[test]
    fn test_thin_steel_is_penetrated() {
        let fixture = Fixture::new(SlabWorld::default().with_slab(plate(10, 1000.0, 1.0, SurfaceType::Steel)));
        let (result, events) = fixture.run(DebugFlags::NONE);
        assert_eq!(result.penetrations, 1);
        assert_eq!(hits(&events), 1);
        assert_eq!(exits(&events), 1);
        let Some(SimEvent::ExitHit(exit)) = events.iter().find(|e| matches!(e, SimEvent::ExitHit(_))) else {
            panic!("no exit event");
        };
        assert!(exit.exit_speed() > 0.0);
        assert!(exit.exit_speed() < exit.impact_speed());
    }

    #[test]
    fn test_thick_steel_stops() {
        let fixture = Fixture::new(SlabWorld::default().with_slab(plate(10, 1000.0, 50.0, SurfaceType::Steel)));
        let (result, events) = fixture.run(DebugFlags::NONE);
        assert_eq!(result.exit_code, ExitCode::Stopped);
        assert!(!result.is_killed());
        assert_eq!(hits(&events), 1);
        assert_eq!(exits(&events), 0);
        assert!(result.final_location.x >= 1000.0 && result.final_location.x <= 1050.0);
    }

    #[test]
    fn test_tag_policies() {
        let ignored = plate(10, 500.0, 10.0, SurfaceType::Concrete).with_tags(SurfaceTags {
            ignore: true,
            ..Default::default()
        });
        let passthrough = plate(11, 800.0, 10.0, SurfaceType::Concrete).with_tags(SurfaceTags {
            ignore_penetration: true,
            ..Default::default()
        });
        let wall = plate(12, 1200.0, 10.0, SurfaceType::Drywall).with_tags(SurfaceTags {
            impenetrable: true,
            ..Default::default()
        });
        let fixture = Fixture::new(
            SlabWorld::default()
                .with_slab(ignored)
                .with_slab(passthrough)
                .with_slab(wall),
        );
        let (result, events) = fixture.run(DebugFlags::NONE);
        assert_eq!(result.exit_code, ExitCode::EarlyTermination);
        assert!(result.is_killed());
        assert_eq!(hits(&events), 2);
        assert_eq!(exits(&events), 1);
        let Some(SimEvent::ExitHit(exit)) = events.iter().find(|e| matches!(e, SimEvent::ExitHit(_))) else {
            panic!("no exit event");
        };
        assert_eq!(exit.exit_velocity, exit.impact_velocity);
    }

    #[test]
    fn test_hit_zone_raises_injury() {
        let body = plate(20, 1000.0, 30.0, SurfaceType::Flesh).with_tags(SurfaceTags {
            hit_zone: true,
            ..Default::default()
        });
        let fixture = Fixture::new(SlabWorld::default().with_slab(body));
        let (_, events) = fixture.run(DebugFlags::NONE);
        let injury = events.iter().find_map(|e| match e {
            SimEvent::Injure(_, injury) => Some(*injury),
            _ => None,
        });
        let injury = injury.expect("flesh hit zone should injure");
        assert!(injury.energy_delta > 0.0);
        assert!(injury.wound.temporary_radius > 0.0);
    }

    #[test]
    fn test_updates_are_reported_when_requested() {
        let fixture = Fixture::new(SlabWorld::default());
        let (result, events) = fixture.run(DebugFlags::REPORT_UPDATES);
        let updates = events.iter().filter(|e| matches!(e, SimEvent::Update(..))).count();
        assert_eq!(updates as u32, result.iterations);
    }

    #[test]
    fn test_termination_request() {
        let fixture = Fixture::new(SlabWorld::default());
        let ctx = fixture.ctx();
        let mut task = SimulationTask::new(LaunchPayload {
            id: ProjectileId(5),
            properties: presets::pistol_9x19().into(),
            params: LaunchParams::new(360.0, 50.0, FireTransform::default()),
            debug: DebugFlags::NONE,
        });
        let mut events = Vec::new();
        task.step(fixture.config.fixed_step(), &ctx, &mut events);
        assert_eq!(task.state(), TaskState::Integrating);
        task.request_termination();
        task.step(fixture.config.fixed_step(), &ctx, &mut events);
        assert_eq!(task.state(), TaskState::Killed);
        assert_eq!(task.result().exit_code, ExitCode::Terminated);
        assert_eq!(task.result().iterations, 1);
    }

    #[test]
    fn test_invalid_properties_are_killed() {
        let fixture = Fixture::new(SlabWorld::default());
        let mut bullet = presets::pistol_9x19();
        bullet.mass = 0.0;
        let mut task = SimulationTask::new(LaunchPayload {
            id: ProjectileId(6),
            properties: bullet.into(),
            params: LaunchParams::new(360.0, 50.0, FireTransform::default()),
            debug: DebugFlags::NONE,
        });
        task.initialize(&fixture.ctx());
        assert_eq!(task.result().exit_code, ExitCode::InvalidProjectile);
    }

    #[test]
    fn test_iteration_limit() {
        let mut fixture = Fixture::new(SlabWorld::default());
        fixture.config.max_iterations = 3;
        let (result, _) = fixture.run(DebugFlags::NONE);
        assert_eq!(result.exit_code, ExitCode::IterationLimit);
        assert_eq!(result.iterations, 3);
    }

    #[test]
    fn test_impenetrable_surface_never_ricochets() {
        let armor = plate(40, 1000.0, 5.0, SurfaceType::Steel).with_tags(SurfaceTags {
            impenetrable: true,
            ..Default::default()
        });
        let fixture = Fixture::new(SlabWorld::default().with_slab(armor));
        // 85 degrees off the plate normal.
        let angle = 85.0_f32.to_radians();
        let params = Fixture::shot(Vec3::new(990.0, 0.0, 0.0), Vec3::new(angle.cos(), angle.sin(), 0.0));
        let (result, events) = fixture.run_with(params, DebugFlags::NONE);
        assert_eq!(result.exit_code, ExitCode::EarlyTermination);
        assert_eq!(result.ricochets, 0);
        assert_eq!(hits(&events), 1);
        let Some(SimEvent::Hit(hit)) = events.first() else {
            panic!("no hit event");
        };
        assert!(!hit.ricochet);
        assert_eq!(hit.exit_velocity, Vec3::ZERO);
    }

    #[test]
    fn test_untagged_flesh_is_a_hit_zone() {
        let flesh = plate(21, 1000.0, 30.0, SurfaceType::Flesh);
        let fixture = Fixture::new(SlabWorld::default().with_slab(flesh));
        let (_, events) = fixture.run(DebugFlags::NONE);
        assert!(events.iter().any(|e| matches!(e, SimEvent::Injure(..))));

        let corpse = plate(22, 1000.0, 30.0, SurfaceType::Flesh).with_tags(SurfaceTags {
            dead: true,
            ..Default::default()
        });
        let fixture = Fixture::new(SlabWorld::default().with_slab(corpse));
        let (_, events) = fixture.run(DebugFlags::NONE);
        assert!(hits(&events) > 0);
        assert!(!events.iter().any(|e| matches!(e, SimEvent::Injure(..))));
    }

    #[test]
    fn test_identical_repeat_hit_ends_early() {
        let world = RepeatingFace::new(0.0);
        let (task, events) = step_against(&world, 3);
        let result = task.result();
        assert_eq!(result.exit_code, ExitCode::EarlyTermination);
        assert_eq!(result.iterations, 2);
        assert_eq!(hits(&events), 1);
    }

    #[test]
    fn test_repeat_hit_on_same_face_is_skipped() {
        let world = RepeatingFace::new(5.0);
        let (task, events) = step_against(&world, 3);
        assert!(!task.is_finished());
        assert_eq!(hits(&events), 1);
        assert_eq!(exits(&events), 1);
    }

    #[test]
    fn test_owner_is_ignored_until_clear() {
        let owner = Entity::from_bits(50);
        let fixture = Fixture::new(SlabWorld::default().with_slab(plate(50, 3000.0, 1.0, SurfaceType::Steel)));
        let shot = Fixture::shot(Vec3::ZERO, Vec3::X).with_owner(owner);

        let (_, events) = fixture.run_with(shot.clone().with_owner_ignore_distance(100_000.0), DebugFlags::NONE);
        assert_eq!(hits(&events), 0);

        let (_, events) = fixture.run_with(shot.with_owner_ignore_distance(10.0), DebugFlags::NONE);
        assert_eq!(hits(&events), 1);
        let Some(SimEvent::Hit(hit)) = events.first() else {
            panic!("no hit event");
        };
        assert_eq!(hit.entity, owner);
    }
}
