//! World collision backends.
//!
//! The worker never touches the ECS; it traces against an immutable
//! [`WorldQuery`] snapshot. [`SlabWorld`] is a self-contained backend made of
//! oriented boxes, useful for tests, tools, and headless servers. With the
//! `avian` feature, [`avian::AvianWorld`] snapshots avian3d colliders.
//!
//! All positions are in world units (cm).

use bevy::prelude::*;

use crate::materials::SurfaceType;
use crate::types::{CollisionFilter, HitResult, SurfaceTags, SurfaceTrace, WorldQuery};

/// Marks an entity as a ballistic surface.
///
/// # Example
/// ```
/// use bevy_terminal_ballistics::materials::SurfaceType;
/// use bevy_terminal_ballistics::world::BallisticSurface;
///
/// let armor = BallisticSurface::new(SurfaceType::HardenedSteel);
/// assert_eq!(armor.surface, SurfaceType::HardenedSteel);
/// ```
#[derive(Component, Reflect, Clone, Copy, Debug, PartialEq)]
#[reflect(Component)]
pub struct BallisticSurface {
    pub surface: SurfaceType,
    pub tags: SurfaceTags,
    /// Collision layers this surface belongs to.
    pub layers: u32,
}

impl Default for BallisticSurface {
    fn default() -> Self {
        Self::new(SurfaceType::Concrete)
    }
}

impl BallisticSurface {
    pub fn new(surface: SurfaceType) -> Self {
        Self {
            surface,
            tags: SurfaceTags::default(),
            layers: u32::MAX,
        }
    }

    pub fn with_tags(mut self, tags: SurfaceTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers;
        self
    }
}

/// An oriented box of a single material.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Slab {
    pub entity: Entity,
    pub center: Vec3,
    pub half_extents: Vec3,
    pub rotation: Quat,
    pub surface: BallisticSurface,
}

impl Slab {
    pub fn new(entity: Entity, center: Vec3, half_extents: Vec3, surface: SurfaceType) -> Self {
        Self {
            entity,
            center,
            half_extents: half_extents.abs(),
            rotation: Quat::IDENTITY,
            surface: BallisticSurface::new(surface),
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation.normalize();
        self
    }

    pub fn with_tags(mut self, tags: SurfaceTags) -> Self {
        self.surface.tags = tags;
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.surface.layers = layers;
        self
    }

    fn contains_local(&self, local: Vec3) -> bool {
        local.abs().cmple(self.half_extents).all()
    }

    /// Slab test in box space. Returns `(t_enter, t_exit, entry axis, entry
    /// sign)` along `start + t (end - start)`, with the exit unbounded past
    /// `end`.
    fn intersect(&self, start: Vec3, end: Vec3) -> Option<(f32, f32, usize, f32)> {
        let inverse = self.rotation.inverse();
        let origin = inverse * (start - self.center);
        if self.contains_local(origin) {
            return None;
        }
        let delta = inverse * (end - start);

        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut axis = 0;
        let mut sign = 1.0;
        for i in 0..3 {
            let (o, d, h) = (origin[i], delta[i], self.half_extents[i]);
            if d.abs() <= f32::EPSILON {
                if o.abs() > h {
                    return None;
                }
                continue;
            }
            let t0 = (-h - o) / d;
            let t1 = (h - o) / d;
            let (near, far) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
            if near > t_enter {
                t_enter = near;
                axis = i;
                sign = -d.signum();
            }
            t_exit = t_exit.min(far);
        }

        if t_enter > t_exit || !(0.0..=1.0).contains(&t_enter) {
            return None;
        }
        Some((t_enter, t_exit, axis, sign))
    }

    fn trace(&self, start: Vec3, end: Vec3) -> Option<SurfaceTrace> {
        let (t_enter, t_exit, axis, sign) = self.intersect(start, end)?;
        let delta = end - start;
        let mut local_normal = Vec3::ZERO;
        local_normal[axis] = sign;

        let point = start + delta * t_enter;
        let exit_point = start + delta * t_exit;
        Some(SurfaceTrace {
            hit: HitResult {
                entity: self.entity,
                point,
                normal: self.rotation * local_normal,
                distance: delta.length() * t_enter,
                surface: self.surface.surface,
                face_index: (axis * 2 + usize::from(sign > 0.0)) as u32,
                tags: self.surface.tags,
            },
            exit_point,
            thickness: point.distance(exit_point),
        })
    }
}

/// A world made of oriented boxes.
///
/// Traces that start inside a box ignore that box, so a body leaving a
/// surface is never re-hit by it.
///
/// # Example
/// ```
/// use bevy::prelude::*;
/// use bevy_terminal_ballistics::materials::SurfaceType;
/// use bevy_terminal_ballistics::types::{CollisionFilter, WorldQuery};
/// use bevy_terminal_ballistics::world::{Slab, SlabWorld};
///
/// let plate = Slab::new(
///     Entity::from_bits(7),
///     Vec3::new(100.5, 0.0, 0.0),
///     Vec3::new(0.5, 50.0, 50.0),
///     SurfaceType::Steel,
/// );
/// let world = SlabWorld::default().with_slab(plate);
/// let trace = world
///     .trace(Vec3::ZERO, Vec3::X * 200.0, &[], CollisionFilter::ALL)
///     .unwrap();
/// assert!((trace.thickness - 1.0).abs() < 1e-3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SlabWorld {
    slabs: Vec<Slab>,
}

impl SlabWorld {
    pub fn new(slabs: Vec<Slab>) -> Self {
        Self { slabs }
    }

    pub fn with_slab(mut self, slab: Slab) -> Self {
        self.slabs.push(slab);
        self
    }

    pub fn push(&mut self, slab: Slab) {
        self.slabs.push(slab);
    }

    pub fn len(&self) -> usize {
        self.slabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slabs.is_empty()
    }

    pub fn slabs(&self) -> &[Slab] {
        &self.slabs
    }
}

impl WorldQuery for SlabWorld {
    fn trace(
        &self,
        start: Vec3,
        end: Vec3,
        ignore: &[Entity],
        filter: CollisionFilter,
    ) -> Option<SurfaceTrace> {
        if start == end {
            return None;
        }
        self.slabs
            .iter()
            .filter(|slab| !ignore.contains(&slab.entity) && filter.matches(slab.surface.layers))
            .filter_map(|slab| slab.trace(start, end))
            .min_by(|a, b| a.hit.distance.total_cmp(&b.hit.distance))
    }
}

/// avian3d colliders as a ballistic world.
#[cfg(feature = "avian")]
pub mod avian {
    use std::sync::Arc;

    use avian3d::prelude::*;
    use bevy::prelude::*;

    use super::BallisticSurface;
    use crate::types::{CollisionFilter, HitResult, SurfaceTrace, WorldQuery};

    /// Offset (cm) used to start the exit cast just inside the struck shape.
    const INSIDE_OFFSET: f32 = 1.0e-3;

    /// Longest exit search (cm); thicker objects are reported at this length.
    pub const MAX_THICKNESS: f32 = 10_000.0;

    struct Shape {
        entity: Entity,
        collider: Collider,
        position: Position,
        rotation: Rotation,
        surface: BallisticSurface,
    }

    /// Immutable copy of the tagged colliders of a scene, in cm.
    #[derive(Default)]
    pub struct AvianWorld {
        shapes: Vec<Shape>,
    }

    impl AvianWorld {
        pub fn snapshot<'a>(
            colliders: impl IntoIterator<
                Item = (Entity, &'a Collider, &'a Position, &'a Rotation, &'a BallisticSurface),
            >,
        ) -> Self {
            let shapes = colliders
                .into_iter()
                .map(|(entity, collider, position, rotation, surface)| Shape {
                    entity,
                    collider: collider.clone(),
                    position: *position,
                    rotation: *rotation,
                    surface: *surface,
                })
                .collect();
            Self { shapes }
        }

        pub fn len(&self) -> usize {
            self.shapes.len()
        }

        pub fn is_empty(&self) -> bool {
            self.shapes.is_empty()
        }
    }

    /// Hands the worker a fresh snapshot whenever a tagged collider moves,
    /// changes, or disappears.
    pub fn sync_avian_world(
        registry: Res<crate::registry::Registry>,
        surfaces: Query<(Entity, &Collider, &Position, &Rotation, &BallisticSurface)>,
        changed: Query<
            (),
            (
                With<BallisticSurface>,
                Or<(
                    Changed<Collider>,
                    Changed<Position>,
                    Changed<Rotation>,
                    Changed<BallisticSurface>,
                )>,
            ),
        >,
        mut removed: RemovedComponents<BallisticSurface>,
    ) {
        let removed_any = removed.read().count() > 0;
        if changed.is_empty() && !removed_any {
            return;
        }
        registry.set_world(Arc::new(AvianWorld::snapshot(surfaces.iter())));
    }

    impl WorldQuery for AvianWorld {
        fn trace(
            &self,
            start: Vec3,
            end: Vec3,
            ignore: &[Entity],
            filter: CollisionFilter,
        ) -> Option<SurfaceTrace> {
            let delta = end - start;
            let length = delta.length();
            if length <= f32::EPSILON {
                return None;
            }
            let direction = delta / length;

            let (shape, distance, normal) = self
                .shapes
                .iter()
                .filter(|s| !ignore.contains(&s.entity) && filter.matches(s.surface.layers))
                .filter_map(|s| {
                    s.collider
                        .cast_ray(s.position.0, s.rotation, start, direction, length, false)
                        .map(|(distance, normal)| (s, distance, normal))
                })
                .min_by(|a, b| a.1.total_cmp(&b.1))?;

            let point = start + direction * distance;
            let inside = point + direction * INSIDE_OFFSET;
            let thickness = shape
                .collider
                .cast_ray(shape.position.0, shape.rotation, inside, direction, MAX_THICKNESS, false)
                .map_or(MAX_THICKNESS, |(d, _)| d + INSIDE_OFFSET);

            let normal = if normal.dot(direction) > 0.0 { -normal } else { normal };
            Some(SurfaceTrace {
                hit: HitResult {
                    entity: shape.entity,
                    point,
                    normal: normal.normalize_or_zero(),
                    distance,
                    surface: shape.surface.surface,
                    face_index: 0,
                    tags: shape.surface.tags,
                },
                exit_point: point + direction * thickness,
                thickness,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate(entity: u64, x: f32) -> Slab {
        Slab::new(
            Entity::from_bits(entity),
            Vec3::new(x, 0.0, 0.0),
            Vec3::new(1.0, 10.0, 10.0),
            SurfaceType::Steel,
        )
    }

    #[test]
    fn test_nearest_slab_wins() {
        let world = SlabWorld::default().with_slab(plate(2, 50.0)).with_slab(plate(1, 20.0));
        let trace = world
            .trace(Vec3::ZERO, Vec3::X * 100.0, &[], CollisionFilter::ALL)
            .unwrap();
        assert_eq!(trace.hit.entity, Entity::from_bits(1));
        assert!((trace.hit.point.x - 19.0).abs() < 1e-4);
        assert!((trace.exit_point.x - 21.0).abs() < 1e-4);
        assert!((trace.thickness - 2.0).abs() < 1e-4);
        assert_eq!(trace.hit.normal, Vec3::NEG_X);
    }

    #[test]
    fn test_exit_is_found_past_trace_end() {
        let world = SlabWorld::default().with_slab(plate(1, 20.0));
        let trace = world
            .trace(Vec3::ZERO, Vec3::X * 19.5, &[], CollisionFilter::ALL)
            .unwrap();
        assert!((trace.thickness - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_short_trace_misses() {
        let world = SlabWorld::default().with_slab(plate(1, 20.0));
        assert!(world.trace(Vec3::ZERO, Vec3::X * 10.0, &[], CollisionFilter::ALL).is_none());
    }

    #[test]
    fn test_ignore_and_filter() {
        let world = SlabWorld::default().with_slab(plate(1, 20.0).with_layers(0b10));
        let end = Vec3::X * 100.0;
        assert!(world.trace(Vec3::ZERO, end, &[Entity::from_bits(1)], CollisionFilter::ALL).is_none());
        assert!(world.trace(Vec3::ZERO, end, &[], CollisionFilter::new(0b01)).is_none());
        assert!(world.trace(Vec3::ZERO, end, &[], CollisionFilter::new(0b10)).is_some());
    }

    #[test]
    fn test_trace_starting_inside_skips_the_slab() {
        let world = SlabWorld::default().with_slab(plate(1, 20.0));
        assert!(world
            .trace(Vec3::new(20.0, 0.0, 0.0), Vec3::X * 100.0, &[], CollisionFilter::ALL)
            .is_none());
    }

    #[test]
    fn test_rotated_slab_is_thicker_along_the_path() {
        let slab = plate(1, 20.0).with_rotation(Quat::from_rotation_y(45f32.to_radians()));
        let world = SlabWorld::default().with_slab(slab);
        let trace = world
            .trace(Vec3::ZERO, Vec3::X * 100.0, &[], CollisionFilter::ALL)
            .unwrap();
        assert!((trace.thickness - 2.0 * 2f32.sqrt()).abs() < 1e-3);
        assert!(trace.hit.normal.dot(Vec3::X) < 0.0);
    }

    #[test]
    fn test_faces_are_distinct() {
        let world = SlabWorld::default().with_slab(plate(1, 20.0));
        let front = world
            .trace(Vec3::ZERO, Vec3::X * 100.0, &[], CollisionFilter::ALL)
            .unwrap();
        let back = world
            .trace(Vec3::X * 40.0, Vec3::ZERO, &[], CollisionFilter::ALL)
            .unwrap();
        assert!(!front.hit.same_face(&back.hit));
        assert_eq!(back.hit.normal, Vec3::X);
    }
}
