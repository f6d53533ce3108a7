//! Gizmo drawing of finished flight paths.
//!
//! Only simulations launched with `DRAW_PATH` or `DRAW_IMPACTS` are kept.
//! Each stays on screen for [`DebugDrawings::lifetime`] seconds.

use bevy::ecs::message::MessageReader;
use bevy::prelude::*;

use crate::events::{ProjectileComplete, TaskResult};
use crate::types::DebugFlags;

/// Completed simulations kept on screen for inspection.
///
/// # Fields
/// * `lifetime` - Seconds a finished path stays visible
/// * `max_paths` - Oldest paths are dropped beyond this count
#[derive(Resource, Debug)]
pub struct DebugDrawings {
    pub lifetime: f32,
    pub max_paths: usize,
    entries: Vec<(f32, TaskResult)>,
}

impl Default for DebugDrawings {
    fn default() -> Self {
        Self {
            lifetime: 5.0,
            max_paths: 128,
            entries: Vec::new(),
        }
    }
}

impl DebugDrawings {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, now: f32, result: TaskResult) {
        self.entries.push((now, result));
        if self.entries.len() > self.max_paths {
            let excess = self.entries.len() - self.max_paths;
            self.entries.drain(..excess);
        }
    }

    fn expire(&mut self, now: f32) {
        let lifetime = self.lifetime;
        self.entries.retain(|(born, _)| now - *born <= lifetime);
    }
}

/// Collects finished simulations that asked to be drawn.
pub fn collect_debug_paths(
    time: Res<Time>,
    mut drawings: ResMut<DebugDrawings>,
    mut completed: MessageReader<ProjectileComplete>,
) {
    let now = time.elapsed_secs();
    for ProjectileComplete(result) in completed.read() {
        if result
            .debug
            .intersects(DebugFlags::DRAW_PATH | DebugFlags::DRAW_IMPACTS)
        {
            drawings.push(now, result.clone());
        }
    }
    drawings.expire(now);
}

/// Draws flight paths and impact points with gizmos.
pub fn draw_ballistics_debug(mut gizmos: Gizmos, drawings: Res<DebugDrawings>) {
    for (_, result) in &drawings.entries {
        if result.debug.contains(DebugFlags::DRAW_PATH) {
            let color = if result.is_killed() {
                Color::srgb(1.0, 0.3, 0.0)
            } else {
                Color::srgb(0.0, 1.0, 0.0)
            };
            gizmos.linestrip(result.path.iter().map(|sample| sample.location), color);
        }
        if result.debug.contains(DebugFlags::DRAW_IMPACTS) {
            for impact in &result.impacts {
                gizmos.sphere(*impact, 2.0, Color::srgb(1.0, 0.0, 0.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ExitCode;
    use crate::sim_data::SimKind;
    use crate::types::ProjectileId;

    fn result(id: u64) -> TaskResult {
        let mut result = TaskResult::empty(ProjectileId(id), SimKind::Bullet, ExitCode::Stopped);
        result.debug = DebugFlags::DRAW_PATH;
        result
    }

    #[test]
    fn test_paths_expire_and_are_capped() {
        let mut drawings = DebugDrawings {
            max_paths: 2,
            ..Default::default()
        };
        drawings.push(0.0, result(1));
        drawings.push(1.0, result(2));
        drawings.push(2.0, result(3));
        assert_eq!(drawings.len(), 2);
        assert_eq!(drawings.entries[0].1.id, ProjectileId(2));

        drawings.expire(6.5);
        assert_eq!(drawings.len(), 1);
        drawings.expire(100.0);
        assert!(drawings.is_empty());
    }
}
