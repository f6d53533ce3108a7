//! Typed callback registration.
//!
//! Callbacks are bound per record when it is added and are only ever invoked
//! from [`Registry::tick`](crate::registry::Registry::tick) on the owning
//! thread. They never travel to the worker.

use std::fmt;
use std::sync::Arc;

use crate::events::{ImpactParams, InjuryParams, PathSample, TaskResult};
use crate::types::ProjectileId;

/// Receives the events of the records it is bound to.
///
/// Every method has an empty default, so implementors only override what
/// they need.
pub trait SimObserver: Send + Sync {
    fn on_hit(&self, _impact: &ImpactParams) {}

    fn on_exit_hit(&self, _impact: &ImpactParams) {}

    fn on_injure(&self, _impact: &ImpactParams, _injury: &InjuryParams) {}

    /// Called once per integration step when the launch requested updates.
    fn on_update(&self, _id: ProjectileId, _sample: &PathSample) {}

    fn on_complete(&self, _id: ProjectileId, _path: &[PathSample]) {}
}

/// Game-mode hook receiving every hit of every record, typically to apply
/// damage on an authoritative server.
pub trait ImpactHook: Send + Sync {
    fn on_hit(&self, _impact: &ImpactParams) {}

    fn on_exit_hit(&self, _impact: &ImpactParams) {}

    fn on_injure(&self, _impact: &ImpactParams, _injury: &InjuryParams) {}
}

type HitFn = Arc<dyn Fn(&ImpactParams) + Send + Sync>;
type InjureFn = Arc<dyn Fn(&ImpactParams, &InjuryParams) + Send + Sync>;
type UpdateFn = Arc<dyn Fn(ProjectileId, &PathSample) + Send + Sync>;
type CompleteFn = Arc<dyn Fn(ProjectileId, &[PathSample]) + Send + Sync>;

/// The callbacks bound to one record.
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
/// use bevy_terminal_ballistics::observer::SimCallbacks;
///
/// let hits = Arc::new(AtomicU32::new(0));
/// let counter = hits.clone();
/// let callbacks = SimCallbacks::default().on_hit(move |_| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
/// assert!(callbacks.is_bound());
/// ```
#[derive(Clone, Default)]
pub struct SimCallbacks {
    hit: Option<HitFn>,
    exit_hit: Option<HitFn>,
    injure: Option<InjureFn>,
    update: Option<UpdateFn>,
    complete: Option<CompleteFn>,
    observers: Vec<Arc<dyn SimObserver>>,
}

impl SimCallbacks {
    pub fn on_hit(mut self, f: impl Fn(&ImpactParams) + Send + Sync + 'static) -> Self {
        self.hit = Some(Arc::new(f));
        self
    }

    pub fn on_exit_hit(mut self, f: impl Fn(&ImpactParams) + Send + Sync + 'static) -> Self {
        self.exit_hit = Some(Arc::new(f));
        self
    }

    pub fn on_injure(
        mut self,
        f: impl Fn(&ImpactParams, &InjuryParams) + Send + Sync + 'static,
    ) -> Self {
        self.injure = Some(Arc::new(f));
        self
    }

    pub fn on_update(mut self, f: impl Fn(ProjectileId, &PathSample) + Send + Sync + 'static) -> Self {
        self.update = Some(Arc::new(f));
        self
    }

    pub fn on_complete(
        mut self,
        f: impl Fn(ProjectileId, &[PathSample]) + Send + Sync + 'static,
    ) -> Self {
        self.complete = Some(Arc::new(f));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SimObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// At least one callback or observer is bound.
    pub fn is_bound(&self) -> bool {
        self.hit.is_some()
            || self.exit_hit.is_some()
            || self.injure.is_some()
            || self.update.is_some()
            || self.complete.is_some()
            || !self.observers.is_empty()
    }

    pub(crate) fn dispatch_hit(&self, impact: &ImpactParams) {
        if let Some(f) = &self.hit {
            f(impact);
        }
        for observer in &self.observers {
            observer.on_hit(impact);
        }
    }

    pub(crate) fn dispatch_exit_hit(&self, impact: &ImpactParams) {
        if let Some(f) = &self.exit_hit {
            f(impact);
        }
        for observer in &self.observers {
            observer.on_exit_hit(impact);
        }
    }

    pub(crate) fn dispatch_injure(&self, impact: &ImpactParams, injury: &InjuryParams) {
        if let Some(f) = &self.injure {
            f(impact, injury);
        }
        for observer in &self.observers {
            observer.on_injure(impact, injury);
        }
    }

    pub(crate) fn dispatch_update(&self, id: ProjectileId, sample: &PathSample) {
        if let Some(f) = &self.update {
            f(id, sample);
        }
        for observer in &self.observers {
            observer.on_update(id, sample);
        }
    }

    pub(crate) fn dispatch_complete(&self, result: &TaskResult) {
        if let Some(f) = &self.complete {
            f(result.id, &result.path);
        }
        for observer in &self.observers {
            observer.on_complete(result.id, &result.path);
        }
    }
}

impl fmt::Debug for SimCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimCallbacks")
            .field("hit", &self.hit.is_some())
            .field("exit_hit", &self.exit_hit.is_some())
            .field("injure", &self.injure.is_some())
            .field("update", &self.update.is_some())
            .field("complete", &self.complete.is_some())
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ExitCode;
    use crate::sim_data::SimKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Counter {
        completes: AtomicU32,
    }

    impl SimObserver for Counter {
        fn on_complete(&self, _id: ProjectileId, _path: &[PathSample]) {
            self.completes.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_closure_and_observer_both_fire() {
        let observer = Arc::new(Counter::default());
        let closure_calls = Arc::new(AtomicU32::new(0));
        let calls = closure_calls.clone();
        let callbacks = SimCallbacks::default()
            .on_complete(move |_, _| {
                calls.fetch_add(1, Ordering::Relaxed);
            })
            .with_observer(observer.clone());

        let result = TaskResult::empty(ProjectileId(1), SimKind::Bullet, ExitCode::Stopped);
        callbacks.dispatch_complete(&result);

        assert_eq!(closure_calls.load(Ordering::Relaxed), 1);
        assert_eq!(observer.completes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unbound_callbacks() {
        assert!(!SimCallbacks::default().is_bound());
    }
}
