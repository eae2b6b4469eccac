//! Weighted, sequential loading of a task list with lifecycle events.

use std::cell::Cell;

use crate::{
    cache::ResourceCache,
    event::EventDispatcher,
    resources::{ResourceKind, ResourceLoader},
};

/// Fired once before the first task starts. No payload.
pub const LOAD_START: &str = "LOAD_START";
/// Fired with the overall progress in `0..=100` as payload.
pub const LOAD_PROGRESS: &str = "LOAD_PROGRESS";
/// Fired once after every task finished, failed ones included. No payload.
pub const LOAD_END: &str = "LOAD_END";

/// One resource to load and its share of the overall progress.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadTask {
    pub kind: ResourceKind,
    pub url: String,
    /// Fraction in `[0, 1]`. Weights of a task list are expected to sum to 1.
    pub weight: f64,
}

impl LoadTask {
    pub fn new(kind: impl Into<ResourceKind>, url: impl Into<String>, weight: f64) -> Self {
        Self {
            kind: kind.into(),
            url: url.into(),
            weight,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
}

/// Runs its tasks one after another against a cache and reports through a
/// dispatcher.
#[derive(Debug)]
pub struct LoadOrchestrator {
    tasks: Vec<LoadTask>,
    state: Cell<LoadState>,
}

impl LoadOrchestrator {
    pub fn new(tasks: Vec<LoadTask>) -> Self {
        let total: f64 = tasks.iter().map(|task| task.weight).sum();
        if !tasks.is_empty() && (total - 1.0).abs() > 1e-6 {
            log::warn!("load task weights sum to {total}, not 1");
        }
        Self {
            tasks,
            state: Cell::new(LoadState::Idle),
        }
    }

    pub fn tasks(&self) -> &[LoadTask] {
        &self.tasks
    }

    pub fn state(&self) -> LoadState {
        self.state.get()
    }

    /// Load every task in order and emit `LOAD_START`, `LOAD_PROGRESS` and
    /// `LOAD_END` on `events`.
    ///
    /// Progress is `completed * 100 + fraction * weight * 100`, capped at 100.
    /// Only values above the last emitted one are sent, and 100 is sent once
    /// at the end if no task got there. A failed task still counts as
    /// completed. Does nothing unless the orchestrator is idle.
    pub async fn run<L, D>(&self, cache: &ResourceCache<L>, events: &EventDispatcher<D>)
    where
        L: ResourceLoader,
        D: From<f64> + Clone + 'static,
    {
        if self.state.get() != LoadState::Idle {
            log::debug!("load requested while {:?}, ignored", self.state.get());
            return;
        }
        self.state.set(LoadState::Loading);
        events.trigger(LOAD_START, None);

        let mut last = 0.0_f64;
        let mut completed = 0.0_f64;
        for task in &self.tasks {
            log::debug!("loading {} {} (weight {})", task.kind, task.url, task.weight);
            let mut on_progress = |fraction: f64| {
                let value = (completed * 100.0 + fraction * task.weight * 100.0).min(100.0);
                if value > last {
                    last = value;
                    events.trigger(LOAD_PROGRESS, Some(D::from(value)));
                }
            };
            cache
                .load_res(task.kind.clone(), &task.url, Some(&mut on_progress))
                .await;
            completed += task.weight;
        }
        if last < 100.0 {
            events.trigger(LOAD_PROGRESS, Some(D::from(100.0)));
        }

        self.state.set(LoadState::Loaded);
        events.trigger(LOAD_END, None);
    }
}
