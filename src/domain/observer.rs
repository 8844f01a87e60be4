//! Cascade observers
//!
//! Optional hooks the resolver notifies once per recomputed task. Nothing in
//! the engine depends on an observer being present.

use chrono::NaiveDate;
use log::debug;
use std::cell::Cell;

use super::cascade::Zone;
use super::id::TaskId;

/// A task whose date was recomputed during a cascade pass
#[derive(Debug, Clone)]
pub struct RecomputeEvent<'a> {
    pub task: TaskId,
    pub current_start: NaiveDate,
    pub required_start: NaiveDate,
    pub zone: Zone,
    /// Predecessors that moved in this pass
    pub driven_by: &'a [TaskId],
}

pub trait CascadeObserver {
    fn on_recompute(&self, event: &RecomputeEvent<'_>);
}

/// Writes each recompute to the debug log
#[derive(Debug, Default)]
pub struct LogObserver;

impl CascadeObserver for LogObserver {
    fn on_recompute(&self, event: &RecomputeEvent<'_>) {
        debug!(
            "recompute task {}: {} -> {} ({:?}, via {:?})",
            event.task, event.current_start, event.required_start, event.zone, event.driven_by
        );
    }
}

/// Counts recomputes by outcome
#[derive(Debug, Default)]
pub struct CascadeStats {
    recomputes: Cell<usize>,
    lock_hits: Cell<usize>,
    breaks: Cell<usize>,
}

impl CascadeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks recomputed, whatever their zone
    pub fn recomputes(&self) -> usize {
        self.recomputes.get()
    }

    /// Recomputes that ran into a lock
    pub fn lock_hits(&self) -> usize {
        self.lock_hits.get()
    }

    pub fn breaks(&self) -> usize {
        self.breaks.get()
    }
}

impl CascadeObserver for CascadeStats {
    fn on_recompute(&self, event: &RecomputeEvent<'_>) {
        self.recomputes.set(self.recomputes.get() + 1);
        match event.zone {
            Zone::Locked => self.lock_hits.set(self.lock_hits.get() + 1),
            Zone::Break => self.breaks.set(self.breaks.get() + 1),
            Zone::Cascade => {}
        }
    }
}
