//! Scheduling engine
//!
//! `Scheduler` owns one session's graph and calendar and exposes the
//! preview, review and commit operations. Previews never mutate. A commit
//! writes every update through a `ScheduleWriter` in one call and only then
//! applies it to the in-memory graph, so a failed write leaves both sides in
//! their pre-commit state.

use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use thiserror::Error;

use super::calendar::Calendar;
use super::cascade::{
    CascadeError, CascadeOptions, CascadePlan, CascadeResolver, Decision, Trigger, Zone,
};
use super::conflict::{find_conflicts, Conflict};
use super::graph::{DependencyGraph, DependencyLink, GraphError};
use super::id::{SnapshotId, TaskId};
use super::lock::LockPolicy;
use super::observer::CascadeObserver;
use super::task::LockFlags;
use super::zone::{review, ReviewError, ZoneBoard};

/// Fields a commit writes for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    pub start_date: NaiveDate,
    pub duration: u32,
    pub manually_positioned: bool,
    /// Lock facts after the commit; an unlocked task loses its confirmations
    pub locks: LockFlags,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Stored schedule no longer matches snapshot {0}")]
    Stale(SnapshotId),

    #[error("{0}")]
    Failed(String),
}

/// Persists committed updates, all of them or none
pub trait ScheduleWriter {
    /// Writes the updates if the stored schedule still matches `snapshot`
    fn write_updates(&mut self, snapshot: &SnapshotId, updates: &[TaskUpdate]) -> Result<(), WriteError>;
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Cascade would move tasks with locked successors ({}); break them or unlock the successors first", describe(.0))]
    LockedTaskConflict(Vec<Conflict>),

    #[error("Schedule changed since plan {0} was computed; preview again")]
    StaleSnapshot(SnapshotId),

    #[error("Failed to write schedule: {0}")]
    Store(String),
}

fn describe(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| {
            let locked: Vec<String> = c.locked_descendants.iter().map(|t| t.to_string()).collect();
            format!("{} -> {}", c.task, locked.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Session-wide cascade behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Recompute manually positioned tasks in every cascade
    pub override_pinned: bool,
    /// Pin a moved task that has predecessors, so later cascades leave it
    pub pin_moved_task: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            override_pinned: false,
            pin_moved_task: true,
        }
    }
}

/// One scheduling session over a graph snapshot and a calendar
pub struct Scheduler {
    graph: DependencyGraph,
    calendar: Calendar,
    policy: LockPolicy,
    settings: SchedulerSettings,
    observers: Vec<Box<dyn CascadeObserver>>,
}

impl Scheduler {
    pub fn new(graph: DependencyGraph, calendar: Calendar) -> Self {
        Self {
            graph,
            calendar,
            policy: LockPolicy::new(),
            settings: SchedulerSettings::default(),
            observers: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: SchedulerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn add_observer(&mut self, observer: Box<dyn CascadeObserver>) {
        self.observers.push(observer);
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.settings
    }

    /// Adds a dependency link; rejected links leave the graph unchanged
    pub fn add_link(&mut self, link: DependencyLink) -> Result<(), GraphError> {
        self.graph.add_link(link)
    }

    fn resolver(&self) -> CascadeResolver<'_> {
        self.observers.iter().fold(
            CascadeResolver::new(&self.graph, &self.calendar).with_policy(self.policy),
            |resolver, observer| resolver.observe(observer.as_ref()),
        )
    }

    fn default_options(&self) -> CascadeOptions {
        CascadeOptions::new().override_pinned(self.settings.override_pinned)
    }

    /// Resolves any trigger under explicit options
    pub fn preview(&self, trigger: Trigger, options: &CascadeOptions) -> Result<CascadePlan, CascadeError> {
        self.resolver().resolve_trigger(trigger, options)
    }

    /// Plan for moving a task to a new start date
    pub fn preview_cascade(&self, task: TaskId, new_start: NaiveDate) -> Result<CascadePlan, CascadeError> {
        self.preview(Trigger::Move { task, new_start }, &self.default_options())
    }

    /// Plan for changing a task's duration
    pub fn preview_resize(&self, task: TaskId, new_duration: u32) -> Result<CascadePlan, CascadeError> {
        self.preview(
            Trigger::Resize { task, new_duration },
            &self.default_options(),
        )
    }

    /// Plan for a task whose last lock was just cleared
    ///
    /// The task snaps back to the date its predecessors compute, and the
    /// change cascades like a move. A pinned task is refused: only
    /// [`Scheduler::unpin_and_recompute`] lifts a pin.
    pub fn unlock_and_recompute(&self, task: TaskId) -> Result<CascadePlan, CascadeError> {
        self.preview(Trigger::Unlock { task }, &self.default_options())
    }

    /// Plan for lifting a task's pin; committing it clears the pin
    pub fn unpin_and_recompute(&self, task: TaskId) -> Result<CascadePlan, CascadeError> {
        self.preview(Trigger::Unpin { task }, &self.default_options())
    }

    /// Applies reviewer decisions and re-resolves the plan's trigger
    pub fn review(
        &self,
        plan: &CascadePlan,
        decisions: impl IntoIterator<Item = (TaskId, Decision)>,
    ) -> Result<CascadePlan, ReviewError> {
        let options = review(plan, decisions)?;
        Ok(self.preview(plan.trigger, &options)?)
    }

    pub fn board(&self, plan: &CascadePlan) -> ZoneBoard {
        ZoneBoard::classify(plan, &self.graph)
    }

    pub fn conflicts(&self, plan: &CascadePlan) -> Vec<Conflict> {
        find_conflicts(plan, &self.graph)
    }

    /// Updates a commit of `plan` would write, root first
    pub fn updates_for(&self, plan: &CascadePlan) -> Vec<TaskUpdate> {
        let mut updates = Vec::new();
        let root_id = plan.root.task_id;

        if let Some(root) = self.graph.task(&root_id) {
            let pinned = match plan.trigger {
                Trigger::Unpin { .. } => Some(false),
                _ if plan.root.is_unchanged() => None,
                Trigger::Unlock { .. } => Some(root.manually_positioned),
                _ if self.settings.pin_moved_task && !root.predecessors.is_empty() => Some(true),
                _ => Some(root.manually_positioned),
            };

            if let Some(manually_positioned) = pinned {
                updates.push(TaskUpdate {
                    task_id: root_id,
                    start_date: plan.root.new_start,
                    duration: plan.root.new_duration,
                    manually_positioned,
                    locks: root.locks,
                });
            }
        }

        for entry in plan.entries_in(Zone::Cascade) {
            let Some(task) = self.graph.task(&entry.task_id) else {
                continue;
            };
            let locks = match plan.options.decisions.get(&entry.task_id) {
                Some(Decision::Unlock) => task.locks.unlocked(),
                _ => task.locks,
            };
            updates.push(TaskUpdate {
                task_id: entry.task_id,
                start_date: entry.proposed_start,
                duration: entry.duration,
                manually_positioned: false,
                locks,
            });
        }

        updates
    }

    /// Commits a plan: all updates are written, or none
    ///
    /// Refused while conflicts remain or when the schedule has changed since
    /// the plan was computed. Returns the IDs of the tasks written.
    pub fn commit(
        &mut self,
        plan: &CascadePlan,
        writer: &mut dyn ScheduleWriter,
    ) -> Result<Vec<TaskId>, CommitError> {
        let conflicts = self.conflicts(plan);
        if !conflicts.is_empty() {
            return Err(CommitError::LockedTaskConflict(conflicts));
        }

        if self.graph.snapshot_id() != plan.snapshot {
            return Err(CommitError::StaleSnapshot(plan.snapshot.clone()));
        }

        let updates = self.updates_for(plan);
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        writer
            .write_updates(&plan.snapshot, &updates)
            .map_err(|e| match e {
                WriteError::Stale(snapshot) => CommitError::StaleSnapshot(snapshot),
                WriteError::Failed(msg) => CommitError::Store(msg),
            })?;

        for update in &updates {
            if let Some(task) = self.graph.task_mut(&update.task_id) {
                task.start_date = update.start_date;
                task.duration = update.duration;
                task.manually_positioned = update.manually_positioned;
                task.locks = update.locks;
            }
        }

        info!(
            "Committed cascade from task {}: {} task(s) updated",
            plan.root.task_id,
            updates.len()
        );

        Ok(updates.iter().map(|u| u.task_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::observer::{CascadeStats, RecomputeEvent};
    use crate::domain::task::{LinkKind, LockFlag, Task};
    use std::collections::BTreeSet;
    use std::rc::Rc;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn id(n: u32) -> TaskId {
        TaskId::new(n).unwrap()
    }

    /// Records writes; optionally fails them
    #[derive(Default)]
    struct MemoryWriter {
        written: Vec<TaskUpdate>,
        fail: Option<&'static str>,
        stale: bool,
    }

    impl ScheduleWriter for MemoryWriter {
        fn write_updates(&mut self, snapshot: &SnapshotId, updates: &[TaskUpdate]) -> Result<(), WriteError> {
            if self.stale {
                return Err(WriteError::Stale(snapshot.clone()));
            }
            if let Some(msg) = self.fail {
                return Err(WriteError::Failed(msg.to_string()));
            }
            self.written.extend_from_slice(updates);
            Ok(())
        }
    }

    /// A(3) -FS-> B(2) -FS+2-> C(confirmed)
    fn scenario() -> Scheduler {
        let a = Task::new(id(1), "A", date(6), 3);
        let mut b = Task::new(id(2), "B", date(9), 2);
        b.add_predecessor("1FS".parse().unwrap());
        let mut c = Task::new(id(3), "C", date(15), 1);
        c.add_predecessor("2FS+2".parse().unwrap());
        c.locks.set(LockFlag::Confirmed, true);

        let graph = DependencyGraph::from_tasks([a, b, c]).unwrap();
        Scheduler::new(graph, Calendar::weekends_only())
    }

    #[test]
    fn locked_descendant_blocks_commit_until_break() {
        let mut scheduler = scenario();
        let plan = scheduler.preview_cascade(id(1), date(13)).unwrap();

        let b = plan.entry(&id(2)).unwrap();
        assert_eq!(b.zone, Zone::Cascade);
        assert_eq!(b.shift, 5);

        let conflicts = scheduler.conflicts(&plan);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].task, id(2));
        assert_eq!(conflicts[0].locked_descendants, vec![id(3)]);

        let mut writer = MemoryWriter::default();
        let err = scheduler.commit(&plan, &mut writer).unwrap_err();
        assert!(matches!(err, CommitError::LockedTaskConflict(_)));
        assert!(writer.written.is_empty());
        assert_eq!(scheduler.graph().task(&id(1)).unwrap().start_date, date(6));

        let plan = scheduler.review(&plan, [(id(2), Decision::Break)]).unwrap();
        assert!(scheduler.board(&plan).is_committable());

        let applied = scheduler.commit(&plan, &mut writer).unwrap();
        assert_eq!(applied, vec![id(1)]);
        assert_eq!(scheduler.graph().task(&id(1)).unwrap().start_date, date(13));
        assert_eq!(scheduler.graph().task(&id(2)).unwrap().start_date, date(9));
        // The broken link is kept for future cascades
        assert_eq!(scheduler.graph().predecessors_of(&id(2)).len(), 1);
    }

    #[test]
    fn unlocking_the_locked_descendant_allows_commit() {
        let mut scheduler = scenario();
        let plan = scheduler.preview_cascade(id(1), date(13)).unwrap();
        let plan = scheduler.review(&plan, [(id(3), Decision::Unlock)]).unwrap();

        let mut writer = MemoryWriter::default();
        let applied = scheduler.commit(&plan, &mut writer).unwrap();
        assert_eq!(applied, vec![id(1), id(2), id(3)]);
        assert_eq!(scheduler.graph().task(&id(2)).unwrap().start_date, date(16));
        // Unlocking withdraws the confirmation along with the move
        let c = scheduler.graph().task(&id(3)).unwrap();
        assert_eq!(c.start_date, date(22));
        assert!(!c.locks.any());
        assert_eq!(writer.written[2].task_id, id(3));
        assert_eq!(writer.written[2].locks, LockFlags::default());
        // C is free now, so the next move carries it along
        let next = scheduler.preview_cascade(id(1), date(14)).unwrap();
        assert_eq!(next.zone_of(&id(3)), Some(Zone::Cascade));
        assert!(scheduler.conflicts(&next).is_empty());
    }

    #[test]
    fn started_descendant_cannot_be_unlocked() {
        let mut scheduler = scenario();
        scheduler
            .graph
            .task_mut(&id(3))
            .unwrap()
            .locks
            .set(LockFlag::Started, true);

        let plan = scheduler.preview_cascade(id(1), date(13)).unwrap();
        let err = scheduler
            .review(&plan, [(id(3), Decision::Unlock)])
            .unwrap_err();
        assert!(matches!(err, ReviewError::NotUnlockable { .. }));
        assert_eq!(plan.summary().unlockable, 0);
    }

    #[test]
    fn overridden_pin_is_cleared_on_commit() {
        let a = Task::new(id(1), "A", date(6), 1);
        let mut b = Task::new(id(2), "B", date(7), 1);
        b.add_predecessor("1".parse().unwrap());
        b.manually_positioned = true;
        let graph = DependencyGraph::from_tasks([a, b]).unwrap();
        let mut scheduler = Scheduler::new(graph, Calendar::weekends_only());

        let plan = scheduler
            .preview(
                Trigger::Move {
                    task: id(1),
                    new_start: date(8),
                },
                &CascadeOptions::new().override_pinned(true),
            )
            .unwrap();
        let mut writer = MemoryWriter::default();
        scheduler.commit(&plan, &mut writer).unwrap();

        let b = scheduler.graph().task(&id(2)).unwrap();
        assert_eq!(b.start_date, date(9));
        assert!(!b.manually_positioned);
    }

    #[test]
    fn moved_task_with_predecessors_is_pinned() {
        let mut scheduler = scenario();
        let mut writer = MemoryWriter::default();
        let plan = scheduler.preview_cascade(id(2), date(10)).unwrap();
        let plan = scheduler.review(&plan, [(id(3), Decision::Unlock)]).unwrap();
        scheduler.commit(&plan, &mut writer).unwrap();

        let b = scheduler.graph().task(&id(2)).unwrap();
        assert!(b.manually_positioned);
        assert_eq!(writer.written[0].task_id, id(2));
        assert!(writer.written[0].manually_positioned);
    }

    #[test]
    fn pinning_can_be_disabled() {
        let mut scheduler = scenario().with_settings(SchedulerSettings {
            override_pinned: false,
            pin_moved_task: false,
        });
        let plan = scheduler.preview_cascade(id(2), date(8)).unwrap();
        let mut writer = MemoryWriter::default();
        scheduler.commit(&plan, &mut writer).unwrap();
        assert!(!scheduler.graph().task(&id(2)).unwrap().manually_positioned);
    }

    #[test]
    fn unpin_is_idempotent() {
        let mut scheduler = scenario();
        let mut writer = MemoryWriter::default();

        // Pin B two days late
        let plan = scheduler.preview_cascade(id(2), date(13)).unwrap();
        let plan = scheduler.review(&plan, [(id(3), Decision::Unlock)]).unwrap();
        scheduler.commit(&plan, &mut writer).unwrap();
        assert!(scheduler.graph().task(&id(2)).unwrap().manually_positioned);

        // Clearing a lock does not lift the pin
        assert_eq!(
            scheduler.unlock_and_recompute(id(2)).unwrap_err(),
            CascadeError::StillPinned(id(2))
        );

        let plan = scheduler.unpin_and_recompute(id(2)).unwrap();
        assert_eq!(plan.root.new_start, date(9));
        // C lost its confirmation with the first commit and follows freely
        assert_eq!(plan.zone_of(&id(3)), Some(Zone::Cascade));
        scheduler.commit(&plan, &mut writer).unwrap();

        let b = scheduler.graph().task(&id(2)).unwrap();
        assert_eq!(b.start_date, date(9));
        assert!(!b.manually_positioned);

        let again = scheduler.unpin_and_recompute(id(2)).unwrap();
        assert_eq!(again.root.new_start, date(9));
        assert!(again.entries.is_empty());
    }

    #[test]
    fn unlock_commit_does_not_pin_the_task() {
        let a = Task::new(id(1), "A", date(6), 3);
        let mut b = Task::new(id(2), "B", date(20), 2);
        b.add_predecessor("1".parse().unwrap());
        let graph = DependencyGraph::from_tasks([a, b]).unwrap();
        let mut scheduler = Scheduler::new(graph, Calendar::weekends_only());

        let plan = scheduler.unlock_and_recompute(id(2)).unwrap();
        assert_eq!(plan.root.new_start, date(9));
        let updates = scheduler.updates_for(&plan);
        assert!(!updates[0].manually_positioned);

        let mut writer = MemoryWriter::default();
        scheduler.commit(&plan, &mut writer).unwrap();
        assert!(!scheduler.graph().task(&id(2)).unwrap().manually_positioned);
    }

    #[test]
    fn stale_plan_is_refused() {
        let mut scheduler = scenario();
        let plan = scheduler.preview_cascade(id(1), date(7)).unwrap();
        let plan = scheduler.review(&plan, [(id(2), Decision::Break)]).unwrap();

        let mut writer = MemoryWriter {
            stale: true,
            ..Default::default()
        };
        assert!(matches!(
            scheduler.commit(&plan, &mut writer),
            Err(CommitError::StaleSnapshot(_))
        ));

        // The in-memory schedule moved on
        let mut writer = MemoryWriter::default();
        let fresh = scheduler.preview_cascade(id(1), date(8)).unwrap();
        let fresh = scheduler.review(&fresh, [(id(2), Decision::Break)]).unwrap();
        scheduler.commit(&fresh, &mut writer).unwrap();
        assert!(matches!(
            scheduler.commit(&plan, &mut writer),
            Err(CommitError::StaleSnapshot(_))
        ));
    }

    #[test]
    fn store_failure_leaves_graph_unchanged() {
        let mut scheduler = scenario();
        let plan = scheduler.preview_cascade(id(1), date(13)).unwrap();
        let plan = scheduler.review(&plan, [(id(3), Decision::Unlock)]).unwrap();
        let before = scheduler.graph().snapshot_id();

        let mut writer = MemoryWriter {
            fail: Some("disk full"),
            ..Default::default()
        };
        let err = scheduler.commit(&plan, &mut writer).unwrap_err();
        assert!(matches!(err, CommitError::Store(ref msg) if msg == "disk full"));
        assert_eq!(scheduler.graph().snapshot_id(), before);
    }

    #[test]
    fn resize_cascades() {
        let scheduler = scenario();
        let plan = scheduler.preview_resize(id(1), 4).unwrap();
        assert_eq!(plan.entry(&id(2)).unwrap().proposed_start, date(10));
        let updates = scheduler.updates_for(&plan);
        assert_eq!(updates[0].duration, 4);
        assert_eq!(updates[0].start_date, date(6));
    }

    #[test]
    fn empty_plan_commits_nothing() {
        let mut scheduler = scenario();
        let plan = scheduler.preview_cascade(id(1), date(6)).unwrap();
        let mut writer = MemoryWriter::default();
        assert!(scheduler.commit(&plan, &mut writer).unwrap().is_empty());
        assert!(writer.written.is_empty());
    }

    #[test]
    fn cycle_is_rejected_through_the_scheduler() {
        let mut scheduler = scenario();
        let err = scheduler
            .add_link(DependencyLink::new(id(3), id(1), LinkKind::FinishToStart, 0))
            .unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
        assert!(scheduler.graph().successors_of(&id(3)).is_empty());
    }

    #[test]
    fn observers_see_each_recompute() {
        struct Shared(Rc<CascadeStats>);
        impl CascadeObserver for Shared {
            fn on_recompute(&self, event: &RecomputeEvent<'_>) {
                self.0.on_recompute(event);
            }
        }

        let stats = Rc::new(CascadeStats::new());
        let mut scheduler = scenario();
        scheduler.add_observer(Box::new(Shared(Rc::clone(&stats))));
        scheduler.preview_cascade(id(1), date(13)).unwrap();

        assert_eq!(stats.recomputes(), 2);
        assert_eq!(stats.lock_hits(), 1);
    }

    #[test]
    fn holiday_pushes_cascade() {
        let a = Task::new(id(1), "A", date(6), 1);
        let mut b = Task::new(id(2), "B", date(7), 1);
        b.add_predecessor("1".parse().unwrap());
        let graph = DependencyGraph::from_tasks([a, b]).unwrap();
        let calendar = Calendar::new(Default::default(), BTreeSet::from([date(8)]));
        let scheduler = Scheduler::new(graph, calendar);

        let plan = scheduler.preview_cascade(id(1), date(7)).unwrap();
        assert_eq!(plan.entry(&id(2)).unwrap().proposed_start, date(9));
    }
}
