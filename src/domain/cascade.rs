//! Cascade resolution
//!
//! Computes the date changes that propagate from one changed task through
//! the dependency graph. Resolution is a pure function over a graph snapshot
//! and a calendar: it proposes, it never mutates.
//!
//! Each affected task is processed once, in topological order, after all of
//! its predecessors. Its required start is the latest date demanded by any of
//! its incoming links, using proposed dates for predecessors that moved in
//! this pass and current dates for everything else.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

use super::calendar::Calendar;
use super::graph::{DependencyGraph, DependencyLink, GraphError};
use super::id::{SnapshotId, TaskId};
use super::lock::{LockPolicy, LockReason, Mutability};
use super::observer::{CascadeObserver, RecomputeEvent};
use super::task::Task;

#[derive(Debug, Error, PartialEq)]
pub enum CascadeError {
    #[error("Task not found: {0}")]
    UnknownTask(TaskId),

    #[error("Task {task} is locked ({reason}) and cannot be unlocked")]
    NotUnlockable { task: TaskId, reason: LockReason },

    #[error("Task {task} is still locked ({reason}); clear the lock first")]
    StillLocked { task: TaskId, reason: LockReason },

    #[error("Task {0} is pinned; unpin it to recompute from its links")]
    StillPinned(TaskId),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// The edit that starts a cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Task moved to a new start date
    Move { task: TaskId, new_start: NaiveDate },
    /// Task duration changed; its start stays
    Resize { task: TaskId, new_duration: u32 },
    /// A lock flag was cleared; the task snaps back to its dependency-computed date
    Unlock { task: TaskId },
    /// The pin was lifted; the task snaps back the same way
    Unpin { task: TaskId },
}

impl Trigger {
    pub fn task(&self) -> TaskId {
        match self {
            Trigger::Move { task, .. }
            | Trigger::Resize { task, .. }
            | Trigger::Unlock { task }
            | Trigger::Unpin { task } => *task,
        }
    }
}

/// How a reached task responds to a cascade event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    /// Moves to its required date
    Cascade,
    /// Stays put; dependency enforcement dropped for this event only
    Break,
    /// Protected by a lock
    Locked,
}

impl Zone {
    pub fn label(&self) -> &'static str {
        match self {
            Zone::Cascade => "cascade",
            Zone::Break => "break",
            Zone::Locked => "locked",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A reviewer's choice for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Cascade,
    Break,
    Unlock,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Decision::Cascade => "cascade",
            Decision::Break => "break",
            Decision::Unlock => "unlock",
        };
        f.write_str(label)
    }
}

/// Inputs that shape a resolution beyond the trigger itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeOptions {
    /// Recompute manually positioned tasks instead of treating them as locked
    pub override_pinned: bool,
    pub decisions: BTreeMap<TaskId, Decision>,
}

impl CascadeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn override_pinned(mut self, yes: bool) -> Self {
        self.override_pinned = yes;
        self
    }

    pub fn decide(mut self, task: TaskId, decision: Decision) -> Self {
        self.decisions.insert(task, decision);
        self
    }
}

/// Start and duration of a task, current or proposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    start: NaiveDate,
    duration: u32,
}

impl Slot {
    fn of(task: &Task) -> Self {
        Self {
            start: task.start_date,
            duration: task.duration,
        }
    }

    fn end(&self, calendar: &Calendar) -> NaiveDate {
        calendar.add_business_days(self.start, i64::from(self.duration))
    }
}

/// Before and after of the task that triggered the cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootChange {
    pub task_id: TaskId,
    pub name: String,
    pub old_start: NaiveDate,
    pub new_start: NaiveDate,
    pub old_duration: u32,
    pub new_duration: u32,
    pub old_end: NaiveDate,
    pub new_end: NaiveDate,
    /// Signed business-day delta of the start date
    pub shift: i64,
}

impl RootChange {
    pub fn is_unchanged(&self) -> bool {
        self.old_start == self.new_start && self.old_duration == self.new_duration
    }
}

/// A task reached by the cascade whose required date differs from its current one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub task_id: TaskId,
    pub name: String,
    pub current_start: NaiveDate,
    /// Date demanded by the task's links
    pub required_start: NaiveDate,
    /// Date the plan would write: required for Cascade, current otherwise
    pub proposed_start: NaiveDate,
    pub duration: u32,
    pub zone: Zone,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_reason: Option<LockReason>,
    /// Started or completed, which no review can lift
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permanent_lock: Option<LockReason>,
    /// Hops from the trigger task (1 = direct successor)
    pub depth: usize,
    /// Predecessors that moved in this pass
    pub driven_by: Vec<TaskId>,
    /// Signed business-day delta between current and required start
    pub shift: i64,
}

impl PlanEntry {
    pub fn is_unlockable(&self) -> bool {
        self.zone == Zone::Locked && self.permanent_lock.is_none()
    }
}

/// A descendant left behind because every moved path to it is held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeldBack {
    pub task_id: TaskId,
    /// Locked or broken task the hold originates from
    pub held_by: TaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    None,
}

/// Counts shown before a plan is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub direction: Direction,
    pub days_moved: u64,
    pub will_cascade: usize,
    pub will_break: usize,
    pub locked: usize,
    pub unlockable: usize,
    pub held_back: usize,
}

/// Proposed outcome of one cascade event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CascadePlan {
    pub trigger: Trigger,
    pub root: RootChange,
    /// Entries in processing order (predecessors first)
    pub entries: Vec<PlanEntry>,
    pub held_back: Vec<HeldBack>,
    /// Fingerprint of the task set the plan was computed from
    pub snapshot: SnapshotId,
    pub options: CascadeOptions,
}

impl CascadePlan {
    pub fn entry(&self, task_id: &TaskId) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| &e.task_id == task_id)
    }

    pub fn zone_of(&self, task_id: &TaskId) -> Option<Zone> {
        self.entry(task_id).map(|e| e.zone)
    }

    pub fn entries_in(&self, zone: Zone) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(move |e| e.zone == zone)
    }

    /// Entries one hop from the trigger task
    pub fn direct(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.depth == 1)
    }

    /// Returns true if committing would write nothing
    pub fn is_empty(&self) -> bool {
        self.root.is_unchanged() && self.entries_in(Zone::Cascade).next().is_none()
    }

    pub fn summary(&self) -> PlanSummary {
        let direction = match self.root.shift {
            s if s > 0 => Direction::Forward,
            s if s < 0 => Direction::Backward,
            _ => Direction::None,
        };

        PlanSummary {
            direction,
            days_moved: self.root.shift.unsigned_abs(),
            will_cascade: self.entries_in(Zone::Cascade).count(),
            will_break: self.entries_in(Zone::Break).count(),
            locked: self.entries_in(Zone::Locked).count(),
            unlockable: self.entries.iter().filter(|e| e.is_unlockable()).count(),
            held_back: self.held_back.len(),
        }
    }
}

/// Walks the dependency graph to build cascade plans
pub struct CascadeResolver<'a> {
    graph: &'a DependencyGraph,
    calendar: &'a Calendar,
    policy: LockPolicy,
    observers: Vec<&'a dyn CascadeObserver>,
}

impl<'a> CascadeResolver<'a> {
    pub fn new(graph: &'a DependencyGraph, calendar: &'a Calendar) -> Self {
        Self {
            graph,
            calendar,
            policy: LockPolicy::new(),
            observers: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers an observer notified once per recomputed task
    pub fn observe(mut self, observer: &'a dyn CascadeObserver) -> Self {
        self.observers.push(observer);
        self
    }

    /// Resolves a move of one task to a new start date
    pub fn resolve(&self, moved: TaskId, new_start: NaiveDate) -> Result<CascadePlan, CascadeError> {
        self.resolve_trigger(
            Trigger::Move {
                task: moved,
                new_start,
            },
            &CascadeOptions::default(),
        )
    }

    /// Resolves any trigger under the given options
    pub fn resolve_trigger(
        &self,
        trigger: Trigger,
        options: &CascadeOptions,
    ) -> Result<CascadePlan, CascadeError> {
        let root_id = trigger.task();
        let root_task = self
            .graph
            .task(&root_id)
            .ok_or(CascadeError::UnknownTask(root_id))?;

        let old = Slot::of(root_task);
        let new = match trigger {
            Trigger::Move { new_start, .. } => Slot {
                start: new_start,
                duration: old.duration,
            },
            Trigger::Resize { new_duration, .. } => Slot {
                start: old.start,
                duration: new_duration,
            },
            Trigger::Unlock { .. } | Trigger::Unpin { .. } => {
                match (trigger, self.policy.classify(root_task)) {
                    (_, Mutability::Locked(reason)) => {
                        return Err(CascadeError::StillLocked {
                            task: root_id,
                            reason,
                        });
                    }
                    // Clearing a lock leaves the pin in place
                    (Trigger::Unlock { .. }, Mutability::ManuallyPositioned) => {
                        return Err(CascadeError::StillPinned(root_id));
                    }
                    _ => {}
                }
                Slot {
                    start: self
                        .required_start(root_task, &HashMap::new())
                        .unwrap_or(old.start),
                    duration: old.duration,
                }
            }
        };

        let root = RootChange {
            task_id: root_id,
            name: root_task.name.clone(),
            old_start: old.start,
            new_start: new.start,
            old_duration: old.duration,
            new_duration: new.duration,
            old_end: old.end(self.calendar),
            new_end: new.end(self.calendar),
            shift: self.calendar.business_days_between(old.start, new.start),
        };

        let mut proposed: HashMap<TaskId, Slot> = HashMap::new();
        if new != old {
            proposed.insert(root_id, new);
        }

        let depths: HashMap<TaskId, usize> = self.graph.descendants(&root_id).into_iter().collect();
        let mut held: HashMap<TaskId, TaskId> = HashMap::new();
        let mut entries = Vec::new();
        let mut held_back = Vec::new();

        let order = self.graph.topological_order()?;
        for id in order.iter().filter(|id| depths.contains_key(id)) {
            let Some(task) = self.graph.task(id) else {
                continue;
            };
            let incoming = self.graph.predecessors_of(id);

            let driven_by: Vec<TaskId> = incoming
                .iter()
                .map(|(link, _)| link.predecessor)
                .filter(|pred| proposed.contains_key(pred))
                .collect();

            if driven_by.is_empty() {
                // Reachable only through held tasks
                let origin = incoming
                    .iter()
                    .find_map(|(link, _)| held.get(&link.predecessor).copied());
                if let Some(held_by) = origin {
                    held.insert(*id, held_by);
                    held_back.push(HeldBack {
                        task_id: *id,
                        held_by,
                    });
                }
                continue;
            }

            let Some(required) = self.required_start(task, &proposed) else {
                continue;
            };
            if required == task.start_date {
                continue;
            }

            let (zone, lock_reason) = self.zone_for(task, options)?;

            for observer in &self.observers {
                observer.on_recompute(&RecomputeEvent {
                    task: *id,
                    current_start: task.start_date,
                    required_start: required,
                    zone,
                    driven_by: &driven_by,
                });
            }

            let proposed_start = if zone == Zone::Cascade {
                proposed.insert(
                    *id,
                    Slot {
                        start: required,
                        duration: task.duration,
                    },
                );
                required
            } else {
                held.insert(*id, *id);
                task.start_date
            };

            entries.push(PlanEntry {
                task_id: *id,
                name: task.name.clone(),
                current_start: task.start_date,
                required_start: required,
                proposed_start,
                duration: task.duration,
                zone,
                lock_reason,
                permanent_lock: self.policy.permanent_lock(task),
                depth: depths.get(id).copied().unwrap_or_default(),
                driven_by,
                shift: self
                    .calendar
                    .business_days_between(task.start_date, required),
            });
        }

        Ok(CascadePlan {
            trigger,
            root,
            entries,
            held_back,
            snapshot: self.graph.snapshot_id(),
            options: options.clone(),
        })
    }

    /// Latest start demanded by any incoming link, snapped to a working day
    ///
    /// `proposed` overrides the current slot of predecessors that moved.
    /// Returns `None` for a task without predecessors.
    fn required_start(&self, task: &Task, proposed: &HashMap<TaskId, Slot>) -> Option<NaiveDate> {
        self.graph
            .predecessors_of(&task.id)
            .iter()
            .map(|(link, pred)| {
                let slot = proposed
                    .get(&pred.id)
                    .copied()
                    .unwrap_or_else(|| Slot::of(pred));
                self.link_requirement(link, slot, task.duration)
            })
            .max()
            .map(|date| self.calendar.next_working_day(date))
    }

    /// Start date one link demands of its successor
    fn link_requirement(&self, link: &DependencyLink, pred: Slot, duration: u32) -> NaiveDate {
        let anchor = if link.kind.from_finish() {
            pred.end(self.calendar)
        } else {
            pred.start
        };
        let target = self.calendar.add_business_days(anchor, link.lag);

        if link.kind.to_finish() {
            self.calendar
                .add_business_days(target, -i64::from(duration))
        } else {
            target
        }
    }

    /// Dependency-computed start of a task from current predecessor dates
    pub fn computed_start(&self, task_id: &TaskId) -> Result<Option<NaiveDate>, CascadeError> {
        let task = self
            .graph
            .task(task_id)
            .ok_or(CascadeError::UnknownTask(*task_id))?;
        Ok(self.required_start(task, &HashMap::new()))
    }

    fn zone_for(
        &self,
        task: &Task,
        options: &CascadeOptions,
    ) -> Result<(Zone, Option<LockReason>), CascadeError> {
        let mutability = self.policy.classify(task);
        let decision = options.decisions.get(&task.id);

        if decision == Some(&Decision::Unlock) {
            if let Some(reason) = self.policy.permanent_lock(task) {
                return Err(CascadeError::NotUnlockable {
                    task: task.id,
                    reason,
                });
            }
        }

        let zoned = match (decision, mutability) {
            (Some(Decision::Break), m) => (Zone::Break, m.reason()),
            (Some(Decision::Unlock), _) => (Zone::Cascade, None),
            (_, Mutability::Free) => (Zone::Cascade, None),
            (_, Mutability::ManuallyPositioned) if options.override_pinned => (Zone::Cascade, None),
            (_, m) => (Zone::Locked, m.reason()),
        };

        Ok(zoned)
    }
}
