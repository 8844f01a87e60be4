//! Scheduling engine
//!
//! Contains the cascade and calendar logic without any I/O concerns.

mod calendar;
mod cascade;
mod conflict;
mod engine;
mod graph;
mod id;
mod lock;
mod observer;
mod task;
mod zone;

pub use calendar::{Calendar, CalendarError, DayOff, HolidayProvider, Region, WorkWeek};
pub use cascade::{
    CascadeError, CascadeOptions, CascadePlan, CascadeResolver, Decision, Direction, HeldBack,
    PlanEntry, PlanSummary, RootChange, Trigger, Zone,
};
pub use conflict::{find_conflicts, Conflict};
pub use engine::{
    CommitError, ScheduleWriter, Scheduler, SchedulerSettings, TaskUpdate, WriteError,
};
pub use graph::{DependencyGraph, DependencyLink, GraphError};
pub use id::{IdError, SnapshotId, TaskId};
pub use lock::{LockPolicy, LockReason, Mutability};
pub use observer::{CascadeObserver, CascadeStats, LogObserver, RecomputeEvent};
pub use task::{LinkError, LinkKind, LockFlag, LockFlags, Predecessor, Predecessors, Task};
pub use zone::{review, LinkedTask, ReviewError, ZoneBoard, ZoneCard};
