//! Cascade CLI - dependency cascades for construction schedules
//!
//! Tasks are linked by Finish-to-Start, Start-to-Start, Finish-to-Finish and
//! Start-to-Finish dependencies with signed business-day lags. Moving or
//! resizing a task produces a reviewable cascade plan: which tasks follow,
//! which are held by locks, and which dependencies the reviewer chose to
//! break. Nothing is written until the plan is committed.

pub mod domain;
pub mod storage;
pub mod cli;

pub use domain::{
    Calendar, CascadePlan, DependencyGraph, Scheduler, Task, TaskId, Trigger, Zone,
};
