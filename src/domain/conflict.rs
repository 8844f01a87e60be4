//! Conflict detection
//!
//! A conflict exists when a task the plan would move has a direct successor
//! the plan leaves locked. The detector only reports; resolving means
//! re-routing the moving task to Break or unlocking the successor.

use serde::Serialize;

use super::cascade::{CascadePlan, Zone};
use super::graph::DependencyGraph;
use super::id::TaskId;

/// A cascading task blocked by locked successors
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub task: TaskId,
    pub locked_descendants: Vec<TaskId>,
}

/// Finds every Cascade entry with a Locked successor
///
/// Conflicts are reported in plan order; locked successors in link order.
pub fn find_conflicts(plan: &CascadePlan, graph: &DependencyGraph) -> Vec<Conflict> {
    plan.entries_in(Zone::Cascade)
        .filter_map(|entry| {
            let locked: Vec<TaskId> = graph
                .successors_of(&entry.task_id)
                .into_iter()
                .map(|(link, _)| link.successor)
                .filter(|succ| plan.zone_of(succ) == Some(Zone::Locked))
                .collect();

            (!locked.is_empty()).then(|| Conflict {
                task: entry.task_id,
                locked_descendants: locked,
            })
        })
        .collect()
}
