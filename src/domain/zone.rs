//! Zone board and review decisions
//!
//! The board partitions the direct successors of the changed task into
//! cascade, break and locked columns. Deeper tasks are not chosen on their
//! own; they hang off the direct successor they descend from, with any
//! conflicts they take part in.

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

use super::cascade::{CascadeError, CascadeOptions, CascadePlan, Decision, PlanEntry, Zone};
use super::conflict::{find_conflicts, Conflict};
use super::graph::DependencyGraph;
use super::id::TaskId;
use super::lock::LockReason;

#[derive(Debug, Error, PartialEq)]
pub enum ReviewError {
    #[error("Task {0} is not part of this cascade")]
    NotInPlan(TaskId),

    #[error("Task {task} is locked ({reason}) and cannot be unlocked")]
    NotUnlockable { task: TaskId, reason: LockReason },

    #[error("Cannot {decision} task {task}: it is in the {zone} zone")]
    Incompatible {
        task: TaskId,
        decision: Decision,
        zone: Zone,
    },

    #[error(transparent)]
    Resolve(#[from] CascadeError),
}

/// Validates reviewer decisions against a plan and merges them into its options
///
/// - `Break` applies to tasks the plan would move (or already breaks).
/// - `Unlock` applies to locked tasks whose lock can be lifted.
/// - `Cascade` reverts a break, or keeps an unlocked task moving.
///
/// The returned options re-resolve the same trigger.
pub fn review(
    plan: &CascadePlan,
    decisions: impl IntoIterator<Item = (TaskId, Decision)>,
) -> Result<CascadeOptions, ReviewError> {
    let mut options = plan.options.clone();

    for (task, decision) in decisions {
        let entry = plan.entry(&task).ok_or(ReviewError::NotInPlan(task))?;
        let previous = options.decisions.get(&task).copied();

        match (decision, entry.zone) {
            (Decision::Break, Zone::Cascade | Zone::Break) => {
                options.decisions.insert(task, Decision::Break);
            }
            (Decision::Unlock, Zone::Locked) => match entry.permanent_lock {
                Some(reason) => {
                    return Err(ReviewError::NotUnlockable { task, reason });
                }
                None => {
                    options.decisions.insert(task, Decision::Unlock);
                }
            },
            (Decision::Unlock, Zone::Cascade) if previous == Some(Decision::Unlock) => {}
            (Decision::Cascade, Zone::Break) => {
                options.decisions.remove(&task);
            }
            (Decision::Cascade, Zone::Cascade) => {}
            (decision, zone) => {
                return Err(ReviewError::Incompatible {
                    task,
                    decision,
                    zone,
                });
            }
        }
    }

    Ok(options)
}

/// A deeper task shown under the direct successor it descends from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedTask {
    pub task_id: TaskId,
    pub name: String,
    pub zone: Zone,
    pub depth: usize,
}

/// One direct successor on the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneCard {
    #[serde(flatten)]
    pub entry: PlanEntry,
    pub linked: Vec<LinkedTask>,
    /// Descendants left in place behind a held task
    pub held_back: Vec<TaskId>,
    pub conflicts: Vec<Conflict>,
}

impl ZoneCard {
    pub fn task_id(&self) -> TaskId {
        self.entry.task_id
    }
}

/// Three-way partition of the direct successors of a changed task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ZoneBoard {
    pub cascade: Vec<ZoneCard>,
    #[serde(rename = "break")]
    pub breaking: Vec<ZoneCard>,
    pub locked: Vec<ZoneCard>,
    /// Every conflict in the plan, including those under no card
    pub conflicts: Vec<Conflict>,
}

impl ZoneBoard {
    /// Builds the board for a plan computed from `graph`
    pub fn classify(plan: &CascadePlan, graph: &DependencyGraph) -> Self {
        let conflicts = find_conflicts(plan, graph);
        let mut board = ZoneBoard {
            conflicts: conflicts.clone(),
            ..Default::default()
        };

        for entry in plan.direct() {
            let below: HashSet<TaskId> = graph
                .descendants(&entry.task_id)
                .into_iter()
                .map(|(id, _)| id)
                .collect();

            let linked = plan
                .entries
                .iter()
                .filter(|e| e.depth > 1 && below.contains(&e.task_id))
                .map(|e| LinkedTask {
                    task_id: e.task_id,
                    name: e.name.clone(),
                    zone: e.zone,
                    depth: e.depth,
                })
                .collect();

            let held_back = plan
                .held_back
                .iter()
                .filter(|h| below.contains(&h.task_id))
                .map(|h| h.task_id)
                .collect();

            let card_conflicts = conflicts
                .iter()
                .filter(|c| c.task == entry.task_id || below.contains(&c.task))
                .cloned()
                .collect();

            let card = ZoneCard {
                entry: entry.clone(),
                linked,
                held_back,
                conflicts: card_conflicts,
            };

            match entry.zone {
                Zone::Cascade => board.cascade.push(card),
                Zone::Break => board.breaking.push(card),
                Zone::Locked => board.locked.push(card),
            }
        }

        board
    }

    /// Returns true once no conflicts remain
    pub fn is_committable(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn column(&self, zone: Zone) -> &[ZoneCard] {
        match zone {
            Zone::Cascade => &self.cascade,
            Zone::Break => &self.breaking,
            Zone::Locked => &self.locked,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cascade.is_empty() && self.breaking.is_empty() && self.locked.is_empty()
    }
}
