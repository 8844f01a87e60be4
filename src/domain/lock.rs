//! Lock policy
//!
//! Classifies how freely a task may be moved by an automatic cascade.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::task::Task;

/// Why a task is protected from automatic recomputation
///
/// Variants are declared in precedence order: when several lock facts hold,
/// the first one listed here is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    SupplierConfirmed,
    Confirmed,
    Started,
    Completed,
    ManuallyPositioned,
}

impl LockReason {
    pub fn label(&self) -> &'static str {
        match self {
            LockReason::SupplierConfirmed => "supplier confirmed",
            LockReason::Confirmed => "confirmed",
            LockReason::Started => "started",
            LockReason::Completed => "completed",
            LockReason::ManuallyPositioned => "manually positioned",
        }
    }

    /// Returns true if clearing this lock may let the task move
    ///
    /// Work that has started or finished keeps its dates.
    pub fn is_unlockable(&self) -> bool {
        !matches!(self, LockReason::Started | LockReason::Completed)
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Mutability of a task under automatic cascades
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Recomputed unconditionally
    Free,
    /// Recomputed only when explicitly unpinned or overridden
    ManuallyPositioned,
    /// Never recomputed automatically
    Locked(LockReason),
}

impl Mutability {
    /// The reason reported for display, if the task is not free
    pub fn reason(&self) -> Option<LockReason> {
        match self {
            Mutability::Free => None,
            Mutability::ManuallyPositioned => Some(LockReason::ManuallyPositioned),
            Mutability::Locked(reason) => Some(*reason),
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Mutability::Free)
    }
}

/// Maps a task's lock facts to its mutability
#[derive(Debug, Clone, Copy, Default)]
pub struct LockPolicy;

impl LockPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Classifies a task, reporting the most rigid lock when several hold
    pub fn classify(&self, task: &Task) -> Mutability {
        let locks = &task.locks;
        if locks.supplier_confirmed {
            Mutability::Locked(LockReason::SupplierConfirmed)
        } else if locks.confirmed {
            Mutability::Locked(LockReason::Confirmed)
        } else if locks.started {
            Mutability::Locked(LockReason::Started)
        } else if locks.completed {
            Mutability::Locked(LockReason::Completed)
        } else if task.manually_positioned {
            Mutability::ManuallyPositioned
        } else {
            Mutability::Free
        }
    }

    /// The lock that forbids unlocking the task, if any
    ///
    /// Checked across every lock fact, not just the one reported: a
    /// confirmed task that has also started cannot be unlocked.
    pub fn permanent_lock(&self, task: &Task) -> Option<LockReason> {
        if task.locks.started {
            Some(LockReason::Started)
        } else if task.locks.completed {
            Some(LockReason::Completed)
        } else {
            None
        }
    }

    /// Returns true if the task is protected and every lock on it can be cleared
    pub fn is_unlockable(&self, task: &Task) -> bool {
        !self.classify(task).is_free() && self.permanent_lock(task).is_none()
    }
}
