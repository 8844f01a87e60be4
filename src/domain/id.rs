//! Identifiers for tasks and schedule snapshots
//!
//! ID Format:
//! - Task IDs: positive task numbers, unique within a schedule (e.g., `7`).
//!   `#7` is accepted on input.
//! - Snapshot IDs: `s-{12-char-hash}` for display; the full blake3 digest is
//!   compared.
//!
//! A snapshot ID fingerprints the whole task set a cascade plan was computed
//! from, so a commit can tell whether the schedule changed underneath it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::task::Task;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid task ID: expected a positive task number, got '{0}'")]
    InvalidTaskId(String),

    #[error("Task ID must be positive, got 0")]
    Zero,
}

/// Task number within a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawTaskId", into = "u32")]
pub struct TaskId(u32);

impl TaskId {
    /// The first task number of a schedule
    pub const FIRST: TaskId = TaskId(1);

    /// Creates a task ID from a task number
    pub fn new(number: u32) -> Result<Self, IdError> {
        if number == 0 {
            return Err(IdError::Zero);
        }
        Ok(Self(number))
    }

    /// Returns the task number
    pub fn number(&self) -> u32 {
        self.0
    }

    /// Returns the ID following this one
    pub fn next(&self) -> TaskId {
        TaskId(self.0.saturating_add(1))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdError::InvalidTaskId(s.to_string()));
        }

        let number: u32 = digits
            .parse()
            .map_err(|_| IdError::InvalidTaskId(s.to_string()))?;

        Self::new(number)
    }
}

/// Stored IDs may be numbers or numeric strings
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTaskId {
    Number(u32),
    Text(String),
}

impl TryFrom<RawTaskId> for TaskId {
    type Error = IdError;

    fn try_from(value: RawTaskId) -> Result<Self, Self::Error> {
        match value {
            RawTaskId::Number(n) => TaskId::new(n),
            RawTaskId::Text(s) => s.parse(),
        }
    }
}

impl From<TaskId> for u32 {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

/// Fingerprint of a task set
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Hashes the canonical JSON form of each task, in task ID order
    pub fn of_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut sorted: Vec<&Task> = tasks.into_iter().collect();
        sorted.sort_by_key(|t| t.id);

        let mut hasher = blake3::Hasher::new();
        for task in sorted {
            // Task serialization cannot fail: no maps with non-string keys
            let line = serde_json::to_string(task).unwrap_or_default();
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }

        Self(hasher.finalize().to_hex().to_string())
    }

    /// Returns the full hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s-{}", &self.0[..self.0.len().min(12)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_task(n: u32) -> Task {
        let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        Task::new(TaskId::new(n).unwrap(), format!("Task {}", n), start, 2)
    }

    #[test]
    fn task_id_parses_plain_and_hash_forms() {
        assert_eq!("7".parse::<TaskId>().unwrap().number(), 7);
        assert_eq!("#12".parse::<TaskId>().unwrap().number(), 12);
        assert_eq!(" 3 ".parse::<TaskId>().unwrap().number(), 3);
    }

    #[test]
    fn task_id_rejects_invalid_format() {
        assert!("".parse::<TaskId>().is_err());
        assert!("a-1234567".parse::<TaskId>().is_err());
        assert!("-1".parse::<TaskId>().is_err());
        assert_eq!("0".parse::<TaskId>(), Err(IdError::Zero));
    }

    #[test]
    fn task_id_deserializes_numbers_and_strings() {
        let a: TaskId = serde_json::from_str("4").unwrap();
        let b: TaskId = serde_json::from_str("\"4\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "4");
        assert!(serde_json::from_str::<TaskId>("0").is_err());
    }

    #[test]
    fn task_id_display() {
        assert_eq!(TaskId::new(9).unwrap().to_string(), "9");
        assert_eq!(TaskId::new(9).unwrap().next().number(), 10);
    }

    #[test]
    fn snapshot_is_order_independent() {
        let t1 = make_task(1);
        let t2 = make_task(2);

        let a = SnapshotId::of_tasks([&t1, &t2]);
        let b = SnapshotId::of_tasks([&t2, &t1]);
        assert_eq!(a, b);
        assert!(a.to_string().starts_with("s-"));
        assert_eq!(a.to_string().len(), 14);
    }

    #[test]
    fn snapshot_changes_with_task_dates() {
        let t1 = make_task(1);
        let mut moved = t1.clone();
        moved.start_date = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();

        assert_ne!(SnapshotId::of_tasks([&t1]), SnapshotId::of_tasks([&moved]));
    }
}
