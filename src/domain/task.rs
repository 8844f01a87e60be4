//! Task domain model
//!
//! Tasks are the scheduled units of a schedule or template. Each task
//! carries its own predecessor list, which is the stored form of the
//! dependency links between tasks.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::id::{IdError, TaskId};

/// Invalid dependency link
#[derive(Debug, Error, PartialEq)]
pub enum LinkError {
    #[error("Unknown dependency type '{0}': expected FS, SS, FF or SF")]
    UnknownKind(String),

    #[error("Task not found: {0}")]
    UnknownTask(TaskId),

    #[error("Self-dependency not allowed: {0}")]
    SelfLink(TaskId),

    #[error("Task {successor} already depends on {predecessor}")]
    Duplicate {
        predecessor: TaskId,
        successor: TaskId,
    },

    #[error("Invalid predecessor '{0}': expected e.g. 2FS+3, 5SS-2 or 7")]
    Malformed(String),

    #[error(transparent)]
    Id(#[from] IdError),
}

/// Type of dependency between a predecessor and a successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkKind {
    /// Successor starts after the predecessor finishes
    #[default]
    FinishToStart,
    /// Successor starts after the predecessor starts
    StartToStart,
    /// Successor finishes after the predecessor finishes
    FinishToFinish,
    /// Successor finishes after the predecessor starts
    StartToFinish,
}

impl LinkKind {
    /// Returns the two-letter code
    pub fn code(&self) -> &'static str {
        match self {
            LinkKind::FinishToStart => "FS",
            LinkKind::StartToStart => "SS",
            LinkKind::FinishToFinish => "FF",
            LinkKind::StartToFinish => "SF",
        }
    }

    /// Returns true if the rule is anchored on the predecessor's finish
    pub fn from_finish(&self) -> bool {
        matches!(self, LinkKind::FinishToStart | LinkKind::FinishToFinish)
    }

    /// Returns true if the rule constrains the successor's finish
    pub fn to_finish(&self) -> bool {
        matches!(self, LinkKind::FinishToFinish | LinkKind::StartToFinish)
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for LinkKind {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FS" => Ok(LinkKind::FinishToStart),
            "SS" => Ok(LinkKind::StartToStart),
            "FF" => Ok(LinkKind::FinishToFinish),
            "SF" => Ok(LinkKind::StartToFinish),
            _ => Err(LinkError::UnknownKind(s.to_string())),
        }
    }
}

impl Serialize for LinkKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for LinkKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A typed dependency on a predecessor task, seen from the successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Predecessor {
    /// The predecessor task
    #[serde(rename = "id")]
    pub task: TaskId,

    /// The dependency rule
    #[serde(rename = "type", default)]
    pub kind: LinkKind,

    /// Signed business-day offset (positive delays, negative overlaps)
    #[serde(default)]
    pub lag: i64,
}

impl Predecessor {
    /// Creates a typed predecessor entry
    pub fn new(task: TaskId, kind: LinkKind, lag: i64) -> Self {
        Self { task, kind, lag }
    }

    /// Creates a finish-to-start entry with no lag
    pub fn finish_to_start(task: TaskId) -> Self {
        Self::new(task, LinkKind::FinishToStart, 0)
    }
}

/// Notation: `2FS+3`, `5SS-2`, `4FF`, or `7` (FS, no lag)
impl fmt::Display for Predecessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.task, self.kind)?;
        if self.lag != 0 {
            write!(f, "{:+}", self.lag)?;
        }
        Ok(())
    }
}

impl FromStr for Predecessor {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let malformed = || LinkError::Malformed(s.to_string());

        let digits_end = s
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit() && *c != '#')
            .map(|(i, _)| i)
            .unwrap_or(s.len());

        let task: TaskId = s[..digits_end].parse()?;
        let rest = &s[digits_end..];

        if rest.is_empty() {
            return Ok(Self::finish_to_start(task));
        }

        if rest.len() < 2 || !rest.is_char_boundary(2) {
            return Err(malformed());
        }

        let kind: LinkKind = rest[..2].parse()?;
        let lag_str = rest[2..].trim();

        let lag = if lag_str.is_empty() {
            0
        } else {
            if !lag_str.starts_with(['+', '-']) {
                return Err(malformed());
            }
            lag_str.parse::<i64>().map_err(|_| malformed())?
        };

        Ok(Self::new(task, kind, lag))
    }
}

/// Predecessor list with backward-compatible serialization
///
/// Legacy format: `[2, 3]` (plain task numbers, implies FS with no lag)
/// Notation format: `["2FS+3"]`
/// Record format: `[{"id": 2, "type": "SS", "lag": 1}]`
///
/// All three normalize to [`Predecessor`] on read; writes use records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predecessors(Vec<Predecessor>);

impl Predecessors {
    /// Creates an empty predecessor list
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Adds an entry unless one for the same predecessor already exists
    pub fn add(&mut self, pred: Predecessor) -> bool {
        if self.contains(&pred.task) {
            return false;
        }
        self.0.push(pred);
        true
    }

    /// Removes the entry for a predecessor task
    pub fn remove(&mut self, task_id: &TaskId) -> bool {
        let len_before = self.0.len();
        self.0.retain(|p| &p.task != task_id);
        self.0.len() != len_before
    }

    /// Removes all entries
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Returns true if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Predecessor> {
        self.0.iter()
    }

    /// Checks if a task is listed as a predecessor
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.0.iter().any(|p| &p.task == task_id)
    }

    /// Formats the list as `2FS+3, 5SS`, or `None` when empty
    pub fn display(&self) -> String {
        if self.0.is_empty() {
            return "None".to_string();
        }
        self.0
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Serialize for Predecessors {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Always serialize as records
        self.0.serialize(serializer)
    }
}

impl<'a> IntoIterator for &'a Predecessors {
    type Item = &'a Predecessor;
    type IntoIter = std::slice::Iter<'a, Predecessor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Predecessor> for Predecessors {
    fn from_iter<I: IntoIterator<Item = Predecessor>>(iter: I) -> Self {
        let mut preds = Predecessors::new();
        for p in iter {
            preds.add(p);
        }
        preds
    }
}

impl<'de> Deserialize<'de> for Predecessors {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{Error as _, SeqAccess, Visitor};

        struct PredecessorsVisitor;

        impl<'de> Visitor<'de> for PredecessorsVisitor {
            type Value = Predecessors;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a sequence of predecessors (numbers, strings or objects)")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut preds = Predecessors::new();

                while let Some(value) = seq.next_element::<serde_json::Value>()? {
                    let pred = match value {
                        // Legacy format: plain task number
                        serde_json::Value::Number(n) => {
                            let number = n
                                .as_u64()
                                .and_then(|n| u32::try_from(n).ok())
                                .ok_or_else(|| {
                                    A::Error::custom(format!("invalid task number: {}", n))
                                })?;
                            let task = TaskId::new(number).map_err(A::Error::custom)?;
                            Predecessor::finish_to_start(task)
                        }
                        serde_json::Value::String(s) => s.parse().map_err(A::Error::custom)?,
                        serde_json::Value::Object(obj) => {
                            serde_json::from_value(serde_json::Value::Object(obj))
                                .map_err(A::Error::custom)?
                        }
                        _ => {
                            return Err(A::Error::custom(
                                "expected number, string or object for predecessor",
                            ))
                        }
                    };
                    preds.add(pred);
                }

                Ok(preds)
            }
        }

        deserializer.deserialize_seq(PredecessorsVisitor)
    }
}

/// One of the independent lock facts on a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockFlag {
    SupplierConfirmed,
    Confirmed,
    Started,
    Completed,
}

impl LockFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockFlag::SupplierConfirmed => "supplier_confirmed",
            LockFlag::Confirmed => "confirmed",
            LockFlag::Started => "started",
            LockFlag::Completed => "completed",
        }
    }
}

impl fmt::Display for LockFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "supplier_confirmed" | "supplier_confirm" => Ok(LockFlag::SupplierConfirmed),
            "confirmed" | "confirm" => Ok(LockFlag::Confirmed),
            "started" | "start" => Ok(LockFlag::Started),
            "completed" | "complete" => Ok(LockFlag::Completed),
            other => Err(format!(
                "unknown lock '{}': expected supplier_confirmed, confirmed, started or completed",
                other
            )),
        }
    }
}

/// Lock facts protecting a task from automatic recomputation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockFlags {
    pub supplier_confirmed: bool,
    pub confirmed: bool,
    pub started: bool,
    pub completed: bool,
}

impl LockFlags {
    /// Returns true if any lock fact is set
    pub fn any(&self) -> bool {
        self.supplier_confirmed || self.confirmed || self.started || self.completed
    }

    /// Returns the value of a single flag
    pub fn get(&self, flag: LockFlag) -> bool {
        match flag {
            LockFlag::SupplierConfirmed => self.supplier_confirmed,
            LockFlag::Confirmed => self.confirmed,
            LockFlag::Started => self.started,
            LockFlag::Completed => self.completed,
        }
    }

    /// Sets a single flag, returning true if it changed
    pub fn set(&mut self, flag: LockFlag, value: bool) -> bool {
        let slot = match flag {
            LockFlag::SupplierConfirmed => &mut self.supplier_confirmed,
            LockFlag::Confirmed => &mut self.confirmed,
            LockFlag::Started => &mut self.started,
            LockFlag::Completed => &mut self.completed,
        };
        let changed = *slot != value;
        *slot = value;
        changed
    }

    /// The flags left after an unlock: confirmations are withdrawn, while
    /// started and completed stay as recorded
    pub fn unlocked(self) -> Self {
        Self {
            supplier_confirmed: false,
            confirmed: false,
            ..self
        }
    }

    fn is_empty(&self) -> bool {
        !self.any()
    }
}

/// A task in a schedule or template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier within the schedule
    pub id: TaskId,

    /// Human-readable name
    pub name: String,

    /// First working day of the task
    pub start_date: NaiveDate,

    /// Length in business days (0 for milestones)
    pub duration: u32,

    /// Lock facts
    #[serde(default, skip_serializing_if = "LockFlags::is_empty")]
    pub locks: LockFlags,

    /// User pinned the date, overriding cascades
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manually_positioned: bool,

    /// Dependency links into this task
    #[serde(default, skip_serializing_if = "Predecessors::is_empty")]
    pub predecessors: Predecessors,
}

impl Task {
    /// Creates an unlocked task with no predecessors
    pub fn new(id: TaskId, name: impl Into<String>, start_date: NaiveDate, duration: u32) -> Self {
        Self {
            id,
            name: name.into(),
            start_date,
            duration,
            locks: LockFlags::default(),
            manually_positioned: false,
            predecessors: Predecessors::new(),
        }
    }

    /// Adds a predecessor entry
    pub fn add_predecessor(&mut self, pred: Predecessor) -> bool {
        self.predecessors.add(pred)
    }

    /// Removes the predecessor entry for a task
    pub fn remove_predecessor(&mut self, task_id: &TaskId) -> bool {
        self.predecessors.remove(task_id)
    }
}
