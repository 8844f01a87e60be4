//! JSONL storage for tasks
//!
//! Tasks are stored in `.cascade/tasks.jsonl` with one JSON object per line.
//! Uses file locking for concurrent access safety: readers take a shared lock
//! on the store, and read-modify-write cycles hold an exclusive lock on a
//! sidecar `tasks.jsonl.lock` for their whole duration.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;

use crate::domain::{ScheduleWriter, SnapshotId, Task, TaskId, TaskUpdate, WriteError};

/// Store for task data in JSONL format
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    /// Creates a new task store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".cascade").join("tasks.jsonl"))
    }

    /// Returns the path to the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.lock")
    }

    /// Holds the store's write lock until the returned file is dropped
    fn lock_exclusive(&self) -> Result<File> {
        self.ensure_parent()?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        file.lock_exclusive()
            .context("Failed to acquire write lock on task store")?;
        Ok(file)
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        Ok(())
    }

    /// Reads all tasks from the store, keyed and ordered by ID
    pub fn read_all(&self) -> Result<BTreeMap<TaskId, Task>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open task store: {}", self.path.display()))?;

        // Acquire shared lock for reading
        file.lock_shared()
            .context("Failed to acquire read lock on task store")?;

        let reader = BufReader::new(&file);
        let mut tasks = BTreeMap::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

            if line.trim().is_empty() {
                continue;
            }

            let task: Task = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse task at line {}", line_num + 1))?;

            // Later lines win, so appended edits replace earlier ones
            tasks.insert(task.id, task);
        }

        // Lock is released when file is dropped
        Ok(tasks)
    }

    /// Writes all tasks to the store (full rewrite)
    pub fn write_all(&self, tasks: &BTreeMap<TaskId, Task>) -> Result<()> {
        self.ensure_parent()?;

        // Write to temp file first
        let temp_path = self.path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            file.lock_exclusive()
                .context("Failed to acquire write lock on temp file")?;

            let mut writer = BufWriter::new(&file);

            for task in tasks.values() {
                let line = serde_json::to_string(task).context("Failed to serialize task")?;
                writeln!(writer, "{}", line).context("Failed to write task")?;
            }

            writer.flush().context("Failed to flush task store")?;
        }

        // Atomic rename
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }

    /// Inserts or replaces a single task
    pub fn upsert(&self, task: &Task) -> Result<()> {
        let _lock = self.lock_exclusive()?;
        let mut tasks = self.read_all()?;
        tasks.insert(task.id, task.clone());
        self.write_all(&tasks)
    }

    /// Reads one task, applies `edit`, and writes it back
    pub fn modify<T>(&self, task_id: &TaskId, edit: impl FnOnce(&mut Task) -> Result<T>) -> Result<T> {
        let _lock = self.lock_exclusive()?;
        let mut tasks = self.read_all()?;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| anyhow!("Task not found: {}", task_id))?;
        let result = edit(task)?;
        self.write_all(&tasks)?;
        Ok(result)
    }

    /// Applies committed updates if the stored tasks still match `snapshot`
    ///
    /// Either every update is written or the file is left untouched.
    pub fn apply_updates(
        &self,
        snapshot: &SnapshotId,
        updates: &[TaskUpdate],
    ) -> std::result::Result<(), WriteError> {
        let failed = |e: anyhow::Error| WriteError::Failed(format!("{:#}", e));

        let _lock = self.lock_exclusive().map_err(failed)?;
        let mut tasks = self.read_all().map_err(failed)?;

        if &SnapshotId::of_tasks(tasks.values()) != snapshot {
            return Err(WriteError::Stale(snapshot.clone()));
        }

        for update in updates {
            let task = tasks
                .get_mut(&update.task_id)
                .ok_or_else(|| WriteError::Failed(format!("Task not found: {}", update.task_id)))?;
            task.start_date = update.start_date;
            task.duration = update.duration;
            task.manually_positioned = update.manually_positioned;
            task.locks = update.locks;
        }

        self.write_all(&tasks).map_err(failed)
    }
}

impl ScheduleWriter for TaskStore {
    fn write_updates(
        &mut self,
        snapshot: &SnapshotId,
        updates: &[TaskUpdate],
    ) -> std::result::Result<(), WriteError> {
        self.apply_updates(snapshot, updates)
    }
}
