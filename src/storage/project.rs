//! Project management
//!
//! Handles project initialization and assembles a scheduling session from
//! the stored tasks, the configuration and the holiday file.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use log::debug;
use thiserror::Error;

use super::{Config, HolidaySource, TaskStore};
use crate::domain::{Calendar, DependencyGraph, LogObserver, Scheduler, Trigger};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a cascade project. Run 'cascade init' first.")]
    NotInProject,
}

const DEFAULT_CONFIG: &str = r#"# cascade configuration

[calendar]
# IANA timezone; selects the public holiday region
timezone = "Australia/Brisbane"
# region = "QLD"
working_days = ["mon", "tue", "wed", "thu", "fri"]
years_ahead = 2
holidays_file = "holidays.toml"

[cascade]
# Recompute manually positioned tasks without asking
override_pinned = false
# Pin a moved task that has predecessors
pin_moved_task = true
"#;

const DEFAULT_HOLIDAYS: &str = r#"# Public holidays
#
# [[holiday]]
# date = "2025-01-27"
# name = "Australia Day"
# regions = []          # empty: every region
"#;

const GITIGNORE: &str = r#"# Store lock and interrupted writes
tasks.jsonl.lock
*.tmp
"#;

/// A cascade project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(".cascade").is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a new project at the given path
    ///
    /// Existing files are left alone, so running it twice is harmless.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let cascade_dir = root.join(".cascade");

        fs::create_dir_all(&cascade_dir).with_context(|| {
            format!("Failed to create .cascade directory: {}", cascade_dir.display())
        })?;

        for (name, content) in [
            ("config.toml", DEFAULT_CONFIG),
            ("holidays.toml", DEFAULT_HOLIDAYS),
            (".gitignore", GITIGNORE),
        ] {
            let path = cascade_dir.join(name);
            if !path.exists() {
                fs::write(&path, content)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }

        Self::open(root)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .cascade directory path
    pub fn cascade_dir(&self) -> PathBuf {
        self.root.join(".cascade")
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the task store
    pub fn task_store(&self) -> TaskStore {
        TaskStore::for_project(&self.root)
    }

    /// Returns the configured holiday file
    pub fn holiday_source(&self) -> HolidaySource {
        HolidaySource::new(self.cascade_dir().join(&self.config.project.calendar.holidays_file))
    }

    /// Builds the dependency graph from the stored tasks
    pub fn load_graph(&self) -> Result<DependencyGraph> {
        let tasks = self.task_store().read_all()?;
        DependencyGraph::from_tasks(tasks.into_values()).context("Stored schedule is invalid")
    }

    /// Holiday years to load: the configured window from this year, widened
    /// to every year the schedule touches
    pub fn holiday_years(&self, graph: &DependencyGraph) -> RangeInclusive<i32> {
        let this_year = Local::now().date_naive().year();
        let ahead = i32::try_from(self.config.project.calendar.years_ahead).unwrap_or(i32::MAX);
        let mut first = this_year;
        let mut last = this_year.saturating_add(ahead);

        for task in graph.tasks() {
            let year = task.start_date.year();
            first = first.min(year);
            // Long tasks can end the following year
            last = last.max(year.saturating_add(1));
        }

        first..=last
    }

    /// Loads the business calendar for a schedule
    ///
    /// A missing or unreadable holiday file degrades to weekends only.
    pub fn load_calendar(&self, graph: &DependencyGraph) -> Result<Calendar> {
        self.load_calendar_covering(graph, &[])
    }

    /// Loads the business calendar, also covering the years of `dates`
    pub fn load_calendar_covering(
        &self,
        graph: &DependencyGraph,
        dates: &[NaiveDate],
    ) -> Result<Calendar> {
        let week = self
            .config
            .project
            .calendar
            .work_week()
            .context("Invalid [calendar] working_days")?;
        let region = self.config.region();
        let window = self.holiday_years(graph);
        let first = dates.iter().map(|d| d.year()).fold(*window.start(), i32::min);
        let last = dates
            .iter()
            .map(|d| d.year().saturating_add(1))
            .fold(*window.end(), i32::max);
        let years = first..=last;
        debug!("Calendar region {} for years {:?}", region, years);

        Ok(Calendar::load(week, &self.holiday_source(), &region, years))
    }

    /// Opens a scheduling session over the current schedule
    pub fn scheduler(&self) -> Result<Scheduler> {
        let graph = self.load_graph()?;
        self.open_scheduler(graph, &[])
    }

    /// Opens a session whose calendar also covers the dates `trigger` reaches
    pub fn scheduler_for(&self, trigger: &Trigger) -> Result<Scheduler> {
        let graph = self.load_graph()?;
        let dates = trigger_dates(&graph, trigger);
        self.open_scheduler(graph, &dates)
    }

    fn open_scheduler(&self, graph: DependencyGraph, dates: &[NaiveDate]) -> Result<Scheduler> {
        let calendar = self.load_calendar_covering(&graph, dates)?;
        let mut scheduler = Scheduler::new(graph, calendar)
            .with_settings(self.config.project.cascade.settings());
        scheduler.add_observer(Box::new(LogObserver));
        Ok(scheduler)
    }
}

/// Dates a move can carry the schedule to: the new start, and every
/// descendant shifted by the same number of calendar days
fn trigger_dates(graph: &DependencyGraph, trigger: &Trigger) -> Vec<NaiveDate> {
    let Trigger::Move { task, new_start } = *trigger else {
        return Vec::new();
    };
    let Some(moved) = graph.task(&task) else {
        return vec![new_start];
    };

    let delta = new_start.signed_duration_since(moved.start_date);
    let shifted = graph
        .descendants(&task)
        .into_iter()
        .filter_map(|(id, _)| graph.task(&id))
        .filter_map(|t| t.start_date.checked_add_signed(delta));

    std::iter::once(new_start).chain(shifted).collect()
}
