//! Configuration handling for cascade
//!
//! Configuration is stored in `.cascade/config.toml` (project) and
//! `config.toml` in the platform config directory (global, e.g.
//! `~/.config/cascade-cli/` on Linux).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Region, SchedulerSettings, WorkWeek};

/// Timezone used when neither project nor global config names one
pub const DEFAULT_TIMEZONE: &str = "Australia/Brisbane";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Business calendar settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// IANA timezone; selects the holiday region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Explicit holiday region, overriding the timezone mapping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Weekday names worked on site
    pub working_days: Vec<String>,

    /// Years of holidays to load beyond the current one
    pub years_ahead: u32,

    /// Holiday file, relative to `.cascade/`
    pub holidays_file: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: None,
            region: None,
            working_days: ["mon", "tue", "wed", "thu", "fri"]
                .into_iter()
                .map(String::from)
                .collect(),
            years_ahead: 2,
            holidays_file: "holidays.toml".to_string(),
        }
    }
}

impl CalendarConfig {
    pub fn work_week(&self) -> Result<WorkWeek, ConfigError> {
        WorkWeek::from_names(&self.working_days).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Cascade behaviour settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Recompute manually positioned tasks without asking
    pub override_pinned: bool,

    /// Pin a moved task that has predecessors
    pub pin_moved_task: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        let settings = SchedulerSettings::default();
        Self {
            override_pinned: settings.override_pinned,
            pin_moved_task: settings.pin_moved_task,
        }
    }
}

impl CascadeConfig {
    pub fn settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            override_pinned: self.override_pinned,
            pin_moved_task: self.pin_moved_task,
        }
    }
}

/// Project-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub calendar: CalendarConfig,
    pub cascade: CascadeConfig,
}

/// Global user configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Timezone for projects that do not set one
    pub timezone: Option<String>,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration for a specific project
    pub fn for_project(project_root: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(project_root)?;

        Ok(Self {
            project,
            global,
            project_root: Some(project_root.to_path_buf()),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "cascade", "cascade-cli")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads global configuration
    fn load_global() -> Result<GlobalConfig> {
        let config_dir = match Self::global_config_dir() {
            Some(dir) => dir,
            None => return Ok(GlobalConfig::default()),
        };

        let config_path = config_dir.join("config.toml");
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    /// Loads project configuration from a specific root
    fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
        let config_path = project_root.join(".cascade").join("config.toml");

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")
    }

    /// Finds the project root by looking for a `.cascade/` directory
    pub fn find_project_root() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;

        loop {
            if current.join(".cascade").is_dir() {
                return Some(current);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Timezone from the project, then the global config, then the default
    pub fn timezone(&self) -> &str {
        self.project
            .calendar
            .timezone
            .as_deref()
            .or(self.global.timezone.as_deref())
            .unwrap_or(DEFAULT_TIMEZONE)
    }

    /// Holiday region: the explicit override, else mapped from the timezone
    pub fn region(&self) -> Region {
        match &self.project.calendar.region {
            Some(code) => Region::new(code.as_str()),
            None => Region::from_timezone(self.timezone()),
        }
    }

    /// Saves the project configuration
    pub fn save_project(&self) -> Result<()> {
        let root = self
            .project_root
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Not in a cascade project. Run 'cascade init' first."))?;
        let config_path = root.join(".cascade").join("config.toml");

        let content =
            toml::to_string_pretty(&self.project).context("Failed to serialize project config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write project config: {}", config_path.display()))
    }
}
