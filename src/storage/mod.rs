//! # Storage Layer
//!
//! Persistence layer for cascade with git-friendly file formats.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Tasks | JSONL (one JSON per line) | `.cascade/tasks.jsonl` |
//! | Config | TOML | `.cascade/config.toml` |
//! | Holidays | TOML | `.cascade/holidays.toml` |
//!
//! ## Concurrency Safety
//!
//! - [`TaskStore`] uses file locking (`fs2`) for concurrent access
//! - Commits compare a snapshot fingerprint under the write lock
//! - All writes are atomic (temp file + rename)
//!
//! ## Key Types
//!
//! - [`Project`] - Entry point for accessing a cascade project
//! - [`TaskStore`] - Read/write tasks as JSONL
//! - [`HolidaySource`] - Holiday provider backed by a TOML file
//! - [`Config`] - Project and global configuration

mod config;
mod holidays;
mod jsonl;
mod project;

pub use config::{CalendarConfig, CascadeConfig, Config, ConfigError, ProjectConfig};
pub use holidays::{Holiday, HolidayFile, HolidaySource};
pub use jsonl::TaskStore;
pub use project::{Project, ProjectError};
