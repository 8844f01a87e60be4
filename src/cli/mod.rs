//! # Command-Line Interface
//!
//! User-facing CLI commands and output formatting.
//!
//! ## Command Groups
//!
//! | Group | Purpose | Examples |
//! |-------|---------|----------|
//! | Core | Project setup | `init` |
//! | Task | Schedule entries and locks | `task add`, `task lock`, `task unpin` |
//! | Link | Dependencies | `link add 4 2FS+3`, `link remove 4 2` |
//! | Cascade | Preview and commit changes | `move`, `resize` |
//! | Calendar | Business-day queries | `calendar check`, `calendar add` |
//!
//! ## Output Formats
//!
//! All commands support `--format` flag:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! ## Verbose Mode
//!
//! Use `--verbose` (or `-v`) for debug output:
//! ```bash
//! cascade --verbose move 3 2025-03-10
//! ```
//!
//! ## Entry Point
//!
//! Call [`run()`] to parse arguments and execute the appropriate command.

mod app;
mod calendar_cmd;
mod cascade_cmd;
mod link;
mod output;
mod task;

pub use app::{Cli, Commands, run};
pub use cascade_cmd::ReviewArgs;
pub use output::{Output, OutputFormat};
