//! Command output
//!
//! Plans, task details and calendar answers print as text for people, or as
//! one JSON document per command under `--format json`. Verbose traces go
//! to stderr so they never mix with either.

use serde::Serialize;

/// Selected with `--format`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Renders command results in the selected format
pub struct Output {
    format: OutputFormat,
    verbose: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    /// Reports a finished change, such as a commit or a cleared lock
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Text => println!("{}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "message": message
                    })
                );
            }
        }
    }

    /// Emits a command's result document: a plan, a task, a calendar answer
    pub fn data<T: Serialize>(&self, data: &T) {
        match self.format {
            OutputFormat::Text => {
                // Commands render their own text; only unformatted results land here
                if let Ok(json) = serde_json::to_string_pretty(data) {
                    println!("{}", json);
                }
            }
            OutputFormat::Json => {
                if let Ok(json) = serde_json::to_string(data) {
                    println!("{}", json);
                }
            }
        }
    }

    /// Suggests the next command, e.g. `--commit` after a preview
    ///
    /// Text only: JSON results carry `committable` and `committed` instead.
    pub fn hint(&self, message: &str) {
        if self.format == OutputFormat::Text {
            println!("{}", message);
        }
    }

    /// Returns true when results go to scripts rather than people
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Traces a step to stderr under `--verbose`
    pub fn verbose(&self, message: &str) {
        if self.verbose {
            eprintln!("[verbose] {}", message);
        }
    }

    /// Traces a step tagged with its area (`cascade`, `task`, `unlock`)
    pub fn verbose_ctx(&self, context: &str, message: &str) {
        if self.verbose {
            eprintln!("[verbose:{}] {}", context, message);
        }
    }
}
