//! Main CLI application structure

use anyhow::Result;
use clap::{Parser, Subcommand};

use super::cascade_cmd::{self, ReviewArgs};
use super::output::{Output, OutputFormat};
use super::{calendar_cmd, link, task};
use crate::storage::Project;

#[derive(Parser)]
#[command(name = "cascade")]
#[command(author, version, about = "Dependency cascades and business-day scheduling for construction programmes")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Enable verbose output for debugging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new cascade project
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: String,
    },

    /// Manage tasks
    #[command(subcommand)]
    Task(task::TaskCommands),

    /// Manage dependency links
    #[command(subcommand)]
    Link(link::LinkCommands),

    /// Move a task and preview (or commit) the cascade
    ///
    /// Examples:
    ///   cascade move 3 2025-03-10
    ///   cascade move 3 2025-03-10 --break 5 --commit
    Move {
        /// Task ID
        id: String,

        /// New start date (YYYY-MM-DD)
        date: String,

        #[command(flatten)]
        review: ReviewArgs,
    },

    /// Change a task's duration and preview (or commit) the cascade
    Resize {
        /// Task ID
        id: String,

        /// New duration in business days
        duration: u32,

        #[command(flatten)]
        review: ReviewArgs,
    },

    /// Business calendar queries
    #[command(subcommand)]
    Calendar(calendar_cmd::CalendarCommands),
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    // A logger may already be installed
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .try_init();
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let output = Output::new(cli.format, cli.verbose);

    output.verbose("cascade starting");

    match cli.command {
        Commands::Init { path } => {
            output.verbose_ctx("init", &format!("Initializing project at: {}", path));
            let project = Project::init(&path)?;
            output.verbose_ctx(
                "init",
                &format!("Created .cascade directory at: {}", project.cascade_dir().display()),
            );
            output.success(&format!(
                "Initialized cascade project at {}",
                project.root().display()
            ));
        }

        Commands::Task(cmd) => task::run(cmd, &output)?,
        Commands::Link(cmd) => link::run(cmd, &output)?,

        Commands::Move { id, date, review } => {
            output.verbose_ctx("move", &format!("Moving task {} to {}", id, date));
            cascade_cmd::move_task(&output, &id, &date, &review)?
        }
        Commands::Resize {
            id,
            duration,
            review,
        } => {
            output.verbose_ctx("resize", &format!("Resizing task {} to {} days", id, duration));
            cascade_cmd::resize_task(&output, &id, duration, &review)?
        }

        Commands::Calendar(cmd) => calendar_cmd::run(cmd, &output)?,
    }

    output.verbose("Command completed successfully");
    Ok(())
}
