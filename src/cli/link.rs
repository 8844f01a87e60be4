//! Dependency link commands

use anyhow::{bail, Result};
use clap::Subcommand;

use super::output::Output;
use crate::domain::{DependencyLink, Predecessor, TaskId};
use crate::storage::Project;

#[derive(Subcommand)]
pub enum LinkCommands {
    /// Make a task depend on another
    ///
    /// Examples:
    ///   cascade link add 4 2FS+3     # 4 starts 3 business days after 2 ends
    ///   cascade link add 5 3SS       # 5 starts with 3
    Add {
        /// Dependent (successor) task ID
        successor: String,

        /// Predecessor link, e.g. 2FS+3, 5SS-2, 4FF or 7
        spec: String,
    },

    /// Remove a dependency
    Remove {
        /// Dependent (successor) task ID
        successor: String,

        /// Predecessor task ID
        predecessor: String,
    },
}

pub fn run(cmd: LinkCommands, output: &Output) -> Result<()> {
    match cmd {
        LinkCommands::Add { successor, spec } => add_link(output, &successor, &spec),
        LinkCommands::Remove {
            successor,
            predecessor,
        } => remove_link(output, &successor, &predecessor),
    }
}

fn add_link(output: &Output, successor_str: &str, spec: &str) -> Result<()> {
    let project = Project::open_current()?;
    let successor: TaskId = successor_str.parse()?;
    let pred: Predecessor = spec.parse()?;
    let link = DependencyLink::from_predecessor(successor, &pred);

    // Rejects unknown tasks, duplicates and cycles before anything is written
    let mut graph = project.load_graph()?;
    graph.add_link(link)?;

    project.task_store().modify(&successor, |task| {
        task.add_predecessor(pred);
        Ok(())
    })?;

    if output.is_json() {
        output.data(&serde_json::json!({
            "successor": successor,
            "predecessor": pred,
        }));
    } else {
        output.success(&format!("Linked {} after {}", successor, pred));
    }

    Ok(())
}

fn remove_link(output: &Output, successor_str: &str, predecessor_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let successor: TaskId = successor_str.parse()?;
    let predecessor: TaskId = predecessor_str.parse()?;

    let removed = project
        .task_store()
        .modify(&successor, |task| Ok(task.remove_predecessor(&predecessor)))?;

    if !removed {
        bail!("Task {} does not depend on {}", successor, predecessor);
    }

    if output.is_json() {
        output.data(&serde_json::json!({
            "successor": successor,
            "removed": predecessor,
        }));
    } else {
        output.success(&format!("Removed link {} -> {}", predecessor, successor));
    }

    Ok(())
}
