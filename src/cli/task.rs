//! Task CLI commands

use anyhow::{anyhow, bail, Result};
use clap::Subcommand;

use super::cascade_cmd::{self, parse_date, ReviewArgs};
use super::output::Output;
use crate::domain::{
    CascadeResolver, LockFlag, LockPolicy, Mutability, Predecessor, Task, TaskId, Trigger,
};
use crate::storage::Project;

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Add a task to the schedule
    ///
    /// Examples:
    ///   cascade task add "Pour slab" --start 2025-03-03 --duration 2
    ///   cascade task add "Frame walls" --start 2025-03-05 --duration 5 --after 1FS+2
    Add {
        /// Task name
        name: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Duration in business days
        #[arg(long, default_value_t = 1)]
        duration: u32,

        /// Predecessor link, e.g. 2FS+3, 5SS-2, 4FF or 7 (repeatable)
        #[arg(long = "after", value_name = "SPEC")]
        after: Vec<String>,
    },

    /// List tasks
    List,

    /// Show task details
    Show {
        /// Task ID
        id: String,
    },

    /// Set a lock on a task
    Lock {
        /// Task ID
        id: String,

        /// supplier_confirmed, confirmed, started or completed
        flag: String,
    },

    /// Clear a lock; a task left free is recomputed from its predecessors
    Unlock {
        /// Task ID
        id: String,

        /// supplier_confirmed, confirmed, started or completed
        flag: String,

        #[command(flatten)]
        review: ReviewArgs,
    },

    /// Pin a task's date so cascades leave it alone
    Pin {
        /// Task ID
        id: String,
    },

    /// Unpin a task and recompute it from its predecessors
    Unpin {
        /// Task ID
        id: String,

        #[command(flatten)]
        review: ReviewArgs,
    },
}

pub fn run(cmd: TaskCommands, output: &Output) -> Result<()> {
    match cmd {
        TaskCommands::Add {
            name,
            start,
            duration,
            after,
        } => add_task(output, &name, &start, duration, &after),
        TaskCommands::List => list_tasks(output),
        TaskCommands::Show { id } => show_task(output, &id),
        TaskCommands::Lock { id, flag } => set_lock(output, &id, &flag),
        TaskCommands::Unlock { id, flag, review } => clear_lock(output, &id, &flag, &review),
        TaskCommands::Pin { id } => pin_task(output, &id),
        TaskCommands::Unpin { id, review } => unpin_task(output, &id, &review),
    }
}

fn parse_flag(s: &str) -> Result<LockFlag> {
    s.parse().map_err(|e: String| anyhow!(e))
}

fn lock_label(mutability: Mutability) -> &'static str {
    match mutability {
        Mutability::Free => "free",
        Mutability::ManuallyPositioned => "pinned",
        Mutability::Locked(reason) => reason.label(),
    }
}

fn add_task(output: &Output, name: &str, start: &str, duration: u32, after: &[String]) -> Result<()> {
    let project = Project::open_current()?;
    let store = project.task_store();
    let start_date = parse_date(start)?;

    let mut graph = project.load_graph()?;
    let task_id = graph.next_task_id();

    let mut task = Task::new(task_id, name, start_date, duration);
    for spec in after {
        let pred: Predecessor = spec.parse()?;
        if !task.add_predecessor(pred) {
            bail!("Task {} is listed as a predecessor more than once", pred.task);
        }
    }

    // Validates every link before anything is stored
    graph.add_task(task.clone())?;
    store.upsert(&task)?;
    output.verbose_ctx("task", &format!("Stored task {} in {}", task.id, store.path().display()));

    if output.is_json() {
        output.data(&task);
    } else {
        output.success(&format!("Created task {}: {}", task.id, task.name));
    }

    Ok(())
}

fn list_tasks(output: &Output) -> Result<()> {
    let project = Project::open_current()?;
    let scheduler = project.scheduler()?;
    let graph = scheduler.graph();
    let calendar = scheduler.calendar();
    let policy = LockPolicy::new();

    let mut tasks: Vec<&Task> = graph.tasks().collect();
    tasks.sort_by_key(|t| t.id);

    if output.is_json() {
        let items: Vec<_> = tasks
            .iter()
            .map(|t| {
                serde_json::json!({
                    "id": t.id,
                    "name": t.name,
                    "start_date": t.start_date,
                    "end_date": calendar.add_business_days(t.start_date, i64::from(t.duration)),
                    "duration": t.duration,
                    "lock": policy.classify(t).reason(),
                    "predecessors": t.predecessors,
                })
            })
            .collect();
        output.data(&items);
    } else if tasks.is_empty() {
        println!("No tasks");
    } else {
        println!(
            "{:<5} {:<24} {:<10} {:<10} {:>4}  {:<20} AFTER",
            "ID", "NAME", "START", "END", "DAYS", "LOCK"
        );
        println!("{}", "-".repeat(90));

        for task in tasks {
            let end = calendar.add_business_days(task.start_date, i64::from(task.duration));
            println!(
                "{:<5} {:<24} {:<10} {:<10} {:>4}  {:<20} {}",
                task.id,
                task.name,
                task.start_date,
                end,
                task.duration,
                lock_label(policy.classify(task)),
                task.predecessors.display()
            );
        }
    }

    Ok(())
}

fn show_task(output: &Output, id_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let scheduler = project.scheduler()?;
    let graph = scheduler.graph();
    let calendar = scheduler.calendar();

    let id: TaskId = id_str.parse()?;
    let task = graph
        .task(&id)
        .ok_or_else(|| anyhow!("Task not found: {}", id))?;

    let end = calendar.add_business_days(task.start_date, i64::from(task.duration));
    let policy = LockPolicy::new();
    let mutability = policy.classify(task);
    let computed = CascadeResolver::new(graph, calendar).computed_start(&id)?;
    let successors: Vec<TaskId> = graph
        .successors_of(&id)
        .into_iter()
        .map(|(_, t)| t.id)
        .collect();

    if output.is_json() {
        output.data(&serde_json::json!({
            "task": task,
            "end_date": end,
            "lock": mutability.reason(),
            "unlockable": mutability.reason().map(|_| policy.is_unlockable(task)),
            "computed_start": computed,
            "successors": successors,
        }));
        return Ok(());
    }

    println!("Task: {}", task.id);
    println!("Name: {}", task.name);
    println!("Start: {}", task.start_date);
    println!("End: {}", end);
    println!("Duration: {} business day(s)", task.duration);
    println!("Lock: {}", lock_label(mutability));

    if let Some(date) = computed {
        if date != task.start_date {
            println!("Links require: {}", date);
        }
    }

    println!("\nAfter: {}", task.predecessors.display());
    if !successors.is_empty() {
        let ids: Vec<String> = successors.iter().map(|s| s.to_string()).collect();
        println!("Before: {}", ids.join(", "));
    }

    Ok(())
}

fn set_lock(output: &Output, id_str: &str, flag_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let id: TaskId = id_str.parse()?;
    let flag = parse_flag(flag_str)?;

    let changed = project
        .task_store()
        .modify(&id, |task| Ok(task.locks.set(flag, true)))?;

    if changed {
        output.success(&format!("Locked task {} ({})", id, flag));
    } else {
        output.success(&format!("Task {} was already {}", id, flag));
    }

    Ok(())
}

fn clear_lock(output: &Output, id_str: &str, flag_str: &str, review: &ReviewArgs) -> Result<()> {
    let project = Project::open_current()?;
    let id: TaskId = id_str.parse()?;
    let flag = parse_flag(flag_str)?;

    let task = project.task_store().modify(&id, |task| {
        task.locks.set(flag, false);
        Ok(task.clone())
    })?;

    match LockPolicy::new().classify(&task) {
        Mutability::Locked(reason) => {
            output.success(&format!("Cleared {} on task {}; still locked ({})", flag, id, reason));
            Ok(())
        }
        Mutability::ManuallyPositioned => {
            output.success(&format!(
                "Cleared {} on task {}; still pinned at {}",
                flag, id, task.start_date
            ));
            output.hint(&format!("Run `cascade task unpin {}` to recompute it from its links.", id));
            Ok(())
        }
        Mutability::Free => {
            output.verbose_ctx("unlock", &format!("Cleared {} on task {}", flag, id));
            cascade_cmd::run_trigger(output, &project, Trigger::Unlock { task: id }, review)
        }
    }
}

fn pin_task(output: &Output, id_str: &str) -> Result<()> {
    let project = Project::open_current()?;
    let id: TaskId = id_str.parse()?;

    project.task_store().modify(&id, |task| {
        task.manually_positioned = true;
        Ok(())
    })?;

    output.success(&format!("Pinned task {}", id));
    Ok(())
}

fn unpin_task(output: &Output, id_str: &str, review: &ReviewArgs) -> Result<()> {
    let project = Project::open_current()?;
    let id: TaskId = id_str.parse()?;

    let task = project.task_store().modify(&id, |task| {
        task.manually_positioned = false;
        Ok(task.clone())
    })?;

    if let Mutability::Locked(reason) = LockPolicy::new().classify(&task) {
        output.success(&format!("Unpinned task {}; still locked ({})", id, reason));
        return Ok(());
    }

    cascade_cmd::run_trigger(output, &project, Trigger::Unpin { task: id }, review)
}
