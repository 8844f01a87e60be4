//! Cascade commands: move, resize, and the shared preview/commit flow

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;

use super::output::Output;
use crate::domain::{
    CascadeOptions, CascadePlan, Decision, Direction, PlanEntry, Scheduler, TaskId, Trigger,
    Zone, ZoneBoard, ZoneCard,
};
use crate::storage::Project;

/// Review choices applied before a cascade is shown or committed
#[derive(Args, Debug, Default, Clone)]
pub struct ReviewArgs {
    /// Keep a task in place, ignoring its dependency for this change
    #[arg(long = "break", value_name = "ID")]
    pub breaks: Vec<String>,

    /// Let a locked task move with the cascade
    #[arg(long = "unlock", value_name = "ID")]
    pub unlocks: Vec<String>,

    /// Recompute manually positioned tasks as well
    #[arg(long)]
    pub override_pinned: bool,

    /// Write the changes (default: preview only)
    #[arg(long)]
    pub commit: bool,
}

impl ReviewArgs {
    fn decisions(&self) -> Result<Vec<(TaskId, Decision)>> {
        let breaks = self.breaks.iter().map(|id| (id, Decision::Break));
        let unlocks = self.unlocks.iter().map(|id| (id, Decision::Unlock));

        breaks
            .chain(unlocks)
            .map(|(id, decision)| -> Result<(TaskId, Decision)> {
                let task: TaskId = id.parse()?;
                Ok((task, decision))
            })
            .collect()
    }
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}': expected YYYY-MM-DD", s))
}

pub fn move_task(output: &Output, id_str: &str, date_str: &str, args: &ReviewArgs) -> Result<()> {
    let task: TaskId = id_str.parse()?;
    let new_start = parse_date(date_str)?;
    let project = Project::open_current()?;
    run_trigger(output, &project, Trigger::Move { task, new_start }, args)
}

pub fn resize_task(output: &Output, id_str: &str, duration: u32, args: &ReviewArgs) -> Result<()> {
    let task: TaskId = id_str.parse()?;
    let project = Project::open_current()?;
    run_trigger(
        output,
        &project,
        Trigger::Resize {
            task,
            new_duration: duration,
        },
        args,
    )
}

/// Resolves a trigger, applies review flags, then previews or commits
pub(crate) fn run_trigger(
    output: &Output,
    project: &Project,
    trigger: Trigger,
    args: &ReviewArgs,
) -> Result<()> {
    let mut scheduler = project.scheduler_for(&trigger)?;
    let options = CascadeOptions::new()
        .override_pinned(args.override_pinned || scheduler.settings().override_pinned);

    let plan = scheduler.preview(trigger, &options)?;
    output.verbose_ctx(
        "cascade",
        &format!("Resolved {} entries from snapshot {}", plan.entries.len(), plan.snapshot),
    );

    let decisions = args.decisions()?;
    let plan = if decisions.is_empty() {
        plan
    } else {
        scheduler.review(&plan, decisions)?
    };

    let board = scheduler.board(&plan);

    if !args.commit {
        report(output, &scheduler, &plan, &board, None);
        return Ok(());
    }

    if !output.is_json() {
        print_plan(&plan, &board);
    }

    let mut store = project.task_store();
    let applied = scheduler.commit(&plan, &mut store)?;
    report_commit(output, &scheduler, &plan, &board, &applied);
    Ok(())
}

fn report(
    output: &Output,
    scheduler: &Scheduler,
    plan: &CascadePlan,
    board: &ZoneBoard,
    applied: Option<&[TaskId]>,
) {
    if output.is_json() {
        output.data(&serde_json::json!({
            "plan": plan,
            "summary": plan.summary(),
            "board": board,
            "updates": scheduler.updates_for(plan),
            "committable": board.is_committable(),
            "committed": applied.is_some(),
            "applied": applied.unwrap_or_default(),
        }));
        return;
    }

    print_plan(plan, board);
    println!();
    if plan.is_empty() {
        output.hint("Nothing to change.");
    } else if !board.is_committable() {
        output.hint("Resolve conflicts before committing: --break <id> or --unlock <id>");
    } else {
        output.hint("Preview only; re-run with --commit to apply.");
    }
}

fn report_commit(
    output: &Output,
    scheduler: &Scheduler,
    plan: &CascadePlan,
    board: &ZoneBoard,
    applied: &[TaskId],
) {
    if output.is_json() {
        report(output, scheduler, plan, board, Some(applied));
        return;
    }

    println!();
    if applied.is_empty() {
        output.success("Nothing to change.");
    } else {
        let ids: Vec<String> = applied.iter().map(|id| id.to_string()).collect();
        output.success(&format!(
            "Committed: {} task(s) updated ({})",
            applied.len(),
            ids.join(", ")
        ));
    }
}

fn print_plan(plan: &CascadePlan, board: &ZoneBoard) {
    let root = &plan.root;
    match plan.trigger {
        Trigger::Move { .. } => println!(
            "Move task {} ({}): {} -> {}",
            root.task_id, root.name, root.old_start, root.new_start
        ),
        Trigger::Resize { .. } => println!(
            "Resize task {} ({}): {} -> {} days",
            root.task_id, root.name, root.old_duration, root.new_duration
        ),
        Trigger::Unlock { .. } | Trigger::Unpin { .. } => println!(
            "Recompute task {} ({}): {} -> {}",
            root.task_id, root.name, root.old_start, root.new_start
        ),
    }
    println!("  ends {} -> {}", root.old_end, root.new_end);

    let summary = plan.summary();
    match summary.direction {
        Direction::Forward => println!("  forward {} business day(s)", summary.days_moved),
        Direction::Backward => println!("  backward {} business day(s)", summary.days_moved),
        Direction::None => {}
    }

    for zone in [Zone::Cascade, Zone::Break, Zone::Locked] {
        let column = board.column(zone);
        println!();
        println!("{} ({})", zone.label().to_uppercase(), column.len());
        for card in column {
            print_card(plan, card);
        }
    }

    if !plan.held_back.is_empty() {
        println!();
        let held: Vec<String> = plan
            .held_back
            .iter()
            .map(|h| format!("{} (behind {})", h.task_id, h.held_by))
            .collect();
        println!("Held back: {}", held.join(", "));
    }

    println!();
    println!(
        "Summary: {} cascade, {} break, {} locked ({} unlockable)",
        summary.will_cascade, summary.will_break, summary.locked, summary.unlockable
    );
}

fn print_card(plan: &CascadePlan, card: &ZoneCard) {
    println!("  {}", describe_entry(&card.entry));

    for linked in &card.linked {
        match plan.entry(&linked.task_id) {
            Some(entry) => println!("    > {} [{}]", describe_entry(entry), linked.zone.label()),
            None => println!("    > {} {} [{}]", linked.task_id, linked.name, linked.zone.label()),
        }
    }
    for conflict in &card.conflicts {
        let locked: Vec<String> = conflict
            .locked_descendants
            .iter()
            .map(|t| t.to_string())
            .collect();
        println!(
            "      conflict: {} would move locked {}",
            conflict.task,
            locked.join(", ")
        );
    }
}

fn describe_entry(entry: &PlanEntry) -> String {
    let head = format!("{:<5} {:<24}", entry.task_id, entry.name);
    match entry.zone {
        Zone::Cascade => format!(
            "{} {} -> {} ({:+})",
            head, entry.current_start, entry.proposed_start, entry.shift
        ),
        Zone::Break => format!(
            "{} stays {} (needs {})",
            head, entry.current_start, entry.required_start
        ),
        Zone::Locked => {
            let reason = entry
                .lock_reason
                .map(|r| r.label())
                .unwrap_or("locked");
            let unlockable = if entry.is_unlockable() {
                ", unlockable"
            } else {
                ""
            };
            format!(
                "{} stays {} (needs {}) {}{}",
                head, entry.current_start, entry.required_start, reason, unlockable
            )
        }
    }
}
