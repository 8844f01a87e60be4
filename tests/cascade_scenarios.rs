//! Library-level cascade scenarios
//!
//! Exercises the scheduling engine through its public API only: calendars,
//! graphs, plans, review and commit.

use std::collections::BTreeSet;

use cascade_cli::domain::{
    Calendar, CascadeResolver, CommitError, Decision, DependencyGraph, DependencyLink,
    GraphError, LinkKind, LockFlag, Predecessor, ScheduleWriter, Scheduler, SnapshotId, Task,
    TaskId, TaskUpdate, WorkWeek, WriteError, Zone,
};
use chrono::NaiveDate;
use proptest::prelude::*;

fn date(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, m, d).unwrap()
}

fn id(n: u32) -> TaskId {
    TaskId::new(n).unwrap()
}

fn task(n: u32, start: NaiveDate, duration: u32) -> Task {
    Task::new(id(n), format!("Task {}", n), start, duration)
}

fn after(mut task: Task, pred: u32, kind: LinkKind, lag: i64) -> Task {
    task.add_predecessor(Predecessor::new(id(pred), kind, lag));
    task
}

/// Keeps the last write
#[derive(Default)]
struct Recorder {
    written: Vec<TaskUpdate>,
}

impl ScheduleWriter for Recorder {
    fn write_updates(&mut self, _snapshot: &SnapshotId, updates: &[TaskUpdate]) -> Result<(), WriteError> {
        self.written = updates.to_vec();
        Ok(())
    }
}

// =============================================================================
// Calendar
// =============================================================================

#[test]
fn holiday_is_skipped_by_business_day_arithmetic() {
    let holidays: BTreeSet<NaiveDate> = [date(1, 8)].into_iter().collect();
    let calendar = Calendar::new(WorkWeek::default(), holidays);

    assert_eq!(calendar.add_business_days(date(1, 7), 1), date(1, 9));
    assert_eq!(calendar.add_business_days(date(1, 9), -1), date(1, 7));
    // Shifting by zero never snaps
    assert_eq!(calendar.add_business_days(date(1, 8), 0), date(1, 8));
}

// =============================================================================
// Graph
// =============================================================================

#[test]
fn reverse_link_is_rejected_without_mutation() {
    let mut graph = DependencyGraph::new();
    graph.add_task(task(1, date(1, 6), 1)).unwrap();
    graph.add_task(task(2, date(1, 7), 1)).unwrap();

    graph
        .add_link(DependencyLink::new(id(1), id(2), LinkKind::FinishToStart, 0))
        .unwrap();
    let err = graph
        .add_link(DependencyLink::new(id(2), id(1), LinkKind::FinishToStart, 0))
        .unwrap_err();

    assert!(matches!(err, GraphError::CycleDetected { .. }));
    let after_a: Vec<TaskId> = graph.successors_of(&id(1)).into_iter().map(|(_, t)| t.id).collect();
    assert_eq!(after_a, vec![id(2)]);
    assert!(graph.successors_of(&id(2)).is_empty());
    assert!(graph.task(&id(1)).unwrap().predecessors.is_empty());
}

// =============================================================================
// Cascade
// =============================================================================

/// A (3 days) -FS-> B (2 days) -FS+2-> C (locked by `lock`)
fn locked_chain(lock: LockFlag) -> Scheduler {
    let a = task(1, date(1, 6), 3);
    let b = after(task(2, date(1, 9), 2), 1, LinkKind::FinishToStart, 0);
    let mut c = after(task(3, date(1, 15), 2), 2, LinkKind::FinishToStart, 2);
    c.locks.set(lock, true);

    let graph = DependencyGraph::from_tasks([a, b, c]).unwrap();
    Scheduler::new(graph, Calendar::weekends_only())
}

#[test]
fn locked_descendant_blocks_commit_until_rerouted() {
    let mut scheduler = locked_chain(LockFlag::Started);

    // Five business days forward
    let plan = scheduler.preview_cascade(id(1), date(1, 13)).unwrap();
    let b = plan.entry(&id(2)).unwrap();
    assert_eq!(b.zone, Zone::Cascade);
    assert_eq!(b.proposed_start, date(1, 16));
    assert_eq!(b.shift, 5);

    let c = plan.entry(&id(3)).unwrap();
    assert_eq!(c.zone, Zone::Locked);
    // Work on site keeps its dates
    assert!(!c.is_unlockable());
    assert!(scheduler.review(&plan, [(id(3), Decision::Unlock)]).is_err());

    let conflicts = scheduler.conflicts(&plan);
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].task, id(2));
    assert!(!scheduler.board(&plan).is_committable());

    let mut store = Recorder::default();
    assert!(matches!(
        scheduler.commit(&plan, &mut store),
        Err(CommitError::LockedTaskConflict(_))
    ));
    assert!(store.written.is_empty());

    // Re-route B
    let broken = scheduler.review(&plan, [(id(2), Decision::Break)]).unwrap();
    assert_eq!(broken.zone_of(&id(2)), Some(Zone::Break));
    assert!(scheduler.conflicts(&broken).is_empty());
    let written = scheduler.commit(&broken, &mut store).unwrap();
    assert_eq!(written, vec![id(1)]);
    assert_eq!(scheduler.graph().task(&id(2)).unwrap().start_date, date(1, 9));
}

#[test]
fn unlocking_the_descendant_lets_it_follow() {
    let mut scheduler = locked_chain(LockFlag::Confirmed);
    let plan = scheduler.preview_cascade(id(1), date(1, 13)).unwrap();

    let unlocked = scheduler.review(&plan, [(id(3), Decision::Unlock)]).unwrap();
    let c = unlocked.entry(&id(3)).unwrap();
    assert_eq!(c.zone, Zone::Cascade);
    assert_eq!(c.proposed_start, date(1, 22));

    let mut store = Recorder::default();
    scheduler.commit(&unlocked, &mut store).unwrap();
    assert_eq!(store.written.len(), 3);
    let c = scheduler.graph().task(&id(3)).unwrap();
    assert_eq!(c.start_date, date(1, 22));
    assert!(!c.locks.confirmed);
    assert!(!store.written[2].locks.any());
}

#[test]
fn diamond_takes_latest_requirement_once() {
    // R -> A -> D and R -FS+2-> X -> D
    let r = task(1, date(1, 6), 1);
    let a = after(task(2, date(1, 7), 1), 1, LinkKind::FinishToStart, 0);
    let x = after(task(3, date(1, 9), 2), 1, LinkKind::FinishToStart, 2);
    let d = after(
        after(task(4, date(1, 13), 1), 2, LinkKind::FinishToStart, 0),
        3,
        LinkKind::FinishToStart,
        0,
    );

    let graph = DependencyGraph::from_tasks([r, a, x, d]).unwrap();
    let scheduler = Scheduler::new(graph, Calendar::weekends_only());

    let plan = scheduler.preview_cascade(id(1), date(1, 7)).unwrap();
    let entries: Vec<_> = plan.entries.iter().filter(|e| e.task_id == id(4)).collect();
    assert_eq!(entries.len(), 1);

    let d = entries[0];
    // A ends Jan 9, X ends Jan 14
    assert_eq!(d.proposed_start, date(1, 14));
    assert_eq!(d.driven_by, vec![id(2), id(3)]);
    assert_eq!(d.depth, 2);
}

#[test]
fn unpinned_recompute_matches_unpinned_formula() {
    let a = task(1, date(1, 6), 3);
    let mut b = after(task(2, date(1, 20), 2), 1, LinkKind::FinishToStart, 1);
    b.manually_positioned = true;

    let mut free_b = b.clone();
    free_b.manually_positioned = false;
    let reference = DependencyGraph::from_tasks([a.clone(), free_b]).unwrap();
    let calendar = Calendar::weekends_only();
    let expected = CascadeResolver::new(&reference, &calendar)
        .computed_start(&id(2))
        .unwrap()
        .unwrap();
    assert_eq!(expected, date(1, 10));

    let graph = DependencyGraph::from_tasks([a, b]).unwrap();
    let mut scheduler = Scheduler::new(graph, calendar);

    let plan = scheduler.unpin_and_recompute(id(2)).unwrap();
    assert_eq!(plan.root.new_start, expected);

    let mut store = Recorder::default();
    scheduler.commit(&plan, &mut store).unwrap();
    let b = scheduler.graph().task(&id(2)).unwrap();
    assert_eq!(b.start_date, expected);
    assert!(!b.manually_positioned);

    // Recomputing again changes nothing
    let again = scheduler.unpin_and_recompute(id(2)).unwrap();
    assert!(again.is_empty());
    assert_eq!(again.root.new_start, expected);
}

#[test]
fn start_to_start_and_finish_links_follow_their_anchor() {
    // 2 starts with 1 (+1); 3 finishes when 1 finishes
    let a = task(1, date(1, 6), 3);
    let b = after(task(2, date(1, 7), 2), 1, LinkKind::StartToStart, 1);
    let c = after(task(3, date(1, 7), 2), 1, LinkKind::FinishToFinish, 0);

    let graph = DependencyGraph::from_tasks([a, b, c]).unwrap();
    let scheduler = Scheduler::new(graph, Calendar::weekends_only());

    let plan = scheduler.preview_cascade(id(1), date(1, 8)).unwrap();
    assert_eq!(plan.entry(&id(2)).unwrap().proposed_start, date(1, 9));
    // 1 now ends Jan 13; 3 keeps 2 days before that finish
    assert_eq!(plan.entry(&id(3)).unwrap().proposed_start, date(1, 9));
}

proptest! {
    #[test]
    fn fs_successor_moves_by_the_same_business_days(
        offset in 0i64..40,
        duration in 1u32..6,
        lag in 0i64..4,
        delta in -15i64..15,
    ) {
        let holidays: BTreeSet<NaiveDate> = [date(1, 27), date(4, 18), date(4, 21)].into_iter().collect();
        let calendar = Calendar::new(WorkWeek::default(), holidays);

        let a_start = calendar.add_business_days(date(2, 3), offset);
        let b_start = calendar.add_business_days(
            calendar.add_business_days(a_start, i64::from(duration)),
            lag,
        );

        let a = task(1, a_start, duration);
        let b = after(task(2, b_start, 2), 1, LinkKind::FinishToStart, lag);
        let graph = DependencyGraph::from_tasks([a, b]).unwrap();
        let scheduler = Scheduler::new(graph, calendar.clone());

        let moved_to = calendar.add_business_days(a_start, delta);
        let plan = scheduler.preview_cascade(id(1), moved_to).unwrap();

        match plan.entry(&id(2)) {
            Some(entry) => {
                prop_assert_eq!(entry.proposed_start, calendar.add_business_days(b_start, delta));
                prop_assert_eq!(entry.shift, delta);
            }
            None => prop_assert_eq!(delta, 0),
        }
    }
}
