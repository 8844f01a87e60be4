//! Dependency graph for tasks
//!
//! Holds a snapshot of a schedule: tasks as nodes, typed dependency links as
//! edges. Acyclicity is enforced on insertion. Uses petgraph for graph
//! operations.

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use thiserror::Error;

use super::id::{SnapshotId, TaskId};
use super::task::{LinkError, LinkKind, Predecessor, Task};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Adding dependency would create a cycle: {predecessor} -> {successor}")]
    CycleDetected {
        predecessor: TaskId,
        successor: TaskId,
    },

    #[error("Invalid link: {0}")]
    InvalidLink(#[from] LinkError),

    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("Dependency graph contains a cycle through task {0}")]
    Cyclic(TaskId),
}

/// A typed dependency link between two tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DependencyLink {
    pub predecessor: TaskId,
    pub successor: TaskId,
    pub kind: LinkKind,
    /// Signed business-day offset
    pub lag: i64,
}

impl DependencyLink {
    pub fn new(predecessor: TaskId, successor: TaskId, kind: LinkKind, lag: i64) -> Self {
        Self {
            predecessor,
            successor,
            kind,
            lag,
        }
    }

    /// Builds the link described by a successor's predecessor entry
    pub fn from_predecessor(successor: TaskId, pred: &Predecessor) -> Self {
        Self::new(pred.task, successor, pred.kind, pred.lag)
    }

    /// Returns the entry stored on the successor
    pub fn as_predecessor(&self) -> Predecessor {
        Predecessor::new(self.predecessor, self.kind, self.lag)
    }
}

/// Edge payload; `seq` preserves insertion order across removals
#[derive(Debug, Clone, Copy)]
struct LinkEdge {
    seq: u64,
    kind: LinkKind,
    lag: i64,
}

/// A dependency graph over a schedule's tasks
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// The underlying directed graph (edge: predecessor -> successor)
    graph: DiGraph<Task, LinkEdge>,

    /// Map from TaskId to node index
    node_map: HashMap<TaskId, NodeIndex>,

    /// Next edge sequence number
    next_seq: u64,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Builds a graph from tasks, normalizing their predecessor lists into links
    ///
    /// Tasks are added in the order given; links follow each task's
    /// predecessor order.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        let mut pending = Vec::new();

        // First pass: add all nodes
        for mut task in tasks {
            let preds: Vec<Predecessor> = task.predecessors.iter().copied().collect();
            task.predecessors.clear();
            pending.push((task.id, preds));
            graph.add_task(task)?;
        }

        // Second pass: add all links
        for (successor, preds) in pending {
            for pred in &preds {
                graph.add_link(DependencyLink::from_predecessor(successor, pred))?;
            }
        }

        Ok(graph)
    }

    /// Adds a task to the graph, together with any links already on it
    pub fn add_task(&mut self, mut task: Task) -> Result<(), GraphError> {
        if self.node_map.contains_key(&task.id) {
            return Err(GraphError::DuplicateTask(task.id));
        }

        let preds: Vec<Predecessor> = task.predecessors.iter().copied().collect();
        task.predecessors.clear();

        let id = task.id;
        let idx = self.graph.add_node(task);
        self.node_map.insert(id, idx);

        for pred in &preds {
            if let Err(e) = self.add_link(DependencyLink::from_predecessor(id, pred)) {
                self.graph.remove_node(idx);
                self.rebuild_node_map();
                return Err(e);
            }
        }

        Ok(())
    }

    /// Rebuilds the node map after removal
    fn rebuild_node_map(&mut self) {
        self.node_map.clear();
        for idx in self.graph.node_indices() {
            if let Some(task) = self.graph.node_weight(idx) {
                self.node_map.insert(task.id, idx);
            }
        }
    }

    /// Inserts a dependency link
    ///
    /// Before inserting, checks whether the predecessor is already reachable
    /// from the successor; if so the link would close a cycle and is
    /// rejected without touching the graph.
    pub fn add_link(&mut self, link: DependencyLink) -> Result<(), GraphError> {
        if link.predecessor == link.successor {
            return Err(LinkError::SelfLink(link.successor).into());
        }

        let pred_idx = self.index(&link.predecessor)?;
        let succ_idx = self.index(&link.successor)?;

        if self.graph.find_edge(pred_idx, succ_idx).is_some() {
            return Err(LinkError::Duplicate {
                predecessor: link.predecessor,
                successor: link.successor,
            }
            .into());
        }

        if has_path_connecting(&self.graph, succ_idx, pred_idx, None) {
            return Err(GraphError::CycleDetected {
                predecessor: link.predecessor,
                successor: link.successor,
            });
        }

        let edge = LinkEdge {
            seq: self.next_seq,
            kind: link.kind,
            lag: link.lag,
        };
        self.next_seq += 1;
        self.graph.add_edge(pred_idx, succ_idx, edge);
        self.graph[succ_idx].add_predecessor(link.as_predecessor());

        Ok(())
    }

    /// Removes the link between two tasks
    pub fn remove_link(&mut self, predecessor: &TaskId, successor: &TaskId) -> bool {
        let (Some(&pred_idx), Some(&succ_idx)) =
            (self.node_map.get(predecessor), self.node_map.get(successor))
        else {
            return false;
        };

        match self.graph.find_edge(pred_idx, succ_idx) {
            Some(edge) => {
                self.graph.remove_edge(edge);
                self.graph[succ_idx].remove_predecessor(predecessor);
                true
            }
            None => false,
        }
    }

    fn index(&self, task_id: &TaskId) -> Result<NodeIndex, GraphError> {
        self.node_map
            .get(task_id)
            .copied()
            .ok_or(GraphError::InvalidLink(LinkError::UnknownTask(*task_id)))
    }

    fn links_directed(&self, task_id: &TaskId, direction: Direction) -> Vec<(DependencyLink, &Task)> {
        let Some(&idx) = self.node_map.get(task_id) else {
            return vec![];
        };

        let mut edges: Vec<_> = self.graph.edges_directed(idx, direction).collect();
        edges.sort_by_key(|e| e.weight().seq);

        edges
            .into_iter()
            .map(|e| {
                let pred = &self.graph[e.source()];
                let succ = &self.graph[e.target()];
                let link = DependencyLink::new(pred.id, succ.id, e.weight().kind, e.weight().lag);
                let other = match direction {
                    Direction::Outgoing => succ,
                    Direction::Incoming => pred,
                };
                (link, other)
            })
            .collect()
    }

    /// Returns the outgoing links of a task with their successor tasks,
    /// in link insertion order
    pub fn successors_of(&self, task_id: &TaskId) -> Vec<(DependencyLink, &Task)> {
        self.links_directed(task_id, Direction::Outgoing)
    }

    /// Returns the incoming links of a task with their predecessor tasks,
    /// in link insertion order
    pub fn predecessors_of(&self, task_id: &TaskId) -> Vec<(DependencyLink, &Task)> {
        self.links_directed(task_id, Direction::Incoming)
    }

    /// Returns every task reachable from `task_id`, breadth-first, with the
    /// minimum number of hops to reach it
    pub fn descendants(&self, task_id: &TaskId) -> Vec<(TaskId, usize)> {
        let mut seen = HashSet::from([*task_id]);
        let mut queue = VecDeque::from([(*task_id, 0usize)]);
        let mut found = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            for (link, _) in self.successors_of(&current) {
                if seen.insert(link.successor) {
                    found.push((link.successor, depth + 1));
                    queue.push_back((link.successor, depth + 1));
                }
            }
        }

        found
    }

    /// Returns all tasks in topological order (predecessors before successors)
    ///
    /// Ties are broken by insertion order, so the result is stable for a
    /// given schedule.
    pub fn topological_order(&self) -> Result<Vec<TaskId>, GraphError> {
        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let degree = self.graph.edges_directed(idx, Direction::Incoming).count();
                (idx, degree)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(*idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(self.graph[idx].id);
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let target = edge.target();
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(target));
                    }
                }
            }
        }

        if order.len() < self.graph.node_count() {
            let stuck = self
                .graph
                .node_indices()
                .find(|idx| in_degree.get(idx).is_some_and(|d| *d > 0));
            if let Some(idx) = stuck {
                return Err(GraphError::Cyclic(self.graph[idx].id));
            }
        }

        Ok(order)
    }

    /// Returns a task by ID
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.node_map.get(task_id).map(|idx| &self.graph[*idx])
    }

    /// Mutable access for date updates; links must go through `add_link`
    pub(crate) fn task_mut(&mut self, task_id: &TaskId) -> Option<&mut Task> {
        let idx = *self.node_map.get(task_id)?;
        Some(&mut self.graph[idx])
    }

    /// Iterates over all tasks in insertion order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph.node_weights()
    }

    /// Returns all links, ordered by successor then insertion
    pub fn links(&self) -> Vec<DependencyLink> {
        self.tasks()
            .flat_map(|task| {
                task.predecessors
                    .iter()
                    .map(|p| DependencyLink::from_predecessor(task.id, p))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Returns the next unused task ID
    pub fn next_task_id(&self) -> TaskId {
        self.node_map
            .keys()
            .max()
            .map(|id| id.next())
            .unwrap_or(TaskId::FIRST)
    }

    /// Fingerprints the current task set
    pub fn snapshot_id(&self) -> SnapshotId {
        SnapshotId::of_tasks(self.tasks())
    }

    /// Returns true if the graph contains the task
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.node_map.contains_key(task_id)
    }

    /// Returns the number of tasks in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn id(n: u32) -> TaskId {
        TaskId::new(n).unwrap()
    }

    fn make_task(n: u32) -> Task {
        let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        Task::new(id(n), format!("Task {}", n), start, 2)
    }

    fn graph_with(n: u32) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for i in 1..=n {
            graph.add_task(make_task(i)).unwrap();
        }
        graph
    }

    fn fs(pred: u32, succ: u32) -> DependencyLink {
        DependencyLink::new(id(pred), id(succ), LinkKind::FinishToStart, 0)
    }

    fn successor_ids(graph: &DependencyGraph, n: u32) -> Vec<TaskId> {
        graph
            .successors_of(&id(n))
            .into_iter()
            .map(|(link, _)| link.successor)
            .collect()
    }

    #[test]
    fn empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert_eq!(graph.next_task_id(), id(1));
    }

    #[test]
    fn add_tasks() {
        let graph = graph_with(2);
        assert_eq!(graph.len(), 2);
        assert!(graph.contains(&id(1)));
        assert!(graph.contains(&id(2)));
        assert_eq!(graph.next_task_id(), id(3));
    }

    #[test]
    fn duplicate_task_rejected() {
        let mut graph = graph_with(1);
        assert_eq!(
            graph.add_task(make_task(1)),
            Err(GraphError::DuplicateTask(id(1)))
        );
    }

    #[test]
    fn add_link_updates_both_views() {
        let mut graph = graph_with(2);
        graph
            .add_link(DependencyLink::new(id(1), id(2), LinkKind::StartToStart, 2))
            .unwrap();

        let succs = graph.successors_of(&id(1));
        assert_eq!(succs.len(), 1);
        assert_eq!(succs[0].0.kind, LinkKind::StartToStart);
        assert_eq!(succs[0].0.lag, 2);
        assert_eq!(succs[0].1.id, id(2));

        let preds = graph.predecessors_of(&id(2));
        assert_eq!(preds[0].1.id, id(1));
        assert_eq!(graph.task(&id(2)).unwrap().predecessors.display(), "1SS+2");
    }

    #[test]
    fn reverse_link_is_a_cycle_and_leaves_graph_unchanged() {
        let mut graph = graph_with(2);
        graph.add_link(fs(1, 2)).unwrap();

        let result = graph.add_link(fs(2, 1));
        assert_eq!(
            result,
            Err(GraphError::CycleDetected {
                predecessor: id(2),
                successor: id(1)
            })
        );

        assert_eq!(successor_ids(&graph, 1), vec![id(2)]);
        assert!(successor_ids(&graph, 2).is_empty());
        assert!(graph.task(&id(1)).unwrap().predecessors.is_empty());
    }

    #[test]
    fn transitive_cycle_detection() {
        let mut graph = graph_with(3);
        graph.add_link(fs(1, 2)).unwrap();
        graph.add_link(fs(2, 3)).unwrap();

        let result = graph.add_link(fs(3, 1));
        assert!(matches!(result, Err(GraphError::CycleDetected { .. })));
    }

    #[test]
    fn self_link_rejected() {
        let mut graph = graph_with(1);
        assert_eq!(
            graph.add_link(fs(1, 1)),
            Err(GraphError::InvalidLink(LinkError::SelfLink(id(1))))
        );
    }

    #[test]
    fn duplicate_link_rejected() {
        let mut graph = graph_with(2);
        graph.add_link(fs(1, 2)).unwrap();
        assert!(matches!(
            graph.add_link(DependencyLink::new(id(1), id(2), LinkKind::StartToStart, 0)),
            Err(GraphError::InvalidLink(LinkError::Duplicate { .. }))
        ));
    }

    #[test]
    fn unknown_task_returns_error() {
        let mut graph = graph_with(1);
        assert_eq!(
            graph.add_link(fs(1, 9)),
            Err(GraphError::InvalidLink(LinkError::UnknownTask(id(9))))
        );
    }

    #[test]
    fn successors_keep_insertion_order() {
        let mut graph = graph_with(5);
        graph.add_link(fs(1, 4)).unwrap();
        graph.add_link(fs(1, 2)).unwrap();
        graph.add_link(fs(1, 5)).unwrap();
        graph.add_link(fs(1, 3)).unwrap();

        assert_eq!(successor_ids(&graph, 1), vec![id(4), id(2), id(5), id(3)]);

        assert!(graph.remove_link(&id(1), &id(2)));
        assert_eq!(successor_ids(&graph, 1), vec![id(4), id(5), id(3)]);
    }

    #[test]
    fn remove_link() {
        let mut graph = graph_with(2);
        graph.add_link(fs(1, 2)).unwrap();

        assert!(graph.remove_link(&id(1), &id(2)));
        assert!(!graph.remove_link(&id(1), &id(2)));
        assert!(graph.predecessors_of(&id(2)).is_empty());
        assert!(graph.task(&id(2)).unwrap().predecessors.is_empty());

        // Now the reverse direction is allowed
        graph.add_link(fs(2, 1)).unwrap();
    }

    #[test]
    fn topological_order_diamond() {
        let mut graph = graph_with(4);
        // 1 -> 2 -> 4, 1 -> 3 -> 4
        graph.add_link(fs(1, 2)).unwrap();
        graph.add_link(fs(1, 3)).unwrap();
        graph.add_link(fs(2, 4)).unwrap();
        graph.add_link(fs(3, 4)).unwrap();

        let order = graph.topological_order().unwrap();
        let pos = |n: u32| order.iter().position(|x| *x == id(n)).unwrap();

        assert!(pos(1) < pos(2));
        assert!(pos(1) < pos(3));
        assert!(pos(2) < pos(4));
        assert!(pos(3) < pos(4));
    }

    #[test]
    fn topological_order_breaks_ties_by_insertion() {
        let mut graph = graph_with(5);
        graph.add_link(fs(5, 1)).unwrap();
        graph.add_link(fs(3, 2)).unwrap();

        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec![id(3), id(2), id(4), id(5), id(1)]);
    }

    #[test]
    fn descendants_report_min_depth() {
        let mut graph = graph_with(4);
        graph.add_link(fs(1, 2)).unwrap();
        graph.add_link(fs(2, 3)).unwrap();
        graph.add_link(fs(1, 3)).unwrap();
        graph.add_link(fs(3, 4)).unwrap();

        let desc: HashMap<_, _> = graph.descendants(&id(1)).into_iter().collect();
        assert_eq!(desc[&id(2)], 1);
        assert_eq!(desc[&id(3)], 1);
        assert_eq!(desc[&id(4)], 2);
        assert!(!desc.contains_key(&id(1)));
    }

    #[test]
    fn from_tasks_normalizes_predecessors() {
        let task1 = make_task(1);
        let mut task2 = make_task(2);
        task2.add_predecessor("1SS+1".parse().unwrap());

        let graph = DependencyGraph::from_tasks([task1, task2]).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.links(), vec![DependencyLink::new(id(1), id(2), LinkKind::StartToStart, 1)]);
    }

    #[test]
    fn from_tasks_rejects_stored_cycle_and_unknown_ids() {
        let mut task1 = make_task(1);
        let mut task2 = make_task(2);
        task1.add_predecessor(Predecessor::finish_to_start(id(2)));
        task2.add_predecessor(Predecessor::finish_to_start(id(1)));
        assert!(matches!(
            DependencyGraph::from_tasks([task1, task2]),
            Err(GraphError::CycleDetected { .. })
        ));

        let mut orphan = make_task(3);
        orphan.add_predecessor(Predecessor::finish_to_start(id(7)));
        assert!(matches!(
            DependencyGraph::from_tasks([orphan]),
            Err(GraphError::InvalidLink(LinkError::UnknownTask(_)))
        ));
    }

    #[test]
    fn snapshot_matches_task_set() {
        let mut task2 = make_task(2);
        task2.add_predecessor(Predecessor::finish_to_start(id(1)));
        let tasks = vec![make_task(1), task2];

        let graph = DependencyGraph::from_tasks(tasks.clone()).unwrap();
        assert_eq!(graph.snapshot_id(), SnapshotId::of_tasks(&tasks));
    }

    #[test]
    fn performance_500_tasks() {
        use std::time::Instant;

        let mut graph = graph_with(500);
        for i in 1..500 {
            graph.add_link(fs(i, i + 1)).unwrap();
        }

        let start = Instant::now();
        let order = graph.topological_order().unwrap();
        let duration = start.elapsed();

        assert_eq!(order.len(), 500);
        assert!(duration.as_millis() < 50, "Topological sort took {:?}", duration);
    }
}
