//! Task dependency graph.
//!
//! `TaskGraph` stores steps as petgraph nodes with edges pointing from a
//! prerequisite to the step that depends on it. It answers the structural
//! questions the scheduler needs: is the graph well formed, in which order
//! can the steps run, and which chain of steps is the longest.
//!
//! Wherever several answers are equally valid (ready-set ordering in the
//! topological sort, equal-finish prerequisites on the critical path) the
//! step that appeared first in the input list wins.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use chrono::TimeDelta;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// One structural problem found while validating a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum GraphIssue {
    /// A task lists a dependency that is not in the task set.
    MissingDependency { task: TaskId, dependency: TaskId },
    /// Two tasks share an identifier; the later one was dropped.
    DuplicateTask { task: TaskId },
    /// A duration that is negative or not a finite number.
    InvalidDuration { task: TaskId, secs: f64 },
    /// A dependency cycle, listed in traversal order.
    Cycle { path: Vec<TaskId> },
}

impl std::fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphIssue::MissingDependency { task, dependency } => {
                write!(f, "task '{}' depends on unknown task '{}'", task, dependency)
            }
            GraphIssue::DuplicateTask { task } => {
                write!(f, "task '{}' is defined more than once", task)
            }
            GraphIssue::InvalidDuration { task, secs } => {
                write!(f, "task '{}' has invalid duration {}", task, secs)
            }
            GraphIssue::Cycle { path } => {
                let mut names: Vec<&str> = path.iter().map(TaskId::as_str).collect();
                if let Some(first) = path.first() {
                    names.push(first.as_str());
                }
                write!(f, "cycle: {}", names.join(" -> "))
            }
        }
    }
}

/// The task dependency graph.
///
/// Node order matches the order tasks were supplied in; that order is the
/// tie-break for every query that has to pick between equals.
pub struct TaskGraph {
    /// Prerequisite -> dependent edges.
    graph: DiGraph<Task, ()>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
    /// Problems found while assembling, reported by `validate`.
    issues: Vec<GraphIssue>,
}

impl TaskGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
            issues: Vec::new(),
        }
    }

    /// Build a graph, failing on the first malformed entry.
    ///
    /// # Errors
    /// Returns `MalformedGraph` if a dependency names an unknown task, an
    /// identifier is repeated, or a duration is unusable. Cycles are not
    /// construction errors; see [`TaskGraph::validate`].
    pub fn build(tasks: &[Task]) -> Result<Self> {
        let graph = Self::assemble(tasks);
        match graph.issues.first() {
            Some(issue) => Err(Error::MalformedGraph(issue.clone())),
            None => Ok(graph),
        }
    }

    /// Build a graph without failing.
    ///
    /// Unknown dependencies, duplicates and bad durations are recorded and
    /// surface through [`TaskGraph::validate`].
    pub fn assemble(tasks: &[Task]) -> Self {
        let mut dag = Self::new();

        for task in tasks {
            if dag.task_index.contains_key(&task.id) {
                dag.issues.push(GraphIssue::DuplicateTask {
                    task: task.id.clone(),
                });
                continue;
            }
            if !task.has_valid_duration() {
                dag.issues.push(GraphIssue::InvalidDuration {
                    task: task.id.clone(),
                    secs: task.duration_secs,
                });
            }
            let index = dag.graph.add_node(task.clone());
            dag.task_index.insert(task.id.clone(), index);
        }

        for to_index in dag.graph.node_indices().collect::<Vec<_>>() {
            let deps = dag.graph[to_index].depends_on.clone();
            for dep in deps {
                match dag.task_index.get(&dep) {
                    // update_edge keeps a repeated dependency to one edge
                    Some(&from_index) => {
                        dag.graph.update_edge(from_index, to_index, ());
                    }
                    None => dag.issues.push(GraphIssue::MissingDependency {
                        task: dag.graph[to_index].id.clone(),
                        dependency: dep,
                    }),
                }
            }
        }

        dag
    }

    /// Get a reference to a task by its ID.
    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Duration of a task, if present.
    pub fn duration_of(&self, id: &str) -> Option<TimeDelta> {
        self.get_task(id).map(Task::duration)
    }

    /// Get the number of tasks in the graph.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependency edges.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if the graph contains a task.
    pub fn contains_task(&self, id: &str) -> bool {
        self.task_index.contains_key(id)
    }

    /// All tasks in input order.
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.graph.node_weights().collect()
    }

    /// Direct prerequisites of a task, in input order.
    pub fn get_dependencies(&self, id: &str) -> Vec<&Task> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Tasks that directly depend on a task, in input order.
    pub fn get_dependents(&self, id: &str) -> Vec<&Task> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Tasks with no prerequisites.
    pub fn get_root_steps(&self) -> Vec<&Task> {
        self.nodes_without(Direction::Incoming)
    }

    /// Tasks nothing depends on, i.e. the final deliverables.
    pub fn get_leaf_steps(&self) -> Vec<&Task> {
        self.nodes_without(Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&Task> {
        match self.task_index.get(id) {
            Some(&index) => self
                .sorted_neighbors(index, direction)
                .into_iter()
                .filter_map(|n| self.graph.node_weight(n))
                .collect(),
            None => Vec::new(),
        }
    }

    fn nodes_without(&self, direction: Direction) -> Vec<&Task> {
        self.graph
            .node_indices()
            .filter(|&index| {
                self.graph
                    .neighbors_directed(index, direction)
                    .next()
                    .is_none()
            })
            .filter_map(|index| self.graph.node_weight(index))
            .collect()
    }

    /// petgraph yields neighbors newest-edge first; callers want input order.
    fn sorted_neighbors(&self, index: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(index, direction).collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    // ========== Validation ==========

    /// List every structural problem. An empty list means the graph can be
    /// scheduled.
    pub fn validate(&self) -> Vec<GraphIssue> {
        let mut issues = self.issues.clone();
        if self.has_cycle() {
            issues.extend(
                self.find_cycles()
                    .into_iter()
                    .map(|path| GraphIssue::Cycle { path }),
            );
        }
        issues
    }

    /// Check whether the graph has no valid execution order.
    pub fn has_cycle(&self) -> bool {
        self.topological_indices().is_none()
    }

    /// Report dependency cycles.
    ///
    /// Each back-edge found by the depth-first search yields the slice of the
    /// search stack that starts at the repeated task. Overlapping cycles may
    /// appear more than once; this is a diagnostic aid, not a cycle basis.
    pub fn find_cycles(&self) -> Vec<Vec<TaskId>> {
        let mut visited = vec![false; self.graph.node_count()];
        let mut on_stack = vec![false; self.graph.node_count()];
        let mut stack = Vec::new();
        let mut cycles = Vec::new();

        for start in self.graph.node_indices() {
            if !visited[start.index()] {
                self.dfs_cycles(start, &mut visited, &mut on_stack, &mut stack, &mut cycles);
            }
        }

        cycles
            .into_iter()
            .map(|cycle: Vec<NodeIndex>| {
                cycle
                    .into_iter()
                    .map(|index| self.graph[index].id.clone())
                    .collect()
            })
            .collect()
    }

    fn dfs_cycles(
        &self,
        node: NodeIndex,
        visited: &mut [bool],
        on_stack: &mut [bool],
        stack: &mut Vec<NodeIndex>,
        cycles: &mut Vec<Vec<NodeIndex>>,
    ) {
        visited[node.index()] = true;
        on_stack[node.index()] = true;
        stack.push(node);

        for next in self.sorted_neighbors(node, Direction::Outgoing) {
            if on_stack[next.index()] {
                if let Some(pos) = stack.iter().position(|&n| n == next) {
                    cycles.push(stack[pos..].to_vec());
                }
            } else if !visited[next.index()] {
                self.dfs_cycles(next, visited, on_stack, stack, cycles);
            }
        }

        stack.pop();
        on_stack[node.index()] = false;
    }

    // ========== Ordering ==========

    /// Tasks in an order where every task follows all of its dependencies.
    ///
    /// Kahn's algorithm; among tasks that become ready together the one
    /// supplied first is emitted first. Returns `None` if a cycle prevents a
    /// complete ordering.
    pub fn topological_sort(&self) -> Option<Vec<&Task>> {
        self.topological_indices().map(|order| {
            order
                .into_iter()
                .filter_map(|index| self.graph.node_weight(index))
                .collect()
        })
    }

    /// Identifiers in topological order.
    pub fn topological_ids(&self) -> Option<Vec<TaskId>> {
        self.topological_sort()
            .map(|tasks| tasks.into_iter().map(|t| t.id.clone()).collect())
    }

    fn topological_indices(&self) -> Option<Vec<NodeIndex>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|index| self.sorted_neighbors(index, Direction::Incoming).len())
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = self
            .graph
            .node_indices()
            .filter(|index| in_degree[index.index()] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for dependent in self.sorted_neighbors(index, Direction::Outgoing) {
                let degree = &mut in_degree[dependent.index()];
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() == self.graph.node_count() {
            Some(order)
        } else {
            None
        }
    }

    // ========== Critical path ==========

    /// The longest chain of dependent tasks, first task first.
    ///
    /// Empty if the graph is empty or cyclic.
    pub fn critical_path(&self) -> Vec<TaskId> {
        self.critical_path_with_buffer(TimeDelta::zero()).0
    }

    /// Total duration of the critical path.
    pub fn critical_path_duration(&self) -> TimeDelta {
        self.critical_path_with_buffer(TimeDelta::zero()).1
    }

    /// Longest chain when every prerequisite edge also costs `buffer`.
    ///
    /// Earliest finish of a task is the largest earliest finish among its
    /// prerequisites (plus the buffer), or zero for a root, plus its own
    /// duration. The chain is recovered by following the best prerequisite
    /// recorded for each task back from the latest-finishing one.
    ///
    /// Chains too long for a `TimeDelta` saturate at `TimeDelta::MAX`.
    pub fn critical_path_with_buffer(&self, buffer: TimeDelta) -> (Vec<TaskId>, TimeDelta) {
        let Some(order) = self.topological_indices() else {
            return (Vec::new(), TimeDelta::zero());
        };

        let count = self.graph.node_count();
        let mut finish = vec![TimeDelta::zero(); count];
        let mut best_prev: Vec<Option<NodeIndex>> = vec![None; count];

        for &index in &order {
            let mut start = TimeDelta::zero();
            let mut prev = None;
            for dep in self.sorted_neighbors(index, Direction::Incoming) {
                let candidate = finish[dep.index()]
                    .checked_add(&buffer)
                    .unwrap_or(TimeDelta::MAX);
                // strict comparison keeps the earliest-supplied prerequisite on ties
                if prev.is_none() || candidate > start {
                    start = candidate;
                    prev = Some(dep);
                }
            }
            finish[index.index()] = start
                .checked_add(&self.graph[index].duration())
                .unwrap_or(TimeDelta::MAX);
            best_prev[index.index()] = prev;
        }

        let mut anchor: Option<NodeIndex> = None;
        for index in self.graph.node_indices() {
            match anchor {
                Some(a) if finish[index.index()] <= finish[a.index()] => {}
                _ => anchor = Some(index),
            }
        }

        let Some(end) = anchor else {
            return (Vec::new(), TimeDelta::zero());
        };

        let mut path = Vec::new();
        let mut current = Some(end);
        while let Some(index) = current {
            path.push(self.graph[index].id.clone());
            current = best_prev[index.index()];
        }
        path.reverse();

        (path, finish[end.index()])
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .field("issues", &self.issues.len())
            .finish()
    }
}
