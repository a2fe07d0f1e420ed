//! Task DAG (Directed Acyclic Graph) for dependency management.
//!
//! This module provides the TaskDAG structure that represents task dependencies
//! as a directed acyclic graph. Edges point from the prerequisite to the
//! dependent task. On top of the graph it offers the two scheduling routines
//! the planner relies on: topological generations (Kahn's algorithm, one
//! level per pass) and the duration-weighted longest path.

use crate::core::plan::{CriticalPath, DependencyGraph, GraphEdge, GraphNode};
use crate::core::task::{Complexity, TaskId};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Type of dependency between tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// Declared by the dependent task itself; blocking.
    #[default]
    Hard,
    /// Declared by the caller for the whole batch; blocking.
    Global,
    /// Advisory ordering hint, only present when it kept the graph acyclic.
    Soft,
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyType::Hard => write!(f, "hard"),
            DependencyType::Global => write!(f, "global"),
            DependencyType::Soft => write!(f, "soft"),
        }
    }
}

/// Per-task attributes stored on each graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub task_id: TaskId,
    pub duration_minutes: f64,
    pub complexity: Complexity,
}

impl TaskNode {
    pub fn new(task_id: TaskId, duration_minutes: f64, complexity: Complexity) -> Self {
        Self {
            task_id,
            duration_minutes,
            complexity,
        }
    }
}

/// The task dependency graph.
///
/// TaskDAG uses petgraph's DiGraph for storage. Nodes are tasks, and edges
/// represent dependencies tagged with how they were declared.
pub struct TaskDAG {
    /// The underlying directed graph.
    graph: DiGraph<TaskNode, DependencyType>,
    /// Index mapping from TaskId to NodeIndex for fast lookups.
    task_index: HashMap<TaskId, NodeIndex>,
}

impl TaskDAG {
    /// Create a new empty TaskDAG.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            task_index: HashMap::new(),
        }
    }

    /// Add a task to the DAG.
    ///
    /// Returns the NodeIndex for the added task.
    /// If the task already exists (same TaskId), returns the existing NodeIndex.
    pub fn add_task(&mut self, node: TaskNode) -> NodeIndex {
        if let Some(&index) = self.task_index.get(&node.task_id) {
            return index;
        }

        let id = node.task_id.clone();
        let index = self.graph.add_node(node);
        self.task_index.insert(id, index);
        index
    }

    /// Add a dependency between two tasks.
    ///
    /// The dependency indicates that `from` must complete before `to` can start.
    /// Adding an edge that already exists is a no-op.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Either task is not found in the DAG
    /// - Adding the edge would create a cycle
    pub fn add_dependency(
        &mut self,
        from: &TaskId,
        to: &TaskId,
        dep_type: DependencyType,
    ) -> Result<()> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;

        if self.graph.find_edge(from_index, to_index).is_some() {
            return Ok(());
        }

        if self.reaches(to_index, from_index) {
            return Err(Error::CyclicDependency {
                from: from.clone(),
                to: to.clone(),
            });
        }

        self.graph.add_edge(from_index, to_index, dep_type);
        Ok(())
    }

    /// Add a soft (advisory) dependency if it keeps the graph acyclic.
    ///
    /// Returns `false` when the edge was skipped because `to` already
    /// reaches `from`, or when either task is unknown.
    pub fn add_soft_dependency(&mut self, from: &TaskId, to: &TaskId) -> bool {
        match self.add_dependency(from, to, DependencyType::Soft) {
            Ok(()) => true,
            Err(_) => false,
        }
    }

    fn index_of(&self, id: &TaskId) -> Result<NodeIndex> {
        self.task_index
            .get(id)
            .copied()
            .ok_or_else(|| Error::Validation(format!("Task {} not found in DAG", id)))
    }

    /// Whether a path exists from `start` to `target` (inclusive of `start == target`).
    fn reaches(&self, start: NodeIndex, target: NodeIndex) -> bool {
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            if node == target {
                return true;
            }
        }
        false
    }

    /// Get a task node by its ID.
    pub fn get_task(&self, id: &TaskId) -> Option<&TaskNode> {
        self.task_index
            .get(id)
            .and_then(|&index| self.graph.node_weight(index))
    }

    /// Get the number of tasks in the DAG.
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the number of dependencies (edges) in the DAG.
    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Check if a dependency exists between two tasks.
    pub fn has_dependency(&self, from: &TaskId, to: &TaskId) -> bool {
        if let (Some(&from_idx), Some(&to_idx)) =
            (self.task_index.get(from), self.task_index.get(to))
        {
            self.graph.find_edge(from_idx, to_idx).is_some()
        } else {
            false
        }
    }

    /// Get the dependency type between two tasks, if one exists.
    pub fn get_dependency(&self, from: &TaskId, to: &TaskId) -> Option<DependencyType> {
        let from_idx = self.task_index.get(from)?;
        let to_idx = self.task_index.get(to)?;
        let edge = self.graph.find_edge(*from_idx, *to_idx)?;
        self.graph.edge_weight(edge).copied()
    }

    /// Direct predecessors of a task, in the order the tasks were added.
    pub fn get_dependencies(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbors_sorted(id, Direction::Incoming)
    }

    /// Direct successors of a task, in the order the tasks were added.
    pub fn get_dependents(&self, id: &TaskId) -> Vec<TaskId> {
        self.neighbors_sorted(id, Direction::Outgoing)
    }

    fn neighbors_sorted(&self, id: &TaskId, direction: Direction) -> Vec<TaskId> {
        let Some(&index) = self.task_index.get(id) else {
            return Vec::new();
        };
        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(index, direction).collect();
        neighbors.sort();
        neighbors
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n))
            .map(|node| node.task_id.clone())
            .collect()
    }

    /// Get all task nodes in insertion order.
    pub fn all_tasks(&self) -> Vec<&TaskNode> {
        self.graph.node_weights().collect()
    }

    /// Check if the DAG is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Check if the DAG contains a task.
    pub fn contains_task(&self, id: &TaskId) -> bool {
        self.task_index.contains_key(id)
    }

    // ========== Scheduling Operations ==========

    /// Group tasks into topological generations.
    ///
    /// Generation 0 holds every task with no predecessor; generation `k`
    /// holds the tasks whose last unresolved predecessor was peeled off in
    /// pass `k - 1`. Within a generation tasks keep insertion order.
    ///
    /// # Errors
    /// Returns an error naming the leftover tasks if the graph has a cycle.
    pub fn generations(&self) -> Result<Vec<Vec<TaskId>>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();

        let mut current: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();

        let mut levels = Vec::new();
        let mut visited = 0;

        while !current.is_empty() {
            visited += current.len();
            let mut next = Vec::new();
            for &node in &current {
                for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    let deg = &mut in_degree[succ.index()];
                    *deg -= 1;
                    if *deg == 0 {
                        next.push(succ);
                    }
                }
            }
            next.sort();
            levels.push(
                current
                    .iter()
                    .map(|&n| self.graph[n].task_id.clone())
                    .collect(),
            );
            current = next;
        }

        if visited < self.graph.node_count() {
            let stuck: Vec<String> = self
                .graph
                .node_indices()
                .filter(|n| in_degree[n.index()] > 0)
                .map(|n| self.graph[n].task_id.to_string())
                .collect();
            return Err(Error::Validation(format!(
                "Cycle detected among tasks: {}",
                stuck.join(", ")
            )));
        }

        Ok(levels)
    }

    /// Get task ids in topological order (respecting dependencies).
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        Ok(self.generations()?.into_iter().flatten().collect())
    }

    /// Compute the longest duration-weighted path through the DAG.
    ///
    /// One forward pass in topological order keeps, for every task, the
    /// heaviest path ending there and the predecessor it came through.
    /// Ties keep the earlier task. Returns `None` for an empty graph.
    pub fn critical_path(&self) -> Result<Option<CriticalPath>> {
        let order = self.topological_order()?;
        if order.is_empty() {
            return Ok(None);
        }

        let n = self.graph.node_count();
        let mut best = vec![0.0_f64; n];
        let mut came_from: Vec<Option<NodeIndex>> = vec![None; n];
        let mut end: Option<NodeIndex> = None;

        for id in &order {
            let node = self.task_index[id];
            let mut preds: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .collect();
            preds.sort();

            let mut via: Option<NodeIndex> = None;
            for pred in preds {
                if via.map_or(true, |v| best[pred.index()] > best[v.index()]) {
                    via = Some(pred);
                }
            }

            let base = via.map_or(0.0, |v| best[v.index()]);
            best[node.index()] = base + self.graph[node].duration_minutes;
            came_from[node.index()] = via;

            if end.map_or(true, |e| best[node.index()] > best[e.index()]) {
                end = Some(node);
            }
        }

        let Some(end) = end else {
            return Ok(None);
        };

        let mut path = Vec::new();
        let mut cursor = Some(end);
        while let Some(node) = cursor {
            path.push(node);
            cursor = came_from[node.index()];
        }
        path.reverse();

        let mut bottleneck = path[0];
        for &node in &path[1..] {
            if self.graph[node].duration_minutes > self.graph[bottleneck].duration_minutes {
                bottleneck = node;
            }
        }

        Ok(Some(CriticalPath {
            task_ids: path
                .iter()
                .map(|&n| self.graph[n].task_id.clone())
                .collect(),
            total_duration_minutes: best[end.index()],
            bottleneck_task_id: self.graph[bottleneck].task_id.clone(),
        }))
    }

    /// Serializable snapshot of nodes and edges.
    pub fn snapshot(&self) -> DependencyGraph {
        let nodes = self
            .graph
            .node_weights()
            .map(|node| GraphNode {
                task_id: node.task_id.clone(),
                duration_minutes: node.duration_minutes,
                complexity: node.complexity,
            })
            .collect();

        let edges = self
            .graph
            .edge_indices()
            .filter_map(|e| {
                let (from, to) = self.graph.edge_endpoints(e)?;
                Some(GraphEdge {
                    from: self.graph[from].task_id.clone(),
                    to: self.graph[to].task_id.clone(),
                    dependency_type: self.graph[e],
                })
            })
            .collect();

        DependencyGraph { nodes, edges }
    }

    /// Rebuild a DAG from a snapshot, re-validating acyclicity.
    pub fn from_snapshot(snapshot: &DependencyGraph) -> Result<Self> {
        let mut dag = Self::new();
        for node in &snapshot.nodes {
            dag.add_task(TaskNode::new(
                node.task_id.clone(),
                node.duration_minutes,
                node.complexity,
            ));
        }
        for edge in &snapshot.edges {
            dag.add_dependency(&edge.from, &edge.to, edge.dependency_type)?;
        }
        Ok(dag)
    }
}

impl Default for TaskDAG {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskDAG {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDAG")
            .field("tasks", &self.task_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
