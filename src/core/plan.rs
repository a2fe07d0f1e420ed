//! Execution plan model.
//!
//! An `ExecutionPlan` is built once by the planner and is immutable from
//! then on: an ordered list of phases, each holding the assignments that may
//! run side by side, plus a snapshot of the dependency graph and the
//! critical path through it.

use crate::agent::AgentId;
use crate::core::dag::DependencyType;
use crate::core::task::{Complexity, TaskId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an execution plan.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(pub Uuid);

impl PlanId {
    /// Create a new unique plan identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PlanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Unique identifier for one task-to-agent binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(pub Uuid);

impl AssignmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AssignmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Binds one task to the agent that will carry it out.
///
/// A task has at most one assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAssignment {
    pub assignment_id: AssignmentId,
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub estimated_duration_minutes: f64,
    /// Tasks that must reach a terminal state before this one is dispatched.
    pub dependencies: Vec<TaskId>,
    pub is_critical_path: bool,
}

impl AgentAssignment {
    pub fn new(
        task_id: TaskId,
        agent_id: AgentId,
        estimated_duration_minutes: f64,
        dependencies: Vec<TaskId>,
    ) -> Self {
        Self {
            assignment_id: AssignmentId::new(),
            task_id,
            agent_id,
            estimated_duration_minutes,
            dependencies,
            is_critical_path: false,
        }
    }
}

/// A group of assignments with no unresolved dependency among them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPhase {
    /// 0-indexed, strictly increasing through the plan.
    pub phase_number: usize,
    pub assignments: Vec<AgentAssignment>,
    /// Longest assignment in the phase.
    pub estimated_duration_minutes: f64,
}

impl ExecutionPhase {
    pub fn new(phase_number: usize, assignments: Vec<AgentAssignment>) -> Self {
        let estimated_duration_minutes = assignments
            .iter()
            .map(|a| a.estimated_duration_minutes)
            .fold(0.0, f64::max);
        Self {
            phase_number,
            assignments,
            estimated_duration_minutes,
        }
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.assignments.iter().map(|a| &a.task_id)
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.assignments.iter().any(|a| &a.task_id == task_id)
    }
}

/// The longest duration-weighted path through the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalPath {
    pub task_ids: Vec<TaskId>,
    pub total_duration_minutes: f64,
    /// Task with the single largest duration on the path.
    pub bottleneck_task_id: TaskId,
}

impl CriticalPath {
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.task_ids.contains(task_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub task_id: TaskId,
    pub duration_minutes: f64,
    pub complexity: Complexity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// The prerequisite.
    pub from: TaskId,
    /// The dependent.
    pub to: TaskId,
    pub dependency_type: DependencyType,
}

/// Serializable form of the task dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// A complete, dependency-respecting plan for one batch of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: PlanId,
    pub phases: Vec<ExecutionPhase>,
    pub dependency_graph: DependencyGraph,
    pub critical_path: Option<CriticalPath>,
    pub max_parallel_agents: usize,
    pub created_at: DateTime<Utc>,
    /// Degraded-mode notices raised while planning.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Output of the optimization pass.
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ExecutionPlan {
    /// Every assignment in phase order.
    pub fn assignments(&self) -> impl Iterator<Item = &AgentAssignment> {
        self.phases.iter().flat_map(|p| p.assignments.iter())
    }

    pub fn assignment_for(&self, task_id: &TaskId) -> Option<&AgentAssignment> {
        self.assignments().find(|a| &a.task_id == task_id)
    }

    /// Index of the phase holding `task_id`.
    pub fn phase_of(&self, task_id: &TaskId) -> Option<usize> {
        self.phases.iter().position(|p| p.contains(task_id))
    }

    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.assignments.len()).sum()
    }

    /// Sum of phase durations: the plan length with unlimited parallelism
    /// inside each phase and a barrier between phases.
    pub fn estimated_duration_minutes(&self) -> f64 {
        self.phases.iter().map(|p| p.estimated_duration_minutes).sum()
    }

    pub fn is_on_critical_path(&self, task_id: &TaskId) -> bool {
        self.critical_path
            .as_ref()
            .is_some_and(|cp| cp.contains(task_id))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
