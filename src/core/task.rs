//! Task requirement model.
//!
//! A `TaskRequirements` describes one unit of work: which capabilities an
//! agent needs to carry it out, how complex and long it is expected to be,
//! and which other tasks in the batch must finish before it can start.
//! Requirements are produced upstream and treated as immutable here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a task, unique within a batch or plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Estimated complexity of a task, ordered from least to most demanding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Complexity {
    Trivial,
    Low,
    #[default]
    Medium,
    High,
    VeryHigh,
}

impl Complexity {
    /// Whether the task is demanding enough to warrant more than one agent.
    pub fn is_demanding(&self) -> bool {
        matches!(self, Complexity::High | Complexity::VeryHigh)
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Complexity::Trivial => write!(f, "trivial"),
            Complexity::Low => write!(f, "low"),
            Complexity::Medium => write!(f, "medium"),
            Complexity::High => write!(f, "high"),
            Complexity::VeryHigh => write!(f, "very_high"),
        }
    }
}

/// Kind of input a task consumes or an agent accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Code,
    Image,
    Audio,
    Video,
    Document,
}

/// Requirements of a single unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequirements {
    pub task_id: TaskId,
    /// Free-form kind of work, forwarded to agents as the assignment's task type.
    #[serde(default)]
    pub task_type: String,
    /// Capabilities an agent must have, all of them.
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    /// Capabilities that earn extra credit when present.
    #[serde(default)]
    pub optional_capabilities: BTreeSet<String>,
    #[serde(default)]
    pub input_modalities: BTreeSet<Modality>,
    /// Language the agent must declare, if any.
    #[serde(default)]
    pub language: Option<String>,
    /// Framework the agent must declare, if any.
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub estimated_complexity: Complexity,
    pub estimated_duration_hours: f64,
    /// Tasks that must complete before this one may start.
    #[serde(default)]
    pub hard_dependencies: Vec<TaskId>,
    /// Ordering hints; honored only when they do not create a cycle.
    #[serde(default)]
    pub soft_dependencies: Vec<TaskId>,
    #[serde(default)]
    pub expected_kb_queries: u32,
    /// Upper bound the caller is willing to spend on this task.
    #[serde(default)]
    pub budget_usd: Option<f64>,
    /// Non-functional requirements (latency, security, ...), passed through to agents.
    #[serde(default)]
    pub non_functional: Vec<String>,
}

impl TaskRequirements {
    /// Create requirements for a task with the given id and duration.
    ///
    /// Everything else starts empty with `Medium` complexity.
    pub fn new(task_id: impl Into<TaskId>, estimated_duration_hours: f64) -> Self {
        Self {
            task_id: task_id.into(),
            task_type: String::new(),
            required_capabilities: BTreeSet::new(),
            optional_capabilities: BTreeSet::new(),
            input_modalities: BTreeSet::new(),
            language: None,
            framework: None,
            estimated_complexity: Complexity::default(),
            estimated_duration_hours,
            hard_dependencies: Vec::new(),
            soft_dependencies: Vec::new(),
            expected_kb_queries: 0,
            budget_usd: None,
            non_functional: Vec::new(),
        }
    }

    pub fn with_required(mut self, capabilities: &[&str]) -> Self {
        self.required_capabilities
            .extend(capabilities.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_optional(mut self, capabilities: &[&str]) -> Self {
        self.optional_capabilities
            .extend(capabilities.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_modalities(mut self, modalities: &[Modality]) -> Self {
        self.input_modalities.extend(modalities.iter().copied());
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.estimated_complexity = complexity;
        self
    }

    pub fn depends_on(mut self, task_id: impl Into<TaskId>) -> Self {
        self.hard_dependencies.push(task_id.into());
        self
    }

    pub fn prefers_after(mut self, task_id: impl Into<TaskId>) -> Self {
        self.soft_dependencies.push(task_id.into());
        self
    }

    pub fn with_kb_queries(mut self, queries: u32) -> Self {
        self.expected_kb_queries = queries;
        self
    }

    /// Estimated duration converted to minutes.
    pub fn duration_minutes(&self) -> f64 {
        self.estimated_duration_hours * 60.0
    }

    /// Whether the task consumes anything beyond plain text.
    pub fn needs_non_text_input(&self) -> bool {
        self.input_modalities.iter().any(|m| *m != Modality::Text)
    }
}

/// A dependency declared outside the tasks themselves, e.g. by the caller
/// that split a larger request into this batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalDependency {
    /// The task that must finish first.
    pub prerequisite: TaskId,
    /// The task that waits on `prerequisite`.
    pub dependent: TaskId,
}

impl GlobalDependency {
    pub fn new(prerequisite: impl Into<TaskId>, dependent: impl Into<TaskId>) -> Self {
        Self {
            prerequisite: prerequisite.into(),
            dependent: dependent.into(),
        }
    }
}
