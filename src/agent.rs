//! Agent capability records.
//!
//! An `AgentCapability` is the registry's view of one worker: what it can
//! do, how well it has done it so far, what it costs, and how much work it
//! may hold at once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::Modality;

/// Identifier of a registered agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observed performance of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Fraction of tasks finished successfully, in [0, 1].
    pub success_rate: f64,
    pub avg_task_duration_minutes: f64,
    /// Fraction of tasks that needed a retry, in [0, 1].
    pub retry_rate: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            avg_task_duration_minutes: 0.0,
            retry_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CostMetrics {
    pub avg_cost_per_task_usd: f64,
    pub kb_query_cost_usd: f64,
}

/// A registered worker and everything the selector scores it on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCapability {
    pub agent_id: AgentId,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub input_modalities: BTreeSet<Modality>,
    #[serde(default)]
    pub languages: BTreeSet<String>,
    #[serde(default)]
    pub frameworks: BTreeSet<String>,
    #[serde(default)]
    pub performance_metrics: PerformanceMetrics,
    #[serde(default)]
    pub cost_metrics: CostMetrics,
    pub max_concurrent_tasks: u32,
}

impl AgentCapability {
    /// Create an agent with the given id and concurrency ceiling.
    ///
    /// The agent name defaults to the id and it accepts text input.
    pub fn new(agent_id: impl Into<AgentId>, max_concurrent_tasks: u32) -> Self {
        let agent_id = agent_id.into();
        Self {
            agent_name: agent_id.to_string(),
            agent_id,
            capabilities: BTreeSet::new(),
            input_modalities: BTreeSet::from([Modality::Text]),
            languages: BTreeSet::new(),
            frameworks: BTreeSet::new(),
            performance_metrics: PerformanceMetrics::default(),
            cost_metrics: CostMetrics::default(),
            max_concurrent_tasks,
        }
    }

    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.capabilities
            .extend(capabilities.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_modalities(mut self, modalities: &[Modality]) -> Self {
        self.input_modalities.extend(modalities.iter().copied());
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages.extend(languages.iter().map(|l| l.to_string()));
        self
    }

    pub fn with_frameworks(mut self, frameworks: &[&str]) -> Self {
        self.frameworks.extend(frameworks.iter().map(|f| f.to_string()));
        self
    }

    pub fn with_performance(
        mut self,
        success_rate: f64,
        avg_task_duration_minutes: f64,
        retry_rate: f64,
    ) -> Self {
        self.performance_metrics = PerformanceMetrics {
            success_rate,
            avg_task_duration_minutes,
            retry_rate,
        };
        self
    }

    pub fn with_cost(mut self, avg_cost_per_task_usd: f64, kb_query_cost_usd: f64) -> Self {
        self.cost_metrics = CostMetrics {
            avg_cost_per_task_usd,
            kb_query_cost_usd,
        };
        self
    }

    /// Whether the agent has every capability in `required`.
    pub fn covers<'a>(&self, required: impl IntoIterator<Item = &'a String>) -> bool {
        required.into_iter().all(|c| self.capabilities.contains(c))
    }
}
