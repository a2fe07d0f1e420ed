//! Agent registry interface.
//!
//! The registry owns agent capability, performance, cost and live-load
//! records. The selector reads from it; the coordinator feeds task outcomes
//! back into it and maintains the live-load counters as it dispatches.

mod memory;

pub use memory::InMemoryRegistry;

use crate::agent::{AgentCapability, AgentId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Filter for a capability search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityQuery {
    /// Every returned agent covers all of these.
    pub required: BTreeSet<String>,
    /// Informational; the selector scores coverage of these.
    pub optional: BTreeSet<String>,
    pub language: Option<String>,
    pub framework: Option<String>,
}

impl CapabilityQuery {
    pub fn from_requirements(task: &crate::core::TaskRequirements) -> Self {
        Self {
            required: task.required_capabilities.clone(),
            optional: task.optional_capabilities.clone(),
            language: task.language.clone(),
            framework: task.framework.clone(),
        }
    }

    /// Whether `agent` passes the hard filters of this query.
    pub fn matches(&self, agent: &AgentCapability) -> bool {
        agent.covers(&self.required)
            && self
                .language
                .as_ref()
                .map_or(true, |l| agent.languages.contains(l))
            && self
                .framework
                .as_ref()
                .map_or(true, |f| agent.frameworks.contains(f))
    }
}

/// One task outcome reported back for an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSample {
    pub success: bool,
    pub duration_minutes: Option<f64>,
    pub cost_usd: Option<f64>,
}

impl PerformanceSample {
    pub fn success(duration_minutes: f64, cost_usd: f64) -> Self {
        Self {
            success: true,
            duration_minutes: Some(duration_minutes),
            cost_usd: Some(cost_usd),
        }
    }

    pub fn failure() -> Self {
        Self {
            success: false,
            duration_minutes: None,
            cost_usd: None,
        }
    }
}

/// Access to agent records.
///
/// Implementations must serialize updates per agent so that concurrent
/// plans never lose a load change or a metric update.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    /// Agents passing the query's hard filters.
    async fn search_by_capability(&self, query: &CapabilityQuery) -> Result<Vec<AgentCapability>>;

    /// Number of tasks currently held by the agent.
    async fn get_agent_load(&self, agent_id: &AgentId) -> Result<u32>;

    /// Fold one task outcome into the agent's rolling metrics.
    async fn update_performance(&self, agent_id: &AgentId, sample: PerformanceSample)
        -> Result<()>;

    /// Count one more task against the agent. Returns the new load.
    async fn acquire_slot(&self, agent_id: &AgentId) -> Result<u32>;

    /// Release one task from the agent. Returns the new load.
    async fn release_slot(&self, agent_id: &AgentId) -> Result<u32>;
}
