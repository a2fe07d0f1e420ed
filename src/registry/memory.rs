//! In-process agent registry.

use super::{AgentRegistry, CapabilityQuery, PerformanceSample};
use crate::agent::{AgentCapability, AgentId};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

#[derive(Debug)]
struct AgentEntry {
    capability: AgentCapability,
    load: u32,
}

/// Registry keeping every record in memory.
///
/// The map itself is only write-locked to add or remove agents; each agent
/// has its own mutex so updates to different agents never contend and
/// updates to the same agent are applied one at a time.
#[derive(Debug)]
pub struct InMemoryRegistry {
    agents: RwLock<HashMap<AgentId, Arc<Mutex<AgentEntry>>>>,
    /// Weight of the newest sample in the rolling metrics.
    smoothing: f64,
}

impl InMemoryRegistry {
    pub fn new(smoothing: f64) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            smoothing: smoothing.clamp(0.0, 1.0),
        }
    }

    /// Build a registry pre-populated with `agents`.
    pub async fn with_agents(
        smoothing: f64,
        agents: impl IntoIterator<Item = AgentCapability>,
    ) -> Self {
        let registry = Self::new(smoothing);
        for agent in agents {
            registry.register(agent).await;
        }
        registry
    }

    /// Add or replace an agent. Replacing keeps the current load.
    pub async fn register(&self, capability: AgentCapability) {
        let mut agents = self.agents.write().await;
        match agents.get(&capability.agent_id) {
            Some(entry) => {
                entry.lock().await.capability = capability;
            }
            None => {
                debug!(agent_id = %capability.agent_id, "Registering agent");
                agents.insert(
                    capability.agent_id.clone(),
                    Arc::new(Mutex::new(AgentEntry {
                        capability,
                        load: 0,
                    })),
                );
            }
        }
    }

    pub async fn unregister(&self, agent_id: &AgentId) -> Option<AgentCapability> {
        let entry = self.agents.write().await.remove(agent_id)?;
        let entry = entry.lock().await;
        Some(entry.capability.clone())
    }

    pub async fn get(&self, agent_id: &AgentId) -> Option<AgentCapability> {
        let entry = self.entry(agent_id).await.ok()?;
        let entry = entry.lock().await;
        Some(entry.capability.clone())
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }

    async fn entry(&self, agent_id: &AgentId) -> Result<Arc<Mutex<AgentEntry>>> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| Error::AgentNotFound {
                id: agent_id.clone(),
            })
    }

    fn roll(&self, current: f64, sample: f64) -> f64 {
        current * (1.0 - self.smoothing) + sample * self.smoothing
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new(0.2)
    }
}

#[async_trait]
impl AgentRegistry for InMemoryRegistry {
    async fn search_by_capability(&self, query: &CapabilityQuery) -> Result<Vec<AgentCapability>> {
        let entries: Vec<Arc<Mutex<AgentEntry>>> =
            self.agents.read().await.values().cloned().collect();

        let mut matches = Vec::new();
        for entry in entries {
            let entry = entry.lock().await;
            if query.matches(&entry.capability) {
                matches.push(entry.capability.clone());
            }
        }
        matches.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(matches)
    }

    async fn get_agent_load(&self, agent_id: &AgentId) -> Result<u32> {
        let entry = self.entry(agent_id).await?;
        let load = entry.lock().await.load;
        Ok(load)
    }

    async fn update_performance(
        &self,
        agent_id: &AgentId,
        sample: PerformanceSample,
    ) -> Result<()> {
        let entry = self.entry(agent_id).await?;
        let mut entry = entry.lock().await;
        let outcome = if sample.success { 1.0 } else { 0.0 };

        let metrics = &entry.capability.performance_metrics;
        let success_rate = self.roll(metrics.success_rate, outcome).clamp(0.0, 1.0);
        let retry_rate = self.roll(metrics.retry_rate, 1.0 - outcome).clamp(0.0, 1.0);
        let avg_duration = match sample.duration_minutes {
            Some(minutes) if minutes >= 0.0 => {
                self.roll(metrics.avg_task_duration_minutes, minutes)
            }
            _ => metrics.avg_task_duration_minutes,
        };
        let avg_cost = match sample.cost_usd {
            Some(cost) if cost >= 0.0 => {
                self.roll(entry.capability.cost_metrics.avg_cost_per_task_usd, cost)
            }
            _ => entry.capability.cost_metrics.avg_cost_per_task_usd,
        };

        let capability = &mut entry.capability;
        capability.performance_metrics.success_rate = success_rate;
        capability.performance_metrics.retry_rate = retry_rate;
        capability.performance_metrics.avg_task_duration_minutes = avg_duration;
        capability.cost_metrics.avg_cost_per_task_usd = avg_cost;

        debug!(
            agent_id = %agent_id,
            success = sample.success,
            success_rate,
            "Updated agent performance"
        );
        Ok(())
    }

    async fn acquire_slot(&self, agent_id: &AgentId) -> Result<u32> {
        let entry = self.entry(agent_id).await?;
        let mut entry = entry.lock().await;
        entry.load = entry.load.saturating_add(1);
        Ok(entry.load)
    }

    async fn release_slot(&self, agent_id: &AgentId) -> Result<u32> {
        let entry = self.entry(agent_id).await?;
        let mut entry = entry.lock().await;
        entry.load = entry.load.saturating_sub(1);
        Ok(entry.load)
    }
}
