//! Agent selection.
//!
//! The `AgentSelector` matches task requirements to registered agents. Each
//! candidate that covers the required capabilities is scored on four
//! components, each in [0, 1] before weighting:
//!
//! - capability: coverage of required + optional capabilities, a penalty for
//!   generalists when specialists are preferred, and a small bonus for
//!   matching input modalities
//! - performance: success rate and speed, minus a retry penalty
//! - availability: headroom between live load and the concurrency ceiling
//! - cost: estimated cost of the task against a fixed ceiling
//!
//! Overloaded candidates are dropped unless that would leave nobody, in
//! which case the full ranking is used.

use crate::agent::{AgentCapability, AgentId};
use crate::config::SelectorConfig;
use crate::core::{Modality, TaskId, TaskRequirements};
use crate::error::{Error, Result};
use crate::orchestration::history::{HistoryEvent, OrchestrationHistory};
use crate::registry::{AgentRegistry, CapabilityQuery};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Selected agents per task, best first.
pub type AgentSelections = BTreeMap<TaskId, Vec<AgentCapability>>;

/// Component scores of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub capability: f64,
    pub performance: f64,
    pub availability: f64,
    pub cost: f64,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct ScoredAgent {
    pub agent: AgentCapability,
    pub scores: ScoreBreakdown,
}

pub struct AgentSelector {
    registry: Arc<dyn AgentRegistry>,
    config: SelectorConfig,
    history: Option<Arc<OrchestrationHistory>>,
}

impl AgentSelector {
    pub fn new(registry: Arc<dyn AgentRegistry>, config: SelectorConfig) -> Self {
        Self {
            registry,
            config,
            history: None,
        }
    }

    /// Record every selection into `history`.
    pub fn with_history(mut self, history: Arc<OrchestrationHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Coverage of required + optional capabilities, adjusted for
    /// generalists and modality overlap. Clipped to 1.
    pub fn capability_score(
        &self,
        task: &TaskRequirements,
        agent: &AgentCapability,
        prefer_specialists: bool,
    ) -> f64 {
        let wanted: BTreeSet<&String> = task
            .required_capabilities
            .iter()
            .chain(task.optional_capabilities.iter())
            .collect();

        let mut score = if wanted.is_empty() {
            1.0
        } else {
            let covered = wanted
                .iter()
                .filter(|c| agent.capabilities.contains(c.as_str()))
                .count();
            covered as f64 / wanted.len() as f64
        };

        if prefer_specialists && agent.capabilities.len() > self.config.generalist_capability_limit
        {
            score *= self.config.generalist_penalty;
        }

        if !task.input_modalities.is_empty() {
            let overlap = task
                .input_modalities
                .intersection(&agent.input_modalities)
                .count();
            score += self.config.modality_bonus * overlap as f64
                / task.input_modalities.len() as f64;
        }

        score.min(1.0)
    }

    /// `success_rate * 0.6 + speed * 0.4 - retry_rate * 0.2`, clipped to [0, 1].
    pub fn performance_score(&self, agent: &AgentCapability) -> f64 {
        let metrics = &agent.performance_metrics;
        let speed = if self.config.speed_baseline_minutes > 0.0 {
            (1.0 - metrics.avg_task_duration_minutes / self.config.speed_baseline_minutes)
                .max(0.0)
        } else {
            0.0
        };
        let retry_penalty = metrics.retry_rate * 0.2;
        (metrics.success_rate * 0.6 + speed * 0.4 - retry_penalty).clamp(0.0, 1.0)
    }

    /// Headroom left under the concurrency ceiling. An agent declaring a
    /// ceiling of zero can take nothing and scores 0.
    pub fn availability_score(current_load: u32, max_concurrent_tasks: u32) -> f64 {
        if max_concurrent_tasks == 0 {
            return 0.0;
        }
        (1.0 - current_load as f64 / max_concurrent_tasks as f64).max(0.0)
    }

    pub fn estimated_cost(task: &TaskRequirements, agent: &AgentCapability) -> f64 {
        agent.cost_metrics.avg_cost_per_task_usd
            + task.expected_kb_queries as f64 * agent.cost_metrics.kb_query_cost_usd
    }

    pub fn cost_score(&self, task: &TaskRequirements, agent: &AgentCapability) -> f64 {
        if self.config.cost_ceiling_usd <= 0.0 {
            return 0.0;
        }
        (1.0 - Self::estimated_cost(task, agent) / self.config.cost_ceiling_usd).max(0.0)
    }

    fn total(&self, capability: f64, performance: f64, availability: f64, cost: f64) -> f64 {
        let w = &self.config.weights;
        w.capability * capability
            + w.performance * performance
            + w.availability * availability
            + w.cost * cost
    }

    /// Agents passing every hard filter for `task`.
    async fn candidates(&self, task: &TaskRequirements) -> Result<Vec<AgentCapability>> {
        let query = CapabilityQuery::from_requirements(task);
        let mut found = self.registry.search_by_capability(&query).await?;

        if task.needs_non_text_input() {
            let non_text: BTreeSet<Modality> = task
                .input_modalities
                .iter()
                .copied()
                .filter(|m| *m != Modality::Text)
                .collect();
            found.retain(|agent| !agent.input_modalities.is_disjoint(&non_text));
        }

        Ok(found)
    }

    /// Score every candidate for `task`, best first.
    pub async fn score_candidates(
        &self,
        task: &TaskRequirements,
        prefer_specialists: bool,
    ) -> Result<Vec<ScoredAgent>> {
        let mut scored = Vec::new();

        for agent in self.candidates(task).await? {
            let load = match self.registry.get_agent_load(&agent.agent_id).await {
                Ok(load) => load,
                Err(Error::AgentNotFound { id }) => {
                    debug!(agent_id = %id, "Candidate left the registry during scoring");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let capability = self.capability_score(task, &agent, prefer_specialists);
            let performance = self.performance_score(&agent);
            let availability = Self::availability_score(load, agent.max_concurrent_tasks);
            let cost = self.cost_score(task, &agent);
            let total = self.total(capability, performance, availability, cost);

            scored.push(ScoredAgent {
                agent,
                scores: ScoreBreakdown {
                    capability,
                    performance,
                    availability,
                    cost,
                    total,
                },
            });
        }

        sort_by_total(&mut scored);
        Ok(scored)
    }

    /// How many agents to pick for `task`.
    pub fn selection_count(&self, task: &TaskRequirements, allow_multiple: bool) -> usize {
        if allow_multiple && task.estimated_complexity.is_demanding() {
            let wanted = (task.required_capabilities.len() / 3).max(2);
            wanted.min(self.config.max_agents_per_task)
        } else {
            1
        }
    }

    /// Drop overloaded candidates (falling back to the full ranking if that
    /// leaves nobody) and keep the top `count`.
    fn pick(&self, task_id: &TaskId, scored: Vec<ScoredAgent>, count: usize) -> Vec<ScoredAgent> {
        let available: Vec<ScoredAgent> = scored
            .iter()
            .filter(|s| s.scores.availability >= self.config.availability_threshold)
            .cloned()
            .collect();

        let pool = if available.is_empty() && !scored.is_empty() {
            warn!(
                task_id = %task_id,
                candidates = scored.len(),
                "Every candidate is overloaded, falling back to full ranking"
            );
            scored
        } else {
            available
        };

        pool.into_iter().take(count).collect()
    }

    async fn record(&self, task_id: &TaskId, picked: &[ScoredAgent]) {
        if let Some(history) = &self.history {
            history
                .record(
                    None,
                    HistoryEvent::SelectionMade {
                        task_id: task_id.clone(),
                        agent_ids: picked.iter().map(|s| s.agent.agent_id.clone()).collect(),
                        scores: picked.iter().map(|s| s.scores.total).collect(),
                    },
                )
                .await;
        }
    }

    /// Rank and pick agents for one task.
    ///
    /// Returns an empty list when no agent covers the required capabilities;
    /// callers must treat that as a hard failure (see [`Self::require_agents`]).
    pub async fn select_agents(
        &self,
        task: &TaskRequirements,
        allow_multiple: bool,
        prefer_specialists: bool,
    ) -> Result<Vec<AgentCapability>> {
        let scored = self.score_candidates(task, prefer_specialists).await?;
        if scored.is_empty() {
            warn!(task_id = %task.task_id, "No agent covers the required capabilities");
            return Ok(Vec::new());
        }

        let count = self.selection_count(task, allow_multiple);
        let picked = self.pick(&task.task_id, scored, count);
        debug!(
            task_id = %task.task_id,
            selected = ?picked.iter().map(|s| s.agent.agent_id.as_str()).collect::<Vec<_>>(),
            "Selected agents"
        );
        self.record(&task.task_id, &picked).await;

        Ok(picked.into_iter().map(|s| s.agent).collect())
    }

    /// Like [`Self::select_agents`], but an empty result is an error.
    pub async fn require_agents(
        &self,
        task: &TaskRequirements,
        allow_multiple: bool,
        prefer_specialists: bool,
    ) -> Result<Vec<AgentCapability>> {
        let agents = self
            .select_agents(task, allow_multiple, prefer_specialists)
            .await?;
        if agents.is_empty() {
            return Err(Error::NoCapableAgent {
                task_id: task.task_id.clone(),
            });
        }
        Ok(agents)
    }

    /// Select agents for a whole batch.
    ///
    /// Tasks are handled most complex first. Every time an agent is picked
    /// its score for later tasks in the batch is scaled by
    /// `1 - batch_load_penalty * times_picked`, spreading work across the
    /// pool within a single planning pass.
    ///
    /// # Errors
    /// `NoCapableAgent` for the first task that no agent can take.
    pub async fn batch_select(
        &self,
        tasks: &[TaskRequirements],
        allow_multiple: bool,
        prefer_specialists: bool,
    ) -> Result<AgentSelections> {
        let mut ordered: Vec<&TaskRequirements> = tasks.iter().collect();
        ordered.sort_by(|a, b| b.estimated_complexity.cmp(&a.estimated_complexity));

        let mut times_picked: HashMap<AgentId, u32> = HashMap::new();
        let mut selections = AgentSelections::new();

        for task in ordered {
            let mut scored = self.score_candidates(task, prefer_specialists).await?;
            if scored.is_empty() {
                return Err(Error::NoCapableAgent {
                    task_id: task.task_id.clone(),
                });
            }

            for candidate in &mut scored {
                let picks = times_picked
                    .get(&candidate.agent.agent_id)
                    .copied()
                    .unwrap_or(0);
                let factor = (1.0 - self.config.batch_load_penalty * picks as f64).max(0.0);
                candidate.scores.total *= factor;
            }
            sort_by_total(&mut scored);

            let count = self.selection_count(task, allow_multiple);
            let picked = self.pick(&task.task_id, scored, count);
            for chosen in &picked {
                *times_picked
                    .entry(chosen.agent.agent_id.clone())
                    .or_insert(0) += 1;
            }
            self.record(&task.task_id, &picked).await;

            selections.insert(
                task.task_id.clone(),
                picked.into_iter().map(|s| s.agent).collect(),
            );
        }

        Ok(selections)
    }
}

fn sort_by_total(scored: &mut [ScoredAgent]) {
    scored.sort_by(|a, b| {
        b.scores
            .total
            .partial_cmp(&a.scores.total)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.agent.agent_id.cmp(&b.agent.agent_id))
    });
}
