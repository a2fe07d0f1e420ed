//! Append-only orchestration history.
//!
//! Every selection, plan, dispatch and outcome is appended here for
//! analytics and audit. Entries are never modified or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::agent::AgentId;
use crate::core::{ExecutionPlan, PlanId, TaskId};
use crate::error::Result;
use crate::orchestration::state::PlanStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HistoryEvent {
    SelectionMade {
        task_id: TaskId,
        agent_ids: Vec<AgentId>,
        scores: Vec<f64>,
    },
    PlanCreated {
        task_ids: Vec<TaskId>,
        selected_agents: BTreeMap<TaskId, Vec<AgentId>>,
        plan: Box<ExecutionPlan>,
    },
    PhaseDispatched {
        phase_number: usize,
        task_ids: Vec<TaskId>,
    },
    TaskCompleted {
        task_id: TaskId,
        agent_id: AgentId,
        duration_minutes: f64,
        cost_usd: f64,
    },
    TaskFailed {
        task_id: TaskId,
        agent_id: AgentId,
        error: String,
        attempt: u32,
    },
    TaskRetried {
        task_id: TaskId,
        attempt: u32,
        delay_secs: u64,
    },
    /// Task ran out of attempts and needs human review.
    Escalated {
        task_id: TaskId,
        attempts: u32,
        reason: String,
    },
    PlanFinished {
        status: PlanStatus,
        completed_count: usize,
        failed_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Absent for events recorded before a plan exists (selection).
    pub plan_id: Option<PlanId>,
    pub recorded_at: DateTime<Utc>,
    pub event: HistoryEvent,
}

#[derive(Debug, Default)]
pub struct OrchestrationHistory {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl OrchestrationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, plan_id: Option<PlanId>, event: HistoryEvent) {
        self.entries.write().await.push(HistoryEntry {
            plan_id,
            recorded_at: Utc::now(),
            event,
        });
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }

    /// Entries recorded against `plan_id`, in append order.
    pub async fn for_plan(&self, plan_id: &PlanId) -> Vec<HistoryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.plan_id.as_ref() == Some(plan_id))
            .cloned()
            .collect()
    }

    /// Escalations still on record for `plan_id`.
    pub async fn escalations(&self, plan_id: &PlanId) -> Vec<TaskId> {
        self.for_plan(plan_id)
            .await
            .into_iter()
            .filter_map(|e| match e.event {
                HistoryEvent::Escalated { task_id, .. } => Some(task_id),
                _ => None,
            })
            .collect()
    }

    pub async fn to_json(&self) -> Result<String> {
        let entries = self.entries.read().await;
        Ok(serde_json::to_string_pretty(&*entries)?)
    }
}
