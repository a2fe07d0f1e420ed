//! Plan store.
//!
//! Every plan being coordinated lives here behind its own mutex, so events
//! for one plan are handled one at a time while different plans never wait
//! on each other.

use crate::core::{ExecutionPlan, PlanId, TaskId, TaskRequirements};
use crate::error::{Error, Result};
use crate::orchestration::state::PlanState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// A plan together with its execution state.
#[derive(Debug)]
pub struct PlanRecord {
    pub plan: ExecutionPlan,
    pub state: PlanState,
    /// Requirements forwarded to agents with each assignment.
    pub requirements: HashMap<TaskId, TaskRequirements>,
    /// Cancelled when the plan reaches a terminal status; parent of every
    /// retry and deadline timer armed for the plan.
    pub(crate) cancel: CancellationToken,
}

impl PlanRecord {
    pub fn new(plan: ExecutionPlan, requirements: Vec<TaskRequirements>) -> Self {
        let state = PlanState::new(plan.plan_id);
        Self {
            plan,
            state,
            requirements: requirements
                .into_iter()
                .map(|r| (r.task_id.clone(), r))
                .collect(),
            cancel: CancellationToken::new(),
        }
    }
}

pub type SharedPlanRecord = Arc<Mutex<PlanRecord>>;

#[derive(Debug, Default)]
pub struct PlanStore {
    plans: RwLock<HashMap<PlanId, SharedPlanRecord>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new plan.
    ///
    /// # Errors
    /// `PlanExists` if a plan with the same id is already stored.
    pub async fn insert(&self, record: PlanRecord) -> Result<SharedPlanRecord> {
        let mut plans = self.plans.write().await;
        let id = record.plan.plan_id;
        if plans.contains_key(&id) {
            return Err(Error::PlanExists { id });
        }
        let shared = Arc::new(Mutex::new(record));
        plans.insert(id, Arc::clone(&shared));
        Ok(shared)
    }

    pub async fn get(&self, id: &PlanId) -> Option<SharedPlanRecord> {
        self.plans.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &PlanId) -> Option<SharedPlanRecord> {
        self.plans.write().await.remove(id)
    }

    pub async fn plan_ids(&self) -> Vec<PlanId> {
        self.plans.read().await.keys().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.read().await.is_empty()
    }
}
