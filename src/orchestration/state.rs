//! Plan execution state with status transition validation.
//!
//! `PlanState` is the coordinator's mutable view of one plan: where it is
//! in its phases, which tasks reached a terminal state, and which are out
//! with an agent right now.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::core::{PlanId, TaskId};
use crate::error::{Error, Result};

/// Status of a plan in its lifecycle.
///
/// Plans move `Ready -> Executing -> Completed`. `Failed` is only reached
/// when the failure policy gives up on a critical-path task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Ready,
    Executing,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Ready => write!(f, "ready"),
            PlanStatus::Executing => write!(f, "executing"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time summary returned by the plan status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStatusReport {
    pub plan_id: PlanId,
    pub status: PlanStatus,
    pub current_phase: usize,
    pub total_phases: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Mutable execution state of one plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanState {
    pub plan_id: PlanId,
    status: PlanStatus,
    current_phase_index: usize,
    completed_task_ids: BTreeSet<TaskId>,
    failed_task_ids: BTreeSet<TaskId>,
    /// Task to the attempt currently out with an agent.
    in_flight: HashMap<TaskId, u32>,
    /// Dispatch attempts made so far per task.
    attempts: HashMap<TaskId, u32>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl PlanState {
    pub fn new(plan_id: PlanId) -> Self {
        Self {
            plan_id,
            status: PlanStatus::Ready,
            current_phase_index: 0,
            completed_task_ids: BTreeSet::new(),
            failed_task_ids: BTreeSet::new(),
            in_flight: HashMap::new(),
            attempts: HashMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Check if a transition to `target` is valid from the current status.
    ///
    /// - Ready -> Executing
    /// - Executing -> Completed
    /// - Executing -> Failed
    pub fn can_transition(&self, target: PlanStatus) -> bool {
        matches!(
            (self.status, target),
            (PlanStatus::Ready, PlanStatus::Executing)
                | (PlanStatus::Executing, PlanStatus::Completed)
                | (PlanStatus::Executing, PlanStatus::Failed)
        )
    }

    fn transition(&mut self, target: PlanStatus) -> Result<()> {
        if !self.can_transition(target) {
            return Err(Error::InvalidPlanTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Enter `Executing` at phase 0 with empty completed/failed sets.
    pub fn start(&mut self) -> Result<()> {
        self.transition(PlanStatus::Executing)?;
        self.current_phase_index = 0;
        self.completed_task_ids.clear();
        self.failed_task_ids.clear();
        self.in_flight.clear();
        self.attempts.clear();
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Enter a terminal status and stamp the completion time.
    pub fn finish(&mut self, status: PlanStatus) -> Result<()> {
        self.transition(status)?;
        self.in_flight.clear();
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn is_executing(&self) -> bool {
        self.status == PlanStatus::Executing
    }

    pub fn current_phase_index(&self) -> usize {
        self.current_phase_index
    }

    pub fn advance_phase(&mut self) -> usize {
        self.current_phase_index += 1;
        self.current_phase_index
    }

    pub fn completed_task_ids(&self) -> &BTreeSet<TaskId> {
        &self.completed_task_ids
    }

    pub fn failed_task_ids(&self) -> &BTreeSet<TaskId> {
        &self.failed_task_ids
    }

    /// Whether the task reached completed or failed.
    pub fn is_terminal(&self, task_id: &TaskId) -> bool {
        self.completed_task_ids.contains(task_id) || self.failed_task_ids.contains(task_id)
    }

    /// Whether every task in `task_ids` reached a terminal state.
    pub fn all_terminal<'a>(&self, mut task_ids: impl Iterator<Item = &'a TaskId>) -> bool {
        task_ids.all(|t| self.is_terminal(t))
    }

    /// Record a new dispatch of `task_id` and return its attempt number.
    pub fn begin_attempt(&mut self, task_id: &TaskId) -> u32 {
        let count = self.attempts.entry(task_id.clone()).or_insert(0);
        *count += 1;
        let attempt = *count;
        self.in_flight.insert(task_id.clone(), attempt);
        attempt
    }

    pub fn attempts(&self, task_id: &TaskId) -> u32 {
        self.attempts.get(task_id).copied().unwrap_or(0)
    }

    /// Attempt currently out with an agent, if any.
    pub fn in_flight_attempt(&self, task_id: &TaskId) -> Option<u32> {
        self.in_flight.get(task_id).copied()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight_task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self.in_flight.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Take the task off the in-flight set, returning the attempt it was on.
    pub fn settle_attempt(&mut self, task_id: &TaskId) -> Option<u32> {
        self.in_flight.remove(task_id)
    }

    /// Whether the task was dispatched and has not reached a terminal state.
    pub fn is_pending(&self, task_id: &TaskId) -> bool {
        self.attempts(task_id) > 0 && !self.is_terminal(task_id)
    }

    pub fn mark_completed(&mut self, task_id: &TaskId) {
        self.in_flight.remove(task_id);
        self.completed_task_ids.insert(task_id.clone());
    }

    pub fn mark_failed(&mut self, task_id: &TaskId) {
        self.in_flight.remove(task_id);
        self.failed_task_ids.insert(task_id.clone());
    }

    pub fn report(&self, total_phases: usize) -> PlanStatusReport {
        PlanStatusReport {
            plan_id: self.plan_id,
            status: self.status,
            current_phase: self.current_phase_index,
            total_phases,
            completed_count: self.completed_task_ids.len(),
            failed_count: self.failed_task_ids.len(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}
