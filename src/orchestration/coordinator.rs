//! Plan execution coordinator.
//!
//! The Coordinator drives plans from `Ready` through `Executing` to a
//! terminal status. It dispatches one phase at a time, consumes completion
//! and error reports from agents, and only moves to phase `i + 1` once every
//! task of phase `i` has completed or failed (the phase barrier). Failed
//! tasks do not block the barrier; what happens to them is decided by the
//! configured [`FailurePolicy`](crate::config::FailurePolicy).
//!
//! Each plan is handled under its own lock, so events for one plan are
//! processed strictly one after another while separate plans proceed
//! independently.

use crate::agent::AgentId;
use crate::config::CoordinatorConfig;
use crate::core::{AgentAssignment, ExecutionPlan, PlanId, TaskId, TaskRequirements};
use crate::error::{Error, Result};
use crate::messaging::{AgentMessage, AssignmentPayload, Messenger};
use crate::orchestration::history::{HistoryEvent, OrchestrationHistory};
use crate::orchestration::state::{PlanStatus, PlanStatusReport};
use crate::orchestration::store::{PlanRecord, PlanStore, SharedPlanRecord};
use crate::registry::{AgentRegistry, PerformanceSample};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Events emitted by the coordinator as plans progress.
///
/// These let callers (the CLI, tests) follow execution without polling
/// the plan status.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    PhaseDispatched {
        plan_id: PlanId,
        phase_number: usize,
        task_ids: Vec<TaskId>,
    },
    TaskCompleted {
        plan_id: PlanId,
        task_id: TaskId,
        agent_id: AgentId,
    },
    TaskFailed {
        plan_id: PlanId,
        task_id: TaskId,
        agent_id: AgentId,
        error: String,
        attempt: u32,
    },
    /// A failed task will be dispatched again after `delay`.
    TaskRetried {
        plan_id: PlanId,
        task_id: TaskId,
        attempt: u32,
        delay: Duration,
    },
    /// A task ran out of attempts and needs human review.
    Escalated {
        plan_id: PlanId,
        task_id: TaskId,
        attempts: u32,
    },
    PlanCompleted {
        plan_id: PlanId,
        completed_count: usize,
        failed_count: usize,
    },
    /// A critical-path task ran out of attempts.
    PlanFailed { plan_id: PlanId, task_id: TaskId },
}

impl CoordinatorEvent {
    pub fn plan_id(&self) -> PlanId {
        match self {
            CoordinatorEvent::PhaseDispatched { plan_id, .. }
            | CoordinatorEvent::TaskCompleted { plan_id, .. }
            | CoordinatorEvent::TaskFailed { plan_id, .. }
            | CoordinatorEvent::TaskRetried { plan_id, .. }
            | CoordinatorEvent::Escalated { plan_id, .. }
            | CoordinatorEvent::PlanCompleted { plan_id, .. }
            | CoordinatorEvent::PlanFailed { plan_id, .. } => *plan_id,
        }
    }

    /// Whether this event ends its plan.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoordinatorEvent::PlanCompleted { .. } | CoordinatorEvent::PlanFailed { .. }
        )
    }
}

/// Drives execution plans.
///
/// Cloning is cheap; clones share the plan store, registry, messenger and
/// history.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<PlanStore>,
    registry: Arc<dyn AgentRegistry>,
    messenger: Arc<dyn Messenger>,
    history: Arc<OrchestrationHistory>,
    config: CoordinatorConfig,
    events: Option<mpsc::Sender<CoordinatorEvent>>,
}

impl Coordinator {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        messenger: Arc<dyn Messenger>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store: Arc::new(PlanStore::new()),
            registry,
            messenger,
            history: Arc::new(OrchestrationHistory::new()),
            config,
            events: None,
        }
    }

    pub fn with_store(mut self, store: Arc<PlanStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_history(mut self, history: Arc<OrchestrationHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<CoordinatorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    pub fn history(&self) -> &Arc<OrchestrationHistory> {
        &self.history
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Publish an event without waiting. Runs under the plan lock, so a
    /// full channel drops the event rather than stalling the plan.
    async fn emit(&self, event: CoordinatorEvent) {
        let Some(tx) = &self.events else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(plan_id = %event.plan_id(), event = ?event, "Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    async fn record(&self, plan_id: PlanId) -> Result<SharedPlanRecord> {
        self.store
            .get(&plan_id)
            .await
            .ok_or(Error::PlanNotFound { id: plan_id })
    }

    /// Start executing `plan` and dispatch its first phase.
    ///
    /// `requirements` are forwarded to agents inside each assignment.
    ///
    /// # Errors
    /// `PlanExists` if a plan with the same id was already started.
    pub async fn start(
        &self,
        plan: ExecutionPlan,
        requirements: Vec<TaskRequirements>,
    ) -> Result<PlanId> {
        let plan_id = plan.plan_id;
        let record = self
            .store
            .insert(PlanRecord::new(plan, requirements))
            .await?;
        let mut rec = record.lock().await;

        rec.state.start()?;
        info!(
            plan_id = %plan_id,
            phases = rec.plan.phases.len(),
            tasks = rec.plan.task_count(),
            "Starting plan"
        );

        self.evaluate_phase_completion(&mut rec).await?;
        Ok(plan_id)
    }

    /// Send every not-yet-dispatched assignment of phase `index`.
    /// Past the last phase the plan completes instead.
    async fn dispatch_phase(&self, rec: &mut PlanRecord, index: usize) -> Result<()> {
        if index >= rec.plan.phases.len() {
            return self.complete(rec).await;
        }
        let phase = &rec.plan.phases[index];

        let pending: Vec<AgentAssignment> = phase
            .assignments
            .iter()
            .filter(|a| rec.state.attempts(&a.task_id) == 0 && !rec.state.is_terminal(&a.task_id))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let plan_id = rec.plan.plan_id;
        let phase_number = phase.phase_number;
        let task_ids: Vec<TaskId> = pending.iter().map(|a| a.task_id.clone()).collect();

        info!(
            plan_id = %plan_id,
            phase = phase_number,
            tasks = task_ids.len(),
            "Dispatching phase"
        );
        self.history
            .record(
                Some(plan_id),
                HistoryEvent::PhaseDispatched {
                    phase_number,
                    task_ids: task_ids.clone(),
                },
            )
            .await;
        self.emit(CoordinatorEvent::PhaseDispatched {
            plan_id,
            phase_number,
            task_ids,
        })
        .await;

        self.send_assignments(rec, pending).await
    }

    /// Hand assignments to their agents concurrently. A send that fails is
    /// handled like a reported failure.
    async fn send_assignments(
        &self,
        rec: &mut PlanRecord,
        assignments: Vec<AgentAssignment>,
    ) -> Result<()> {
        let plan_id = rec.plan.plan_id;
        let mut outgoing = Vec::with_capacity(assignments.len());

        for assignment in assignments {
            let attempt = rec.state.begin_attempt(&assignment.task_id);
            let task_requirements = rec
                .requirements
                .get(&assignment.task_id)
                .cloned()
                .unwrap_or_else(|| {
                    TaskRequirements::new(
                        assignment.task_id.clone(),
                        assignment.estimated_duration_minutes / 60.0,
                    )
                });
            let message = AgentMessage::TaskAssignment {
                task_id: assignment.task_id.clone(),
                agent_id: assignment.agent_id.clone(),
                task_type: task_requirements.task_type.clone(),
                payload: AssignmentPayload {
                    task_requirements,
                    assignment_id: assignment.assignment_id,
                    plan_id,
                    attempt,
                },
            };

            if let Err(e) = self.registry.acquire_slot(&assignment.agent_id).await {
                warn!(agent_id = %assignment.agent_id, error = %e, "Failed to count dispatch against agent load");
            }
            outgoing.push((assignment, attempt, message));
        }

        let results = join_all(
            outgoing
                .iter()
                .map(|(a, _, message)| self.messenger.send(&a.agent_id, message.clone())),
        )
        .await;

        for ((assignment, attempt, _), result) in outgoing.into_iter().zip(results) {
            // A failed send may have ended the plan; its slots are released.
            if !rec.state.is_executing() {
                break;
            }
            match result {
                Ok(()) => {
                    debug!(
                        plan_id = %plan_id,
                        task_id = %assignment.task_id,
                        agent_id = %assignment.agent_id,
                        attempt,
                        "Assignment sent"
                    );
                    self.arm_deadline(plan_id, &assignment, attempt, rec.cancel.child_token());
                }
                Err(e) => {
                    warn!(
                        plan_id = %plan_id,
                        task_id = %assignment.task_id,
                        error = %e,
                        "Failed to send assignment"
                    );
                    self.record_failure(rec, &assignment, e.to_string(), attempt)
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Watch for an assignment that never reports back.
    fn arm_deadline(
        &self,
        plan_id: PlanId,
        assignment: &AgentAssignment,
        attempt: u32,
        cancel: CancellationToken,
    ) {
        let Some(deadline) = self.config.deadline_for(assignment.estimated_duration_minutes)
        else {
            return;
        };

        let this = self.clone();
        let task_id = assignment.task_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    if let Err(e) = this.on_deadline_elapsed(plan_id, &task_id, attempt, deadline).await {
                        error!(plan_id = %plan_id, task_id = %task_id, error = %e, "Deadline handling failed");
                    }
                }
            }
        });
    }

    async fn on_deadline_elapsed(
        &self,
        plan_id: PlanId,
        task_id: &TaskId,
        attempt: u32,
        deadline: Duration,
    ) -> Result<()> {
        let Some(record) = self.store.get(&plan_id).await else {
            return Ok(());
        };
        let mut rec = record.lock().await;

        if !rec.state.is_executing() || rec.state.in_flight_attempt(task_id) != Some(attempt) {
            debug!(plan_id = %plan_id, task_id = %task_id, attempt, "Stale deadline");
            return Ok(());
        }
        let Some(assignment) = rec.plan.assignment_for(task_id).cloned() else {
            return Ok(());
        };

        warn!(
            plan_id = %plan_id,
            task_id = %task_id,
            agent_id = %assignment.agent_id,
            attempt,
            "No response before deadline"
        );
        let message = format!("deadline exceeded after {}s", deadline.as_secs());
        self.record_failure(&mut rec, &assignment, message, attempt)
            .await?;
        self.evaluate_phase_completion(&mut rec).await
    }

    /// Dispatch a failed task again once its backoff elapses.
    fn schedule_redispatch(
        &self,
        plan_id: PlanId,
        task_id: TaskId,
        delay: Duration,
        cancel: CancellationToken,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = this.redispatch(plan_id, &task_id).await {
                        error!(plan_id = %plan_id, task_id = %task_id, error = %e, "Retry dispatch failed");
                    }
                }
            }
        });
    }

    async fn redispatch(&self, plan_id: PlanId, task_id: &TaskId) -> Result<()> {
        let Some(record) = self.store.get(&plan_id).await else {
            return Ok(());
        };
        let mut rec = record.lock().await;

        // A late completion from an earlier attempt may have settled it.
        if !rec.state.is_executing()
            || !rec.state.is_pending(task_id)
            || rec.state.in_flight_attempt(task_id).is_some()
        {
            return Ok(());
        }
        let Some(assignment) = rec.plan.assignment_for(task_id).cloned() else {
            return Ok(());
        };

        self.send_assignments(&mut rec, vec![assignment]).await?;
        self.evaluate_phase_completion(&mut rec).await
    }

    /// Record a task completion reported by an agent.
    ///
    /// Completions for unknown plans or tasks, or for tasks already in a
    /// terminal state, are logged and ignored.
    pub async fn on_task_completion(
        &self,
        plan_id: &PlanId,
        task_id: &TaskId,
        duration_minutes: f64,
        cost_usd: f64,
        sender: &AgentId,
    ) -> Result<()> {
        let Some(record) = self.store.get(plan_id).await else {
            warn!(plan_id = %plan_id, task_id = %task_id, "Completion for unknown plan, ignoring");
            return Ok(());
        };
        let mut rec = record.lock().await;

        if !rec.state.is_executing() {
            warn!(plan_id = %plan_id, task_id = %task_id, status = %rec.state.status(), "Completion for plan that is not executing, ignoring");
            return Ok(());
        }
        let Some(assignment) = rec.plan.assignment_for(task_id).cloned() else {
            warn!(plan_id = %plan_id, task_id = %task_id, "Completion for unknown task, ignoring");
            return Ok(());
        };
        if !rec.state.is_pending(task_id) {
            warn!(plan_id = %plan_id, task_id = %task_id, "Completion for task that is not pending, ignoring");
            return Ok(());
        }
        if sender != &assignment.agent_id {
            warn!(
                plan_id = %plan_id,
                task_id = %task_id,
                expected = %assignment.agent_id,
                sender = %sender,
                "Completion from unexpected agent"
            );
        }

        if rec.state.settle_attempt(task_id).is_some() {
            self.release(&assignment.agent_id).await;
        }
        rec.state.mark_completed(task_id);

        if let Err(e) = self
            .registry
            .update_performance(
                &assignment.agent_id,
                PerformanceSample::success(duration_minutes, cost_usd),
            )
            .await
        {
            warn!(agent_id = %assignment.agent_id, error = %e, "Failed to update agent performance");
        }

        info!(
            plan_id = %plan_id,
            task_id = %task_id,
            agent_id = %assignment.agent_id,
            duration_minutes,
            "Task completed"
        );
        self.history
            .record(
                Some(*plan_id),
                HistoryEvent::TaskCompleted {
                    task_id: task_id.clone(),
                    agent_id: assignment.agent_id.clone(),
                    duration_minutes,
                    cost_usd,
                },
            )
            .await;
        self.emit(CoordinatorEvent::TaskCompleted {
            plan_id: *plan_id,
            task_id: task_id.clone(),
            agent_id: assignment.agent_id,
        })
        .await;

        self.evaluate_phase_completion(&mut rec).await
    }

    /// Record a task failure reported by an agent and apply the failure
    /// policy.
    ///
    /// Reports for tasks that are not currently out with an agent are
    /// logged and ignored.
    pub async fn on_task_failure(
        &self,
        plan_id: &PlanId,
        task_id: &TaskId,
        error_message: &str,
        sender: &AgentId,
    ) -> Result<()> {
        let Some(record) = self.store.get(plan_id).await else {
            warn!(plan_id = %plan_id, task_id = %task_id, "Error report for unknown plan, ignoring");
            return Ok(());
        };
        let mut rec = record.lock().await;

        if !rec.state.is_executing() {
            warn!(plan_id = %plan_id, task_id = %task_id, status = %rec.state.status(), "Error report for plan that is not executing, ignoring");
            return Ok(());
        }
        let Some(assignment) = rec.plan.assignment_for(task_id).cloned() else {
            warn!(plan_id = %plan_id, task_id = %task_id, "Error report for unknown task, ignoring");
            return Ok(());
        };
        let Some(attempt) = rec.state.in_flight_attempt(task_id) else {
            warn!(plan_id = %plan_id, task_id = %task_id, "Error report for task not in flight, ignoring");
            return Ok(());
        };
        if sender != &assignment.agent_id {
            warn!(
                plan_id = %plan_id,
                task_id = %task_id,
                expected = %assignment.agent_id,
                sender = %sender,
                "Error report from unexpected agent"
            );
        }

        self.record_failure(&mut rec, &assignment, error_message.to_string(), attempt)
            .await?;
        self.evaluate_phase_completion(&mut rec).await
    }

    /// Book a failed attempt and decide between retry, escalation and
    /// failing the plan.
    async fn record_failure(
        &self,
        rec: &mut PlanRecord,
        assignment: &AgentAssignment,
        error_message: String,
        attempt: u32,
    ) -> Result<()> {
        let plan_id = rec.plan.plan_id;
        let task_id = &assignment.task_id;

        if !rec.state.is_executing() {
            debug!(plan_id = %plan_id, task_id = %task_id, "Failure after plan finished, ignoring");
            return Ok(());
        }
        if rec.state.settle_attempt(task_id).is_some() {
            self.release(&assignment.agent_id).await;
        }
        if let Err(e) = self
            .registry
            .update_performance(&assignment.agent_id, PerformanceSample::failure())
            .await
        {
            warn!(agent_id = %assignment.agent_id, error = %e, "Failed to update agent performance");
        }

        warn!(
            plan_id = %plan_id,
            task_id = %task_id,
            agent_id = %assignment.agent_id,
            attempt,
            error = %error_message,
            "Task failed"
        );
        self.history
            .record(
                Some(plan_id),
                HistoryEvent::TaskFailed {
                    task_id: task_id.clone(),
                    agent_id: assignment.agent_id.clone(),
                    error: error_message.clone(),
                    attempt,
                },
            )
            .await;
        self.emit(CoordinatorEvent::TaskFailed {
            plan_id,
            task_id: task_id.clone(),
            agent_id: assignment.agent_id.clone(),
            error: error_message.clone(),
            attempt,
        })
        .await;

        let policy = &self.config.failure_policy;
        let attempts = rec.state.attempts(task_id);

        if attempts < policy.max_attempts {
            let delay = policy.backoff(attempts);
            info!(
                plan_id = %plan_id,
                task_id = %task_id,
                next_attempt = attempts + 1,
                delay_secs = delay.as_secs(),
                "Scheduling retry"
            );
            self.history
                .record(
                    Some(plan_id),
                    HistoryEvent::TaskRetried {
                        task_id: task_id.clone(),
                        attempt: attempts + 1,
                        delay_secs: delay.as_secs(),
                    },
                )
                .await;
            self.emit(CoordinatorEvent::TaskRetried {
                plan_id,
                task_id: task_id.clone(),
                attempt: attempts + 1,
                delay,
            })
            .await;
            self.schedule_redispatch(plan_id, task_id.clone(), delay, rec.cancel.child_token());
            return Ok(());
        }

        rec.state.mark_failed(task_id);

        if policy.escalate_on_exhaustion {
            self.history
                .record(
                    Some(plan_id),
                    HistoryEvent::Escalated {
                        task_id: task_id.clone(),
                        attempts,
                        reason: error_message,
                    },
                )
                .await;
            self.emit(CoordinatorEvent::Escalated {
                plan_id,
                task_id: task_id.clone(),
                attempts,
            })
            .await;
        }

        if policy.fail_plan_on_critical_failure && assignment.is_critical_path {
            self.fail(rec, task_id).await?;
        }

        Ok(())
    }

    /// Advance through every resolved phase, dispatching as it goes.
    ///
    /// A phase is resolved once each of its tasks completed or failed; how
    /// many failed does not matter. Past the last phase the plan completes.
    async fn evaluate_phase_completion(&self, rec: &mut PlanRecord) -> Result<()> {
        loop {
            if !rec.state.is_executing() {
                return Ok(());
            }

            let index = rec.state.current_phase_index();
            self.dispatch_phase(rec, index).await?;
            if !rec.state.is_executing() {
                return Ok(());
            }

            let phase = &rec.plan.phases[index];
            if !rec.state.all_terminal(phase.task_ids()) {
                return Ok(());
            }

            let failed = phase
                .task_ids()
                .filter(|t| rec.state.failed_task_ids().contains(*t))
                .count();
            if failed > 0 {
                warn!(
                    plan_id = %rec.plan.plan_id,
                    phase = phase.phase_number,
                    failed,
                    "Phase resolved with failed tasks, continuing"
                );
            } else {
                debug!(plan_id = %rec.plan.plan_id, phase = phase.phase_number, "Phase resolved");
            }

            rec.state.advance_phase();
        }
    }

    async fn complete(&self, rec: &mut PlanRecord) -> Result<()> {
        self.release_in_flight(rec).await;
        rec.state.finish(PlanStatus::Completed)?;
        rec.cancel.cancel();

        let plan_id = rec.plan.plan_id;
        let completed_count = rec.state.completed_task_ids().len();
        let failed_count = rec.state.failed_task_ids().len();
        info!(
            plan_id = %plan_id,
            completed = completed_count,
            failed = failed_count,
            "Plan completed"
        );

        self.history
            .record(
                Some(plan_id),
                HistoryEvent::PlanFinished {
                    status: PlanStatus::Completed,
                    completed_count,
                    failed_count,
                },
            )
            .await;
        self.emit(CoordinatorEvent::PlanCompleted {
            plan_id,
            completed_count,
            failed_count,
        })
        .await;
        Ok(())
    }

    async fn fail(&self, rec: &mut PlanRecord, task_id: &TaskId) -> Result<()> {
        self.release_in_flight(rec).await;
        rec.state.finish(PlanStatus::Failed)?;
        rec.cancel.cancel();

        let plan_id = rec.plan.plan_id;
        error!(
            plan_id = %plan_id,
            task_id = %task_id,
            "Critical-path task exhausted its attempts, failing plan"
        );

        self.history
            .record(
                Some(plan_id),
                HistoryEvent::PlanFinished {
                    status: PlanStatus::Failed,
                    completed_count: rec.state.completed_task_ids().len(),
                    failed_count: rec.state.failed_task_ids().len(),
                },
            )
            .await;
        self.emit(CoordinatorEvent::PlanFailed {
            plan_id,
            task_id: task_id.clone(),
        })
        .await;
        Ok(())
    }

    async fn release(&self, agent_id: &AgentId) {
        if let Err(e) = self.registry.release_slot(agent_id).await {
            warn!(agent_id = %agent_id, error = %e, "Failed to release agent slot");
        }
    }

    async fn release_in_flight(&self, rec: &PlanRecord) {
        for task_id in rec.state.in_flight_task_ids() {
            if let Some(assignment) = rec.plan.assignment_for(&task_id) {
                self.release(&assignment.agent_id).await;
            }
        }
    }

    /// Current status of a plan.
    ///
    /// # Errors
    /// `PlanNotFound` for a plan that was never started or was archived.
    pub async fn get_plan_status(&self, plan_id: &PlanId) -> Result<PlanStatusReport> {
        let record = self.record(*plan_id).await?;
        let rec = record.lock().await;
        Ok(rec.state.report(rec.plan.phases.len()))
    }

    /// Remove a finished plan from the store, returning its final status.
    ///
    /// # Errors
    /// `PlanNotFound`, or `Validation` if the plan has not finished.
    pub async fn archive(&self, plan_id: &PlanId) -> Result<PlanStatusReport> {
        let record = self.record(*plan_id).await?;
        let report = {
            let rec = record.lock().await;
            if !rec.state.status().is_terminal() {
                return Err(Error::Validation(format!(
                    "Plan {} is still {}",
                    plan_id,
                    rec.state.status()
                )));
            }
            rec.state.report(rec.plan.phases.len())
        };
        self.store.remove(plan_id).await;
        debug!(plan_id = %plan_id, "Archived plan");
        Ok(report)
    }

    /// Route one inbound agent message.
    pub async fn handle_message(&self, message: AgentMessage) -> Result<()> {
        match message {
            AgentMessage::TaskCompletion {
                task_id,
                plan_id,
                duration_minutes,
                cost_usd,
                sender_agent_id,
                ..
            } => {
                self.on_task_completion(
                    &plan_id,
                    &task_id,
                    duration_minutes,
                    cost_usd,
                    &sender_agent_id,
                )
                .await
            }
            AgentMessage::ErrorReport {
                task_id,
                plan_id,
                error_message,
                sender_agent_id,
            } => {
                self.on_task_failure(&plan_id, &task_id, &error_message, &sender_agent_id)
                    .await
            }
            AgentMessage::TaskAssignment { task_id, .. } => {
                warn!(task_id = %task_id, "Task assignment on inbound channel, ignoring");
                Ok(())
            }
        }
    }

    /// Consume inbound agent messages until the channel closes or
    /// `shutdown` fires. Each message is handled to completion before the
    /// next is read.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<AgentMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        debug!("Coordinator event loop started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Coordinator shutting down");
                    break;
                }
                message = inbound.recv() => {
                    let Some(message) = message else {
                        debug!("Inbound channel closed");
                        break;
                    };
                    if let Err(e) = self.handle_message(message).await {
                        error!(error = %e, "Failed to handle agent message");
                    }
                }
            }
        }
        Ok(())
    }
}
