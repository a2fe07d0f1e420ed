//! Execution planning.
//!
//! The `ExecutionPlanner` turns a batch of task requirements plus the agents
//! selected for them into an [`ExecutionPlan`]: a dependency graph, one phase
//! per topological generation, and the critical path through the graph.

use crate::config::PlannerConfig;
use crate::core::{
    AgentAssignment, DependencyType, ExecutionPhase, ExecutionPlan, GlobalDependency, PlanId,
    TaskDAG, TaskId, TaskNode, TaskRequirements,
};
use crate::error::{Error, Result};
use crate::orchestration::selector::AgentSelections;
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub struct ExecutionPlanner {
    config: PlannerConfig,
}

impl ExecutionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Build the dependency graph for a batch.
    ///
    /// Hard and global edges are blocking and fail the whole build if they
    /// close a cycle. Soft edges are only added when they keep the graph
    /// acyclic. Anything skipped is reported through `warnings`.
    ///
    /// # Errors
    /// - `DuplicateTask` if two tasks share an id
    /// - `Validation` if a task has a non-positive duration
    /// - `CyclicDependency` on the first hard or global edge closing a cycle
    pub fn build_dag(
        &self,
        tasks: &[TaskRequirements],
        global_dependencies: &[GlobalDependency],
        warnings: &mut Vec<String>,
    ) -> Result<TaskDAG> {
        let mut dag = TaskDAG::new();
        let mut seen = HashSet::new();

        for task in tasks {
            if !seen.insert(&task.task_id) {
                return Err(Error::DuplicateTask {
                    task_id: task.task_id.clone(),
                });
            }
            let minutes = task.duration_minutes();
            if !minutes.is_finite() || minutes <= 0.0 {
                return Err(Error::Validation(format!(
                    "Task {} has invalid estimated duration {} hours",
                    task.task_id, task.estimated_duration_hours
                )));
            }
            dag.add_task(TaskNode::new(
                task.task_id.clone(),
                minutes,
                task.estimated_complexity,
            ));
        }

        for task in tasks {
            for prerequisite in &task.hard_dependencies {
                if !dag.contains_task(prerequisite) {
                    let msg = format!(
                        "Task {} depends on {} which is not in this batch; dependency ignored",
                        task.task_id, prerequisite
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                    continue;
                }
                dag.add_dependency(prerequisite, &task.task_id, DependencyType::Hard)?;
            }
        }

        for dep in global_dependencies {
            if dag.contains_task(&dep.prerequisite) && dag.contains_task(&dep.dependent) {
                dag.add_dependency(&dep.prerequisite, &dep.dependent, DependencyType::Global)?;
            } else {
                debug!(
                    prerequisite = %dep.prerequisite,
                    dependent = %dep.dependent,
                    "Global dependency outside this batch, skipping"
                );
            }
        }

        for task in tasks {
            for preferred in &task.soft_dependencies {
                if !dag.add_soft_dependency(preferred, &task.task_id) {
                    let msg = format!(
                        "Soft dependency {} -> {} skipped",
                        preferred, task.task_id
                    );
                    warn!("{}", msg);
                    warnings.push(msg);
                }
            }
        }

        Ok(dag)
    }

    /// Create an execution plan for `tasks`.
    ///
    /// Every task is bound to the first agent in its selection list. Phases
    /// are the topological generations of the dependency graph; the
    /// critical path is marked on the matching assignments.
    ///
    /// # Errors
    /// Everything [`Self::build_dag`] rejects, plus `MissingAssignment` when
    /// a task has no selected agent. No partial plan is produced on error.
    pub fn create_execution_plan(
        &self,
        tasks: &[TaskRequirements],
        selected_agents: &AgentSelections,
        global_dependencies: &[GlobalDependency],
    ) -> Result<ExecutionPlan> {
        let mut warnings = Vec::new();
        let dag = self.build_dag(tasks, global_dependencies, &mut warnings)?;

        let mut assignments = Vec::with_capacity(tasks.len());
        for task in tasks {
            let agent = selected_agents
                .get(&task.task_id)
                .and_then(|agents| agents.first())
                .ok_or_else(|| Error::MissingAssignment {
                    task_id: task.task_id.clone(),
                })?;
            assignments.push(AgentAssignment::new(
                task.task_id.clone(),
                agent.agent_id.clone(),
                task.duration_minutes(),
                dag.get_dependencies(&task.task_id),
            ));
        }

        let critical_path = match dag.critical_path() {
            Ok(path) => path,
            Err(e) => {
                let msg = format!("Critical path unavailable: {}", e);
                warn!("{}", msg);
                warnings.push(msg);
                None
            }
        };
        if let Some(path) = &critical_path {
            for assignment in &mut assignments {
                assignment.is_critical_path = path.contains(&assignment.task_id);
            }
        }

        let phases = match dag.generations() {
            Ok(generations) => {
                let mut pending = assignments;
                let mut phases = Vec::with_capacity(generations.len());
                for (number, generation) in generations.iter().enumerate() {
                    let mut members = Vec::with_capacity(generation.len());
                    for task_id in generation {
                        if let Some(pos) = pending.iter().position(|a| &a.task_id == task_id) {
                            members.push(pending.swap_remove(pos));
                        }
                    }
                    phases.push(ExecutionPhase::new(number, members));
                }
                phases
            }
            Err(e) => {
                let msg = format!(
                    "Phase decomposition failed ({}); all tasks placed in a single phase",
                    e
                );
                warn!("{}", msg);
                warnings.push(msg);
                vec![ExecutionPhase::new(0, assignments)]
            }
        };

        let plan = ExecutionPlan {
            plan_id: PlanId::new(),
            phases,
            dependency_graph: dag.snapshot(),
            critical_path,
            max_parallel_agents: self.config.max_parallel_agents,
            created_at: Utc::now(),
            warnings,
            suggestions: Vec::new(),
        };

        info!(
            plan_id = %plan.plan_id,
            tasks = plan.task_count(),
            phases = plan.phases.len(),
            estimated_minutes = plan.estimated_duration_minutes(),
            "Created execution plan"
        );
        Ok(plan)
    }

    /// Best-effort optimization pass.
    ///
    /// Reorders each phase so critical-path assignments go out first, then
    /// longer ones. Phases wider than `max_parallel_agents` are not split;
    /// they only get a suggestion. Phase membership never changes.
    pub fn optimize(&self, plan: &mut ExecutionPlan) {
        let limit = self.config.max_parallel_agents;

        for phase in &mut plan.phases {
            phase.assignments.sort_by(|a, b| {
                b.is_critical_path.cmp(&a.is_critical_path).then_with(|| {
                    b.estimated_duration_minutes
                        .partial_cmp(&a.estimated_duration_minutes)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            });

            if limit > 0 && phase.assignments.len() > limit {
                plan.suggestions.push(format!(
                    "Phase {} has {} assignments, above the parallel limit of {}; consider splitting it",
                    phase.phase_number,
                    phase.assignments.len(),
                    limit
                ));
            }
        }

        if let Some(path) = &plan.critical_path {
            if path.task_ids.len() > 1 && path.total_duration_minutes > 0.0 {
                let bottleneck = plan
                    .assignment_for(&path.bottleneck_task_id)
                    .map_or(0.0, |a| a.estimated_duration_minutes);
                if bottleneck * 2.0 > path.total_duration_minutes {
                    plan.suggestions.push(format!(
                        "Task {} takes {:.0} of {:.0} critical-path minutes; breaking it up would shorten the plan",
                        path.bottleneck_task_id, bottleneck, path.total_duration_minutes
                    ));
                }
            }
        }

        debug!(
            plan_id = %plan.plan_id,
            suggestions = plan.suggestions.len(),
            "Optimized execution plan"
        );
    }
}

/// Tasks of `plan` in dispatch order.
pub fn dispatch_order(plan: &ExecutionPlan) -> Vec<TaskId> {
    plan.assignments().map(|a| a.task_id.clone()).collect()
}
