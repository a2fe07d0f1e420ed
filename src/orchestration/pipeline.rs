//! End-to-end orchestration: select, plan, coordinate.
//!
//! Data flows one way through the three layers for each batch. Selection
//! and planning errors come back to the caller before anything is
//! dispatched; once the plan is started, progress is reported through the
//! coordinator's status query and event stream.

use crate::agent::{AgentCapability, AgentId};
use crate::config::Config;
use crate::core::{ExecutionPlan, GlobalDependency, PlanId, TaskId, TaskRequirements};
use crate::error::Result;
use crate::messaging::Messenger;
use crate::orchestration::coordinator::{Coordinator, CoordinatorEvent};
use crate::orchestration::history::{HistoryEvent, OrchestrationHistory};
use crate::orchestration::planner::ExecutionPlanner;
use crate::orchestration::selector::{AgentSelections, AgentSelector};
use crate::registry::AgentRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// A batch of work as read from disk: the agent pool, the tasks and any
/// caller-declared dependencies between them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub agents: Vec<AgentCapability>,
    pub tasks: Vec<TaskRequirements>,
    #[serde(default)]
    pub global_dependencies: Vec<GlobalDependency>,
}

impl Batch {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

pub struct Orchestrator {
    selector: AgentSelector,
    planner: ExecutionPlanner,
    coordinator: Coordinator,
    history: Arc<OrchestrationHistory>,
    allow_multiple: bool,
    prefer_specialists: bool,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        registry: Arc<dyn AgentRegistry>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let history = Arc::new(OrchestrationHistory::new());
        let selector = AgentSelector::new(Arc::clone(&registry), config.selector.clone())
            .with_history(Arc::clone(&history));
        let planner = ExecutionPlanner::new(config.planner.clone());
        let coordinator = Coordinator::new(registry, messenger, config.coordinator.clone())
            .with_history(Arc::clone(&history));

        Self {
            selector,
            planner,
            coordinator,
            history,
            allow_multiple: false,
            prefer_specialists: true,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<CoordinatorEvent>) -> Self {
        self.coordinator = self.coordinator.with_events(events);
        self
    }

    /// Selection flags passed to every batch selection.
    pub fn with_selection(mut self, allow_multiple: bool, prefer_specialists: bool) -> Self {
        self.allow_multiple = allow_multiple;
        self.prefer_specialists = prefer_specialists;
        self
    }

    pub fn selector(&self) -> &AgentSelector {
        &self.selector
    }

    pub fn planner(&self) -> &ExecutionPlanner {
        &self.planner
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn history(&self) -> &Arc<OrchestrationHistory> {
        &self.history
    }

    /// Select agents and build a plan without starting it.
    pub async fn plan(
        &self,
        tasks: &[TaskRequirements],
        global_dependencies: &[GlobalDependency],
    ) -> Result<(ExecutionPlan, AgentSelections)> {
        let selections = self
            .selector
            .batch_select(tasks, self.allow_multiple, self.prefer_specialists)
            .await?;
        let mut plan = self
            .planner
            .create_execution_plan(tasks, &selections, global_dependencies)?;
        if self.planner.config().optimize {
            self.planner.optimize(&mut plan);
        }
        Ok((plan, selections))
    }

    /// Select, plan, record and start a batch. Returns the new plan's id.
    pub async fn orchestrate(
        &self,
        tasks: Vec<TaskRequirements>,
        global_dependencies: &[GlobalDependency],
    ) -> Result<PlanId> {
        let (plan, selections) = self.plan(&tasks, global_dependencies).await?;
        let plan_id = plan.plan_id;

        let selected_agents: BTreeMap<TaskId, Vec<AgentId>> = selections
            .iter()
            .map(|(task_id, agents)| {
                (
                    task_id.clone(),
                    agents.iter().map(|a| a.agent_id.clone()).collect(),
                )
            })
            .collect();
        self.history
            .record(
                Some(plan_id),
                HistoryEvent::PlanCreated {
                    task_ids: tasks.iter().map(|t| t.task_id.clone()).collect(),
                    selected_agents,
                    plan: Box::new(plan.clone()),
                },
            )
            .await;

        info!(plan_id = %plan_id, tasks = tasks.len(), "Orchestrating batch");
        self.coordinator.start(plan, tasks).await
    }
}
