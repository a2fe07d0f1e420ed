//! Orchestration layer.
//!
//! Three stages handle every batch of tasks, in order: the
//! [`AgentSelector`] picks agents, the [`ExecutionPlanner`] turns the batch
//! into phased [`ExecutionPlan`](crate::core::ExecutionPlan)s, and the
//! [`Coordinator`] drives each plan to a terminal status. [`Orchestrator`]
//! wires the three together.

mod coordinator;
mod history;
mod pipeline;
mod planner;
mod selector;
mod state;
mod store;

pub use coordinator::{Coordinator, CoordinatorEvent};
pub use history::{HistoryEntry, HistoryEvent, OrchestrationHistory};
pub use pipeline::{Batch, Orchestrator};
pub use planner::{dispatch_order, ExecutionPlanner};
pub use selector::{AgentSelections, AgentSelector, ScoreBreakdown, ScoredAgent};
pub use state::{PlanState, PlanStatus, PlanStatusReport};
pub use store::{PlanRecord, PlanStore, SharedPlanRecord};
