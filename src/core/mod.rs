//! Core domain models for relay.
//!
//! This module contains the fundamental data structures used throughout
//! the engine: task requirements, the dependency DAG, and execution plans.

pub mod dag;
pub mod plan;
pub mod task;

pub use dag::{DependencyType, TaskDAG, TaskNode};
pub use plan::{
    AgentAssignment, AssignmentId, CriticalPath, DependencyGraph, ExecutionPhase, ExecutionPlan,
    GraphEdge, GraphNode, PlanId,
};
pub use task::{Complexity, GlobalDependency, Modality, TaskId, TaskRequirements};
