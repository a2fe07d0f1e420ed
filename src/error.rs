use thiserror::Error;

use crate::agent::AgentId;
use crate::core::{PlanId, TaskId};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No capable agent for task {task_id}")]
    NoCapableAgent { task_id: TaskId },

    #[error("Dependency from {from} to {to} would create a cycle")]
    CyclicDependency { from: TaskId, to: TaskId },

    #[error("Duplicate task in batch: {task_id}")]
    DuplicateTask { task_id: TaskId },

    #[error("No agent assignment for task {task_id}")]
    MissingAssignment { task_id: TaskId },

    #[error("Agent registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Agent not found: {id}")]
    AgentNotFound { id: AgentId },

    #[error("Plan not found: {id}")]
    PlanNotFound { id: PlanId },

    #[error("Plan already registered: {id}")]
    PlanExists { id: PlanId },

    #[error("Invalid plan transition from {from} to {to}")]
    InvalidPlanTransition { from: String, to: String },

    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

pub type Result<T> = std::result::Result<T, Error>;
