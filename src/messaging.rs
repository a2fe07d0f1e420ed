//! Messages exchanged between the coordinator and agents.
//!
//! Transport is out of scope: the coordinator only needs something that
//! implements [`Messenger`] for outbound assignments, and it consumes
//! inbound completions and error reports as [`AgentMessage`] values.

use crate::agent::AgentId;
use crate::core::{AssignmentId, PlanId, TaskId, TaskRequirements};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Payload of a task assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPayload {
    pub task_requirements: TaskRequirements,
    pub assignment_id: AssignmentId,
    pub plan_id: PlanId,
    /// 1 for the first dispatch, incremented on every retry.
    pub attempt: u32,
}

/// Every message kind on the agent channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum AgentMessage {
    /// Coordinator to agent: start working on a task.
    TaskAssignment {
        task_id: TaskId,
        agent_id: AgentId,
        task_type: String,
        payload: AssignmentPayload,
    },
    /// Agent to coordinator: the task finished successfully.
    TaskCompletion {
        task_id: TaskId,
        plan_id: PlanId,
        #[serde(default)]
        artifacts: HashMap<String, serde_json::Value>,
        duration_minutes: f64,
        cost_usd: f64,
        sender_agent_id: AgentId,
    },
    /// Agent to coordinator: the task failed.
    ErrorReport {
        task_id: TaskId,
        plan_id: PlanId,
        error_message: String,
        sender_agent_id: AgentId,
    },
}

impl AgentMessage {
    pub fn task_id(&self) -> &TaskId {
        match self {
            AgentMessage::TaskAssignment { task_id, .. }
            | AgentMessage::TaskCompletion { task_id, .. }
            | AgentMessage::ErrorReport { task_id, .. } => task_id,
        }
    }

    pub fn completion(
        plan_id: PlanId,
        task_id: impl Into<TaskId>,
        sender: impl Into<AgentId>,
        duration_minutes: f64,
        cost_usd: f64,
    ) -> Self {
        AgentMessage::TaskCompletion {
            task_id: task_id.into(),
            plan_id,
            artifacts: HashMap::new(),
            duration_minutes,
            cost_usd,
            sender_agent_id: sender.into(),
        }
    }

    pub fn error_report(
        plan_id: PlanId,
        task_id: impl Into<TaskId>,
        sender: impl Into<AgentId>,
        error_message: impl Into<String>,
    ) -> Self {
        AgentMessage::ErrorReport {
            task_id: task_id.into(),
            plan_id,
            error_message: error_message.into(),
            sender_agent_id: sender.into(),
        }
    }
}

/// Outbound side of the agent channel. Sends are fire-and-forget: an `Ok`
/// only means the message was handed to the transport.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, agent_id: &AgentId, message: AgentMessage) -> Result<()>;
}

/// Messenger that pushes every message onto an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelMessenger {
    outbox: mpsc::Sender<(AgentId, AgentMessage)>,
}

impl ChannelMessenger {
    pub fn new(outbox: mpsc::Sender<(AgentId, AgentMessage)>) -> Self {
        Self { outbox }
    }

    /// Create a messenger together with the receiving end of its outbox.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<(AgentId, AgentMessage)>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Messenger for ChannelMessenger {
    async fn send(&self, agent_id: &AgentId, message: AgentMessage) -> Result<()> {
        self.outbox
            .send((agent_id.clone(), message))
            .await
            .map_err(|_| Error::Dispatch(format!("outbox for agent {} is closed", agent_id)))
    }
}
