//! Agent selection tests.

use std::sync::Arc;

use relay::agent::{AgentCapability, AgentId};
use relay::config::SelectorConfig;
use relay::core::{Complexity, Modality, TaskRequirements};
use relay::error::Error;
use relay::orchestration::AgentSelector;
use relay::registry::{AgentRegistry, InMemoryRegistry};

use crate::fixtures::{agent_pool, id, Harness};

fn ids(agents: &[AgentCapability]) -> Vec<AgentId> {
    agents.iter().map(|a| a.agent_id.clone()).collect()
}

/// Test: the better-performing, less loaded agent wins a single pick.
///
/// Given agents X (success 0.9, 10 min, load 1/5) and Y (success 0.5,
/// 25 min, load 4/5), both covering `python_dev`
/// When one agent is selected
/// Then X is returned alone
#[tokio::test]
async fn test_selects_the_healthier_agent() {
    let harness = Harness::new(vec![
        AgentCapability::new("X", 5)
            .with_capabilities(&["python_dev"])
            .with_performance(0.9, 10.0, 0.0),
        AgentCapability::new("Y", 5)
            .with_capabilities(&["python_dev"])
            .with_performance(0.5, 25.0, 0.0),
    ])
    .await;
    harness.load_agent("X", 1).await;
    harness.load_agent("Y", 4).await;

    let task = TaskRequirements::new("T1", 1.0).with_required(&["python_dev"]);
    let selected = harness
        .orchestrator
        .selector()
        .select_agents(&task, false, true)
        .await
        .unwrap();

    assert_eq!(ids(&selected), vec![AgentId::from("X")], "X should win");
}

/// Test: an agent with a zero concurrency ceiling is scored, not divided by.
///
/// Given an agent declaring `max_concurrent_tasks = 0`
/// When candidates are scored
/// Then its availability is 0 and it is never picked over a usable agent
#[tokio::test]
async fn test_zero_ceiling_agent_is_never_preferred() {
    let registry = Arc::new(
        InMemoryRegistry::with_agents(
            0.2,
            [
                AgentCapability::new("stuck", 0)
                    .with_capabilities(&["testing"])
                    .with_performance(1.0, 0.0, 0.0),
                AgentCapability::new("free", 2).with_capabilities(&["testing"]),
            ],
        )
        .await,
    );
    let selector = AgentSelector::new(registry, SelectorConfig::default());
    let task = TaskRequirements::new("T1", 1.0).with_required(&["testing"]);

    let scored = selector.score_candidates(&task, true).await.unwrap();
    let stuck = scored
        .iter()
        .find(|s| s.agent.agent_id == AgentId::from("stuck"))
        .expect("stuck agent should still be scored");
    assert_eq!(stuck.scores.availability, 0.0);
    assert!(stuck.scores.total.is_finite());

    let selected = selector.select_agents(&task, false, true).await.unwrap();
    assert_eq!(ids(&selected), vec![AgentId::from("free")]);
}

/// Test: every selected agent covers the required capabilities.
///
/// Given the default pool and tasks with assorted requirements
/// When each task is selected for
/// Then each returned agent holds every required capability
#[tokio::test]
async fn test_selected_agents_cover_requirements() {
    let harness = Harness::new(agent_pool()).await;
    let tasks = [
        TaskRequirements::new("api", 1.0).with_required(&["python_dev", "api_design"]),
        TaskRequirements::new("ui", 1.0).with_required(&["ui_design", "typescript"]),
        TaskRequirements::new("check", 1.0).with_required(&["testing"]),
    ];

    for task in &tasks {
        let selected = harness
            .orchestrator
            .selector()
            .select_agents(task, true, true)
            .await
            .unwrap();
        assert!(!selected.is_empty(), "{} should find an agent", task.task_id);
        for agent in &selected {
            assert!(
                agent.covers(&task.required_capabilities),
                "{} does not cover {}",
                agent.agent_id,
                task.task_id
            );
        }
    }
}

/// Test: demanding tasks get several agents when allowed.
///
/// Given three agents that all test
/// When a very-high-complexity testing task is selected with
/// `allow_multiple`
/// Then two distinct agents come back, best first
#[tokio::test]
async fn test_demanding_task_gets_multiple_agents() {
    let harness = Harness::new(agent_pool()).await;
    let task = TaskRequirements::new("audit", 4.0)
        .with_required(&["testing"])
        .with_complexity(Complexity::VeryHigh);

    let selector = harness.orchestrator.selector();
    let selected = selector.select_agents(&task, true, true).await.unwrap();
    assert_eq!(selected.len(), 2);
    assert_ne!(selected[0].agent_id, selected[1].agent_id);

    let single = selector.select_agents(&task, false, true).await.unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].agent_id, selected[0].agent_id);
}

/// Test: tasks needing non-text input only go to agents accepting it.
///
/// Given one image-capable agent and one text-only agent, both designers
/// When a task with image input is selected for
/// Then only the image-capable agent is returned
#[tokio::test]
async fn test_modality_requirement_filters_agents() {
    let harness = Harness::new(vec![
        AgentCapability::new("text-only", 5)
            .with_capabilities(&["ui_design"])
            .with_performance(1.0, 1.0, 0.0),
        AgentCapability::new("vision", 5)
            .with_capabilities(&["ui_design"])
            .with_modalities(&[Modality::Text, Modality::Image]),
    ])
    .await;
    let task = TaskRequirements::new("mockup", 1.0)
        .with_required(&["ui_design"])
        .with_modalities(&[Modality::Image]);

    let selected = harness
        .orchestrator
        .selector()
        .select_agents(&task, true, true)
        .await
        .unwrap();
    assert_eq!(ids(&selected), vec![AgentId::from("vision")]);
}

/// Test: batch selection spreads identical tasks across equal agents.
///
/// Given two identical agents and two identical tasks
/// When the batch is selected
/// Then each agent receives one task
#[tokio::test]
async fn test_batch_select_spreads_load() {
    let harness = Harness::new(vec![
        AgentCapability::new("a", 5).with_capabilities(&["testing"]),
        AgentCapability::new("b", 5).with_capabilities(&["testing"]),
    ])
    .await;
    let tasks = vec![
        TaskRequirements::new("T1", 1.0).with_required(&["testing"]),
        TaskRequirements::new("T2", 1.0).with_required(&["testing"]),
    ];

    let selections = harness
        .orchestrator
        .selector()
        .batch_select(&tasks, false, true)
        .await
        .unwrap();

    let first = &selections[&id("T1")][0].agent_id;
    let second = &selections[&id("T2")][0].agent_id;
    assert_ne!(first, second, "Both tasks landed on {}", first);
}

/// Test: a batch with an uncoverable task fails as a whole.
///
/// Given the default pool
/// When a batch includes a task needing `rust_dev`
/// Then `NoCapableAgent` names that task
#[tokio::test]
async fn test_batch_select_fails_on_uncoverable_task() {
    let harness = Harness::new(agent_pool()).await;
    let tasks = vec![
        TaskRequirements::new("ok", 1.0).with_required(&["testing"]),
        TaskRequirements::new("rusty", 1.0).with_required(&["rust_dev"]),
    ];

    let err = harness
        .orchestrator
        .selector()
        .batch_select(&tasks, false, true)
        .await
        .unwrap_err();
    match err {
        Error::NoCapableAgent { task_id } => assert_eq!(task_id, id("rusty")),
        other => panic!("Expected NoCapableAgent, got {:?}", other),
    }
}

/// Test: selection reads live load from the registry.
///
/// Given two equal agents where one becomes fully loaded
/// When selecting again
/// Then the idle agent is picked
#[tokio::test]
async fn test_selection_tracks_registry_load() {
    let harness = Harness::new(vec![
        AgentCapability::new("a", 2).with_capabilities(&["testing"]),
        AgentCapability::new("b", 2).with_capabilities(&["testing"]),
    ])
    .await;
    let task = TaskRequirements::new("T1", 1.0).with_required(&["testing"]);
    let selector = harness.orchestrator.selector();

    let before = selector.select_agents(&task, false, true).await.unwrap();
    let busy = before[0].agent_id.clone();
    harness.load_agent(busy.as_str(), 2).await;
    assert_eq!(harness.registry.get_agent_load(&busy).await.unwrap(), 2);

    let after = selector.select_agents(&task, false, true).await.unwrap();
    assert_ne!(after[0].agent_id, busy);
}
