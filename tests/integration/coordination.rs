//! Coordinator tests: phase barriers, failure handling and concurrent plans.

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relay::config::{Config, CoordinatorConfig, FailurePolicy};
use relay::core::{PlanId, TaskId, TaskRequirements};
use relay::error::Error;
use relay::messaging::AgentMessage;
use relay::orchestration::{CoordinatorEvent, PlanStatus};
use relay::registry::AgentRegistry;

use crate::fixtures::{agent_pool, chain_tasks, complete, fail, id, Harness};

/// T1 and T2 in parallel, T3 after both.
fn fan_in_tasks() -> Vec<TaskRequirements> {
    vec![
        TaskRequirements::new("T1", 0.5).with_required(&["testing"]),
        TaskRequirements::new("T2", 0.5).with_required(&["testing"]),
        TaskRequirements::new("T3", 0.5)
            .with_required(&["testing"])
            .depends_on("T1")
            .depends_on("T2"),
    ]
}

fn config_with(policy: FailurePolicy, deadline_safety_factor: f64) -> Config {
    Config {
        coordinator: CoordinatorConfig {
            failure_policy: policy,
            deadline_safety_factor,
            ..CoordinatorConfig::default()
        },
        ..Config::default()
    }
}

/// Read events without a timeout; for tests running on paused time.
async fn next_event(events: &mut mpsc::Receiver<CoordinatorEvent>) -> CoordinatorEvent {
    events.recv().await.expect("Event channel closed")
}

async fn total_load(harness: &Harness) -> u32 {
    let mut total = 0;
    for agent in agent_pool() {
        total += harness
            .registry
            .get_agent_load(&agent.agent_id)
            .await
            .unwrap();
    }
    total
}

/// Test: a failed task still resolves the phase barrier.
///
/// Given T1 and T2 in phase 0 and T3 waiting on both, with the default
/// failure policy
/// When T1 completes and T2 reports an error
/// Then T2 is escalated, T3 is dispatched anyway, and once T3 completes
/// the plan completes with one failure
#[tokio::test]
async fn test_failure_does_not_block_next_phase() {
    let mut harness = Harness::new(agent_pool()).await;
    let plan_id = harness
        .orchestrator
        .orchestrate(fan_in_tasks(), &[])
        .await
        .unwrap();

    let mut phase_zero = Vec::new();
    for _ in 0..2 {
        phase_zero.push(harness.next_assignment().await);
    }
    phase_zero.sort_by(|a, b| a.1.task_id().cmp(b.1.task_id()));
    let coordinator = harness.orchestrator.coordinator().clone();

    let (t1_agent, t1_msg) = &phase_zero[0];
    coordinator
        .handle_message(complete(t1_agent, t1_msg))
        .await
        .unwrap();
    assert!(
        harness.outbox.try_recv().is_err(),
        "Next phase must wait for T2"
    );

    let (t2_agent, t2_msg) = &phase_zero[1];
    coordinator
        .handle_message(fail(t2_agent, t2_msg, "lint failed"))
        .await
        .unwrap();

    let escalated = harness
        .wait_for(|e| matches!(e, CoordinatorEvent::Escalated { .. }))
        .await;
    assert_eq!(
        escalated,
        CoordinatorEvent::Escalated {
            plan_id,
            task_id: id("T2"),
            attempts: 1,
        }
    );

    let (t3_agent, t3_msg) = harness.next_assignment().await;
    assert_eq!(t3_msg.task_id(), &id("T3"));

    let status = coordinator.get_plan_status(&plan_id).await.unwrap();
    assert_eq!(status.status, PlanStatus::Executing);
    assert_eq!(status.current_phase, 1);
    assert_eq!(status.completed_count, 1);
    assert_eq!(status.failed_count, 1);

    coordinator
        .handle_message(complete(&t3_agent, &t3_msg))
        .await
        .unwrap();
    let done = harness.wait_for(CoordinatorEvent::is_terminal).await;
    assert_eq!(
        done,
        CoordinatorEvent::PlanCompleted {
            plan_id,
            completed_count: 2,
            failed_count: 1,
        }
    );

    let status = coordinator.get_plan_status(&plan_id).await.unwrap();
    assert_eq!(status.status, PlanStatus::Completed);
    assert!(status.completed_at.is_some());
    assert_eq!(total_load(&harness).await, 0, "All slots should be released");
}

/// Test: phases dispatch strictly in order along a chain.
///
/// Given T1 -> T2 -> T3
/// When each assignment is completed as it arrives
/// Then assignments arrive in chain order, each only after its
/// predecessor completed
#[tokio::test]
async fn test_chain_dispatches_in_order() {
    let mut harness = Harness::new(agent_pool()).await;
    let plan_id = harness
        .orchestrator
        .orchestrate(chain_tasks(), &[])
        .await
        .unwrap();
    let coordinator = harness.orchestrator.coordinator().clone();

    let mut order = Vec::new();
    for expected_phase in 0..3 {
        let (agent, msg) = harness.next_assignment().await;
        assert!(harness.outbox.try_recv().is_err(), "Only one task per phase");

        let status = coordinator.get_plan_status(&plan_id).await.unwrap();
        assert_eq!(status.current_phase, expected_phase);

        order.push(msg.task_id().clone());
        coordinator
            .handle_message(complete(&agent, &msg))
            .await
            .unwrap();
    }

    assert_eq!(order, vec![id("T1"), id("T2"), id("T3")]);
    let status = coordinator.get_plan_status(&plan_id).await.unwrap();
    assert_eq!(status.status, PlanStatus::Completed);
    assert_eq!(status.completed_count, 3);
}

/// Test: messages for unknown plans and tasks are ignored.
///
/// Given a running plan
/// When completions arrive for a random plan id and for a task not in the
/// plan
/// Then both are accepted without error and the plan is unchanged
#[tokio::test]
async fn test_unknown_ids_are_ignored() {
    let mut harness = Harness::new(agent_pool()).await;
    let plan_id = harness
        .orchestrator
        .orchestrate(chain_tasks(), &[])
        .await
        .unwrap();
    let _ = harness.next_assignment().await;
    let coordinator = harness.orchestrator.coordinator();

    coordinator
        .handle_message(AgentMessage::completion(
            PlanId::new(),
            "T1",
            "backend",
            1.0,
            0.0,
        ))
        .await
        .unwrap();
    coordinator
        .handle_message(AgentMessage::error_report(
            plan_id,
            "T99",
            "backend",
            "who am I",
        ))
        .await
        .unwrap();

    let status = coordinator.get_plan_status(&plan_id).await.unwrap();
    assert_eq!(status.completed_count, 0);
    assert_eq!(status.failed_count, 0);
    assert_eq!(status.current_phase, 0);

    let err = coordinator.get_plan_status(&PlanId::new()).await.unwrap_err();
    assert!(matches!(err, Error::PlanNotFound { .. }));
}

/// Test: a critical-path task exhausting its attempts fails the plan.
///
/// Given a chain and a policy that fails plans on critical failures
/// When T1 reports an error
/// Then the plan fails, T2 is never dispatched and slots are released
#[tokio::test]
async fn test_critical_failure_fails_plan() {
    let policy = FailurePolicy {
        fail_plan_on_critical_failure: true,
        ..FailurePolicy::default()
    };
    let mut harness = Harness::with_config(agent_pool(), config_with(policy, 2.0)).await;
    let plan_id = harness
        .orchestrator
        .orchestrate(chain_tasks(), &[])
        .await
        .unwrap();
    let coordinator = harness.orchestrator.coordinator().clone();

    let (agent, msg) = harness.next_assignment().await;
    coordinator
        .handle_message(fail(&agent, &msg, "segfault"))
        .await
        .unwrap();

    let terminal = harness.wait_for(CoordinatorEvent::is_terminal).await;
    assert_eq!(
        terminal,
        CoordinatorEvent::PlanFailed {
            plan_id,
            task_id: id("T1"),
        }
    );
    assert!(harness.outbox.try_recv().is_err(), "T2 must not be dispatched");

    let report = coordinator.archive(&plan_id).await.unwrap();
    assert_eq!(report.status, PlanStatus::Failed);
    assert_eq!(report.failed_count, 1);
    assert!(coordinator.store().get(&plan_id).await.is_none());
    assert_eq!(total_load(&harness).await, 0);
}

/// Test: failed tasks are retried after a backoff and can then succeed.
///
/// Given a policy allowing two attempts with a one second backoff
/// When T1 fails once and then completes
/// Then a retry is announced, the same task is dispatched as attempt 2 and
/// the chain carries on
#[tokio::test(start_paused = true)]
async fn test_retry_then_success() {
    let policy = FailurePolicy {
        max_attempts: 2,
        backoff_base_secs: 1,
        ..FailurePolicy::default()
    };
    let mut harness = Harness::with_config(agent_pool(), config_with(policy, 0.0)).await;
    let plan_id = harness
        .orchestrator
        .orchestrate(chain_tasks(), &[])
        .await
        .unwrap();
    let coordinator = harness.orchestrator.coordinator().clone();

    let (agent, msg) = harness.outbox.recv().await.unwrap();
    coordinator
        .handle_message(fail(&agent, &msg, "flaky"))
        .await
        .unwrap();

    let retried = loop {
        let event = next_event(&mut harness.events).await;
        if let CoordinatorEvent::TaskRetried { .. } = event {
            break event;
        }
    };
    assert_eq!(
        retried,
        CoordinatorEvent::TaskRetried {
            plan_id,
            task_id: id("T1"),
            attempt: 2,
            delay: std::time::Duration::from_secs(1),
        }
    );

    let (agent, msg) = harness.outbox.recv().await.unwrap();
    match &msg {
        AgentMessage::TaskAssignment {
            task_id, payload, ..
        } => {
            assert_eq!(task_id, &id("T1"));
            assert_eq!(payload.attempt, 2);
        }
        other => panic!("Expected an assignment, got {:?}", other),
    }

    coordinator
        .handle_message(complete(&agent, &msg))
        .await
        .unwrap();
    let (_, next) = harness.outbox.recv().await.unwrap();
    assert_eq!(next.task_id(), &id("T2"));

    let status = coordinator.get_plan_status(&plan_id).await.unwrap();
    assert_eq!(status.completed_count, 1);
    assert_eq!(status.failed_count, 0);
}

/// Test: silent agents are failed once their deadline passes.
///
/// Given the default deadline factor and a thirty minute task
/// When the agent never answers
/// Then the task fails after an hour with a deadline error and the plan
/// moves on
#[tokio::test(start_paused = true)]
async fn test_deadline_fails_silent_task() {
    let mut harness = Harness::new(agent_pool()).await;
    let plan_id = harness
        .orchestrator
        .orchestrate(chain_tasks(), &[])
        .await
        .unwrap();
    let _ = harness.outbox.recv().await.unwrap();

    let failed = loop {
        let event = next_event(&mut harness.events).await;
        if let CoordinatorEvent::TaskFailed { .. } = event {
            break event;
        }
    };
    match failed {
        CoordinatorEvent::TaskFailed {
            plan_id: failed_plan,
            task_id,
            error,
            attempt,
            ..
        } => {
            assert_eq!(failed_plan, plan_id);
            assert_eq!(task_id, id("T1"));
            assert_eq!(attempt, 1);
            assert_eq!(error, "deadline exceeded after 3600s");
        }
        _ => unreachable!(),
    }

    let (_, next) = harness.outbox.recv().await.unwrap();
    assert_eq!(next.task_id(), &id("T2"));
}

/// Test: independent plans sharing one registry do not interfere.
///
/// Given two plans started on the same coordinator and simulated agents
/// answering every assignment through the run loop
/// When both plans run concurrently
/// Then each completes with all of its own tasks and no slot stays taken
#[tokio::test]
async fn test_concurrent_plans_complete_independently() {
    let Harness {
        orchestrator,
        registry,
        mut outbox,
        mut events,
    } = Harness::new(agent_pool()).await;

    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    let responder = tokio::spawn(async move {
        while let Some((agent, msg)) = outbox.recv().await {
            tokio::task::yield_now().await;
            if inbound_tx.send(complete(&agent, &msg)).await.is_err() {
                break;
            }
        }
    });

    let shutdown = CancellationToken::new();
    let runner = {
        let coordinator = orchestrator.coordinator().clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { coordinator.run(inbound_rx, shutdown).await })
    };

    let first = orchestrator.orchestrate(chain_tasks(), &[]).await.unwrap();
    let second = orchestrator.orchestrate(fan_in_tasks(), &[]).await.unwrap();
    assert_ne!(first, second);

    let mut finished = BTreeSet::new();
    let mut completed: Vec<(PlanId, TaskId)> = Vec::new();
    while finished.len() < 2 {
        let event = tokio::time::timeout(crate::fixtures::RECV_TIMEOUT, events.recv())
            .await
            .expect("Timed out waiting for plans to finish")
            .expect("Event channel closed");
        match event {
            CoordinatorEvent::TaskCompleted {
                plan_id, task_id, ..
            } => completed.push((plan_id, task_id)),
            CoordinatorEvent::PlanCompleted {
                plan_id,
                completed_count,
                failed_count,
            } => {
                assert_eq!(completed_count, 3);
                assert_eq!(failed_count, 0);
                finished.insert(plan_id);
            }
            CoordinatorEvent::PlanFailed { .. } => panic!("No plan should fail"),
            _ => {}
        }
    }

    assert_eq!(completed.iter().filter(|(p, _)| *p == first).count(), 3);
    assert_eq!(completed.iter().filter(|(p, _)| *p == second).count(), 3);

    shutdown.cancel();
    runner.await.unwrap().unwrap();
    responder.abort();

    for agent in agent_pool() {
        assert_eq!(
            registry.get_agent_load(&agent.agent_id).await.unwrap(),
            0,
            "{} still holds a slot",
            agent.agent_id
        );
    }
}

/// Test: completions feed back into agent metrics.
///
/// Given the QA agent at a 0.95 success rate
/// When it completes a task
/// Then its success rate rises toward 1
#[tokio::test]
async fn test_completion_updates_agent_metrics() {
    let mut harness = Harness::new(agent_pool()).await;
    harness
        .orchestrator
        .orchestrate(
            vec![TaskRequirements::new("T1", 0.5).with_required(&["testing"])],
            &[],
        )
        .await
        .unwrap();

    let (agent, msg) = harness.next_assignment().await;
    let before = harness
        .registry
        .get(&agent)
        .await
        .unwrap()
        .performance_metrics
        .success_rate;
    harness
        .orchestrator
        .coordinator()
        .handle_message(complete(&agent, &msg))
        .await
        .unwrap();

    let after = harness
        .registry
        .get(&agent)
        .await
        .unwrap()
        .performance_metrics
        .success_rate;
    assert!(after > before, "{} should rise above {}", after, before);
}
