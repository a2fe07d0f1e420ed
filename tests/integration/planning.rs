//! Execution planning tests.
//!
//! Plans are built through the orchestrator so selection feeds planning the
//! same way it does in production.

use std::collections::{BTreeSet, HashSet};

use relay::config::{Config, PlannerConfig};
use relay::core::{ExecutionPlan, GlobalDependency, TaskId, TaskRequirements};
use relay::error::Error;
use relay::orchestration::{dispatch_order, ExecutionPlanner};

use crate::fixtures::{
    agent_pool, chain_tasks, diamond_tasks, id, independent_tasks, layered_tasks, Harness,
};

async fn plan_for(tasks: &[TaskRequirements], globals: &[GlobalDependency]) -> ExecutionPlan {
    let harness = Harness::new(agent_pool()).await;
    let (plan, _) = harness
        .orchestrator
        .plan(tasks, globals)
        .await
        .expect("Plan should build");
    plan
}

fn phase_ids(plan: &ExecutionPlan) -> Vec<Vec<TaskId>> {
    plan.phases
        .iter()
        .map(|p| {
            let mut ids: Vec<TaskId> = p.task_ids().cloned().collect();
            ids.sort();
            ids
        })
        .collect()
}

/// Every task appears exactly once and every dependency lands in an
/// earlier phase.
fn assert_well_formed(plan: &ExecutionPlan, tasks: &[TaskRequirements]) {
    let planned: Vec<TaskId> = dispatch_order(plan);
    let unique: HashSet<&TaskId> = planned.iter().collect();
    assert_eq!(planned.len(), unique.len(), "A task was planned twice");

    let expected: BTreeSet<TaskId> = tasks.iter().map(|t| t.task_id.clone()).collect();
    let actual: BTreeSet<TaskId> = planned.into_iter().collect();
    assert_eq!(actual, expected, "Planned tasks differ from the batch");

    let mut seen: HashSet<TaskId> = HashSet::new();
    for phase in &plan.phases {
        for assignment in &phase.assignments {
            for dep in &assignment.dependencies {
                assert!(
                    seen.contains(dep),
                    "{} in phase {} depends on {} which is not in an earlier phase",
                    assignment.task_id,
                    phase.phase_number,
                    dep
                );
            }
        }
        seen.extend(phase.task_ids().cloned());
    }
}

/// Test: a three-task chain becomes three single-task phases.
///
/// Given T1 -> T2 -> T3 at thirty minutes each
/// When the plan is built
/// Then there are three phases of one assignment and the critical path is
/// the whole chain at ninety minutes
#[tokio::test]
async fn test_chain_plan() {
    let tasks = chain_tasks();
    let plan = plan_for(&tasks, &[]).await;

    assert_eq!(
        phase_ids(&plan),
        vec![vec![id("T1")], vec![id("T2")], vec![id("T3")]]
    );
    let path = plan.critical_path.as_ref().expect("Chain has a critical path");
    assert_eq!(path.task_ids, vec![id("T1"), id("T2"), id("T3")]);
    assert_eq!(path.total_duration_minutes, 90.0);
    assert!(plan.assignments().all(|a| a.is_critical_path));
    assert_well_formed(&plan, &tasks);
}

/// Test: independent tasks share a single phase.
///
/// Given two tasks with no dependencies (15 and 30 minutes)
/// When the plan is built
/// Then one phase holds both and lasts as long as the longer task
#[tokio::test]
async fn test_independent_plan() {
    let tasks = independent_tasks(2);
    let plan = plan_for(&tasks, &[]).await;

    assert_eq!(plan.phases.len(), 1);
    assert_eq!(plan.phases[0].assignments.len(), 2);
    assert_eq!(plan.phases[0].estimated_duration_minutes, 30.0);
    assert_eq!(plan.estimated_duration_minutes(), 30.0);
}

/// Test: the diamond's critical path runs through the long branch.
///
/// Given A (60) -> B (30) | C (120) -> D (60)
/// When the plan is built
/// Then phases are [A], [B, C], [D] and the path is A, C, D with C as the
/// bottleneck
#[tokio::test]
async fn test_diamond_plan() {
    let tasks = diamond_tasks();
    let plan = plan_for(&tasks, &[]).await;

    assert_eq!(
        phase_ids(&plan),
        vec![vec![id("A")], vec![id("B"), id("C")], vec![id("D")]]
    );
    let path = plan.critical_path.as_ref().unwrap();
    assert_eq!(path.task_ids, vec![id("A"), id("C"), id("D")]);
    assert_eq!(path.total_duration_minutes, 240.0);
    assert_eq!(path.bottleneck_task_id, id("C"));
    assert!(!plan.is_on_critical_path(&id("B")));

    // Optimization puts the critical task first within its phase.
    assert_eq!(plan.phases[1].assignments[0].task_id, id("C"));
    assert_well_formed(&plan, &tasks);
}

/// Test: plan-wide invariants hold across many generated DAGs.
///
/// Given layered DAGs built from different seeds
/// When each is planned
/// Then every plan is well formed, its critical path is at least as long as
/// any task, and the bottleneck is the longest task on the path
#[tokio::test]
async fn test_generated_dags_produce_well_formed_plans() {
    for seed in 1..=25u64 {
        let tasks = layered_tasks(4, 4, seed);
        let plan = plan_for(&tasks, &[]).await;
        assert_well_formed(&plan, &tasks);

        let path = plan.critical_path.as_ref().unwrap();
        let longest = tasks
            .iter()
            .map(|t| t.duration_minutes())
            .fold(0.0_f64, f64::max);
        assert!(
            path.total_duration_minutes >= longest,
            "seed {}: path {} shorter than task {}",
            seed,
            path.total_duration_minutes,
            longest
        );

        let on_path_max = path
            .task_ids
            .iter()
            .map(|t| plan.assignment_for(t).unwrap().estimated_duration_minutes)
            .fold(0.0_f64, f64::max);
        let bottleneck = plan.assignment_for(&path.bottleneck_task_id).unwrap();
        assert_eq!(bottleneck.estimated_duration_minutes, on_path_max, "seed {}", seed);
    }
}

/// Test: a global dependency closing a loop rejects the whole batch.
///
/// Given the chain plus a global T3 -> T1 dependency
/// When the plan is built
/// Then `CyclicDependency` is returned and no plan exists
#[tokio::test]
async fn test_global_cycle_is_rejected() {
    let harness = Harness::new(agent_pool()).await;
    let err = harness
        .orchestrator
        .plan(&chain_tasks(), &[GlobalDependency::new("T3", "T1")])
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::CyclicDependency { .. }),
        "Expected CyclicDependency, got {:?}",
        err
    );
}

/// Test: a hard dependency cycle rejects the batch.
///
/// Given T1 -> T2 -> T3 where T1 also depends on T3
/// When planned
/// Then planning fails with `CyclicDependency`
#[tokio::test]
async fn test_hard_cycle_is_rejected() {
    let tasks = vec![
        TaskRequirements::new("T1", 0.5)
            .with_required(&["testing"])
            .depends_on("T3"),
        TaskRequirements::new("T2", 0.5)
            .with_required(&["testing"])
            .depends_on("T1"),
        TaskRequirements::new("T3", 0.5)
            .with_required(&["testing"])
            .depends_on("T2"),
    ];
    let harness = Harness::new(agent_pool()).await;
    let err = harness.orchestrator.plan(&tasks, &[]).await.unwrap_err();
    assert!(matches!(err, Error::CyclicDependency { .. }));
}

/// Test: global dependencies order otherwise independent tasks.
///
/// Given two independent tasks and a global T2 -> T1 dependency
/// When planned
/// Then T2 runs in the first phase and T1 in the second
#[tokio::test]
async fn test_global_dependency_orders_tasks() {
    let plan = plan_for(&independent_tasks(2), &[GlobalDependency::new("T2", "T1")]).await;
    assert_eq!(phase_ids(&plan), vec![vec![id("T2")], vec![id("T1")]]);
    assert_eq!(
        plan.assignment_for(&id("T1")).unwrap().dependencies,
        vec![id("T2")]
    );
}

/// Test: plans survive a JSON round trip.
///
/// Given a diamond plan
/// When serialized and parsed back
/// Then the result equals the original
#[tokio::test]
async fn test_plan_json_roundtrip() {
    let plan = plan_for(&diamond_tasks(), &[]).await;
    let json = plan.to_json().unwrap();
    let back = ExecutionPlan::from_json(&json).unwrap();
    assert_eq!(back, plan);
}

/// Test: a wide phase gets a splitting suggestion.
///
/// Given a planner limited to two parallel agents and five independent
/// tasks
/// When the plan is built through an orchestrator using that config
/// Then the plan carries the configured limit and a suggestion about the
/// oversized phase
#[tokio::test]
async fn test_parallel_limit_suggestion() {
    let config = Config {
        planner: PlannerConfig {
            max_parallel_agents: 2,
            optimize: true,
        },
        ..Config::default()
    };
    let harness = Harness::with_config(agent_pool(), config).await;
    let (plan, _) = harness
        .orchestrator
        .plan(&independent_tasks(5), &[])
        .await
        .unwrap();

    assert_eq!(plan.max_parallel_agents, 2);
    assert!(
        plan.suggestions.iter().any(|s| s.contains("parallel limit of 2")),
        "Suggestions: {:?}",
        plan.suggestions
    );
}

/// Test: the planner works directly from hand-made selections.
///
/// Given selections built without the selector
/// When a planner creates the plan
/// Then every assignment uses the first listed agent
#[tokio::test]
async fn test_planner_uses_first_selected_agent() {
    let tasks = chain_tasks();
    let harness = Harness::new(agent_pool()).await;
    let (_, mut selections) = harness.orchestrator.plan(&tasks, &[]).await.unwrap();
    for agents in selections.values_mut() {
        agents.insert(0, crate::fixtures::qa_agent());
    }

    let plan = ExecutionPlanner::new(PlannerConfig::default())
        .create_execution_plan(&tasks, &selections, &[])
        .unwrap();
    assert!(plan
        .assignments()
        .all(|a| a.agent_id.as_str() == "qa"));
}
