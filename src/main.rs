use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use relay::agent::AgentId;
use relay::config::Config;
use relay::core::TaskId;
use relay::messaging::{AgentMessage, ChannelMessenger};
use relay::orchestration::{dispatch_order, Batch, CoordinatorEvent, HistoryEvent, Orchestrator};
use relay::registry::InMemoryRegistry;
use relay::Result;

/// Channel capacity for the in-process simulation.
const SIM_CHANNEL_CAPACITY: usize = 1024;

/// Relay - agent selection and execution planning engine
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RELAY_DEBUG=1   Enable debug logging (alternative to --debug)\n    RUST_LOG        Override log filtering")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Configuration file (defaults to ~/.relay/relay.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Select agents and print the execution plan for a batch as JSON
    Plan {
        /// Batch file with agents, tasks and global dependencies
        #[arg(short, long)]
        input: PathBuf,

        /// Skip the optimization pass
        #[arg(long)]
        no_optimize: bool,
    },

    /// Run a batch end to end against simulated agents
    Simulate {
        /// Batch file with agents, tasks and global dependencies
        #[arg(short, long)]
        input: PathBuf,

        /// Make the simulated agent report an error for this task (repeatable)
        #[arg(long = "fail", value_name = "TASK_ID")]
        fail: Vec<String>,

        /// Skip the optimization pass
        #[arg(long)]
        no_optimize: bool,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Also write it to ~/.relay/relay.toml
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    relay::log::init(cli.debug);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Plan { input, no_optimize } => {
            if no_optimize {
                config.planner.optimize = false;
            }
            run_plan(&input, &config)
        }
        Command::Simulate {
            input,
            fail,
            no_optimize,
        } => {
            if no_optimize {
                config.planner.optimize = false;
            }
            run_simulate(&input, &config, fail.into_iter().map(TaskId::from).collect())
        }
        Command::Config { save } => {
            print!("{}", toml::to_string_pretty(&config)?);
            if save {
                config.save()?;
                info!(path = %Config::config_path()?.display(), "Configuration saved");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.validate()?;
    Ok(config)
}

fn run_plan(input: &Path, config: &Config) -> Result<()> {
    let batch = Batch::load(input)?;
    debug!(
        agents = batch.agents.len(),
        tasks = batch.tasks.len(),
        "Loaded batch"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let plan = rt.block_on(async {
        let registry = Arc::new(
            InMemoryRegistry::with_agents(config.coordinator.registry_smoothing, batch.agents)
                .await,
        );
        // Planning never dispatches; the outbox is dropped unread.
        let (messenger, _outbox) = ChannelMessenger::channel(1);
        let orchestrator = Orchestrator::new(config, registry, Arc::new(messenger));
        let (plan, _) = orchestrator
            .plan(&batch.tasks, &batch.global_dependencies)
            .await?;
        Ok::<_, relay::Error>(plan)
    })?;

    println!("{}", plan.to_json()?);
    Ok(())
}

fn run_simulate(input: &Path, config: &Config, failing: HashSet<TaskId>) -> Result<()> {
    let batch = Batch::load(input)?;
    let rt = tokio::runtime::Runtime::new()?;

    let report = rt.block_on(async {
        let registry = Arc::new(
            InMemoryRegistry::with_agents(config.coordinator.registry_smoothing, batch.agents)
                .await,
        );
        let (messenger, outbox) = ChannelMessenger::channel(SIM_CHANNEL_CAPACITY);
        let (events_tx, mut events) = mpsc::channel(SIM_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(SIM_CHANNEL_CAPACITY);

        let orchestrator = Orchestrator::new(config, registry.clone(), Arc::new(messenger))
            .with_events(events_tx);

        tokio::spawn(simulate_agents(
            outbox,
            inbound_tx,
            registry,
            failing,
        ));

        let shutdown = CancellationToken::new();
        let runner = {
            let coordinator = orchestrator.coordinator().clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { coordinator.run(inbound_rx, shutdown).await })
        };

        let plan_id = orchestrator
            .orchestrate(batch.tasks, &batch.global_dependencies)
            .await?;

        while let Some(event) = events.recv().await {
            if event.plan_id() != plan_id {
                continue;
            }
            print_event(&event);
            if event.is_terminal() {
                break;
            }
        }

        shutdown.cancel();
        if let Ok(result) = runner.await {
            result?;
        }

        if let Some(plan) = orchestrator
            .history()
            .for_plan(&plan_id)
            .await
            .into_iter()
            .find_map(|entry| match entry.event {
                HistoryEvent::PlanCreated { plan, .. } => Some(plan),
                _ => None,
            })
        {
            let order: Vec<String> = dispatch_order(&plan)
                .iter()
                .map(ToString::to_string)
                .collect();
            info!(order = %order.join(" "), "Planned dispatch order");
        }

        orchestrator.coordinator().get_plan_status(&plan_id).await
    })?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Answer every assignment right away: an error report for tasks listed in
/// `failing`, a completion taking the estimated duration otherwise.
async fn simulate_agents(
    mut outbox: mpsc::Receiver<(AgentId, AgentMessage)>,
    inbound: mpsc::Sender<AgentMessage>,
    registry: Arc<InMemoryRegistry>,
    failing: HashSet<TaskId>,
) {
    while let Some((agent_id, message)) = outbox.recv().await {
        let AgentMessage::TaskAssignment {
            task_id, payload, ..
        } = message
        else {
            continue;
        };

        let reply = if failing.contains(&task_id) {
            AgentMessage::error_report(
                payload.plan_id,
                task_id,
                agent_id,
                format!("simulated failure on attempt {}", payload.attempt),
            )
        } else {
            let cost = registry
                .get(&agent_id)
                .await
                .map_or(0.0, |a| a.cost_metrics.avg_cost_per_task_usd);
            AgentMessage::completion(
                payload.plan_id,
                task_id,
                agent_id,
                payload.task_requirements.duration_minutes(),
                cost,
            )
        };

        if inbound.send(reply).await.is_err() {
            break;
        }
    }
}

fn print_event(event: &CoordinatorEvent) {
    match event {
        CoordinatorEvent::PhaseDispatched {
            phase_number,
            task_ids,
            ..
        } => {
            let ids: Vec<String> = task_ids.iter().map(ToString::to_string).collect();
            eprintln!("phase {} dispatched: {}", phase_number, ids.join(", "));
        }
        CoordinatorEvent::TaskCompleted {
            task_id, agent_id, ..
        } => eprintln!("  {} completed by {}", task_id, agent_id),
        CoordinatorEvent::TaskFailed {
            task_id,
            agent_id,
            error,
            attempt,
            ..
        } => eprintln!(
            "  {} failed on {} (attempt {}): {}",
            task_id, agent_id, attempt, error
        ),
        CoordinatorEvent::TaskRetried {
            task_id,
            attempt,
            delay,
            ..
        } => eprintln!(
            "  {} retrying as attempt {} in {}s",
            task_id,
            attempt,
            delay.as_secs()
        ),
        CoordinatorEvent::Escalated {
            task_id, attempts, ..
        } => eprintln!("  {} escalated after {} attempt(s)", task_id, attempts),
        CoordinatorEvent::PlanCompleted {
            completed_count,
            failed_count,
            ..
        } => eprintln!(
            "plan completed: {} completed, {} failed",
            completed_count, failed_count
        ),
        CoordinatorEvent::PlanFailed { task_id, .. } => {
            eprintln!("plan failed: critical task {} exhausted its attempts", task_id)
        }
    }
}
