use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};
use tracing::debug;

/// Weights of the four selector score components. They should sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub capability: f64,
    pub performance: f64,
    pub availability: f64,
    pub cost: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            capability: 0.40,
            performance: 0.30,
            availability: 0.20,
            cost: 0.10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub weights: ScoreWeights,
    /// Candidates scoring below this on availability are considered overloaded.
    pub availability_threshold: f64,
    pub max_agents_per_task: usize,
    /// Average duration at which the speed score bottoms out.
    pub speed_baseline_minutes: f64,
    /// Estimated cost at which the cost score bottoms out.
    pub cost_ceiling_usd: f64,
    /// Agents exposing more capabilities than this count as generalists.
    pub generalist_capability_limit: usize,
    pub generalist_penalty: f64,
    /// Largest bonus for matching input modalities.
    pub modality_bonus: f64,
    /// Score penalty per earlier pick of the same agent within one batch.
    pub batch_load_penalty: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            availability_threshold: 0.7,
            max_agents_per_task: 3,
            speed_baseline_minutes: 30.0,
            cost_ceiling_usd: 1.0,
            generalist_capability_limit: 10,
            generalist_penalty: 0.9,
            modality_bonus: 0.10,
            batch_load_penalty: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub max_parallel_agents: usize,
    /// Run the optimization pass after building a plan.
    pub optimize: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_parallel_agents: 10,
            optimize: true,
        }
    }
}

/// What the coordinator does when a dispatched task fails.
///
/// The defaults never retry and never fail the plan: a failed task is
/// recorded and the phase barrier still resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailurePolicy {
    /// Total dispatch attempts per task, including the first.
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    /// Record an escalation for human review once a task runs out of attempts.
    pub escalate_on_exhaustion: bool,
    /// Move the plan to `failed` when a critical-path task runs out of attempts.
    pub fail_plan_on_critical_failure: bool,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_base_secs: 5,
            backoff_max_secs: 300,
            escalate_on_exhaustion: true,
            fail_plan_on_critical_failure: false,
        }
    }
}

impl FailurePolicy {
    /// Delay before dispatching attempt `failed_attempts + 1`.
    ///
    /// Doubles with every failed attempt, capped at `backoff_max_secs`.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        let secs = self
            .backoff_base_secs
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_max_secs);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub failure_policy: FailurePolicy,
    /// Deadline per assignment as a multiple of its estimated duration.
    /// Zero disables deadlines.
    pub deadline_safety_factor: f64,
    /// Weight of the newest sample when rolling agent performance metrics.
    pub registry_smoothing: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            deadline_safety_factor: 2.0,
            registry_smoothing: 0.2,
        }
    }
}

impl CoordinatorConfig {
    /// Deadline for an assignment with the given estimate, if deadlines are on.
    pub fn deadline_for(&self, estimated_minutes: f64) -> Option<Duration> {
        let secs = estimated_minutes * 60.0 * self.deadline_safety_factor;
        if secs.is_finite() && secs > 0.0 {
            Some(Duration::from_secs_f64(secs))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl Config {
    pub fn relay_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".relay"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::relay_dir()?.join("relay.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load");
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            max_attempts = config.coordinator.failure_policy.max_attempts,
            max_parallel_agents = config.planner.max_parallel_agents,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let relay_dir = Self::relay_dir()?;
        if !relay_dir.exists() {
            debug!("Creating relay directory");
            fs::create_dir_all(&relay_dir)?;
        }
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.coordinator.failure_policy.max_attempts == 0 {
            return Err(Error::Validation(
                "coordinator.failure_policy.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.selector.max_agents_per_task == 0 {
            return Err(Error::Validation(
                "selector.max_agents_per_task must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.coordinator.registry_smoothing) {
            return Err(Error::Validation(
                "coordinator.registry_smoothing must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
