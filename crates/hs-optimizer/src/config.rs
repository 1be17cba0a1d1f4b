//! Search run configuration.

use std::path::Path;

use chrono::{DateTime, Utc};
use hs_types::{config_error, HsResult, ParameterAssignment, SearchSpace};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candidate::failed_score;
use crate::executor::ExecutorKind;
use crate::strategy::{AnnealingParams, BayesianParams, EvolutionParams, LocalSearchParams, SwarmParams};

/// Unique search run identifier.
pub type SearchId = Uuid;

/// Which strategy to run, with its hyperparameters.
///
/// Serialized with an internal `"kind"` tag; omitted hyperparameters take
/// their defaults, so `{"kind": "tabu_search"}` is a complete entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    RandomSearch,
    HillClimbing(LocalSearchParams),
    StochasticHillClimbing(LocalSearchParams),
    RandomRestartHillClimbing(LocalSearchParams),
    TabuSearch(LocalSearchParams),
    SimulatedAnnealing(AnnealingParams),
    RandomAnnealing(AnnealingParams),
    StochasticTunneling(AnnealingParams),
    ParallelTempering(AnnealingParams),
    ParticleSwarm(SwarmParams),
    EvolutionStrategy(EvolutionParams),
    Bayesian(BayesianParams),
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::HillClimbing(LocalSearchParams::default())
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> HsResult<()> {
        match self {
            Self::RandomSearch => Ok(()),
            Self::HillClimbing(p) | Self::StochasticHillClimbing(p) | Self::RandomRestartHillClimbing(p) => {
                validate_local(p)
            }
            Self::TabuSearch(p) => {
                validate_local(p)?;
                if p.tabu_tenure == 0 {
                    return Err(config_error!("tabu_tenure must be at least 1"));
                }
                Ok(())
            }
            Self::SimulatedAnnealing(p) | Self::RandomAnnealing(p) | Self::StochasticTunneling(p) => {
                validate_annealing(p)
            }
            Self::ParallelTempering(p) => {
                validate_annealing(p)?;
                if p.n_chains == 0 {
                    return Err(config_error!("n_chains must be at least 1"));
                }
                if !(p.temperature_ratio.is_finite() && p.temperature_ratio > 0.0) {
                    return Err(config_error!("temperature_ratio must be positive, got {}", p.temperature_ratio));
                }
                if p.swap_interval == 0 {
                    return Err(config_error!("swap_interval must be at least 1"));
                }
                Ok(())
            }
            Self::ParticleSwarm(p) => {
                if p.n_particles == 0 {
                    return Err(config_error!("n_particles must be at least 1"));
                }
                for (name, value) in [
                    ("inertia", p.inertia),
                    ("cognitive", p.cognitive),
                    ("social", p.social),
                    ("init_velocity", p.init_velocity),
                ] {
                    if !value.is_finite() || value < 0.0 {
                        return Err(config_error!("{name} must be finite and non-negative, got {value}"));
                    }
                }
                Ok(())
            }
            Self::EvolutionStrategy(p) => {
                if p.population_size == 0 {
                    return Err(config_error!("population_size must be at least 1"));
                }
                check_fraction("selection_fraction", p.selection_fraction)?;
                check_epsilon("mutation_epsilon", p.mutation_epsilon)?;
                check_probability("crossover_rate", p.crossover_rate)
            }
            Self::Bayesian(p) => {
                if p.n_candidates == 0 {
                    return Err(config_error!("n_candidates must be at least 1"));
                }
                if p.k_neighbors == 0 {
                    return Err(config_error!("k_neighbors must be at least 1"));
                }
                if !p.kappa.is_finite() || p.kappa < 0.0 {
                    return Err(config_error!("kappa must be finite and non-negative, got {}", p.kappa));
                }
                Ok(())
            }
        }
    }
}

fn validate_local(p: &LocalSearchParams) -> HsResult<()> {
    check_epsilon("epsilon", p.epsilon)?;
    if p.n_neighbours == 0 {
        return Err(config_error!("n_neighbours must be at least 1"));
    }
    check_probability("p_accept", p.p_accept)?;
    if !p.norm_factor.is_finite() || p.norm_factor < 0.0 {
        return Err(config_error!("norm_factor must be finite and non-negative, got {}", p.norm_factor));
    }
    if p.n_iter_restart == 0 {
        return Err(config_error!("n_iter_restart must be at least 1"));
    }
    Ok(())
}

fn validate_annealing(p: &AnnealingParams) -> HsResult<()> {
    check_epsilon("epsilon", p.epsilon)?;
    if !(p.cooling_rate > 0.0 && p.cooling_rate < 1.0) {
        return Err(config_error!("cooling_rate must be in (0, 1), got {}", p.cooling_rate));
    }
    if !(p.min_temperature.is_finite() && p.min_temperature > 0.0) {
        return Err(config_error!("min_temperature must be positive, got {}", p.min_temperature));
    }
    if !(p.start_temperature.is_finite() && p.start_temperature >= p.min_temperature) {
        return Err(config_error!(
            "start_temperature must be at least min_temperature ({}), got {}",
            p.min_temperature,
            p.start_temperature
        ));
    }
    if !p.gamma.is_finite() || p.gamma < 0.0 {
        return Err(config_error!("gamma must be finite and non-negative, got {}", p.gamma));
    }
    Ok(())
}

fn check_epsilon(name: &str, value: f64) -> HsResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(config_error!("{name} must be positive, got {value}"))
    }
}

fn check_fraction(name: &str, value: f64) -> HsResult<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(config_error!("{name} must be in (0, 1], got {value}"))
    }
}

fn check_probability(name: &str, value: f64) -> HsResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error!("{name} must be in [0, 1], got {value}"))
    }
}

/// A previously evaluated assignment to seed into the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmStartEntry {
    pub assignment: ParameterAssignment,
    /// `null` marks an assignment that failed to evaluate.
    #[serde(with = "failed_score")]
    pub score: f64,
}

/// Results carried over from an earlier run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmStart {
    /// Starting point for every driver.
    #[serde(default)]
    pub assignment: Option<ParameterAssignment>,
    /// Known scores, trusted as-is.
    #[serde(default)]
    pub entries: Vec<WarmStartEntry>,
}

/// Top-level configuration for a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "Uuid::new_v4")]
    pub id: SearchId,
    #[serde(default)]
    pub name: String,

    pub search_space: SearchSpace,

    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Iterations per driver.
    #[serde(default = "default_n_iter")]
    pub n_iter: usize,

    /// Wall-clock budget per driver, checked between iterations.
    #[serde(default)]
    pub max_time_secs: Option<f64>,

    /// Number of independent drivers.
    #[serde(default = "default_n_jobs")]
    pub n_jobs: usize,

    /// Base seed; each driver derives its own. `None` draws a fresh base.
    #[serde(default = "default_random_state")]
    pub random_state: Option<u64>,

    /// Memoize evaluations per position.
    #[serde(default = "default_memory")]
    pub memory: bool,

    /// Random positions evaluated before the first iteration to pick a start.
    #[serde(default)]
    pub scatter_init: usize,

    #[serde(default)]
    pub warm_start: Option<WarmStart>,

    #[serde(default)]
    pub executor: ExecutorKind,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_n_iter() -> usize {
    10
}

fn default_n_jobs() -> usize {
    1
}

fn default_random_state() -> Option<u64> {
    Some(1)
}

fn default_memory() -> bool {
    true
}

impl SearchConfig {
    pub fn new(name: impl Into<String>, search_space: SearchSpace, strategy: StrategyConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            search_space,
            strategy,
            n_iter: default_n_iter(),
            max_time_secs: None,
            n_jobs: default_n_jobs(),
            random_state: default_random_state(),
            memory: default_memory(),
            scatter_init: 0,
            warm_start: None,
            executor: ExecutorKind::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_n_iter(mut self, n: usize) -> Self {
        self.n_iter = n;
        self
    }

    pub fn with_max_time(mut self, secs: f64) -> Self {
        self.max_time_secs = Some(secs);
        self
    }

    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = n;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_memory(mut self, memory: bool) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_scatter_init(mut self, n: usize) -> Self {
        self.scatter_init = n;
        self
    }

    pub fn with_warm_start(mut self, warm_start: WarmStart) -> Self {
        self.warm_start = Some(warm_start);
        self
    }

    pub fn with_executor(mut self, executor: ExecutorKind) -> Self {
        self.executor = executor;
        self
    }

    /// Check budgets, job count and strategy hyperparameters.
    pub fn validate(&self) -> HsResult<()> {
        if self.n_iter == 0 {
            return Err(config_error!("n_iter must be at least 1"));
        }
        if self.n_jobs == 0 {
            return Err(config_error!("n_jobs must be at least 1"));
        }
        if let Some(secs) = self.max_time_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(config_error!("max_time_secs must be positive and finite, got {secs}"));
            }
        }
        if let ExecutorKind::Threads { max_workers: 0 } = self.executor {
            return Err(config_error!("max_workers must be at least 1"));
        }
        self.strategy.validate()
    }

    pub fn from_json_str(json: &str) -> HsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> HsResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> HsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
