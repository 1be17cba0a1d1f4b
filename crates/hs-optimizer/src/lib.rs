//! # hs-optimizer
//!
//! Metaheuristic search over discrete parameter spaces for HyperSearch.
//!
//! Provides the strategy state machines (random, local, annealing, swarm,
//! evolution and surrogate-guided search), the per-run evaluation cache, the
//! single-job search driver, and a coordinator that fans independent drivers
//! out over sequential, threaded or rayon backends.

pub mod benchmarks;
mod cache;
mod candidate;
mod config;
mod coordinator;
mod driver;
mod executor;
mod report;
pub mod strategy;

pub use benchmarks::Benchmark;
pub use cache::{CacheStats, CachedEvaluation, EvaluationCache};
pub use candidate::{BestResult, Candidate, Scored};
pub use config::{SearchConfig, SearchId, StrategyConfig, WarmStart, WarmStartEntry};
pub use coordinator::{derive_seeds, splitmix64, RunCoordinator, SurrogateFactory};
pub use driver::SearchDriver;
pub use executor::{ExecutorKind, RayonExecutor, SequentialExecutor, Task, TaskExecutor, ThreadExecutor};
pub use report::{DriverReport, HistoryPoint, SearchOutcome, TerminationReason};
pub use strategy::{SearchRng, SearchStrategy, Strategy};
