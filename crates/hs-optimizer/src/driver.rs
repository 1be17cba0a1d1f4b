//! Single-job search loop.
//!
//! A driver owns one strategy, one evaluation cache, its own seeded random
//! generator and the best result found so far. Drivers share nothing
//! mutable, so several can run side by side over the same encoder and
//! evaluator.

use std::time::{Duration, Instant};

use chrono::Utc;
use hs_types::{Evaluator, HsResult, Position, SpaceEncoder, SurrogateModel};
use rand::SeedableRng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CachedEvaluation, EvaluationCache};
use crate::candidate::{BestResult, Scored};
use crate::config::SearchConfig;
use crate::report::{DriverReport, HistoryPoint, TerminationReason};
use crate::strategy::{SearchRng, SearchStrategy, Strategy};

/// Iteration index used for start-up evaluations.
const STARTUP_ITERATION: usize = 0;

fn out_of_time(started: Instant, time_budget: Option<Duration>) -> bool {
    time_budget.map_or(false, |limit| started.elapsed() >= limit)
}

pub struct SearchDriver<'a, E: Evaluator + ?Sized> {
    job: usize,
    seed: u64,
    config: &'a SearchConfig,
    encoder: &'a SpaceEncoder,
    evaluator: &'a E,
    strategy: Strategy,
    cache: EvaluationCache,
    rng: SearchRng,
    best: BestResult,
    history: Vec<HistoryPoint>,
}

impl<'a, E: Evaluator + ?Sized> SearchDriver<'a, E> {
    pub fn new(
        job: usize,
        seed: u64,
        config: &'a SearchConfig,
        encoder: &'a SpaceEncoder,
        evaluator: &'a E,
    ) -> Self {
        let cache = if config.memory {
            EvaluationCache::new()
        } else {
            EvaluationCache::disabled()
        };
        Self {
            job,
            seed,
            config,
            encoder,
            evaluator,
            strategy: Strategy::from_config(&config.strategy, None),
            cache,
            rng: SearchRng::seed_from_u64(seed),
            best: BestResult::sentinel(job),
            history: Vec::new(),
        }
    }

    /// Use `surrogate` instead of the built-in model (Bayesian strategy only).
    pub fn with_surrogate(mut self, surrogate: Box<dyn SurrogateModel>) -> Self {
        self.strategy = Strategy::from_config(&self.config.strategy, Some(surrogate));
        self
    }

    pub fn best(&self) -> &BestResult {
        &self.best
    }

    pub fn cache(&self) -> &EvaluationCache {
        &self.cache
    }

    /// Run until the iteration or time budget is spent.
    ///
    /// The only error is an out-of-range position reaching the cache, which
    /// means a strategy is broken. Evaluation failures are scored `-inf`.
    pub fn run(mut self) -> HsResult<DriverReport> {
        let started_at = Utc::now();
        let started = Instant::now();
        let time_budget = self.config.max_time_secs.map(Duration::from_secs_f64);

        info!(
            job = self.job,
            seed = self.seed,
            strategy = self.strategy.name(),
            n_iter = self.config.n_iter,
            "driver starting"
        );

        self.warm_up(started, time_budget)?;

        let mut termination = TerminationReason::IterationBudget;
        let mut iterations = 0;
        for iteration in 1..=self.config.n_iter {
            if out_of_time(started, time_budget) {
                termination = TerminationReason::TimeBudget;
                break;
            }

            let batch = self.strategy.suggest(self.encoder, &mut self.rng);
            let mut results = Vec::with_capacity(batch.len());
            for position in &batch {
                results.push(self.evaluate(position, iteration)?);
            }
            self.strategy.report(&results, self.encoder, &mut self.rng);
            iterations = iteration;
        }

        let total_seconds = started.elapsed().as_secs_f64();
        let cache_stats = self.cache.get_stats();
        info!(
            job = self.job,
            best_score = self.best.score,
            evaluations = self.history.len(),
            cache_hits = cache_stats.hits,
            termination = ?termination,
            total_seconds,
            "driver finished"
        );

        Ok(DriverReport {
            run_id: Uuid::new_v4(),
            job: self.job,
            seed: self.seed,
            strategy: self.strategy.name().to_string(),
            best: self.best,
            history: self.history,
            cache_stats,
            termination,
            iterations,
            started_at,
            finished_at: Utc::now(),
            total_seconds,
        })
    }

    /// Seed the cache and strategy from the warm start, then evaluate the
    /// scatter positions and the warm-start assignment and hand the best of
    /// them to the strategy as its starting point.
    ///
    /// The time budget is checked before each start-up evaluation; positions
    /// left over when it runs out are skipped.
    fn warm_up(&mut self, started: Instant, time_budget: Option<Duration>) -> HsResult<()> {
        let config = self.config;
        let mut starts: Vec<Position> = Vec::new();

        if let Some(warm) = &config.warm_start {
            let mut seeded = Vec::with_capacity(warm.entries.len());
            let mut prior = Vec::with_capacity(warm.entries.len());
            for entry in &warm.entries {
                match self.encoder.encode(&entry.assignment) {
                    Ok(position) => {
                        let score = if entry.score.is_finite() {
                            entry.score
                        } else {
                            f64::NEG_INFINITY
                        };
                        prior.push(Scored::new(position.clone(), score));
                        seeded.push((
                            position,
                            CachedEvaluation {
                                score,
                                metadata: serde_json::Value::Null,
                                eval_seconds: 0.0,
                                error: None,
                            },
                        ));
                    }
                    Err(e) => {
                        warn!(job = self.job, error = %e, "dropping warm-start entry outside the search space");
                    }
                }
            }
            if !seeded.is_empty() {
                debug!(job = self.job, entries = seeded.len(), "seeding cache from warm start");
            }
            self.cache.seed(seeded);
            self.strategy.observe_prior(&prior);

            if let Some(assignment) = &warm.assignment {
                match self.encoder.encode(assignment) {
                    Ok(position) => starts.push(position),
                    Err(e) => warn!(job = self.job, error = %e, "ignoring warm-start assignment"),
                }
            }
        }

        for _ in 0..config.scatter_init {
            starts.push(self.encoder.random_position(&mut self.rng));
        }

        let mut start: Option<Scored> = None;
        for (done, position) in starts.iter().enumerate() {
            if out_of_time(started, time_budget) {
                debug!(job = self.job, done, skipped = starts.len() - done, "time budget spent during start-up");
                break;
            }
            let scored = self.evaluate(position, STARTUP_ITERATION)?;
            if start.as_ref().map_or(true, |s| scored.score > s.score) {
                start = Some(scored);
            }
        }
        if let Some(start) = start {
            debug!(job = self.job, position = %start.position, score = start.score, "starting point chosen");
            self.strategy.seed_start(start);
        }
        Ok(())
    }

    fn evaluate(&mut self, position: &Position, iteration: usize) -> HsResult<Scored> {
        let entry = self.cache.get_or_evaluate(position, self.encoder, self.evaluator)?;

        let encoder = self.encoder;
        if self
            .best
            .propose(position, || encoder.decode(position).ok(), entry.score, &entry.metadata, iteration)
        {
            debug!(job = self.job, iteration, score = entry.score, position = %position, "new best");
        }

        self.history.push(HistoryPoint {
            iteration,
            position: position.clone(),
            score: entry.score,
        });
        Ok(Scored::new(position.clone(), entry.score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StrategyConfig, WarmStart, WarmStartEntry};
    use crate::strategy::LocalSearchParams;
    use hs_types::{Evaluation, EvaluationError, ParameterAssignment, ParameterValue, SearchSpace};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn grid_space() -> SearchSpace {
        SearchSpace::new().add_int("x", 0, 4).add_int("y", 0, 4)
    }

    fn int(params: &ParameterAssignment, name: &str) -> i64 {
        match params.get(name) {
            Some(ParameterValue::Int(v)) => *v,
            other => panic!("{name} is {other:?}"),
        }
    }

    fn bowl(params: &ParameterAssignment) -> Result<Evaluation, EvaluationError> {
        let x = int(params, "x") as f64;
        let y = int(params, "y") as f64;
        Ok(Evaluation::new(-(x - 2.0).powi(2) - (y - 3.0).powi(2)))
    }

    fn hill_climbing_config() -> SearchConfig {
        SearchConfig::new("bowl", grid_space(), StrategyConfig::HillClimbing(LocalSearchParams::default()))
            .with_n_iter(50)
    }

    #[test]
    fn hill_climbing_finds_the_bowl_minimum() {
        let config = hill_climbing_config();
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();
        let report = SearchDriver::new(0, 1, &config, &encoder, &bowl).run().unwrap();

        assert_eq!(report.best.position, Some(Position::new(vec![2, 3])));
        assert_eq!(report.best.score, 0.0);
        let assignment = report.best.assignment.as_ref().unwrap();
        assert_eq!(assignment.get("x"), Some(&ParameterValue::Int(2)));
        assert_eq!(assignment.get("y"), Some(&ParameterValue::Int(3)));
        assert_eq!(report.termination, TerminationReason::IterationBudget);
        assert_eq!(report.iterations, 50);
    }

    #[test]
    fn best_matches_history_maximum() {
        let config = SearchConfig::new(
            "bowl",
            grid_space(),
            StrategyConfig::StochasticHillClimbing(LocalSearchParams::default()),
        )
        .with_n_iter(30);
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();
        let report = SearchDriver::new(0, 5, &config, &encoder, &bowl).run().unwrap();

        let trace = report.best_so_far();
        assert!(trace.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(trace.last().copied(), Some(report.best.score));

        let first_hit = report
            .history
            .iter()
            .find(|p| p.score == report.best.score)
            .unwrap();
        assert_eq!(report.best.iteration, first_hit.iteration);
        assert_eq!(report.best.position.as_ref(), Some(&first_hit.position));
    }

    #[test]
    fn cache_calls_evaluator_once_per_position() {
        let config = hill_climbing_config();
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();
        let calls = AtomicUsize::new(0);
        let counting = |p: &ParameterAssignment| {
            calls.fetch_add(1, Ordering::SeqCst);
            bowl(p)
        };
        let report = SearchDriver::new(0, 2, &config, &encoder, &counting).run().unwrap();

        let distinct: HashSet<&Position> = report.history.iter().map(|p| &p.position).collect();
        assert_eq!(calls.load(Ordering::SeqCst), distinct.len());
        assert!(distinct.len() < report.evaluations());
        assert_eq!(report.cache_stats.misses as usize, distinct.len());
    }

    #[test]
    fn disabled_memory_reevaluates() {
        let config = hill_climbing_config().with_memory(false).with_n_iter(10);
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();
        let calls = AtomicUsize::new(0);
        let counting = |p: &ParameterAssignment| {
            calls.fetch_add(1, Ordering::SeqCst);
            bowl(p)
        };
        let report = SearchDriver::new(0, 2, &config, &encoder, &counting).run().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), report.evaluations());
    }

    #[test]
    fn time_budget_stops_the_loop() {
        let config = SearchConfig::new("slow", grid_space(), StrategyConfig::RandomSearch)
            .with_n_iter(100_000)
            .with_max_time(0.02)
            .with_memory(false);
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();
        let slow = |p: &ParameterAssignment| {
            std::thread::sleep(Duration::from_millis(2));
            bowl(p)
        };
        let report = SearchDriver::new(0, 3, &config, &encoder, &slow).run().unwrap();
        assert_eq!(report.termination, TerminationReason::TimeBudget);
        assert!(report.iterations < 100_000);
        assert!(report.iterations >= 1);
    }

    #[test]
    fn failed_evaluations_never_become_best() {
        let config = hill_climbing_config().with_n_iter(5);
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();
        let failing = |_: &ParameterAssignment| -> Result<Evaluation, EvaluationError> {
            Err(EvaluationError::new("diverged"))
        };
        let report = SearchDriver::new(0, 4, &config, &encoder, &failing).run().unwrap();
        assert!(report.best.is_sentinel());
        assert!(report.history.iter().all(|p| p.score == f64::NEG_INFINITY));
        assert!(report.cache_stats.failures > 0);
    }

    #[test]
    fn warm_start_is_served_from_the_cache() {
        let optimum = ParameterAssignment::new().with("x", 2i64).with("y", 3i64);
        let warm = WarmStart {
            assignment: Some(optimum.clone()),
            entries: vec![
                WarmStartEntry {
                    assignment: optimum,
                    score: 0.0,
                },
                WarmStartEntry {
                    assignment: ParameterAssignment::new().with("x", 99i64).with("y", 0i64),
                    score: 5.0,
                },
            ],
        };
        let config = hill_climbing_config().with_n_iter(3).with_warm_start(warm);
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();

        let optimum_calls = AtomicUsize::new(0);
        let counting = |p: &ParameterAssignment| {
            if int(p, "x") == 2 && int(p, "y") == 3 {
                optimum_calls.fetch_add(1, Ordering::SeqCst);
            }
            bowl(p)
        };
        let report = SearchDriver::new(0, 6, &config, &encoder, &counting).run().unwrap();

        assert_eq!(optimum_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.best.position, Some(Position::new(vec![2, 3])));
        assert_eq!(report.best.iteration, STARTUP_ITERATION);
        // The out-of-space entry is dropped, the other one is seeded.
        assert_eq!(report.cache_stats.seeded, 1);
    }

    #[test]
    fn scatter_init_evaluates_before_the_loop() {
        let config = hill_climbing_config().with_n_iter(2).with_scatter_init(4);
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();
        let report = SearchDriver::new(0, 7, &config, &encoder, &bowl).run().unwrap();
        let startup = report.history.iter().filter(|p| p.iteration == STARTUP_ITERATION).count();
        assert_eq!(startup, 4);
    }

    #[test]
    fn time_budget_covers_start_up_evaluations() {
        let config = hill_climbing_config()
            .with_scatter_init(1_000)
            .with_max_time(0.02)
            .with_memory(false);
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();
        let slow = |p: &ParameterAssignment| {
            std::thread::sleep(Duration::from_millis(2));
            bowl(p)
        };
        let report = SearchDriver::new(0, 8, &config, &encoder, &slow).run().unwrap();

        assert_eq!(report.termination, TerminationReason::TimeBudget);
        assert_eq!(report.iterations, 0);
        assert!(report.evaluations() >= 1);
        assert!(report.evaluations() < 1_000);
        assert!(!report.best.is_sentinel());
    }

    #[test]
    fn same_seed_same_history() {
        let config = SearchConfig::new("pt", grid_space(), StrategyConfig::ParallelTempering(Default::default()))
            .with_n_iter(20);
        let encoder = SpaceEncoder::new(config.search_space.clone()).unwrap();
        let a = SearchDriver::new(0, 11, &config, &encoder, &bowl).run().unwrap();
        let b = SearchDriver::new(0, 11, &config, &encoder, &bowl).run().unwrap();
        assert_eq!(a.history, b.history);
        assert_eq!(a.best, b.best);
    }
}
