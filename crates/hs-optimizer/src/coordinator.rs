//! Fan-out of independent search drivers and reduction of their results.

use std::sync::Arc;
use std::time::Instant;

use hs_types::{Evaluator, HsError, HsResult, SpaceEncoder, SurrogateModel};
use tracing::info;

use crate::candidate::BestResult;
use crate::config::SearchConfig;
use crate::driver::SearchDriver;
use crate::executor::Task;
use crate::report::{DriverReport, SearchOutcome};

/// Builds a fresh surrogate for each Bayesian driver.
pub type SurrogateFactory = Arc<dyn Fn() -> Box<dyn SurrogateModel> + Send + Sync>;

/// SplitMix64 finalizer.
pub fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Per-job seeds `splitmix64(base + i)`.
pub fn derive_seeds(base: u64, n_jobs: usize) -> Vec<u64> {
    (0..n_jobs as u64).map(|i| splitmix64(base.wrapping_add(i))).collect()
}

/// Runs `n_jobs` drivers over one shared encoder and evaluator.
pub struct RunCoordinator {
    config: SearchConfig,
    encoder: SpaceEncoder,
    surrogate_factory: Option<SurrogateFactory>,
}

impl RunCoordinator {
    /// Validate `config` and build the shared encoder.
    pub fn new(config: SearchConfig) -> HsResult<Self> {
        config.validate()?;
        let encoder = SpaceEncoder::new(config.search_space.clone())?;
        Ok(Self {
            config,
            encoder,
            surrogate_factory: None,
        })
    }

    pub fn with_surrogate_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn SurrogateModel> + Send + Sync + 'static,
    {
        self.surrogate_factory = Some(Arc::new(factory));
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn encoder(&self) -> &SpaceEncoder {
        &self.encoder
    }

    /// Seeds for each job. Without a `random_state` a fresh base is drawn on
    /// every call.
    pub fn job_seeds(&self) -> Vec<u64> {
        let base = self.config.random_state.unwrap_or_else(rand::random);
        derive_seeds(base, self.config.n_jobs)
    }

    /// Run every driver through the configured executor and reduce.
    pub fn run<E>(&self, evaluator: &E) -> HsResult<SearchOutcome>
    where
        E: Evaluator + ?Sized,
    {
        let started = Instant::now();
        let seeds = self.job_seeds();
        info!(
            search_id = %self.config.id,
            name = %self.config.name,
            n_jobs = self.config.n_jobs,
            executor = self.config.executor.name(),
            "search starting"
        );

        let tasks: Vec<Task<'_, HsResult<DriverReport>>> = seeds
            .iter()
            .enumerate()
            .map(|(job, &seed)| {
                let config = &self.config;
                let encoder = &self.encoder;
                let factory = self.surrogate_factory.clone();
                Box::new(move || {
                    let mut driver = SearchDriver::new(job, seed, config, encoder, evaluator);
                    if let Some(factory) = factory {
                        driver = driver.with_surrogate(factory());
                    }
                    driver.run()
                }) as Task<'_, HsResult<DriverReport>>
            })
            .collect();

        let reports = self
            .config
            .executor
            .execute(tasks)
            .into_iter()
            .collect::<HsResult<Vec<_>>>()?;

        let best = reduce(&reports)?;
        let total_seconds = started.elapsed().as_secs_f64();
        info!(
            search_id = %self.config.id,
            best_score = best.score,
            best_job = best.job,
            best_iteration = best.iteration,
            total_seconds,
            "search finished"
        );

        Ok(SearchOutcome {
            search_id: self.config.id,
            best,
            reports,
            total_seconds,
        })
    }
}

/// Highest score wins; ties go to the earlier iteration, then the lower job.
fn reduce(reports: &[DriverReport]) -> HsResult<BestResult> {
    let mut best: Option<&BestResult> = None;
    for report in reports {
        if best.map_or(true, |b| report.best.beats(b)) {
            best = Some(&report.best);
        }
    }
    match best {
        Some(b) if !b.is_sentinel() => Ok(b.clone()),
        _ => Err(HsError::NoViableCandidate),
    }
}
