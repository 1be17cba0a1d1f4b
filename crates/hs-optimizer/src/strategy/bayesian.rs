//! Surrogate-guided (Bayesian) search.
//!
//! Until `warm_up` finite observations exist the strategy samples uniformly
//! at random. After that, each step draws a pool of unobserved candidate
//! positions (the whole grid when it is small enough), asks the surrogate for
//! mean and uncertainty, and proposes the candidate with the highest upper
//! confidence bound `mean + kappa * uncertainty`. The surrogate is refitted
//! after every report.

use std::collections::HashSet;

use hs_types::{Position, SpaceEncoder, SurrogateModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{SearchRng, SearchStrategy};
use crate::candidate::Scored;

/// Attempts at drawing an unobserved position during cold start.
const FRESH_RETRIES: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BayesianParams {
    /// Finite observations required before the surrogate is consulted.
    pub warm_up: usize,
    /// Exploration weight of the upper confidence bound.
    pub kappa: f64,
    /// Size of the random candidate pool per step.
    pub n_candidates: usize,
    /// Neighbors used by the built-in surrogate.
    pub k_neighbors: usize,
}

impl Default for BayesianParams {
    fn default() -> Self {
        Self {
            warm_up: 5,
            kappa: 2.0,
            n_candidates: 256,
            k_neighbors: 5,
        }
    }
}

pub struct BayesianSearch {
    params: BayesianParams,
    surrogate: Box<dyn SurrogateModel>,
    /// Finite observations only; these are what the surrogate is fitted on.
    observations: Vec<(Position, f64)>,
    /// Every position reported so far, failed ones included.
    observed: HashSet<Position>,
    fitted: bool,
}

impl std::fmt::Debug for BayesianSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BayesianSearch")
            .field("params", &self.params)
            .field("surrogate", &self.surrogate.name())
            .field("observations", &self.observations.len())
            .field("fitted", &self.fitted)
            .finish()
    }
}

impl BayesianSearch {
    pub fn new(params: BayesianParams, surrogate: Box<dyn SurrogateModel>) -> Self {
        Self {
            params,
            surrogate,
            observations: Vec::new(),
            observed: HashSet::new(),
            fitted: false,
        }
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Add observations and refit the surrogate once past the warm-up.
    pub fn observe(&mut self, results: &[Scored]) {
        for r in results {
            if self.observed.insert(r.position.clone()) && r.score.is_finite() {
                self.observations.push((r.position.clone(), r.score));
            }
        }

        if self.observations.len() < self.params.warm_up.max(1) {
            return;
        }
        match self.surrogate.fit(&self.observations) {
            Ok(()) => self.fitted = true,
            Err(e) => {
                warn!(surrogate = self.surrogate.name(), error = %e, "surrogate fit failed, sampling randomly");
                self.fitted = false;
            }
        }
    }

    fn random_unobserved(&self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Position {
        let mut position = encoder.random_position(rng);
        for _ in 0..FRESH_RETRIES {
            if !self.observed.contains(&position) {
                break;
            }
            position = encoder.random_position(rng);
        }
        position
    }

    fn candidate_pool(&self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Vec<Position> {
        let n = self.params.n_candidates.max(1);
        let pool = match encoder.grid_size() {
            Some(size) if size <= n => enumerate_grid(encoder.sizes()),
            _ => {
                let mut seen = HashSet::new();
                (0..n)
                    .map(|_| encoder.random_position(rng))
                    .filter(|p| seen.insert(p.clone()))
                    .collect()
            }
        };
        pool.into_iter().filter(|p| !self.observed.contains(p)).collect()
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Vec<Position> {
        if !self.fitted {
            return vec![self.random_unobserved(encoder, rng)];
        }

        let pool = self.candidate_pool(encoder, rng);
        if pool.is_empty() {
            return vec![encoder.random_position(rng)];
        }

        match self.surrogate.predict(&pool) {
            Ok(predictions) => {
                let kappa = self.params.kappa;
                let best = predictions
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (i, p.upper_confidence_bound(kappa)))
                    .filter(|(_, ucb)| !ucb.is_nan())
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                match best {
                    Some((i, ucb)) if i < pool.len() => {
                        debug!(position = %pool[i], ucb, "acquisition maximum");
                        vec![pool[i].clone()]
                    }
                    _ => vec![self.random_unobserved(encoder, rng)],
                }
            }
            Err(e) => {
                warn!(surrogate = self.surrogate.name(), error = %e, "surrogate prediction failed, sampling randomly");
                vec![self.random_unobserved(encoder, rng)]
            }
        }
    }

    fn report(&mut self, results: &[Scored], _encoder: &SpaceEncoder, _rng: &mut SearchRng) {
        self.observe(results);
    }

    fn seed_start(&mut self, start: Scored) {
        self.observe(&[start]);
    }

    fn name(&self) -> &'static str {
        "bayesian"
    }
}

/// Every lattice point, last dimension varying fastest.
fn enumerate_grid(sizes: &[usize]) -> Vec<Position> {
    let mut result: Vec<Vec<usize>> = vec![Vec::new()];
    for &size in sizes {
        let mut next = Vec::with_capacity(result.len() * size);
        for existing in &result {
            for idx in 0..size {
                let mut combo = existing.clone();
                combo.push(idx);
                next.push(combo);
            }
        }
        result = next;
    }
    result.into_iter().map(Position::new).collect()
}
