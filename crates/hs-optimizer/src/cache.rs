use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use hs_types::{Evaluator, HsResult, Position, SpaceEncoder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::candidate::failed_score;

/// Memoized outcome of one evaluator call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEvaluation {
    /// `-inf` when the evaluation failed.
    #[serde(with = "failed_score")]
    pub score: f64,
    pub metadata: serde_json::Value,
    /// Wall-clock seconds spent in the evaluator.
    pub eval_seconds: f64,
    /// Failure message if the evaluator errored or returned a non-finite score.
    pub error: Option<String>,
}

impl CachedEvaluation {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Exact-match memo of evaluations, owned by one search driver for one run.
#[derive(Debug)]
pub struct EvaluationCache {
    entries: HashMap<Position, CachedEvaluation>,
    enabled: bool,
    stats: CacheStats,
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            enabled: true,
            stats: CacheStats::default(),
        }
    }

    /// Cache that records results but never serves them back, so every
    /// request reaches the evaluator.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the cached result for `position`, or decode it, call the
    /// evaluator once and remember the outcome.
    ///
    /// Evaluator failures are recorded as `-inf` and never returned as errors;
    /// the only error is a decode failure, which means a strategy produced an
    /// out-of-range position.
    pub fn get_or_evaluate<E>(
        &mut self,
        position: &Position,
        encoder: &SpaceEncoder,
        evaluator: &E,
    ) -> HsResult<CachedEvaluation>
    where
        E: Evaluator + ?Sized,
    {
        if self.enabled {
            if let Some(hit) = self.entries.get(position) {
                self.stats.hits += 1;
                return Ok(hit.clone());
            }
        }

        let params = encoder.decode(position)?;
        self.stats.misses += 1;

        let started = Instant::now();
        let outcome = evaluator.evaluate(&params);
        let eval_seconds = started.elapsed().as_secs_f64();
        self.stats.eval_seconds += eval_seconds;

        let entry = match outcome {
            Ok(eval) if eval.score.is_finite() => CachedEvaluation {
                score: eval.score,
                metadata: eval.metadata,
                eval_seconds,
                error: None,
            },
            Ok(eval) => {
                warn!(position = %position, score = eval.score, "evaluator returned a non-finite score");
                self.stats.failures += 1;
                CachedEvaluation {
                    score: f64::NEG_INFINITY,
                    metadata: eval.metadata,
                    eval_seconds,
                    error: Some(format!("non-finite score {}", eval.score)),
                }
            }
            Err(e) => {
                warn!(position = %position, error = %e, "evaluation failed");
                self.stats.failures += 1;
                CachedEvaluation {
                    score: f64::NEG_INFINITY,
                    metadata: serde_json::Value::Null,
                    eval_seconds,
                    error: Some(e.message),
                }
            }
        };

        self.entries.insert(position.clone(), entry.clone());
        Ok(entry)
    }

    /// Pre-populate the cache, e.g. from a previous run's results. Existing
    /// entries are kept.
    pub fn seed(&mut self, entries: impl IntoIterator<Item = (Position, CachedEvaluation)>) {
        for (position, entry) in entries {
            if let Entry::Vacant(slot) = self.entries.entry(position) {
                slot.insert(entry);
                self.stats.seeded += 1;
            }
        }
    }

    pub fn get(&self, position: &Position) -> Option<&CachedEvaluation> {
        self.entries.get(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All `(position, score)` pairs seen so far, in no particular order.
    pub fn observations(&self) -> impl Iterator<Item = (&Position, f64)> {
        self.entries.iter().map(|(p, e)| (p, e.score))
    }

    pub fn get_stats(&self) -> CacheStats {
        self.stats.clone()
    }
}

impl Default for EvaluationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub failures: u64,
    pub seeded: u64,
    /// Total seconds spent inside the evaluator.
    pub eval_seconds: f64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }
}
