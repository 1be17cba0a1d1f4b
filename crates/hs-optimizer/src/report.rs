//! Run results: per-driver reports and the reduced search outcome.

use chrono::{DateTime, Utc};
use hs_types::Position;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheStats;
use crate::candidate::{failed_score, BestResult};
use crate::config::SearchId;

/// One evaluation as seen by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// 0 for start-up evaluations, then 1-based loop iteration.
    pub iteration: usize,
    pub position: Position,
    /// `-inf` when the evaluation failed, `null` in JSON.
    #[serde(with = "failed_score")]
    pub score: f64,
}

/// Why a driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    IterationBudget,
    TimeBudget,
}

/// Everything one driver produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverReport {
    pub run_id: Uuid,
    pub job: usize,
    pub seed: u64,
    pub strategy: String,
    pub best: BestResult,
    pub history: Vec<HistoryPoint>,
    pub cache_stats: CacheStats,
    pub termination: TerminationReason,
    /// Loop iterations completed, start-up phase excluded.
    pub iterations: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_seconds: f64,
}

impl DriverReport {
    pub fn evaluations(&self) -> usize {
        self.history.len()
    }

    /// Running maximum of the score after each evaluation.
    pub fn best_so_far(&self) -> Vec<f64> {
        self.history
            .iter()
            .scan(f64::NEG_INFINITY, |best, point| {
                if point.score > *best {
                    *best = point.score;
                }
                Some(*best)
            })
            .collect()
    }
}

/// Reduced result of a whole search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub search_id: SearchId,
    pub best: BestResult,
    /// One per driver, ordered by job index.
    pub reports: Vec<DriverReport>,
    pub total_seconds: f64,
}

impl SearchOutcome {
    pub fn total_evaluations(&self) -> usize {
        self.reports.iter().map(DriverReport::evaluations).sum()
    }

    /// Evaluator time summed over all drivers.
    pub fn eval_seconds(&self) -> f64 {
        self.reports.iter().map(|r| r.cache_stats.eval_seconds).sum()
    }
}
