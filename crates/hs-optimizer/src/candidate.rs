//! Candidates tracked by strategies and the driver-owned best result.

use hs_types::{ParameterAssignment, Position};
use serde::{Deserialize, Serialize};

/// Serde adapter for scores where `-inf` marks a failed evaluation.
///
/// JSON has no infinities, so any non-finite score is written as `null` and
/// `null` reads back as `-inf`.
pub(crate) mod failed_score {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(score: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if score.is_finite() {
            serializer.serialize_f64(*score)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
    }
}

/// A position together with the score it evaluated to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored {
    pub position: Position,
    #[serde(with = "failed_score")]
    pub score: f64,
}

impl Scored {
    pub fn new(position: Position, score: f64) -> Self {
        Self { position, score }
    }
}

/// A strategy's working unit: the current position and the best one it has
/// seen.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub position: Position,
    /// `None` until the current position has been evaluated.
    pub score: Option<f64>,
    pub best_position: Position,
    pub best_score: f64,
}

impl Candidate {
    /// Unevaluated candidate at `position`.
    pub fn new(position: Position) -> Self {
        Self {
            best_position: position.clone(),
            position,
            score: None,
            best_score: f64::NEG_INFINITY,
        }
    }

    /// Candidate whose position has already been evaluated.
    pub fn evaluated(scored: Scored) -> Self {
        let mut candidate = Self::new(scored.position.clone());
        candidate.move_to(scored);
        candidate
    }

    /// Current score, `-inf` while unevaluated.
    pub fn current_score(&self) -> f64 {
        self.score.unwrap_or(f64::NEG_INFINITY)
    }

    /// Move to an evaluated position, updating the best on strict improvement.
    ///
    /// Returns `true` if the best-seen score improved.
    pub fn move_to(&mut self, scored: Scored) -> bool {
        let improved = self.record(&scored);
        self.position = scored.position;
        self.score = Some(scored.score);
        improved
    }

    /// Update only the best-seen pair, leaving the current position alone.
    pub fn record(&mut self, scored: &Scored) -> bool {
        if scored.score > self.best_score {
            self.best_score = scored.score;
            self.best_position = scored.position.clone();
            true
        } else {
            false
        }
    }

    pub fn best(&self) -> Scored {
        Scored::new(self.best_position.clone(), self.best_score)
    }
}

/// Global best of one driver (or of a whole run after reduction).
///
/// Starts as a sentinel with no position and a score of `-inf`, and is only
/// ever replaced by a strictly better score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub position: Option<Position>,
    pub assignment: Option<ParameterAssignment>,
    #[serde(with = "failed_score")]
    pub score: f64,
    pub metadata: serde_json::Value,
    /// Iteration at which the score was first reached.
    pub iteration: usize,
    /// Job index of the driver that found it.
    pub job: usize,
}

impl BestResult {
    pub fn sentinel(job: usize) -> Self {
        Self {
            position: None,
            assignment: None,
            score: f64::NEG_INFINITY,
            metadata: serde_json::Value::Null,
            iteration: 0,
            job,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.position.is_none()
    }

    /// Replace the best if `score` is strictly better. Returns whether it was.
    pub fn propose(
        &mut self,
        position: &Position,
        assignment: impl FnOnce() -> Option<ParameterAssignment>,
        score: f64,
        metadata: &serde_json::Value,
        iteration: usize,
    ) -> bool {
        if score > self.score {
            self.position = Some(position.clone());
            self.assignment = assignment();
            self.score = score;
            self.metadata = metadata.clone();
            self.iteration = iteration;
            true
        } else {
            false
        }
    }

    /// Ordering used by the run reduction: higher score wins, then the earlier
    /// iteration, then the lower job index.
    pub fn beats(&self, other: &BestResult) -> bool {
        if self.is_sentinel() {
            return false;
        }
        if other.is_sentinel() {
            return true;
        }
        if self.score != other.score {
            return self.score > other.score;
        }
        (self.iteration, self.job) < (other.iteration, other.job)
    }
}
