//! Interfaces to the external collaborators of a search: the objective
//! evaluator and the surrogate regression model.

use serde::{Deserialize, Serialize};

use crate::errors::{EvaluationError, SurrogateError};
use crate::space::{ParameterAssignment, Position};

/// Score and opaque metadata returned by an evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Objective value; higher is better.
    pub score: f64,
    /// Anything the evaluator wants to carry along (fold scores, timings...).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Evaluation {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Black-box objective function.
///
/// Repeated calls with the same assignment are assumed to be interchangeable,
/// which is what lets the evaluation cache skip them. Shared read-only across
/// parallel drivers, hence `Sync`.
pub trait Evaluator: Sync {
    fn evaluate(&self, params: &ParameterAssignment) -> Result<Evaluation, EvaluationError>;
}

impl<F> Evaluator for F
where
    F: Fn(&ParameterAssignment) -> Result<Evaluation, EvaluationError> + Sync,
{
    fn evaluate(&self, params: &ParameterAssignment) -> Result<Evaluation, EvaluationError> {
        self(params)
    }
}

/// Surrogate output for one position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub mean: f64,
    pub uncertainty: f64,
}

impl Prediction {
    /// Upper confidence bound `mean + kappa * uncertainty`.
    pub fn upper_confidence_bound(&self, kappa: f64) -> f64 {
        self.mean + kappa * self.uncertainty
    }
}

/// Cheap regression model standing in for the evaluator.
pub trait SurrogateModel: Send {
    /// Train on all observations seen so far. Scores are always finite.
    fn fit(&mut self, observations: &[(Position, f64)]) -> Result<(), SurrogateError>;

    /// Predict mean and uncertainty for each position, in order.
    fn predict(&self, positions: &[Position]) -> Result<Vec<Prediction>, SurrogateError>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_evaluators() {
        let objective = |params: &ParameterAssignment| -> Result<Evaluation, EvaluationError> {
            let x = params
                .get("x")
                .and_then(|v| v.as_f64())
                .ok_or_else(|| EvaluationError::new("missing x"))?;
            Ok(Evaluation::new(-x * x))
        };

        let params = ParameterAssignment::new().with("x", 3i64);
        assert_eq!(objective.evaluate(&params).unwrap().score, -9.0);

        let err = objective.evaluate(&ParameterAssignment::new()).unwrap_err();
        assert_eq!(err.message, "missing x");
    }

    #[test]
    fn ucb_combines_mean_and_uncertainty() {
        let p = Prediction {
            mean: 1.0,
            uncertainty: 0.5,
        };
        assert_eq!(p.upper_confidence_bound(0.0), 1.0);
        assert_eq!(p.upper_confidence_bound(2.0), 2.0);
    }

    #[test]
    fn evaluation_metadata_defaults_to_null() {
        let eval: Evaluation = serde_json::from_str(r#"{"score": 0.75}"#).unwrap();
        assert_eq!(eval.score, 0.75);
        assert!(eval.metadata.is_null());
    }
}
