//! Standard test objectives over numeric assignments.
//!
//! The classic formulations are minimization problems; here they are negated
//! so that the global optimum is the maximum score `0.0` at the origin.

use std::f64::consts::PI;
use std::str::FromStr;

use hs_types::{Evaluation, EvaluationError, HsError, ParameterAssignment};
use serde::{Deserialize, Serialize};

fn coordinates(params: &ParameterAssignment) -> Result<Vec<f64>, EvaluationError> {
    params
        .iter()
        .map(|(name, value)| {
            value
                .as_f64()
                .ok_or_else(|| EvaluationError::new(format!("parameter {name} is not numeric: {value}")))
        })
        .collect()
}

/// Negated sphere, `-sum(x^2)`.
pub fn sphere(params: &ParameterAssignment) -> Result<Evaluation, EvaluationError> {
    let x = coordinates(params)?;
    Ok(Evaluation::new(-x.iter().map(|xi| xi * xi).sum::<f64>()))
}

/// Negated Rastrigin, `-(10n + sum(x^2 - 10 cos(2 pi x)))`. Highly multimodal.
pub fn rastrigin(params: &ParameterAssignment) -> Result<Evaluation, EvaluationError> {
    let x = coordinates(params)?;
    let n = x.len() as f64;
    let value = 10.0 * n
        + x.iter()
            .map(|xi| xi * xi - 10.0 * (2.0 * PI * xi).cos())
            .sum::<f64>();
    Ok(Evaluation::new(-value))
}

/// Built-in objective selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Benchmark {
    #[default]
    Sphere,
    Rastrigin,
}

impl Benchmark {
    pub fn evaluate(&self, params: &ParameterAssignment) -> Result<Evaluation, EvaluationError> {
        match self {
            Self::Sphere => sphere(params),
            Self::Rastrigin => rastrigin(params),
        }
    }
}

impl FromStr for Benchmark {
    type Err = HsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sphere" => Ok(Self::Sphere),
            "rastrigin" => Ok(Self::Rastrigin),
            other => Err(HsError::Config(format!("unknown benchmark objective: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(xs: &[f64]) -> ParameterAssignment {
        xs.iter()
            .enumerate()
            .fold(ParameterAssignment::new(), |a, (i, &x)| a.with(format!("x{i}"), x))
    }

    #[test]
    fn optimum_is_zero_at_origin() {
        assert_eq!(sphere(&point(&[0.0, 0.0, 0.0])).unwrap().score, 0.0);
        assert!(rastrigin(&point(&[0.0, 0.0])).unwrap().score.abs() < 1e-12);
    }

    #[test]
    fn scores_drop_away_from_the_optimum() {
        assert_eq!(sphere(&point(&[1.0, -2.0])).unwrap().score, -5.0);
        let near = rastrigin(&point(&[0.1])).unwrap().score;
        let far = rastrigin(&point(&[0.5])).unwrap().score;
        assert!(near < 0.0 && far < near);
    }

    #[test]
    fn integer_parameters_are_accepted() {
        let a = ParameterAssignment::new().with("a", 3i64).with("b", -4i64);
        assert_eq!(sphere(&a).unwrap().score, -25.0);
    }

    #[test]
    fn non_numeric_parameter_is_an_evaluation_error() {
        let a = ParameterAssignment::new().with("kernel", "rbf");
        assert!(sphere(&a).is_err());
    }

    #[test]
    fn parse_by_name() {
        assert_eq!("Rastrigin".parse::<Benchmark>().unwrap(), Benchmark::Rastrigin);
        assert_eq!(Benchmark::default(), Benchmark::Sphere);
        assert!(matches!("ackley".parse::<Benchmark>(), Err(HsError::Config(_))));
    }
}
