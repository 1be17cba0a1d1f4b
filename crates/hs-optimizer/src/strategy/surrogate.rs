use hs_types::{Position, Prediction, SurrogateError, SurrogateModel};

/// Default surrogate for the Bayesian strategy.
///
/// Predicts an inverse-distance-weighted mean of the `k` nearest observations
/// in index space. Uncertainty grows with the distance to the nearest
/// observation and is scaled by the spread of observed scores, so unexplored
/// regions look attractive to an upper-confidence-bound acquisition.
#[derive(Debug, Clone)]
pub struct InverseDistanceSurrogate {
    k: usize,
    observations: Vec<(Vec<f64>, f64)>,
    score_spread: f64,
}

impl InverseDistanceSurrogate {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            observations: Vec::new(),
            score_spread: 1.0,
        }
    }

    fn predict_one(&self, position: &Position) -> Prediction {
        let query = position.to_f64();
        let mut nearest: Vec<(f64, f64)> = self
            .observations
            .iter()
            .map(|(p, s)| {
                let d2: f64 = p.iter().zip(&query).map(|(a, b)| (a - b) * (a - b)).sum();
                (d2.sqrt(), *s)
            })
            .collect();
        nearest.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        nearest.truncate(self.k);

        let d_min = nearest.first().map_or(f64::INFINITY, |(d, _)| *d);
        if d_min == 0.0 {
            return Prediction {
                mean: nearest[0].1,
                uncertainty: 0.0,
            };
        }

        let (weighted, total) = nearest
            .iter()
            .fold((0.0, 0.0), |(ws, wt), (d, s)| {
                let w = 1.0 / (d * d);
                (ws + w * s, wt + w)
            });

        Prediction {
            mean: weighted / total,
            uncertainty: self.score_spread * d_min / (1.0 + d_min),
        }
    }
}

impl SurrogateModel for InverseDistanceSurrogate {
    fn fit(&mut self, observations: &[(Position, f64)]) -> Result<(), SurrogateError> {
        if observations.is_empty() {
            return Err(SurrogateError::FitFailed {
                message: "no observations".to_string(),
            });
        }
        if observations.iter().any(|(_, s)| !s.is_finite()) {
            return Err(SurrogateError::FitFailed {
                message: "non-finite score in observations".to_string(),
            });
        }

        self.observations = observations.iter().map(|(p, s)| (p.to_f64(), *s)).collect();

        let n = self.observations.len() as f64;
        let mean = self.observations.iter().map(|(_, s)| s).sum::<f64>() / n;
        let var = self.observations.iter().map(|(_, s)| (s - mean).powi(2)).sum::<f64>() / n;
        self.score_spread = if var > 0.0 { var.sqrt() } else { 1.0 };
        Ok(())
    }

    fn predict(&self, positions: &[Position]) -> Result<Vec<Prediction>, SurrogateError> {
        if self.observations.is_empty() {
            return Err(SurrogateError::NotFitted);
        }
        Ok(positions.iter().map(|p| self.predict_one(p)).collect())
    }

    fn name(&self) -> &str {
        "inverse_distance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(v: &[usize]) -> Position {
        Position::new(v.to_vec())
    }

    #[test]
    fn predict_before_fit_fails() {
        let model = InverseDistanceSurrogate::new(3);
        assert_eq!(model.predict(&[pos(&[0])]), Err(SurrogateError::NotFitted));
    }

    #[test]
    fn observed_points_are_reproduced_exactly() {
        let mut model = InverseDistanceSurrogate::new(3);
        model
            .fit(&[(pos(&[0, 0]), 1.0), (pos(&[4, 4]), 5.0)])
            .unwrap();
        let out = model.predict(&[pos(&[4, 4])]).unwrap();
        assert_eq!(out[0].mean, 5.0);
        assert_eq!(out[0].uncertainty, 0.0);
    }

    #[test]
    fn uncertainty_grows_with_distance() {
        let mut model = InverseDistanceSurrogate::new(2);
        model
            .fit(&[(pos(&[0]), 0.0), (pos(&[1]), 2.0)])
            .unwrap();
        let out = model.predict(&[pos(&[2]), pos(&[9])]).unwrap();
        assert!(out[1].uncertainty > out[0].uncertainty);
        // Closer to the 2.0 observation, so the mean leans that way.
        assert!(out[0].mean > 1.0);
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let mut model = InverseDistanceSurrogate::new(2);
        let err = model.fit(&[(pos(&[0]), f64::NEG_INFINITY)]).unwrap_err();
        assert!(matches!(err, SurrogateError::FitFailed { .. }));
    }
}
