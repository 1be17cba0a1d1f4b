//! Search strategies.
//!
//! Every strategy is an ask/tell state machine: the driver asks for positions
//! with [`SearchStrategy::suggest`], evaluates them through the cache and hands
//! the scores back, in the same order, with [`SearchStrategy::report`].
//! Strategies never see the evaluator, the cache or the driver's best result.

mod annealing;
mod bayesian;
mod evolution;
mod local;
mod surrogate;
mod swarm;

pub use annealing::{
    acceptance_probability, swap_probability, tunneling_acceptance, Annealing, AnnealingKind,
    AnnealingParams, Chain,
};
pub use bayesian::{BayesianParams, BayesianSearch};
pub use evolution::{EvolutionParams, EvolutionStrategy};
pub use local::{stochastic_acceptance, LocalKind, LocalSearch, LocalSearchParams, TabuList};
pub use surrogate::InverseDistanceSurrogate;
pub use swarm::{Particle, ParticleSwarm, SwarmParams};

use hs_types::{Position, SpaceEncoder, SurrogateModel};
use rand_chacha::ChaCha8Rng;

use crate::candidate::Scored;
use crate::config::StrategyConfig;

/// Random source handed to strategies by their driver.
pub type SearchRng = ChaCha8Rng;

/// Common step contract for all search strategies.
pub trait SearchStrategy {
    /// Positions to evaluate next. Always valid for `encoder`.
    fn suggest(&mut self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Vec<Position>;

    /// Scores for the positions returned by the last `suggest`, in order.
    fn report(&mut self, results: &[Scored], encoder: &SpaceEncoder, rng: &mut SearchRng);

    /// Offer an already evaluated starting point before the first `suggest`.
    fn seed_start(&mut self, _start: Scored) {}

    /// Human-readable strategy name.
    fn name(&self) -> &'static str;
}

/// Closed set of strategy families.
pub enum Strategy {
    Random(RandomSearch),
    Local(LocalSearch),
    Annealing(Annealing),
    Swarm(ParticleSwarm),
    Evolution(EvolutionStrategy),
    Bayesian(BayesianSearch),
}

impl Strategy {
    /// Build the strategy described by `config`. `surrogate` overrides the
    /// built-in model for the Bayesian family and is ignored otherwise.
    pub fn from_config(config: &StrategyConfig, surrogate: Option<Box<dyn SurrogateModel>>) -> Self {
        match config {
            StrategyConfig::RandomSearch => Self::Random(RandomSearch::new()),
            StrategyConfig::HillClimbing(p) => {
                Self::Local(LocalSearch::new(LocalKind::HillClimbing, p.clone()))
            }
            StrategyConfig::StochasticHillClimbing(p) => {
                Self::Local(LocalSearch::new(LocalKind::StochasticHillClimbing, p.clone()))
            }
            StrategyConfig::RandomRestartHillClimbing(p) => {
                Self::Local(LocalSearch::new(LocalKind::RandomRestartHillClimbing, p.clone()))
            }
            StrategyConfig::TabuSearch(p) => Self::Local(LocalSearch::new(LocalKind::TabuSearch, p.clone())),
            StrategyConfig::SimulatedAnnealing(p) => {
                Self::Annealing(Annealing::new(AnnealingKind::SimulatedAnnealing, p.clone()))
            }
            StrategyConfig::RandomAnnealing(p) => {
                Self::Annealing(Annealing::new(AnnealingKind::RandomAnnealing, p.clone()))
            }
            StrategyConfig::StochasticTunneling(p) => {
                Self::Annealing(Annealing::new(AnnealingKind::StochasticTunneling, p.clone()))
            }
            StrategyConfig::ParallelTempering(p) => {
                Self::Annealing(Annealing::new(AnnealingKind::ParallelTempering, p.clone()))
            }
            StrategyConfig::ParticleSwarm(p) => Self::Swarm(ParticleSwarm::new(p.clone())),
            StrategyConfig::EvolutionStrategy(p) => Self::Evolution(EvolutionStrategy::new(p.clone())),
            StrategyConfig::Bayesian(p) => {
                let surrogate = surrogate
                    .unwrap_or_else(|| Box::new(InverseDistanceSurrogate::new(p.k_neighbors)));
                Self::Bayesian(BayesianSearch::new(p.clone(), surrogate))
            }
        }
    }

    /// Feed prior observations (warm start) to strategies that learn from
    /// history. Only the Bayesian family uses them.
    pub fn observe_prior(&mut self, observations: &[Scored]) {
        if let Self::Bayesian(s) = self {
            s.observe(observations);
        }
    }

    fn inner(&mut self) -> &mut dyn SearchStrategy {
        match self {
            Self::Random(s) => s,
            Self::Local(s) => s,
            Self::Annealing(s) => s,
            Self::Swarm(s) => s,
            Self::Evolution(s) => s,
            Self::Bayesian(s) => s,
        }
    }
}

impl SearchStrategy for Strategy {
    fn suggest(&mut self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Vec<Position> {
        self.inner().suggest(encoder, rng)
    }

    fn report(&mut self, results: &[Scored], encoder: &SpaceEncoder, rng: &mut SearchRng) {
        self.inner().report(results, encoder, rng)
    }

    fn seed_start(&mut self, start: Scored) {
        self.inner().seed_start(start)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Random(s) => s.name(),
            Self::Local(s) => s.name(),
            Self::Annealing(s) => s.name(),
            Self::Swarm(s) => s.name(),
            Self::Evolution(s) => s.name(),
            Self::Bayesian(s) => s.name(),
        }
    }
}

// ---- Random search ----

/// Independent uniform sampling, one position per step.
#[derive(Debug, Clone, Default)]
pub struct RandomSearch;

impl RandomSearch {
    pub fn new() -> Self {
        Self
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Vec<Position> {
        vec![encoder.random_position(rng)]
    }

    fn report(&mut self, _results: &[Scored], _encoder: &SpaceEncoder, _rng: &mut SearchRng) {}

    fn name(&self) -> &'static str {
        "random_search"
    }
}

/// Index of the highest-scoring result (first one on ties).
pub(crate) fn best_index(results: &[Scored]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, r) in results.iter().enumerate() {
        match best {
            Some(b) if results[b].score >= r.score => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use hs_types::SearchSpace;
    use rand::SeedableRng;

    #[test]
    fn random_search_respects_bounds() {
        let encoder = SpaceEncoder::new(SearchSpace::new().add_int("a", 5, 15).add_float_steps("b", 0.5, 1.0, 6)).unwrap();
        let mut rng = SearchRng::seed_from_u64(3);
        let mut strategy = RandomSearch::new();
        for _ in 0..50 {
            let batch = strategy.suggest(&encoder, &mut rng);
            assert_eq!(batch.len(), 1);
            assert!(encoder.contains(&batch[0]));
        }
    }

    #[test]
    fn from_config_selects_family() {
        let cases = [
            (StrategyConfig::RandomSearch, "random_search"),
            (StrategyConfig::TabuSearch(Default::default()), "tabu_search"),
            (StrategyConfig::ParallelTempering(Default::default()), "parallel_tempering"),
            (StrategyConfig::ParticleSwarm(Default::default()), "particle_swarm"),
            (StrategyConfig::EvolutionStrategy(Default::default()), "evolution_strategy"),
            (StrategyConfig::Bayesian(Default::default()), "bayesian"),
        ];
        for (config, name) in cases {
            assert_eq!(Strategy::from_config(&config, None).name(), name);
        }
    }

    #[test]
    fn best_index_prefers_first_on_ties() {
        let r = |s: f64| Scored::new(Position::new(vec![0]), s);
        assert_eq!(best_index(&[]), None);
        assert_eq!(best_index(&[r(1.0), r(3.0), r(3.0)]), Some(1));
        assert_eq!(best_index(&[r(f64::NEG_INFINITY), r(f64::NEG_INFINITY)]), Some(0));
    }
}
