//! Annealing family: simulated annealing, random annealing, stochastic
//! tunneling and parallel tempering.
//!
//! All four are built from the same pieces: one or more [`Chain`]s, each a
//! candidate plus a temperature, a neighbor proposal per chain per step, and a
//! Metropolis-style acceptance test. Simulated annealing and its two variants
//! run a single chain that cools geometrically towards `min_temperature`;
//! parallel tempering runs `n_chains` chains at fixed temperatures and
//! periodically swaps neighboring chains.
//!
//! Temperatures never drop below `min_temperature`, which must be positive,
//! so the acceptance formulas never divide by zero.

use hs_types::{Position, SpaceEncoder};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{SearchRng, SearchStrategy};
use crate::candidate::{Candidate, Scored};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnealingKind {
    SimulatedAnnealing,
    RandomAnnealing,
    StochasticTunneling,
    ParallelTempering,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingParams {
    /// Neighborhood size as a fraction of each dimension's length.
    pub epsilon: f64,
    pub start_temperature: f64,
    /// Multiplicative decay per step, in (0, 1).
    pub cooling_rate: f64,
    /// Positive floor for every temperature.
    pub min_temperature: f64,
    /// Tunneling strength (stochastic tunneling).
    pub gamma: f64,
    /// Number of chains (parallel tempering).
    pub n_chains: usize,
    /// Ratio between neighboring chain temperatures (parallel tempering).
    pub temperature_ratio: f64,
    /// Steps between swap rounds (parallel tempering).
    pub swap_interval: usize,
}

impl Default for AnnealingParams {
    fn default() -> Self {
        Self {
            epsilon: 0.05,
            start_temperature: 1.0,
            cooling_rate: 0.97,
            min_temperature: 1e-9,
            gamma: 1.0,
            n_chains: 4,
            temperature_ratio: 2.0,
            swap_interval: 5,
        }
    }
}

/// Metropolis acceptance for a maximization problem.
///
/// `1.0` when `proposed >= current`, otherwise `exp((proposed - current) / T)`.
pub fn acceptance_probability(current: f64, proposed: f64, temperature: f64) -> f64 {
    if proposed >= current {
        return 1.0;
    }
    let t = temperature.max(f64::MIN_POSITIVE);
    ((proposed - current) / t).exp()
}

/// Acceptance on the tunneled energy `E(s) = 1 - exp(-gamma * (best - s))`.
///
/// The transform flattens everything far below the best score seen so far,
/// which lets the chain cross wide basins it would otherwise be stuck in.
pub fn tunneling_acceptance(current: f64, proposed: f64, best: f64, gamma: f64, temperature: f64) -> f64 {
    if proposed >= current {
        return 1.0;
    }
    if !proposed.is_finite() {
        return 0.0;
    }
    let energy = |s: f64| 1.0 - (-gamma * (best - s)).exp();
    let t = temperature.max(f64::MIN_POSITIVE);
    (-(energy(proposed) - energy(current)) / t).exp().min(1.0)
}

/// Probability of exchanging the states of chains `i` and `j`.
///
/// `min(1, exp((s_j - s_i) * (1/T_i - 1/T_j)))`.
pub fn swap_probability(score_i: f64, temperature_i: f64, score_j: f64, temperature_j: f64) -> f64 {
    let delta = score_j - score_i;
    if delta.is_nan() {
        return 0.0;
    }
    let beta_i = 1.0 / temperature_i.max(f64::MIN_POSITIVE);
    let beta_j = 1.0 / temperature_j.max(f64::MIN_POSITIVE);
    let exponent = delta * (beta_i - beta_j);
    if exponent.is_nan() {
        return 0.0;
    }
    exponent.exp().min(1.0)
}

/// One annealing chain.
#[derive(Debug, Clone)]
pub struct Chain {
    /// `None` until the chain's first position has been evaluated.
    pub candidate: Option<Candidate>,
    pub temperature: f64,
}

#[derive(Debug, Clone)]
pub struct Annealing {
    kind: AnnealingKind,
    params: AnnealingParams,
    chains: Vec<Chain>,
    steps: usize,
    swaps: usize,
}

impl Annealing {
    pub fn new(kind: AnnealingKind, params: AnnealingParams) -> Self {
        let floor = params.min_temperature;
        let chains = match kind {
            AnnealingKind::ParallelTempering => (0..params.n_chains.max(1))
                .map(|i| Chain {
                    candidate: None,
                    temperature: (params.start_temperature * params.temperature_ratio.powi(i as i32)).max(floor),
                })
                .collect(),
            _ => vec![Chain {
                candidate: None,
                temperature: params.start_temperature.max(floor),
            }],
        };

        Self {
            kind,
            params,
            chains,
            steps: 0,
            swaps: 0,
        }
    }

    pub fn kind(&self) -> AnnealingKind {
        self.kind
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Accepted chain swaps so far (parallel tempering).
    pub fn swaps(&self) -> usize {
        self.swaps
    }

    fn neighbor_epsilon(&self, chain: &Chain) -> f64 {
        match self.kind {
            AnnealingKind::RandomAnnealing => {
                let start = self.params.start_temperature.max(self.params.min_temperature);
                self.params.epsilon * (1.0 + chain.temperature / start)
            }
            _ => self.params.epsilon,
        }
    }

    fn accept(&self, chain: &Chain, candidate: &Candidate, proposed: f64, rng: &mut SearchRng) -> bool {
        let current = candidate.current_score();
        let p = match self.kind {
            AnnealingKind::StochasticTunneling => tunneling_acceptance(
                current,
                proposed,
                candidate.best_score,
                self.params.gamma,
                chain.temperature,
            ),
            _ => acceptance_probability(current, proposed, chain.temperature),
        };
        p >= 1.0 || rng.gen::<f64>() < p
    }

    fn cool(&mut self, rng: &mut SearchRng) {
        let floor = self.params.min_temperature;
        let rate = self.params.cooling_rate;
        for chain in &mut self.chains {
            let factor = match self.kind {
                AnnealingKind::ParallelTempering => 1.0,
                AnnealingKind::RandomAnnealing => rate.powf(rng.gen_range(0.0..2.0)),
                _ => rate,
            };
            chain.temperature = (chain.temperature * factor).max(floor);
        }
    }

    fn swap_round(&mut self, rng: &mut SearchRng) {
        for i in 0..self.chains.len().saturating_sub(1) {
            let (Some(a), Some(b)) = (&self.chains[i].candidate, &self.chains[i + 1].candidate) else {
                continue;
            };
            let p = swap_probability(
                a.current_score(),
                self.chains[i].temperature,
                b.current_score(),
                self.chains[i + 1].temperature,
            );
            if rng.gen::<f64>() < p {
                let upper = self.chains[i + 1].candidate.take();
                let lower = std::mem::replace(&mut self.chains[i].candidate, upper);
                self.chains[i + 1].candidate = lower;
                self.swaps += 1;
            }
        }
    }
}

impl SearchStrategy for Annealing {
    fn suggest(&mut self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Vec<Position> {
        self.chains
            .iter()
            .map(|chain| match &chain.candidate {
                None => encoder.random_position(rng),
                Some(c) => encoder.neighbor(&c.position, self.neighbor_epsilon(chain), rng),
            })
            .collect()
    }

    fn report(&mut self, results: &[Scored], _encoder: &SpaceEncoder, rng: &mut SearchRng) {
        for (i, result) in results.iter().enumerate().take(self.chains.len()) {
            let decision = match &self.chains[i].candidate {
                None => None,
                Some(c) => Some(self.accept(&self.chains[i], c, result.score, rng)),
            };
            match decision {
                None => self.chains[i].candidate = Some(Candidate::evaluated(result.clone())),
                Some(accepted) => {
                    if let Some(c) = self.chains[i].candidate.as_mut() {
                        if accepted {
                            c.move_to(result.clone());
                        } else {
                            c.record(result);
                        }
                    }
                }
            }
        }

        self.steps += 1;
        self.cool(rng);
        if self.kind == AnnealingKind::ParallelTempering
            && self.params.swap_interval > 0
            && self.steps % self.params.swap_interval == 0
        {
            self.swap_round(rng);
        }
    }

    fn seed_start(&mut self, start: Scored) {
        if let Some(chain) = self.chains.first_mut() {
            chain.candidate = Some(Candidate::evaluated(start));
        }
    }

    fn name(&self) -> &'static str {
        match self.kind {
            AnnealingKind::SimulatedAnnealing => "simulated_annealing",
            AnnealingKind::RandomAnnealing => "random_annealing",
            AnnealingKind::StochasticTunneling => "stochastic_tunneling",
            AnnealingKind::ParallelTempering => "parallel_tempering",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::SearchSpace;
    use rand::SeedableRng;

    fn encoder() -> SpaceEncoder {
        SpaceEncoder::new(SearchSpace::new().add_int("x", 0, 19)).unwrap()
    }

    fn scored(x: usize, score: f64) -> Scored {
        Scored::new(Position::new(vec![x]), score)
    }

    #[test]
    fn acceptance_is_certain_for_non_worse_proposals() {
        assert_eq!(acceptance_probability(1.0, 1.0, 0.5), 1.0);
        assert_eq!(acceptance_probability(1.0, 3.0, 1e-9), 1.0);
        assert_eq!(acceptance_probability(f64::NEG_INFINITY, -1e9, 1.0), 1.0);
        assert_eq!(acceptance_probability(0.0, f64::NEG_INFINITY, 1.0), 0.0);
    }

    #[test]
    fn acceptance_decreases_as_temperature_falls() {
        let gap_current = 1.0;
        let proposed = 0.5;
        let mut temperature = 2.0;
        let mut previous = acceptance_probability(gap_current, proposed, temperature);
        while temperature > 0.05 {
            temperature *= 0.8;
            let p = acceptance_probability(gap_current, proposed, temperature);
            assert!(p < previous, "p={p} previous={previous} at T={temperature}");
            previous = p;
        }
        // At the floor the probability is still well-defined.
        let at_floor = acceptance_probability(gap_current, proposed, 1e-9);
        assert!(at_floor >= 0.0 && at_floor < previous);
    }

    #[test]
    fn temperature_cools_to_the_floor_and_stays_positive() {
        let encoder = encoder();
        let mut rng = SearchRng::seed_from_u64(1);
        let params = AnnealingParams {
            cooling_rate: 0.5,
            min_temperature: 1e-3,
            ..AnnealingParams::default()
        };
        let mut sa = Annealing::new(AnnealingKind::SimulatedAnnealing, params);
        sa.seed_start(scored(10, 0.0));

        for _ in 0..40 {
            let batch = sa.suggest(&encoder, &mut rng);
            assert_eq!(batch.len(), 1);
            sa.report(&[Scored::new(batch[0].clone(), 0.0)], &encoder, &mut rng);
        }
        assert_eq!(sa.chains()[0].temperature, 1e-3);
    }

    #[test]
    fn improvements_are_always_accepted() {
        let encoder = encoder();
        let mut rng = SearchRng::seed_from_u64(2);
        let mut sa = Annealing::new(AnnealingKind::SimulatedAnnealing, AnnealingParams::default());
        sa.seed_start(scored(3, 1.0));
        sa.report(&[scored(4, 2.0)], &encoder, &mut rng);
        let c = sa.chains()[0].candidate.as_ref().unwrap();
        assert_eq!(c.position, Position::new(vec![4]));
        assert_eq!(c.best_score, 2.0);
    }

    #[test]
    fn cold_chain_rejects_large_drops() {
        let encoder = encoder();
        let mut rng = SearchRng::seed_from_u64(3);
        let params = AnnealingParams {
            start_temperature: 1e-6,
            min_temperature: 1e-9,
            ..AnnealingParams::default()
        };
        let mut sa = Annealing::new(AnnealingKind::SimulatedAnnealing, params);
        sa.seed_start(scored(3, 1.0));
        for _ in 0..20 {
            sa.report(&[scored(9, -100.0)], &encoder, &mut rng);
        }
        let c = sa.chains()[0].candidate.as_ref().unwrap();
        assert_eq!(c.position, Position::new(vec![3]));
    }

    #[test]
    fn tunneling_flattens_deep_losses() {
        // Relative to the best, a drop from 0.0 to -50 and one to -100 both map
        // to energies close to 1, so they are almost equally likely.
        let p_deep = tunneling_acceptance(-50.0, -100.0, 0.0, 1.0, 0.1);
        assert!(p_deep > 0.99);
        let p_near_best = tunneling_acceptance(0.0, -1.0, 0.0, 1.0, 0.1);
        assert!(p_near_best < 0.01);
        assert_eq!(tunneling_acceptance(0.0, 1.0, 0.0, 1.0, 0.1), 1.0);
        assert_eq!(tunneling_acceptance(0.0, f64::NEG_INFINITY, 0.0, 1.0, 0.1), 0.0);
    }

    #[test]
    fn swap_probability_favours_moving_good_states_to_cold_chains() {
        // Hot chain (j) found a better state than the cold chain (i): always swap.
        assert_eq!(swap_probability(0.0, 1.0, 5.0, 4.0), 1.0);
        // Cold chain is better: swap is possible but unlikely.
        let p = swap_probability(5.0, 1.0, 0.0, 4.0);
        assert!(p > 0.0 && p < 0.05);
        assert_eq!(swap_probability(f64::NEG_INFINITY, 1.0, f64::NEG_INFINITY, 2.0), 0.0);
    }

    #[test]
    fn random_annealing_cools_unevenly_and_narrows_its_steps() {
        let encoder = encoder();
        let mut rng = SearchRng::seed_from_u64(5);
        let params = AnnealingParams {
            cooling_rate: 0.9,
            min_temperature: 1e-3,
            ..AnnealingParams::default()
        };
        let mut ra = Annealing::new(AnnealingKind::RandomAnnealing, params.clone());
        ra.seed_start(scored(10, 0.0));
        let initial_epsilon = ra.neighbor_epsilon(&ra.chains()[0]);
        assert!((initial_epsilon - 2.0 * params.epsilon).abs() < 1e-12);

        let mut temperatures = vec![ra.chains()[0].temperature];
        for _ in 0..30 {
            let batch = ra.suggest(&encoder, &mut rng);
            ra.report(&[Scored::new(batch[0].clone(), 0.0)], &encoder, &mut rng);
            temperatures.push(ra.chains()[0].temperature);
        }

        let ratios: Vec<f64> = temperatures.windows(2).map(|w| w[1] / w[0]).collect();
        // Each step multiplies by cooling_rate^u with u in [0, 2).
        assert!(ratios.iter().all(|&r| r <= 1.0 && r > 0.9f64.powi(2) - 1e-12));
        assert!(ratios.iter().any(|&r| (r - ratios[0]).abs() > 1e-9));
        assert!(temperatures.iter().all(|&t| t >= params.min_temperature));

        let final_epsilon = ra.neighbor_epsilon(&ra.chains()[0]);
        assert!(final_epsilon < initial_epsilon);
        assert!(final_epsilon >= params.epsilon);
    }

    #[test]
    fn tunneling_chain_escapes_where_annealing_stays() {
        let encoder = encoder();
        // Chain sits 50 below its best; the proposal is a further 10 below.
        let mut stuck = Candidate::evaluated(scored(3, 0.0));
        stuck.move_to(scored(5, -50.0));

        let accepted_moves = |kind: AnnealingKind| {
            let mut rng = SearchRng::seed_from_u64(6);
            (0..200)
                .filter(|_| {
                    let mut chain = Annealing::new(kind, AnnealingParams::default());
                    chain.chains[0].candidate = Some(stuck.clone());
                    chain.report(&[scored(9, -60.0)], &encoder, &mut rng);
                    let c = chain.chains()[0].candidate.as_ref().unwrap();
                    assert_eq!(c.best_score, 0.0);
                    c.position == Position::new(vec![9])
                })
                .count()
        };

        let tunneling = accepted_moves(AnnealingKind::StochasticTunneling);
        let annealing = accepted_moves(AnnealingKind::SimulatedAnnealing);
        assert!(tunneling > 190, "tunneling accepted {tunneling}");
        assert!(annealing < 5, "annealing accepted {annealing}");
    }

    #[test]
    fn parallel_tempering_runs_fixed_temperature_chains() {
        let encoder = encoder();
        let mut rng = SearchRng::seed_from_u64(4);
        let params = AnnealingParams {
            n_chains: 3,
            swap_interval: 1,
            ..AnnealingParams::default()
        };
        let mut pt = Annealing::new(AnnealingKind::ParallelTempering, params);
        let temperatures: Vec<f64> = pt.chains().iter().map(|c| c.temperature).collect();
        assert_eq!(temperatures, vec![1.0, 2.0, 4.0]);

        let initial = pt.suggest(&encoder, &mut rng);
        assert_eq!(initial.len(), 3);
        // Hottest chain holds the best state, coldest the worst: swaps are certain.
        pt.report(
            &[
                Scored::new(initial[0].clone(), 0.0),
                Scored::new(initial[1].clone(), 1.0),
                Scored::new(initial[2].clone(), 2.0),
            ],
            &encoder,
            &mut rng,
        );
        assert!(pt.swaps() >= 1);
        let after: Vec<f64> = pt.chains().iter().map(|c| c.temperature).collect();
        assert_eq!(after, temperatures);
        assert_eq!(pt.chains()[0].candidate.as_ref().unwrap().current_score(), 1.0);
    }
}
