//! (mu + lambda) evolution strategy over the index lattice.

use hs_types::{Position, SpaceEncoder};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{SearchRng, SearchStrategy};
use crate::candidate::Scored;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionParams {
    pub population_size: usize,
    /// Share of the population kept as parents, in (0, 1].
    pub selection_fraction: f64,
    /// Mutation step as a fraction of each dimension's length.
    pub mutation_epsilon: f64,
    /// Probability that an offspring recombines two parents before mutating.
    pub crossover_rate: f64,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self {
            population_size: 10,
            selection_fraction: 0.5,
            mutation_epsilon: 0.1,
            crossover_rate: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvolutionStrategy {
    params: EvolutionParams,
    /// Sorted best-first.
    population: Vec<Scored>,
    start: Option<Scored>,
}

impl EvolutionStrategy {
    pub fn new(params: EvolutionParams) -> Self {
        Self {
            params,
            population: Vec::new(),
            start: None,
        }
    }

    pub fn population(&self) -> &[Scored] {
        &self.population
    }

    fn population_size(&self) -> usize {
        self.params.population_size.max(1)
    }

    fn n_parents(&self) -> usize {
        let n = (self.params.selection_fraction * self.population.len() as f64).ceil() as usize;
        n.clamp(1, self.population.len().max(1))
    }

    fn sort_and_truncate(&mut self) {
        self.population
            .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        self.population.truncate(self.population_size());
    }

    fn offspring(&self, parents: &[Scored], encoder: &SpaceEncoder, rng: &mut SearchRng) -> Position {
        let first = &parents[rng.gen_range(0..parents.len())].position;
        let base = if parents.len() >= 2 && rng.gen::<f64>() < self.params.crossover_rate {
            let second = &parents[rng.gen_range(0..parents.len())].position;
            let mixed: Vec<usize> = first
                .iter()
                .zip(second.iter())
                .map(|(&a, &b)| if rng.gen_bool(0.5) { a } else { b })
                .collect();
            Position::new(mixed)
        } else {
            first.clone()
        };
        encoder.neighbor(&base, self.params.mutation_epsilon, rng)
    }
}

impl SearchStrategy for EvolutionStrategy {
    fn suggest(&mut self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Vec<Position> {
        if self.population.is_empty() {
            let mut positions: Vec<Position> = (0..self.population_size())
                .map(|_| encoder.random_position(rng))
                .collect();
            if let Some(start) = &self.start {
                positions[0] = start.position.clone();
            }
            return positions;
        }

        let parents = &self.population[..self.n_parents()];
        (0..self.population_size())
            .map(|_| self.offspring(parents, encoder, rng))
            .collect()
    }

    fn report(&mut self, results: &[Scored], _encoder: &SpaceEncoder, _rng: &mut SearchRng) {
        if !self.population.is_empty() {
            let n_parents = self.n_parents();
            self.population.truncate(n_parents);
        }
        self.population.extend(results.iter().cloned());
        self.sort_and_truncate();
    }

    fn seed_start(&mut self, start: Scored) {
        self.start = Some(start);
    }

    fn name(&self) -> &'static str {
        "evolution_strategy"
    }
}
