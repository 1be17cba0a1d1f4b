//! Local search: hill climbing variants and tabu search.
//!
//! All variants keep one current candidate and sample `n_neighbours`
//! neighbors around it per step. They differ only in which neighbor they move
//! to and what they do when stuck:
//!
//! * **Hill climbing** moves to the best neighbor only on strict improvement.
//! * **Stochastic hill climbing** also accepts a worse neighbor with a
//!   probability that shrinks with the relative score gap.
//! * **Random-restart hill climbing** jumps to a fresh random position after
//!   `n_iter_restart` steps without improvement.
//! * **Tabu search** keeps a fixed-tenure FIFO memory of positions it left and
//!   refuses to return to them, unless the move would beat everything the
//!   search has seen (aspiration).

use std::collections::{HashSet, VecDeque};

use hs_types::{Position, SpaceEncoder};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{best_index, SearchRng, SearchStrategy};
use crate::candidate::{Candidate, Scored};

/// Attempts at drawing a non-tabu neighbor before settling for a tabu one.
const TABU_RETRIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalKind {
    HillClimbing,
    StochasticHillClimbing,
    RandomRestartHillClimbing,
    TabuSearch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSearchParams {
    /// Neighborhood size as a fraction of each dimension's length.
    pub epsilon: f64,
    /// Neighbors sampled per step.
    pub n_neighbours: usize,
    /// Base acceptance probability for worse moves (stochastic variant).
    pub p_accept: f64,
    /// Sharpness of the acceptance decay with the score gap (stochastic variant).
    pub norm_factor: f64,
    /// Steps without improvement before a restart (random-restart variant).
    pub n_iter_restart: usize,
    /// Tabu memory size (tabu variant).
    pub tabu_tenure: usize,
}

impl Default for LocalSearchParams {
    fn default() -> Self {
        Self {
            epsilon: 0.05,
            n_neighbours: 3,
            p_accept: 0.5,
            norm_factor: 10.0,
            n_iter_restart: 10,
            tabu_tenure: 10,
        }
    }
}

/// Probability of accepting a worse neighbor in stochastic hill climbing.
///
/// `1.0` when `proposed >= current`, otherwise
/// `p_accept * exp(-norm_factor * gap / (|current| + |proposed|))`.
pub fn stochastic_acceptance(current: f64, proposed: f64, p_accept: f64, norm_factor: f64) -> f64 {
    if proposed >= current {
        return 1.0;
    }
    if !proposed.is_finite() {
        return 0.0;
    }
    let gap = current - proposed;
    let scale = current.abs() + proposed.abs() + 1e-12;
    p_accept * (-norm_factor * gap / scale).exp()
}

/// Fixed-tenure FIFO memory of positions.
#[derive(Debug, Clone)]
pub struct TabuList {
    tenure: usize,
    queue: VecDeque<Position>,
    set: HashSet<Position>,
}

impl TabuList {
    pub fn new(tenure: usize) -> Self {
        Self {
            tenure,
            queue: VecDeque::with_capacity(tenure),
            set: HashSet::with_capacity(tenure),
        }
    }

    /// Record a position, evicting the oldest one once the tenure is reached.
    pub fn push(&mut self, position: Position) {
        if self.tenure == 0 || self.set.contains(&position) {
            return;
        }
        if self.queue.len() >= self.tenure {
            if let Some(oldest) = self.queue.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.set.insert(position.clone());
        self.queue.push_back(position);
    }

    pub fn contains(&self, position: &Position) -> bool {
        self.set.contains(position)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct LocalSearch {
    kind: LocalKind,
    params: LocalSearchParams,
    current: Option<Candidate>,
    stale_steps: usize,
    restart_pending: bool,
    tabu: TabuList,
}

impl LocalSearch {
    pub fn new(kind: LocalKind, params: LocalSearchParams) -> Self {
        let tabu = TabuList::new(params.tabu_tenure);
        Self {
            kind,
            params,
            current: None,
            stale_steps: 0,
            restart_pending: false,
            tabu,
        }
    }

    pub fn kind(&self) -> LocalKind {
        self.kind
    }

    pub fn current(&self) -> Option<&Candidate> {
        self.current.as_ref()
    }

    pub fn tabu(&self) -> &TabuList {
        &self.tabu
    }

    fn propose_neighbor(&self, from: &Position, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Position {
        let mut neighbor = encoder.neighbor(from, self.params.epsilon, rng);
        if self.kind == LocalKind::TabuSearch {
            for _ in 0..TABU_RETRIES {
                if !self.tabu.contains(&neighbor) {
                    break;
                }
                neighbor = encoder.neighbor(from, self.params.epsilon, rng);
            }
        }
        neighbor
    }
}

impl SearchStrategy for LocalSearch {
    fn suggest(&mut self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Vec<Position> {
        match &self.current {
            None => vec![encoder.random_position(rng)],
            Some(_) if self.restart_pending => vec![encoder.random_position(rng)],
            Some(current) => (0..self.params.n_neighbours.max(1))
                .map(|_| self.propose_neighbor(&current.position, encoder, rng))
                .collect(),
        }
    }

    fn report(&mut self, results: &[Scored], _encoder: &SpaceEncoder, rng: &mut SearchRng) {
        let Some(first) = best_index(results).map(|i| results[i].clone()) else {
            return;
        };

        if self.current.is_none() || self.restart_pending {
            self.current = Some(Candidate::evaluated(first));
            self.restart_pending = false;
            self.stale_steps = 0;
            return;
        }

        // Moves are strict improvements, so a tabu neighbor that improves on
        // the current score also beats the best seen. The filter below then
        // reduces to aspiration; avoidance happens in `suggest`.
        let kind = self.kind;
        let tabu = &self.tabu;
        let best_seen = self.current.as_ref().map_or(f64::NEG_INFINITY, |c| c.best_score);
        let admissible: Vec<Scored> = results
            .iter()
            .filter(|r| kind != LocalKind::TabuSearch || !tabu.contains(&r.position) || r.score > best_seen)
            .cloned()
            .collect();
        let Some(choice) = best_index(&admissible).map(|i| admissible[i].clone()) else {
            self.stale_steps += 1;
            return;
        };
        let Some(current) = self.current.as_mut() else {
            return;
        };

        let current_score = current.current_score();
        let improves = choice.score > current_score;
        let accept = match self.kind {
            LocalKind::StochasticHillClimbing => {
                improves
                    || rng.gen::<f64>()
                        < stochastic_acceptance(current_score, choice.score, self.params.p_accept, self.params.norm_factor)
            }
            _ => improves,
        };

        if accept {
            if self.kind == LocalKind::TabuSearch {
                self.tabu.push(current.position.clone());
            }
            current.move_to(choice);
        }

        if improves {
            self.stale_steps = 0;
        } else {
            self.stale_steps += 1;
            if self.kind == LocalKind::RandomRestartHillClimbing
                && self.stale_steps >= self.params.n_iter_restart
            {
                self.restart_pending = true;
            }
        }
    }

    fn seed_start(&mut self, start: Scored) {
        self.current = Some(Candidate::evaluated(start));
    }

    fn name(&self) -> &'static str {
        match self.kind {
            LocalKind::HillClimbing => "hill_climbing",
            LocalKind::StochasticHillClimbing => "stochastic_hill_climbing",
            LocalKind::RandomRestartHillClimbing => "random_restart_hill_climbing",
            LocalKind::TabuSearch => "tabu_search",
        }
    }
}
