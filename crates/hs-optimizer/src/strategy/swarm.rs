//! Particle swarm optimization over the index lattice.

use hs_types::{Position, SpaceEncoder};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{best_index, SearchRng, SearchStrategy};
use crate::candidate::{Candidate, Scored};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmParams {
    pub n_particles: usize,
    /// Inertia weight `w`.
    pub inertia: f64,
    /// Pull towards the particle's own best, `c1`.
    pub cognitive: f64,
    /// Pull towards the swarm's best, `c2`.
    pub social: f64,
    /// Initial velocity components are drawn from `[-init_velocity, init_velocity]`.
    pub init_velocity: f64,
}

impl Default for SwarmParams {
    fn default() -> Self {
        Self {
            n_particles: 10,
            inertia: 0.5,
            cognitive: 0.8,
            social: 0.9,
            init_velocity: 0.0,
        }
    }
}

/// One particle: a candidate (current + personal best) and its velocity.
#[derive(Debug, Clone)]
pub struct Particle {
    pub candidate: Candidate,
    /// Real-valued, unconstrained; positions are rounded and clamped.
    pub velocity: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ParticleSwarm {
    params: SwarmParams,
    particles: Vec<Particle>,
    global_best: Option<Scored>,
    start: Option<Scored>,
}

impl ParticleSwarm {
    pub fn new(params: SwarmParams) -> Self {
        Self {
            params,
            particles: Vec::new(),
            global_best: None,
            start: None,
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn global_best(&self) -> Option<&Scored> {
        self.global_best.as_ref()
    }

    fn n_particles(&self) -> usize {
        self.params.n_particles.max(1)
    }

    fn spawn(&mut self, results: &[Scored], rng: &mut SearchRng) {
        let spread = self.params.init_velocity.abs();
        self.particles = results
            .iter()
            .map(|r| Particle {
                candidate: Candidate::evaluated(r.clone()),
                velocity: (0..r.position.len())
                    .map(|_| if spread > 0.0 { rng.gen_range(-spread..=spread) } else { 0.0 })
                    .collect(),
            })
            .collect();
    }

    /// Recompute the swarm best across all personal bests.
    fn refresh_global_best(&mut self) {
        let bests: Vec<Scored> = self.particles.iter().map(|p| p.candidate.best()).collect();
        if let Some(i) = best_index(&bests) {
            let better = match &self.global_best {
                Some(g) => bests[i].score > g.score,
                None => true,
            };
            if better {
                self.global_best = Some(bests[i].clone());
            }
        }
    }
}

impl SearchStrategy for ParticleSwarm {
    fn suggest(&mut self, encoder: &SpaceEncoder, rng: &mut SearchRng) -> Vec<Position> {
        if self.particles.is_empty() {
            let mut positions: Vec<Position> = (0..self.n_particles())
                .map(|_| encoder.random_position(rng))
                .collect();
            if let Some(start) = &self.start {
                positions[0] = start.position.clone();
            }
            return positions;
        }

        let w = self.params.inertia;
        let c1 = self.params.cognitive;
        let c2 = self.params.social;
        let global = self.global_best.as_ref().map(|g| g.position.to_f64());

        let mut positions = Vec::with_capacity(self.particles.len());
        for particle in &mut self.particles {
            let pos = particle.candidate.position.to_f64();
            let personal = particle.candidate.best_position.to_f64();
            let social_target = global.as_ref().unwrap_or(&personal);
            let r1: f64 = rng.gen();
            let r2: f64 = rng.gen();

            let mut moved = Vec::with_capacity(pos.len());
            for d in 0..pos.len() {
                let v = w * particle.velocity[d]
                    + c1 * r1 * (personal[d] - pos[d])
                    + c2 * r2 * (social_target[d] - pos[d]);
                particle.velocity[d] = v;
                moved.push(pos[d] + v);
            }

            let next = encoder.round_clamp(&moved);
            particle.candidate.position = next.clone();
            particle.candidate.score = None;
            positions.push(next);
        }
        positions
    }

    fn report(&mut self, results: &[Scored], _encoder: &SpaceEncoder, rng: &mut SearchRng) {
        if self.particles.is_empty() {
            self.spawn(results, rng);
        } else {
            for (particle, result) in self.particles.iter_mut().zip(results) {
                particle.candidate.move_to(result.clone());
            }
        }
        self.refresh_global_best();
    }

    fn seed_start(&mut self, start: Scored) {
        self.start = Some(start);
    }

    fn name(&self) -> &'static str {
        "particle_swarm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hs_types::SearchSpace;
    use rand::SeedableRng;

    fn encoder() -> SpaceEncoder {
        SpaceEncoder::new(SearchSpace::new().add_int("x", 0, 99).add_int("y", 0, 99)).unwrap()
    }

    fn objective(p: &Position) -> f64 {
        let x = p[0] as f64 - 70.0;
        let y = p[1] as f64 - 20.0;
        -(x * x + y * y)
    }

    fn step(pso: &mut ParticleSwarm, encoder: &SpaceEncoder, rng: &mut SearchRng) {
        let batch = pso.suggest(encoder, rng);
        let results: Vec<Scored> = batch.iter().map(|p| Scored::new(p.clone(), objective(p))).collect();
        pso.report(&results, encoder, rng);
    }

    #[test]
    fn swarm_size_is_fixed_and_positions_valid() {
        let encoder = encoder();
        let mut rng = SearchRng::seed_from_u64(1);
        let mut pso = ParticleSwarm::new(SwarmParams {
            n_particles: 6,
            ..SwarmParams::default()
        });
        for _ in 0..15 {
            let batch = pso.suggest(&encoder, &mut rng);
            assert_eq!(batch.len(), 6);
            assert!(batch.iter().all(|p| encoder.contains(p)));
            let results: Vec<Scored> = batch.iter().map(|p| Scored::new(p.clone(), objective(p))).collect();
            pso.report(&results, &encoder, &mut rng);
            assert_eq!(pso.particles().len(), 6);
        }
    }

    #[test]
    fn global_best_never_regresses() {
        let encoder = encoder();
        let mut rng = SearchRng::seed_from_u64(2);
        let mut pso = ParticleSwarm::new(SwarmParams::default());
        let mut last = f64::NEG_INFINITY;
        for _ in 0..30 {
            step(&mut pso, &encoder, &mut rng);
            let g = pso.global_best().unwrap().score;
            assert!(g >= last);
            last = g;
        }
        // Personal bests are never better than the swarm best.
        for p in pso.particles() {
            assert!(p.candidate.best_score <= last);
        }
    }

    #[test]
    fn zero_acceleration_degenerates_to_pure_inertia() {
        let encoder = encoder();
        let mut rng = SearchRng::seed_from_u64(3);
        let params = SwarmParams {
            n_particles: 5,
            inertia: 0.8,
            cognitive: 0.0,
            social: 0.0,
            init_velocity: 6.0,
        };
        let w = params.inertia;
        let mut pso = ParticleSwarm::new(params);
        step(&mut pso, &encoder, &mut rng);

        let initial: Vec<(Position, Vec<f64>)> = pso
            .particles()
            .iter()
            .map(|p| (p.candidate.position.clone(), p.velocity.clone()))
            .collect();

        let steps = 6;
        for _ in 0..steps {
            step(&mut pso, &encoder, &mut rng);
        }

        for (particle, (start, v0)) in pso.particles().iter().zip(&initial) {
            // Replay the motion: each step adds w^t * v0, then rounds and clamps.
            let mut expected = start.clone();
            let mut v = v0.clone();
            for _ in 0..steps {
                v.iter_mut().for_each(|c| *c *= w);
                let coords: Vec<f64> = expected.iter().zip(&v).map(|(&x, &c)| x as f64 + c).collect();
                expected = encoder.round_clamp(&coords);
            }
            assert_eq!(particle.candidate.position, expected);
            for (v, v0) in particle.velocity.iter().zip(v0) {
                assert!((v - w.powi(steps) * v0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn seeded_start_joins_the_initial_swarm() {
        let encoder = encoder();
        let mut rng = SearchRng::seed_from_u64(4);
        let mut pso = ParticleSwarm::new(SwarmParams::default());
        let start = Position::new(vec![70, 20]);
        pso.seed_start(Scored::new(start.clone(), 0.0));
        let initial = pso.suggest(&encoder, &mut rng);
        assert_eq!(initial[0], start);
    }
}
