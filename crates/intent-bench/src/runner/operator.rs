//! Simulated operator producing goal-directed action sequences.

use intent_core::{PolicyHypothesis, QTablePolicy, numeric};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::EpisodeConfig;

/// Observation shown to every updater, together with the goal that generated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub state: usize,
    pub action: usize,
    pub goal: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    pub index: usize,
    pub observations: Vec<Observation>,
}

/// Draws episodes from a seeded RNG so every updater sees the same operator behaviour.
pub struct SyntheticOperator<'a> {
    hypotheses: &'a [QTablePolicy],
    config: &'a EpisodeConfig,
    rng: StdRng,
}

impl<'a> SyntheticOperator<'a> {
    pub fn new(hypotheses: &'a [QTablePolicy], config: &'a EpisodeConfig) -> Self {
        Self {
            hypotheses,
            config,
            rng: StdRng::seed_from_u64(config.seed.unwrap_or(0)),
        }
    }

    pub fn generate(mut self) -> Vec<Episode> {
        (0..self.config.count)
            .map(|index| self.episode(index))
            .collect()
    }

    fn episode(&mut self, index: usize) -> Episode {
        let goals = self.hypotheses.len();
        let mut goal = self.rng.gen_range(0..goals);
        let mut observations = Vec::with_capacity(self.config.steps);
        for step in 0..self.config.steps {
            if self.config.switch_at == Some(step) && goals > 1 {
                goal = (goal + self.rng.gen_range(1..goals)) % goals;
            }
            let state = self.rng.gen_range(0..self.hypotheses[goal].state_count());
            let action = self.operator_action(goal, state);
            observations.push(Observation {
                state,
                action,
                goal,
            });
        }
        Episode {
            index,
            observations,
        }
    }

    fn operator_action(&mut self, goal: usize, state: usize) -> usize {
        let policy = &self.hypotheses[goal];
        let actions = policy.action_count();
        if self.config.noise > 0.0 && self.rng.gen_bool(self.config.noise) {
            return self.rng.gen_range(0..actions);
        }

        let logits: Vec<f64> = (0..actions)
            .map(|action| policy.value(&state, action) / self.config.operator_tau)
            .collect();
        let log_norm = numeric::log_sum_exp(&logits);
        let weights: Vec<f64> = logits.iter().map(|l| (l - log_norm).exp()).collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => policy.greedy_action(state).unwrap_or(0),
        }
    }
}
