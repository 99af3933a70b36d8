//! Belief-weighted action recommendation over the hypotheses' rescaled values.

use intent_core::PolicyHypothesis;
use intent_core::numeric;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::error::AssistError;

/// Recommended action together with the full distribution it was drawn from.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub action: usize,
    pub distribution: Vec<f64>,
}

/// Computes the belief-weighted expectation of every hypothesis's value per action.
///
/// Each hypothesis's values are min-max rescaled using the range it reports, so policies
/// with very different value scales contribute comparably. Hypotheses that do not report a
/// range are used unscaled.
#[derive(Debug, Clone)]
pub struct ActionSelector<H> {
    hypotheses: Vec<H>,
    action_space: usize,
    ranges: Vec<Option<(f64, f64)>>,
}

impl<H: PolicyHypothesis> ActionSelector<H> {
    pub fn new(hypotheses: Vec<H>, action_space: usize) -> Result<Self, AssistError> {
        if hypotheses.is_empty() {
            return Err(AssistError::NoHypotheses);
        }
        if action_space == 0 {
            return Err(AssistError::NoActions);
        }
        if let Some(found) = hypotheses
            .iter()
            .filter_map(|h| h.declared_actions())
            .find(|&actions| actions != action_space)
        {
            return Err(AssistError::ActionSpaceMismatch {
                expected: action_space,
                found,
            });
        }
        let ranges = hypotheses.iter().map(|h| h.value_range()).collect();
        Ok(Self {
            hypotheses,
            action_space,
            ranges,
        })
    }

    pub fn hypothesis_count(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn action_space(&self) -> usize {
        self.action_space
    }

    /// Per-hypothesis, per-action values after range normalization.
    pub fn scaled_values(&self, state: &H::State) -> Vec<Vec<f64>> {
        let actions: Vec<usize> = (0..self.action_space).collect();
        self.hypotheses
            .iter()
            .zip(&self.ranges)
            .map(|(hypothesis, range)| {
                hypothesis
                    .values(state, &actions)
                    .into_iter()
                    .map(|value| rescale(value, *range))
                    .collect()
            })
            .collect()
    }

    pub fn expected_values(
        &self,
        state: &H::State,
        belief: &[f64],
    ) -> Result<Vec<f64>, AssistError> {
        let weights = self.checked_belief(belief)?;
        let mut expected = vec![0.0; self.action_space];
        for (weight, values) in weights.iter().zip(self.scaled_values(state)) {
            for (slot, value) in expected.iter_mut().zip(values) {
                *slot += weight * value;
            }
        }
        Ok(expected)
    }

    /// Softmax of the expected values: `exp(q - logsumexp(q))`.
    pub fn distribution(
        &self,
        state: &H::State,
        belief: &[f64],
    ) -> Result<Vec<f64>, AssistError> {
        let expected = self.expected_values(state, belief)?;
        let log_norm = numeric::log_sum_exp(&expected);
        Ok(expected
            .into_iter()
            .map(|value| (value - log_norm).exp())
            .collect())
    }

    /// Highest expected-value action; the lowest index wins ties.
    pub fn best_action(&self, state: &H::State, belief: &[f64]) -> Result<usize, AssistError> {
        let expected = self.expected_values(state, belief)?;
        Ok(argmax(&expected))
    }

    pub fn select(&self, state: &H::State, belief: &[f64]) -> Result<Selection, AssistError> {
        let distribution = self.distribution(state, belief)?;
        Ok(Selection {
            action: argmax(&distribution),
            distribution,
        })
    }

    pub fn sample_action<R: Rng + ?Sized>(
        &self,
        state: &H::State,
        belief: &[f64],
        rng: &mut R,
    ) -> Result<usize, AssistError> {
        let distribution = self.distribution(state, belief)?;
        sample_index(&distribution, rng)
    }

    fn checked_belief(&self, belief: &[f64]) -> Result<Vec<f64>, AssistError> {
        if belief.len() != self.hypotheses.len() {
            return Err(AssistError::BeliefLength {
                expected: self.hypotheses.len(),
                found: belief.len(),
            });
        }
        if belief.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(AssistError::InvalidBelief);
        }
        numeric::normalize_mass(belief, "selector belief")
            .map_err(|_| AssistError::InvalidBelief)
    }
}

fn rescale(value: f64, range: Option<(f64, f64)>) -> f64 {
    match range {
        Some((min, max)) if (max - min).abs() <= f64::EPSILON => 0.5,
        Some((min, max)) => (value - min) / (max - min),
        None => value,
    }
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (idx, value) in values.iter().enumerate() {
        if *value > values[best] {
            best = idx;
        }
    }
    best
}

pub(crate) fn sample_index<R: Rng + ?Sized>(
    distribution: &[f64],
    rng: &mut R,
) -> Result<usize, AssistError> {
    let index =
        WeightedIndex::new(distribution).map_err(|err| AssistError::Sampling(err.to_string()))?;
    Ok(index.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use intent_core::QTablePolicy;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn selector() -> ActionSelector<QTablePolicy> {
        ActionSelector::new(
            vec![
                QTablePolicy::new("left", vec![vec![10.0, 0.0, 5.0]]).expect("valid"),
                QTablePolicy::new("right", vec![vec![0.0, 1.0, 0.5]]).expect("valid"),
            ],
            3,
        )
        .expect("builds")
    }

    #[test]
    fn values_are_rescaled_per_hypothesis() {
        let scaled = selector().scaled_values(&0);
        assert_eq!(scaled[0], vec![1.0, 0.0, 0.5]);
        assert_eq!(scaled[1], vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn flat_tables_map_to_midpoint() {
        let selector = ActionSelector::new(
            vec![QTablePolicy::new("flat", vec![vec![3.0, 3.0]]).expect("valid")],
            2,
        )
        .expect("builds");
        assert_eq!(selector.scaled_values(&0), vec![vec![0.5, 0.5]]);
    }

    #[test]
    fn tables_must_match_the_action_space() {
        let err = ActionSelector::new(
            vec![QTablePolicy::new("narrow", vec![vec![1.0, 0.0]]).expect("valid")],
            5,
        )
        .err()
        .expect("two-action table for five actions");
        assert_eq!(
            err,
            AssistError::ActionSpaceMismatch {
                expected: 5,
                found: 2
            }
        );
    }

    #[test]
    fn belief_steers_the_recommendation() {
        let selector = selector();
        assert_eq!(selector.best_action(&0, &[0.9, 0.1]).expect("valid"), 0);
        assert_eq!(selector.best_action(&0, &[0.1, 0.9]).expect("valid"), 1);
        let selection = selector.select(&0, &[0.9, 0.1]).expect("valid");
        assert_eq!(selection.action, 0);
        let total: f64 = selection.distribution.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn expected_values_are_belief_weighted() {
        let expected = selector().expected_values(&0, &[0.25, 0.75]).expect("valid");
        assert!((expected[0] - 0.25).abs() < 1e-12);
        assert!((expected[1] - 0.75).abs() < 1e-12);
        assert!((expected[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_malformed_beliefs() {
        let selector = selector();
        assert_eq!(
            selector.best_action(&0, &[1.0]),
            Err(AssistError::BeliefLength {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(
            selector.best_action(&0, &[f64::NAN, 1.0]),
            Err(AssistError::InvalidBelief)
        );
        assert_eq!(
            selector.best_action(&0, &[0.0, 0.0]),
            Err(AssistError::InvalidBelief)
        );
    }

    #[test]
    fn sampling_follows_distribution() {
        let selector = selector();
        let mut rng = StdRng::seed_from_u64(11);
        let mut counts = [0usize; 3];
        for _ in 0..2000 {
            counts[selector.sample_action(&0, &[1.0, 0.0], &mut rng).expect("valid")] += 1;
        }
        let dist = selector.distribution(&0, &[1.0, 0.0]).expect("valid");
        for action in 0..3 {
            let observed = counts[action] as f64 / 2000.0;
            assert!((observed - dist[action]).abs() < 0.05);
        }
    }
}
