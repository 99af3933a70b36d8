//! Linear-chain CRF filter with one step of temporal context.

use super::bayesian::forgetting_fold;
use super::{
    Belief, BeliefUpdater, HypothesisSet, InferenceKind, effective_params, log_update,
};
use crate::error::Result;
use crate::hypothesis::PolicyHypothesis;
use crate::numeric;
use crate::params::{HyperparamOverrides, Hyperparams};

/// Forgetting filter whose per-action logits add a pairwise bonus when the action repeats
/// the previously observed one.
///
/// The pairwise term for step `t` depends on the raw action observed at `t - 1`, so the
/// previous action is recorded only after the current likelihood has been computed.
#[derive(Debug, Clone)]
pub struct CrfUpdater<H> {
    hypotheses: HypothesisSet<H>,
    params: Hyperparams,
    belief: Belief,
    prev_action: Option<usize>,
}

impl<H: PolicyHypothesis> CrfUpdater<H> {
    pub fn new(hypotheses: Vec<H>, action_space: usize, params: Hyperparams) -> Result<Self> {
        params.validate()?;
        let hypotheses = HypothesisSet::new(hypotheses, action_space)?;
        let belief = Belief::uniform(hypotheses.len());
        Ok(Self {
            hypotheses,
            params,
            belief,
            prev_action: None,
        })
    }

    pub fn with_defaults(hypotheses: Vec<H>, action_space: usize) -> Result<Self> {
        Self::new(hypotheses, action_space, Hyperparams::crf())
    }

    pub fn hypotheses(&self) -> &[H] {
        self.hypotheses.as_slice()
    }

    pub fn belief(&self) -> &Belief {
        &self.belief
    }

    /// Action observed on the previous update, if any since construction or reset.
    pub fn previous_action(&self) -> Option<usize> {
        self.prev_action
    }

    fn pairwise(&self, action: usize, weight: f64) -> f64 {
        match self.prev_action {
            Some(prev) if prev == action => weight,
            _ => 0.0,
        }
    }

    fn chain_log_likelihood(
        &self,
        hypothesis: &H,
        state: &H::State,
        action: usize,
        params: &Hyperparams,
    ) -> f64 {
        let mut logits = self.hypotheses.unary_logits(hypothesis, state, params.tau);
        for (candidate, logit) in logits.iter_mut().enumerate() {
            *logit += self.pairwise(candidate, params.pairwise_weight);
        }
        numeric::softmax_log_prob(&logits, action, params.log_floor)
    }
}

impl<H: PolicyHypothesis> BeliefUpdater for CrfUpdater<H> {
    type State = H::State;

    fn kind(&self) -> InferenceKind {
        InferenceKind::Crf
    }

    fn hypothesis_count(&self) -> usize {
        self.hypotheses.len()
    }

    fn action_space(&self) -> usize {
        self.hypotheses.action_space()
    }

    fn hyperparams(&self) -> &Hyperparams {
        &self.params
    }

    fn log_likelihood(&self, state: &H::State, action: usize, hypothesis: usize) -> Result<f64> {
        self.hypotheses.check_action(action)?;
        let policy = self.hypotheses.check_index(hypothesis)?;
        Ok(self.chain_log_likelihood(policy, state, action, &self.params))
    }

    fn update_with(
        &mut self,
        state: &H::State,
        action: usize,
        overrides: &HyperparamOverrides,
    ) -> Result<Vec<f64>> {
        let params = effective_params(&self.params, overrides)?;
        self.hypotheses.check_action(action)?;

        let log_likes: Vec<f64> = self
            .hypotheses
            .as_slice()
            .iter()
            .map(|hypothesis| self.chain_log_likelihood(hypothesis, state, action, &params))
            .collect();
        let post = forgetting_fold(&self.belief, &log_likes, &params);
        self.belief.store(&post, params.log_floor);
        self.prev_action = Some(action);

        log_update(self.kind(), action, &post);
        Ok(post)
    }

    fn probabilities(&self) -> Vec<f64> {
        self.belief.probabilities()
    }

    fn reset(&mut self) {
        self.belief.reset();
        self.prev_action = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::BayesianUpdater;
    use crate::hypothesis::QTablePolicy;

    fn flat(actions: usize) -> Vec<QTablePolicy> {
        vec![
            QTablePolicy::new("a", vec![vec![0.0; actions]]).expect("valid"),
            QTablePolicy::new("b", vec![vec![0.0; actions]]).expect("valid"),
        ]
    }

    #[test]
    fn first_step_has_no_pairwise_contribution() {
        let crf = CrfUpdater::with_defaults(flat(3), 3).expect("builds");
        let expected = (1.0f64 / 3.0 + 1e-12).ln();
        let actual = crf.log_likelihood(&0, 1, 0).expect("valid");
        assert!((actual - expected).abs() < 1e-12);
    }

    #[test]
    fn repeated_action_gains_pairwise_bonus() {
        let mut crf = CrfUpdater::with_defaults(flat(3), 3).expect("builds");
        crf.update(&0, 2).expect("update");
        assert_eq!(crf.previous_action(), Some(2));

        let repeat = crf.log_likelihood(&0, 2, 0).expect("valid");
        for other in [0, 1] {
            let alternative = crf.log_likelihood(&0, other, 0).expect("valid");
            assert!(repeat > alternative);
        }
    }

    #[test]
    fn zero_pairwise_weight_matches_bayesian_filter() {
        let policies = vec![
            QTablePolicy::new("zero", vec![vec![1.0, 0.0]]).expect("valid"),
            QTablePolicy::new("one", vec![vec![0.0, 1.0]]).expect("valid"),
        ];
        let params = Hyperparams {
            pairwise_weight: 0.0,
            ..Hyperparams::crf()
        };
        let mut crf = CrfUpdater::new(policies.clone(), 2, params).expect("builds");
        let mut bayes = BayesianUpdater::new(policies, 2, params).expect("builds");
        for action in [0, 0, 1, 0] {
            let a = crf.update(&0, action).expect("update");
            let b = bayes.update(&0, action).expect("update");
            assert_eq!(a, b);
        }
    }

    #[test]
    fn context_is_recorded_after_likelihood() {
        let policies = vec![
            QTablePolicy::new("zero", vec![vec![1.0, 0.0]]).expect("valid"),
            QTablePolicy::new("one", vec![vec![0.0, 1.0]]).expect("valid"),
        ];
        let mut crf = CrfUpdater::with_defaults(policies.clone(), 2).expect("builds");
        let mut bayes = BayesianUpdater::new(policies, 2, Hyperparams::crf()).expect("builds");
        // First step sees no context, so it must match the plain forgetting filter.
        assert_eq!(
            crf.update(&0, 1).expect("update"),
            bayes.update(&0, 1).expect("update")
        );
        assert_ne!(
            crf.update(&0, 1).expect("update"),
            bayes.update(&0, 1).expect("update")
        );
    }

    #[test]
    fn reset_clears_context_and_belief() {
        let mut crf = CrfUpdater::with_defaults(flat(2), 2).expect("builds");
        crf.update(&0, 1).expect("update");
        crf.reset();
        assert_eq!(crf.previous_action(), None);
        assert_eq!(crf.probabilities(), vec![0.5, 0.5]);
        let expected = (0.5f64 + 1e-12).ln();
        assert!((crf.log_likelihood(&0, 1, 1).expect("valid") - expected).abs() < 1e-12);
    }

    #[test]
    fn invalid_action_keeps_previous_context() {
        let mut crf = CrfUpdater::with_defaults(flat(2), 2).expect("builds");
        crf.update(&0, 0).expect("update");
        assert!(crf.update(&0, 5).is_err());
        assert_eq!(crf.previous_action(), Some(0));
    }
}
