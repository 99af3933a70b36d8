//! Forgetting Bayesian filter.

use super::{
    Belief, BeliefUpdater, HypothesisSet, InferenceKind, effective_params, log_update,
};
use crate::error::{InferenceError, Result};
use crate::hypothesis::PolicyHypothesis;
use crate::numeric;
use crate::params::{HyperparamOverrides, Hyperparams};

/// Softmax-likelihood filter with exponential forgetting in log-space, goal-switch mixing
/// and posterior temperature.
#[derive(Debug, Clone)]
pub struct BayesianUpdater<H> {
    hypotheses: HypothesisSet<H>,
    params: Hyperparams,
    belief: Belief,
}

impl<H: PolicyHypothesis> BayesianUpdater<H> {
    pub fn new(hypotheses: Vec<H>, action_space: usize, params: Hyperparams) -> Result<Self> {
        params.validate()?;
        let hypotheses = HypothesisSet::new(hypotheses, action_space)?;
        let belief = Belief::uniform(hypotheses.len());
        Ok(Self {
            hypotheses,
            params,
            belief,
        })
    }

    pub fn with_defaults(hypotheses: Vec<H>, action_space: usize) -> Result<Self> {
        Self::new(hypotheses, action_space, Hyperparams::bayesian())
    }

    /// Starts the episode from `prior` instead of the uniform belief.
    ///
    /// [`BeliefUpdater::reset`] still returns to the uniform belief.
    pub fn with_prior(mut self, prior: &[f64]) -> Result<Self> {
        if prior.len() != self.hypotheses.len() {
            return Err(InferenceError::config(
                "prior",
                format!(
                    "prior has {} entries for {} hypotheses",
                    prior.len(),
                    self.hypotheses.len()
                ),
            ));
        }
        self.belief = Belief::from_prior(prior, self.params.log_floor)?;
        Ok(self)
    }

    pub fn hypotheses(&self) -> &[H] {
        self.hypotheses.as_slice()
    }

    pub fn belief(&self) -> &Belief {
        &self.belief
    }

    fn log_likelihoods(&self, state: &H::State, action: usize, params: &Hyperparams) -> Vec<f64> {
        self.hypotheses
            .as_slice()
            .iter()
            .map(|hypothesis| {
                let logits = self.hypotheses.unary_logits(hypothesis, state, params.tau);
                numeric::softmax_log_prob(&logits, action, params.log_floor)
            })
            .collect()
    }
}

/// Steps 2-6 of the forgetting update, shared with the CRF filter.
///
/// Blends the stored log-belief with the new log-evidence, returns to probability space,
/// mixes in the goal-switch prior, applies the posterior temperature and finally the
/// smoothing mix. The result is floored at `log_floor`, so every entry stays strictly
/// inside `(0, 1)` even when `eps` is zero.
pub(super) fn forgetting_fold(
    belief: &Belief,
    log_likes: &[f64],
    params: &Hyperparams,
) -> Vec<f64> {
    let alpha = params.alpha;
    let blended: Vec<f64> = belief
        .log_probs()
        .iter()
        .zip(log_likes)
        .map(|(retained, evidence)| (1.0 - alpha) * retained + alpha * evidence)
        .collect();

    let mut post = numeric::normalize_log_or_uniform(&blended, "forgetting");
    numeric::mix_uniform(&mut post, params.p_switch);
    let mut post = numeric::temper(&post, params.beta);
    numeric::mix_uniform(&mut post, params.eps);
    numeric::floor_simplex(&mut post, params.log_floor);
    post
}

impl<H: PolicyHypothesis> BeliefUpdater for BayesianUpdater<H> {
    type State = H::State;

    fn kind(&self) -> InferenceKind {
        InferenceKind::Bayesian
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
        let logits = self.hypotheses.unary_logits(policy, state, self.params.tau);
        Ok(numeric::softmax_log_prob(
            &logits,
            action,
            self.params.log_floor,
        ))
    }

    fn update_with(
        &mut self,
        state: &H::State,
        action: usize,
        overrides: &HyperparamOverrides,
    ) -> Result<Vec<f64>> {
        let params = effective_params(&self.params, overrides)?;
        self.hypotheses.check_action(action)?;

        let log_likes = self.log_likelihoods(state, action, &params);
        let post = forgetting_fold(&self.belief, &log_likes, &params);
        self.belief.store(&post, params.log_floor);

        log_update(self.kind(), action, &post);
        Ok(post)
    }

    fn probabilities(&self) -> Vec<f64> {
        self.belief.probabilities()
    }

    fn reset(&mut self) {
        self.belief.reset();
    }
}
