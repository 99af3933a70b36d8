//! Maximum-entropy filter.

use super::{
    Belief, BeliefUpdater, HypothesisSet, InferenceKind, effective_params, log_update,
};
use crate::error::Result;
use crate::hypothesis::PolicyHypothesis;
use crate::numeric;
use crate::params::{HyperparamOverrides, Hyperparams};

/// Treats each observation as direct evidence: the normalized softmax likelihood is
/// blended into the belief in probability space with weight `alpha`.
///
/// Old evidence decays geometrically, so the belief converges to the normalized
/// likelihood of a repeated observation. `p_switch` and `beta` are ignored.
#[derive(Debug, Clone)]
pub struct MaxEntUpdater<H> {
    hypotheses: HypothesisSet<H>,
    params: Hyperparams,
    belief: Belief,
}

impl<H: PolicyHypothesis> MaxEntUpdater<H> {
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
        Self::new(hypotheses, action_space, Hyperparams::max_ent())
    }

    pub fn hypotheses(&self) -> &[H] {
        self.hypotheses.as_slice()
    }

    pub fn belief(&self) -> &Belief {
        &self.belief
    }
}

impl<H: PolicyHypothesis> BeliefUpdater for MaxEntUpdater<H> {
    type State = H::State;

    fn kind(&self) -> InferenceKind {
        InferenceKind::MaxEnt
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

        let log_likes: Vec<f64> = self
            .hypotheses
            .as_slice()
            .iter()
            .map(|hypothesis| {
                let logits = self.hypotheses.unary_logits(hypothesis, state, params.tau);
                numeric::softmax_log_prob(&logits, action, params.log_floor)
            })
            .collect();
        let likes = numeric::normalize_log_or_uniform(&log_likes, "likelihood");

        let mut post = self.belief.probabilities();
        for (p, like) in post.iter_mut().zip(&likes) {
            *p = (1.0 - params.alpha) * *p + params.alpha * like;
        }
        numeric::mix_uniform(&mut post, params.eps);
        numeric::floor_simplex(&mut post, params.log_floor);
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
