use intent_core::{BeliefUpdater, PolicyHypothesis};
use rand::Rng;

use crate::arbitration::{Arbiter, ArbitrationOutcome, belief_confidence};
use crate::error::AssistError;
use crate::selector::{ActionSelector, Selection};

/// Everything produced by one observe-recommend-arbitrate cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistStep {
    pub belief: Vec<f64>,
    pub confidence: f64,
    pub recommendation: Selection,
    pub outcome: ArbitrationOutcome,
}

/// Shared-autonomy loop: tracks the operator's goal and blends in the recommended action.
pub struct AssistSession<U, H> {
    updater: U,
    selector: ActionSelector<H>,
    arbiter: Arbiter,
}

impl<U, H> AssistSession<U, H>
where
    H: PolicyHypothesis,
    U: BeliefUpdater<State = H::State>,
{
    pub fn new(
        updater: U,
        selector: ActionSelector<H>,
        arbiter: Arbiter,
    ) -> Result<Self, AssistError> {
        if updater.hypothesis_count() != selector.hypothesis_count() {
            return Err(AssistError::HypothesisCountMismatch {
                updater: updater.hypothesis_count(),
                selector: selector.hypothesis_count(),
            });
        }
        if updater.action_space() != selector.action_space() {
            return Err(AssistError::ActionSpaceMismatch {
                expected: updater.action_space(),
                found: selector.action_space(),
            });
        }
        Ok(Self {
            updater,
            selector,
            arbiter,
        })
    }

    pub fn updater(&self) -> &U {
        &self.updater
    }

    pub fn arbiter(&self) -> Arbiter {
        self.arbiter
    }

    pub fn step<R: Rng + ?Sized>(
        &mut self,
        state: &H::State,
        user_action: usize,
        rng: &mut R,
    ) -> Result<AssistStep, AssistError> {
        let belief = self.updater.update(state, user_action)?;
        let confidence = belief_confidence(&belief);
        let recommendation = self.selector.select(state, &belief)?;
        let outcome =
            self.arbiter
                .arbitrate(user_action, &recommendation.distribution, confidence, rng)?;
        Ok(AssistStep {
            belief,
            confidence,
            recommendation,
            outcome,
        })
    }

    pub fn reset(&mut self) {
        self.updater.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitration::{ActionSource, Arbitration};
    use intent_core::{InferenceError, InferenceKind, InferenceModel, QTablePolicy};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn policies() -> Vec<QTablePolicy> {
        vec![
            QTablePolicy::new("zero", vec![vec![2.0, 0.0, 0.0]]).expect("valid"),
            QTablePolicy::new("two", vec![vec![0.0, 0.0, 2.0]]).expect("valid"),
        ]
    }

    fn session(mode: Arbitration) -> AssistSession<InferenceModel<QTablePolicy>, QTablePolicy> {
        let model = InferenceModel::with_defaults(InferenceKind::Bayesian, policies(), 3)
            .expect("model");
        let selector = ActionSelector::new(policies(), 3).expect("selector");
        AssistSession::new(model, selector, Arbiter::new(mode)).expect("session")
    }

    #[test]
    fn confidence_grows_with_consistent_operator() {
        let mut session = session(Arbitration::Linear);
        let mut rng = StdRng::seed_from_u64(9);
        let first = session.step(&0, 0, &mut rng).expect("step");
        for _ in 0..10 {
            session.step(&0, 0, &mut rng).expect("step");
        }
        let last = session.step(&0, 0, &mut rng).expect("step");
        assert!(last.confidence > first.confidence);
        assert_eq!(last.recommendation.action, 0);
        assert_eq!(last.outcome.action, 0);
    }

    #[test]
    fn user_only_passes_actions_through() {
        let mut session = session(Arbitration::UserOnly);
        let mut rng = StdRng::seed_from_u64(10);
        for action in [0, 1, 2, 1] {
            let step = session.step(&0, action, &mut rng).expect("step");
            assert_eq!(step.outcome.action, action);
            assert_eq!(step.outcome.source, ActionSource::User);
        }
    }

    #[test]
    fn inference_errors_surface_and_reset_restores_uniform() {
        let mut session = session(Arbitration::Linear);
        let mut rng = StdRng::seed_from_u64(11);
        session.step(&0, 2, &mut rng).expect("step");
        let err = session.step(&0, 5, &mut rng).expect_err("bad action");
        assert!(matches!(
            err,
            AssistError::Inference(InferenceError::InvalidObservation { action: 5, .. })
        ));
        session.reset();
        assert_eq!(session.updater().probabilities(), vec![0.5, 0.5]);
    }

    struct Untyped(Vec<Vec<f64>>);

    impl PolicyHypothesis for Untyped {
        type State = usize;

        fn value(&self, state: &usize, action: usize) -> f64 {
            self.0[*state][action]
        }
    }

    #[test]
    fn mismatched_action_spaces_are_reported_as_such() {
        let model =
            InferenceModel::with_defaults(InferenceKind::Crf, policies(), 3).expect("model");
        let hypotheses = vec![Untyped(vec![vec![0.0; 4]]), Untyped(vec![vec![1.0; 4]])];
        let selector = ActionSelector::new(hypotheses, 4).expect("selector");
        let err = AssistSession::new(model, selector, Arbiter::default())
            .err()
            .expect("action spaces differ");
        assert_eq!(
            err,
            AssistError::ActionSpaceMismatch {
                expected: 3,
                found: 4
            }
        );
    }

    #[test]
    fn mismatched_hypothesis_counts_are_rejected() {
        let model =
            InferenceModel::with_defaults(InferenceKind::Crf, policies(), 3).expect("model");
        let selector = ActionSelector::new(policies()[..1].to_vec(), 3).expect("selector");
        let err = AssistSession::new(model, selector, Arbiter::default())
            .err()
            .expect("hypothesis counts differ");
        assert_eq!(
            err,
            AssistError::HypothesisCountMismatch {
                updater: 2,
                selector: 1
            }
        );
    }
}
