use intent_core::InferenceError;
use thiserror::Error;

/// Failures raised while turning a belief into an assisted action.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssistError {
    #[error("belief has {found} entries for {expected} hypotheses")]
    BeliefLength { expected: usize, found: usize },

    #[error("belief must be finite, non-negative and carry positive mass")]
    InvalidBelief,

    #[error("at least one hypothesis is required")]
    NoHypotheses,

    #[error("action space must contain at least one action")]
    NoActions,

    #[error("action {action} is outside the action space [0, {action_space})")]
    InvalidAction { action: usize, action_space: usize },

    #[error("updater tracks {updater} hypotheses but the selector scores {selector}")]
    HypothesisCountMismatch { updater: usize, selector: usize },

    #[error("action space mismatch: expected {expected} actions, found {found}")]
    ActionSpaceMismatch { expected: usize, found: usize },

    #[error("assistance distribution has {found} entries for {expected} actions")]
    DistributionLength { expected: usize, found: usize },

    #[error("failed to sample action: {0}")]
    Sampling(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}
