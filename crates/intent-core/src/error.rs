//! Error taxonomy for belief construction and updates.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    /// Rejected hyperparameters or hypothesis set; fatal to the instance being built.
    #[error("invalid configuration for {field}: {message}")]
    InvalidConfiguration { field: String, message: String },

    /// Observed action lies outside the action space; stored belief is untouched.
    #[error("action {action} is outside the action space [0, {action_space})")]
    InvalidObservation { action: usize, action_space: usize },

    /// Every mass underflowed or turned non-finite while normalizing.
    #[error("degenerate normalization during {stage}")]
    DegenerateNormalization { stage: &'static str },
}

impl InferenceError {
    pub(crate) fn config(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;
