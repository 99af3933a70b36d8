//! Online belief tracking over candidate policy hypotheses.
//!
//! This module is composed of:
//! - `bayesian`: forgetting Bayesian filter with goal-switch mixing and posterior temperature.
//! - `maxent`: maximum-entropy filter blending softmax likelihoods in probability space.
//! - `crf`: linear-chain CRF filter coupling consecutive actions through a pairwise term.
//! - `shared`: lock-guarded handle serializing updates across threads.
//! - `telemetry`: entropy and concentration metrics over a belief snapshot.

mod bayesian;
mod crf;
mod maxent;
mod shared;
pub mod telemetry;

pub use bayesian::BayesianUpdater;
pub use crf::CrfUpdater;
pub use maxent::MaxEntUpdater;
pub use shared::SharedUpdater;
pub use telemetry::BeliefMetrics;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{Level, event};

use crate::error::{InferenceError, Result};
use crate::hypothesis::PolicyHypothesis;
use crate::numeric;
use crate::params::{HyperparamOverrides, Hyperparams};

/// Inference method selected once when an updater is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceKind {
    Bayesian,
    MaxEnt,
    Crf,
}

impl InferenceKind {
    pub const ALL: [InferenceKind; 3] = [
        InferenceKind::Bayesian,
        InferenceKind::MaxEnt,
        InferenceKind::Crf,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            InferenceKind::Bayesian => "Bayesian",
            InferenceKind::MaxEnt => "Max Entropy",
            InferenceKind::Crf => "Conditional Random Fields",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            InferenceKind::Bayesian => "bayesian",
            InferenceKind::MaxEnt => "max_ent",
            InferenceKind::Crf => "crf",
        }
    }
}

impl fmt::Display for InferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for InferenceKind {
    type Err = InferenceError;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|kind| {
                kind.key().eq_ignore_ascii_case(trimmed)
                    || kind.label().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| {
                InferenceError::config(
                    "kind",
                    format!("unknown inference method '{trimmed}' (expected bayesian, max_ent or crf)"),
                )
            })
    }
}

/// Probability simplex over the hypotheses, stored as log-probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct Belief {
    log_probs: Vec<f64>,
}

impl Belief {
    /// Uniform belief over `n` hypotheses.
    pub fn uniform(n: usize) -> Self {
        Self {
            log_probs: vec![-(n as f64).ln(); n],
        }
    }

    /// Belief seeded from an explicit prior, renormalized.
    pub fn from_prior(prior: &[f64], floor: f64) -> Result<Self> {
        let probs = numeric::normalize_mass(prior, "prior").map_err(|_| {
            InferenceError::config("prior", "prior must carry positive finite mass")
        })?;
        Ok(Self {
            log_probs: numeric::to_log(&probs, floor),
        })
    }

    pub fn len(&self) -> usize {
        self.log_probs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_probs.is_empty()
    }

    /// Read-only view of the stored log-probabilities.
    pub fn log_probs(&self) -> &[f64] {
        &self.log_probs
    }

    /// Renormalized probability simplex; does not mutate the stored state.
    pub fn probabilities(&self) -> Vec<f64> {
        numeric::normalize_log_or_uniform(&self.log_probs, "belief readout")
    }

    pub fn reset(&mut self) {
        *self = Self::uniform(self.len());
    }

    fn store(&mut self, post: &[f64], floor: f64) {
        self.log_probs = numeric::to_log(post, floor);
    }
}

/// Ordered, immutable hypothesis set sharing one discrete action space.
#[derive(Debug, Clone)]
pub struct HypothesisSet<H> {
    hypotheses: Vec<H>,
    action_space: usize,
}

impl<H: PolicyHypothesis> HypothesisSet<H> {
    pub fn new(hypotheses: Vec<H>, action_space: usize) -> Result<Self> {
        if hypotheses.is_empty() {
            return Err(InferenceError::config(
                "hypotheses",
                "at least one hypothesis is required",
            ));
        }
        if action_space == 0 {
            return Err(InferenceError::config(
                "action_space",
                "action space must contain at least one action",
            ));
        }
        for (index, hypothesis) in hypotheses.iter().enumerate() {
            if let Some(actions) = hypothesis.declared_actions()
                && actions != action_space
            {
                return Err(InferenceError::config(
                    "action_space",
                    format!("hypothesis {index} has {actions} actions, expected {action_space}"),
                ));
            }
        }
        Ok(Self {
            hypotheses,
            action_space,
        })
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn action_space(&self) -> usize {
        self.action_space
    }

    pub fn as_slice(&self) -> &[H] {
        &self.hypotheses
    }

    pub fn check_action(&self, action: usize) -> Result<()> {
        if action >= self.action_space {
            return Err(InferenceError::InvalidObservation {
                action,
                action_space: self.action_space,
            });
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<&H> {
        self.hypotheses.get(index).ok_or_else(|| {
            InferenceError::config(
                "hypothesis",
                format!("index {index} out of range for {} hypotheses", self.len()),
            )
        })
    }

    /// Temperature-scaled values of hypothesis `index` over every action.
    fn unary_logits(&self, hypothesis: &H, state: &H::State, tau: f64) -> Vec<f64> {
        let actions: Vec<usize> = (0..self.action_space).collect();
        hypothesis
            .values(state, &actions)
            .into_iter()
            .map(|value| value / tau)
            .collect()
    }
}

/// Shared contract of every online belief updater.
pub trait BeliefUpdater {
    type State: ?Sized;

    fn kind(&self) -> InferenceKind;

    fn hypothesis_count(&self) -> usize;

    fn action_space(&self) -> usize;

    fn hyperparams(&self) -> &Hyperparams;

    /// Log-probability of `action` under hypothesis `hypothesis` at the current context.
    fn log_likelihood(&self, state: &Self::State, action: usize, hypothesis: usize)
    -> Result<f64>;

    /// Folds one observation into the belief using `overrides` for this call only.
    fn update_with(
        &mut self,
        state: &Self::State,
        action: usize,
        overrides: &HyperparamOverrides,
    ) -> Result<Vec<f64>>;

    fn update(&mut self, state: &Self::State, action: usize) -> Result<Vec<f64>> {
        self.update_with(state, action, &HyperparamOverrides::default())
    }

    /// Current belief as a probability simplex.
    fn probabilities(&self) -> Vec<f64>;

    /// Restores the uniform prior and clears any temporal context.
    fn reset(&mut self);
}

/// Closed set of updaters, chosen by [`InferenceKind`] at construction.
#[derive(Debug, Clone)]
pub enum InferenceModel<H> {
    Bayesian(BayesianUpdater<H>),
    MaxEnt(MaxEntUpdater<H>),
    Crf(CrfUpdater<H>),
}

impl<H: PolicyHypothesis> InferenceModel<H> {
    pub fn new(
        kind: InferenceKind,
        hypotheses: Vec<H>,
        action_space: usize,
        params: Hyperparams,
    ) -> Result<Self> {
        Ok(match kind {
            InferenceKind::Bayesian => {
                Self::Bayesian(BayesianUpdater::new(hypotheses, action_space, params)?)
            }
            InferenceKind::MaxEnt => {
                Self::MaxEnt(MaxEntUpdater::new(hypotheses, action_space, params)?)
            }
            InferenceKind::Crf => Self::Crf(CrfUpdater::new(hypotheses, action_space, params)?),
        })
    }

    pub fn with_defaults(
        kind: InferenceKind,
        hypotheses: Vec<H>,
        action_space: usize,
    ) -> Result<Self> {
        Self::new(kind, hypotheses, action_space, Hyperparams::for_kind(kind))
    }

    fn inner(&self) -> &dyn BeliefUpdater<State = H::State> {
        match self {
            Self::Bayesian(updater) => updater,
            Self::MaxEnt(updater) => updater,
            Self::Crf(updater) => updater,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn BeliefUpdater<State = H::State> {
        match self {
            Self::Bayesian(updater) => updater,
            Self::MaxEnt(updater) => updater,
            Self::Crf(updater) => updater,
        }
    }
}

impl<H: PolicyHypothesis> BeliefUpdater for InferenceModel<H> {
    type State = H::State;

    fn kind(&self) -> InferenceKind {
        self.inner().kind()
    }

    fn hypothesis_count(&self) -> usize {
        self.inner().hypothesis_count()
    }

    fn action_space(&self) -> usize {
        self.inner().action_space()
    }

    fn hyperparams(&self) -> &Hyperparams {
        self.inner().hyperparams()
    }

    fn log_likelihood(&self, state: &H::State, action: usize, hypothesis: usize) -> Result<f64> {
        self.inner().log_likelihood(state, action, hypothesis)
    }

    fn update_with(
        &mut self,
        state: &H::State,
        action: usize,
        overrides: &HyperparamOverrides,
    ) -> Result<Vec<f64>> {
        self.inner_mut().update_with(state, action, overrides)
    }

    fn probabilities(&self) -> Vec<f64> {
        self.inner().probabilities()
    }

    fn reset(&mut self) {
        self.inner_mut().reset()
    }
}

/// Merges per-call overrides and validates the result without touching the defaults.
fn effective_params(base: &Hyperparams, overrides: &HyperparamOverrides) -> Result<Hyperparams> {
    if overrides.is_empty() {
        return Ok(*base);
    }
    let params = base.merged(overrides);
    params.validate()?;
    Ok(params)
}

fn log_update(kind: InferenceKind, action: usize, post: &[f64]) {
    if !tracing::enabled!(target: "intent_core::belief", Level::TRACE) {
        return;
    }

    let metrics = BeliefMetrics::from_probabilities(post);
    event!(
        target: "intent_core::belief",
        Level::TRACE,
        kind = kind.key(),
        action,
        map_index = metrics.map_index,
        map_probability = metrics.map_probability,
        entropy = metrics.entropy
    );
}
