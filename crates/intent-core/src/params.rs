//! Hyperparameters shared by the belief updaters.

use serde::{Deserialize, Serialize};
use std::env;

use crate::belief::InferenceKind;
use crate::error::{InferenceError, Result};

const DEFAULT_LOG_FLOOR: f64 = 1e-12;
const MAX_LOG_FLOOR: f64 = 1e-3;

/// Immutable per-updater configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparams {
    /// Likelihood temperature; values are divided by it before the softmax.
    pub tau: f64,
    /// Uniform mass mixed into the belief after every update.
    pub eps: f64,
    /// Weight on new evidence versus retained belief.
    pub alpha: f64,
    /// Mass reserved for a uniform "goal changed" hypothesis (Bayesian and CRF).
    pub p_switch: f64,
    /// Posterior temperature; above one flattens, below one sharpens (Bayesian and CRF).
    pub beta: f64,
    /// Logit bonus for repeating the previous action (CRF).
    pub pairwise_weight: f64,
    /// Additive floor applied before every logarithm.
    pub log_floor: f64,
}

impl Hyperparams {
    pub const fn bayesian() -> Self {
        Self {
            tau: 0.8,
            eps: 1e-3,
            alpha: 0.05,
            p_switch: 0.02,
            beta: 1.0,
            pairwise_weight: 0.0,
            log_floor: DEFAULT_LOG_FLOOR,
        }
    }

    pub const fn max_ent() -> Self {
        Self {
            tau: 0.8,
            eps: 1e-2,
            alpha: 0.5,
            p_switch: 0.0,
            beta: 1.0,
            pairwise_weight: 0.0,
            log_floor: DEFAULT_LOG_FLOOR,
        }
    }

    pub const fn crf() -> Self {
        Self {
            tau: 0.8,
            eps: 1e-2,
            alpha: 0.05,
            p_switch: 0.02,
            beta: 1.0,
            pairwise_weight: 0.3,
            log_floor: DEFAULT_LOG_FLOOR,
        }
    }

    pub const fn for_kind(kind: InferenceKind) -> Self {
        match kind {
            InferenceKind::Bayesian => Self::bayesian(),
            InferenceKind::MaxEnt => Self::max_ent(),
            InferenceKind::Crf => Self::crf(),
        }
    }

    /// Defaults for `kind` with `INTENT_*` environment overrides applied.
    pub fn from_env(kind: InferenceKind) -> Self {
        Self::from_reader(kind, |key| env::var(key).ok())
    }

    fn from_reader<F>(kind: InferenceKind, mut read: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut parse = |key: &str| {
            read(key)
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|value| value.is_finite())
        };

        let overrides = HyperparamOverrides {
            tau: parse("INTENT_TAU"),
            eps: parse("INTENT_EPS"),
            alpha: parse("INTENT_ALPHA"),
            p_switch: parse("INTENT_P_SWITCH"),
            beta: parse("INTENT_BETA"),
            pairwise_weight: parse("INTENT_PAIRWISE_WEIGHT"),
            log_floor: parse("INTENT_LOG_FLOOR"),
        };
        Self::for_kind(kind).merged(&overrides)
    }

    /// Returns a copy with every set override applied.
    pub fn merged(&self, overrides: &HyperparamOverrides) -> Self {
        Self {
            tau: overrides.tau.unwrap_or(self.tau),
            eps: overrides.eps.unwrap_or(self.eps),
            alpha: overrides.alpha.unwrap_or(self.alpha),
            p_switch: overrides.p_switch.unwrap_or(self.p_switch),
            beta: overrides.beta.unwrap_or(self.beta),
            pairwise_weight: overrides.pairwise_weight.unwrap_or(self.pairwise_weight),
            log_floor: overrides.log_floor.unwrap_or(self.log_floor),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tau.is_finite() && self.tau > 0.0) {
            return Err(InferenceError::config(
                "tau",
                format!("temperature must be positive and finite, got {}", self.tau),
            ));
        }
        if !(0.0..1.0).contains(&self.eps) {
            return Err(InferenceError::config(
                "eps",
                format!("smoothing floor must lie in [0, 1), got {}", self.eps),
            ));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(InferenceError::config(
                "alpha",
                format!("forgetting rate must lie in [0, 1], got {}", self.alpha),
            ));
        }
        if !(0.0..=1.0).contains(&self.p_switch) {
            return Err(InferenceError::config(
                "p_switch",
                format!("switch probability must lie in [0, 1], got {}", self.p_switch),
            ));
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(InferenceError::config(
                "beta",
                format!(
                    "posterior temperature must be positive and finite, got {}",
                    self.beta
                ),
            ));
        }
        if !self.pairwise_weight.is_finite() {
            return Err(InferenceError::config(
                "pairwise_weight",
                "pairwise weight must be finite",
            ));
        }
        if !(self.log_floor > 0.0 && self.log_floor <= MAX_LOG_FLOOR) {
            return Err(InferenceError::config(
                "log_floor",
                format!(
                    "log floor must lie in (0, {MAX_LOG_FLOOR}], got {}",
                    self.log_floor
                ),
            ));
        }
        Ok(())
    }
}

impl Default for Hyperparams {
    fn default() -> Self {
        Self::bayesian()
    }
}

/// Partial hyperparameter set merged over an updater's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HyperparamOverrides {
    pub tau: Option<f64>,
    pub eps: Option<f64>,
    pub alpha: Option<f64>,
    pub p_switch: Option<f64>,
    pub beta: Option<f64>,
    pub pairwise_weight: Option<f64>,
    pub log_floor: Option<f64>,
}

impl HyperparamOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn tau(mut self, value: f64) -> Self {
        self.tau = Some(value);
        self
    }

    pub fn eps(mut self, value: f64) -> Self {
        self.eps = Some(value);
        self
    }

    pub fn alpha(mut self, value: f64) -> Self {
        self.alpha = Some(value);
        self
    }

    pub fn p_switch(mut self, value: f64) -> Self {
        self.p_switch = Some(value);
        self
    }

    pub fn beta(mut self, value: f64) -> Self {
        self.beta = Some(value);
        self
    }

    pub fn log_floor(mut self, value: f64) -> Self {
        self.log_floor = Some(value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_validate_for_every_kind() {
        for kind in InferenceKind::ALL {
            Hyperparams::for_kind(kind).validate().expect("defaults are valid");
        }
    }

    #[test]
    fn rejects_out_of_range_values() {
        let base = Hyperparams::bayesian();
        let cases = [
            ("tau", HyperparamOverrides::default().tau(0.0)),
            ("tau", HyperparamOverrides::default().tau(f64::NAN)),
            ("eps", HyperparamOverrides::default().eps(1.0)),
            ("eps", HyperparamOverrides::default().eps(-0.1)),
            ("alpha", HyperparamOverrides::default().alpha(1.5)),
            ("p_switch", HyperparamOverrides::default().p_switch(-0.5)),
            ("beta", HyperparamOverrides::default().beta(0.0)),
            ("log_floor", HyperparamOverrides::default().log_floor(0.0)),
        ];
        for (field, overrides) in cases {
            let err = base.merged(&overrides).validate().expect_err("should fail");
            assert!(
                matches!(&err, InferenceError::InvalidConfiguration { field: f, .. } if f == field),
                "unexpected error {err:?} for {field}"
            );
        }
    }

    #[test]
    fn zero_smoothing_is_accepted() {
        Hyperparams::bayesian()
            .merged(&HyperparamOverrides::default().eps(0.0))
            .validate()
            .expect("eps may be zero");
    }

    #[test]
    fn merged_only_touches_set_fields() {
        let base = Hyperparams::crf();
        let merged = base.merged(&HyperparamOverrides::default().alpha(0.4).beta(2.0));
        assert_eq!(merged.alpha, 0.4);
        assert_eq!(merged.beta, 2.0);
        assert_eq!(merged.tau, base.tau);
        assert_eq!(merged.pairwise_weight, base.pairwise_weight);
        assert!(HyperparamOverrides::default().is_empty());
    }

    #[test]
    fn reader_applies_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("INTENT_TAU", "0.5"),
            ("INTENT_ALPHA", "not-a-number"),
            ("INTENT_BETA", "inf"),
        ]
        .into_iter()
        .collect();
        let params = Hyperparams::from_reader(InferenceKind::Bayesian, |key| {
            env.get(key).map(|value| value.to_string())
        });
        assert_eq!(params.tau, 0.5);
        assert_eq!(params.alpha, Hyperparams::bayesian().alpha);
        assert_eq!(params.beta, 1.0);
    }

    #[test]
    fn overrides_deserialize_from_json() {
        let overrides: HyperparamOverrides =
            serde_json::from_str(r#"{"alpha":0.2,"pairwise_weight":0.7}"#).expect("parse");
        assert_eq!(overrides.alpha, Some(0.2));
        assert_eq!(overrides.pairwise_weight, Some(0.7));
        assert!(serde_json::from_str::<HyperparamOverrides>(r#"{"gamma":1.0}"#).is_err());
    }
}
