use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{Level, event};

use crate::error::AssistError;
use crate::selector::{argmax, sample_index};

/// How the operator's action and the recommendation are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arbitration {
    #[default]
    Linear,
    Probabilistic,
    UserOnly,
}

impl Arbitration {
    pub const ALL: [Arbitration; 3] = [
        Arbitration::Linear,
        Arbitration::Probabilistic,
        Arbitration::UserOnly,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Arbitration::Linear => "Linear",
            Arbitration::Probabilistic => "Probabilistic",
            Arbitration::UserOnly => "User Action Only",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Arbitration::Linear => "linear",
            Arbitration::Probabilistic => "probabilistic",
            Arbitration::UserOnly => "user_only",
        }
    }
}

impl fmt::Display for Arbitration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Arbitration {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|mode| {
                mode.key().eq_ignore_ascii_case(trimmed)
                    || mode.label().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| format!("unknown arbitration mode '{trimmed}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    User,
    Assist,
}

impl ActionSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionSource::User => "user",
            ActionSource::Assist => "assist",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbitrationOutcome {
    pub action: usize,
    pub source: ActionSource,
}

/// Rescales the MAP probability so a uniform belief gives 0 and a point mass gives 1.
pub fn belief_confidence(belief: &[f64]) -> f64 {
    let n = belief.len();
    if n <= 1 {
        return 0.0;
    }
    let max = belief
        .iter()
        .copied()
        .filter(|p| p.is_finite())
        .fold(0.0f64, f64::max);
    let uniform = 1.0 / n as f64;
    ((max - uniform) / (1.0 - uniform)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Arbiter {
    mode: Arbitration,
}

impl Arbiter {
    pub fn new(mode: Arbitration) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> Arbitration {
        self.mode
    }

    pub fn arbitrate<R: Rng + ?Sized>(
        &self,
        user_action: usize,
        assist_distribution: &[f64],
        confidence: f64,
        rng: &mut R,
    ) -> Result<ArbitrationOutcome, AssistError> {
        let action_space = assist_distribution.len();
        if action_space == 0 {
            return Err(AssistError::NoActions);
        }
        if user_action >= action_space {
            return Err(AssistError::InvalidAction {
                action: user_action,
                action_space,
            });
        }
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let outcome = match self.mode {
            Arbitration::UserOnly => user_outcome(user_action),
            Arbitration::Linear => {
                let blended: Vec<f64> = assist_distribution
                    .iter()
                    .enumerate()
                    .map(|(action, p)| {
                        let user = if action == user_action { 1.0 } else { 0.0 };
                        (1.0 - confidence) * user + confidence * p
                    })
                    .collect();
                let best = argmax(&blended);
                if blended[best] > blended[user_action] {
                    ArbitrationOutcome {
                        action: best,
                        source: ActionSource::Assist,
                    }
                } else {
                    user_outcome(user_action)
                }
            }
            Arbitration::Probabilistic => {
                if confidence > 0.0 && rng.gen_bool(confidence) {
                    ArbitrationOutcome {
                        action: sample_index(assist_distribution, rng)?,
                        source: ActionSource::Assist,
                    }
                } else {
                    user_outcome(user_action)
                }
            }
        };

        if tracing::enabled!(target: "intent_assist::arbitration", Level::DEBUG) {
            event!(
                target: "intent_assist::arbitration",
                Level::DEBUG,
                mode = self.mode.key(),
                user_action,
                confidence,
                action = outcome.action,
                source = outcome.source.as_str(),
            );
        }
        Ok(outcome)
    }
}

fn user_outcome(action: usize) -> ArbitrationOutcome {
    ArbitrationOutcome {
        action,
        source: ActionSource::User,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn confidence_spans_uniform_to_certain() {
        assert_eq!(belief_confidence(&[0.25; 4]), 0.0);
        assert!((belief_confidence(&[1.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!((belief_confidence(&[0.75, 0.25]) - 0.5).abs() < 1e-12);
        assert_eq!(belief_confidence(&[1.0]), 0.0);
    }

    #[test]
    fn user_only_never_overrides() {
        let arbiter = Arbiter::new(Arbitration::UserOnly);
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = arbiter
            .arbitrate(2, &[0.9, 0.05, 0.05], 1.0, &mut rng)
            .expect("valid");
        assert_eq!(outcome, user_outcome(2));
    }

    #[test]
    fn linear_blend_switches_with_confidence() {
        let arbiter = Arbiter::new(Arbitration::Linear);
        let mut rng = StdRng::seed_from_u64(2);
        let dist = [0.8, 0.1, 0.1];
        let low = arbiter.arbitrate(1, &dist, 0.2, &mut rng).expect("valid");
        assert_eq!(low, user_outcome(1));
        let high = arbiter.arbitrate(1, &dist, 0.9, &mut rng).expect("valid");
        assert_eq!(
            high,
            ArbitrationOutcome {
                action: 0,
                source: ActionSource::Assist
            }
        );
    }

    #[test]
    fn linear_agreement_is_credited_to_user() {
        let arbiter = Arbiter::new(Arbitration::Linear);
        let mut rng = StdRng::seed_from_u64(3);
        let outcome = arbiter.arbitrate(0, &[0.7, 0.3], 1.0, &mut rng).expect("valid");
        assert_eq!(outcome, user_outcome(0));
    }

    #[test]
    fn probabilistic_respects_extremes() {
        let arbiter = Arbiter::new(Arbitration::Probabilistic);
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..50 {
            let outcome = arbiter.arbitrate(1, &[1.0, 0.0], 0.0, &mut rng).expect("valid");
            assert_eq!(outcome, user_outcome(1));
            let outcome = arbiter.arbitrate(1, &[1.0, 0.0], 1.0, &mut rng).expect("valid");
            assert_eq!(outcome.action, 0);
            assert_eq!(outcome.source, ActionSource::Assist);
        }
    }

    #[test]
    fn rejects_out_of_range_user_actions() {
        let arbiter = Arbiter::default();
        let mut rng = StdRng::seed_from_u64(5);
        assert_eq!(
            arbiter.arbitrate(3, &[0.5, 0.5], 0.5, &mut rng),
            Err(AssistError::InvalidAction {
                action: 3,
                action_space: 2
            })
        );
        assert_eq!(
            arbiter.arbitrate(0, &[], 0.5, &mut rng),
            Err(AssistError::NoActions)
        );
    }

    #[test]
    fn modes_parse_from_keys_and_labels() {
        assert_eq!("user action only".parse::<Arbitration>(), Ok(Arbitration::UserOnly));
        assert_eq!("probabilistic".parse::<Arbitration>(), Ok(Arbitration::Probabilistic));
        assert!("blend".parse::<Arbitration>().is_err());
        assert_eq!(Arbitration::default(), Arbitration::Linear);
    }
}
