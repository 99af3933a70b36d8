//! Candidate policies whose action values explain the operator's behavior.

use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, Result};

/// A candidate behavior policy scored over a discrete action space.
pub trait PolicyHypothesis {
    type State: ?Sized;

    /// Value of taking `action` in `state`.
    fn value(&self, state: &Self::State, action: usize) -> f64;

    /// Batched variant of [`PolicyHypothesis::value`].
    fn values(&self, state: &Self::State, actions: &[usize]) -> Vec<f64> {
        actions
            .iter()
            .map(|&action| self.value(state, action))
            .collect()
    }

    /// Minimum and maximum over the hypothesis's full value table, when known.
    fn value_range(&self) -> Option<(f64, f64)> {
        None
    }

    /// Number of actions the hypothesis was built for, when it has a fixed width.
    fn declared_actions(&self) -> Option<usize> {
        None
    }
}

impl<P: PolicyHypothesis + ?Sized> PolicyHypothesis for &P {
    type State = P::State;

    fn value(&self, state: &Self::State, action: usize) -> f64 {
        (**self).value(state, action)
    }

    fn values(&self, state: &Self::State, actions: &[usize]) -> Vec<f64> {
        (**self).values(state, actions)
    }

    fn value_range(&self) -> Option<(f64, f64)> {
        (**self).value_range()
    }

    fn declared_actions(&self) -> Option<usize> {
        (**self).declared_actions()
    }
}

impl<P: PolicyHypothesis + ?Sized> PolicyHypothesis for Box<P> {
    type State = P::State;

    fn value(&self, state: &Self::State, action: usize) -> f64 {
        (**self).value(state, action)
    }

    fn values(&self, state: &Self::State, actions: &[usize]) -> Vec<f64> {
        (**self).values(state, actions)
    }

    fn value_range(&self) -> Option<(f64, f64)> {
        (**self).value_range()
    }

    fn declared_actions(&self) -> Option<usize> {
        (**self).declared_actions()
    }
}

/// Tabular hypothesis indexed by `(state, action)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QTableSpec", into = "QTableSpec")]
pub struct QTablePolicy {
    name: String,
    table: Vec<Vec<f64>>,
    default_value: f64,
    range: (f64, f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct QTableSpec {
    name: String,
    q_table: Vec<Vec<f64>>,
    #[serde(default)]
    default_value: f64,
}

impl TryFrom<QTableSpec> for QTablePolicy {
    type Error = InferenceError;

    fn try_from(spec: QTableSpec) -> Result<Self> {
        Ok(Self::new(spec.name, spec.q_table)?.with_default_value(spec.default_value))
    }
}

impl From<QTablePolicy> for QTableSpec {
    fn from(policy: QTablePolicy) -> Self {
        Self {
            name: policy.name,
            q_table: policy.table,
            default_value: policy.default_value,
        }
    }
}

impl QTablePolicy {
    /// Builds a policy from a rectangular `states x actions` table of finite values.
    pub fn new(name: impl Into<String>, table: Vec<Vec<f64>>) -> Result<Self> {
        let name = name.into();
        let Some(first) = table.first() else {
            return Err(InferenceError::config(
                "q_table",
                format!("hypothesis '{name}' has no states"),
            ));
        };
        let actions = first.len();
        if actions == 0 {
            return Err(InferenceError::config(
                "q_table",
                format!("hypothesis '{name}' has no actions"),
            ));
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (state, row) in table.iter().enumerate() {
            if row.len() != actions {
                return Err(InferenceError::config(
                    "q_table",
                    format!(
                        "hypothesis '{name}' row {state} has {} actions, expected {actions}",
                        row.len()
                    ),
                ));
            }
            for &value in row {
                if !value.is_finite() {
                    return Err(InferenceError::config(
                        "q_table",
                        format!("hypothesis '{name}' row {state} contains a non-finite value"),
                    ));
                }
                min = min.min(value);
                max = max.max(value);
            }
        }

        Ok(Self {
            name,
            table,
            default_value: 0.0,
            range: (min, max),
        })
    }

    /// Value reported for state/action pairs outside the table.
    pub fn with_default_value(mut self, value: f64) -> Self {
        if value.is_finite() {
            self.default_value = value;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state_count(&self) -> usize {
        self.table.len()
    }

    pub fn action_count(&self) -> usize {
        self.table.first().map(Vec::len).unwrap_or(0)
    }

    /// Highest-valued action in `state`; lowest index wins ties.
    pub fn greedy_action(&self, state: usize) -> Option<usize> {
        let row = self.table.get(state)?;
        let mut best: Option<(usize, f64)> = None;
        for (action, &value) in row.iter().enumerate() {
            if best.is_none_or(|(_, best_value)| value > best_value) {
                best = Some((action, value));
            }
        }
        best.map(|(action, _)| action)
    }
}

impl PolicyHypothesis for QTablePolicy {
    type State = usize;

    fn value(&self, state: &usize, action: usize) -> f64 {
        self.table
            .get(*state)
            .and_then(|row| row.get(action))
            .copied()
            .unwrap_or(self.default_value)
    }

    fn value_range(&self) -> Option<(f64, f64)> {
        Some(self.range)
    }

    fn declared_actions(&self) -> Option<usize> {
        Some(self.action_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_values_and_range() {
        let policy = QTablePolicy::new("left", vec![vec![1.0, -2.0], vec![0.5, 3.0]])
            .expect("valid table");
        assert_eq!(policy.value(&1, 1), 3.0);
        assert_eq!(policy.values(&0, &[1, 0]), vec![-2.0, 1.0]);
        assert_eq!(policy.value_range(), Some((-2.0, 3.0)));
        assert_eq!(policy.greedy_action(0), Some(0));
        assert_eq!(policy.action_count(), 2);
        assert_eq!(policy.state_count(), 2);
    }

    #[test]
    fn unknown_pairs_use_default_value() {
        let policy = QTablePolicy::new("p", vec![vec![1.0]])
            .expect("valid")
            .with_default_value(-1.0);
        assert_eq!(policy.value(&4, 0), -1.0);
        assert_eq!(policy.value(&0, 9), -1.0);
    }

    #[test]
    fn rejects_ragged_or_non_finite_tables() {
        assert!(QTablePolicy::new("ragged", vec![vec![1.0, 2.0], vec![1.0]]).is_err());
        assert!(QTablePolicy::new("nan", vec![vec![f64::NAN]]).is_err());
        assert!(QTablePolicy::new("empty", Vec::new()).is_err());
        assert!(QTablePolicy::new("no_actions", vec![Vec::new()]).is_err());
    }

    #[test]
    fn boxed_hypotheses_delegate() {
        let policy = QTablePolicy::new("p", vec![vec![0.0, 2.0]]).expect("valid");
        let boxed: Box<dyn PolicyHypothesis<State = usize>> = Box::new(policy);
        assert_eq!(boxed.value(&0, 1), 2.0);
        assert_eq!(boxed.value_range(), Some((0.0, 2.0)));
        assert_eq!(boxed.declared_actions(), Some(2));
    }

    #[test]
    fn deserializes_from_json() {
        let policy: QTablePolicy =
            serde_json::from_str(r#"{"name":"goal","q_table":[[1.0,0.0]]}"#).expect("parse");
        assert_eq!(policy.name(), "goal");
        assert!(serde_json::from_str::<QTablePolicy>(r#"{"name":"bad","q_table":[]}"#).is_err());
    }
}
