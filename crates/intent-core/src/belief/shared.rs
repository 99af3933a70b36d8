//! Thread-safe handle around a single updater.

use parking_lot::RwLock;
use std::sync::Arc;

use super::BeliefUpdater;
use crate::error::Result;
use crate::params::HyperparamOverrides;

/// Cloneable handle that serializes updates on one updater instance.
///
/// Updates and resets take the write lock because the read-modify-write of the belief is
/// not atomic; readers share the read lock and never observe a half-applied update.
pub struct SharedUpdater<U> {
    inner: Arc<RwLock<U>>,
}

impl<U> Clone for SharedUpdater<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U: BeliefUpdater> SharedUpdater<U> {
    pub fn new(updater: U) -> Self {
        Self {
            inner: Arc::new(RwLock::new(updater)),
        }
    }

    pub fn update(&self, state: &U::State, action: usize) -> Result<Vec<f64>> {
        self.inner.write().update(state, action)
    }

    pub fn update_with(
        &self,
        state: &U::State,
        action: usize,
        overrides: &HyperparamOverrides,
    ) -> Result<Vec<f64>> {
        self.inner.write().update_with(state, action, overrides)
    }

    pub fn probabilities(&self) -> Vec<f64> {
        self.inner.read().probabilities()
    }

    pub fn reset(&self) {
        self.inner.write().reset();
    }

    /// Runs `f` against the updater under the read lock.
    pub fn with_read<R>(&self, f: impl FnOnce(&U) -> R) -> R {
        f(&self.inner.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::{BayesianUpdater, InferenceKind};
    use crate::hypothesis::QTablePolicy;
    use std::thread;

    #[test]
    fn concurrent_updates_are_serialized() {
        let policies = vec![
            QTablePolicy::new("zero", vec![vec![1.0, 0.0]]).expect("valid"),
            QTablePolicy::new("one", vec![vec![0.0, 1.0]]).expect("valid"),
        ];
        let shared =
            SharedUpdater::new(BayesianUpdater::with_defaults(policies, 2).expect("builds"));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let handle = shared.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        handle.update(&0, 0).expect("update");
                        let probs = handle.probabilities();
                        let total: f64 = probs.iter().sum();
                        assert!((total - 1.0).abs() < 1e-9);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread completes");
        }

        let probs = shared.probabilities();
        assert!(probs[0] > probs[1]);
        assert_eq!(shared.with_read(|u| u.kind()), InferenceKind::Bayesian);
        shared.reset();
        assert_eq!(shared.probabilities(), vec![0.5, 0.5]);
    }
}
