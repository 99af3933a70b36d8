pub mod belief;
pub mod error;
pub mod hypothesis;
pub mod numeric;
pub mod params;

pub use belief::{
    BayesianUpdater, Belief, BeliefMetrics, BeliefUpdater, CrfUpdater, HypothesisSet,
    InferenceKind, InferenceModel, MaxEntUpdater, SharedUpdater,
};
pub use error::{InferenceError, Result};
pub use hypothesis::{PolicyHypothesis, QTablePolicy};
pub use params::{HyperparamOverrides, Hyperparams};

pub struct AppInfo;

impl AppInfo {
    pub const fn name() -> &'static str {
        "intent-filter"
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[cfg(test)]
mod tests {
    use super::AppInfo;

    #[test]
    fn exposes_static_metadata() {
        assert_eq!(AppInfo::name(), "intent-filter");
        assert!(!AppInfo::version().is_empty());
    }
}
