use intent_assist::Arbitration;
use intent_core::{HyperparamOverrides, Hyperparams, InferenceKind, QTablePolicy};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_OPERATOR_TAU: f64 = 0.5;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root benchmark configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    pub run_id: String,
    pub episodes: EpisodeConfig,
    pub hypotheses: Vec<QTablePolicy>,
    pub updaters: Vec<UpdaterConfig>,
    #[serde(default)]
    pub assist: AssistConfig,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchmarkConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: BenchmarkConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        self.episodes.validate()?;
        validate_hypotheses(&self.hypotheses)?;
        validate_updaters(&self.updaters)?;
        self.outputs.validate(&self.run_id)?;
        self.metrics.validate(&self.updaters)?;
        self.logging.normalize();
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            jsonl: resolve_template(&self.run_id, &self.outputs.jsonl),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
            plots_dir: resolve_template(&self.run_id, &self.outputs.plots_dir),
        }
    }

    /// Number of actions shared by every hypothesis table.
    pub fn action_space(&self) -> usize {
        self.hypotheses
            .first()
            .map(QTablePolicy::action_count)
            .unwrap_or(0)
    }

    pub fn state_count(&self) -> usize {
        self.hypotheses
            .first()
            .map(QTablePolicy::state_count)
            .unwrap_or(0)
    }

    /// Keeps only updaters of `kind`, moving the baseline to the first survivor if needed.
    pub fn retain_kind(&mut self, kind: InferenceKind) {
        self.updaters.retain(|updater| updater.kind == kind);
        let baseline_kept = self
            .metrics
            .baseline
            .as_ref()
            .is_some_and(|name| self.updaters.iter().any(|u| &u.name == name));
        if !baseline_kept {
            self.metrics.baseline = self.updaters.first().map(|u| u.name.clone());
        }
    }
}

/// Synthetic episode generation block.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EpisodeConfig {
    pub seed: Option<u64>,
    pub count: usize,
    pub steps: usize,
    #[serde(default)]
    pub switch_at: Option<usize>,
    #[serde(default = "default_operator_tau")]
    pub operator_tau: f64,
    #[serde(default)]
    pub noise: f64,
}

impl EpisodeConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(invalid(
                "episodes.count",
                "number of episodes must be greater than zero",
            ));
        }

        if self.steps == 0 {
            return Err(invalid(
                "episodes.steps",
                "steps per episode must be greater than zero",
            ));
        }

        if let Some(switch_at) = self.switch_at
            && switch_at >= self.steps
        {
            return Err(invalid(
                "episodes.switch_at",
                format!("switch step {switch_at} must be below steps ({})", self.steps),
            ));
        }

        if !(self.operator_tau.is_finite() && self.operator_tau > 0.0) {
            return Err(invalid(
                "episodes.operator_tau",
                "operator temperature must be positive and finite",
            ));
        }

        if !(0.0..=1.0).contains(&self.noise) {
            return Err(invalid("episodes.noise", "noise must lie in [0, 1]"));
        }

        Ok(())
    }
}

fn default_operator_tau() -> f64 {
    DEFAULT_OPERATOR_TAU
}

/// One belief filter under evaluation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct UpdaterConfig {
    pub name: String,
    pub kind: InferenceKind,
    #[serde(default)]
    pub params: HyperparamOverrides,
}

impl UpdaterConfig {
    /// Environment-aware defaults for the kind with the configured overrides applied.
    pub fn hyperparams(&self) -> Hyperparams {
        Hyperparams::from_env(self.kind).merged(&self.params)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AssistConfig {
    #[serde(default)]
    pub arbitration: Arbitration,
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub jsonl: String,
    pub summary_md: String,
    pub plots_dir: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.jsonl", &self.jsonl),
            ("outputs.summary_md", &self.summary_md),
            ("outputs.plots_dir", &self.plots_dir),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(label, "path must not be empty"));
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(invalid(label, "resolved path is invalid"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(default)]
    pub baseline: Option<String>,
}

impl MetricsConfig {
    fn validate(&self, updaters: &[UpdaterConfig]) -> Result<(), ValidationError> {
        let Some(baseline) = self.baseline.as_ref() else {
            return Err(invalid(
                "metrics.baseline",
                "baseline updater must be specified",
            ));
        };

        if !updaters.iter().any(|u| &u.name == baseline) {
            return Err(invalid(
                "metrics.baseline",
                format!("baseline updater '{baseline}' is not defined in updaters list"),
            ));
        }

        Ok(())
    }
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        field: field.to_string(),
        message: message.into(),
    }
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(invalid("run_id", "run_id must not be empty"));
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(invalid(
            "run_id",
            "run_id may only contain alphanumeric characters, '.', '_' or '-'",
        ));
    }

    Ok(())
}

fn validate_hypotheses(hypotheses: &[QTablePolicy]) -> Result<(), ValidationError> {
    let Some(first) = hypotheses.first() else {
        return Err(invalid("hypotheses", "at least two hypotheses are required"));
    };
    if hypotheses.len() < 2 {
        return Err(invalid("hypotheses", "at least two hypotheses are required"));
    }

    let mut seen = HashSet::new();
    for hypothesis in hypotheses {
        if hypothesis.name().trim().is_empty() {
            return Err(invalid("hypotheses.name", "hypothesis name must not be empty"));
        }
        if !seen.insert(hypothesis.name()) {
            return Err(invalid(
                "hypotheses",
                format!("hypothesis name '{}' defined more than once", hypothesis.name()),
            ));
        }
        if hypothesis.action_count() != first.action_count()
            || hypothesis.state_count() != first.state_count()
        {
            return Err(invalid(
                format!("hypotheses[{}].q_table", hypothesis.name()).as_str(),
                format!(
                    "table is {}x{} but '{}' is {}x{}",
                    hypothesis.state_count(),
                    hypothesis.action_count(),
                    first.name(),
                    first.state_count(),
                    first.action_count()
                ),
            ));
        }
    }

    Ok(())
}

fn validate_updaters(updaters: &[UpdaterConfig]) -> Result<(), ValidationError> {
    if updaters.is_empty() {
        return Err(invalid("updaters", "at least one updater must be specified"));
    }

    let mut seen = HashSet::new();
    for updater in updaters {
        if updater.name.trim().is_empty() {
            return Err(invalid("updaters.name", "updater name must not be empty"));
        }

        if !updater.name.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
            return Err(invalid(
                format!("updaters[{}].name", updater.name).as_str(),
                "updater name contains invalid characters",
            ));
        }

        if !seen.insert(updater.name.as_str()) {
            return Err(invalid(
                "updaters",
                format!("updater name '{}' defined more than once", updater.name),
            ));
        }

        if let Err(err) = updater.hyperparams().validate() {
            return Err(invalid(
                format!("updaters[{}].params", updater.name).as_str(),
                err.to_string(),
            ));
        }
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub jsonl: PathBuf,
    pub summary_md: PathBuf,
    pub plots_dir: PathBuf,
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}
