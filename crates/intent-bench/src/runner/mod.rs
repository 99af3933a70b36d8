mod operator;

pub use operator::{Episode, Observation, SyntheticOperator};

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use intent_assist::{ActionSelector, ActionSource, Arbiter, AssistError, AssistSession};
use intent_core::{BeliefMetrics, InferenceError, InferenceKind, InferenceModel, QTablePolicy};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

use crate::analytics::{AnalyticsCollector, AnalyticsError, EpisodeTrace, StepScore};
use crate::config::{BenchmarkConfig, ResolvedOutputs};

type Session = AssistSession<InferenceModel<QTablePolicy>, QTablePolicy>;

/// Replays the synthetic episodes through every configured updater.
pub struct EpisodeRunner {
    config: BenchmarkConfig,
    outputs: ResolvedOutputs,
    updaters: Vec<UpdaterBlueprint>,
    logging_enabled: bool,
}

/// Summary details returned after a run.
pub struct RunSummary {
    pub episodes: usize,
    pub steps_per_episode: usize,
    pub updaters: usize,
    pub rows_written: usize,
    pub jsonl_path: PathBuf,
    pub summary_path: PathBuf,
    pub plot_path: Option<PathBuf>,
    pub telemetry_path: Option<PathBuf>,
}

struct UpdaterBlueprint {
    name: String,
    kind: InferenceKind,
    seed_offset: u64,
    session: Session,
}

impl EpisodeRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: BenchmarkConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        let action_space = config.action_space();
        let arbiter = Arbiter::new(config.assist.arbitration);
        let updaters = config
            .updaters
            .iter()
            .enumerate()
            .map(|(idx, updater)| {
                let model = InferenceModel::new(
                    updater.kind,
                    config.hypotheses.clone(),
                    action_space,
                    updater.hyperparams(),
                )
                .map_err(|source| RunnerError::Updater {
                    name: updater.name.clone(),
                    source,
                })?;
                let selector = ActionSelector::new(config.hypotheses.clone(), action_space)?;
                Ok(UpdaterBlueprint {
                    name: updater.name.clone(),
                    kind: updater.kind,
                    seed_offset: idx as u64 + 1,
                    session: AssistSession::new(model, selector, arbiter)?,
                })
            })
            .collect::<Result<Vec<_>, RunnerError>>()?;

        Ok(Self {
            logging_enabled: config.logging.enable_structured,
            config,
            outputs,
            updaters,
        })
    }

    /// Execute every episode for every updater, streaming JSONL rows to disk.
    pub fn run(mut self) -> Result<RunSummary, RunnerError> {
        ensure_parent(self.outputs.jsonl.parent())?;
        ensure_parent(self.outputs.summary_md.parent())?;
        if !self.outputs.plots_dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.outputs.plots_dir)?;
        }

        let episodes =
            SyntheticOperator::new(&self.config.hypotheses, &self.config.episodes).generate();
        let base_seed = self.config.episodes.seed.unwrap_or(0);
        let mut writer = BufWriter::new(File::create(&self.outputs.jsonl)?);
        let mut analytics = AnalyticsCollector::new(&self.config)?;
        let mut rows_written = 0usize;

        for updater in &mut self.updaters {
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(updater.seed_offset));
            for episode in &episodes {
                let trace = run_episode(
                    updater,
                    episode,
                    &self.config,
                    self.logging_enabled,
                    &mut rng,
                    &mut writer,
                )?;
                rows_written += trace.steps.len();
                analytics.record_episode(&updater.name, &trace)?;
            }
        }

        writer.flush()?;

        let summary = analytics.finalize()?;
        summary.write_markdown(&self.outputs.summary_md)?;
        let plot_path = match summary.render_plot(&self.outputs.plots_dir) {
            Ok(path) => Some(path),
            Err(err) => {
                eprintln!("WARN: {}", err);
                None
            }
        };

        let telemetry_path = self.logging_enabled.then(|| {
            self.outputs
                .summary_md
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("telemetry.jsonl")
        });

        Ok(RunSummary {
            episodes: episodes.len(),
            steps_per_episode: self.config.episodes.steps,
            updaters: self.updaters.len(),
            rows_written,
            jsonl_path: self.outputs.jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
            plot_path,
            telemetry_path,
        })
    }
}

fn run_episode(
    updater: &mut UpdaterBlueprint,
    episode: &Episode,
    config: &BenchmarkConfig,
    logging_enabled: bool,
    rng: &mut StdRng,
    writer: &mut BufWriter<File>,
) -> Result<EpisodeTrace, RunnerError> {
    updater.session.reset();
    let mut trace = EpisodeTrace {
        steps: Vec::with_capacity(episode.observations.len()),
        switch_at: config.episodes.switch_at,
        elapsed: Duration::ZERO,
    };

    for (step, obs) in episode.observations.iter().enumerate() {
        let start = Instant::now();
        let outcome = updater.session.step(&obs.state, obs.action, rng)?;
        let elapsed = start.elapsed();
        trace.elapsed += elapsed;

        let metrics = BeliefMetrics::from_probabilities(&outcome.belief);
        let goal_belief = outcome.belief.get(obs.goal).copied().unwrap_or(0.0);
        trace.steps.push(StepScore {
            goal: obs.goal,
            map_index: metrics.map_index,
            goal_belief,
        });

        if logging_enabled && tracing::enabled!(Level::INFO) {
            event!(
                target: "intent_bench::step",
                Level::INFO,
                run_id = %config.run_id,
                episode = episode.index as u32,
                step = step as u32,
                updater = %updater.name,
                action = obs.action as u32,
                goal = obs.goal as u32,
                map_index = metrics.map_index as u32,
                entropy = metrics.entropy,
                confidence = outcome.confidence,
                elapsed_us = elapsed.as_secs_f64() * 1e6
            );
        }

        let row = StepLogRow {
            run_id: &config.run_id,
            episode: episode.index,
            step,
            updater: &updater.name,
            kind: updater.kind.key(),
            state: obs.state,
            action: obs.action,
            goal: obs.goal,
            belief: &outcome.belief,
            map_index: metrics.map_index,
            entropy: metrics.entropy,
            assisted_action: outcome.outcome.action,
            source: outcome.outcome.source,
        };
        serde_json::to_writer(&mut *writer, &row)?;
        writer.write_all(b"\n")?;
    }

    Ok(trace)
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct StepLogRow<'a> {
    run_id: &'a str,
    episode: usize,
    step: usize,
    updater: &'a str,
    kind: &'static str,
    state: usize,
    action: usize,
    goal: usize,
    belief: &'a [f64],
    map_index: usize,
    entropy: f64,
    assisted_action: usize,
    source: ActionSource,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("updater '{name}' could not be built: {source}")]
    Updater {
        name: String,
        #[source]
        source: InferenceError,
    },
    #[error("assistance failed: {0}")]
    Assist(#[from] AssistError),
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("failed to serialize log row: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AssistConfig, EpisodeConfig, LoggingConfig, MetricsConfig, OutputsConfig, UpdaterConfig,
    };
    use intent_core::HyperparamOverrides;

    fn config(dir: &Path) -> BenchmarkConfig {
        let mut cfg = BenchmarkConfig {
            run_id: "unit".into(),
            episodes: EpisodeConfig {
                seed: Some(5),
                count: 3,
                steps: 6,
                switch_at: Some(3),
                operator_tau: 0.5,
                noise: 0.0,
            },
            hypotheses: vec![
                QTablePolicy::new("a", vec![vec![2.0, 0.0]; 2]).expect("valid"),
                QTablePolicy::new("b", vec![vec![0.0, 2.0]; 2]).expect("valid"),
            ],
            updaters: InferenceKind::ALL
                .iter()
                .map(|kind| UpdaterConfig {
                    name: kind.key().to_string(),
                    kind: *kind,
                    params: HyperparamOverrides::default(),
                })
                .collect(),
            assist: AssistConfig::default(),
            outputs: OutputsConfig {
                jsonl: dir.join("steps.jsonl").display().to_string(),
                summary_md: dir.join("summary.md").display().to_string(),
                plots_dir: dir.join("plots").display().to_string(),
            },
            metrics: MetricsConfig {
                baseline: Some("bayesian".into()),
            },
            logging: LoggingConfig::default(),
        };
        cfg.validate().expect("valid config");
        cfg
    }

    #[test]
    fn writes_one_row_per_step_and_updater() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = config(dir.path());
        let outputs = cfg.resolved_outputs();
        let summary = EpisodeRunner::new(cfg, outputs)
            .expect("runner")
            .run()
            .expect("run completes");

        assert_eq!(summary.rows_written, 3 * 6 * 3);
        assert_eq!(summary.updaters, 3);
        assert!(summary.telemetry_path.is_none());

        let jsonl = fs::read_to_string(&summary.jsonl_path).expect("jsonl");
        assert_eq!(jsonl.lines().count(), summary.rows_written);
        let first: serde_json::Value =
            serde_json::from_str(jsonl.lines().next().expect("row")).expect("json");
        for field in [
            "run_id",
            "episode",
            "step",
            "updater",
            "kind",
            "state",
            "action",
            "goal",
            "belief",
            "map_index",
            "entropy",
            "assisted_action",
            "source",
        ] {
            assert!(first.get(field).is_some(), "missing {field}");
        }
        assert_eq!(first["kind"], "bayesian");
        assert!(summary.summary_path.exists());
    }
}
