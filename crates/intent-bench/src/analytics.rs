use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use intent_core::InferenceKind;
use plotters::prelude::*;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::config::BenchmarkConfig;

const CONFIDENCE_Z: f64 = 1.96; // 95% CI

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("baseline updater '{0}' not present in run results")]
    MissingBaseline(String),
    #[error("updater '{0}' recorded in results but missing from configuration")]
    UnknownUpdater(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render plot: {0}")]
    Plot(String),
}

/// Per-step facts needed to score one updater on one episode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepScore {
    pub goal: usize,
    pub map_index: usize,
    pub goal_belief: f64,
}

/// Everything one updater produced over one episode.
#[derive(Debug, Clone, Default)]
pub struct EpisodeTrace {
    pub steps: Vec<StepScore>,
    pub switch_at: Option<usize>,
    pub elapsed: Duration,
}

pub struct AnalyticsCollector {
    baseline: String,
    updaters: HashMap<String, UpdaterAccumulator>,
    updater_order: Vec<String>,
}

impl AnalyticsCollector {
    pub fn new(config: &BenchmarkConfig) -> Result<Self, AnalyticsError> {
        let baseline = config
            .metrics
            .baseline
            .clone()
            .ok_or_else(|| AnalyticsError::MissingBaseline("<unset>".into()))?;

        let mut updaters = HashMap::new();
        let mut order = Vec::new();
        for updater in &config.updaters {
            updaters.insert(
                updater.name.clone(),
                UpdaterAccumulator::new(updater.name.clone(), updater.kind),
            );
            order.push(updater.name.clone());
        }

        if !updaters.contains_key(&baseline) {
            return Err(AnalyticsError::MissingBaseline(baseline));
        }

        Ok(Self {
            baseline,
            updaters,
            updater_order: order,
        })
    }

    pub fn record_episode(
        &mut self,
        updater: &str,
        trace: &EpisodeTrace,
    ) -> Result<(), AnalyticsError> {
        let acc = self
            .updaters
            .get_mut(updater)
            .ok_or_else(|| AnalyticsError::UnknownUpdater(updater.to_string()))?;
        acc.record_episode(trace);
        Ok(())
    }

    pub fn finalize(mut self) -> Result<AnalyticsSummary, AnalyticsError> {
        let baseline_accuracy = self
            .updaters
            .get(&self.baseline)
            .map(|acc| acc.episode_accuracy.clone())
            .ok_or_else(|| AnalyticsError::MissingBaseline(self.baseline.clone()))?;

        let mut reports = Vec::new();
        let mut comparisons = Vec::new();
        let mut curves = Vec::new();
        for name in &self.updater_order {
            let Some(acc) = self.updaters.remove(name) else {
                continue;
            };

            let comparison = if *name == self.baseline {
                ComparisonReport {
                    updater: name.clone(),
                    p_value: 1.0,
                    sample_size: acc.episode_accuracy.len(),
                }
            } else {
                let mut diffs = ComparisonAccumulator::new();
                for (ours, theirs) in acc.episode_accuracy.iter().zip(&baseline_accuracy) {
                    diffs.record(ours - theirs);
                }
                let (p_value, sample_size) = diffs.wilcoxon_signed_rank();
                ComparisonReport {
                    updater: name.clone(),
                    p_value,
                    sample_size,
                }
            };
            comparisons.push(comparison);
            curves.push(BeliefCurve {
                updater: name.clone(),
                mean_goal_belief: acc.mean_curve(),
            });
            reports.push(acc.into_report());
        }

        Ok(AnalyticsSummary {
            baseline: self.baseline,
            updaters: reports,
            comparisons,
            curves,
        }
        .enrich())
    }
}

struct UpdaterAccumulator {
    name: String,
    kind: InferenceKind,
    steps: usize,
    correct: usize,
    episode_accuracy: Vec<f64>,
    final_goal_belief: Vec<f64>,
    steps_to_identify: Vec<f64>,
    unidentified: usize,
    recovery_steps: Vec<f64>,
    curve_sum: Vec<f64>,
    curve_count: Vec<usize>,
    elapsed: Duration,
}

impl UpdaterAccumulator {
    fn new(name: String, kind: InferenceKind) -> Self {
        Self {
            name,
            kind,
            steps: 0,
            correct: 0,
            episode_accuracy: Vec::new(),
            final_goal_belief: Vec::new(),
            steps_to_identify: Vec::new(),
            unidentified: 0,
            recovery_steps: Vec::new(),
            curve_sum: Vec::new(),
            curve_count: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    fn record_episode(&mut self, trace: &EpisodeTrace) {
        if trace.steps.is_empty() {
            return;
        }

        let hits = trace
            .steps
            .iter()
            .filter(|step| step.map_index == step.goal)
            .count();
        self.steps += trace.steps.len();
        self.correct += hits;
        self.episode_accuracy
            .push(hits as f64 / trace.steps.len() as f64);
        self.elapsed += trace.elapsed;

        if let Some(last) = trace.steps.last() {
            self.final_goal_belief.push(last.goal_belief);
        }

        match first_identified(&trace.steps, 0) {
            Some(step) => self.steps_to_identify.push((step + 1) as f64),
            None => self.unidentified += 1,
        }

        if let Some(switch_at) = trace.switch_at
            && let Some(step) = first_identified(&trace.steps, switch_at)
        {
            self.recovery_steps.push((step - switch_at + 1) as f64);
        }

        if self.curve_sum.len() < trace.steps.len() {
            self.curve_sum.resize(trace.steps.len(), 0.0);
            self.curve_count.resize(trace.steps.len(), 0);
        }
        for (idx, step) in trace.steps.iter().enumerate() {
            self.curve_sum[idx] += step.goal_belief;
            self.curve_count[idx] += 1;
        }
    }

    fn mean_curve(&self) -> Vec<f64> {
        self.curve_sum
            .iter()
            .zip(&self.curve_count)
            .map(|(sum, count)| if *count == 0 { 0.0 } else { sum / *count as f64 })
            .collect()
    }

    fn into_report(self) -> UpdaterReport {
        let map_accuracy = if self.steps == 0 {
            0.0
        } else {
            self.correct as f64 / self.steps as f64
        };
        let avg_update_us = if self.steps == 0 {
            0.0
        } else {
            self.elapsed.as_secs_f64() * 1e6 / self.steps as f64
        };

        UpdaterReport {
            name: self.name,
            kind: self.kind,
            episodes: self.episode_accuracy.len(),
            steps: self.steps,
            map_accuracy,
            mean_final_goal_belief: mean(&self.final_goal_belief),
            ci95: confidence_interval(&self.final_goal_belief),
            mean_steps_to_identify: optional_mean(&self.steps_to_identify),
            unidentified_episodes: self.unidentified,
            mean_recovery_steps: optional_mean(&self.recovery_steps),
            average_us_per_update: avg_update_us,
            accuracy_delta_vs_baseline: 0.0,
        }
    }
}

fn first_identified(steps: &[StepScore], from: usize) -> Option<usize> {
    steps
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, step)| step.map_index == step.goal)
        .map(|(idx, _)| idx)
}

#[derive(Clone)]
struct ComparisonAccumulator {
    diffs: Vec<f64>,
}

impl ComparisonAccumulator {
    fn new() -> Self {
        Self { diffs: Vec::new() }
    }

    fn record(&mut self, diff: f64) {
        self.diffs.push(diff);
    }

    fn wilcoxon_signed_rank(self) -> (f64, usize) {
        let diffs: Vec<f64> = self
            .diffs
            .into_iter()
            .filter(|d| d.abs() > f64::EPSILON)
            .collect();
        let n = diffs.len();
        if n == 0 {
            return (1.0, 0);
        }

        let mut paired: Vec<(f64, f64)> =
            diffs.into_iter().map(|d| (d.abs(), d.signum())).collect();
        paired.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Average ranks across ties
        let mut ranks = Vec::with_capacity(n);
        let mut tie_sizes = Vec::new();
        let mut i = 0;
        while i < paired.len() {
            let mut j = i;
            while j + 1 < paired.len() && (paired[j + 1].0 - paired[i].0).abs() < 1e-12 {
                j += 1;
            }
            let rank = (i + j + 2) as f64 / 2.0;
            for entry in &paired[i..=j] {
                ranks.push((rank, entry.1));
            }
            if j > i {
                tie_sizes.push(j - i + 1);
            }
            i = j + 1;
        }

        let w_plus: f64 = ranks
            .iter()
            .filter(|(_, sign)| *sign > 0.0)
            .map(|(rank, _)| *rank)
            .sum();
        let w_minus: f64 = ranks
            .iter()
            .filter(|(_, sign)| *sign < 0.0)
            .map(|(rank, _)| *rank)
            .sum();

        let w = w_plus.min(w_minus);
        let n_f = n as f64;
        let mean_w = n_f * (n_f + 1.0) / 4.0;

        let tie_adjustment: f64 = tie_sizes
            .into_iter()
            .map(|count| {
                let c = count as f64;
                (c.powi(3) - c) / 48.0
            })
            .sum();
        let variance_w = n_f * (n_f + 1.0) * (2.0 * n_f + 1.0) / 24.0 - tie_adjustment;
        if variance_w <= 0.0 {
            return (1.0, n);
        }

        let z = ((w - mean_w).abs() - 0.5).max(0.0) / variance_w.sqrt();
        let Ok(normal) = Normal::new(0.0, 1.0) else {
            return (1.0, n);
        };
        let p = 2.0 * (1.0 - normal.cdf(z));
        (p.clamp(0.0, 1.0), n)
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub baseline: String,
    pub updaters: Vec<UpdaterReport>,
    pub comparisons: Vec<ComparisonReport>,
    pub curves: Vec<BeliefCurve>,
}

impl AnalyticsSummary {
    pub fn enrich(mut self) -> Self {
        let baseline_accuracy = self
            .updaters
            .iter()
            .find(|updater| updater.name == self.baseline)
            .map(|updater| updater.map_accuracy)
            .unwrap_or(0.0);

        for updater in &mut self.updaters {
            updater.accuracy_delta_vs_baseline = updater.map_accuracy - baseline_accuracy;
        }

        self
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        let mut rows = String::new();
        rows.push_str("# Intent Inference Summary\n\n");
        rows.push_str(&format!("Baseline: `{}`\n\n", self.baseline));
        rows.push_str("| Updater | Kind | Episodes | Steps | MAP accuracy | Δ vs baseline | Final goal belief | 95% CI | Steps to identify | Unidentified | Recovery steps | Avg µs/update | p-value |\n");
        rows.push_str("|---------|------|----------|-------|--------------|---------------|-------------------|--------|-------------------|--------------|----------------|---------------|---------|\n");

        for updater in &self.updaters {
            let p_value = self
                .comparisons
                .iter()
                .find(|c| c.updater == updater.name)
                .map(|c| c.p_value)
                .unwrap_or(1.0);

            rows.push_str(&format!(
                "| {name} | {kind} | {episodes} | {steps} | {acc:.1}% | {delta:+.1}% | {belief:.3} | [{ci_low:.3}, {ci_high:.3}] | {identify} | {unidentified} | {recovery} | {latency:.2} | {pval:.3} |\n",
                name = updater.name,
                kind = updater.kind,
                episodes = updater.episodes,
                steps = updater.steps,
                acc = updater.map_accuracy * 100.0,
                delta = updater.accuracy_delta_vs_baseline * 100.0,
                belief = updater.mean_final_goal_belief,
                ci_low = updater.ci95.0,
                ci_high = updater.ci95.1,
                identify = format_optional(updater.mean_steps_to_identify),
                unidentified = updater.unidentified_episodes,
                recovery = format_optional(updater.mean_recovery_steps),
                latency = updater.average_us_per_update,
                pval = p_value,
            ));
        }

        fs::write(path.as_ref(), rows).map_err(|e| AnalyticsError::Io {
            context: "writing summary markdown",
            source: e,
        })?;
        Ok(())
    }

    pub fn render_plot(&self, dir: impl AsRef<Path>) -> Result<PathBuf, AnalyticsError> {
        let dir = dir.as_ref();
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(|e| AnalyticsError::Io {
                context: "creating plots directory",
                source: e,
            })?;
        }

        let output_path = dir.join("goal_belief.png");
        let curves = self.curves.clone();
        let horizon = curves
            .iter()
            .map(|curve| curve.mean_goal_belief.len())
            .max()
            .unwrap_or(0)
            .max(1);

        let prev_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let plot_attempt = std::panic::catch_unwind(move || {
            let root = BitMapBackend::new(&output_path, (800, 480)).into_drawing_area();
            root.fill(&WHITE)
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            let mut chart = ChartBuilder::on(&root)
                .margin(20)
                .caption("Mean belief in the true goal per step", ("sans-serif", 22))
                .set_label_area_size(LabelAreaPosition::Left, 50)
                .set_label_area_size(LabelAreaPosition::Bottom, 40)
                .build_cartesian_2d(0f64..horizon as f64, 0f64..1f64)
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            chart
                .configure_mesh()
                .disable_mesh()
                .y_desc("P(goal)")
                .x_desc("Step")
                .draw()
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            for (idx, curve) in curves.iter().enumerate() {
                let color = Palette99::pick(idx).to_rgba();
                let points: Vec<(f64, f64)> = curve
                    .mean_goal_belief
                    .iter()
                    .enumerate()
                    .map(|(step, belief)| ((step + 1) as f64, *belief))
                    .collect();
                chart
                    .draw_series(std::iter::once(PathElement::new(
                        points,
                        color.stroke_width(2),
                    )))
                    .map_err(|e| AnalyticsError::Plot(e.to_string()))?
                    .label(curve.updater.clone())
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }

            chart
                .configure_series_labels()
                .background_style(WHITE.mix(0.8))
                .border_style(BLACK)
                .draw()
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            drop(chart);

            root.present()
                .map_err(|e| AnalyticsError::Plot(e.to_string()))?;

            drop(root);

            Ok(output_path)
        });

        std::panic::set_hook(prev_hook);

        match plot_attempt {
            Ok(result) => result,
            Err(_) => Err(AnalyticsError::Plot(
                "plotters panicked while rendering (missing font support?)".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdaterReport {
    pub name: String,
    pub kind: InferenceKind,
    pub episodes: usize,
    pub steps: usize,
    pub map_accuracy: f64,
    pub mean_final_goal_belief: f64,
    pub ci95: (f64, f64),
    pub mean_steps_to_identify: Option<f64>,
    pub unidentified_episodes: usize,
    pub mean_recovery_steps: Option<f64>,
    pub average_us_per_update: f64,
    #[serde(skip)]
    pub accuracy_delta_vs_baseline: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub updater: String,
    pub p_value: f64,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BeliefCurve {
    pub updater: String,
    pub mean_goal_belief: Vec<f64>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn optional_mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| mean(values))
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn confidence_interval(points: &[f64]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let mean = mean(points);
    if points.len() == 1 {
        return (mean, mean);
    }
    let variance = points
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (points.len() as f64 - 1.0);
    let std_error = (variance / points.len() as f64).sqrt();
    let margin = CONFIDENCE_Z * std_error;
    (mean - margin, mean + margin)
}
