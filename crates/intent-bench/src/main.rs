use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;

use intent_assist::{TerminalMenu, choose_inference};
use intent_bench::config::{BenchmarkConfig, ResolvedOutputs};
use intent_bench::logging::init_logging;
use intent_bench::runner::EpisodeRunner;
use intent_core::AppInfo;

/// Evaluation harness for online intent inference.
#[derive(Debug, Parser)]
#[command(
    name = "intent-bench",
    author,
    version,
    about = "Deterministic intent-inference benchmark over synthetic operators"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/episode.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the number of episodes to simulate.
    #[arg(long, value_name = "COUNT")]
    episodes: Option<usize>,

    /// Override the number of steps per episode.
    #[arg(long, value_name = "STEPS")]
    steps: Option<usize>,

    /// Override the RNG seed for episode generation.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Exit after validating the configuration (no episodes are run).
    #[arg(long)]
    validate_only: bool,

    /// Pick the inference method interactively and keep only matching updaters.
    #[arg(long)]
    choose_method: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = BenchmarkConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(episodes) = cli.episodes {
        config.episodes.count = episodes;
    }

    if let Some(steps) = cli.steps {
        config.episodes.steps = steps;
    }

    if let Some(seed) = cli.seed {
        config.episodes.seed = Some(seed);
    }

    if cli.choose_method {
        let mut menu = TerminalMenu::stdio();
        let kind = choose_inference(&mut menu)?;
        config.retain_kind(kind);
        if config.updaters.is_empty() {
            bail!("no updaters of kind '{kind}' are configured");
        }
        println!("Selected inference method: {kind}");
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let updater_count = config.updaters.len();
    let run_id = config.run_id.clone();
    let episodes = config.episodes.count;
    let steps = config.episodes.steps;

    println!(
        "{} {}: loaded configuration '{run_id}' with {updater_count} updater{} ({episodes} episodes, {steps} steps, {} arbitration)",
        AppInfo::name(),
        AppInfo::version(),
        if updater_count == 1 { "" } else { "s" },
        config.assist.arbitration
    );

    let _logging_guard = init_logging(&config.logging, &outputs, &run_id)?;
    let runner = EpisodeRunner::new(config, outputs)?;

    if cli.validate_only {
        println!("Validation-only mode: episode execution skipped.");
        return Ok(());
    }

    let summary = runner.run()?;
    println!(
        "Run complete for '{run_id}': {} episodes × {} steps × {} updaters → {} rows at {}",
        summary.episodes,
        summary.steps_per_episode,
        summary.updaters,
        summary.rows_written,
        summary.jsonl_path.display()
    );
    println!("Summary table: {}", summary.summary_path.display());
    if let Some(plot_path) = summary.plot_path.as_ref() {
        println!("Goal belief plot: {}", plot_path.display());
    }
    if let Some(telemetry_path) = summary.telemetry_path.as_ref() {
        println!("Telemetry log: {}", telemetry_path.display());
    }

    Ok(())
}
