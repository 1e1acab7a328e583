//! Train the duel policy by self-play in the built-in sprint arena
//!
//! ```text
//! train_duel --iterations 50 --workers 8 --store-dir brains/
//! train_duel --config duel.json --export brain.bin --eval-matches 64
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use duel_ppo::{
    env::sprint::SprintArena,
    eval::evaluate_head_to_head,
    policy::{
        store::{BrainBlob, FileStore, KeyValueStore},
        ParamSet,
    },
    train::{TrainingConfig, TrainingSession},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "train_duel", about = "Self-play PPO training for the two-vehicle duel")]
struct Cli {
    /// JSON training config; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Collect/update cycles to run
    #[arg(long, default_value_t = 20)]
    iterations: usize,

    /// Directory for the persisted brain (omit to train without saving)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Override the number of rollout workers
    #[arg(long)]
    workers: Option<usize>,

    /// Override steps per batch
    #[arg(long)]
    steps: Option<usize>,

    /// Write the final brain as a bincode snapshot
    #[arg(long)]
    export: Option<PathBuf>,

    /// Head-to-head matches of the final brain against the starting one
    #[arg(long, default_value_t = 0)]
    eval_matches: usize,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &cli.config {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config = config.num_workers(workers);
    }
    if let Some(steps) = cli.steps {
        config = config.steps_per_batch(steps);
    }

    let store: Option<Box<dyn KeyValueStore>> = match &cli.store_dir {
        Some(dir) => Some(Box::new(FileStore::open(dir)?)),
        None => None,
    };

    let mut session = TrainingSession::new(config, SprintArena::new, store)?;
    let starting_brain = session.brain().clone();
    let abort = session.abort_handle();
    tracing::info!(
        "Training for {} iterations with {} workers, {} steps per batch",
        cli.iterations,
        session.config().num_workers,
        session.config().steps_per_batch
    );

    session.run(cli.iterations, |report| {
        if report.samples == 0 && !report.failures.is_empty() {
            tracing::warn!("Every rollout worker failed; stopping after the next collection");
            abort.request_abort();
        }
        if let Some(update) = &report.update {
            tracing::info!(
                "  policy_loss={:.4} value_loss={:.4} entropy={:.3} clip_frac={:.3} (running policy {:.4} / value {:.4})",
                update.policy_loss,
                update.value_loss,
                update.entropy,
                update.clip_fraction,
                report.trend.running_avg.policy_loss,
                report.trend.running_avg.value_loss
            );
        }
    })?;

    let final_brain: ParamSet = session.brain().clone();
    let max_ticks = session.config().max_match_ticks;
    let seed = session.config().seed;
    session.shutdown();

    if cli.eval_matches > 0 {
        let summary = evaluate_head_to_head(
            &SprintArena::new,
            &final_brain,
            &starting_brain,
            cli.eval_matches,
            seed,
            max_ticks,
        );
        println!(
            "final vs start: {} wins, {} losses, {} draws (score {:.3})",
            summary.wins_a,
            summary.wins_b,
            summary.draws,
            summary.score_a()
        );
    }

    if let Some(path) = &cli.export {
        BrainBlob::from_params(&final_brain).save_bincode(path)?;
        tracing::info!("Exported brain to {}", path.display());
    }

    Ok(())
}
