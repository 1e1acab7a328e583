//! Self-play training session
//!
//! The session is the coordinator: it owns the live brain, the trainer, the
//! worker pool and an optional store, and runs
//!
//! ```text
//! collect batch -> update brain -> broadcast snapshot -> persist
//! ```
//!
//! Nothing is persisted unless the in-memory update committed cleanly.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::ppo::{AggregatedStats, PPOTrainer, TrainingConfig, UpdateStats};
use crate::{
    env::SimulationFactory,
    policy::{
        store::{load_brain, save_brain, KeyValueStore},
        ParamSet,
    },
    rollout::{AbortHandle, RolloutSettings, WorkerPool},
};

/// Progress record for one collect/update cycle
#[derive(Debug, Clone, Default)]
pub struct IterationReport {
    /// 1-based iteration number
    pub iteration: usize,

    /// Training samples collected
    pub samples: usize,

    /// Matches completed
    pub matches: usize,

    /// Total shaped reward per match
    pub average_reward: f64,

    /// Fraction of matches won by slot 0
    pub win_rate: f64,

    /// Update diagnostics; `None` when the update was skipped
    pub update: Option<UpdateStats>,

    /// Moving averages over every committed update so far
    pub trend: AggregatedStats,

    /// Worker failures seen during this iteration
    pub failures: Vec<String>,

    /// Collection was cut short by an abort
    pub aborted: bool,

    /// When the brain was persisted, if it was
    pub saved_at: Option<DateTime<Utc>>,
}

/// Coordinator for a whole self-play training run
pub struct TrainingSession {
    config: TrainingConfig,
    brain: ParamSet,
    trainer: PPOTrainer,
    pool: WorkerPool,
    store: Option<Box<dyn KeyValueStore>>,
    iteration: usize,
}

impl TrainingSession {
    /// Load (or initialize) the brain and start the worker pool
    ///
    /// With a store, the persisted brain is used when it validates; any
    /// mismatch falls back to a fresh brain seeded from `config.seed`.
    pub fn new<F: SimulationFactory>(
        config: TrainingConfig,
        factory: F,
        store: Option<Box<dyn KeyValueStore>>,
    ) -> Result<Self> {
        let config = config.clamped();
        let brain = match store.as_deref() {
            Some(store) => load_brain(store, config.seed).params,
            None => ParamSet::initialize(config.seed),
        };

        let pool = WorkerPool::new(
            Arc::new(factory),
            RolloutSettings::from(&config),
            Arc::new(brain.clone()),
        )
        .context("starting rollout workers")?;

        Ok(Self { trainer: PPOTrainer::new(config.clone()), config, brain, pool, store, iteration: 0 })
    }

    /// Effective (clamped) configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The live brain
    pub fn brain(&self) -> &ParamSet {
        &self.brain
    }

    /// The trainer, for optimizer state and smoothed statistics
    pub fn trainer(&self) -> &PPOTrainer {
        &self.trainer
    }

    /// Iterations run so far
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Handle that cooperatively stops the current collection
    pub fn abort_handle(&self) -> AbortHandle {
        self.pool.abort_handle()
    }

    /// Run one collect/update/broadcast/persist cycle
    ///
    /// An aborted or empty batch skips the update. A failed update (for
    /// example non-finite parameters) is returned as an error and leaves the
    /// brain, the workers and the store untouched.
    pub fn run_iteration(&mut self) -> Result<IterationReport> {
        let batch = self.pool.collect_batch(self.config.steps_per_batch)?;
        self.iteration += 1;
        for failure in &batch.failures {
            tracing::warn!("Iteration {}: {}", self.iteration, failure);
        }

        let stats = &batch.dataset.stats;
        let mut report = IterationReport {
            iteration: self.iteration,
            samples: batch.dataset.len(),
            matches: stats.matches,
            average_reward: stats.average_reward(),
            win_rate: stats.win_rate(),
            update: None,
            trend: self.trainer.stats().clone(),
            failures: batch.failures,
            aborted: batch.aborted,
            saved_at: None,
        };

        if report.aborted {
            tracing::info!("Iteration {}: collection aborted, skipping update", self.iteration);
            return Ok(report);
        }

        let mut dataset = batch.dataset;
        report.update = self
            .trainer
            .update_policy(&mut self.brain, &mut dataset)
            .with_context(|| format!("updating policy in iteration {}", self.iteration))?;

        if report.update.is_some() {
            report.trend = self.trainer.stats().clone();
            let failures = self.pool.update_brain(Arc::new(self.brain.clone()))?;
            for failure in &failures {
                tracing::warn!("Iteration {}: {}", self.iteration, failure);
            }
            report.failures.extend(failures);

            if let Some(store) = self.store.as_deref_mut() {
                match save_brain(store, &self.brain) {
                    Ok(saved_at) => report.saved_at = Some(saved_at),
                    Err(e) => tracing::warn!("Failed to persist brain: {:#}", e),
                }
            }
        } else {
            tracing::info!("Iteration {}: empty batch, skipping update", self.iteration);
        }

        tracing::info!(
            "Iteration {}: samples={} matches={} avg_reward={:.3} win_rate={:.3} (trend {:.3} / {:.3})",
            report.iteration,
            report.samples,
            report.matches,
            report.average_reward,
            report.win_rate,
            report.trend.running_reward,
            report.trend.running_win_rate
        );
        Ok(report)
    }

    /// Run up to `iterations` cycles, stopping early after an aborted one
    ///
    /// `on_progress` sees every report. Returns the number of iterations
    /// that ran.
    pub fn run<C>(&mut self, iterations: usize, mut on_progress: C) -> Result<usize>
    where
        C: FnMut(&IterationReport),
    {
        for done in 0..iterations {
            let report = self.run_iteration()?;
            on_progress(&report);
            if report.aborted {
                return Ok(done + 1);
            }
        }
        Ok(iterations)
    }

    /// Stop and join the worker threads
    pub fn shutdown(mut self) {
        self.pool.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::sprint::SprintArena,
        policy::store::{storage_key, MemoryStore},
    };

    fn small_config() -> TrainingConfig {
        TrainingConfig::default()
            .steps_per_batch(120)
            .max_match_ticks(30)
            .num_workers(2)
            .minibatch_size(32)
            .n_epochs(2)
            .seed(11)
    }

    #[test]
    fn test_iteration_updates_broadcasts_and_persists() -> Result<()> {
        let mut session =
            TrainingSession::new(small_config(), SprintArena::new, Some(Box::new(MemoryStore::new())))?;
        let initial = session.brain().clone();

        let report = session.run_iteration()?;
        assert_eq!(report.iteration, 1);
        assert!(report.samples >= 120);
        assert!(report.matches >= 2);
        assert!(report.failures.is_empty());
        assert!(!report.aborted);
        assert!(report.update.is_some());
        assert!(report.saved_at.is_some());
        assert_ne!(session.brain(), &initial);
        assert_eq!(**session.pool.brain(), *session.brain());
        assert_eq!(report.trend.total_updates, 1);
        assert_eq!(report.trend.running_win_rate, report.win_rate);

        let store = session.store.as_deref().expect("store was provided");
        assert!(store.get(&storage_key())?.is_some());
        Ok(())
    }

    #[test]
    fn test_run_stops_after_abort() -> Result<()> {
        let mut session = TrainingSession::new(small_config(), SprintArena::new, None)?;
        session.abort_handle().request_abort();

        let mut reports = Vec::new();
        let ran = session.run(5, |report| reports.push(report.clone()))?;
        assert_eq!(ran, 1);
        assert!(reports[0].aborted);
        assert!(reports[0].update.is_none());
        assert_eq!(session.brain(), &ParamSet::initialize(11));
        session.shutdown();
        Ok(())
    }

    #[test]
    fn test_failed_collection_does_not_consume_an_iteration() -> Result<()> {
        let mut session = TrainingSession::new(small_config(), SprintArena::new, None)?;
        session.pool.shutdown();

        assert!(session.run_iteration().is_err());
        assert_eq!(session.iteration(), 0);
        Ok(())
    }
}
