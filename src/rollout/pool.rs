//! Worker pool: spawn once, collect many batches
//!
//! The pool is the only thing that talks to worker threads. It never shares
//! mutable state with them: brains go out as `Arc` snapshots, datasets come
//! back by value.

use std::{sync::Arc, thread::JoinHandle, time::Duration};

use anyhow::{bail, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use super::{
    messages::{WorkerCommand, WorkerEvent},
    worker::{self, WorkerChannels},
};
use crate::{
    buffer::{Dataset, RewardConfig},
    env::SimulationFactory,
    policy::ParamSet,
    train::ppo::TrainingConfig,
};

/// How long to block on the event channel before checking for dead threads
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The slice of the training configuration workers need
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutSettings {
    /// Worker threads to spawn
    pub num_workers: usize,

    /// Tick limit per match
    pub max_match_ticks: usize,

    /// Discount factor for GAE
    pub gamma: f64,

    /// GAE lambda
    pub gae_lambda: f64,

    /// Base seed; each worker derives its own stream from it
    pub seed: u64,

    /// Swap spawn points on odd match seeds
    pub randomize_sides: bool,

    /// Reward shaping table
    pub rewards: RewardConfig,
}

impl From<&TrainingConfig> for RolloutSettings {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            num_workers: config.num_workers,
            max_match_ticks: config.max_match_ticks,
            gamma: config.gamma,
            gae_lambda: config.gae_lambda,
            seed: config.seed,
            randomize_sides: config.randomize_sides,
            rewards: config.rewards.clone(),
        }
    }
}

/// Merged result of one collection round
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Samples and match statistics from every worker that answered
    pub dataset: Dataset,

    /// One message per worker that failed during this round
    pub failures: Vec<String>,

    /// Whether an abort was requested while this batch was being collected
    pub aborted: bool,
}

/// Cloneable handle that asks every worker to stop collecting
///
/// Safe to use from any thread, including while the pool is blocked in
/// [`WorkerPool::collect_batch`].
#[derive(Debug, Clone)]
pub struct AbortHandle {
    senders: Vec<Sender<()>>,
}

impl AbortHandle {
    /// Signal every worker; repeated calls before the next batch coalesce
    pub fn request_abort(&self) {
        for sender in &self.senders {
            // A full channel already carries a pending abort.
            let _ = sender.try_send(());
        }
    }
}

struct WorkerHandle {
    id: usize,
    commands: Sender<WorkerCommand>,
    abort: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    fn is_alive(&self) -> bool {
        self.thread.as_ref().map_or(false, |thread| !thread.is_finished())
    }

    /// Join a thread that has exited and describe why it is gone
    fn reap(&mut self) -> String {
        match self.thread.take().map(JoinHandle::join) {
            Some(Err(_)) => format!("rollout worker {} panicked outside a collection", self.id),
            _ => format!("rollout worker {} is not running", self.id),
        }
    }
}

/// Fixed set of rollout worker threads
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    events: Receiver<WorkerEvent>,
    abort: AbortHandle,
    brain: Arc<ParamSet>,
}

impl WorkerPool {
    /// Spawn `settings.num_workers` workers, all starting from `brain`
    pub fn new<F: SimulationFactory>(
        factory: Arc<F>,
        settings: RolloutSettings,
        brain: Arc<ParamSet>,
    ) -> Result<Self> {
        if settings.num_workers == 0 {
            bail!("worker pool needs at least one worker");
        }

        let (event_tx, events) = unbounded();
        let mut workers = Vec::with_capacity(settings.num_workers);
        let mut abort_senders = Vec::with_capacity(settings.num_workers);

        for id in 0..settings.num_workers {
            let (command_tx, command_rx) = unbounded();
            let (abort_tx, abort_rx) = bounded(1);
            let channels = WorkerChannels {
                commands: command_rx,
                events: event_tx.clone(),
                abort: abort_rx.clone(),
            };
            let thread =
                worker::spawn(id, Arc::clone(&factory), settings.clone(), Arc::clone(&brain), channels)?;

            workers.push(WorkerHandle { id, commands: command_tx, abort: abort_rx, thread: Some(thread) });
            abort_senders.push(abort_tx);
        }

        tracing::info!("Started {} rollout workers", workers.len());
        Ok(Self { workers, events, abort: AbortHandle { senders: abort_senders }, brain })
    }

    /// Number of workers still running
    pub fn live_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_alive()).count()
    }

    /// Handle for cooperative abort from another thread
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Ask every worker to stop its current collection
    pub fn request_abort(&self) {
        self.abort.request_abort();
    }

    /// The snapshot workers currently hold
    pub fn brain(&self) -> &Arc<ParamSet> {
        &self.brain
    }

    /// Push a new brain snapshot to every worker and wait until each has it
    ///
    /// Returns the workers that could not take the update; they are reaped
    /// and skipped from then on.
    pub fn update_brain(&mut self, brain: Arc<ParamSet>) -> Result<Vec<String>> {
        self.brain = Arc::clone(&brain);
        let mut failures = Vec::new();
        let mut pending = Vec::new();

        for worker in self.workers.iter_mut().filter(|w| w.thread.is_some()) {
            if worker.commands.send(WorkerCommand::UpdateBrain(Arc::clone(&brain))).is_ok() {
                pending.push(worker.id);
            } else {
                failures.push(worker.reap());
            }
        }

        self.wait_for(&mut pending, &mut failures, |event| match event {
            WorkerEvent::BrainUpdated { .. } => {}
            other => tracing::warn!("Unexpected event during brain update: {:?}", other),
        });

        if self.live_workers() == 0 {
            bail!("no rollout workers are running");
        }
        Ok(failures)
    }

    /// Collect roughly `total_steps` transitions across all live workers
    ///
    /// Steps are split evenly with the remainder going to the first workers.
    /// A worker that fails is reported in [`BatchResult::failures`] and the
    /// batch carries on with everyone else's data.
    pub fn collect_batch(&mut self, total_steps: usize) -> Result<BatchResult> {
        let live: Vec<usize> =
            (0..self.workers.len()).filter(|&i| self.workers[i].thread.is_some()).collect();
        if live.is_empty() {
            bail!("no rollout workers are running");
        }

        let mut result = BatchResult::default();
        let mut pending = Vec::with_capacity(live.len());

        for (&index, target_steps) in live.iter().zip(split_steps(total_steps, live.len())) {
            let worker = &mut self.workers[index];
            if worker.commands.send(WorkerCommand::Collect { target_steps }).is_ok() {
                pending.push(worker.id);
            } else {
                result.failures.push(worker.reap());
            }
        }

        let mut merged = Dataset::default();
        let mut aborted = false;
        let mut reported = Vec::new();
        let mut failures = std::mem::take(&mut result.failures);
        self.wait_for(&mut pending, &mut failures, |event| match event {
            WorkerEvent::Batch { dataset, aborted: worker_aborted, .. } => {
                merged.merge(dataset);
                aborted |= worker_aborted;
            }
            WorkerEvent::Failed { worker_id, message } => {
                reported.push(format!("rollout worker {} failed: {}", worker_id, message));
            }
            WorkerEvent::BrainUpdated { worker_id } => {
                tracing::warn!("Stray brain acknowledgement from worker {}", worker_id)
            }
        });
        failures.extend(reported);

        // A signal still queued here arrived after its worker last polled.
        // It belongs to this batch, and leaving it would cut the next one short.
        let mut late_aborts = 0;
        for worker in &self.workers {
            while worker.abort.try_recv().is_ok() {
                late_aborts += 1;
            }
        }
        if late_aborts > 0 {
            tracing::debug!("Abort requested after {} worker(s) finished collecting", late_aborts);
        }

        result.dataset = merged;
        result.failures = failures;
        result.aborted = aborted || late_aborts > 0;
        tracing::debug!(
            "Collected {} samples from {} matches{}",
            result.dataset.len(),
            result.dataset.stats.matches,
            if result.aborted { " (aborted)" } else { "" }
        );
        Ok(result)
    }

    /// Stop and join every worker thread
    pub fn shutdown(&mut self) {
        self.abort.request_abort();
        for worker in &self.workers {
            let _ = worker.commands.send(WorkerCommand::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    tracing::warn!("Rollout worker {} panicked during shutdown", worker.id);
                }
            }
        }
    }

    /// Block until every worker in `pending` has answered or died
    ///
    /// Each answer is handed to `on_event`. Workers that die without
    /// answering are reaped and added to `failures`.
    fn wait_for<H>(&mut self, pending: &mut Vec<usize>, failures: &mut Vec<String>, mut on_event: H)
    where
        H: FnMut(WorkerEvent),
    {
        while !pending.is_empty() {
            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => {
                    let id = event.worker_id();
                    if let Some(position) = pending.iter().position(|&p| p == id) {
                        pending.swap_remove(position);
                    }
                    on_event(event);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let workers = &mut self.workers;
                    pending.retain(|&id| {
                        let worker = &mut workers[id];
                        if worker.is_alive() {
                            true
                        } else {
                            failures.push(worker.reap());
                            false
                        }
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for &id in pending.iter() {
                        failures.push(self.workers[id].reap());
                    }
                    pending.clear();
                }
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Split `total` steps over `workers`, remainder to the first workers
pub fn split_steps(total: usize, workers: usize) -> Vec<usize> {
    if workers == 0 {
        return Vec::new();
    }
    let base = total / workers;
    let remainder = total % workers;
    (0..workers).map(|i| base + usize::from(i < remainder)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::sprint::SprintArena;

    fn settings(workers: usize) -> RolloutSettings {
        RolloutSettings {
            num_workers: workers,
            max_match_ticks: 40,
            ..RolloutSettings::from(&TrainingConfig::default())
        }
    }

    #[test]
    fn test_split_steps_sums_to_total() {
        assert_eq!(split_steps(10, 3), vec![4, 3, 3]);
        assert_eq!(split_steps(2, 4), vec![1, 1, 0, 0]);
        assert_eq!(split_steps(8192, 4).iter().sum::<usize>(), 8192);
        for workers in 1..9 {
            assert_eq!(split_steps(1001, workers).iter().sum::<usize>(), 1001);
        }
        assert!(split_steps(5, 0).is_empty());
    }

    #[test]
    fn test_zero_workers_is_an_error() {
        let result =
            WorkerPool::new(Arc::new(SprintArena::new), settings(0), Arc::new(ParamSet::zeros()));
        assert!(result.is_err());
    }

    #[test]
    fn test_collect_merges_all_workers() -> Result<()> {
        let mut pool =
            WorkerPool::new(Arc::new(SprintArena::new), settings(3), Arc::new(ParamSet::initialize(1)))?;
        assert_eq!(pool.live_workers(), 3);

        let batch = pool.collect_batch(300)?;
        assert!(batch.failures.is_empty());
        assert!(!batch.aborted);
        assert!(batch.dataset.len() >= 300);
        assert!(batch.dataset.stats.matches >= 3);

        let failures = pool.update_brain(Arc::new(ParamSet::initialize(2)))?;
        assert!(failures.is_empty());
        assert_eq!(**pool.brain(), ParamSet::initialize(2));

        pool.shutdown();
        assert_eq!(pool.live_workers(), 0);
        Ok(())
    }

    #[test]
    fn test_abort_before_collect_returns_empty_batch() -> Result<()> {
        let mut pool =
            WorkerPool::new(Arc::new(SprintArena::new), settings(2), Arc::new(ParamSet::initialize(1)))?;
        pool.abort_handle().request_abort();

        let batch = pool.collect_batch(10_000)?;
        assert!(batch.aborted);
        assert!(batch.dataset.is_empty());
        assert!(batch.failures.is_empty());

        // Stale signals were drained; the next batch runs to completion.
        let batch = pool.collect_batch(50)?;
        assert!(!batch.aborted);
        assert!(batch.dataset.len() >= 50);
        Ok(())
    }

    #[test]
    fn test_exited_worker_is_reported_and_skipped() -> Result<()> {
        let mut pool =
            WorkerPool::new(Arc::new(SprintArena::new), settings(3), Arc::new(ParamSet::initialize(1)))?;
        assert!(pool.workers[1].commands.send(WorkerCommand::Shutdown).is_ok());

        let batch = pool.collect_batch(120)?;
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.failures[0].contains("rollout worker 1"));
        assert!(!batch.dataset.is_empty());
        assert!(batch.dataset.stats.matches >= 2);
        assert_eq!(pool.live_workers(), 2);

        // Later rounds only talk to the survivors.
        let failures = pool.update_brain(Arc::new(ParamSet::initialize(2)))?;
        assert!(failures.is_empty());
        let batch = pool.collect_batch(60)?;
        assert!(batch.failures.is_empty());
        assert!(batch.dataset.len() >= 60);
        Ok(())
    }
}
