//! Rollout worker thread
//!
//! Each worker owns its brain snapshot, RNG and simulations. It blocks on its
//! command channel and answers every command with exactly one event, except
//! `Shutdown`, which just ends the loop.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::JoinHandle,
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{
    match_loop::{run_match, MatchResult},
    messages::{WorkerCommand, WorkerEvent},
    pool::RolloutSettings,
};
use crate::{
    buffer::{Dataset, ExperienceBuffer},
    env::{MatchSetup, SimulationFactory},
    policy::ParamSet,
};

/// Latched view of the worker's abort channel
///
/// Once a signal is seen it stays raised until the next collection starts.
struct AbortSignal {
    receiver: Receiver<()>,
    raised: bool,
}

impl AbortSignal {
    fn new(receiver: Receiver<()>) -> Self {
        Self { receiver, raised: false }
    }

    fn poll(&mut self) -> bool {
        if !self.raised && self.receiver.try_recv().is_ok() {
            self.raised = true;
        }
        self.raised
    }

    fn reset(&mut self) {
        self.raised = false;
    }
}

/// Channels and shared state handed to a worker at spawn time
pub(crate) struct WorkerChannels {
    pub commands: Receiver<WorkerCommand>,
    pub events: Sender<WorkerEvent>,
    pub abort: Receiver<()>,
}

/// Spawn worker `id` on a named thread
pub(crate) fn spawn<F: SimulationFactory>(
    id: usize,
    factory: Arc<F>,
    settings: RolloutSettings,
    brain: Arc<ParamSet>,
    channels: WorkerChannels,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("rollout-{}", id))
        .spawn(move || run(id, factory, settings, brain, channels))
        .with_context(|| format!("spawning rollout worker {}", id))
}

fn run<F: SimulationFactory>(
    id: usize,
    factory: Arc<F>,
    settings: RolloutSettings,
    mut brain: Arc<ParamSet>,
    channels: WorkerChannels,
) {
    let WorkerChannels { commands, events, abort } = channels;
    let mut abort = AbortSignal::new(abort);
    let mut rng = StdRng::seed_from_u64(worker_seed(settings.seed, id));
    tracing::debug!("Rollout worker {} started", id);

    for command in commands.iter() {
        let event = match command {
            WorkerCommand::UpdateBrain(snapshot) => {
                brain = snapshot;
                WorkerEvent::BrainUpdated { worker_id: id }
            }
            WorkerCommand::Collect { target_steps } => {
                abort.reset();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    collect(&*factory, &settings, &brain, target_steps, &mut rng, &mut abort)
                }));
                match outcome {
                    Ok((dataset, aborted)) => {
                        WorkerEvent::Batch { worker_id: id, dataset, aborted }
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::warn!("Rollout worker {} failed: {}", id, message);
                        WorkerEvent::Failed { worker_id: id, message }
                    }
                }
            }
            WorkerCommand::Shutdown => break,
        };

        if events.send(event).is_err() {
            // Pool is gone; nobody is listening.
            break;
        }
    }

    tracing::debug!("Rollout worker {} stopped", id);
}

/// Run matches until `target_steps` transitions exist or an abort arrives.
fn collect<F: SimulationFactory + ?Sized>(
    factory: &F,
    settings: &RolloutSettings,
    brain: &Arc<ParamSet>,
    target_steps: usize,
    rng: &mut StdRng,
    abort: &mut AbortSignal,
) -> (Dataset, bool) {
    let mut buffer = ExperienceBuffer::new(settings.rewards.clone(), Arc::clone(brain), rng.gen());
    let mut aborted = false;

    while buffer.step_count() < target_steps {
        if abort.poll() {
            aborted = true;
            break;
        }

        let seed: u64 = rng.gen();
        let setup = MatchSetup { seed, swap_spawns: settings.randomize_sides && seed & 1 == 1 };
        let result = run_match(factory, &mut buffer, &setup, settings.max_match_ticks, &mut || {
            abort.poll()
        });
        if result == MatchResult::Aborted {
            aborted = true;
            break;
        }
    }

    (buffer.build_dataset(settings.gamma, settings.gae_lambda), aborted)
}

fn worker_seed(base: u64, id: usize) -> u64 {
    base.wrapping_add((id as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
