//! Message types for coordinator/worker communication
//!
//! Defines the message formats for communication between:
//! - WorkerPool → worker: brain snapshots, work assignments, shutdown
//! - worker → WorkerPool: acknowledgements, collected datasets, failures

use std::sync::Arc;

use crate::{buffer::Dataset, policy::ParamSet};

/// Command sent from the pool to one worker
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    /// Replace the worker's brain snapshot
    UpdateBrain(Arc<ParamSet>),

    /// Run matches until `target_steps` transitions are recorded
    Collect { target_steps: usize },

    /// Leave the worker loop
    Shutdown,
}

/// Event sent from a worker back to the pool
#[derive(Debug)]
pub enum WorkerEvent {
    /// The brain snapshot was swapped
    BrainUpdated { worker_id: usize },

    /// A collection finished, possibly early because of an abort
    Batch { worker_id: usize, dataset: Dataset, aborted: bool },

    /// A collection failed; the worker is still alive
    Failed { worker_id: usize, message: String },
}

impl WorkerEvent {
    /// Worker that produced this event
    pub fn worker_id(&self) -> usize {
        match self {
            WorkerEvent::BrainUpdated { worker_id }
            | WorkerEvent::Batch { worker_id, .. }
            | WorkerEvent::Failed { worker_id, .. } => *worker_id,
        }
    }
}
