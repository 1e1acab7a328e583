//! Parallel self-play rollout collection
//!
//! A [`WorkerPool`] owns N long-lived worker threads. Each worker holds an
//! immutable brain snapshot, its own experience buffer and its own
//! simulations, and talks to the coordinator only through the messages in
//! [`messages`]:
//!
//! ```text
//! coordinator --UpdateBrain/Collect/Shutdown--> worker
//! coordinator <--BrainUpdated/Batch/Failed----- worker
//! coordinator --abort----------------------->  worker (separate channel)
//! ```

pub mod match_loop;
pub mod messages;
pub mod pool;
mod worker;

pub use match_loop::{run_match, MatchResult};
pub use messages::{WorkerCommand, WorkerEvent};
pub use pool::{split_steps, AbortHandle, BatchResult, RolloutSettings, WorkerPool};
