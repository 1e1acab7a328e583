//! Training
//!
//! - [`adam`]: the optimizer
//! - [`ppo`]: configuration, loss/backprop and the update loop
//! - [`session`]: the self-play coordinator tying the pool, trainer and store together

pub mod adam;
pub mod ppo;
pub mod session;

pub use adam::Adam;
pub use ppo::{AggregatedStats, PPOTrainer, TrainingConfig, UpdateStats};
pub use session::{IterationReport, TrainingSession};
