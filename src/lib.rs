//! # duel-ppo
//!
//! Self-play PPO for a two-vehicle duel, written against plain `f64` arrays
//!
//! The network is one fixed actor-critic topology (a tanh hidden layer, a
//! diagonal Gaussian for throttle/steer/aim, a Bernoulli shoot head and a
//! value head). Gradients are derived by hand and applied with Adam; there
//! is no learning framework underneath.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duel_ppo::prelude::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = TrainingConfig::default().num_workers(4).steps_per_batch(4096);
//! let mut session = TrainingSession::new(config, SprintArena::new, None)?;
//! session.run(10, |report| println!("{}: win rate {:.2}", report.iteration, report.win_rate))?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Simulation contract and the built-in sprint arena
pub mod env;

/// Actor-critic network, observations and brain persistence
pub mod policy;

/// Experience collection, reward shaping and GAE
pub mod buffer;

/// Adam, the PPO update and the training session
pub mod train;

/// Parallel rollout workers
pub mod rollout;

/// Head-to-head evaluation between brains
pub mod eval;

/// Prelude module for convenient imports
///
/// This module re-exports commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::{
        buffer::{Dataset, ExperienceBuffer, MatchStats, RewardConfig},
        env::{
            sprint::SprintArena, Controls, DuelSimulation, MatchSetup, Outcome, Perception,
            SimulationFactory, VehicleState,
        },
        eval::{evaluate_head_to_head, EvalSummary},
        policy::{
            store::{load_brain, save_brain, FileStore, KeyValueStore, MemoryStore},
            FeatureExtractor, ParamSet, Policy,
        },
        rollout::{AbortHandle, WorkerPool},
        train::{Adam, IterationReport, PPOTrainer, TrainingConfig, TrainingSession, UpdateStats},
    };
}

/// Current version of duel-ppo
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
