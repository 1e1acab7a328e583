//! Proximal Policy Optimization (PPO) for the duel policy
//!
//! This module implements the PPO update on the fixed actor-critic network.
//! PPO is a policy gradient method that uses a clipped surrogate objective
//! to keep each update close to the policy that collected the data.
//!
//! # Algorithm Overview
//!
//! ```text
//! For each iteration:
//!   1. Collect self-play trajectories with the current brain
//!   2. Compute advantages using GAE
//!   3. For n_epochs:
//!      a. Shuffle the batch into minibatches
//!      b. Accumulate clipped-objective, value and entropy gradients
//!      c. Apply one Adam step
//! ```
//!
//! Gradients are derived by hand (see [`loss`]); there is no autodiff.
//!
//! # References
//!
//! - [Proximal Policy Optimization Algorithms](https://arxiv.org/abs/1707.06347)
//! - [OpenAI Spinning Up: PPO](https://spinningup.openai.com/en/latest/algorithms/ppo.html)

pub mod config;
pub mod loss;
pub mod stats;
pub mod trainer;

pub use config::TrainingConfig;
pub use loss::{
    accumulate_gradients, generate_minibatch_indices, policy_gradient_coefficient, SampleLoss,
};
pub use stats::{AggregatedStats, UpdateStats};
pub use trainer::PPOTrainer;
