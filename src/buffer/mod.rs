//! Experience collection
//!
//! - [`reward`]: reward shaping from raw vehicle state
//! - [`experience`]: per-match, per-slot trajectory accumulation
//! - [`gae`]: advantage and return labeling
//! - [`dataset`]: the flat, labeled training set handed to the trainer

pub mod dataset;
pub mod experience;
pub mod gae;
pub mod reward;

pub use dataset::{Dataset, MatchStats, Sample, Transition};
pub use experience::ExperienceBuffer;
pub use gae::compute_gae;
pub use reward::{RewardConfig, RewardTracker};
