//! Training configuration
//!
//! Every knob has a valid range. Out-of-range values are clamped with a
//! warning instead of rejected, so a stale or hand-edited config file still
//! trains.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::buffer::RewardConfig;

/// Hyperparameters for self-play PPO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Transitions (both slots counted) collected per update
    pub steps_per_batch: usize,

    /// Tick limit per match; a match that hits it is a draw
    pub max_match_ticks: usize,

    /// Rollout worker threads
    pub num_workers: usize,

    /// Discount factor
    pub gamma: f64,

    /// GAE lambda
    pub gae_lambda: f64,

    /// PPO clip epsilon
    pub clip_ratio: f64,

    /// Adam step size
    pub learning_rate: f64,

    /// Samples per optimizer step
    pub minibatch_size: usize,

    /// Passes over each batch
    pub n_epochs: usize,

    /// Entropy bonus weight
    pub entropy_coef: f64,

    /// Value loss weight
    pub value_coef: f64,

    /// Seed for brain init, worker RNGs and minibatch shuffling
    pub seed: u64,

    /// Swap spawn points on odd match seeds
    pub randomize_sides: bool,

    /// Reward shaping table
    pub rewards: RewardConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            steps_per_batch: 8192,
            max_match_ticks: 3600,
            num_workers: 4,
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_ratio: 0.2,
            learning_rate: 3e-4,
            minibatch_size: 256,
            n_epochs: 4,
            entropy_coef: 0.01,
            value_coef: 0.5,
            seed: 1,
            randomize_sides: true,
            rewards: RewardConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON config; missing fields take their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config.clamped())
    }

    /// Set steps per batch
    pub fn steps_per_batch(mut self, steps: usize) -> Self {
        self.steps_per_batch = steps;
        self
    }

    /// Set the per-match tick limit
    pub fn max_match_ticks(mut self, ticks: usize) -> Self {
        self.max_match_ticks = ticks;
        self
    }

    /// Set the number of rollout workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    /// Set discount factor
    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    /// Set GAE lambda
    pub fn gae_lambda(mut self, lambda: f64) -> Self {
        self.gae_lambda = lambda;
        self
    }

    /// Set PPO clip ratio
    pub fn clip_ratio(mut self, clip: f64) -> Self {
        self.clip_ratio = clip;
        self
    }

    /// Set learning rate
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set minibatch size
    pub fn minibatch_size(mut self, size: usize) -> Self {
        self.minibatch_size = size;
        self
    }

    /// Set number of epochs
    pub fn n_epochs(mut self, epochs: usize) -> Self {
        self.n_epochs = epochs;
        self
    }

    /// Set entropy coefficient
    pub fn entropy_coef(mut self, coef: f64) -> Self {
        self.entropy_coef = coef;
        self
    }

    /// Set value coefficient
    pub fn value_coef(mut self, coef: f64) -> Self {
        self.value_coef = coef;
        self
    }

    /// Set seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable spawn swapping
    pub fn randomize_sides(mut self, enabled: bool) -> Self {
        self.randomize_sides = enabled;
        self
    }

    /// Replace the reward table
    pub fn rewards(mut self, rewards: RewardConfig) -> Self {
        self.rewards = rewards;
        self
    }

    /// Clamp every field into its valid range
    pub fn clamped(self) -> Self {
        Self {
            steps_per_batch: clamp_usize("steps_per_batch", self.steps_per_batch, 1, 10_000_000),
            max_match_ticks: clamp_usize("max_match_ticks", self.max_match_ticks, 1, 1_000_000),
            num_workers: clamp_usize("num_workers", self.num_workers, 1, 256),
            gamma: clamp_f64("gamma", self.gamma, 0.0, 1.0),
            gae_lambda: clamp_f64("gae_lambda", self.gae_lambda, 0.0, 1.0),
            clip_ratio: clamp_f64("clip_ratio", self.clip_ratio, 0.01, 1.0),
            learning_rate: clamp_f64("learning_rate", self.learning_rate, 1e-7, 1.0),
            minibatch_size: clamp_usize("minibatch_size", self.minibatch_size, 1, 1_000_000),
            n_epochs: clamp_usize("n_epochs", self.n_epochs, 1, 1000),
            entropy_coef: clamp_f64("entropy_coef", self.entropy_coef, 0.0, 1.0),
            value_coef: clamp_f64("value_coef", self.value_coef, 0.0, 100.0),
            seed: self.seed,
            randomize_sides: self.randomize_sides,
            rewards: self.rewards.clamped(),
        }
    }
}

/// Clamp a float knob, warning when it moves (NaN falls to `min`)
pub(crate) fn clamp_f64(name: &str, value: f64, min: f64, max: f64) -> f64 {
    let clamped = if value.is_nan() { min } else { value.clamp(min, max) };
    if clamped != value {
        tracing::warn!("{} = {} is out of range [{}, {}]; using {}", name, value, min, max, clamped);
    }
    clamped
}

fn clamp_usize(name: &str, value: usize, min: usize, max: usize) -> usize {
    let clamped = value.clamp(min, max);
    if clamped != value {
        tracing::warn!("{} = {} is out of range [{}, {}]; using {}", name, value, min, max, clamped);
    }
    clamped
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_default_config_is_already_in_range() {
        let config = TrainingConfig::default();
        assert_eq!(config.clone().clamped(), config);
    }

    #[test]
    fn test_builder_pattern() {
        let config = TrainingConfig::new().learning_rate(1e-3).n_epochs(8).minibatch_size(64);
        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.n_epochs, 8);
        assert_eq!(config.minibatch_size, 64);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = TrainingConfig::new()
            .gamma(1.5)
            .clip_ratio(-0.1)
            .learning_rate(f64::NAN)
            .num_workers(0)
            .minibatch_size(0)
            .clamped();
        assert_eq!(config.gamma, 1.0);
        assert_eq!(config.clip_ratio, 0.01);
        assert_eq!(config.learning_rate, 1e-7);
        assert_eq!(config.num_workers, 1);
        assert_eq!(config.minibatch_size, 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"{{ "steps_per_batch": 512, "gamma": 2.0, "rewards": {{ "win_bonus": 20.0 }} }}"#
        )?;

        let config = TrainingConfig::from_json_file(file.path())?;
        assert_eq!(config.steps_per_batch, 512);
        assert_eq!(config.gamma, 1.0);
        assert_eq!(config.rewards.win_bonus, 20.0);
        assert_eq!(config.rewards.draw_bonus, RewardConfig::default().draw_bonus);
        assert_eq!(config.n_epochs, TrainingConfig::default().n_epochs);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(TrainingConfig::from_json_file("/definitely/not/here.json").is_err());
    }
}
