//! PPO Trainer implementation
//!
//! This module contains the main PPOTrainer struct and its update loop.

use anyhow::{bail, Result};
use rand::{rngs::StdRng, SeedableRng};

use super::{
    config::TrainingConfig,
    loss::{accumulate_gradients, generate_minibatch_indices},
    stats::{AggregatedStats, UpdateStats},
};
use crate::{buffer::Dataset, policy::ParamSet, train::adam::Adam};

/// PPO Trainer for policy optimization
///
/// Owns the optimizer state and a reusable gradient arena. The brain itself
/// is passed in by the caller for every update, so the trainer never holds
/// a second live copy of it.
#[derive(Debug)]
pub struct PPOTrainer {
    config: TrainingConfig,
    optimizer: Adam,
    grads: ParamSet,
    rng: StdRng,
    total_updates: usize,
    total_samples: usize,
    stats: AggregatedStats,
}

impl PPOTrainer {
    /// Create a new PPO trainer
    ///
    /// # Arguments
    ///
    /// * `config` - Training configuration; clamped into range here
    pub fn new(config: TrainingConfig) -> Self {
        let config = config.clamped();
        // Minibatch shuffling gets its own stream so it does not track the
        // brain initialization drawn from the same seed.
        let rng = StdRng::seed_from_u64(config.seed ^ 0x5eed_5eed);

        Self {
            config,
            optimizer: Adam::new(),
            grads: ParamSet::zeros(),
            rng,
            total_updates: 0,
            total_samples: 0,
            stats: AggregatedStats::new(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Optimizer state (moments and step counter)
    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    /// Number of committed updates
    pub fn total_updates(&self) -> usize {
        self.total_updates
    }

    /// Number of samples trained on across all committed updates
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    /// Smoothed statistics across updates
    pub fn stats(&self) -> &AggregatedStats {
        &self.stats
    }

    /// Run one PPO update of `brain` on `dataset`
    ///
    /// This performs:
    /// 1. Batch-wide advantage normalization
    /// 2. `n_epochs` shuffled passes of minibatch gradient accumulation
    /// 3. One Adam step per minibatch
    ///
    /// The steps run on copies of the brain and optimizer state. They are
    /// committed only if every resulting parameter is finite; otherwise an
    /// error is returned and both are left untouched.
    ///
    /// # Returns
    /// `None` when the dataset is empty (nothing to train on), otherwise the
    /// per-sample averaged statistics of this update
    pub fn update_policy(
        &mut self,
        brain: &mut ParamSet,
        dataset: &mut Dataset,
    ) -> Result<Option<UpdateStats>> {
        if dataset.is_empty() {
            tracing::debug!("Empty dataset, skipping update");
            return Ok(None);
        }

        dataset.normalize_advantages();

        let mut staged = brain.clone();
        let mut optimizer = self.optimizer.clone();
        let mut totals = UpdateStats::zeros();

        for _epoch in 0..self.config.n_epochs {
            let batches =
                generate_minibatch_indices(dataset.len(), self.config.minibatch_size, &mut self.rng);

            for indices in &batches {
                self.grads.zero();
                for &i in indices {
                    let loss =
                        accumulate_gradients(&staged, &mut self.grads, &dataset.samples[i], &self.config);
                    totals.record(&loss);
                }
                self.grads.scale(1.0 / indices.len() as f64);
                optimizer.step(&mut staged, &self.grads, self.config.learning_rate);
                totals.minibatches += 1;
            }
        }

        if !staged.is_finite() {
            bail!(
                "PPO update produced non-finite parameters after {} minibatches; keeping previous brain",
                totals.minibatches
            );
        }

        *brain = staged;
        self.optimizer = optimizer;
        self.total_updates += 1;
        self.total_samples += dataset.len();

        let averaged = totals.average();
        self.stats.update(&averaged, &dataset.stats);
        tracing::debug!(
            "Update {}: policy_loss={:.4} value_loss={:.4} entropy={:.4} clip_frac={:.3} kl={:.5}",
            self.total_updates,
            averaged.policy_loss,
            averaged.value_loss,
            averaged.entropy,
            averaged.clip_fraction,
            averaged.approx_kl
        );

        Ok(Some(averaged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::{MatchStats, Sample, Transition},
        policy::{
            network::{evaluate, log_prob_given_action},
            ParamGroup, OBS_SIZE,
        },
    };

    fn dataset_from(params: &ParamSet, advantages: &[f64]) -> Dataset {
        let samples = advantages
            .iter()
            .enumerate()
            .map(|(k, &advantage)| {
                let mut observation = [0.0; OBS_SIZE];
                observation[k % OBS_SIZE] = 0.5;
                observation[OBS_SIZE - 1] = 1.0;
                let raw_action = [0.2, -0.1, 0.4];
                let eval = evaluate(params, &observation);
                Sample {
                    transition: Transition {
                        observation,
                        raw_action,
                        shoot: k % 2 == 0,
                        log_prob: log_prob_given_action(&eval, &raw_action, k % 2 == 0),
                        value: eval.value,
                        reward: advantage,
                        done: true,
                    },
                    advantage,
                    ret: advantage + eval.value,
                    norm_advantage: 0.0,
                }
            })
            .collect();
        Dataset {
            samples,
            stats: MatchStats { matches: 1, wins: 1, losses: 0, draws: 0, total_reward: 1.0 },
        }
    }

    #[test]
    fn test_empty_dataset_skips_update() -> Result<()> {
        let mut trainer = PPOTrainer::new(TrainingConfig::default());
        let mut brain = ParamSet::initialize(1);
        let before = brain.clone();

        let result = trainer.update_policy(&mut brain, &mut Dataset::default())?;
        assert!(result.is_none());
        assert_eq!(brain, before);
        assert_eq!(trainer.total_updates(), 0);
        assert_eq!(trainer.optimizer().steps(), 0);
        Ok(())
    }

    #[test]
    fn test_update_counts_minibatches_and_samples() -> Result<()> {
        let config = TrainingConfig::default().minibatch_size(4).n_epochs(3);
        let mut trainer = PPOTrainer::new(config);
        let mut brain = ParamSet::initialize(2);
        let before = brain.clone();
        let mut dataset = dataset_from(&brain, &[1.0, -1.0, 0.5, 2.0, -0.3, 0.0, 1.2, -2.0, 0.1, 0.9]);

        let stats = trainer.update_policy(&mut brain, &mut dataset)?.expect("non-empty dataset");
        // 10 samples in minibatches of 4 -> 3 steps per epoch.
        assert_eq!(stats.minibatches, 9);
        assert_eq!(stats.samples, 30);
        assert_eq!(trainer.optimizer().steps(), 9);
        assert_eq!(trainer.total_updates(), 1);
        assert_eq!(trainer.total_samples(), 10);
        assert_ne!(brain, before);
        assert!(brain.is_finite());
        assert_eq!(trainer.stats().total_updates, 1);
        assert_eq!(trainer.stats().running_win_rate, 1.0);
        Ok(())
    }

    #[test]
    fn test_advantages_are_normalized_before_training() -> Result<()> {
        let mut trainer = PPOTrainer::new(TrainingConfig::default());
        let mut brain = ParamSet::initialize(3);
        let mut dataset = dataset_from(&brain, &[4.0, 4.0, 4.0]);

        trainer.update_policy(&mut brain, &mut dataset)?;
        // Zero-variance advantages collapse to zero instead of dividing by 0.
        assert!(dataset.samples.iter().all(|s| s.norm_advantage == 0.0));
        assert!(brain.is_finite());
        Ok(())
    }

    #[test]
    fn test_non_finite_update_is_rejected() {
        let mut trainer = PPOTrainer::new(TrainingConfig::default());
        let mut brain = ParamSet::initialize(4);
        let mut dataset = dataset_from(&brain, &[1.0, -1.0]);
        brain.group_mut(ParamGroup::BValue)[0] = f64::NAN;
        let before = brain.clone();

        assert!(trainer.update_policy(&mut brain, &mut dataset).is_err());
        // NaN != NaN, so compare the untouched groups and the poisoned slot.
        assert_eq!(brain.group(ParamGroup::W1), before.group(ParamGroup::W1));
        assert!(brain.group(ParamGroup::BValue)[0].is_nan());
        assert_eq!(trainer.total_updates(), 0);
        assert_eq!(trainer.optimizer().steps(), 0);
    }
}
