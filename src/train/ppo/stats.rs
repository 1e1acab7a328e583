//! Training statistics for PPO
//!
//! This module defines structures for tracking and aggregating
//! update and self-play metrics across training iterations.

use super::loss::SampleLoss;
use crate::buffer::MatchStats;

/// Smoothing factor for the running averages
const EMA_ALPHA: f64 = 0.1;

/// Statistics for one PPO update (all epochs over one dataset)
///
/// Loss terms are summed per sample while accumulating and turned into
/// per-sample means by [`UpdateStats::average`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateStats {
    /// Clipped surrogate loss
    pub policy_loss: f64,

    /// Value function loss
    pub value_loss: f64,

    /// Policy entropy (Gaussian plus Bernoulli)
    pub entropy: f64,

    /// Fraction of samples whose policy gradient was cut off
    pub clip_fraction: f64,

    /// Approximate KL divergence between old and new policies
    pub approx_kl: f64,

    /// Samples visited (counted once per epoch)
    pub samples: usize,

    /// Optimizer steps taken
    pub minibatches: usize,
}

impl UpdateStats {
    /// Create zero-initialized statistics
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Fold one sample's loss into the running sums
    pub fn record(&mut self, loss: &SampleLoss) {
        self.policy_loss += loss.policy_loss;
        self.value_loss += loss.value_loss;
        self.entropy += loss.entropy;
        if loss.clipped {
            self.clip_fraction += 1.0;
        }
        self.approx_kl += loss.approx_kl;
        self.samples += 1;
    }

    /// Per-sample means of the summed terms
    pub fn average(&self) -> Self {
        if self.samples == 0 {
            return Self { minibatches: self.minibatches, ..Self::zeros() };
        }
        let scale = self.samples as f64;

        Self {
            policy_loss: self.policy_loss / scale,
            value_loss: self.value_loss / scale,
            entropy: self.entropy / scale,
            clip_fraction: self.clip_fraction / scale,
            approx_kl: self.approx_kl / scale,
            samples: self.samples,
            minibatches: self.minibatches,
        }
    }
}

/// Smoothed trends across training iterations
///
/// Exponential moving averages of the update diagnostics and of the
/// self-play results behind them, for progress reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedStats {
    /// Moving average of the per-update diagnostics
    pub running_avg: UpdateStats,

    /// Moving average of per-match reward
    pub running_reward: f64,

    /// Moving average of slot 0's win rate
    pub running_win_rate: f64,

    /// Updates folded in
    pub total_updates: usize,
}

impl AggregatedStats {
    /// Create empty aggregated statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the averaged stats of one update and the matches behind it
    pub fn update(&mut self, stats: &UpdateStats, matches: &MatchStats) {
        // The first update seeds the averages instead of decaying from zero.
        let alpha = if self.total_updates == 0 { 1.0 } else { EMA_ALPHA };
        let ema = |new: f64, old: f64| alpha * new + (1.0 - alpha) * old;

        self.running_avg.policy_loss = ema(stats.policy_loss, self.running_avg.policy_loss);
        self.running_avg.value_loss = ema(stats.value_loss, self.running_avg.value_loss);
        self.running_avg.entropy = ema(stats.entropy, self.running_avg.entropy);
        self.running_avg.clip_fraction = ema(stats.clip_fraction, self.running_avg.clip_fraction);
        self.running_avg.approx_kl = ema(stats.approx_kl, self.running_avg.approx_kl);
        self.running_avg.samples = stats.samples;
        self.running_avg.minibatches = stats.minibatches;

        if matches.matches > 0 {
            self.running_reward = ema(matches.average_reward(), self.running_reward);
            self.running_win_rate = ema(matches.win_rate(), self.running_win_rate);
        }

        self.total_updates += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loss(policy: f64, clipped: bool) -> SampleLoss {
        SampleLoss { policy_loss: policy, value_loss: 2.0, entropy: 1.0, clipped, approx_kl: 0.1 }
    }

    #[test]
    fn test_average_is_per_sample() {
        let mut stats = UpdateStats::zeros();
        stats.record(&loss(1.0, true));
        stats.record(&loss(3.0, false));
        stats.minibatches = 1;

        let avg = stats.average();
        assert_eq!(avg.policy_loss, 2.0);
        assert_eq!(avg.value_loss, 2.0);
        assert_eq!(avg.clip_fraction, 0.5);
        assert_eq!(avg.samples, 2);
        assert_eq!(avg.minibatches, 1);
    }

    #[test]
    fn test_average_of_nothing_is_zero() {
        let avg = UpdateStats::zeros().average();
        assert_eq!(avg, UpdateStats::zeros());
    }

    #[test]
    fn test_aggregated_smooths_updates_and_results() {
        let mut agg = AggregatedStats::new();
        let matches = MatchStats { matches: 2, wins: 1, losses: 1, draws: 0, total_reward: 4.0 };

        let first = UpdateStats { policy_loss: 1.0, value_loss: 4.0, ..UpdateStats::zeros() };
        agg.update(&first, &matches);
        assert_eq!(agg.running_avg.policy_loss, 1.0);
        assert_eq!(agg.running_reward, 2.0);
        assert_eq!(agg.running_win_rate, 0.5);

        let second = UpdateStats { policy_loss: 0.0, value_loss: 5.0, ..UpdateStats::zeros() };
        agg.update(&second, &MatchStats::default());
        assert!((agg.running_avg.policy_loss - 0.9).abs() < 1e-12);
        assert!((agg.running_avg.value_loss - 4.1).abs() < 1e-12);
        // No matches behind the second update: reward trend untouched.
        assert_eq!(agg.running_reward, 2.0);
        assert_eq!(agg.total_updates, 2);
    }
}
