//! Transitions, training samples and batch statistics

use std::ops::AddAssign;

use crate::policy::{Observation, ACTION_SIZE};

/// Advantage normalization floor on the standard deviation
pub const ADVANTAGE_STD_EPS: f64 = 1e-8;

/// One decision step of one agent
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Network input at decision time
    pub observation: Observation,

    /// Unclamped continuous action
    pub raw_action: [f64; ACTION_SIZE],

    /// Shoot decision
    pub shoot: bool,

    /// Log-probability under the policy that produced the action
    pub log_prob: f64,

    /// Critic estimate at decision time
    pub value: f64,

    /// Shaped reward for the tick (terminal bonus included on the last step)
    pub reward: f64,

    /// Last step of an episode
    pub done: bool,
}

/// A transition labeled for training
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// The recorded step
    pub transition: Transition,

    /// GAE advantage
    pub advantage: f64,

    /// Value target (advantage + value)
    pub ret: f64,

    /// Advantage after batch normalization
    pub norm_advantage: f64,
}

/// Aggregate match results, counted from agent slot 0's side
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchStats {
    /// Completed matches
    pub matches: usize,

    /// Matches won by slot 0
    pub wins: usize,

    /// Matches won by slot 1
    pub losses: usize,

    /// Draws, including matches that ran out of ticks
    pub draws: usize,

    /// Sum of every shaped reward of both slots
    pub total_reward: f64,
}

impl MatchStats {
    /// Fraction of matches won by slot 0
    pub fn win_rate(&self) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            self.wins as f64 / self.matches as f64
        }
    }

    /// Total reward per completed match
    pub fn average_reward(&self) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            self.total_reward / self.matches as f64
        }
    }
}

impl AddAssign<&MatchStats> for MatchStats {
    fn add_assign(&mut self, other: &MatchStats) {
        self.matches += other.matches;
        self.wins += other.wins;
        self.losses += other.losses;
        self.draws += other.draws;
        self.total_reward += other.total_reward;
    }
}

/// Flat training set for one update cycle
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Labeled samples from every agent and match
    pub samples: Vec<Sample>,

    /// Match results behind the samples
    pub stats: MatchStats,
}

impl Dataset {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when there is nothing to train on
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append another dataset (concatenate samples, sum statistics)
    pub fn merge(&mut self, other: Dataset) {
        self.samples.extend(other.samples);
        self.stats += &other.stats;
    }

    /// Fill `norm_advantage` with zero-mean, unit-std advantages
    pub fn normalize_advantages(&mut self) {
        if self.samples.is_empty() {
            return;
        }
        let n = self.samples.len() as f64;
        let mean = self.samples.iter().map(|s| s.advantage).sum::<f64>() / n;
        let variance = self.samples.iter().map(|s| (s.advantage - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt().max(ADVANTAGE_STD_EPS);

        for sample in &mut self.samples {
            sample.norm_advantage = (sample.advantage - mean) / std;
        }
    }
}
