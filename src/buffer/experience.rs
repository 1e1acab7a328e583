//! Self-play experience buffer
//!
//! One buffer serves both agent slots for a whole collection run. For each
//! match the caller binds it to the fresh simulation, asks it to decide for
//! each slot every tick, reports the tick with [`ExperienceBuffer::after_step`]
//! and closes the match with [`ExperienceBuffer::finalize_episode`] (or
//! throws it away with [`ExperienceBuffer::abandon_episode`]).
//!
//! A decision only becomes a [`Transition`] once its reward is known, so an
//! interrupted tick can never leave a half-written step in the trajectory.

use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};

use super::{
    dataset::{Dataset, MatchStats, Sample, Transition},
    gae::compute_gae,
    reward::{RewardConfig, RewardTracker},
};
use crate::{
    env::{Controls, DuelSimulation, Outcome, Perception, AGENT_COUNT},
    policy::{FeatureExtractor, Policy},
};

/// Per-slot, per-run trajectory storage with reward shaping
#[derive(Debug)]
pub struct ExperienceBuffer<P: Policy> {
    rewards: RewardConfig,
    policy: Arc<P>,
    rng: StdRng,
    extractors: [FeatureExtractor; AGENT_COUNT],
    trackers: [RewardTracker; AGENT_COUNT],
    pending: [Option<Transition>; AGENT_COUNT],
    trajectories: [Vec<Transition>; AGENT_COUNT],
    episode_start: [usize; AGENT_COUNT],
    episode_reward: f64,
    step_count: usize,
    stats: MatchStats,
}

impl<P: Policy> ExperienceBuffer<P> {
    /// Create an empty buffer that samples from `policy`
    pub fn new(rewards: RewardConfig, policy: Arc<P>, seed: u64) -> Self {
        Self {
            rewards,
            policy,
            rng: StdRng::seed_from_u64(seed),
            extractors: Default::default(),
            trackers: Default::default(),
            pending: [None, None],
            trajectories: [Vec::new(), Vec::new()],
            episode_start: [0; AGENT_COUNT],
            episode_reward: 0.0,
            step_count: 0,
            stats: MatchStats::default(),
        }
    }

    /// Recorded transitions across both slots
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// Statistics of the matches finalized so far
    pub fn stats(&self) -> &MatchStats {
        &self.stats
    }

    /// Reset per-episode state for a freshly created simulation
    pub fn bind_game<S: DuelSimulation + ?Sized>(&mut self, sim: &S) {
        let goal = sim.goal_center();
        for slot in 0..AGENT_COUNT {
            let own = sim.vehicle(slot);
            let enemy = sim.vehicle(1 - slot);
            self.trackers[slot] = RewardTracker::bind(&own, &enemy, goal);
            self.extractors[slot].reset();
            self.pending[slot] = None;
            self.episode_start[slot] = self.trajectories[slot].len();
        }
        self.episode_reward = 0.0;
    }

    /// Sample controls for `slot` and hold the decision until the tick ends
    pub fn decide(&mut self, slot: usize, perception: &Perception) -> Controls {
        let observation = self.extractors[slot].observe(perception);
        let sample = self.policy.sample(&observation, &mut self.rng);

        self.pending[slot] = Some(Transition {
            observation,
            raw_action: sample.raw_action,
            shoot: sample.shoot,
            log_prob: sample.log_prob,
            value: sample.value,
            reward: 0.0,
            done: false,
        });
        sample.controls
    }

    /// Shape rewards for the tick that just ran and commit pending decisions
    pub fn after_step<S: DuelSimulation + ?Sized>(&mut self, sim: &S) {
        let goal = sim.goal_center();
        for slot in 0..AGENT_COUNT {
            let Some(mut transition) = self.pending[slot].take() else {
                continue;
            };
            let own = sim.vehicle(slot);
            let enemy = sim.vehicle(1 - slot);
            transition.reward = self.trackers[slot].shape(&own, &enemy, goal, &self.rewards);
            self.episode_reward += transition.reward;
            self.trajectories[slot].push(transition);
            self.step_count += 1;
        }
    }

    /// Close the current match: terminal bonus, done flag and statistics
    pub fn finalize_episode(&mut self, outcome: Option<Outcome>) {
        match outcome {
            Some(Outcome::Winner(0)) => self.stats.wins += 1,
            Some(Outcome::Winner(_)) => self.stats.losses += 1,
            Some(Outcome::Draw) | None => self.stats.draws += 1,
        }
        self.stats.matches += 1;

        for slot in 0..AGENT_COUNT {
            self.pending[slot] = None;
            if self.trajectories[slot].len() <= self.episode_start[slot] {
                continue;
            }
            let bonus = self.rewards.terminal_bonus(outcome, slot);
            if let Some(last) = self.trajectories[slot].last_mut() {
                last.reward += bonus;
                last.done = true;
                self.episode_reward += bonus;
            }
            self.episode_start[slot] = self.trajectories[slot].len();
        }

        self.stats.total_reward += self.episode_reward;
        self.episode_reward = 0.0;
    }

    /// Drop everything recorded for the current match
    pub fn abandon_episode(&mut self) {
        for slot in 0..AGENT_COUNT {
            self.pending[slot] = None;
            let start = self.episode_start[slot];
            self.step_count -= self.trajectories[slot].len() - start;
            self.trajectories[slot].truncate(start);
        }
        self.episode_reward = 0.0;
    }

    /// Label every finished trajectory with GAE and hand back the dataset
    ///
    /// Trajectories and statistics are cleared afterwards. Call only between
    /// matches; an open match should be finalized or abandoned first.
    pub fn build_dataset(&mut self, gamma: f64, lambda: f64) -> Dataset {
        let mut samples = Vec::with_capacity(self.step_count);

        for slot in 0..AGENT_COUNT {
            let trajectory = std::mem::take(&mut self.trajectories[slot]);
            self.episode_start[slot] = 0;
            if trajectory.is_empty() {
                continue;
            }

            let rewards: Vec<f64> = trajectory.iter().map(|t| t.reward).collect();
            let values: Vec<f64> = trajectory.iter().map(|t| t.value).collect();
            let dones: Vec<bool> = trajectory.iter().map(|t| t.done).collect();
            let (advantages, returns) = compute_gae(&rewards, &values, &dones, gamma, lambda);

            samples.extend(trajectory.into_iter().zip(advantages).zip(returns).map(
                |((transition, advantage), ret)| Sample {
                    transition,
                    advantage,
                    ret,
                    norm_advantage: advantage,
                },
            ));
        }

        self.step_count = 0;
        Dataset { samples, stats: std::mem::take(&mut self.stats) }
    }
}
