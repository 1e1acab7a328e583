//! Reward shaping
//!
//! Converts raw vehicle state after each tick into a scalar reward for one
//! agent slot. Progress is measured as improvement of the distance to the
//! goal over the best distance reached so far in the episode, so driving
//! back and forth never pays twice.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::env::{Outcome, VehicleState};

/// Speed that counts as "full speed" for the speed and direction terms
const SPEED_NORM: f64 = 360.0;

/// Progress (in arena units per tick) that fully silences the loiter penalty
const LOITER_PROGRESS_NORM: f64 = 20.0;

/// Cosine below which driving away from the goal is penalized
const BACKWARD_COS: f64 = -0.2;

/// Reward-shaping coefficient table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward per unit of new closest approach to the goal
    pub progress: f64,

    /// Reward per hit point of damage dealt
    pub damage: f64,

    /// Penalty per hit point of damage taken
    pub damage_taken: f64,

    /// Speed bonus, only paid on ticks with positive progress
    pub speed: f64,

    /// Bonus for velocity aligned with the goal direction
    pub forward_bonus: f64,

    /// Penalty for velocity pointing away from the goal
    pub backward_penalty: f64,

    /// Constant per-tick penalty
    pub time_penalty: f64,

    /// Penalty for stalling near the goal
    pub loiter_penalty: f64,

    /// Distance from the goal center inside which loitering is penalized
    pub loiter_radius: f64,

    /// One-shot bonus for reaching the goal
    pub finish_bonus: f64,

    /// Bonus for a kill, and penalty for being killed
    pub kill_bonus: f64,

    /// Terminal bonus for the winner, and penalty for the loser
    pub win_bonus: f64,

    /// Terminal bonus for both agents on a draw (usually negative)
    pub draw_bonus: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            progress: 0.01,
            damage: 0.05,
            damage_taken: 0.05,
            speed: 0.002,
            forward_bonus: 0.0,
            backward_penalty: 0.0,
            time_penalty: 0.001,
            loiter_penalty: 0.002,
            loiter_radius: 260.0,
            finish_bonus: 5.0,
            kill_bonus: 5.0,
            win_bonus: 10.0,
            draw_bonus: -2.0,
        }
    }
}

impl RewardConfig {
    /// Clamp every coefficient into its valid range
    pub fn clamped(self) -> Self {
        use crate::train::ppo::config::clamp_f64 as c;
        Self {
            progress: c("rewards.progress", self.progress, 0.0, 10.0),
            damage: c("rewards.damage", self.damage, 0.0, 10.0),
            damage_taken: c("rewards.damage_taken", self.damage_taken, 0.0, 10.0),
            speed: c("rewards.speed", self.speed, 0.0, 10.0),
            forward_bonus: c("rewards.forward_bonus", self.forward_bonus, 0.0, 10.0),
            backward_penalty: c("rewards.backward_penalty", self.backward_penalty, 0.0, 10.0),
            time_penalty: c("rewards.time_penalty", self.time_penalty, 0.0, 10.0),
            loiter_penalty: c("rewards.loiter_penalty", self.loiter_penalty, 0.0, 10.0),
            loiter_radius: c("rewards.loiter_radius", self.loiter_radius, 0.0, 5000.0),
            finish_bonus: c("rewards.finish_bonus", self.finish_bonus, 0.0, 1000.0),
            kill_bonus: c("rewards.kill_bonus", self.kill_bonus, 0.0, 1000.0),
            win_bonus: c("rewards.win_bonus", self.win_bonus, 0.0, 1000.0),
            draw_bonus: c("rewards.draw_bonus", self.draw_bonus, -1000.0, 1000.0),
        }
    }

    /// Terminal reward for `slot` given the match outcome
    ///
    /// A match that ran out of ticks has no outcome and counts as a draw.
    pub fn terminal_bonus(&self, outcome: Option<Outcome>, slot: usize) -> f64 {
        match outcome {
            Some(Outcome::Winner(winner)) if winner == slot => self.win_bonus,
            Some(Outcome::Winner(_)) => -self.win_bonus,
            Some(Outcome::Draw) | None => self.draw_bonus,
        }
    }
}

/// Per-slot shaping state for one episode
#[derive(Debug, Clone, Default)]
pub struct RewardTracker {
    best_goal_distance: f64,
    last_own_hp: f64,
    last_enemy_hp: f64,
    goal_bonus_given: bool,
}

impl RewardTracker {
    /// Start tracking a new episode from the initial state
    pub fn bind(own: &VehicleState, enemy: &VehicleState, goal: DVec2) -> Self {
        Self {
            best_goal_distance: own.position.distance(goal),
            last_own_hp: own.hp,
            last_enemy_hp: enemy.hp,
            goal_bonus_given: false,
        }
    }

    /// Shaped reward for the tick that just happened
    pub fn shape(
        &mut self,
        own: &VehicleState,
        enemy: &VehicleState,
        goal: DVec2,
        cfg: &RewardConfig,
    ) -> f64 {
        let to_goal = goal - own.position;
        let goal_distance = to_goal.length();
        let progress = (self.best_goal_distance - goal_distance).max(0.0);
        if progress > 0.0 {
            self.best_goal_distance = goal_distance;
        }

        let prev_enemy_hp = self.last_enemy_hp;
        let damage_dealt = (prev_enemy_hp - enemy.hp).max(0.0);
        self.last_enemy_hp = enemy.hp;

        let prev_own_hp = self.last_own_hp;
        let damage_taken = (prev_own_hp - own.hp).max(0.0);
        self.last_own_hp = own.hp;

        let speed = own.velocity.length();

        let mut reward = progress * cfg.progress;
        reward += damage_dealt * cfg.damage;
        reward -= damage_taken * cfg.damage_taken;
        if progress > 0.0 {
            reward += (speed / SPEED_NORM).min(1.0) * cfg.speed;
        }

        if (cfg.forward_bonus > 0.0 || cfg.backward_penalty > 0.0)
            && goal_distance > 1e-3
            && speed > 1e-3
        {
            let cos = own.velocity.dot(to_goal) / (speed * goal_distance);
            reward += cos.max(0.0) * (speed / SPEED_NORM) * cfg.forward_bonus;
            if cos < BACKWARD_COS {
                reward -= cos.abs() * cfg.backward_penalty;
            }
        }

        reward -= cfg.time_penalty;

        if goal_distance < cfg.loiter_radius {
            let severity = 1.0 - (progress / LOITER_PROGRESS_NORM).min(1.0);
            reward -= severity * cfg.loiter_penalty;
        }

        if own.reached_goal && !self.goal_bonus_given {
            reward += cfg.finish_bonus;
            self.goal_bonus_given = true;
        }

        if enemy.hp <= 0.0 && prev_enemy_hp > 0.0 {
            reward += cfg.kill_bonus;
        }
        if own.hp <= 0.0 && prev_own_hp > 0.0 {
            reward -= cfg.kill_bonus;
        }

        reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(x: f64, y: f64, hp: f64) -> VehicleState {
        VehicleState { position: DVec2::new(x, y), velocity: DVec2::ZERO, hp, reached_goal: false }
    }

    /// Only the named coefficient is non-zero.
    fn only(set: impl FnOnce(&mut RewardConfig)) -> RewardConfig {
        let mut cfg = RewardConfig {
            progress: 0.0,
            damage: 0.0,
            damage_taken: 0.0,
            speed: 0.0,
            forward_bonus: 0.0,
            backward_penalty: 0.0,
            time_penalty: 0.0,
            loiter_penalty: 0.0,
            loiter_radius: 0.0,
            finish_bonus: 0.0,
            kill_bonus: 0.0,
            win_bonus: 0.0,
            draw_bonus: 0.0,
        };
        set(&mut cfg);
        cfg
    }

    const GOAL: DVec2 = DVec2::new(1000.0, 0.0);

    #[test]
    fn test_progress_only_rewarded_on_improvement() {
        let cfg = only(|c| c.progress = 1.0);
        let enemy = vehicle(0.0, 500.0, 100.0);
        let mut tracker = RewardTracker::bind(&vehicle(0.0, 0.0, 100.0), &enemy, GOAL);

        assert_eq!(tracker.shape(&vehicle(100.0, 0.0, 100.0), &enemy, GOAL, &cfg), 100.0);
        // Backing off and returning to the same spot pays nothing.
        assert_eq!(tracker.shape(&vehicle(50.0, 0.0, 100.0), &enemy, GOAL, &cfg), 0.0);
        assert_eq!(tracker.shape(&vehicle(100.0, 0.0, 100.0), &enemy, GOAL, &cfg), 0.0);
        assert_eq!(tracker.shape(&vehicle(110.0, 0.0, 100.0), &enemy, GOAL, &cfg), 10.0);
    }

    #[test]
    fn test_finish_bonus_paid_once() {
        let cfg = only(|c| c.finish_bonus = 5.0);
        let enemy = vehicle(0.0, 500.0, 100.0);
        let mut tracker = RewardTracker::bind(&vehicle(0.0, 0.0, 100.0), &enemy, GOAL);

        let mut at_goal = vehicle(1000.0, 0.0, 100.0);
        at_goal.reached_goal = true;
        let rewards: Vec<f64> =
            (0..4).map(|_| tracker.shape(&at_goal, &enemy, GOAL, &cfg)).collect();
        assert_eq!(rewards, vec![5.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_damage_and_kill_transitions() {
        let cfg = only(|c| {
            c.damage = 0.1;
            c.damage_taken = 0.2;
            c.kill_bonus = 3.0;
        });
        let mut tracker =
            RewardTracker::bind(&vehicle(0.0, 0.0, 100.0), &vehicle(0.0, 500.0, 24.0), GOAL);

        // Deal 12, take 12.
        let r = tracker.shape(&vehicle(0.0, 0.0, 88.0), &vehicle(0.0, 500.0, 12.0), GOAL, &cfg);
        assert!((r - (1.2 - 2.4)).abs() < 1e-12);

        // Kill: 12 damage plus the kill bonus, paid once.
        let r = tracker.shape(&vehicle(0.0, 0.0, 88.0), &vehicle(0.0, 500.0, 0.0), GOAL, &cfg);
        assert!((r - (1.2 + 3.0)).abs() < 1e-12);
        let r = tracker.shape(&vehicle(0.0, 0.0, 88.0), &vehicle(0.0, 500.0, 0.0), GOAL, &cfg);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn test_death_penalty() {
        let cfg = only(|c| c.kill_bonus = 3.0);
        let enemy = vehicle(0.0, 500.0, 100.0);
        let mut tracker = RewardTracker::bind(&vehicle(0.0, 0.0, 10.0), &enemy, GOAL);
        assert_eq!(tracker.shape(&vehicle(0.0, 0.0, 0.0), &enemy, GOAL, &cfg), -3.0);
    }

    #[test]
    fn test_loiter_penalty_scales_with_stall() {
        let cfg = only(|c| {
            c.loiter_penalty = 1.0;
            c.loiter_radius = 260.0;
        });
        let enemy = vehicle(0.0, 500.0, 100.0);
        let mut tracker = RewardTracker::bind(&vehicle(800.0, 0.0, 100.0), &enemy, GOAL);

        // 10 units of progress inside the radius: half severity.
        let r = tracker.shape(&vehicle(810.0, 0.0, 100.0), &enemy, GOAL, &cfg);
        assert!((r + 0.5).abs() < 1e-12);
        // Standing still: full severity.
        let r = tracker.shape(&vehicle(810.0, 0.0, 100.0), &enemy, GOAL, &cfg);
        assert!((r + 1.0).abs() < 1e-12);
        // Outside the radius: nothing.
        let r = tracker.shape(&vehicle(0.0, 0.0, 100.0), &enemy, GOAL, &cfg);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn test_direction_terms() {
        let cfg = only(|c| {
            c.forward_bonus = 1.0;
            c.backward_penalty = 0.5;
        });
        let enemy = vehicle(0.0, 500.0, 100.0);
        let mut tracker = RewardTracker::bind(&vehicle(0.0, 0.0, 100.0), &enemy, GOAL);

        let mut toward = vehicle(0.0, 0.0, 100.0);
        toward.velocity = DVec2::new(180.0, 0.0);
        assert!((tracker.shape(&toward, &enemy, GOAL, &cfg) - 0.5).abs() < 1e-12);

        let mut away = vehicle(0.0, 0.0, 100.0);
        away.velocity = DVec2::new(-180.0, 0.0);
        assert!((tracker.shape(&away, &enemy, GOAL, &cfg) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_speed_bonus_requires_progress() {
        let cfg = only(|c| c.speed = 1.0);
        let enemy = vehicle(0.0, 500.0, 100.0);
        let mut tracker = RewardTracker::bind(&vehicle(0.0, 0.0, 100.0), &enemy, GOAL);

        let mut sideways = vehicle(0.0, 0.0, 100.0);
        sideways.velocity = DVec2::new(0.0, 360.0);
        assert_eq!(tracker.shape(&sideways, &enemy, GOAL, &cfg), 0.0);

        let mut closer = vehicle(5.0, 0.0, 100.0);
        closer.velocity = DVec2::new(720.0, 0.0);
        assert_eq!(tracker.shape(&closer, &enemy, GOAL, &cfg), 1.0);
    }

    #[test]
    fn test_terminal_bonus() {
        let cfg = RewardConfig::default();
        assert_eq!(cfg.terminal_bonus(Some(Outcome::Winner(0)), 0), 10.0);
        assert_eq!(cfg.terminal_bonus(Some(Outcome::Winner(0)), 1), -10.0);
        assert_eq!(cfg.terminal_bonus(Some(Outcome::Draw), 1), -2.0);
        assert_eq!(cfg.terminal_bonus(None, 0), -2.0);
    }

    #[test]
    fn test_clamped_limits_out_of_range_values() {
        let cfg = RewardConfig { progress: -1.0, win_bonus: 1e9, ..RewardConfig::default() }.clamped();
        assert_eq!(cfg.progress, 0.0);
        assert_eq!(cfg.win_bonus, 1000.0);
        assert_eq!(cfg.draw_bonus, -2.0);
    }
}
