//! Observation builder
//!
//! Turns a raw [`Perception`] into the fixed 48-wide feature vector the
//! network consumes. Layout:
//!
//! ```text
//!  0..2   own hp, enemy hp
//!  2..7   goal: distance, offset x/y, cos/sin of bearing
//!  7..12  enemy: distance, offset x/y, cos/sin of bearing
//! 12..16  forward speed, lateral speed, speed, gun cooldown
//! 16..18  projectile pressure, turret pressure
//! 18..24  two nearest projectiles (x, y, distance)
//! 24..28  two nearest turrets (x, y)
//! 28..46  nine rays (distance, hit code)
//! 46      elapsed time since the previous decision
//! 47      constant 1
//! ```

use glam::DVec2;

use super::params::OBS_SIZE;
use crate::env::Perception;

/// Fixed-length network input
pub type Observation = [f64; OBS_SIZE];

/// Number of vision rays read into the observation
pub const RAY_COUNT: usize = 9;

/// Ray length used to normalize ray distances
pub const MAX_VISION_DIST: f64 = 420.0;

const GOAL_SCALE: f64 = 800.0;
const ENEMY_SCALE: f64 = 600.0;
const SPEED_SCALE: f64 = 360.0;
const COOLDOWN_SCALE: f64 = 0.5;
const PROJECTILE_RANGE: f64 = 260.0;
const PROJECTILE_SCALE: f64 = 300.0;
const TURRET_RANGE: f64 = 420.0;
const TURRET_SCALE: f64 = 500.0;
const PRESSURE_SCALE: f64 = 3.0;
const TIME_SCALE: f64 = 10.0;

/// Per-agent feature state carried between decisions
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    prev_time: Option<f64>,
}

impl FeatureExtractor {
    /// Fresh extractor for a new episode
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous decision time
    pub fn reset(&mut self) {
        self.prev_time = None;
    }

    /// Build the observation for one decision tick
    ///
    /// Every entry is finite and lies in [-1, 1].
    pub fn observe(&mut self, input: &Perception) -> Observation {
        let mut features = FeatureWriter::default();

        features.push((input.hp / 100.0).clamp(0.0, 1.0));
        features.push((input.enemy_hp / 100.0).clamp(0.0, 1.0));

        push_target(&mut features, input.goal_offset, GOAL_SCALE);
        push_target(&mut features, input.enemy_offset, ENEMY_SCALE);

        let (sin_h, cos_h) = input.heading.sin_cos();
        let v = input.velocity;
        features.push((v.x * cos_h + v.y * sin_h) / SPEED_SCALE);
        features.push((-v.x * sin_h + v.y * cos_h) / SPEED_SCALE);
        features.push(v.length() / SPEED_SCALE);
        features.push(input.shoot_cooldown / COOLDOWN_SCALE);

        features.push(pressure(&input.projectiles, PROJECTILE_RANGE));
        features.push(pressure(&input.turrets, TURRET_RANGE));

        for i in 0..2 {
            match input.projectiles.get(i) {
                Some(p) => {
                    features.push(p.x / PROJECTILE_SCALE);
                    features.push(p.y / PROJECTILE_SCALE);
                    features.push((p.length() / PROJECTILE_RANGE).min(1.0));
                }
                None => features.skip(3),
            }
        }

        for i in 0..2 {
            match input.turrets.get(i) {
                Some(t) => {
                    features.push(t.x / TURRET_SCALE);
                    features.push(t.y / TURRET_SCALE);
                }
                None => features.skip(2),
            }
        }

        for i in 0..RAY_COUNT {
            match input.rays.get(i) {
                Some(ray) => {
                    features.push((ray.distance / MAX_VISION_DIST).min(1.0));
                    features.push(ray.kind.code());
                }
                // A missing ray reads as an unobstructed one.
                None => {
                    features.push(1.0);
                    features.push(0.0);
                }
            }
        }

        let elapsed = match self.prev_time {
            Some(prev) => ((input.time - prev) / TIME_SCALE).tanh(),
            None => 0.0,
        };
        self.prev_time = Some(input.time);
        features.push(elapsed);
        features.push(1.0);

        features.finish()
    }
}

fn push_target(features: &mut FeatureWriter, offset: DVec2, scale: f64) {
    let bearing = offset.y.atan2(offset.x);
    features.push((offset.length() / scale).min(1.0));
    features.push(offset.x / scale);
    features.push(offset.y / scale);
    features.push(bearing.cos());
    features.push(bearing.sin());
}

/// Sum of linear proximity falloffs, normalized
fn pressure(offsets: &[DVec2], range: f64) -> f64 {
    let total: f64 = offsets
        .iter()
        .map(|o| (1.0 - (o.length() / range).min(1.0)).max(0.0))
        .sum();
    total / PRESSURE_SCALE
}

/// Sequential writer that sanitizes as it goes and zero-pads on finish
#[derive(Debug)]
struct FeatureWriter {
    values: Observation,
    idx: usize,
}

impl Default for FeatureWriter {
    fn default() -> Self {
        Self { values: [0.0; OBS_SIZE], idx: 0 }
    }
}

impl FeatureWriter {
    fn push(&mut self, value: f64) {
        if self.idx < OBS_SIZE {
            self.values[self.idx] = if value.is_finite() { value.clamp(-1.0, 1.0) } else { 0.0 };
            self.idx += 1;
        }
    }

    fn skip(&mut self, count: usize) {
        for _ in 0..count {
            self.push(0.0);
        }
    }

    fn finish(self) -> Observation {
        self.values
    }
}
