//! Minimal built-in duel arena
//!
//! Two cars start on the left of a walled 1200×800 arena with a goal box on
//! the right. A car wins by reaching the goal or by shooting the other car
//! down. There are no obstacles and no turrets; the arena exists so the
//! trainer, the pool and the binary can run without the real physics
//! engine.

use std::f64::consts::PI;

use glam::DVec2;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{
    Controls, DuelSimulation, HitKind, MatchSetup, Outcome, Perception, RayHit, VehicleState,
    AGENT_COUNT,
};

/// Fixed tick length in seconds
pub const DT: f64 = 1.0 / 60.0;

/// Arena size
pub const ARENA_SIZE: DVec2 = DVec2::new(1200.0, 800.0);

/// Goal box, top-left corner
pub const GOAL_MIN: DVec2 = DVec2::new(1000.0, 350.0);

/// Goal box, bottom-right corner
pub const GOAL_MAX: DVec2 = DVec2::new(1100.0, 450.0);

/// Top speed in px/s
pub const MAX_SPEED: f64 = 360.0;

/// Starting hit points
pub const MAX_HP: f64 = 100.0;

const SPAWNS: [DVec2; AGENT_COUNT] = [DVec2::new(150.0, 250.0), DVec2::new(150.0, 550.0)];
const SPAWN_JITTER: f64 = 20.0;
const ACCELERATION: f64 = 600.0;
const DRAG: f64 = 1.5;
const TURN_RATE: f64 = 3.0;
const VEHICLE_RADIUS: f64 = 14.0;

const BULLET_SPEED: f64 = 600.0;
const BULLET_DAMAGE: f64 = 12.0;
const BULLET_LIFETIME: f64 = 1.5;
const SHOOT_COOLDOWN: f64 = 0.25;

const RAY_ANGLES: [f64; 9] = [-1.2, -0.8, -0.4, -0.2, 0.0, 0.2, 0.4, 0.8, 1.2];
const RAY_RANGE: f64 = 400.0;

#[derive(Debug, Clone)]
struct Car {
    position: DVec2,
    velocity: DVec2,
    heading: f64,
    hp: f64,
    cooldown: f64,
    reached_goal: bool,
}

impl Car {
    fn alive(&self) -> bool {
        self.hp > 0.0
    }
}

#[derive(Debug, Clone)]
struct Bullet {
    owner: usize,
    position: DVec2,
    velocity: DVec2,
    age: f64,
}

/// Walled two-car arena with a goal box and guns
#[derive(Debug, Clone)]
pub struct SprintArena {
    cars: [Car; AGENT_COUNT],
    bullets: Vec<Bullet>,
    tick: u64,
    outcome: Option<Outcome>,
}

impl SprintArena {
    /// Build an arena for one match
    ///
    /// Spawn points get a small seeded jitter; `swap_spawns` exchanges them.
    pub fn new(setup: &MatchSetup) -> Self {
        let mut rng = StdRng::seed_from_u64(setup.seed);
        let mut spawns = SPAWNS;
        if setup.swap_spawns {
            spawns.swap(0, 1);
        }

        let cars = spawns.map(|spawn| Car {
            position: spawn
                + DVec2::new(
                    rng.gen_range(-SPAWN_JITTER..SPAWN_JITTER),
                    rng.gen_range(-SPAWN_JITTER..SPAWN_JITTER),
                ),
            velocity: DVec2::ZERO,
            heading: rng.gen_range(-0.1..0.1),
            hp: MAX_HP,
            cooldown: 0.0,
            reached_goal: false,
        });

        Self { cars, bullets: Vec::new(), tick: 0, outcome: None }
    }

    /// Ticks simulated so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulation clock in seconds
    pub fn time(&self) -> f64 {
        self.tick as f64 * DT
    }

    fn drive(car: &mut Car, controls: &Controls) {
        let throttle = controls.throttle.clamp(-1.0, 1.0);
        let steer = controls.steer.clamp(-1.0, 1.0);

        car.heading = wrap_angle(car.heading + steer * TURN_RATE * DT);
        car.velocity += DVec2::from_angle(car.heading) * throttle * ACCELERATION * DT;
        car.velocity *= 1.0 - DRAG * DT;
        car.velocity = car.velocity.clamp_length_max(MAX_SPEED);
        car.position += car.velocity * DT;

        let min = DVec2::splat(VEHICLE_RADIUS);
        let max = ARENA_SIZE - min;
        let clamped = car.position.clamp(min, max);
        if clamped.x != car.position.x {
            car.velocity.x = 0.0;
        }
        if clamped.y != car.position.y {
            car.velocity.y = 0.0;
        }
        car.position = clamped;

        if in_goal(car.position) {
            car.reached_goal = true;
        }
    }

    fn fire(&mut self, owner: usize, controls: &Controls) {
        let car = &mut self.cars[owner];
        car.cooldown = (car.cooldown - DT).max(0.0);
        if !controls.shoot || car.cooldown > 0.0 {
            return;
        }
        car.cooldown = SHOOT_COOLDOWN;
        let direction = DVec2::from_angle(car.heading + controls.aim_angle);
        self.bullets.push(Bullet {
            owner,
            position: car.position,
            velocity: direction * BULLET_SPEED,
            age: 0.0,
        });
    }

    fn move_bullets(&mut self) {
        let cars = &mut self.cars;
        self.bullets.retain_mut(|bullet| {
            bullet.position += bullet.velocity * DT;
            bullet.age += DT;
            let target = &mut cars[1 - bullet.owner];
            if target.alive() && bullet.position.distance(target.position) <= VEHICLE_RADIUS {
                target.hp = (target.hp - BULLET_DAMAGE).max(0.0);
                return false;
            }
            let inside = bullet.position.cmpge(DVec2::ZERO).all()
                && bullet.position.cmple(ARENA_SIZE).all();
            inside && bullet.age < BULLET_LIFETIME
        });
    }

    fn judge(&self) -> Option<Outcome> {
        let alive = [self.cars[0].alive(), self.cars[1].alive()];
        let claims: [bool; AGENT_COUNT] = std::array::from_fn(|i| {
            alive[i] && (self.cars[i].reached_goal || !alive[1 - i])
        });

        match claims {
            [true, false] => Some(Outcome::Winner(0)),
            [false, true] => Some(Outcome::Winner(1)),
            [true, true] => Some(Outcome::Draw),
            [false, false] if !alive[0] && !alive[1] => Some(Outcome::Draw),
            [false, false] => None,
        }
    }

    fn cast_ray(&self, agent: usize, angle: f64) -> RayHit {
        let origin = self.cars[agent].position;
        let direction = DVec2::from_angle(self.cars[agent].heading + angle);

        let mut best = RayHit { distance: RAY_RANGE, kind: HitKind::None };
        let mut consider = |distance: Option<f64>, kind: HitKind| {
            if let Some(distance) = distance {
                if distance < best.distance {
                    best = RayHit { distance, kind };
                }
            }
        };

        consider(Some(wall_distance(origin, direction)), HitKind::Wall);
        let enemy = &self.cars[1 - agent];
        if enemy.alive() {
            consider(circle_distance(origin, direction, enemy.position, VEHICLE_RADIUS), HitKind::Enemy);
        }
        consider(box_distance(origin, direction, GOAL_MIN, GOAL_MAX), HitKind::Goal);
        best
    }
}

impl DuelSimulation for SprintArena {
    fn perceive(&self, agent: usize) -> Perception {
        let own = &self.cars[agent];
        let enemy = &self.cars[1 - agent];

        let mut projectiles: Vec<DVec2> = self
            .bullets
            .iter()
            .filter(|b| b.owner != agent)
            .map(|b| b.position - own.position)
            .collect();
        projectiles.sort_by(|a, b| a.length_squared().total_cmp(&b.length_squared()));

        Perception {
            hp: own.hp,
            heading: own.heading,
            velocity: own.velocity,
            shoot_cooldown: own.cooldown,
            enemy_hp: enemy.hp,
            enemy_offset: enemy.position - own.position,
            goal_offset: self.goal_center() - own.position,
            projectiles,
            turrets: Vec::new(),
            rays: RAY_ANGLES.iter().map(|&angle| self.cast_ray(agent, angle)).collect(),
            time: self.time(),
        }
    }

    fn step(&mut self, controls: [Controls; AGENT_COUNT]) {
        if self.outcome.is_some() {
            return;
        }

        for (agent, control) in controls.iter().enumerate() {
            if self.cars[agent].alive() {
                Self::drive(&mut self.cars[agent], control);
                self.fire(agent, control);
            }
        }
        self.move_bullets();
        self.tick += 1;
        self.outcome = self.judge();
    }

    fn vehicle(&self, agent: usize) -> VehicleState {
        let car = &self.cars[agent];
        VehicleState {
            position: car.position,
            velocity: car.velocity,
            hp: car.hp,
            reached_goal: car.reached_goal,
        }
    }

    fn goal_center(&self) -> DVec2 {
        (GOAL_MIN + GOAL_MAX) * 0.5
    }

    fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }
}

fn in_goal(position: DVec2) -> bool {
    position.cmpge(GOAL_MIN).all() && position.cmple(GOAL_MAX).all()
}

fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

/// Distance along `direction` (unit) to the arena boundary
fn wall_distance(origin: DVec2, direction: DVec2) -> f64 {
    let axis = |p: f64, d: f64, extent: f64| {
        if d > 0.0 {
            (extent - p) / d
        } else if d < 0.0 {
            -p / d
        } else {
            f64::INFINITY
        }
    };
    axis(origin.x, direction.x, ARENA_SIZE.x).min(axis(origin.y, direction.y, ARENA_SIZE.y))
}

fn circle_distance(origin: DVec2, direction: DVec2, center: DVec2, radius: f64) -> Option<f64> {
    let to_center = center - origin;
    let along = to_center.dot(direction);
    let disc = along * along - (to_center.length_squared() - radius * radius);
    if disc < 0.0 {
        return None;
    }
    let t = along - disc.sqrt();
    (t >= 0.0).then_some(t)
}

/// Slab test against an axis-aligned box
fn box_distance(origin: DVec2, direction: DVec2, min: DVec2, max: DVec2) -> Option<f64> {
    let mut t_near = f64::NEG_INFINITY;
    let mut t_far = f64::INFINITY;
    for (o, d, lo, hi) in [(origin.x, direction.x, min.x, max.x), (origin.y, direction.y, min.y, max.y)] {
        if d == 0.0 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let (a, b) = ((lo - o) / d, (hi - o) / d);
        t_near = t_near.max(a.min(b));
        t_far = t_far.min(a.max(b));
    }
    (t_near <= t_far && t_far >= 0.0).then_some(t_near.max(0.0))
}
