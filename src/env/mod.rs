//! Simulation contract for the two-vehicle duel
//!
//! The trainer never sees physics. It drives a [`DuelSimulation`] one fixed
//! tick at a time: perceive both agents, decide controls for both, step,
//! then read the vehicle state needed for reward shaping and check the
//! outcome.

use glam::DVec2;

pub mod sprint;

/// Number of agent slots in a match
pub const AGENT_COUNT: usize = 2;

/// Per-tick controls for one vehicle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Controls {
    /// Throttle in [-1, 1]
    pub throttle: f64,

    /// Steering in [-1, 1]
    pub steer: f64,

    /// Whether to fire this tick
    pub shoot: bool,

    /// Turret angle relative to the vehicle heading, in radians
    pub aim_angle: f64,
}

/// What a vision ray ran into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HitKind {
    /// Nothing within range
    #[default]
    None,
    /// Arena boundary or obstacle
    Wall,
    /// The opposing vehicle
    Enemy,
    /// A stationary turret
    Turret,
    /// The goal zone
    Goal,
}

impl HitKind {
    /// Numeric code written into the observation vector
    pub fn code(self) -> f64 {
        match self {
            HitKind::None => 0.0,
            HitKind::Wall => 1.0,
            HitKind::Enemy => -0.5,
            HitKind::Turret => 0.5,
            HitKind::Goal => 0.2,
        }
    }
}

/// One vision ray result
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RayHit {
    /// Distance to the first hit (or the ray length when nothing was hit)
    pub distance: f64,

    /// Kind of object hit
    pub kind: HitKind,
}

/// Raw perception handed to the decision step
///
/// Offsets are measured from the perceiving vehicle. Velocity and heading
/// are in the arena frame, so the observation builder can rotate them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Perception {
    /// Own hit points (0..=100)
    pub hp: f64,

    /// Own heading in radians
    pub heading: f64,

    /// Own velocity
    pub velocity: DVec2,

    /// Seconds until the gun can fire again
    pub shoot_cooldown: f64,

    /// Opponent hit points
    pub enemy_hp: f64,

    /// Offset to the opponent
    pub enemy_offset: DVec2,

    /// Offset to the goal center
    pub goal_offset: DVec2,

    /// Offsets to nearby hostile projectiles, nearest first
    pub projectiles: Vec<DVec2>,

    /// Offsets to nearby turrets, nearest first
    pub turrets: Vec<DVec2>,

    /// Vision rays, fanned left to right
    pub rays: Vec<RayHit>,

    /// Simulation clock in seconds
    pub time: f64,
}

/// Vehicle state read after each tick for reward shaping
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VehicleState {
    /// Arena position
    pub position: DVec2,

    /// Arena velocity
    pub velocity: DVec2,

    /// Hit points
    pub hp: f64,

    /// Whether this vehicle has entered the goal zone
    pub reached_goal: bool,
}

/// Final result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Agent slot that won
    Winner(usize),
    /// Nobody won
    Draw,
}

/// Per-match construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSetup {
    /// Seed for any randomness inside the simulation
    pub seed: u64,

    /// Whether the two agents start from each other's spawn points
    pub swap_spawns: bool,
}

/// A two-agent simulation advanced in fixed ticks
pub trait DuelSimulation {
    /// Raw perception for one agent slot
    fn perceive(&self, agent: usize) -> Perception;

    /// Advance the simulation one tick with both agents' controls
    fn step(&mut self, controls: [Controls; AGENT_COUNT]);

    /// Vehicle state for one agent slot
    fn vehicle(&self, agent: usize) -> VehicleState;

    /// Center of the goal zone
    fn goal_center(&self) -> DVec2;

    /// `Some` once the match has ended
    fn outcome(&self) -> Option<Outcome>;
}

/// Builds a fresh simulation for every match
///
/// Implemented for any `Fn(&MatchSetup) -> S` closure so callers can pass
/// a constructor directly.
pub trait SimulationFactory: Send + Sync + 'static {
    /// Simulation type produced
    type Sim: DuelSimulation;

    /// Create a simulation for one match
    fn create(&self, setup: &MatchSetup) -> Self::Sim;
}

impl<F, S> SimulationFactory for F
where
    F: Fn(&MatchSetup) -> S + Send + Sync + 'static,
    S: DuelSimulation,
{
    type Sim = S;

    fn create(&self, setup: &MatchSetup) -> S {
        self(setup)
    }
}
