//! Actor-critic policy
//!
//! One fixed topology: a single tanh hidden layer shared by a diagonal
//! Gaussian head (throttle, steer, aim), a Bernoulli shoot head and a
//! scalar value head. Parameters live in a flat [`ParamSet`] arena and all
//! evaluation is done by pure functions over it.

pub mod network;
pub mod observation;
pub mod params;
pub mod store;

use rand::Rng;

pub use network::{PolicyEval, PolicySample};
pub use observation::{FeatureExtractor, Observation};
pub use params::{ParamGroup, ParamSet, ACTION_SIZE, HIDDEN_SIZE, OBS_SIZE};

/// Anything that can evaluate and sample the duel action distribution
pub trait Policy: Send + Sync {
    /// Forward pass
    fn evaluate(&self, observation: &Observation) -> PolicyEval;

    /// Draw a decision
    fn sample<R: Rng + ?Sized>(&self, observation: &Observation, rng: &mut R) -> PolicySample {
        network::sample_from_eval(&self.evaluate(observation), rng)
    }
}

impl Policy for ParamSet {
    fn evaluate(&self, observation: &Observation) -> PolicyEval {
        network::evaluate(self, observation)
    }
}
