//! Forward pass, sampling and log-probabilities for the actor-critic network
//!
//! ```text
//! hidden     = tanh(W1 · obs + b1)
//! mean       = Wmean · hidden + bmean
//! shoot_prob = sigmoid(Wshoot · hidden + bshoot)
//! value      = Wvalue · hidden + bvalue
//! ```
//!
//! `log_std` is a free parameter per action component, independent of the
//! observation. Gradients are not produced here; the trainer backpropagates
//! through the [`PolicyEval`] it gets from [`evaluate`].

use std::f64::consts::{E, PI};

use rand::Rng;

use super::{
    observation::Observation,
    params::{ParamSet, ACTION_SIZE, HIDDEN_SIZE},
};
use crate::env::Controls;

/// Multiplier applied to the clamped aim component
pub const AIM_SCALE: f64 = 1.35;

/// Floor inside the Bernoulli logarithms
pub const PROB_EPS: f64 = 1e-6;

fn log_two_pi() -> f64 {
    (2.0 * PI).ln()
}

fn half_log_two_pi_e() -> f64 {
    0.5 * (2.0 * PI * E).ln()
}

/// Output of one forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyEval {
    /// Post-tanh hidden activations
    pub hidden: [f64; HIDDEN_SIZE],

    /// Gaussian means
    pub mean: [f64; ACTION_SIZE],

    /// Gaussian log standard deviations
    pub log_std: [f64; ACTION_SIZE],

    /// Shoot logit before the sigmoid
    pub shoot_logit: f64,

    /// Probability of firing
    pub shoot_prob: f64,

    /// Critic estimate
    pub value: f64,
}

/// A sampled decision
#[derive(Debug, Clone, PartialEq)]
pub struct PolicySample {
    /// Unclamped Gaussian draw, the basis for stored log-probabilities
    pub raw_action: [f64; ACTION_SIZE],

    /// Action clamped to [-1, 1]
    pub action: [f64; ACTION_SIZE],

    /// Bernoulli shoot draw
    pub shoot: bool,

    /// Joint log-probability of `raw_action` and `shoot`
    pub log_prob: f64,

    /// Critic estimate at decision time
    pub value: f64,

    /// Controls handed to the simulation
    pub controls: Controls,
}

/// Run the network on one observation
pub fn evaluate(params: &ParamSet, observation: &Observation) -> PolicyEval {
    let p = params.view();

    let mut hidden = [0.0; HIDDEN_SIZE];
    dense(p.w1, p.b1, observation, &mut hidden);
    for h in &mut hidden {
        *h = h.tanh();
    }

    let mut mean = [0.0; ACTION_SIZE];
    dense(p.w_mean, p.b_mean, &hidden, &mut mean);

    let mut log_std = [0.0; ACTION_SIZE];
    log_std.copy_from_slice(p.log_std);

    let shoot_logit = p.b_shoot + dot(p.w_shoot, &hidden);
    let value = p.b_value + dot(p.w_value, &hidden);

    PolicyEval {
        hidden,
        mean,
        log_std,
        shoot_logit,
        shoot_prob: sigmoid(shoot_logit),
        value,
    }
}

/// Draw an action from an already evaluated distribution
pub fn sample_from_eval<R: Rng + ?Sized>(eval: &PolicyEval, rng: &mut R) -> PolicySample {
    let mut raw_action = [0.0; ACTION_SIZE];
    let mut log_prob = 0.0;

    for i in 0..ACTION_SIZE {
        let raw = eval.mean[i] + normal_sample(rng) * eval.log_std[i].exp();
        raw_action[i] = raw;
        log_prob += gaussian_log_prob(raw, eval.mean[i], eval.log_std[i]);
    }

    let shoot = rng.gen::<f64>() < eval.shoot_prob;
    log_prob += bernoulli_log_prob(eval.shoot_prob, shoot);

    let action = raw_action.map(|a| a.clamp(-1.0, 1.0));

    PolicySample {
        raw_action,
        action,
        shoot,
        log_prob,
        value: eval.value,
        controls: action_to_controls(&action, shoot),
    }
}

/// Evaluate and sample in one go
pub fn sample<R: Rng + ?Sized>(
    params: &ParamSet,
    observation: &Observation,
    rng: &mut R,
) -> PolicySample {
    sample_from_eval(&evaluate(params, observation), rng)
}

/// Log-probability of a stored raw action under a (possibly newer) evaluation
pub fn log_prob_given_action(eval: &PolicyEval, raw_action: &[f64; ACTION_SIZE], shoot: bool) -> f64 {
    let gaussian: f64 = (0..ACTION_SIZE)
        .map(|i| gaussian_log_prob(raw_action[i], eval.mean[i], eval.log_std[i]))
        .sum();
    gaussian + bernoulli_log_prob(eval.shoot_prob, shoot)
}

/// Log-density of `x` under Normal(mean, exp(log_std))
pub fn gaussian_log_prob(x: f64, mean: f64, log_std: f64) -> f64 {
    let variance = (2.0 * log_std).exp();
    let diff = x - mean;
    -0.5 * (diff * diff / variance + 2.0 * log_std + log_two_pi())
}

/// Closed-form entropy of a diagonal Gaussian, summed over dimensions
pub fn gaussian_entropy(log_std: &[f64]) -> f64 {
    log_std.iter().map(|ls| ls + half_log_two_pi_e()).sum()
}

/// Entropy of the shoot Bernoulli
pub fn bernoulli_entropy(p: f64) -> f64 {
    -(p * (p + PROB_EPS).ln() + (1.0 - p) * (1.0 - p + PROB_EPS).ln())
}

fn bernoulli_log_prob(p: f64, shoot: bool) -> f64 {
    if shoot {
        (p + PROB_EPS).ln()
    } else {
        (1.0 - p + PROB_EPS).ln()
    }
}

/// Map a clamped action vector onto simulation controls
pub fn action_to_controls(action: &[f64; ACTION_SIZE], shoot: bool) -> Controls {
    Controls {
        throttle: action[0].clamp(-1.0, 1.0),
        steer: action[1].clamp(-1.0, 1.0),
        shoot,
        aim_angle: action[2].clamp(-1.0, 1.0) * AIM_SCALE,
    }
}

/// Standard normal draw via Box–Muller
pub fn normal_sample<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u = nonzero_uniform(rng);
    let v = nonzero_uniform(rng);
    (-2.0 * u.ln()).sqrt() * (2.0 * PI * v).cos()
}

fn nonzero_uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    loop {
        let x: f64 = rng.gen();
        if x > 0.0 {
            return x;
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Row-major `out = weights · input + bias`
fn dense(weights: &[f64], bias: &[f64], input: &[f64], out: &mut [f64]) {
    let in_size = input.len();
    debug_assert_eq!(weights.len(), out.len() * in_size);
    for (o, slot) in out.iter_mut().enumerate() {
        *slot = bias[o] + dot(&weights[o * in_size..(o + 1) * in_size], input);
    }
}
