//! PPO loss and manual backpropagation
//!
//! For one sample the minimized objective is
//!
//! ```text
//! L = -min(ratio · A, clip(ratio, 1-ε, 1+ε) · A)
//!     + value_coef · 0.5 · (V - R)²
//!     - entropy_coef · H_gaussian
//! ```
//!
//! Its gradient is accumulated head by head into a [`ParamSet`] arena and
//! pushed through the shared tanh layer.

use rand::{seq::SliceRandom, Rng};

use super::config::TrainingConfig;
use crate::{
    buffer::Sample,
    policy::{
        network::{self, bernoulli_entropy, gaussian_entropy, log_prob_given_action},
        ParamSet, ACTION_SIZE, HIDDEN_SIZE, OBS_SIZE,
    },
};

/// Per-sample loss terms, reported for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleLoss {
    /// `-min(unclipped, clipped)`
    pub policy_loss: f64,

    /// `0.5 · (V - R)²`
    pub value_loss: f64,

    /// Gaussian plus Bernoulli entropy
    pub entropy: f64,

    /// Whether the trust-region cutoff zeroed the policy gradient
    pub clipped: bool,

    /// `logp_old - logp_new`
    pub approx_kl: f64,
}

/// Coefficient backpropagated through the policy heads
///
/// Zero once the ratio has left the trust region in the direction the
/// advantage pushes it, `-advantage · ratio` otherwise.
pub fn policy_gradient_coefficient(ratio: f64, advantage: f64, clip_ratio: f64) -> f64 {
    let cut_off = (advantage >= 0.0 && ratio > 1.0 + clip_ratio)
        || (advantage < 0.0 && ratio < 1.0 - clip_ratio);
    if cut_off {
        0.0
    } else {
        -advantage * ratio
    }
}

/// Add the gradient of one sample's loss into `grads`
///
/// Uses the sample's normalized advantage. `grads` is summed into, never
/// cleared; the trainer zeroes and scales it per minibatch.
pub fn accumulate_gradients(
    params: &ParamSet,
    grads: &mut ParamSet,
    sample: &Sample,
    config: &TrainingConfig,
) -> SampleLoss {
    let transition = &sample.transition;
    let eval = network::evaluate(params, &transition.observation);
    let log_prob = log_prob_given_action(&eval, &transition.raw_action, transition.shoot);

    let ratio = (log_prob - transition.log_prob).exp();
    let advantage = sample.norm_advantage;
    let clip = config.clip_ratio;
    let unclipped = ratio * advantage;
    let clipped = ratio.clamp(1.0 - clip, 1.0 + clip) * advantage;
    let coef = policy_gradient_coefficient(ratio, advantage, clip);

    let p = params.view();
    let mut g = grads.view_mut();
    let hidden = &eval.hidden;
    let mut grad_hidden = [0.0; HIDDEN_SIZE];

    for i in 0..ACTION_SIZE {
        let diff = transition.raw_action[i] - eval.mean[i];
        let variance = (2.0 * eval.log_std[i]).exp();
        let grad_mean = coef * diff / variance;
        let row = i * HIDDEN_SIZE;
        for h in 0..HIDDEN_SIZE {
            g.w_mean[row + h] += grad_mean * hidden[h];
            grad_hidden[h] += grad_mean * p.w_mean[row + h];
        }
        g.b_mean[i] += grad_mean;
        g.log_std[i] += coef * (diff * diff / variance - 1.0) - config.entropy_coef;
    }

    let shoot_label = if transition.shoot { 1.0 } else { 0.0 };
    let grad_shoot = coef * (shoot_label - eval.shoot_prob);
    for h in 0..HIDDEN_SIZE {
        g.w_shoot[h] += grad_shoot * hidden[h];
        grad_hidden[h] += grad_shoot * p.w_shoot[h];
    }
    *g.b_shoot += grad_shoot;

    let value_err = eval.value - sample.ret;
    let grad_value = value_err * config.value_coef;
    for h in 0..HIDDEN_SIZE {
        g.w_value[h] += grad_value * hidden[h];
        grad_hidden[h] += grad_value * p.w_value[h];
    }
    *g.b_value += grad_value;

    for h in 0..HIDDEN_SIZE {
        let dz = grad_hidden[h] * (1.0 - hidden[h] * hidden[h]);
        let row = h * OBS_SIZE;
        for (j, &x) in transition.observation.iter().enumerate() {
            g.w1[row + j] += dz * x;
        }
        g.b1[h] += dz;
    }

    SampleLoss {
        policy_loss: -unclipped.min(clipped),
        value_loss: 0.5 * value_err * value_err,
        entropy: gaussian_entropy(&eval.log_std) + bernoulli_entropy(eval.shoot_prob),
        clipped: coef == 0.0 && advantage != 0.0,
        approx_kl: transition.log_prob - log_prob,
    }
}

/// Shuffle `0..buffer_size` and split it into minibatches
///
/// The last minibatch may be shorter than `batch_size`.
pub fn generate_minibatch_indices<R: Rng + ?Sized>(
    buffer_size: usize,
    batch_size: usize,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    let mut indices: Vec<usize> = (0..buffer_size).collect();
    indices.shuffle(rng);

    indices.chunks(batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        buffer::Transition,
        policy::{network::evaluate, ParamGroup},
    };

    #[test]
    fn test_coefficient_cuts_off_exactly_at_clip_boundary() {
        let clip = 0.2;
        let advantage = 1.5;
        assert_eq!(policy_gradient_coefficient(1.0, advantage, clip), -1.5);
        assert!(policy_gradient_coefficient(1.2, advantage, clip) != 0.0);
        assert!(policy_gradient_coefficient(1.199_999, advantage, clip) != 0.0);
        assert_eq!(policy_gradient_coefficient(1.200_001, advantage, clip), 0.0);
        assert_eq!(policy_gradient_coefficient(3.0, advantage, clip), 0.0);
        // Below the lower bound a positive advantage still pulls.
        assert!(policy_gradient_coefficient(0.5, advantage, clip) != 0.0);
    }

    #[test]
    fn test_coefficient_negative_advantage() {
        let clip = 0.2;
        assert!(policy_gradient_coefficient(0.81, -1.0, clip) != 0.0);
        assert_eq!(policy_gradient_coefficient(0.79, -1.0, clip), 0.0);
        assert!(policy_gradient_coefficient(2.0, -1.0, clip) != 0.0);
    }

    #[test]
    fn test_minibatch_indices_cover_everything_once() {
        let mut rng = StdRng::seed_from_u64(0);
        let batches = generate_minibatch_indices(10, 4, &mut rng);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);

        let mut all: Vec<usize> = batches.concat();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    fn make_sample(params: &ParamSet) -> Sample {
        let mut observation = [0.0; OBS_SIZE];
        for (i, x) in observation.iter_mut().enumerate() {
            *x = ((i as f64) * 0.71).cos() * 0.8;
        }
        let raw_action = [0.3, -0.6, 0.9];
        let shoot = true;
        let eval = evaluate(params, &observation);
        // Old log-prob equal to the current one puts the ratio at exactly 1.
        let log_prob = log_prob_given_action(&eval, &raw_action, shoot);
        Sample {
            transition: Transition {
                observation,
                raw_action,
                shoot,
                log_prob,
                value: eval.value,
                reward: 1.0,
                done: true,
            },
            advantage: 0.7,
            ret: 1.3,
            norm_advantage: 0.7,
        }
    }

    /// Objective whose gradient `accumulate_gradients` produces.
    fn objective(params: &ParamSet, sample: &Sample, config: &TrainingConfig) -> f64 {
        let t = &sample.transition;
        let eval = evaluate(params, &t.observation);
        let ratio = (log_prob_given_action(&eval, &t.raw_action, t.shoot) - t.log_prob).exp();
        let value_err = eval.value - sample.ret;
        -ratio * sample.norm_advantage + 0.5 * config.value_coef * value_err * value_err
            - config.entropy_coef * gaussian_entropy(&eval.log_std)
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let params = ParamSet::initialize(21);
        let sample = make_sample(&params);
        let config = TrainingConfig::default();

        let mut grads = ParamSet::zeros();
        let loss = accumulate_gradients(&params, &mut grads, &sample, &config);
        assert!(!loss.clipped);
        assert!(loss.approx_kl.abs() < 1e-12);

        let probes = [
            (ParamGroup::W1, 0),
            (ParamGroup::W1, 5 * OBS_SIZE + 17),
            (ParamGroup::B1, 9),
            (ParamGroup::WMean, HIDDEN_SIZE + 3),
            (ParamGroup::BMean, 2),
            (ParamGroup::LogStd, 1),
            (ParamGroup::WShoot, 11),
            (ParamGroup::BShoot, 0),
            (ParamGroup::WValue, 30),
            (ParamGroup::BValue, 0),
        ];

        let h = 1e-6;
        for (group, index) in probes {
            let mut plus = params.clone();
            plus.group_mut(group)[index] += h;
            let mut minus = params.clone();
            minus.group_mut(group)[index] -= h;
            let numeric =
                (objective(&plus, &sample, &config) - objective(&minus, &sample, &config)) / (2.0 * h);
            let analytic = grads.group(group)[index];
            assert!(
                (numeric - analytic).abs() < 1e-4 * (1.0 + numeric.abs()),
                "{}[{}]: analytic {} vs numeric {}",
                group.name(),
                index,
                analytic,
                numeric
            );
        }
    }

    #[test]
    fn test_clipped_sample_only_moves_value_and_entropy() {
        let params = ParamSet::initialize(4);
        let mut sample = make_sample(&params);
        // Pretend the old policy was much less likely to act this way.
        sample.transition.log_prob -= 1.0;
        let config = TrainingConfig::default();

        let mut grads = ParamSet::zeros();
        let loss = accumulate_gradients(&params, &mut grads, &sample, &config);
        assert!(loss.clipped);
        assert!(grads.group(ParamGroup::WMean).iter().all(|&g| g == 0.0));
        assert!(grads.group(ParamGroup::WShoot).iter().all(|&g| g == 0.0));
        assert!(grads
            .group(ParamGroup::LogStd)
            .iter()
            .all(|&g| g == -config.entropy_coef));
        assert!(grads.group(ParamGroup::BValue)[0] != 0.0);
        // Reported loss uses the clipped surrogate.
        assert!((loss.policy_loss + 1.2 * 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_accumulation_sums_into_existing_gradients() {
        let params = ParamSet::initialize(8);
        let sample = make_sample(&params);
        let config = TrainingConfig::default();

        let mut once = ParamSet::zeros();
        accumulate_gradients(&params, &mut once, &sample, &config);
        let mut twice = ParamSet::zeros();
        accumulate_gradients(&params, &mut twice, &sample, &config);
        accumulate_gradients(&params, &mut twice, &sample, &config);

        once.scale(2.0);
        for (a, b) in once.as_slice().iter().zip(twice.as_slice()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
