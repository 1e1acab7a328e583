//! Adam optimizer over the flat parameter arena
//!
//! Moments are [`ParamSet`]s shaped like the parameters, so scalar biases
//! go through exactly the same update as every weight.

use crate::policy::ParamSet;

/// Exponential decay of the first moment
pub const BETA1: f64 = 0.9;

/// Exponential decay of the second moment
pub const BETA2: f64 = 0.999;

/// Denominator floor
pub const EPSILON: f64 = 1e-8;

/// Adam state: first and second raw moments plus the step counter
#[derive(Debug, Clone, Default)]
pub struct Adam {
    m: ParamSet,
    v: ParamSet,
    t: u64,
}

impl Adam {
    /// Fresh optimizer state (t = 0, zero moments)
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps taken so far
    pub fn steps(&self) -> u64 {
        self.t
    }

    /// Apply one bias-corrected Adam step
    ///
    /// # Arguments
    /// * `params` - Parameters to update in place
    /// * `grads` - Gradient of the loss with respect to `params`
    /// * `learning_rate` - Step size
    pub fn step(&mut self, params: &mut ParamSet, grads: &ParamSet, learning_rate: f64) {
        self.t += 1;
        let t = self.t as i32;
        let bias_corr1 = 1.0 - BETA1.powi(t);
        let bias_corr2 = 1.0 - BETA2.powi(t);

        let params = params.as_mut_slice();
        let m = self.m.as_mut_slice();
        let v = self.v.as_mut_slice();

        for (i, &g) in grads.as_slice().iter().enumerate() {
            m[i] = BETA1 * m[i] + (1.0 - BETA1) * g;
            v[i] = BETA2 * v[i] + (1.0 - BETA2) * g * g;
            let m_hat = m[i] / bias_corr1;
            let v_hat = v[i] / bias_corr2;
            params[i] -= learning_rate * m_hat / (v_hat.sqrt() + EPSILON);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ParamGroup;

    #[test]
    fn test_zero_gradient_is_a_no_op() {
        let mut params = ParamSet::initialize(3);
        let before = params.clone();
        let mut adam = Adam::new();
        assert_eq!(adam.steps(), 0);

        adam.step(&mut params, &ParamSet::zeros(), 1e-2);
        assert_eq!(params, before);
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        // With bias correction the first step is lr * g / (|g| + eps).
        let mut params = ParamSet::zeros();
        let mut grads = ParamSet::zeros();
        grads.group_mut(ParamGroup::W1)[0] = 4.0;
        grads.group_mut(ParamGroup::W1)[1] = -0.5;

        Adam::new().step(&mut params, &grads, 0.1);
        let w1 = params.group(ParamGroup::W1);
        assert!((w1[0] + 0.1).abs() < 1e-6);
        assert!((w1[1] - 0.1).abs() < 1e-6);
        assert_eq!(w1[2], 0.0);
    }

    #[test]
    fn test_scalar_and_array_entries_update_identically() {
        let mut params = ParamSet::zeros();
        let mut grads = ParamSet::zeros();
        let mut adam = Adam::new();

        for step in 0..5 {
            let g = 0.3 * (step as f64 + 1.0) - 0.7;
            grads.group_mut(ParamGroup::BValue)[0] = g;
            grads.group_mut(ParamGroup::WValue)[7] = g;
            grads.group_mut(ParamGroup::BShoot)[0] = g;
            adam.step(&mut params, &grads, 0.05);
        }

        let array_entry = params.group(ParamGroup::WValue)[7];
        assert_eq!(params.group(ParamGroup::BValue)[0], array_entry);
        assert_eq!(params.group(ParamGroup::BShoot)[0], array_entry);
    }

    #[test]
    fn test_minimizes_a_quadratic() {
        // f(x) = (x - 2)^2 on one coordinate.
        let mut params = ParamSet::zeros();
        let mut grads = ParamSet::zeros();
        let mut adam = Adam::new();
        for _ in 0..2000 {
            let x = params.group(ParamGroup::BMean)[0];
            grads.group_mut(ParamGroup::BMean)[0] = 2.0 * (x - 2.0);
            adam.step(&mut params, &grads, 0.05);
        }
        assert!((params.group(ParamGroup::BMean)[0] - 2.0).abs() < 5e-2);
    }
}
