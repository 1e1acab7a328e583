//! Generalized Advantage Estimation
//!
//! ```text
//! δ_t = r_t + γ · V_{t+1} · (1 - done_t) - V_t
//! A_t = δ_t + γ · λ · A_{t+1} · (1 - done_t)
//! R_t = A_t + V_t
//! ```
//!
//! The recursion runs backward over one agent's trajectory, which may hold
//! several episodes back to back. A terminal flag cuts both the bootstrap
//! value and the running advantage, and the final step bootstraps from
//! nothing (`V = 0`, `A = 0`).

/// Compute advantages and returns for one trajectory
///
/// # Arguments
/// * `rewards` - Shaped reward per step
/// * `values` - Critic estimate per step
/// * `dones` - Terminal flag per step
/// * `gamma` - Discount factor
/// * `lambda` - GAE lambda
///
/// # Returns
/// `(advantages, returns)`, each the same length as `rewards`
pub fn compute_gae(
    rewards: &[f64],
    values: &[f64],
    dones: &[bool],
    gamma: f64,
    lambda: f64,
) -> (Vec<f64>, Vec<f64>) {
    let n = rewards.len();
    debug_assert_eq!(values.len(), n);
    debug_assert_eq!(dones.len(), n);

    let mut advantages = vec![0.0; n];
    let mut returns = vec![0.0; n];
    let mut next_value = 0.0;
    let mut next_advantage = 0.0;

    for t in (0..n).rev() {
        let not_done = if dones[t] { 0.0 } else { 1.0 };
        let delta = rewards[t] + gamma * next_value * not_done - values[t];
        let advantage = delta + gamma * lambda * next_advantage * not_done;

        advantages[t] = advantage;
        returns[t] = advantage + values[t];

        next_advantage = advantage;
        next_value = values[t];
    }

    (advantages, returns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_terminal_step() {
        let (adv, ret) = compute_gae(&[2.5], &[0.75], &[true], 0.99, 0.95);
        assert_eq!(adv, vec![2.5 - 0.75]);
        assert_eq!(ret, vec![2.5]);
    }

    #[test]
    fn test_undiscounted_returns_sum_future_rewards() {
        let (_, ret) = compute_gae(&[1.0, 1.0, 1.0], &[0.0; 3], &[false, false, true], 1.0, 1.0);
        assert_eq!(ret, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn test_episode_boundary_stops_bootstrap() {
        // Two one-step episodes back to back: neither sees the other.
        let (adv, ret) = compute_gae(&[1.0, 5.0], &[0.5, 2.0], &[true, true], 0.9, 0.9);
        assert_eq!(adv, vec![0.5, 3.0]);
        assert_eq!(ret, vec![1.0, 5.0]);
    }

    #[test]
    fn test_discounted_two_step() {
        let gamma = 0.9;
        let lambda = 0.5;
        let (adv, ret) = compute_gae(&[1.0, 2.0], &[0.5, 1.0], &[false, true], gamma, lambda);

        let adv1 = 2.0 - 1.0;
        let delta0 = 1.0 + gamma * 1.0 - 0.5;
        let adv0 = delta0 + gamma * lambda * adv1;
        assert!((adv[1] - adv1).abs() < 1e-12);
        assert!((adv[0] - adv0).abs() < 1e-12);
        assert!((ret[0] - (adv0 + 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_empty_trajectory() {
        let (adv, ret) = compute_gae(&[], &[], &[], 0.99, 0.95);
        assert!(adv.is_empty());
        assert!(ret.is_empty());
    }
}
