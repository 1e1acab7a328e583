//! Head-to-head evaluation between two brains
//!
//! Matches are independent, so they run on the rayon pool. Nothing is
//! recorded for training; each brain just samples its own decisions. Seats
//! alternate with the match seed so neither brain always gets the same
//! spawn.

use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;

use crate::{
    env::{DuelSimulation, MatchSetup, Outcome, SimulationFactory, AGENT_COUNT},
    policy::{FeatureExtractor, ParamSet, Policy},
};

/// Seed stride between consecutive evaluation matches
const SEED_STRIDE: u64 = 997;

/// Result tally, from brain A's side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalSummary {
    /// Matches played
    pub matches: usize,

    /// Matches won by brain A
    pub wins_a: usize,

    /// Matches won by brain B
    pub wins_b: usize,

    /// Draws and timeouts
    pub draws: usize,
}

impl EvalSummary {
    /// Brain A's score with draws counted as half a win
    pub fn score_a(&self) -> f64 {
        if self.matches == 0 {
            return 0.5;
        }
        (self.wins_a as f64 + 0.5 * self.draws as f64) / self.matches as f64
    }

    fn merge(self, other: Self) -> Self {
        Self {
            matches: self.matches + other.matches,
            wins_a: self.wins_a + other.wins_a,
            wins_b: self.wins_b + other.wins_b,
            draws: self.draws + other.draws,
        }
    }
}

/// Which brain won a single evaluation match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    A,
    B,
    Draw,
}

/// Play `matches` games of brain `a` against brain `b` in parallel
///
/// Match `i` uses seed `base_seed + i * 997`; on odd seeds brain A takes
/// slot 1. Hitting `max_ticks` is a draw.
pub fn evaluate_head_to_head<F: SimulationFactory>(
    factory: &F,
    a: &ParamSet,
    b: &ParamSet,
    matches: usize,
    base_seed: u64,
    max_ticks: usize,
) -> EvalSummary {
    let summary = (0..matches)
        .into_par_iter()
        .map(|i| {
            let seed = base_seed.wrapping_add(i as u64 * SEED_STRIDE);
            let verdict = play(factory, a, b, seed, max_ticks);
            EvalSummary {
                matches: 1,
                wins_a: usize::from(verdict == Verdict::A),
                wins_b: usize::from(verdict == Verdict::B),
                draws: usize::from(verdict == Verdict::Draw),
            }
        })
        .reduce(EvalSummary::default, EvalSummary::merge);

    tracing::info!(
        "Evaluation: {} matches, A {} / B {} / draw {} (score {:.3})",
        summary.matches,
        summary.wins_a,
        summary.wins_b,
        summary.draws,
        summary.score_a()
    );
    summary
}

fn play<F: SimulationFactory>(
    factory: &F,
    a: &ParamSet,
    b: &ParamSet,
    seed: u64,
    max_ticks: usize,
) -> Verdict {
    let a_slot = usize::from(seed & 1 == 1);
    let seats: [&ParamSet; AGENT_COUNT] = if a_slot == 0 { [a, b] } else { [b, a] };

    let mut sim = factory.create(&MatchSetup { seed, swap_spawns: false });
    let mut extractors: [FeatureExtractor; AGENT_COUNT] = Default::default();
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..max_ticks {
        let controls = std::array::from_fn(|slot| {
            let observation = extractors[slot].observe(&sim.perceive(slot));
            seats[slot].sample(&observation, &mut rng).controls
        });
        sim.step(controls);

        match sim.outcome() {
            Some(Outcome::Winner(slot)) if slot == a_slot => return Verdict::A,
            Some(Outcome::Winner(_)) => return Verdict::B,
            Some(Outcome::Draw) => return Verdict::Draw,
            None => {}
        }
    }
    Verdict::Draw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::sprint::SprintArena;

    #[test]
    fn test_every_match_is_counted_once() {
        let a = ParamSet::initialize(1);
        let b = ParamSet::initialize(2);
        let summary = evaluate_head_to_head(&SprintArena::new, &a, &b, 6, 100, 120);

        assert_eq!(summary.matches, 6);
        assert_eq!(summary.wins_a + summary.wins_b + summary.draws, 6);
        assert!((0.0..=1.0).contains(&summary.score_a()));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let a = ParamSet::initialize(3);
        let b = ParamSet::initialize(4);
        let first = evaluate_head_to_head(&SprintArena::new, &a, &b, 4, 7, 200);
        let second = evaluate_head_to_head(&SprintArena::new, &a, &b, 4, 7, 200);
        assert_eq!(first, second);
    }

    #[test]
    fn test_short_matches_are_draws() {
        let brain = ParamSet::initialize(5);
        let summary = evaluate_head_to_head(&SprintArena::new, &brain, &brain, 3, 0, 1);
        assert_eq!(summary.draws, 3);
        assert_eq!(summary.score_a(), 0.5);
        assert_eq!(EvalSummary::default().score_a(), 0.5);
    }
}
