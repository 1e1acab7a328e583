//! One self-play match, tick by tick

use crate::{
    buffer::ExperienceBuffer,
    env::{DuelSimulation, MatchSetup, Outcome, SimulationFactory},
    policy::Policy,
};

/// How a match left the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// The simulation declared an outcome
    Finished(Outcome),

    /// The tick limit ran out; scored as a draw
    TimedOut,

    /// An abort arrived; everything recorded for the match was discarded
    Aborted,
}

/// Run one match with both slots driven by `buffer`'s policy.
///
/// `should_abort` is polled before every tick, so an abort lets the current
/// tick finish and then throws the match away.
pub fn run_match<F, P>(
    factory: &F,
    buffer: &mut ExperienceBuffer<P>,
    setup: &MatchSetup,
    max_ticks: usize,
    should_abort: &mut dyn FnMut() -> bool,
) -> MatchResult
where
    F: SimulationFactory + ?Sized,
    P: Policy,
{
    let mut sim = factory.create(setup);
    buffer.bind_game(&sim);

    for _ in 0..max_ticks {
        if should_abort() {
            buffer.abandon_episode();
            return MatchResult::Aborted;
        }

        let controls = std::array::from_fn(|slot| buffer.decide(slot, &sim.perceive(slot)));
        sim.step(controls);
        buffer.after_step(&sim);

        if let Some(outcome) = sim.outcome() {
            buffer.finalize_episode(Some(outcome));
            return MatchResult::Finished(outcome);
        }
    }

    buffer.finalize_episode(None);
    MatchResult::TimedOut
}
