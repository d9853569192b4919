use rand::Rng;
use rand::rngs::StdRng;

use crate::optimizer::pareto::select_from_front;
use crate::state::{GepaState, ProgramIdx};

/// Picks the parent program for the next mutation.
#[derive(Debug, Clone, Default)]
pub enum CandidateSelector {
    /// Coverage-weighted draw from the Pareto fronts. Keeps specialists in
    /// play instead of collapsing onto the single best average.
    #[default]
    Pareto,
    /// Always the best program by aggregate score; ties go to the lower
    /// index.
    CurrentBest,
    /// With probability `epsilon` pick uniformly at random, otherwise the
    /// current best.
    EpsilonGreedy { epsilon: f32 },
}

impl CandidateSelector {
    pub fn select(&self, state: &GepaState, rng: &mut StdRng) -> ProgramIdx {
        match self {
            Self::Pareto => {
                let scores = state.aggregate_scores();
                select_from_front(state.pareto_set(), &scores, rng)
                    .unwrap_or_else(|| current_best(state))
            }
            Self::CurrentBest => current_best(state),
            Self::EpsilonGreedy { epsilon } => {
                let roll: f32 = rng.gen_range(0.0..1.0);
                if roll < *epsilon {
                    rng.gen_range(0..state.num_programs())
                } else {
                    current_best(state)
                }
            }
        }
    }
}

fn current_best(state: &GepaState) -> ProgramIdx {
    let mut best = 0;
    for p in 1..state.num_programs() {
        if state.aggregate_score(p) > state.aggregate_score(best) {
            best = p;
        }
    }
    best
}
