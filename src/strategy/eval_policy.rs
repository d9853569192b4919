use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::data::ExampleId;
use crate::state::{GepaState, ProgramIdx};

/// Decides which validation IDs an accepted candidate is scored on, and
/// which program counts as "best" at the end of a run.
#[derive(Debug, Clone, Default)]
pub enum EvaluationPolicy {
    /// Every accepted candidate is scored on the whole validation set.
    #[default]
    Full,
    /// Accepted candidates start on a prefix of the validation set and earn
    /// wider evaluation as they prove themselves.
    Incremental(IncrementalPolicy),
}

#[derive(Debug, Clone)]
pub struct IncrementalPolicy {
    pub initial_n: usize,
    pub step: usize,
    pub max_n: usize,
    pub threshold: f32,
    evaluated: BTreeMap<ProgramIdx, usize>,
}

impl IncrementalPolicy {
    pub fn new(initial_n: usize, step: usize, max_n: usize, threshold: f32) -> Self {
        Self {
            initial_n,
            step,
            max_n,
            threshold,
            evaluated: BTreeMap::new(),
        }
    }
}

impl EvaluationPolicy {
    pub fn incremental(initial_n: usize, step: usize, max_n: usize, threshold: f32) -> Self {
        Self::Incremental(IncrementalPolicy::new(initial_n, step, max_n, threshold))
    }

    /// Validation IDs to evaluate `program` on. For the incremental policy
    /// the first call gets a deterministic prefix of `initial_n` ids; each
    /// later call grows it by `step`, switching to the full set once the
    /// program's aggregate clears `threshold` or `max_n` ids were covered.
    pub fn eval_ids(
        &mut self,
        state: &GepaState,
        program: ProgramIdx,
        valset_ids: &[ExampleId],
    ) -> Vec<ExampleId> {
        match self {
            Self::Full => valset_ids.to_vec(),
            Self::Incremental(policy) => {
                let full = valset_ids.len();
                let count = match policy.evaluated.get(&program) {
                    None => policy.initial_n,
                    Some(&previous) => {
                        let aggregate = if program < state.num_programs() {
                            state.aggregate_score(program)
                        } else {
                            0.0
                        };
                        if aggregate > policy.threshold || previous >= policy.max_n {
                            full
                        } else {
                            previous + policy.step
                        }
                    }
                }
                .min(full);
                policy.evaluated.insert(program, count);
                valset_ids[..count].to_vec()
            }
        }
    }

    /// Best program: highest aggregate score, ties broken by more examples
    /// evaluated, then by lower index.
    pub fn best_program(&self, state: &GepaState) -> ProgramIdx {
        let mut best = 0;
        for p in 1..state.num_programs() {
            let ordering = state
                .aggregate_score(p)
                .total_cmp(&state.aggregate_score(best))
                .then_with(|| {
                    state
                        .val_subscores_of(p)
                        .len()
                        .cmp(&state.val_subscores_of(best).len())
                });
            if ordering == Ordering::Greater {
                best = p;
            }
        }
        best
    }
}
