use std::time::{Duration, Instant};

use crate::state::GepaState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    Any,
    All,
}

/// When to end the run. Checked once per iteration boundary.
///
/// Conditions are monotonic: once one reports true it keeps reporting true,
/// so the engine may cache the verdict. The conditions configured on the
/// engine are OR'd; use [`StopCondition::all`] for conjunction.
#[derive(Debug, Clone)]
pub enum StopCondition {
    /// Total per-example evaluations reached `limit`.
    MaxCalls { limit: usize },
    /// Wall-clock bound, measured from the first check on a monotonic clock.
    Timeout {
        limit: Duration,
        started: Option<Instant>,
    },
    /// No new best aggregate (by at least `min_delta`) for `patience`
    /// consecutive checks.
    NoImprovement {
        patience: usize,
        min_delta: f32,
        best: Option<f32>,
        idle: usize,
        fired: bool,
    },
    Composite {
        mode: CompositeMode,
        conditions: Vec<StopCondition>,
    },
}

impl StopCondition {
    pub fn max_calls(limit: usize) -> Self {
        Self::MaxCalls { limit }
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout {
            limit,
            started: None,
        }
    }

    pub fn no_improvement(patience: usize, min_delta: f32) -> Self {
        Self::NoImprovement {
            patience,
            min_delta,
            best: None,
            idle: 0,
            fired: false,
        }
    }

    pub fn any(conditions: Vec<StopCondition>) -> Self {
        Self::Composite {
            mode: CompositeMode::Any,
            conditions,
        }
    }

    pub fn all(conditions: Vec<StopCondition>) -> Self {
        Self::Composite {
            mode: CompositeMode::All,
            conditions,
        }
    }

    pub fn should_stop(&mut self, state: &GepaState) -> bool {
        match self {
            Self::MaxCalls { limit } => state.total_evals() >= *limit,
            Self::Timeout { limit, started } => {
                started.get_or_insert_with(Instant::now).elapsed() >= *limit
            }
            Self::NoImprovement {
                patience,
                min_delta,
                best,
                idle,
                fired,
            } => {
                if *fired {
                    return true;
                }
                let current = state.best_aggregate();
                match *best {
                    None => *best = Some(current),
                    Some(previous) if current >= previous + *min_delta => {
                        *best = Some(current);
                        *idle = 0;
                    }
                    Some(_) => *idle += 1,
                }
                *fired = *idle >= *patience;
                *fired
            }
            Self::Composite { mode, conditions } => {
                // Evaluate every child so stateful latches keep advancing.
                let verdicts: Vec<bool> = conditions
                    .iter_mut()
                    .map(|condition| condition.should_stop(state))
                    .collect();
                match mode {
                    CompositeMode::Any => verdicts.iter().any(|&stop| stop),
                    CompositeMode::All => verdicts.iter().all(|&stop| stop),
                }
            }
        }
    }
}
