use std::collections::BTreeMap;
use std::time::Duration;

use gepa_rs::{Candidate, GepaState, StopCondition};

fn state_with_valset(size: usize) -> GepaState {
    let ids: Vec<usize> = (0..size).collect();
    let scores = vec![0.5; size];
    GepaState::new(Candidate::single("instruction", "seed"), &scores, &ids).expect("seed state")
}

#[test]
fn max_calls_triggers_on_the_eval_budget() {
    // The seed evaluation alone costs |valset| evals.
    let state = state_with_valset(3);
    assert!(StopCondition::max_calls(3).should_stop(&state));
    assert!(StopCondition::max_calls(2).should_stop(&state));
    assert!(!StopCondition::max_calls(4).should_stop(&state));
}

#[test]
fn timeout_uses_a_monotonic_clock() {
    let state = state_with_valset(1);
    let mut immediate = StopCondition::timeout(Duration::ZERO);
    assert!(immediate.should_stop(&state));

    let mut distant = StopCondition::timeout(Duration::from_secs(3600));
    assert!(!distant.should_stop(&state));
    assert!(!distant.should_stop(&state));
}

#[test]
fn no_improvement_latches_once_fired() {
    let mut state = state_with_valset(1);
    let mut condition = StopCondition::no_improvement(2, 0.05);

    // First check records the baseline.
    assert!(!condition.should_stop(&state));
    // Two stale checks exhaust the patience.
    assert!(!condition.should_stop(&state));
    assert!(condition.should_stop(&state));

    // A late improvement cannot un-fire the condition.
    state
        .add_program(
            Candidate::single("instruction", "better"),
            vec![0],
            BTreeMap::from([(0, 0.9)]),
            None,
        )
        .expect("improved program");
    assert!(condition.should_stop(&state));
}

#[test]
fn no_improvement_resets_patience_on_progress() {
    let mut state = state_with_valset(1);
    let mut condition = StopCondition::no_improvement(2, 0.05);

    assert!(!condition.should_stop(&state));
    assert!(!condition.should_stop(&state));

    // Improvement by more than min_delta resets the idle counter.
    state
        .add_program(
            Candidate::single("instruction", "better"),
            vec![0],
            BTreeMap::from([(0, 0.9)]),
            None,
        )
        .expect("improved program");
    assert!(!condition.should_stop(&state));
    assert!(!condition.should_stop(&state));
    assert!(condition.should_stop(&state));
}

#[test]
fn composite_any_and_all() {
    let state = state_with_valset(2);

    let mut any = StopCondition::any(vec![
        StopCondition::max_calls(100),
        StopCondition::timeout(Duration::ZERO),
    ]);
    assert!(any.should_stop(&state));

    let mut all = StopCondition::all(vec![
        StopCondition::max_calls(100),
        StopCondition::timeout(Duration::ZERO),
    ]);
    assert!(!all.should_stop(&state), "max_calls(100) is not yet met");

    let mut all_met = StopCondition::all(vec![
        StopCondition::max_calls(2),
        StopCondition::timeout(Duration::ZERO),
    ]);
    assert!(all_met.should_stop(&state));
}
