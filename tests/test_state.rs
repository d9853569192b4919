use std::collections::{BTreeMap, BTreeSet};

use gepa_rs::{Candidate, GepaError, GepaState, find_dominators};

fn seed() -> Candidate {
    Candidate::new([("instruction", "answer briefly"), ("style", "plain")])
}

#[test]
fn new_state_seeds_every_front() {
    let state = GepaState::new(seed(), &[0.4, 0.9], &[10, 20]).expect("valid seed state");

    assert_eq!(state.num_programs(), 1);
    assert!(state.parents_of(0).is_empty());
    assert_eq!(state.component_names(), &["instruction", "style"]);
    assert_eq!(state.next_component_for(0), 0);
    assert_eq!(state.iteration(), 0);
    assert_eq!(state.total_evals(), 2);
    assert_eq!(state.full_val_runs(), 1);

    assert_eq!(state.pareto_score().get(&10), Some(&0.4));
    assert_eq!(state.pareto_score().get(&20), Some(&0.9));
    assert_eq!(state.pareto_set()[&10], BTreeSet::from([0]));
    assert_eq!(state.pareto_set()[&20], BTreeSet::from([0]));
}

#[test]
fn seed_validation_is_strict() {
    let no_components: [(&str, &str); 0] = [];
    assert!(matches!(
        GepaState::new(Candidate::new(no_components), &[], &[]),
        Err(GepaError::Config { .. })
    ));
    assert!(matches!(
        GepaState::new(seed(), &[0.5], &[1, 2]),
        Err(GepaError::Invariant { .. })
    ));
    assert!(matches!(
        GepaState::new(seed(), &[0.5, f32::NAN], &[1, 2]),
        Err(GepaError::Invariant { .. })
    ));
    assert!(matches!(
        GepaState::new(seed(), &[0.5, 0.6], &[1, 1]),
        Err(GepaError::Invariant { .. })
    ));
}

#[test]
fn add_program_updates_fronts_exactly() {
    // Seed (0.4, 0.9), first child (0.9, 0.4), second child (0.7, 0.7):
    // each front ends up held by the single best program, and the middling
    // child holds nothing.
    let mut state = GepaState::new(seed(), &[0.4, 0.9], &[10, 20]).expect("valid seed state");

    let child = |text: &str| {
        let mut candidate = seed();
        candidate.set("instruction", text);
        candidate
    };

    let first = state
        .add_program(
            child("one"),
            vec![0],
            BTreeMap::from([(10, 0.9), (20, 0.4)]),
            None,
        )
        .expect("first child");
    let second = state
        .add_program(
            child("two"),
            vec![0],
            BTreeMap::from([(10, 0.7), (20, 0.7)]),
            None,
        )
        .expect("second child");
    assert_eq!((first, second), (1, 2));

    assert_eq!(state.pareto_score().get(&10), Some(&0.9));
    assert_eq!(state.pareto_score().get(&20), Some(&0.9));
    assert_eq!(state.pareto_set()[&10], BTreeSet::from([1]));
    assert_eq!(state.pareto_set()[&20], BTreeSet::from([0]));

    // The middling program is excluded from the dominators; the two front
    // holders remain.
    let dominators = find_dominators(state.pareto_set(), &state.aggregate_scores());
    assert_eq!(dominators, vec![0, 1]);
}

#[test]
fn equal_scores_join_the_front() {
    let mut state = GepaState::new(seed(), &[0.5], &[0]).expect("valid seed state");
    state
        .add_program(seed(), vec![0], BTreeMap::from([(0, 0.5)]), None)
        .expect("tied child");
    assert_eq!(state.pareto_set()[&0], BTreeSet::from([0, 1]));

    // A weaker program leaves the front untouched.
    state
        .add_program(seed(), vec![0], BTreeMap::from([(0, 0.2)]), None)
        .expect("weaker child");
    assert_eq!(state.pareto_set()[&0], BTreeSet::from([0, 1]));
    assert_eq!(state.pareto_score().get(&0), Some(&0.5));
}

#[test]
fn add_program_rejects_invariant_violations() {
    let mut state = GepaState::new(seed(), &[0.5], &[0]).expect("valid seed state");

    // Parent must be older than the child.
    assert!(matches!(
        state.add_program(seed(), vec![5], BTreeMap::new(), None),
        Err(GepaError::Invariant { .. })
    ));
    // Scores must be finite.
    assert!(matches!(
        state.add_program(seed(), vec![0], BTreeMap::from([(0, f32::INFINITY)]), None),
        Err(GepaError::Invariant { .. })
    ));
    // Component keys are frozen by the seed.
    assert!(matches!(
        state.add_program(
            Candidate::single("other", "text"),
            vec![0],
            BTreeMap::new(),
            None
        ),
        Err(GepaError::Invariant { .. })
    ));

    assert_eq!(state.num_programs(), 1, "failed inserts must not append");
}

#[test]
fn a_score_for_a_fresh_validation_id_opens_its_front() {
    let mut state = GepaState::new(seed(), &[0.5], &[0]).expect("valid seed state");
    let child = state
        .add_program(seed(), vec![0], BTreeMap::from([(7, 0.8)]), None)
        .expect("child with a fresh id");
    assert_eq!(state.pareto_score().get(&7), Some(&0.8));
    assert_eq!(state.pareto_set()[&7], BTreeSet::from([child]));
}

#[test]
fn round_robin_counter_inheritance() {
    let mut state = GepaState::new(seed(), &[0.5], &[0]).expect("valid seed state");

    // Explicit override, as the engine does for reflective children.
    let a = state
        .add_program(seed(), vec![0], BTreeMap::new(), Some(1))
        .expect("child a");
    assert_eq!(state.next_component_for(a), 1);

    // No override: max over parents (merge-style).
    let b = state
        .add_program(seed(), vec![0, a], BTreeMap::new(), None)
        .expect("child b");
    assert_eq!(state.next_component_for(b), 1);

    // Out-of-range override is an invariant violation.
    assert!(matches!(
        state.add_program(seed(), vec![0], BTreeMap::new(), Some(2)),
        Err(GepaError::Invariant { .. })
    ));
}

#[test]
fn aggregate_scores_average_known_subscores() {
    let mut state = GepaState::new(seed(), &[0.4, 0.8], &[0, 1]).expect("valid seed state");
    assert!((state.aggregate_score(0) - 0.6).abs() < 1e-6);

    // Sparse coverage: only one id known.
    let sparse = state
        .add_program(seed(), vec![0], BTreeMap::from([(1, 1.0)]), None)
        .expect("sparse child");
    assert!((state.aggregate_score(sparse) - 1.0).abs() < 1e-6);

    // No scores at all.
    let unscored = state
        .add_program(seed(), vec![0], BTreeMap::new(), None)
        .expect("unscored child");
    assert_eq!(state.aggregate_score(unscored), 0.0);

    assert!((state.best_aggregate() - 1.0).abs() < 1e-6);
}

#[test]
fn genealogy_is_acyclic_by_construction() {
    let mut state = GepaState::new(seed(), &[0.5], &[0]).expect("valid seed state");
    let a = state
        .add_program(seed(), vec![0], BTreeMap::new(), None)
        .expect("child a");
    let b = state
        .add_program(seed(), vec![0, a], BTreeMap::new(), None)
        .expect("child b");

    for idx in 0..state.num_programs() {
        for &parent in state.parents_of(idx) {
            assert!(parent < idx, "parent {parent} not older than child {idx}");
        }
    }
    assert_eq!(state.parents_of(b), &[0, a]);
}
