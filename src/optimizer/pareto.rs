//! Per-example dominance utilities for the evolutionary search.
//!
//! The key insight: optimizing for average score lets the search overfit to
//! easy validation examples while ignoring hard ones. Keeping one front per
//! validation example prevents this — a program that averages 0.3 but is the
//! only one to crack example #7 stays alive alongside a 0.9-average program
//! that fails #7. Parents are sampled from the fronts proportional to
//! coverage (how many fronts they inhabit), so well-rounded programs get
//! sampled more often but specialists aren't eliminated.
//!
//! All functions here are pure: they take the fronts plus per-program
//! aggregate scores and never touch the state. Ties in score are broken by
//! program index so results are deterministic.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::state::{ParetoFronts, ProgramIdx};

fn score_of(scores: &[f32], program: ProgramIdx) -> f32 {
    scores.get(program).copied().unwrap_or(f32::NEG_INFINITY)
}

/// Whether `y` is dominated with respect to `others`.
///
/// `y` is dominated iff it appears on at least one front and, on *every*
/// front it appears on, some member of `others` (other than `y` itself) also
/// appears. Ties share a front, so tied programs never dominate each other
/// outright — and no program dominates itself.
pub fn is_dominated(y: ProgramIdx, others: &BTreeSet<ProgramIdx>, fronts: &ParetoFronts) -> bool {
    let mut appears = false;
    for front in fronts.values() {
        if !front.contains(&y) {
            continue;
        }
        appears = true;
        if !front.iter().any(|&p| p != y && others.contains(&p)) {
            return false;
        }
    }
    appears
}

/// Strips dominated programs from every front.
///
/// Fixpoint iteration, weakest first: programs are ordered by ascending
/// aggregate score and repeatedly scanned for one that is dominated by the
/// surviving strictly-stronger programs; each find restarts the scan. A
/// program alone on some front is never dominated, so every originally
/// non-empty front stays non-empty.
pub fn remove_dominated(fronts: &ParetoFronts, scores: &[f32]) -> ParetoFronts {
    let mut order: Vec<ProgramIdx> = fronts
        .values()
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    order.sort_by(|a, b| {
        score_of(scores, *a)
            .total_cmp(&score_of(scores, *b))
            .then(a.cmp(b))
    });

    let mut dominated: BTreeSet<ProgramIdx> = BTreeSet::new();
    'scan: loop {
        for &p in &order {
            if dominated.contains(&p) {
                continue;
            }
            let stronger: BTreeSet<ProgramIdx> = order
                .iter()
                .copied()
                .filter(|&q| !dominated.contains(&q) && score_of(scores, q) > score_of(scores, p))
                .collect();
            if is_dominated(p, &stronger, fronts) {
                dominated.insert(p);
                continue 'scan;
            }
        }
        break;
    }

    fronts
        .iter()
        .map(|(&id, front)| {
            (
                id,
                front
                    .iter()
                    .copied()
                    .filter(|p| !dominated.contains(p))
                    .collect(),
            )
        })
        .collect()
}

/// Samples a program from the fronts, weighted by coverage.
///
/// After dominated removal, each survivor is weighted by the number of
/// fronts it inhabits and one is drawn from the resulting multiset. Returns
/// `None` only when every front is empty. Equal-weight ties resolve by
/// program index (the multiset is enumerated in index order).
pub fn select_from_front(
    fronts: &ParetoFronts,
    scores: &[f32],
    rng: &mut StdRng,
) -> Option<ProgramIdx> {
    let cleaned = remove_dominated(fronts, scores);

    let mut coverage: BTreeMap<ProgramIdx, usize> = BTreeMap::new();
    for front in cleaned.values() {
        for &p in front {
            *coverage.entry(p).or_insert(0) += 1;
        }
    }
    let total: usize = coverage.values().sum();
    if total == 0 {
        return None;
    }

    let mut target = rng.gen_range(0..total);
    for (&p, &weight) in &coverage {
        if target < weight {
            return Some(p);
        }
        target -= weight;
    }
    None
}

/// The distinct survivors of dominated removal, best aggregate first.
/// Score ties resolve by lower program index.
pub fn find_dominators(fronts: &ParetoFronts, scores: &[f32]) -> Vec<ProgramIdx> {
    let cleaned = remove_dominated(fronts, scores);
    let mut survivors: Vec<ProgramIdx> = cleaned
        .values()
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    survivors.sort_by(|a, b| {
        score_of(scores, *b)
            .total_cmp(&score_of(scores, *a))
            .then(a.cmp(b))
    });
    survivors
}

/// Snapshot of the fronts at a point in the search.
///
/// Useful for plotting convergence. A healthy search keeps several
/// dominators alive (diversity) while average coverage climbs (programs are
/// getting more robust). A single dominator means the search has collapsed
/// onto one program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierStatistics {
    /// Programs surviving dominated removal.
    pub num_dominators: usize,
    /// Validation examples with at least one front member.
    pub num_examples_covered: usize,
    /// Mean fronts inhabited per dominator.
    pub avg_coverage: f32,
    /// Most fronts inhabited by any single dominator.
    pub max_coverage: usize,
    /// Fewest fronts inhabited by any dominator (>= 1 by construction).
    pub min_coverage: usize,
}

pub fn frontier_statistics(fronts: &ParetoFronts, scores: &[f32]) -> FrontierStatistics {
    let cleaned = remove_dominated(fronts, scores);

    let mut coverage: BTreeMap<ProgramIdx, usize> = BTreeMap::new();
    for front in cleaned.values() {
        for &p in front {
            *coverage.entry(p).or_insert(0) += 1;
        }
    }

    let num_dominators = coverage.len();
    let avg_coverage = if num_dominators == 0 {
        0.0
    } else {
        coverage.values().sum::<usize>() as f32 / num_dominators as f32
    };

    FrontierStatistics {
        num_dominators,
        num_examples_covered: cleaned.values().filter(|front| !front.is_empty()).count(),
        avg_coverage,
        max_coverage: coverage.values().copied().max().unwrap_or(0),
        min_coverage: coverage.values().copied().min().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fronts(entries: &[(usize, &[ProgramIdx])]) -> ParetoFronts {
        entries
            .iter()
            .map(|(id, members)| (*id, members.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn no_program_dominates_itself() {
        let fronts = fronts(&[(0, &[1]), (1, &[1, 2])]);
        assert!(!is_dominated(1, &BTreeSet::from([1]), &fronts));
    }

    #[test]
    fn program_absent_from_all_fronts_is_not_dominated() {
        let fronts = fronts(&[(0, &[1])]);
        assert!(!is_dominated(5, &BTreeSet::from([1]), &fronts));
    }

    #[test]
    fn sole_occupant_survives_removal() {
        // Program 0 is alone on front 0; program 1 shares front 1 with it.
        let fronts = fronts(&[(0, &[0]), (1, &[0, 1])]);
        let scores = vec![0.2, 0.9];
        let cleaned = remove_dominated(&fronts, &scores);
        assert!(cleaned[&0].contains(&0), "sole occupant must survive");
        assert!(!cleaned.values().any(|front| front.is_empty()));
    }
}
