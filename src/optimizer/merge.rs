use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::candidate::Candidate;
use crate::data::{DataLoader, ExampleId};
use crate::state::{GepaState, ProgramIdx};

use super::pareto::find_dominators;
use super::proposal::{CandidateProposal, ProposalTag, ProposeOutcome};

/// Recombines two Pareto dominators through a common ancestor.
///
/// A merge is only worth testing when the two descendants improved the
/// ancestor along *different* components — then the child can take each
/// side's divergent text and potentially combine both gains. The proposer
/// remembers every (pair, ancestor) triple it has tried so the same
/// recombination is never evaluated twice, and it runs on its own budget:
/// one merge credit is granted per accepted program, capped at
/// `max_merge_invocations` total.
#[derive(Debug)]
pub(crate) struct MergeProposer {
    enabled: bool,
    max_merge_invocations: usize,
    val_overlap_floor: usize,
    subsample_size: usize,
    pub merges_due: usize,
    pub total_merges_tested: usize,
    pub last_iter_found_new_program: bool,
    attempted_triples: BTreeSet<(ProgramIdx, ProgramIdx, ProgramIdx)>,
    successful_merges: usize,
    rng: StdRng,
}

impl MergeProposer {
    pub fn new(
        enabled: bool,
        max_merge_invocations: usize,
        val_overlap_floor: usize,
        subsample_size: usize,
        seed: u64,
    ) -> Self {
        Self {
            enabled,
            max_merge_invocations,
            val_overlap_floor,
            subsample_size,
            merges_due: 0,
            total_merges_tested: 0,
            last_iter_found_new_program: false,
            attempted_triples: BTreeSet::new(),
            successful_merges: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Called at the end of every iteration with whether it produced a new
    /// program.
    pub fn record_iteration(&mut self, found_new_program: bool) {
        self.last_iter_found_new_program = found_new_program;
    }

    /// Grants one merge credit after an accepted program, capped at the
    /// remaining invocation budget.
    pub fn schedule_if_needed(&mut self) {
        if !self.enabled || !self.last_iter_found_new_program {
            return;
        }
        let remaining = self
            .max_merge_invocations
            .saturating_sub(self.total_merges_tested);
        if self.merges_due < remaining {
            self.merges_due += 1;
        }
    }

    pub fn record_success(&mut self) {
        self.successful_merges += 1;
    }

    pub fn successful_merges(&self) -> usize {
        self.successful_merges
    }

    pub fn ready(&self) -> bool {
        self.enabled && self.merges_due > 0 && self.last_iter_found_new_program
    }

    pub async fn propose<A, D>(
        &mut self,
        state: &GepaState,
        adapter: &A,
        valset: &D,
    ) -> ProposeOutcome
    where
        A: Adapter,
        D: DataLoader<Instance = A::Instance>,
    {
        if !self.ready() {
            return ProposeOutcome::none(0);
        }

        let aggregates = state.aggregate_scores();
        let dominators = find_dominators(state.pareto_set(), &aggregates);
        if dominators.len() < 2 {
            debug!("fewer than two dominators, no merge possible");
            self.merges_due = self.merges_due.saturating_sub(1);
            return ProposeOutcome::none(0);
        }

        // Two distinct dominators, biased toward higher aggregate score.
        let id1 = self.pick_rank_weighted(&dominators);
        let rest: Vec<ProgramIdx> = dominators.iter().copied().filter(|&p| p != id1).collect();
        let id2 = self.pick_rank_weighted(&rest);
        let pair = (id1.min(id2), id1.max(id2));

        let common: Vec<ProgramIdx> = ancestors(state, id1)
            .intersection(&ancestors(state, id2))
            .copied()
            .filter(|&ancestor| ancestor != id1 && ancestor != id2)
            .collect();

        let usable: Vec<ProgramIdx> = common
            .into_iter()
            .filter(|&ancestor| {
                if self.attempted_triples.contains(&(pair.0, pair.1, ancestor)) {
                    return false;
                }
                // The descendants should be improvements over the ancestor.
                if aggregates[ancestor] > aggregates[id1] && aggregates[ancestor] > aggregates[id2]
                {
                    return false;
                }
                has_desirable_predictor(state, id1, id2, ancestor)
            })
            .collect();

        if usable.is_empty() {
            debug!(id1, id2, "no usable common ancestor for merge pair");
            self.merges_due = self.merges_due.saturating_sub(1);
            return ProposeOutcome::none(0);
        }

        let ancestor = usable[self.rng.gen_range(0..usable.len())];
        let triple = (pair.0, pair.1, ancestor);

        let merged = merge_candidates(state, id1, id2, ancestor, &aggregates);
        if &merged == state.candidate(id1) || &merged == state.candidate(id2) {
            debug!(id1, id2, ancestor, "merged candidate reproduces a parent, dropping");
            self.attempted_triples.insert(triple);
            return ProposeOutcome::none(0);
        }

        let sub1 = state.val_subscores_of(id1);
        let sub2 = state.val_subscores_of(id2);
        let common_ids: Vec<ExampleId> = sub1
            .keys()
            .filter(|id| sub2.contains_key(id))
            .copied()
            .collect();
        if common_ids.len() < self.val_overlap_floor {
            debug!(
                id1,
                id2,
                overlap = common_ids.len(),
                floor = self.val_overlap_floor,
                "insufficient validation overlap for merge"
            );
            return ProposeOutcome::none(0);
        }

        let subsample = self.stratified_subsample(&common_ids, sub1, sub2);

        let batch = match valset.fetch(&subsample) {
            Ok(batch) => batch,
            Err(err) => {
                warn!("failed to fetch merge subsample: {err:#}");
                return ProposeOutcome::none(0);
            }
        };
        let eval = match adapter.evaluate(&batch, &merged, false).await {
            Ok(eval) => eval,
            Err(err) => {
                warn!(id1, id2, ancestor, error = %err, "merged candidate evaluation failed");
                self.attempted_triples.insert(triple);
                self.merges_due = self.merges_due.saturating_sub(1);
                self.total_merges_tested += 1;
                return ProposeOutcome::none(0);
            }
        };
        if let Err(err) = eval.validate(batch.len(), false) {
            warn!(id1, id2, ancestor, error = %err, "adapter broke the batch contract");
            self.attempted_triples.insert(triple);
            self.merges_due = self.merges_due.saturating_sub(1);
            self.total_merges_tested += 1;
            return ProposeOutcome::none(0);
        }

        self.attempted_triples.insert(triple);
        self.merges_due = self.merges_due.saturating_sub(1);
        self.total_merges_tested += 1;

        // Reference scores: the subsample scores of the stronger parent.
        let sum1: f32 = subsample.iter().filter_map(|id| sub1.get(id)).sum();
        let sum2: f32 = subsample.iter().filter_map(|id| sub2.get(id)).sum();
        let better = if sum2 > sum1 { sub2 } else { sub1 };
        let scores_before: Vec<f32> = subsample
            .iter()
            .filter_map(|id| better.get(id).copied())
            .collect();

        debug!(
            id1,
            id2,
            ancestor,
            subsample = subsample.len(),
            "merge proposal constructed"
        );
        ProposeOutcome::of(
            CandidateProposal {
                candidate: merged,
                parent_ids: vec![id1, id2],
                subsample_ids: subsample,
                scores_before,
                scores_after: eval.scores,
                tag: ProposalTag::Merge,
                metadata: json!({ "ancestor": ancestor }),
                next_component: None,
            },
            batch.len(),
        )
    }

    /// Weighted draw over a score-descending pool: the best entry gets
    /// weight `len`, the weakest weight 1.
    fn pick_rank_weighted(&mut self, pool: &[ProgramIdx]) -> ProgramIdx {
        let total = pool.len() * (pool.len() + 1) / 2;
        let mut target = self.rng.gen_range(0..total);
        for (position, &program) in pool.iter().enumerate() {
            let weight = pool.len() - position;
            if target < weight {
                return program;
            }
            target -= weight;
        }
        pool[pool.len() - 1]
    }

    /// Picks up to `subsample_size` shared validation IDs, drawn evenly from
    /// the strata "id1 scored higher" / "id2 scored higher" / "tied"; short
    /// strata are backfilled from the others.
    fn stratified_subsample(
        &mut self,
        common_ids: &[ExampleId],
        sub1: &BTreeMap<ExampleId, f32>,
        sub2: &BTreeMap<ExampleId, f32>,
    ) -> Vec<ExampleId> {
        let mut wins1 = Vec::new();
        let mut wins2 = Vec::new();
        let mut ties = Vec::new();
        for &id in common_ids {
            match (sub1.get(&id), sub2.get(&id)) {
                (Some(s1), Some(s2)) if s1 > s2 => wins1.push(id),
                (Some(s1), Some(s2)) if s2 > s1 => wins2.push(id),
                (Some(_), Some(_)) => ties.push(id),
                _ => {}
            }
        }
        wins1.shuffle(&mut self.rng);
        wins2.shuffle(&mut self.rng);
        ties.shuffle(&mut self.rng);

        let want = self.subsample_size.min(common_ids.len());
        let mut strata = [wins1.into_iter(), wins2.into_iter(), ties.into_iter()];
        let mut picked = Vec::with_capacity(want);
        while picked.len() < want {
            let mut progressed = false;
            for stratum in &mut strata {
                if picked.len() >= want {
                    break;
                }
                if let Some(id) = stratum.next() {
                    picked.push(id);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        picked
    }
}

/// All transitive ancestors of `program`, excluding itself.
fn ancestors(state: &GepaState, program: ProgramIdx) -> BTreeSet<ProgramIdx> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<ProgramIdx> = state.parents_of(program).to_vec();
    while let Some(p) = stack.pop() {
        if seen.insert(p) {
            stack.extend(state.parents_of(p).iter().copied());
        }
    }
    seen
}

/// A triple is worth merging only if some component diverged from the
/// ancestor in exactly one of the two descendants — that side's text can be
/// adopted wholesale while the other side vouches for the rest.
fn has_desirable_predictor(
    state: &GepaState,
    id1: ProgramIdx,
    id2: ProgramIdx,
    ancestor: ProgramIdx,
) -> bool {
    let (c1, c2, anc) = (
        state.candidate(id1),
        state.candidate(id2),
        state.candidate(ancestor),
    );
    state.component_names().iter().any(|name| {
        let diverged1 = c1.get(name) != anc.get(name);
        let diverged2 = c2.get(name) != anc.get(name);
        diverged1 != diverged2
    })
}

/// Component-wise recombination: take the uniquely-diverged side where one
/// exists, otherwise the text of the stronger parent (ties to the lower
/// index).
fn merge_candidates(
    state: &GepaState,
    id1: ProgramIdx,
    id2: ProgramIdx,
    ancestor: ProgramIdx,
    aggregates: &[f32],
) -> Candidate {
    let (c1, c2, anc) = (
        state.candidate(id1),
        state.candidate(id2),
        state.candidate(ancestor),
    );
    let preferred = if aggregates[id1] > aggregates[id2] {
        id1
    } else if aggregates[id2] > aggregates[id1] {
        id2
    } else {
        id1.min(id2)
    };

    let mut merged = anc.clone();
    for name in state.component_names() {
        let (v1, v2, va) = (c1.get(name), c2.get(name), anc.get(name));
        let chosen = if v1 != va && v2 == va {
            v1
        } else if v2 != va && v1 == va {
            v2
        } else if preferred == id1 {
            v1
        } else {
            v2
        };
        merged.set(name, chosen.unwrap_or_default().to_string());
    }
    merged
}
