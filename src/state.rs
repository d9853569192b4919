use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::data::ExampleId;
use crate::errors::GepaError;

/// Index of a program in [`GepaState::programs`].
pub type ProgramIdx = usize;

/// Per-validation-example Pareto fronts: each validation ID maps to the set
/// of programs achieving the best observed score on it.
pub type ParetoFronts = BTreeMap<ExampleId, BTreeSet<ProgramIdx>>;

/// The evolutionary memory of a run.
///
/// Holds every discovered program, its genealogy, sparse per-example
/// validation scores, and the per-example Pareto fronts. Programs are
/// append-only: once assigned an index, a program never changes, and parent
/// links always point at strictly smaller indices, so the genealogy is a DAG
/// by construction.
///
/// Only the engine mutates a state; everything else reads it through the
/// accessors. Ordered containers are used throughout so that iteration
/// order — and therefore seeded-RNG consumption — is reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GepaState {
    programs: Vec<Candidate>,
    parents: Vec<Vec<ProgramIdx>>,
    val_subscores: Vec<BTreeMap<ExampleId, f32>>,
    pareto_score: BTreeMap<ExampleId, f32>,
    pareto_set: ParetoFronts,
    component_names: Vec<String>,
    next_component_for: Vec<usize>,
    i: usize,
    total_evals: usize,
    full_val_runs: usize,
}

impl GepaState {
    /// Creates a state from the seed candidate and its full-valset scores.
    ///
    /// The seed becomes program 0, defines the component key set, and seeds
    /// every Pareto front. `seed_scores` is parallel to `valset_ids`.
    pub fn new(
        seed: Candidate,
        seed_scores: &[f32],
        valset_ids: &[ExampleId],
    ) -> Result<Self, GepaError> {
        if seed.is_empty() {
            return Err(GepaError::config("seed candidate has no components"));
        }
        if seed_scores.len() != valset_ids.len() {
            return Err(GepaError::invariant(format!(
                "seed evaluation returned {} scores for {} validation ids",
                seed_scores.len(),
                valset_ids.len()
            )));
        }
        let unique: BTreeSet<ExampleId> = valset_ids.iter().copied().collect();
        if unique.len() != valset_ids.len() {
            return Err(GepaError::invariant("duplicate validation ids"));
        }
        if let Some(position) = seed_scores.iter().position(|score| !score.is_finite()) {
            return Err(GepaError::invariant(format!(
                "non-finite seed score at validation position {position}"
            )));
        }

        let mut pareto_score = BTreeMap::new();
        let mut pareto_set: ParetoFronts = BTreeMap::new();
        let mut subscores = BTreeMap::new();
        for (&id, &score) in valset_ids.iter().zip(seed_scores) {
            pareto_score.insert(id, score);
            pareto_set.insert(id, BTreeSet::from([0]));
            subscores.insert(id, score);
        }

        let component_names: Vec<String> = seed.component_names().map(String::from).collect();

        Ok(Self {
            programs: vec![seed],
            parents: vec![Vec::new()],
            val_subscores: vec![subscores],
            pareto_score,
            pareto_set,
            component_names,
            next_component_for: vec![0],
            i: 0,
            total_evals: valset_ids.len(),
            full_val_runs: 1,
        })
    }

    /// Appends a program with its validation scores and updates the Pareto
    /// structures. Returns the new program's index.
    ///
    /// `next_component` overrides the child's round-robin counter; when
    /// absent it is inherited as the max over the parents' counters (0 for a
    /// parentless program). Violations of the state invariants (forward
    /// parent links, mismatched component keys, non-finite scores) are fatal.
    /// A score for a validation id with no front yet simply opens the front.
    pub fn add_program(
        &mut self,
        candidate: Candidate,
        parent_ids: Vec<ProgramIdx>,
        val_scores: BTreeMap<ExampleId, f32>,
        next_component: Option<usize>,
    ) -> Result<ProgramIdx, GepaError> {
        let k = self.programs.len();

        for &parent in &parent_ids {
            if parent >= k {
                return Err(GepaError::invariant(format!(
                    "parent index {parent} is not older than child {k}"
                )));
            }
        }
        if !candidate
            .component_names()
            .eq(self.component_names.iter().map(String::as_str))
        {
            return Err(GepaError::invariant(
                "candidate component names diverge from the seed's",
            ));
        }
        for (&id, &score) in &val_scores {
            if !score.is_finite() {
                return Err(GepaError::invariant(format!(
                    "non-finite score for validation id {id}"
                )));
            }
        }

        let counter = match next_component {
            Some(counter) => counter,
            None => parent_ids
                .iter()
                .map(|&parent| self.next_component_for[parent])
                .max()
                .unwrap_or(0),
        };
        if counter >= self.component_names.len() {
            return Err(GepaError::invariant(format!(
                "component counter {counter} out of range for {} components",
                self.component_names.len()
            )));
        }

        for (&id, &score) in &val_scores {
            match self.pareto_score.get(&id).copied() {
                // First score ever observed for this validation id.
                None => {
                    self.pareto_score.insert(id, score);
                    self.pareto_set.insert(id, BTreeSet::from([k]));
                }
                Some(best) if score > best => {
                    self.pareto_score.insert(id, score);
                    self.pareto_set.insert(id, BTreeSet::from([k]));
                }
                Some(best) if score == best => {
                    if let Some(front) = self.pareto_set.get_mut(&id) {
                        front.insert(k);
                    }
                }
                Some(_) => {}
            }
        }

        self.parents.push(parent_ids);
        self.val_subscores.push(val_scores);
        self.next_component_for.push(counter);
        self.programs.push(candidate);
        Ok(k)
    }

    pub fn num_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn programs(&self) -> &[Candidate] {
        &self.programs
    }

    pub fn candidate(&self, idx: ProgramIdx) -> &Candidate {
        &self.programs[idx]
    }

    pub fn parents_of(&self, idx: ProgramIdx) -> &[ProgramIdx] {
        &self.parents[idx]
    }

    pub fn val_subscores_of(&self, idx: ProgramIdx) -> &BTreeMap<ExampleId, f32> {
        &self.val_subscores[idx]
    }

    pub fn pareto_score(&self) -> &BTreeMap<ExampleId, f32> {
        &self.pareto_score
    }

    pub fn pareto_set(&self) -> &ParetoFronts {
        &self.pareto_set
    }

    pub fn component_names(&self) -> &[String] {
        &self.component_names
    }

    pub fn next_component_for(&self, idx: ProgramIdx) -> usize {
        self.next_component_for[idx]
    }

    pub fn iteration(&self) -> usize {
        self.i
    }

    pub fn total_evals(&self) -> usize {
        self.total_evals
    }

    pub fn full_val_runs(&self) -> usize {
        self.full_val_runs
    }

    /// Mean of the program's known validation scores; 0 when none.
    pub fn aggregate_score(&self, idx: ProgramIdx) -> f32 {
        let scores = &self.val_subscores[idx];
        if scores.is_empty() {
            return 0.0;
        }
        scores.values().sum::<f32>() / scores.len() as f32
    }

    pub fn aggregate_scores(&self) -> Vec<f32> {
        (0..self.programs.len())
            .map(|idx| self.aggregate_score(idx))
            .collect()
    }

    /// Best aggregate score over all programs.
    pub fn best_aggregate(&self) -> f32 {
        (0..self.programs.len())
            .map(|idx| self.aggregate_score(idx))
            .fold(f32::NEG_INFINITY, f32::max)
    }

    pub(crate) fn begin_iteration(&mut self) {
        self.i += 1;
    }

    pub(crate) fn record_evals(&mut self, count: usize) {
        self.total_evals += count;
    }

    pub(crate) fn record_full_val_run(&mut self) {
        self.full_val_runs += 1;
    }
}
