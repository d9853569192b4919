use std::collections::BTreeMap;
use std::path::PathBuf;

use bon::Builder;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adapter::Adapter;
use crate::candidate::Candidate;
use crate::data::{DataLoader, ExampleId};
use crate::errors::GepaError;
use crate::lm::{LanguageModel, LmOptions};
use crate::persistence;
use crate::state::{GepaState, ProgramIdx};
use crate::stop::StopCondition;
use crate::strategy::{BatchSampler, CandidateSelector, ComponentSelector, EvaluationPolicy};

use super::merge::MergeProposer;
use super::pareto::{self, FrontierStatistics};
use super::proposal::{CandidateProposal, ProposalTag};
use super::reflective::ReflectiveProposer;

/// Decorrelates the merge proposer's RNG stream from the main one.
const MERGE_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Genetic-Pareto evolutionary optimizer.
///
/// Searches over programs made of named text components: each iteration
/// proposes a child by reflective mutation (an LM rewrites components based
/// on execution feedback) or by merging two Pareto dominators, accepts it if
/// it beats its parent on a small subsample, re-scores accepted children on
/// the validation set, and keeps every program that is best on at least one
/// validation example.
///
/// ```ignore
/// let optimizer = GEPA::builder()
///     .adapter(my_adapter)
///     .reflection_lm(my_lm)
///     .max_metric_calls(2_000)
///     .use_merge(true)
///     .build();
/// let result = optimizer.run(seed, &trainset, &valset).await?;
/// println!("best aggregate: {:.3}", result.best_score);
/// ```
///
/// # Errors
///
/// `run` fails eagerly on invalid configuration and fatally on state
/// invariant violations or seed-evaluation failure. Everything else — a
/// failed proposal, a dead model call, a best-effort persistence write — is
/// logged and absorbed; the loop continues until a stop condition fires.
#[derive(Builder)]
pub struct GEPA<A, L> {
    /// Evaluates candidates and extracts reflective feedback.
    pub adapter: A,

    /// Model used by the default instruction-proposal path. Optional when
    /// the adapter implements `propose_new_texts` itself.
    pub reflection_lm: Option<L>,

    #[builder(default)]
    pub lm_options: LmOptions,

    /// Training minibatch size per reflective proposal.
    #[builder(default = 3)]
    pub reflection_minibatch_size: usize,

    /// Score treated as unimprovable when `skip_perfect_score` is on.
    #[builder(default = 1.0)]
    pub perfect_score: f32,

    /// Skip proposing when the whole minibatch already scores perfect.
    #[builder(default = false)]
    pub skip_perfect_score: bool,

    #[builder(default)]
    pub candidate_selector: CandidateSelector,

    #[builder(default)]
    pub component_selector: ComponentSelector,

    /// Defaults to the simple circular sampler at
    /// `reflection_minibatch_size`.
    pub batch_sampler: Option<BatchSampler>,

    #[builder(default)]
    pub evaluation_policy: EvaluationPolicy,

    #[builder(default = false)]
    pub use_merge: bool,

    /// Total merge attempts across the run.
    #[builder(default = 5)]
    pub max_merge_invocations: usize,

    /// Minimum validation IDs two parents must share before a merge is
    /// testable.
    #[builder(default = 2)]
    pub merge_val_overlap_floor: usize,

    /// Validation IDs a merged candidate is scored on before acceptance.
    #[builder(default = 5)]
    pub merge_subsample_size: usize,

    /// Sugar for an appended `MaxCalls` stop condition.
    pub max_metric_calls: Option<usize>,

    /// OR'd with each other and with `max_metric_calls`.
    #[builder(default)]
    pub stop_conditions: Vec<StopCondition>,

    /// Directory for state snapshots and the cooperative stop sentinel.
    pub run_dir: Option<PathBuf>,

    /// Fail instead of starting fresh when `run_dir` holds no usable state.
    #[builder(default = false)]
    pub resume: bool,

    /// Master RNG seed.
    #[builder(default = 0)]
    pub seed: u64,

    /// Persist every this many iterations.
    #[builder(default = 5)]
    pub persist_every: usize,

    /// Hard safety bound on iterations, independent of stop conditions.
    #[builder(default = 10_000)]
    pub max_iterations: usize,

    /// Record evolution and frontier history in the result.
    #[builder(default = false)]
    pub track_stats: bool,
}

/// What a run produced: the winner plus the full evolutionary record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GepaResult {
    pub best_candidate: Candidate,
    pub best_idx: ProgramIdx,
    pub best_score: f32,
    pub total_evals: usize,
    /// `(iteration, best aggregate so far)` per iteration, when
    /// `track_stats` is on.
    pub evolution_history: Vec<(usize, f32)>,
    /// Frontier snapshot per iteration, when `track_stats` is on.
    pub frontier_history: Vec<FrontierStatistics>,
    pub state: GepaState,
}

impl<A, L> GEPA<A, L>
where
    A: Adapter,
    L: LanguageModel,
{
    /// Runs the optimization loop to completion and returns the final
    /// snapshot, even when nothing beat the seed.
    pub async fn run<D>(
        &self,
        seed_candidate: Candidate,
        trainset: &D,
        valset: &D,
    ) -> Result<GepaResult, GepaError>
    where
        D: DataLoader<Instance = A::Instance>,
    {
        self.validate_config(&seed_candidate, trainset, valset)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let valset_ids = valset.all_ids();

        let mut state = self.initial_state(seed_candidate, valset, &valset_ids).await?;

        let mut stop_conditions = self.effective_stop_conditions();
        let mut batch_sampler = self
            .batch_sampler
            .clone()
            .unwrap_or_else(|| BatchSampler::simple(self.reflection_minibatch_size));
        let mut evaluation_policy = self.evaluation_policy.clone();
        let mut merge = MergeProposer::new(
            self.use_merge,
            self.max_merge_invocations,
            self.merge_val_overlap_floor,
            self.merge_subsample_size,
            self.seed ^ MERGE_SEED_SALT,
        );
        let reflective = ReflectiveProposer {
            skip_perfect_score: self.skip_perfect_score,
            perfect_score: self.perfect_score,
            lm_options: self.lm_options.clone(),
        };

        let mut evolution_history = Vec::new();
        let mut frontier_history = Vec::new();

        loop {
            if state.iteration() >= self.max_iterations {
                info!(iterations = state.iteration(), "iteration safety bound reached");
                break;
            }
            if stop_conditions
                .iter_mut()
                .any(|condition| condition.should_stop(&state))
            {
                info!(
                    iteration = state.iteration(),
                    total_evals = state.total_evals(),
                    "stop condition met"
                );
                break;
            }
            if let Some(dir) = &self.run_dir
                && persistence::stop_requested(dir)
            {
                info!("stop sentinel found, exiting cooperatively");
                break;
            }

            state.begin_iteration();
            debug!(iteration = state.iteration(), programs = state.num_programs(), "iteration start");

            let outcome = if merge.ready() {
                let merge_outcome = merge.propose(&state, &self.adapter, valset).await;
                if merge_outcome.proposal.is_some() {
                    merge_outcome
                } else {
                    let carried = merge_outcome.evals_used;
                    let mut fallback = reflective
                        .propose(
                            &state,
                            &self.adapter,
                            self.reflection_lm.as_ref(),
                            trainset,
                            &self.candidate_selector,
                            &self.component_selector,
                            &mut batch_sampler,
                            &mut rng,
                        )
                        .await;
                    fallback.evals_used += carried;
                    fallback
                }
            } else {
                reflective
                    .propose(
                        &state,
                        &self.adapter,
                        self.reflection_lm.as_ref(),
                        trainset,
                        &self.candidate_selector,
                        &self.component_selector,
                        &mut batch_sampler,
                        &mut rng,
                    )
                    .await
            };

            // Even a proposal that never reached the adapter counts as one
            // attempted evaluation, so budget-based stops cannot stall.
            state.record_evals(outcome.evals_used.max(1));

            let mut accepted = false;
            if let Some(proposal) = outcome.proposal {
                let tag = proposal.tag;
                if accepts(&state, &proposal) {
                    accepted = self
                        .install(&mut state, &mut evaluation_policy, proposal, valset, &valset_ids)
                        .await?;
                    if accepted && tag == ProposalTag::Merge {
                        merge.record_success();
                    }
                } else {
                    debug!(tag = ?tag, "proposal rejected on subsample");
                }
            }

            merge.record_iteration(accepted);
            if accepted {
                merge.schedule_if_needed();
            }

            if self.track_stats {
                evolution_history.push((state.iteration(), state.best_aggregate()));
                frontier_history.push(pareto::frontier_statistics(
                    state.pareto_set(),
                    &state.aggregate_scores(),
                ));
            }

            if let Some(dir) = &self.run_dir
                && state.iteration() % self.persist_every == 0
                && let Err(err) = persistence::save_state(dir, &state)
            {
                warn!(error = %err, "periodic state persistence failed");
            }
        }

        if let Some(dir) = &self.run_dir
            && let Err(err) = persistence::save_state(dir, &state)
        {
            warn!(error = %err, "final state persistence failed");
        }

        let best_idx = evaluation_policy.best_program(&state);
        info!(
            best_idx,
            best_score = state.aggregate_score(best_idx),
            programs = state.num_programs(),
            total_evals = state.total_evals(),
            "optimization finished"
        );
        Ok(GepaResult {
            best_candidate: state.candidate(best_idx).clone(),
            best_idx,
            best_score: state.aggregate_score(best_idx),
            total_evals: state.total_evals(),
            evolution_history,
            frontier_history,
            state,
        })
    }

    /// Re-scores an accepted child per the evaluation policy and appends it
    /// to the state. Returns false (and logs) when the validation pass
    /// itself failed; invariant violations are fatal.
    async fn install<D>(
        &self,
        state: &mut GepaState,
        evaluation_policy: &mut EvaluationPolicy,
        proposal: CandidateProposal,
        valset: &D,
        valset_ids: &[ExampleId],
    ) -> Result<bool, GepaError>
    where
        D: DataLoader<Instance = A::Instance>,
    {
        let prospective = state.num_programs();
        let eval_ids = evaluation_policy.eval_ids(state, prospective, valset_ids);
        let batch = match valset.fetch(&eval_ids) {
            Ok(batch) => batch,
            Err(err) => {
                warn!("failed to fetch validation batch, dropping accepted proposal: {err:#}");
                return Ok(false);
            }
        };
        let eval = match self.adapter.evaluate(&batch, &proposal.candidate, false).await {
            Ok(eval) => eval,
            Err(err) => {
                warn!(error = %err, "validation evaluation failed, dropping accepted proposal");
                return Ok(false);
            }
        };
        if let Err(err) = eval.validate(batch.len(), false) {
            warn!(error = %err, "adapter broke the batch contract on validation");
            return Ok(false);
        }

        state.record_evals(eval_ids.len());
        if eval_ids.len() == valset_ids.len() {
            state.record_full_val_run();
        }

        let val_scores: BTreeMap<ExampleId, f32> = eval_ids
            .iter()
            .copied()
            .zip(eval.scores.iter().copied())
            .collect();
        let parent_ids = proposal.parent_ids.clone();
        let tag = proposal.tag;
        let k = state.add_program(
            proposal.candidate,
            proposal.parent_ids,
            val_scores,
            proposal.next_component,
        )?;
        info!(
            program = k,
            parents = ?parent_ids,
            tag = ?tag,
            aggregate = state.aggregate_score(k),
            "accepted new program"
        );
        Ok(true)
    }

    async fn initial_state<D>(
        &self,
        seed_candidate: Candidate,
        valset: &D,
        valset_ids: &[ExampleId],
    ) -> Result<GepaState, GepaError>
    where
        D: DataLoader<Instance = A::Instance>,
    {
        if let Some(dir) = &self.run_dir {
            match persistence::load_state(dir) {
                Ok(Some(state)) => {
                    if !state
                        .component_names()
                        .iter()
                        .map(String::as_str)
                        .eq(seed_candidate.component_names())
                    {
                        return Err(GepaError::config(
                            "persisted state component names do not match the seed candidate",
                        ));
                    }
                    info!(
                        programs = state.num_programs(),
                        iteration = state.iteration(),
                        "resuming from persisted state"
                    );
                    return Ok(state);
                }
                Ok(None) if self.resume => {
                    return Err(GepaError::config(
                        "resume requested but run_dir holds no persisted state",
                    ));
                }
                Ok(None) => {}
                Err(source) if self.resume => return Err(GepaError::Resume { source }),
                Err(err) => {
                    warn!(error = %err, "ignoring unreadable persisted state, starting fresh");
                }
            }
        }

        let batch = valset.fetch(valset_ids).map_err(GepaError::data)?;
        let eval = self
            .adapter
            .evaluate(&batch, &seed_candidate, false)
            .await
            .map_err(|source| GepaError::SeedEvaluation { source })?;
        eval.validate(batch.len(), false)
            .map_err(|source| GepaError::SeedEvaluation { source })?;

        let state = GepaState::new(seed_candidate, &eval.scores, valset_ids)?;
        info!(
            valset = valset_ids.len(),
            aggregate = state.aggregate_score(0),
            "seed candidate evaluated"
        );
        Ok(state)
    }

    fn effective_stop_conditions(&self) -> Vec<StopCondition> {
        let mut conditions = self.stop_conditions.clone();
        if let Some(limit) = self.max_metric_calls {
            conditions.push(StopCondition::max_calls(limit));
        }
        conditions
    }

    fn validate_config<D>(
        &self,
        seed_candidate: &Candidate,
        trainset: &D,
        valset: &D,
    ) -> Result<(), GepaError>
    where
        D: DataLoader<Instance = A::Instance>,
    {
        if seed_candidate.is_empty() {
            return Err(GepaError::config("seed candidate has no components"));
        }
        if seed_candidate
            .component_names()
            .any(|name| name.trim().is_empty())
        {
            return Err(GepaError::config("component names must be non-empty"));
        }
        if trainset.size() == 0 {
            return Err(GepaError::config("training set is empty"));
        }
        if valset.size() == 0 {
            return Err(GepaError::config("validation set is empty"));
        }
        if self.max_metric_calls.is_none() && self.stop_conditions.is_empty() {
            return Err(GepaError::config(
                "no stop condition configured (set max_metric_calls or stop_conditions)",
            ));
        }
        if self.max_metric_calls == Some(0) {
            return Err(GepaError::config("max_metric_calls must be positive"));
        }
        if self.reflection_minibatch_size == 0 {
            return Err(GepaError::config("reflection_minibatch_size must be positive"));
        }
        if let Some(sampler) = &self.batch_sampler
            && sampler.batch_size() == 0
        {
            return Err(GepaError::config("batch sampler size must be positive"));
        }
        if let CandidateSelector::EpsilonGreedy { epsilon } = self.candidate_selector
            && !(0.0..=1.0).contains(&epsilon)
        {
            return Err(GepaError::config("epsilon must be within [0, 1]"));
        }
        if let EvaluationPolicy::Incremental(policy) = &self.evaluation_policy {
            if policy.initial_n == 0 {
                return Err(GepaError::config("incremental initial_n must be positive"));
            }
            if policy.max_n < policy.initial_n {
                return Err(GepaError::config(
                    "incremental max_n must be at least initial_n",
                ));
            }
            if !policy.threshold.is_finite() {
                return Err(GepaError::config("incremental threshold must be finite"));
            }
        }
        if !(0.0..=1.0).contains(&self.lm_options.temperature) {
            return Err(GepaError::config("temperature must be within [0, 1]"));
        }
        if let Some(top_p) = self.lm_options.top_p
            && !(top_p > 0.0 && top_p <= 1.0)
        {
            return Err(GepaError::config("top_p must be within (0, 1]"));
        }
        if !self.perfect_score.is_finite() {
            return Err(GepaError::config("perfect_score must be finite"));
        }
        if self.use_merge && self.merge_subsample_size == 0 {
            return Err(GepaError::config("merge_subsample_size must be positive"));
        }
        if self.persist_every == 0 {
            return Err(GepaError::config("persist_every must be positive"));
        }
        if self.max_iterations == 0 {
            return Err(GepaError::config("max_iterations must be positive"));
        }
        if self.resume && self.run_dir.is_none() {
            return Err(GepaError::config("resume requires run_dir"));
        }
        Ok(())
    }
}

/// The acceptance test: reflective children must strictly beat the parent's
/// subsample sum; merge children must match or beat the better parent on the
/// shared subsample.
fn accepts(state: &GepaState, proposal: &CandidateProposal) -> bool {
    let after: f32 = proposal.scores_after.iter().sum();
    match proposal.tag {
        ProposalTag::Reflective => after > proposal.scores_before.iter().sum::<f32>(),
        ProposalTag::Merge => {
            let best_parent = proposal
                .parent_ids
                .iter()
                .map(|&parent| {
                    let subscores = state.val_subscores_of(parent);
                    proposal
                        .subsample_ids
                        .iter()
                        .filter_map(|id| subscores.get(id))
                        .sum::<f32>()
                })
                .fold(f32::NEG_INFINITY, f32::max);
            after >= best_parent
        }
    }
}
