use indexmap::IndexMap;
use rand::rngs::StdRng;
use serde_json::json;
use tracing::{debug, warn};

use crate::adapter::{Adapter, ReflectiveDataset};
use crate::candidate::Candidate;
use crate::data::DataLoader;
use crate::errors::LmError;
use crate::lm::{LanguageModel, LmOptions};
use crate::state::GepaState;
use crate::strategy::{BatchSampler, CandidateSelector, ComponentSelector};
use crate::utils::truncate;

use super::proposal::{CandidateProposal, ProposalTag, ProposeOutcome};
use super::prompt::{extract_fenced_block, render_proposal_prompt};

/// One reflective-mutation attempt: evaluate a parent on a training
/// minibatch with traces, ask for rewritten component texts informed by the
/// feedback, and score the child on the same minibatch.
///
/// Every failure here is absorbed — logged and reported as "no proposal" —
/// so a flaky adapter or model never kills the run.
pub(crate) struct ReflectiveProposer {
    pub skip_perfect_score: bool,
    pub perfect_score: f32,
    pub lm_options: LmOptions,
}

impl ReflectiveProposer {
    #[allow(clippy::too_many_arguments)]
    pub async fn propose<A, L, D>(
        &self,
        state: &GepaState,
        adapter: &A,
        reflection_lm: Option<&L>,
        trainset: &D,
        candidate_selector: &CandidateSelector,
        component_selector: &ComponentSelector,
        batch_sampler: &mut BatchSampler,
        rng: &mut StdRng,
    ) -> ProposeOutcome
    where
        A: Adapter,
        L: LanguageModel,
        D: DataLoader<Instance = A::Instance>,
    {
        let mut evals_used = 0;

        let parent_idx = candidate_selector.select(state, rng);
        let parent = state.candidate(parent_idx).clone();

        let train_ids = trainset.all_ids();
        let batch_ids = batch_sampler.next_batch(state.iteration(), &train_ids);
        if batch_ids.is_empty() {
            warn!("training minibatch came back empty, skipping proposal");
            return ProposeOutcome::none(evals_used);
        }
        let batch = match trainset.fetch(&batch_ids) {
            Ok(batch) => batch,
            Err(err) => {
                warn!("failed to fetch training minibatch: {err:#}");
                return ProposeOutcome::none(evals_used);
            }
        };

        let eval_before = match adapter.evaluate(&batch, &parent, true).await {
            Ok(eval) => eval,
            Err(err) => {
                warn!(parent = parent_idx, error = %err, "parent evaluation failed");
                return ProposeOutcome::none(evals_used);
            }
        };
        if let Err(err) = eval_before.validate(batch.len(), true) {
            warn!(parent = parent_idx, error = %err, "adapter broke the batch contract");
            return ProposeOutcome::none(evals_used);
        }
        evals_used += batch.len();

        if self.skip_perfect_score
            && eval_before
                .scores
                .iter()
                .all(|&score| score == self.perfect_score)
        {
            debug!(parent = parent_idx, "minibatch already at perfect score, skipping");
            return ProposeOutcome::none(evals_used);
        }

        let choice = component_selector.select(state, parent_idx);
        let dataset = match adapter.make_reflective_dataset(&parent, &eval_before, &choice.names) {
            Ok(dataset) => dataset,
            Err(err) => {
                warn!(parent = parent_idx, error = %err, "reflective dataset construction failed");
                return ProposeOutcome::none(evals_used);
            }
        };

        let new_texts = match adapter
            .propose_new_texts(&parent, &dataset, &choice.names)
            .await
        {
            Some(Ok(texts)) => texts,
            Some(Err(err)) => {
                warn!(error = %err, "adapter text proposal failed");
                return ProposeOutcome::none(evals_used);
            }
            None => match reflection_lm {
                Some(lm) => match self.propose_via_lm(lm, &parent, &dataset, &choice.names).await {
                    Ok(texts) => texts,
                    Err(err) => {
                        warn!(error = %err, failure = ?err.failure(), "reflection model call failed");
                        return ProposeOutcome::none(evals_used);
                    }
                },
                None => {
                    warn!("adapter does not propose texts and no reflection model is configured");
                    return ProposeOutcome::none(evals_used);
                }
            },
        };

        let mut child = parent.clone();
        for (name, text) in new_texts {
            if !choice.names.contains(&name) {
                debug!(component = %name, "ignoring proposed text for unselected component");
                continue;
            }
            if !child.set(&name, text) {
                debug!(component = %name, "ignoring proposed text for unknown component");
            }
        }
        if child == parent {
            debug!(parent = parent_idx, "proposed texts identical to parent, dropping");
            return ProposeOutcome::none(evals_used);
        }

        let eval_after = match adapter.evaluate(&batch, &child, false).await {
            Ok(eval) => eval,
            Err(err) => {
                warn!(parent = parent_idx, error = %err, "child evaluation failed");
                return ProposeOutcome::none(evals_used);
            }
        };
        if let Err(err) = eval_after.validate(batch.len(), false) {
            warn!(parent = parent_idx, error = %err, "adapter broke the batch contract");
            return ProposeOutcome::none(evals_used);
        }
        evals_used += batch.len();

        debug!(
            parent = parent_idx,
            components = choice.names.len(),
            minibatch = batch_ids.len(),
            "reflective proposal constructed"
        );
        ProposeOutcome::of(
            CandidateProposal {
                candidate: child,
                parent_ids: vec![parent_idx],
                subsample_ids: batch_ids,
                scores_before: eval_before.scores,
                scores_after: eval_after.scores,
                tag: ProposalTag::Reflective,
                metadata: json!({ "updated_components": choice.names }),
                next_component: choice.next_component,
            },
            evals_used,
        )
    }

    async fn propose_via_lm<L: LanguageModel>(
        &self,
        lm: &L,
        parent: &Candidate,
        dataset: &ReflectiveDataset,
        components: &[String],
    ) -> Result<IndexMap<String, String>, LmError> {
        let mut texts = IndexMap::new();
        for name in components {
            let current = parent.get(name).unwrap_or_default();
            let records = dataset.get(name).map(Vec::as_slice).unwrap_or_default();
            let prompt = render_proposal_prompt(current, records);
            debug!(
                component = %name,
                prompt = %truncate(&prompt, 240),
                "requesting instruction proposal"
            );
            let response = lm.complete(&prompt, &self.lm_options).await?;
            texts.insert(name.clone(), extract_fenced_block(&response));
        }
        Ok(texts)
    }
}
