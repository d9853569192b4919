use indexmap::IndexMap;

use crate::candidate::Candidate;
use crate::errors::AdapterError;

/// Feedback records per component, built by the adapter from captured traces.
///
/// Records are opaque to the optimizer but must be textually renderable — the
/// default proposer embeds them as Markdown into the reflection prompt.
pub type ReflectiveDataset = IndexMap<String, Vec<serde_json::Value>>;

/// Result of evaluating one candidate on one batch.
///
/// `outputs` and `scores` are parallel to the input batch; `trajectories` is
/// present (and parallel) exactly when traces were requested. Scores are
/// finite, higher-is-better. Per-item failures never surface here — the
/// adapter scores them low instead.
#[derive(Debug, Clone)]
pub struct EvaluationBatch<O, T> {
    pub outputs: Vec<O>,
    pub scores: Vec<f32>,
    pub trajectories: Option<Vec<T>>,
}

impl<O, T> EvaluationBatch<O, T> {
    /// Checks the shape contract against the input batch length.
    pub fn validate(&self, expected: usize, expect_traces: bool) -> Result<(), AdapterError> {
        if self.outputs.len() != expected || self.scores.len() != expected {
            return Err(AdapterError::ShapeMismatch {
                expected,
                outputs: self.outputs.len(),
                scores: self.scores.len(),
            });
        }
        if expect_traces
            && self
                .trajectories
                .as_ref()
                .is_none_or(|trajectories| trajectories.len() != expected)
        {
            return Err(AdapterError::TrajectoryMismatch { expected });
        }
        if let Some(position) = self.scores.iter().position(|score| !score.is_finite()) {
            return Err(AdapterError::NonFiniteScore { position });
        }
        Ok(())
    }
}

/// How the optimizer evaluates candidates and learns from their behavior.
///
/// Implementations own everything task-specific: running the program,
/// scoring it, and turning captured traces into feedback the reflection
/// prompt can use. The optimizer only ever sees scores and opaque records.
///
/// An adapter may evaluate batch items in parallel internally, but must
/// return results in input order. Timeouts, retries, and rate limits are
/// the adapter's responsibility, not the optimizer's.
#[allow(async_fn_in_trait)]
pub trait Adapter {
    /// One dataset item.
    type Instance;
    /// Opaque per-item program output.
    type Output;
    /// Opaque per-item execution trace, captured on request.
    type Trace;

    /// Runs `candidate` on `batch` and scores every item.
    ///
    /// Must uphold [`EvaluationBatch::validate`]: one output and one finite
    /// score per item, trajectories iff `capture_traces`. Errors from this
    /// method mean the whole call failed (e.g. transport down) — the
    /// optimizer logs them and moves on.
    async fn evaluate(
        &self,
        batch: &[Self::Instance],
        candidate: &Candidate,
        capture_traces: bool,
    ) -> Result<EvaluationBatch<Self::Output, Self::Trace>, AdapterError>;

    /// Distills a traced evaluation into per-component feedback records.
    fn make_reflective_dataset(
        &self,
        candidate: &Candidate,
        eval_batch: &EvaluationBatch<Self::Output, Self::Trace>,
        components_to_update: &[String],
    ) -> Result<ReflectiveDataset, AdapterError>;

    /// Optional: propose new component texts directly, bypassing the default
    /// reflection-prompt path. Return `None` (the default) to let the
    /// optimizer drive its own language model.
    async fn propose_new_texts(
        &self,
        candidate: &Candidate,
        reflective_dataset: &ReflectiveDataset,
        components_to_update: &[String],
    ) -> Option<Result<IndexMap<String, String>, AdapterError>> {
        let _ = (candidate, reflective_dataset, components_to_update);
        None
    }
}
