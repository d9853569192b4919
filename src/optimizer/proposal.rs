use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::candidate::Candidate;
use crate::data::ExampleId;
use crate::state::ProgramIdx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalTag {
    Reflective,
    Merge,
}

/// A proposed child program, scored on a training/validation subsample.
///
/// The engine applies the acceptance rule for the tag: a reflective child
/// must strictly beat its parent's subsample sum; a merge child must match
/// or beat the better of its two parents on the shared subsample.
#[derive(Debug, Clone)]
pub struct CandidateProposal {
    pub candidate: Candidate,
    pub parent_ids: Vec<ProgramIdx>,
    pub subsample_ids: Vec<ExampleId>,
    pub scores_before: Vec<f32>,
    pub scores_after: Vec<f32>,
    pub tag: ProposalTag,
    pub metadata: Value,
    /// Round-robin counter the child inherits; `None` lets the state derive
    /// it from the parents.
    pub(crate) next_component: Option<usize>,
}

/// What one proposer invocation produced, plus the per-example evaluations
/// it consumed along the way (also on failure paths — budget accounting must
/// not depend on success).
#[derive(Debug)]
pub(crate) struct ProposeOutcome {
    pub proposal: Option<CandidateProposal>,
    pub evals_used: usize,
}

impl ProposeOutcome {
    pub fn none(evals_used: usize) -> Self {
        Self {
            proposal: None,
            evals_used,
        }
    }

    pub fn of(proposal: CandidateProposal, evals_used: usize) -> Self {
        Self {
            proposal: Some(proposal),
            evals_used,
        }
    }
}
