//! The optimization engine and its proposers.
//!
//! [`GEPA::run`] drives the loop: pick a proposer (merge when scheduled,
//! reflective otherwise), test the proposed child on a subsample, re-score
//! accepted children on the validation set, and fold them into the
//! [`GepaState`](crate::state::GepaState) Pareto structures. The loop is
//! strictly sequential — each accepted child is visible to every later
//! proposal — and per-iteration failures never abort the run.
//!
//! | Proposer | Produces | When |
//! |----------|----------|------|
//! | Reflective | an LM-rewritten child of one parent | every iteration by default |
//! | Merge | a recombination of two Pareto dominators | after an accepted program, while merge credits remain |

mod engine;
mod merge;
pub mod pareto;
mod proposal;
mod prompt;
mod reflective;

pub use engine::{GEPA, GepaResult};
pub use pareto::{
    FrontierStatistics, find_dominators, frontier_statistics, is_dominated, remove_dominated,
    select_from_front,
};
pub use proposal::{CandidateProposal, ProposalTag};
pub use prompt::INSTRUCTION_PROPOSAL_PROMPT;
