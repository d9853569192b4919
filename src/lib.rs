//! Genetic-Pareto optimization of text-component programs.
//!
//! GEPA evolves a *program* — a mapping from component names to text (e.g.
//! prompt instructions) — against your own evaluation logic. You provide a
//! seed program, datasets, and an [`Adapter`] that scores candidates and
//! extracts feedback from their execution; the optimizer proposes children
//! by LM-guided reflection and by merging complementary lineages, keeps the
//! ones that win, and tracks everything on per-example Pareto fronts.
//!
//! # The mental model
//!
//! | Concept | Key types | Who provides it |
//! |---------|-----------|-----------------|
//! | **Program** | [`Candidate`] | You (the seed), then the optimizer |
//! | **Evaluation** | [`Adapter`], [`EvaluationBatch`] | You |
//! | **Reflection** | [`LanguageModel`], [`LmOptions`] | You (any completion backend) |
//! | **Search** | [`GEPA`], [`GepaState`], [`GepaResult`] | This crate |
//!
//! A run is a sequence of iterations. Each one selects a parent (Pareto
//! coverage-weighted by default), evaluates it on a training minibatch with
//! traces, asks for rewritten component texts informed by the feedback, and
//! accepts the child only if it beats the parent on that same minibatch.
//! Accepted children are re-scored on the validation set and folded into
//! the per-example fronts; two front members with a common ancestor can
//! later be merged component-by-component.
//!
//! # Quick start
//!
//! ```ignore
//! use gepa_rs::*;
//!
//! let seed = Candidate::single("instruction", "Answer the question.");
//! let trainset = InMemoryLoader::new(train_items);
//! let valset = InMemoryLoader::new(val_items);
//!
//! let optimizer = GEPA::builder()
//!     .adapter(MyAdapter::new())
//!     .reflection_lm(MyLm::connect()?)
//!     .max_metric_calls(2_000)
//!     .use_merge(true)
//!     .build();
//!
//! let result = optimizer.run(seed, &trainset, &valset).await?;
//! println!("{:?}", result.best_candidate);
//! ```
//!
//! # Crate organization
//!
//! - [`candidate`] — [`Candidate`], the component map
//! - [`adapter`] — the [`Adapter`] evaluation interface
//! - [`lm`] — [`LanguageModel`] completion interface and [`StaticLm`]
//! - [`data`] — [`DataLoader`], [`InMemoryLoader`], JSONL loading
//! - [`state`] — [`GepaState`], the evolutionary memory
//! - [`optimizer`] — [`GEPA`], the Pareto utilities, the proposers
//! - [`strategy`] — selectors, batch samplers, evaluation policies
//! - [`stop`] — [`StopCondition`]
//! - [`persistence`] — state snapshots and the cooperative stop sentinel
//! - [`utils`] — tracing setup

pub mod adapter;
pub mod candidate;
pub mod data;
pub mod errors;
pub mod lm;
pub mod optimizer;
pub mod persistence;
pub mod state;
pub mod stop;
pub mod strategy;
pub mod utils;

pub use adapter::*;
pub use candidate::*;
pub use data::*;
pub use errors::*;
pub use lm::*;
pub use optimizer::*;
pub use persistence::{SCHEMA_VERSION, STATE_FILE, STOP_SENTINEL, load_state, save_state, stop_requested};
pub use state::*;
pub use stop::*;
pub use strategy::*;
pub use utils::*;
