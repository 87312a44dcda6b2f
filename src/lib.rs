//! # phronesis
//!
//! Compute governance and answer-trust calibration for LLM-backed agents.
//!
//! The crate decides, per query, how much compute an answer deserves and
//! whether the resulting answer deserves to be shown:
//!
//! - **difficulty** — heuristic and model-backed estimators mapping a query
//!   to an easy/medium/hard level with a score and confidence
//! - **budget** — per-level compute budgets with cost accounting and a
//!   global spend limit
//! - **consistency** — adaptive self-consistency sampling with
//!   consensus-based early stopping
//! - **confidence** — token-probability and ensemble confidence estimation
//!   over candidate answers
//! - **gate** — calibration-gate routing of answers by confidence band
//! - **selective** — expected-value answer-or-abstain decisions
//! - **uncertainty** — aleatoric/epistemic classification of the query
//!   itself
//! - **pipeline** — the full flow wired end to end, with complete
//!   provenance on every answer
//!
//! ## Example
//!
//! ```no_run
//! use phronesis::budget::Budgeter;
//! use phronesis::generate::Generator;
//! use phronesis::models::{Context, PipelineConfig, Result};
//! use phronesis::pipeline::GovernancePipeline;
//! use std::sync::Arc;
//!
//! # async fn demo(generator: Arc<dyn Generator>) -> Result<()> {
//! let config = PipelineConfig::default();
//! let pipeline = GovernancePipeline::new(config, generator)?;
//!
//! let (answer, budgeter) = pipeline
//!     .run("What is the capital of France?", Budgeter::new(), &Context::new())
//!     .await?;
//!
//! println!("{} (confidence {:.2})", answer.answer.content, answer.confidence.score);
//! println!("spent so far: {:.1}", budgeter.used_budget());
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod client;
pub mod confidence;
pub mod consistency;
pub mod difficulty;
pub mod gate;
pub mod generate;
pub mod models;
pub mod pipeline;
pub mod selective;
pub mod uncertainty;

pub use budget::Budgeter;
pub use client::{CompletionOptions, HttpLanguageModel, LanguageModel};
pub use confidence::{ConfidenceEstimator, EnsembleEstimator, TokenProbabilityEstimator};
pub use consistency::{AdaptiveController, ConsistencyOutcome};
pub use difficulty::{ClassifierEstimator, DifficultyEstimator, HeuristicEstimator};
pub use gate::CalibrationGate;
pub use generate::{Aggregator, Generator, MajorityVoteAggregator};
pub use models::{PhronesisError, Result};
pub use pipeline::{GovernancePipeline, GovernedAnswer};
pub use selective::SelectiveGenerator;
pub use uncertainty::UncertaintyQuantifier;
