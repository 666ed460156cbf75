//! Research stages
//!
//! Each stage is a small struct over a [`Generator`](crate::llm::Generator)
//! and whatever else it needs:
//!
//! - [`planner::Planner`] - question to ordered subtopics
//! - [`pool::ResearchPool`] - bounded fan-out of subtopics to [`worker::ResearchWorker`]s
//! - [`synthesizer::Synthesizer`] - research batch to report
//! - [`evaluator::Evaluator`] - optional report review
//! - [`publisher::Publisher`] - titled report to artifact
//!
//! The stages never talk to each other; the orchestrator in
//! [`workflows`](crate::workflows) moves data between them through the
//! shared state store.

/// Critique of synthesized reports.
pub mod evaluator;
/// Subtopic planning.
pub mod planner;
/// Bounded, order-preserving research fan-out.
pub mod pool;
/// Report titling and publication.
pub mod publisher;
/// Research batch synthesis.
pub mod synthesizer;
/// Research workers and specialist profiles.
pub mod worker;

pub use evaluator::Evaluator;
pub use planner::Planner;
pub use pool::{PoolConfig, ResearchPool};
pub use publisher::Publisher;
pub use synthesizer::{Revision, Synthesizer};
pub use worker::{ModelTier, ResearchWorker, SpecialistWorker, WorkerProfile};
