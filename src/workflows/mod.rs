//! Research pipeline orchestration
//!
//! The pipeline is a fixed sequence of stages driven by an explicit state
//! machine:
//!
//! - [`state`] - the pure transition function over [`SessionStatus`](crate::types::SessionStatus)
//! - [`engine`] - [`ResearchPipeline`], which runs stages and persists every
//!   transition to the shared state store
//!
//! # Usage
//!
//! ```ignore
//! let pipeline = ResearchPipeline::from_config(&config).await;
//! match pipeline.run("Impact of renewable energy subsidies").await {
//!     Ok(run) => println!("{}", run.artifact.path),
//!     Err(failure) => eprintln!("{}", failure.error),
//! }
//! ```

/// Pipeline engine and builder.
pub mod engine;
/// Session state machine.
pub mod state;

pub use engine::{PipelineBuilder, PipelineFailure, PipelineRun, ResearchPipeline};
pub use state::{next_status, StageOutcome, TransitionContext};
