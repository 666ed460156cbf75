//! # research-swarm
//!
//! A collaborative research pipeline. A question is planned into subtopics,
//! researched concurrently by a bounded pool of specialist workers,
//! synthesized into a cited report, optionally critiqued and revised, and
//! published as a Markdown file.
//!
//! ## Overview
//!
//! research-swarm can be used in two ways:
//!
//! 1. **As a command-line tool** - Run the `research-swarm` binary
//! 2. **As a library** - Embed [`ResearchPipeline`] in your own project
//!
//! ### Basic Example
//!
//! ```rust,ignore
//! use swarm::{ResearchPipeline, SwarmConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = SwarmConfig::load_or_default("swarm.toml")?;
//!     config.apply_env_overrides()?;
//!
//!     let pipeline = ResearchPipeline::from_config(&config).await;
//!     let run = pipeline.run("Impact of renewable energy subsidies").await?;
//!     println!("{}", run.artifact.path);
//!     Ok(())
//! }
//! ```
//!
//! ### Custom Components
//!
//! ```rust,ignore
//! use swarm::{memory::InMemoryStore, ResearchPipeline, RoleRouter};
//! use std::sync::Arc;
//!
//! let pipeline = ResearchPipeline::builder(Arc::new(router))
//!     .store(Arc::new(InMemoryStore::new()))
//!     .max_subtopics(3)
//!     .evaluator(true)
//!     .build();
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `web-search` | Live web search via daedra (default) |
//!
//! ## Modules
//!
//! - [`workflows`] - Session state machine and pipeline engine
//! - [`research`] - Planner, worker pool, synthesizer, evaluator, publisher
//! - [`memory`] - Shared state store (in-memory and libsql)
//! - [`llm`] - Generation clients and per-role routing
//! - [`tools`] - Evidence providers
//! - [`render`] - Markdown rendering and artifact sinks
//! - [`types`] - Domain records and error taxonomy

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// Command-line parsing and terminal output.
pub mod cli;
/// Generation clients and role routing.
pub mod llm;
/// Shared state store.
pub mod memory;
/// Markdown rendering and artifact sinks.
pub mod render;
/// Pipeline stages.
pub mod research;
/// Evidence providers.
pub mod tools;
/// Domain types and errors.
pub mod types;
/// Configuration and text utilities.
pub mod utils;
/// Pipeline orchestration.
pub mod workflows;

// Re-export commonly used types
pub use llm::{Generator, LLMClient, Provider, RoleRouter};
pub use memory::{StateStore, StoreProvider};
pub use types::{PipelineError, Result};
pub use utils::toml_config::SwarmConfig;
pub use workflows::{PipelineFailure, PipelineRun, ResearchPipeline};
