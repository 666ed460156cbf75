//! LLM provider clients and role routing
//!
//! # Architecture
//!
//! - [`LLMClient`] - The trait every provider client implements
//! - [`Provider`] - Runtime provider selection (Ollama or OpenAI-compatible)
//! - [`Generator`] - Role-aware generation used by pipeline stages
//! - [`RoleRouter`] - The production [`Generator`], layering per-role sampling
//!   defaults and configuration overrides before calling the client
//!
//! # Example
//!
//! ```ignore
//! use swarm::llm::{Generator, GenerationConstraints, Prompt, Role, RoleRouter};
//!
//! let router = RoleRouter::from_config(&config.llm);
//! let text = router
//!     .generate(Role::Planner, &Prompt::new(system, question), &GenerationConstraints::default())
//!     .await?;
//! ```

/// Core client trait, constraints, and provider selection.
pub mod client;
/// Ollama `/api/chat` client.
pub mod ollama;
/// OpenAI-compatible `/chat/completions` client.
pub mod openai;
/// Role-aware [`Generator`] implementation.
pub mod router;

pub use client::{GenerationConstraints, Generator, LLMClient, Prompt, Provider, Role};
pub use router::RoleRouter;
