//! Artifact rendering
//!
//! An [`ArtifactSink`] turns a titled report into a durable artifact and
//! returns where it landed. [`MarkdownSink`] is the only built-in sink.

/// Markdown file sink.
pub mod markdown;

pub use markdown::{render_markdown, slugify, MarkdownSink};

use crate::types::{Report, SinkError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Destination for published reports.
pub trait ArtifactSink: Send + Sync {
    fn write(&self, title: &str, question: &str, report: &Report) -> Result<PathBuf, SinkError>;
}

/// What to do when the artifact path is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Append `-2`, `-3`, ... until a free name is found
    #[default]
    Suffix,
    /// Fail with [`SinkError::PathConflict`]
    Reject,
}
