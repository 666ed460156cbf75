//! Colored output helpers for CLI
//!
//! stdout carries only the artifact location so the binary composes in
//! scripts; everything else goes to stderr.

use crate::types::FailureRecord;
use owo_colors::OwoColorize;

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print the artifact location (stdout)
    pub fn artifact(&self, path: &str) {
        println!("{}", path);
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("{} {}", "error:".red().bold(), message);
        } else {
            eprintln!("error: {}", message);
        }
    }

    /// Print a failed session summary naming the stage and error kind
    pub fn failure(&self, failure: &FailureRecord) {
        let headline = format!(
            "{} stage failed ({})",
            failure.stage.stage_name(),
            failure.kind
        );
        if self.colored {
            eprintln!("{} {}", "error:".red().bold(), headline.red().bold());
            eprintln!("  {}", failure.message.dimmed());
        } else {
            eprintln!("error: {}", headline);
            eprintln!("  {}", failure.message);
        }
    }
}
