use crate::llm::{GenerationConstraints, Generator, Prompt, Role};
use crate::render::ArtifactSink;
use crate::types::{Artifact, PipelineError, Report, Result};
use crate::utils::markers::renumber_citations;
use chrono::Utc;
use std::sync::Arc;

const MAX_TITLE_WORDS: usize = 8;
const FALLBACK_TITLE: &str = "Research Summary";

const TITLE_SYSTEM: &str = "You craft concise report titles. Keep titles under 8 words, \
informative, and free of punctuation except hyphens. Return only the title text.";

/// Titles a report and hands it to an [`ArtifactSink`].
pub struct Publisher {
    sink: Arc<dyn ArtifactSink>,
    title_generator: Option<Arc<dyn Generator>>,
}

impl Publisher {
    pub fn new(sink: Arc<dyn ArtifactSink>) -> Self {
        Self {
            sink,
            title_generator: None,
        }
    }

    /// Ask the publisher role for a headline; the derived title is the fallback.
    pub fn with_generated_titles(mut self, generator: Arc<dyn Generator>) -> Self {
        self.title_generator = Some(generator);
        self
    }

    /// Write the report once. Sink failures are returned as-is, never retried.
    pub async fn publish(&self, question: &str, report: &Report) -> Result<Artifact> {
        let title = match &self.title_generator {
            Some(generator) => self.generated_title(generator.as_ref(), question, report).await,
            None => derive_title(report, question),
        };

        let path = self
            .sink
            .write(&title, question, report)
            .map_err(PipelineError::Publish)?;

        Ok(Artifact {
            title,
            path: path.to_string_lossy().into_owned(),
            rendered_at: Utc::now(),
        })
    }

    async fn generated_title(&self, generator: &dyn Generator, question: &str, report: &Report) -> String {
        let summary: String = report.executive_summary.chars().take(500).collect();
        let prompt = Prompt::new(
            TITLE_SYSTEM,
            format!("Research question: {}\nExecutive summary (truncated): {}", question, summary),
        );

        match generator
            .generate(Role::Publisher, &prompt, &GenerationConstraints::default())
            .await
        {
            Ok(raw) => {
                let first_line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
                let title = sanitize_title(&first_line.replace('_', " "));
                if title.is_empty() {
                    derive_title(report, question)
                } else {
                    title
                }
            }
            Err(e) => {
                tracing::warn!("Title generation failed, deriving title instead: {}", e);
                derive_title(report, question)
            }
        }
    }
}

/// Deterministic title: the summary's first sentence without citation
/// markers, else the question.
///
/// Never empty.
pub fn derive_title(report: &Report, question: &str) -> String {
    let summary = renumber_citations(&report.executive_summary, |_| None);
    let first_sentence = summary
        .split_terminator(['.', '!', '?', '\n'])
        .next()
        .unwrap_or("");

    [first_sentence, question]
        .iter()
        .map(|candidate| sanitize_title(candidate))
        .find(|title| !title.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

/// Keep words made of letters, digits, and hyphens; cap at eight words.
fn sanitize_title(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-')
                .collect::<String>()
        })
        .map(|word| word.trim_matches('-').to_string())
        .filter(|word| !word.is_empty())
        .take(MAX_TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}
