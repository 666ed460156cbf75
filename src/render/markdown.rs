use super::{ArtifactSink, ConflictPolicy};
use crate::types::{Report, SinkError};
use crate::utils::markers::link_citations;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const MAX_SLUG_LEN: usize = 60;
const DEFAULT_SLUG: &str = "research-summary";

/// Writes reports as Markdown files under one output directory.
#[derive(Debug, Clone)]
pub struct MarkdownSink {
    output_dir: PathBuf,
    on_conflict: ConflictPolicy,
}

impl MarkdownSink {
    pub fn new(output_dir: impl Into<PathBuf>, on_conflict: ConflictPolicy) -> Self {
        Self {
            output_dir: output_dir.into(),
            on_conflict,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Create `path` only if it does not exist yet.
    fn create_new(path: &Path, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()
    }
}

impl ArtifactSink for MarkdownSink {
    fn write(&self, title: &str, question: &str, report: &Report) -> Result<PathBuf, SinkError> {
        std::fs::create_dir_all(&self.output_dir)?;

        let slug = slugify(title);
        let content = render_markdown(title, question, report);
        let mut counter = 1;
        loop {
            let name = if counter == 1 {
                format!("{}.md", slug)
            } else {
                format!("{}-{}.md", slug, counter)
            };
            let path = self.output_dir.join(name);

            match Self::create_new(&path, &content) {
                Ok(()) => {
                    tracing::info!(path = %path.display(), "Report written");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => match self.on_conflict {
                    ConflictPolicy::Reject => return Err(SinkError::PathConflict(path)),
                    ConflictPolicy::Suffix => counter += 1,
                },
                Err(e) => return Err(SinkError::Io(e)),
            }
        }
    }
}

/// Lowercase ASCII slug of at most 60 characters, never empty.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    let slug = if slug.len() > MAX_SLUG_LEN {
        slug[..MAX_SLUG_LEN].trim_end_matches('-')
    } else {
        slug
    };

    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Render the report layout: title, question, summary, insights, citations.
pub fn render_markdown(title: &str, question: &str, report: &Report) -> String {
    let link = |text: &str| {
        link_citations(text, |n| {
            n.checked_sub(1)
                .and_then(|i| report.citations.get(i))
                .map(|c| c.url.clone())
        })
    };

    let mut out = format!("# {}\n\n**Query:** {}\n\n", title.trim(), question.trim());

    out.push_str("## Executive Summary\n\n");
    let summary = report.executive_summary.trim();
    if summary.is_empty() {
        out.push_str("_No synthesis available._\n\n");
    } else {
        out.push_str(&link(summary));
        out.push_str("\n\n");
    }

    if !report.insights.is_empty() {
        out.push_str("## Key Insights\n\n");
        for insight in &report.insights {
            out.push_str(&format!("- {}\n", link(insight)));
        }
        out.push('\n');
    }

    if !report.citations.is_empty() {
        out.push_str("## Citations\n\n");
        for (i, citation) in report.citations.iter().enumerate() {
            let label = if citation.title.trim().is_empty() {
                citation.url.as_str()
            } else {
                citation.title.trim()
            };
            out.push_str(&format!("{}. [{}](<{}>)\n", i + 1, label, citation.url));
        }
    }

    format!("{}\n", out.trim_end())
}
