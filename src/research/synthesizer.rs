use crate::llm::{GenerationConstraints, Generator, Prompt, Role};
use crate::research::worker::extract_json_object;
use crate::types::{Citation, Critique, PipelineError, Report, ResearchBatch, Result, Subtopic};
use crate::utils::markers::{citation_ids, renumber_citations};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

const SYNTHESIZER_SYSTEM: &str = "You are a lead analyst. Merge the researcher notes into a \
unified deliverable. Highlight consensus, disagreements, and notable data. Cite sources only \
by their number from the source list, inline as [1], [2].";

/// A previous report and the critique it should address.
#[derive(Debug, Clone, Copy)]
pub struct Revision<'a> {
    pub previous: &'a Report,
    pub critique: &'a Critique,
}

/// Merges a research batch into a [`Report`].
pub struct Synthesizer {
    generator: Arc<dyn Generator>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub async fn synthesize(
        &self,
        question: &str,
        subtopics: &[Subtopic],
        batch: &ResearchBatch,
        revision: Option<Revision<'_>>,
    ) -> Result<Report> {
        let sources = batch.citations();
        let prompt = build_prompt(question, subtopics, batch, &sources, revision);

        let raw = self
            .generator
            .generate(Role::Synthesizer, &prompt, &GenerationConstraints::default())
            .await
            .map_err(|e| PipelineError::Synthesis(e.to_string()))?;

        let report = parse_report(&raw, &sources)?;
        validate_citations(&report, batch)?;

        tracing::info!(
            insights = report.insights.len(),
            citations = report.citations.len(),
            revision = revision.is_some(),
            "Report synthesized"
        );
        Ok(report)
    }
}

fn build_prompt(
    question: &str,
    subtopics: &[Subtopic],
    batch: &ResearchBatch,
    sources: &[Citation],
    revision: Option<Revision<'_>>,
) -> Prompt {
    let number_of: HashMap<&str, usize> = sources
        .iter()
        .enumerate()
        .map(|(i, c)| (c.url.as_str(), i + 1))
        .collect();

    let mut notes = String::new();
    for note in batch.notes() {
        let title = subtopics
            .iter()
            .find(|s| s.index == note.subtopic_index)
            .map(|s| s.title.as_str())
            .unwrap_or("Untitled subtopic");
        let cited: Vec<String> = note
            .citations
            .iter()
            .filter_map(|c| number_of.get(c.url.as_str()))
            .map(|n| format!("[{}]", n))
            .collect();
        notes.push_str(&format!(
            "{}. {}\n{}\nSources: {}\n\n",
            note.subtopic_index + 1,
            title,
            note.summary.trim(),
            if cited.is_empty() { "none".to_string() } else { cited.join(" ") }
        ));
    }

    let source_list = if sources.is_empty() {
        "No sources available. Do not cite anything.".to_string()
    } else {
        sources
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {} <{}>", i + 1, c.title, c.url))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut user = format!(
        "Original question: {}\n\nResearch notes:\n{}Source list:\n{}\n\n\
         Return a JSON object: {{\"executive_summary\": \"...\", \"insights\": [\"...\"], \
         \"citations\": [1, 2]}} where citations are numbers from the source list.",
        question, notes, source_list
    );

    if let Some(revision) = revision {
        let issues = revision
            .critique
            .issues
            .iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        user.push_str(&format!(
            "\n\nA reviewer rejected the previous draft.\nPrevious executive summary:\n{}\n\
             Issues to address:\n{}\nProduce a revised report that resolves every issue.",
            revision.previous.executive_summary, issues
        ));
    }

    Prompt::new(SYNTHESIZER_SYSTEM, user)
}

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default, alias = "summary")]
    executive_summary: String,
    #[serde(default, alias = "key_insights")]
    insights: Vec<String>,
    #[serde(default)]
    citations: Vec<RawCitationRef>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCitationRef {
    Number(usize),
    Entry {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
}

/// Parse synthesizer output against the numbered source list.
///
/// JSON output is preferred and must match the report shape once an object
/// is present. Anything else is read as Markdown-ish prose:
/// the first paragraph is the summary and bullet lines are insights.
/// Citation numbers are renumbered so the report's own list starts at 1.
pub fn parse_report(raw: &str, sources: &[Citation]) -> Result<Report> {
    let parsed = extract_json_object(raw)
        .map(|json| {
            serde_json::from_str::<RawReport>(json)
                .map_err(|e| PipelineError::Synthesis(format!("invalid report JSON: {}", e)))
        })
        .transpose()?;

    let (summary, insights, mut cited) = match parsed {
        Some(report) => {
            let mut cited = Vec::new();
            for entry in report.citations {
                match entry {
                    RawCitationRef::Number(n) if n >= 1 && n <= sources.len() => cited.push(n),
                    RawCitationRef::Number(n) => {
                        return Err(PipelineError::Synthesis(format!(
                            "report cites source {} but only {} sources exist",
                            n,
                            sources.len()
                        )));
                    }
                    RawCitationRef::Entry { url, title } => {
                        match sources.iter().position(|c| c.url == url.trim()) {
                            Some(i) => cited.push(i + 1),
                            None => {
                                return Err(PipelineError::Synthesis(format!(
                                    "report cites {} ({}) which no researcher found",
                                    url,
                                    title.unwrap_or_default()
                                )));
                            }
                        }
                    }
                }
            }
            (report.executive_summary, report.insights, cited)
        }
        None => {
            let (summary, insights) = parse_prose(raw);
            (summary, insights, Vec::new())
        }
    };

    cited.extend(citation_ids(&summary));
    for insight in &insights {
        cited.extend(citation_ids(insight));
    }

    // Source numbers in first-cited order, mapped to the report's own numbering.
    let mut renumber: HashMap<usize, usize> = HashMap::new();
    let mut citations = Vec::new();
    cited.retain(|n| *n >= 1 && *n <= sources.len());
    for n in cited {
        if !renumber.contains_key(&n) {
            citations.push(sources[n - 1].clone());
            renumber.insert(n, citations.len());
        }
    }

    let summary = renumber_citations(summary.trim(), |n| renumber.get(&n).copied());
    let insights: Vec<String> = insights
        .iter()
        .map(|i| renumber_citations(i.trim(), |n| renumber.get(&n).copied()))
        .filter(|i| !i.is_empty())
        .collect();

    if summary.is_empty() {
        return Err(PipelineError::Synthesis(
            "report has no executive summary".to_string(),
        ));
    }

    Ok(Report {
        executive_summary: summary,
        insights,
        citations,
    })
}

fn parse_prose(raw: &str) -> (String, Vec<String>) {
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut summary_done = false;
    let mut insights = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !summary_lines.is_empty() {
                summary_done = true;
            }
            continue;
        }
        if line.starts_with('#') || line.starts_with("```") {
            if !summary_lines.is_empty() {
                summary_done = true;
            }
            continue;
        }
        let bullet = ["- ", "* ", "• "]
            .iter()
            .find_map(|m| line.strip_prefix(m));
        match bullet {
            Some(item) => {
                insights.push(item.trim().to_string());
                if !summary_lines.is_empty() {
                    summary_done = true;
                }
            }
            None if !summary_done => summary_lines.push(line),
            None => {}
        }
    }

    let summary = summary_lines.join(" ");
    let summary = summary
        .strip_prefix("Executive Summary:")
        .map(str::trim)
        .unwrap_or(&summary)
        .to_string();
    (summary, insights)
}

/// Every report citation must come from a researcher's note.
pub fn validate_citations(report: &Report, batch: &ResearchBatch) -> Result<()> {
    let known = batch.citations();
    for citation in &report.citations {
        if !known.iter().any(|c| c.url == citation.url) {
            return Err(PipelineError::Synthesis(format!(
                "citation {} does not come from any evidence note",
                citation.url
            )));
        }
    }
    Ok(())
}
