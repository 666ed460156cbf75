//! Research workers
//!
//! A worker turns one [`Subtopic`] into one [`EvidenceNote`]: search for
//! sources, ask its model for a structured draft grounded in those sources,
//! then resolve the draft's citation ids against the actual hits.

use crate::llm::{GenerationConstraints, Generator, Prompt, Role};
use crate::tools::search::EvidenceProvider;
use crate::types::{Citation, EvidenceNote, ResearchTaskError, SearchHit, Subtopic};
use crate::utils::markers::{citation_ids, renumber_citations};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Something that can resolve a subtopic into an evidence note.
#[async_trait]
pub trait ResearchWorker: Send + Sync {
    /// Stable identifier, recorded on every note this worker produces.
    fn id(&self) -> &str;

    async fn resolve(&self, subtopic: &Subtopic) -> Result<EvidenceNote, ResearchTaskError>;
}

/// Model tier for a worker profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Fast, breadth-oriented
    Light,
    /// Slower, depth-oriented
    Heavy,
}

/// A specialist persona: model tier, sampling, and research instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerProfile {
    pub name: String,
    pub tier: ModelTier,
    pub temperature: f32,
    pub top_p: f32,
    pub instructions: String,
}

impl WorkerProfile {
    /// The built-in roster, cycled to `size` profiles.
    ///
    /// Profiles past the fifth reuse a persona with a numeric suffix, so
    /// names stay unique (`scout-alpha-2`).
    pub fn default_roster(size: usize) -> Vec<WorkerProfile> {
        let base = base_roster();
        (0..size)
            .map(|i| {
                let mut profile = base[i % base.len()].clone();
                let cycle = i / base.len();
                if cycle > 0 {
                    profile.name = format!("{}-{}", profile.name, cycle + 1);
                }
                profile
            })
            .collect()
    }
}

fn base_roster() -> Vec<WorkerProfile> {
    let scout = "Prioritise breadth: surface the main facts, figures, and positions quickly. \
                 Prefer recent and primary sources.";
    let analyst = "Prioritise depth: weigh the evidence, note disagreements between sources, \
                   and flag claims that rest on a single source.";
    vec![
        WorkerProfile {
            name: "scout-alpha".into(),
            tier: ModelTier::Light,
            temperature: 0.2,
            top_p: 0.9,
            instructions: scout.into(),
        },
        WorkerProfile {
            name: "scout-beta".into(),
            tier: ModelTier::Light,
            temperature: 0.4,
            top_p: 0.95,
            instructions: scout.into(),
        },
        WorkerProfile {
            name: "scout-gamma".into(),
            tier: ModelTier::Light,
            temperature: 0.6,
            top_p: 0.95,
            instructions: scout.into(),
        },
        WorkerProfile {
            name: "analyst-delta".into(),
            tier: ModelTier::Heavy,
            temperature: 0.1,
            top_p: 0.9,
            instructions: analyst.into(),
        },
        WorkerProfile {
            name: "analyst-epsilon".into(),
            tier: ModelTier::Heavy,
            temperature: 0.3,
            top_p: 0.9,
            instructions: analyst.into(),
        },
    ]
}

const RESEARCHER_SYSTEM: &str = "You are a research specialist. Given source snippets, produce a \
concise factual summary highlighting key findings, data points, and differing perspectives. \
Respond with a single JSON object and nothing else.";

/// The production worker: one profile, one evidence provider, one generator.
pub struct SpecialistWorker {
    profile: WorkerProfile,
    search: Arc<dyn EvidenceProvider>,
    generator: Arc<dyn Generator>,
    max_results: usize,
    model: Option<String>,
}

impl SpecialistWorker {
    pub fn new(
        profile: WorkerProfile,
        search: Arc<dyn EvidenceProvider>,
        generator: Arc<dyn Generator>,
        max_results: usize,
    ) -> Self {
        Self {
            profile,
            search,
            generator,
            max_results,
            model: None,
        }
    }

    /// Pin this worker to a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn profile(&self) -> &WorkerProfile {
        &self.profile
    }

    fn prompt(&self, subtopic: &Subtopic, hits: &[SearchHit]) -> Prompt {
        let guidance = if subtopic.guidance.is_empty() {
            String::new()
        } else {
            format!("Focus: {}\n", subtopic.guidance)
        };
        let user = format!(
            "Topic: {}\n{}Sources:\n{}\n\n\
             Return JSON of the form:\n\
             {{\"summary\": \"3-5 sentences citing sources inline as [1], [2]\", \
             \"claims\": [{{\"text\": \"...\", \"quote\": \"...\", \"citation_id\": 1}}], \
             \"citation_map\": [{{\"id\": 1, \"url\": \"...\", \"title\": \"...\"}}], \
             \"confidence\": 0.0-1.0}}\n\
             Only cite sources from the list above.",
            subtopic.title,
            guidance,
            format_sources(hits)
        );
        Prompt::new(
            format!("{} {}", RESEARCHER_SYSTEM, self.profile.instructions),
            user,
        )
    }

    fn constraints(&self) -> GenerationConstraints {
        let constraints = GenerationConstraints::default()
            .with_temperature(self.profile.temperature)
            .with_top_p(self.profile.top_p);
        match &self.model {
            Some(model) => constraints.with_model(model.clone()),
            None => constraints,
        }
    }
}

#[async_trait]
impl ResearchWorker for SpecialistWorker {
    fn id(&self) -> &str {
        &self.profile.name
    }

    async fn resolve(&self, subtopic: &Subtopic) -> Result<EvidenceNote, ResearchTaskError> {
        let hits = self.search.search(&subtopic.title, self.max_results).await?;
        tracing::debug!(
            worker = %self.profile.name,
            subtopic = subtopic.index,
            hits = hits.len(),
            "Sources gathered"
        );

        let raw = self
            .generator
            .generate(Role::Researcher, &self.prompt(subtopic, &hits), &self.constraints())
            .await?;

        let draft = parse_draft(&raw)?;
        let citations = resolve_citations(&draft.cited_ids, &draft.listed, &hits);
        Ok(EvidenceNote {
            subtopic_index: subtopic.index,
            summary: localize_markers(&draft.summary, &hits, &citations),
            citations,
            worker_id: self.profile.name.clone(),
            confidence: draft.confidence,
        })
    }
}

fn format_sources(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No sources found.".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let title = if hit.title.is_empty() { "Untitled" } else { &hit.title };
            format!("[{}] {}\nURL: {}\n{}", i + 1, title, hit.url, hit.snippet)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    claims: Vec<RawClaim>,
    #[serde(default)]
    citation_map: Vec<RawCitation>,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    text: String,
    #[serde(default)]
    quote: Option<String>,
    #[serde(default)]
    citation_id: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawCitation {
    id: usize,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// A researcher draft normalised for citation resolution.
#[derive(Debug, PartialEq)]
struct Draft {
    summary: String,
    cited_ids: Vec<usize>,
    listed: Vec<(usize, Option<String>, Option<String>)>,
    confidence: Option<f32>,
}

/// Extract the outermost JSON object, tolerating code fences and chatter.
pub(crate) fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn parse_draft(raw: &str) -> Result<Draft, ResearchTaskError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ResearchTaskError::MalformedOutput("empty draft".into()));
    }

    let Some(json) = extract_json_object(trimmed) else {
        // Plain prose: treat the whole text as the summary.
        return Ok(Draft {
            summary: trimmed.to_string(),
            cited_ids: citation_ids(trimmed),
            listed: Vec::new(),
            confidence: None,
        });
    };

    let parsed: RawDraft = serde_json::from_str(json)
        .map_err(|e| ResearchTaskError::MalformedOutput(format!("invalid draft JSON: {}", e)))?;

    let summary = match parsed.summary.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => parsed
            .claims
            .iter()
            .map(|c| match &c.quote {
                Some(q) if !q.trim().is_empty() => format!("{} (\"{}\")", c.text.trim(), q.trim()),
                _ => c.text.trim().to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    };
    if summary.is_empty() {
        return Err(ResearchTaskError::MalformedOutput(
            "draft has no summary or claims".into(),
        ));
    }

    let mut cited_ids = citation_ids(&summary);
    cited_ids.extend(parsed.claims.iter().filter_map(|c| c.citation_id));
    cited_ids.extend(parsed.citation_map.iter().map(|c| c.id));

    Ok(Draft {
        summary,
        cited_ids,
        listed: parsed
            .citation_map
            .into_iter()
            .map(|c| (c.id, c.url, c.title))
            .collect(),
        confidence: parsed.confidence.map(|c| c.clamp(0.0, 1.0)),
    })
}

/// Map 1-based citation ids onto the search hits, deduplicated by URL.
///
/// Ids that do not name a hit are dropped; a model cannot cite a source it
/// was never shown. A listed URL that matches a hit is accepted even when
/// the id is off.
fn resolve_citations(
    ids: &[usize],
    listed: &[(usize, Option<String>, Option<String>)],
    hits: &[SearchHit],
) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut citations = Vec::new();
    let mut push = |hit: &SearchHit| {
        if seen.insert(hit.url.clone()) {
            citations.push(hit.citation());
        }
    };

    for id in ids {
        if let Some(hit) = id.checked_sub(1).and_then(|i| hits.get(i)) {
            push(hit);
        }
    }
    for (_, url, _) in listed {
        if let Some(hit) = url
            .as_deref()
            .and_then(|u| hits.iter().find(|h| h.url == u.trim()))
        {
            push(hit);
        }
    }
    citations
}

/// Rewrite hit-numbered markers so `[k]` names the note's own k-th citation.
///
/// Markers for hits that were never resolved are dropped.
fn localize_markers(summary: &str, hits: &[SearchHit], citations: &[Citation]) -> String {
    renumber_citations(summary, |id| {
        let hit = id.checked_sub(1).and_then(|i| hits.get(i))?;
        citations
            .iter()
            .position(|c| c.url == hit.url)
            .map(|p| p + 1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationError, SearchError};

    fn hits() -> Vec<SearchHit> {
        vec![
            SearchHit {
                url: "https://iea.org/report".into(),
                title: "IEA report".into(),
                snippet: "Subsidies rose".into(),
            },
            SearchHit {
                url: "https://example.org/study".into(),
                title: "Study".into(),
                snippet: "Costs fell".into(),
            },
        ]
    }

    #[test]
    fn test_roster_cycles_with_suffix() {
        let roster = WorkerProfile::default_roster(7);
        let names: Vec<_> = roster.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names[0], "scout-alpha");
        assert_eq!(names[3], "analyst-delta");
        assert_eq!(names[5], "scout-alpha-2");
        assert_eq!(names[6], "scout-beta-2");
        assert_eq!(roster[4].tier, ModelTier::Heavy);
        assert_eq!(WorkerProfile::default_roster(2).len(), 2);
    }

    #[test]
    fn test_parse_json_draft_in_code_fence() {
        let raw = "```json\n{\"summary\": \"Subsidies grew [1].\", \"claims\": [{\"text\": \"x\", \"citation_id\": 2}], \"confidence\": 1.4}\n```";
        let draft = parse_draft(raw).unwrap();
        assert_eq!(draft.summary, "Subsidies grew [1].");
        assert_eq!(draft.cited_ids, vec![1, 2]);
        assert_eq!(draft.confidence, Some(1.0));
    }

    #[test]
    fn test_summary_falls_back_to_claims() {
        let raw = r#"{"claims": [{"text": "Costs fell", "quote": "down 40%"}]}"#;
        let draft = parse_draft(raw).unwrap();
        assert_eq!(draft.summary, "Costs fell (\"down 40%\")");
    }

    #[test]
    fn test_malformed_drafts() {
        assert!(matches!(
            parse_draft("   "),
            Err(ResearchTaskError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_draft("{\"summary\": }"),
            Err(ResearchTaskError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_draft("{\"summary\": \"\"}"),
            Err(ResearchTaskError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_prose_draft_is_accepted() {
        let draft = parse_draft("Solar subsidies cut costs [2].").unwrap();
        assert_eq!(draft.cited_ids, vec![2]);
    }

    #[test]
    fn test_resolve_citations_against_hits() {
        let listed = vec![(9, Some("https://iea.org/report".to_string()), None)];
        let citations = resolve_citations(&[2, 2, 7, 0], &listed, &hits());
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].url, "https://example.org/study");
        assert_eq!(citations[1].url, "https://iea.org/report");
    }

    #[test]
    fn test_resolve_without_hits_is_empty() {
        assert!(resolve_citations(&[1, 2], &[], &[]).is_empty());
    }

    #[test]
    fn test_markers_follow_note_citations() {
        let draft = parse_draft("{\"summary\": \"Costs fell [2].\"}").unwrap();
        let citations = resolve_citations(&draft.cited_ids, &draft.listed, &hits());
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].url, "https://example.org/study");

        let summary = localize_markers(&draft.summary, &hits(), &citations);
        assert_eq!(summary, "Costs fell [1].");
    }

    #[test]
    fn test_unresolved_markers_are_dropped() {
        let citations = vec![hits()[1].citation()];
        let summary = localize_markers("Subsidies rose [1] and costs fell [2] [5].", &hits(), &citations);
        assert_eq!(summary, "Subsidies rose and costs fell [1].");
    }

    struct FixedSearch(Vec<SearchHit>);

    #[async_trait]
    impl EvidenceProvider for FixedSearch {
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchHit>, SearchError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FixedDraft(&'static str);

    #[async_trait]
    impl Generator for FixedDraft {
        async fn generate(
            &self,
            _role: Role,
            _prompt: &Prompt,
            _constraints: &GenerationConstraints,
        ) -> Result<String, GenerationError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_resolved_note_uses_its_own_numbering() {
        let worker = SpecialistWorker::new(
            WorkerProfile::default_roster(1).remove(0),
            Arc::new(FixedSearch(hits())),
            Arc::new(FixedDraft(r#"{"summary": "Costs fell [2] while subsidies rose [1]."}"#)),
            5,
        );
        let subtopic = Subtopic {
            index: 3,
            title: "Market effects".into(),
            guidance: String::new(),
        };

        let note = worker.resolve(&subtopic).await.unwrap();
        assert_eq!(note.subtopic_index, 3);
        assert_eq!(note.citations[0].url, "https://example.org/study");
        assert_eq!(note.citations[1].url, "https://iea.org/report");
        assert_eq!(note.summary, "Costs fell [1] while subsidies rose [2].");
    }
}
