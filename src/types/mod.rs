use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

// ============= Session Types =============

/// Lifecycle state of a research session.
///
/// Transitions are computed by [`crate::workflows::state::next_status`]; only
/// the pipeline engine writes this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Planning,
    Researching,
    Synthesizing,
    Evaluating,
    Publishing,
    Done,
    Failed,
}

impl SessionStatus {
    /// Whether the session can no longer make progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Done | SessionStatus::Failed)
    }

    /// Lowercase stage name used in logs and failure summaries.
    pub fn stage_name(self) -> &'static str {
        match self {
            SessionStatus::Planning => "planning",
            SessionStatus::Researching => "research",
            SessionStatus::Synthesizing => "synthesis",
            SessionStatus::Evaluating => "evaluation",
            SessionStatus::Publishing => "publishing",
            SessionStatus::Done => "done",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Planning => "PLANNING",
            SessionStatus::Researching => "RESEARCHING",
            SessionStatus::Synthesizing => "SYNTHESIZING",
            SessionStatus::Evaluating => "EVALUATING",
            SessionStatus::Publishing => "PUBLISHING",
            SessionStatus::Done => "DONE",
            SessionStatus::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Why a session ended in [`SessionStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage that was running when the failure occurred
    pub stage: SessionStatus,
    /// Stable error kind, see [`PipelineError::kind`]
    pub kind: String,
    /// Human-readable error message
    pub message: String,
}

/// A single research run from question to artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub question: String,
    pub status: SessionStatus,
    /// Number of evaluator-requested re-syntheses performed so far
    #[serde(default)]
    pub revisions: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

impl Session {
    /// Start a new session in [`SessionStatus::Planning`] with a fresh key.
    pub fn new(question: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: Uuid::new_v4().to_string(),
            question: question.into(),
            status: SessionStatus::Planning,
            revisions: 0,
            created_at: now,
            updated_at: now,
            failure: None,
        }
    }
}

// ============= Research Data Types =============

/// One planner-issued unit of research work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtopic {
    /// 0-based position in the plan; the only ordering key in the pipeline
    pub index: usize,
    pub title: String,
    #[serde(default)]
    pub guidance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
}

/// A ranked result returned by an evidence provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

impl SearchHit {
    pub fn citation(&self) -> Citation {
        Citation {
            url: self.url.clone(),
            title: self.title.clone(),
        }
    }
}

/// One worker's findings for a single subtopic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceNote {
    pub subtopic_index: usize,
    pub summary: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// The index-complete set of evidence notes for a session.
///
/// Can only be built through [`ResearchBatch::assemble`], which enforces that
/// there is exactly one note per subtopic index in `0..N`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchBatch {
    notes: Vec<EvidenceNote>,
}

impl ResearchBatch {
    /// Order `notes` by subtopic index and check that they cover `0..expected`
    /// exactly once.
    pub fn assemble(expected: usize, notes: Vec<EvidenceNote>) -> Result<Self> {
        let mut slots: Vec<Option<EvidenceNote>> = vec![None; expected];
        for note in notes {
            let index = note.subtopic_index;
            match slots.get_mut(index) {
                Some(slot @ None) => *slot = Some(note),
                Some(Some(_)) => {
                    return Err(PipelineError::IncompleteBatch(format!(
                        "duplicate evidence note for subtopic {}",
                        index
                    )));
                }
                None => {
                    return Err(PipelineError::IncompleteBatch(format!(
                        "evidence note for subtopic {} is outside the plan of {} subtopics",
                        index, expected
                    )));
                }
            }
        }

        let mut ordered = Vec::with_capacity(expected);
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(note) => ordered.push(note),
                None => {
                    return Err(PipelineError::IncompleteBatch(format!(
                        "missing evidence note for subtopic {}",
                        index
                    )));
                }
            }
        }

        Ok(Self { notes: ordered })
    }

    pub fn notes(&self) -> &[EvidenceNote] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Union of all note citations, deduplicated by URL, in subtopic order.
    pub fn citations(&self) -> Vec<Citation> {
        let mut seen = std::collections::HashSet::new();
        self.notes
            .iter()
            .flat_map(|note| note.citations.iter())
            .filter(|citation| seen.insert(citation.url.clone()))
            .cloned()
            .collect()
    }
}

/// The synthesized deliverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub executive_summary: String,
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approved,
    NeedsRevision,
}

/// Evaluator feedback on a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub verdict: Verdict,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl Critique {
    pub fn approved() -> Self {
        Self {
            verdict: Verdict::Approved,
            issues: Vec::new(),
        }
    }
}

/// The published report file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub title: String,
    pub path: String,
    pub rendered_at: DateTime<Utc>,
}

// ============= Error Types =============

/// Failures of the text-generation layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Failures of the evidence (web search) layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("Search provider unavailable: {0}")]
    ProviderUnavailable(String),
}

/// Failures of the shared state store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("State store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt value for '{field}': {reason}")]
    Corrupt { field: String, reason: String },
}

/// Failures reported by an artifact sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Artifact path already exists: {}", .0.display())]
    PathConflict(PathBuf),

    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single research task (one subtopic, one attempt).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResearchTaskError {
    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("malformed research draft: {0}")]
    MalformedOutput(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("could not commit evidence note: {0}")]
    Store(#[from] StoreError),

    #[error("task aborted: {0}")]
    Aborted(String),
}

/// Failure of the evaluator stage. Never fatal to the pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("critique generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("invalid critique: {0}")]
    InvalidCritique(String),
}

/// Pipeline-level error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Planning failed: {0}")]
    Planning(String),

    #[error(
        "Research failed for subtopic {index} after {attempts} attempt(s): {source}{}",
        format_other_failures(.other_failures)
    )]
    ResearchBatch {
        index: usize,
        attempts: u32,
        #[source]
        source: ResearchTaskError,
        other_failures: Vec<usize>,
    },

    #[error("Incomplete research batch: {0}")]
    IncompleteBatch(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    #[error("Publishing failed: {0}")]
    Publish(#[from] SinkError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

fn format_other_failures(others: &[usize]) -> String {
    if others.is_empty() {
        String::new()
    } else {
        let list: Vec<String> = others.iter().map(|i| i.to_string()).collect();
        format!(" (also failed: {})", list.join(", "))
    }
}

impl PipelineError {
    /// Stable snake_case name of the error kind, recorded on failed sessions.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Planning(_) => "planning_error",
            PipelineError::ResearchBatch { .. } => "research_batch_error",
            PipelineError::IncompleteBatch(_) => "incomplete_batch",
            PipelineError::Synthesis(_) => "synthesis_error",
            PipelineError::Publish(_) => "publish_error",
            PipelineError::Store(_) => "store_error",
            PipelineError::Config(_) => "config_error",
            PipelineError::InvalidTransition(_) => "invalid_transition",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn note(index: usize, urls: &[&str]) -> EvidenceNote {
        EvidenceNote {
            subtopic_index: index,
            summary: format!("summary {}", index),
            citations: urls
                .iter()
                .map(|u| Citation {
                    url: u.to_string(),
                    title: format!("title for {}", u),
                })
                .collect(),
            worker_id: "scout-alpha".to_string(),
            confidence: None,
        }
    }

    #[test]
    fn test_assemble_orders_by_index() {
        let batch = ResearchBatch::assemble(3, vec![note(2, &[]), note(0, &[]), note(1, &[])])
            .unwrap();
        let indices: Vec<usize> = batch.notes().iter().map(|n| n.subtopic_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_assemble_rejects_gaps_and_duplicates() {
        let missing = ResearchBatch::assemble(3, vec![note(0, &[]), note(2, &[])]);
        assert!(matches!(missing, Err(PipelineError::IncompleteBatch(msg)) if msg.contains("subtopic 1")));

        let duplicate = ResearchBatch::assemble(2, vec![note(0, &[]), note(0, &[]), note(1, &[])]);
        assert!(matches!(duplicate, Err(PipelineError::IncompleteBatch(_))));

        let outside = ResearchBatch::assemble(1, vec![note(0, &[]), note(5, &[])]);
        assert!(matches!(outside, Err(PipelineError::IncompleteBatch(_))));
    }

    #[test]
    fn test_batch_citations_union_dedups_by_url() {
        let batch = ResearchBatch::assemble(
            2,
            vec![note(0, &["https://a", "https://b"]), note(1, &["https://b", "https://c"])],
        )
        .unwrap();
        let urls: Vec<String> = batch.citations().into_iter().map(|c| c.url).collect();
        assert_eq!(urls, vec!["https://a", "https://b", "https://c"]);
    }

    #[test]
    fn test_session_status_serializes_screaming_case() {
        let json = serde_json::to_string(&SessionStatus::Synthesizing).unwrap();
        assert_eq!(json, "\"SYNTHESIZING\"");

        let verdict: Verdict = serde_json::from_str("\"NEEDS_REVISION\"").unwrap();
        assert_eq!(verdict, Verdict::NeedsRevision);
    }

    #[test]
    fn test_research_batch_error_names_index() {
        let err = PipelineError::ResearchBatch {
            index: 2,
            attempts: 3,
            source: ResearchTaskError::MalformedOutput("empty draft".to_string()),
            other_failures: vec![4],
        };
        let msg = err.to_string();
        assert!(msg.contains("subtopic 2"));
        assert!(msg.contains("also failed: 4"));
        assert_eq!(err.kind(), "research_batch_error");
    }
}
