use crate::llm::{GenerationConstraints, Generator, Prompt, Role};
use crate::research::worker::extract_json_object;
use crate::types::{Critique, EvaluationError, Report, ResearchBatch, Verdict};
use serde::Deserialize;
use std::sync::Arc;

const EVALUATOR_SYSTEM: &str = "You are a critical reviewer. Inspect the report for unsupported \
claims, missing evidence, and potential bias. Approve reports that answer the question and are \
supported by the research notes.";

/// Reviews a synthesized report and returns a [`Critique`].
///
/// Errors from this stage are never fatal; the orchestrator treats them as
/// an approval.
pub struct Evaluator {
    generator: Arc<dyn Generator>,
}

impl Evaluator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub async fn evaluate(
        &self,
        question: &str,
        report: &Report,
        batch: &ResearchBatch,
    ) -> Result<Critique, EvaluationError> {
        let structural = structural_issues(report, batch);
        if !structural.is_empty() {
            tracing::info!(issues = structural.len(), "Report failed structural review");
            return Ok(Critique {
                verdict: Verdict::NeedsRevision,
                issues: structural,
            });
        }

        let notes = batch
            .notes()
            .iter()
            .map(|n| format!("{}. {}", n.subtopic_index + 1, n.summary.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        let insights = report
            .insights
            .iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let user = format!(
            "Original question: {}\n\nExecutive summary:\n{}\n\nKey insights:\n{}\n\n\
             Research notes:\n{}\n\n\
             Respond with JSON only: {{\"verdict\": \"APPROVED\" or \"NEEDS_REVISION\", \
             \"issues\": [\"...\"]}}. List concrete issues when revision is needed.",
            question, report.executive_summary, insights, notes
        );

        let raw = self
            .generator
            .generate(
                Role::Evaluator,
                &Prompt::new(EVALUATOR_SYSTEM, user),
                &GenerationConstraints::default(),
            )
            .await?;

        let critique = parse_critique(&raw)?;
        tracing::info!(verdict = ?critique.verdict, issues = critique.issues.len(), "Report reviewed");
        Ok(critique)
    }
}

/// Problems that need no model to spot.
fn structural_issues(report: &Report, batch: &ResearchBatch) -> Vec<String> {
    let mut issues = Vec::new();
    if report.insights.is_empty() {
        issues.push("The report has no key insights.".to_string());
    }
    let known = batch.citations();
    for citation in &report.citations {
        if !known.iter().any(|c| c.url == citation.url) {
            issues.push(format!(
                "Citation {} is not backed by any research note.",
                citation.url
            ));
        }
    }
    issues
}

#[derive(Debug, Deserialize)]
struct RawCritique {
    verdict: String,
    #[serde(default)]
    issues: Vec<String>,
}

fn parse_verdict(text: &str) -> Option<Verdict> {
    let normalized = text.trim().to_uppercase().replace([' ', '-'], "_");
    if normalized.contains("NEEDS_REVISION") || normalized.contains("REVISE") {
        Some(Verdict::NeedsRevision)
    } else if normalized.contains("APPROVED") || normalized == "APPROVE" {
        Some(Verdict::Approved)
    } else {
        None
    }
}

/// Parse evaluator output. A revision request must name at least one issue.
pub fn parse_critique(raw: &str) -> Result<Critique, EvaluationError> {
    let (verdict, issues) = match extract_json_object(raw)
        .and_then(|json| serde_json::from_str::<RawCritique>(json).ok())
    {
        Some(parsed) => {
            let verdict = parse_verdict(&parsed.verdict).ok_or_else(|| {
                EvaluationError::InvalidCritique(format!("unknown verdict '{}'", parsed.verdict))
            })?;
            (verdict, parsed.issues)
        }
        None => {
            let verdict = parse_verdict(raw).ok_or_else(|| {
                EvaluationError::InvalidCritique("no verdict in evaluator output".to_string())
            })?;
            let issues = raw
                .lines()
                .filter_map(|l| {
                    let l = l.trim();
                    l.strip_prefix("- ").or_else(|| l.strip_prefix("* "))
                })
                .map(|l| l.trim().to_string())
                .collect();
            (verdict, issues)
        }
    };

    let issues: Vec<String> = issues
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();

    if verdict == Verdict::NeedsRevision && issues.is_empty() {
        return Err(EvaluationError::InvalidCritique(
            "revision requested without any issues".to_string(),
        ));
    }

    Ok(Critique { verdict, issues })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Citation, EvidenceNote};

    #[test]
    fn test_parse_json_critique() {
        let critique =
            parse_critique(r#"{"verdict": "NEEDS_REVISION", "issues": ["Missing cost data", " "]}"#)
                .unwrap();
        assert_eq!(critique.verdict, Verdict::NeedsRevision);
        assert_eq!(critique.issues, vec!["Missing cost data"]);

        let critique = parse_critique(r#"{"verdict": "approved"}"#).unwrap();
        assert_eq!(critique, Critique::approved());
    }

    #[test]
    fn test_parse_text_critique() {
        let critique = parse_critique("Verdict: needs revision\n- No regional breakdown").unwrap();
        assert_eq!(critique.verdict, Verdict::NeedsRevision);
        assert_eq!(critique.issues, vec!["No regional breakdown"]);
    }

    #[test]
    fn test_revision_without_issues_is_invalid() {
        assert!(matches!(
            parse_critique(r#"{"verdict": "NEEDS_REVISION", "issues": []}"#),
            Err(EvaluationError::InvalidCritique(_))
        ));
        assert!(matches!(
            parse_critique("looks fine to me"),
            Err(EvaluationError::InvalidCritique(_))
        ));
    }

    #[test]
    fn test_structural_issues() {
        let batch = ResearchBatch::assemble(
            1,
            vec![EvidenceNote {
                subtopic_index: 0,
                summary: "s".into(),
                citations: vec![],
                worker_id: "w".into(),
                confidence: None,
            }],
        )
        .unwrap();
        let report = Report {
            executive_summary: "x".into(),
            insights: vec![],
            citations: vec![Citation {
                url: "https://made-up.example".into(),
                title: "?".into(),
            }],
        };
        let issues = structural_issues(&report, &batch);
        assert_eq!(issues.len(), 2);
    }
}
