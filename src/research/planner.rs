use crate::llm::{GenerationConstraints, Generator, Prompt, Role};
use crate::types::{PipelineError, Result, Subtopic};
use std::collections::HashSet;
use std::sync::Arc;

const PLANNER_SYSTEM: &str = "You are a research planner. Break the user request into concise, \
non-overlapping subtopics that will guide a team of researchers. Focus on coverage and avoid \
redundancy.";

/// Decomposes a question into an ordered list of subtopics.
pub struct Planner {
    generator: Arc<dyn Generator>,
    max_subtopics: usize,
}

impl Planner {
    pub fn new(generator: Arc<dyn Generator>, max_subtopics: usize) -> Self {
        Self {
            generator,
            max_subtopics: max_subtopics.max(1),
        }
    }

    pub async fn plan(&self, question: &str) -> Result<Vec<Subtopic>> {
        let user = format!(
            "User request: {}\n\
             Provide between 1 and {} lines outlining the research plan, one subtopic per line, \
             numbered 1-{}. Use the form `Title: what to investigate`.",
            question, self.max_subtopics, self.max_subtopics
        );
        let raw = self
            .generator
            .generate(
                Role::Planner,
                &Prompt::new(PLANNER_SYSTEM, user),
                &GenerationConstraints::default(),
            )
            .await
            .map_err(|e| PipelineError::Planning(e.to_string()))?;

        let subtopics = parse_plan(&raw, self.max_subtopics);
        if subtopics.is_empty() {
            return Err(PipelineError::Planning(
                "planner produced no subtopics".to_string(),
            ));
        }

        tracing::info!(count = subtopics.len(), "Research plan ready");
        Ok(subtopics)
    }
}

/// Parse planner output into at most `max` distinct subtopics, indexed from 0.
///
/// Accepts bullets (`-`, `*`, `•`) and numbering (`1.`, `2)`); a trailing colon
/// marks a heading line, which is skipped. `Title: guidance` lines are split.
pub fn parse_plan(raw: &str, max: usize) -> Vec<Subtopic> {
    let mut seen = HashSet::new();
    let mut subtopics = Vec::new();

    for line in raw.lines() {
        if subtopics.len() >= max {
            break;
        }

        let stripped = strip_marker(line.trim());
        let stripped = stripped.trim_matches(|c| c == '*' || c == '_').trim();
        if stripped.is_empty() || stripped.starts_with('#') || stripped.ends_with(':') {
            continue;
        }

        let (title, guidance) = match stripped.split_once(':') {
            Some((title, guidance)) if !title.trim().is_empty() && !guidance.trim().is_empty() => {
                (clean(title), guidance.trim().to_string())
            }
            _ => (clean(stripped), String::new()),
        };
        if title.is_empty() || !seen.insert(title.to_lowercase()) {
            continue;
        }

        subtopics.push(Subtopic {
            index: subtopics.len(),
            title,
            guidance,
        });
    }

    subtopics
}

fn strip_marker(line: &str) -> &str {
    for marker in ["- ", "* ", "• ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim_start();
        }
    }

    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim_start();
        }
    }
    line
}

fn clean(text: &str) -> String {
    text.trim()
        .trim_matches(|c| c == '*' || c == '_' || c == '"')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbered_and_bulleted_lines() {
        let raw = "Research plan:\n\
                   1. Fiscal cost: how much governments spend\n\
                   2) Deployment effects\n\
                   - **Grid stability**: intermittency and storage\n\
                   \n\
                   * Deployment effects\n";
        let plan = parse_plan(raw, 5);

        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0].title, "Fiscal cost");
        assert_eq!(plan[0].guidance, "how much governments spend");
        assert_eq!(plan[1].title, "Deployment effects");
        assert_eq!(plan[1].guidance, "");
        assert_eq!(plan[2].title, "Grid stability");
        assert_eq!(
            plan.iter().map(|s| s.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_parse_caps_at_max() {
        let raw = "1. a\n2. b\n3. c\n4. d";
        let plan = parse_plan(raw, 2);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[1].title, "b");
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_plan("   \n\n## Plan\n", 5).is_empty());
    }

    #[test]
    fn test_numbers_without_separator_are_kept() {
        let plan = parse_plan("2024 outlook for offshore wind", 3);
        assert_eq!(plan[0].title, "2024 outlook for offshore wind");
    }
}
