//! CLI module for research-swarm
//!
//! Provides command-line parsing for the `research-swarm` binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use crate::tools::search::SearchProviderKind;
use crate::utils::toml_config::SwarmConfig;
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// research-swarm - turn a research question into a cited Markdown report
///
/// Plans subtopics, researches them concurrently with a pool of specialist
/// workers, synthesizes the findings, optionally critiques them, and writes
/// the report to disk.
#[derive(Parser, Debug)]
#[command(
    name = "research-swarm",
    version,
    about = "Turn a research question into a cited Markdown report",
    group(ArgGroup::new("input").required(true).args(["question", "file"])),
    after_help = "EXAMPLES:\n    \
                  research-swarm \"Impact of renewable energy subsidies\"\n    \
                  research-swarm --provider noop --no-evaluate \"State of fusion power\"\n    \
                  research-swarm --file question.txt --evaluate --output-dir ./out"
)]
pub struct Cli {
    /// The research question
    pub question: Option<String>,

    /// Read the research question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Evidence provider (overrides SEARCH_PROVIDER and the config file)
    #[arg(short, long, value_enum)]
    pub provider: Option<SearchProviderKind>,

    /// Skip the evaluator stage
    #[arg(long, conflicts_with = "evaluate")]
    pub no_evaluate: bool,

    /// Run the evaluator stage
    #[arg(long)]
    pub evaluate: bool,

    /// Path to the configuration file
    #[arg(short, long, default_value = "swarm.toml")]
    pub config: PathBuf,

    /// Directory for generated reports
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The question, read from `--file` when given.
    pub fn resolve_question(&self) -> std::io::Result<String> {
        match (&self.file, &self.question) {
            (Some(path), _) => Ok(std::fs::read_to_string(path)?.trim().to_string()),
            (None, Some(question)) => Ok(question.trim().to_string()),
            (None, None) => Ok(String::new()),
        }
    }

    /// Apply flag overrides; flags win over file and environment.
    pub fn apply_to(&self, config: &mut SwarmConfig) {
        if let Some(provider) = self.provider {
            config.search.provider = provider;
        }
        if self.no_evaluate {
            config.pipeline.enable_evaluator = false;
        } else if self.evaluate {
            config.pipeline.enable_evaluator = true;
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "research-swarm",
            "--provider",
            "noop",
            "--no-evaluate",
            "--output-dir",
            "/tmp/out",
            "Impact of renewable energy subsidies",
        ])
        .unwrap();

        assert_eq!(cli.question.as_deref(), Some("Impact of renewable energy subsidies"));
        assert_eq!(cli.provider, Some(SearchProviderKind::Noop));
        assert!(cli.no_evaluate);

        let mut config = SwarmConfig::default();
        config.pipeline.enable_evaluator = true;
        cli.apply_to(&mut config);
        assert!(!config.pipeline.enable_evaluator);
        assert_eq!(config.search.provider, SearchProviderKind::Noop);
        assert_eq!(config.output.dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_question_is_required() {
        assert!(Cli::try_parse_from(["research-swarm"]).is_err());
    }

    #[test]
    fn test_evaluate_flags_conflict() {
        assert!(Cli::try_parse_from(["research-swarm", "--evaluate", "--no-evaluate", "q"]).is_err());
    }

    #[test]
    fn test_question_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"  Future of grid storage\n").unwrap();

        let cli = Cli::try_parse_from([
            "research-swarm".as_ref(),
            "--file".as_ref(),
            file.path().as_os_str(),
        ])
        .unwrap();
        assert_eq!(cli.resolve_question().unwrap(), "Future of grid storage");
    }
}
