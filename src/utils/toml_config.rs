//! TOML-based configuration for the research swarm
//!
//! Configuration is layered, later layers winning:
//!
//! 1. Built-in defaults (every field has one)
//! 2. `swarm.toml` (or the file passed with `--config`), if present
//! 3. Environment variables (after loading `.env` with dotenvy)
//! 4. Command-line flags
//!
//! ```toml
//! [pipeline]
//! max_subtopics = 5
//! enable_evaluator = true
//! revision_retry_budget = 1
//!
//! [research]
//! researcher_pool_size = 5
//! per_task_timeout_secs = 120
//!
//! [search]
//! provider = "noop"
//!
//! [llm]
//! provider = "ollama"
//! model = "llama3.2"
//!
//! [llm.roles.evaluator]
//! temperature = 0.0
//! ```

use crate::llm::{GenerationConstraints, Role};
use crate::render::ConflictPolicy;
use crate::tools::search::SearchProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure loaded from swarm.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

// ============= Pipeline Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on planner subtopics
    #[serde(default = "default_max_subtopics")]
    pub max_subtopics: usize,

    /// Run the evaluator stage after synthesis
    #[serde(default)]
    pub enable_evaluator: bool,

    /// How many evaluator-requested re-syntheses are allowed
    #[serde(default = "default_revision_retry_budget")]
    pub revision_retry_budget: u32,
}

fn default_max_subtopics() -> usize {
    5
}

fn default_revision_retry_budget() -> u32 {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_subtopics: default_max_subtopics(),
            enable_evaluator: false,
            revision_retry_budget: default_revision_retry_budget(),
        }
    }
}

// ============= Research Pool Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Number of specialist worker profiles (P)
    #[serde(default = "default_pool_size")]
    pub researcher_pool_size: usize,

    /// Deadline for a single research attempt
    #[serde(default = "default_task_timeout_secs")]
    pub per_task_timeout_secs: u64,

    /// Attempts per subtopic before the batch fails
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Search results requested per subtopic query
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
}

fn default_pool_size() -> usize {
    5
}

fn default_task_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_results_per_query() -> usize {
    3
}

impl ResearchConfig {
    pub fn per_task_timeout(&self) -> Duration {
        Duration::from_secs(self.per_task_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            researcher_pool_size: default_pool_size(),
            per_task_timeout_secs: default_task_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            results_per_query: default_results_per_query(),
        }
    }
}

// ============= Search Configuration =============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchProviderKind,
}

// ============= LLM Configuration =============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    /// Local Ollama server
    #[default]
    Ollama,
    /// OpenAI or any OpenAI-compatible endpoint (LM Studio, vLLM, OpenRouter)
    OpenAI,
}

impl std::str::FromStr for LlmProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(LlmProviderKind::Ollama),
            "openai" | "openai-compatible" | "lmstudio" => Ok(LlmProviderKind::OpenAI),
            other => Err(format!("Unsupported LLM provider: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProviderKind,

    /// Server base URL; defaults to the provider's usual local address
    pub base_url: Option<String>,

    /// Primary model (synthesis, evaluation, publishing)
    #[serde(default = "default_model")]
    pub model: String,

    /// Model for breadth-oriented research profiles
    pub light_model: Option<String>,

    /// Model for planning and depth-oriented research profiles
    pub heavy_model: Option<String>,

    /// Environment variable holding the API key (OpenAI-compatible only)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Per-role overrides
    #[serde(default)]
    pub roles: HashMap<Role, RoleConfig>,
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    180
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            base_url: None,
            model: default_model(),
            light_model: None,
            heavy_model: None,
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
            roles: HashMap::new(),
        }
    }
}

impl LlmConfig {
    pub fn resolved_base_url(&self) -> String {
        match (&self.base_url, self.provider) {
            (Some(url), _) if !url.trim().is_empty() => url.trim_end_matches('/').to_string(),
            (_, LlmProviderKind::Ollama) => "http://localhost:11434".to_string(),
            (_, LlmProviderKind::OpenAI) => "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Sampling overrides for one generation role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl RoleConfig {
    pub fn constraints(&self) -> GenerationConstraints {
        GenerationConstraints {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        }
    }
}

// ============= Storage & Output Configuration =============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Durable state database file; in-memory when unset
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    #[serde(default)]
    pub on_conflict: ConflictPolicy,

    /// Ask the publisher role for a headline instead of deriving one
    #[serde(default)]
    pub generated_titles: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./reports")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            on_conflict: ConflictPolicy::default(),
            generated_titles: false,
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl SwarmConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: SwarmConfig = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file, or use defaults when it is absent
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(path)) => {
                tracing::debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("MAX_SUBTOPICS") {
            self.pipeline.max_subtopics = parse_int("MAX_SUBTOPICS", &v)?;
        }
        if let Some(v) = var("ENABLE_EVALUATOR") {
            self.pipeline.enable_evaluator = parse_flag(&v);
        }
        if let Some(v) = var("REVISION_RETRY_BUDGET") {
            self.pipeline.revision_retry_budget = parse_int("REVISION_RETRY_BUDGET", &v)?;
        }
        if let Some(v) = var("RESEARCHER_POOL_SIZE") {
            self.research.researcher_pool_size = parse_int("RESEARCHER_POOL_SIZE", &v)?;
        }
        if let Some(v) = var("RESEARCHER_BATCH_SIZE") {
            self.research.results_per_query = parse_int("RESEARCHER_BATCH_SIZE", &v)?;
        }
        if let Some(v) = var("PER_TASK_TIMEOUT_SECS") {
            self.research.per_task_timeout_secs = parse_int("PER_TASK_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("SEARCH_PROVIDER") {
            self.search.provider = v.parse().map_err(ConfigError::ValidationError)?;
        }
        if let Some(v) = var("SWARM_LLM_PROVIDER") {
            self.llm.provider = v.parse().map_err(ConfigError::ValidationError)?;
        }
        if let Some(v) = var("SWARM_LLM_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Some(v) = var("SWARM_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = var("RESEARCHER_LIGHT_MODEL") {
            self.llm.light_model = Some(v);
        }
        if let Some(v) = var("RESEARCHER_HEAVY_MODEL") {
            self.llm.heavy_model = Some(v);
        }
        if let Some(v) = var("SWARM_STATE_PATH") {
            self.storage.path = Some(v);
        }
        if let Some(v) = var("SWARM_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(v);
        }

        self.validate()
    }

    /// Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_subtopics == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_subtopics must be at least 1".to_string(),
            ));
        }
        if self.research.researcher_pool_size == 0 {
            return Err(ConfigError::ValidationError(
                "research.researcher_pool_size must be at least 1".to_string(),
            ));
        }
        if self.research.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "research.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.research.per_task_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "research.per_task_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "llm.model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_int<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("Environment variable {} must be an integer", name))
    })
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SwarmConfig::default();
        assert_eq!(config.pipeline.max_subtopics, 5);
        assert!(!config.pipeline.enable_evaluator);
        assert_eq!(config.pipeline.revision_retry_budget, 1);
        assert_eq!(config.research.researcher_pool_size, 5);
        assert_eq!(config.research.per_task_timeout(), Duration::from_secs(120));
        assert_eq!(config.search.provider, SearchProviderKind::Live);
        assert_eq!(config.llm.resolved_base_url(), "http://localhost:11434");
        assert!(config.storage.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let content = r#"
            [pipeline]
            max_subtopics = 3
            enable_evaluator = true

            [search]
            provider = "noop"

            [llm]
            provider = "openai"
            base_url = "http://localhost:1234/v1/"
            model = "gpt-4o-mini"
            heavy_model = "qwen2.5-7b-instruct-q8"

            [llm.roles.evaluator]
            temperature = 0.0

            [output]
            on_conflict = "reject"
        "#;
        let config: SwarmConfig = toml::from_str(content).unwrap();

        assert_eq!(config.pipeline.max_subtopics, 3);
        assert!(config.pipeline.enable_evaluator);
        assert_eq!(config.pipeline.revision_retry_budget, 1);
        assert_eq!(config.search.provider, SearchProviderKind::Noop);
        assert_eq!(config.llm.provider, LlmProviderKind::OpenAI);
        assert_eq!(config.llm.resolved_base_url(), "http://localhost:1234/v1");
        assert_eq!(config.llm.heavy_model.as_deref(), Some("qwen2.5-7b-instruct-q8"));
        assert_eq!(config.llm.light_model, None);
        assert_eq!(
            config.llm.roles.get(&Role::Evaluator).and_then(|r| r.temperature),
            Some(0.0)
        );
        assert_eq!(config.output.on_conflict, ConflictPolicy::Reject);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SwarmConfig::default();
        let vars: HashMap<&str, &str> = [
            ("MAX_SUBTOPICS", "3"),
            ("ENABLE_EVALUATOR", "yes"),
            ("SEARCH_PROVIDER", "noop"),
            ("RESEARCHER_BATCH_SIZE", "7"),
            ("SWARM_STATE_PATH", "/tmp/swarm.db"),
            ("SWARM_LLM_MODEL", ""),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.pipeline.max_subtopics, 3);
        assert!(config.pipeline.enable_evaluator);
        assert_eq!(config.search.provider, SearchProviderKind::Noop);
        assert_eq!(config.research.results_per_query, 7);
        assert_eq!(config.storage.path.as_deref(), Some("/tmp/swarm.db"));
        // Empty values are ignored
        assert_eq!(config.llm.model, "llama3.2");
    }

    #[test]
    fn test_env_override_rejects_non_integer() {
        let mut config = SwarmConfig::default();
        let err = config
            .apply_overrides(|name| (name == "MAX_SUBTOPICS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("MAX_SUBTOPICS must be an integer"));
    }

    #[test]
    fn test_validation_rejects_zero_pool() {
        let mut config = SwarmConfig::default();
        config.research.researcher_pool_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("researcher_pool_size")
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = SwarmConfig::load_or_default("/definitely/not/here/swarm.toml").unwrap();
        assert_eq!(config.pipeline.max_subtopics, 5);
        assert!(matches!(
            SwarmConfig::load("/definitely/not/here/swarm.toml"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
