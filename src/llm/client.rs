//! LLM client abstractions
//!
//! Every pipeline stage that needs text generation goes through the
//! [`Generator`] trait, which routes a request by [`Role`]. Concrete
//! providers implement [`LLMClient`]:
//! - **Ollama**: local inference through the `/api/chat` endpoint
//! - **OpenAI**: OpenAI and any OpenAI-compatible server (LM Studio, vLLM, OpenRouter)

use crate::types::GenerationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// The part of the pipeline a generation request is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Planner,
    Researcher,
    Synthesizer,
    Evaluator,
    Publisher,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Researcher => "researcher",
            Role::Synthesizer => "synthesizer",
            Role::Evaluator => "evaluator",
            Role::Publisher => "publisher",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling controls for a single request. `None` means "provider default".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationConstraints {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl GenerationConstraints {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Layer `other` on top of `self`; values set in `other` win.
    pub fn overlay(&self, other: &GenerationConstraints) -> GenerationConstraints {
        GenerationConstraints {
            model: other.model.clone().or_else(|| self.model.clone()),
            temperature: other.temperature.or(self.temperature),
            top_p: other.top_p.or(self.top_p),
            max_tokens: other.max_tokens.or(self.max_tokens),
        }
    }
}

/// A system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Generic LLM client trait for provider abstraction
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Generate a completion for a prompt
    async fn generate(
        &self,
        prompt: &Prompt,
        constraints: &GenerationConstraints,
    ) -> Result<String, GenerationError>;

    /// Get the default model name/identifier
    fn model_name(&self) -> &str;
}

/// Role-aware text generation used by every pipeline stage.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        role: Role,
        prompt: &Prompt,
        constraints: &GenerationConstraints,
    ) -> Result<String, GenerationError>;
}

/// Provider enum for runtime selection
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API provider (including compatible APIs)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
    },

    /// Ollama local LLM provider
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Ollama {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     model: "llama3.2".to_string(),
    /// };
    /// ```
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Create a client instance for this provider
    pub fn create_client(&self, timeout: Duration) -> Arc<dyn LLMClient> {
        match self {
            Provider::OpenAI {
                api_key,
                api_base,
                model,
            } => Arc::new(super::openai::OpenAICompatClient::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
                timeout,
            )),
            Provider::Ollama { base_url, model } => Arc::new(super::ollama::OllamaClient::new(
                base_url.clone(),
                model.clone(),
                timeout,
            )),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::OpenAI { model, .. } | Provider::Ollama { model, .. } => model,
        }
    }
}

/// Map an HTTP failure status onto the generation error taxonomy.
pub(crate) fn error_for_status(
    provider: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> GenerationError {
    let detail = format!("{} request failed ({}): {}", provider, status, body.trim());
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        GenerationError::RateLimited(detail)
    } else if status.is_server_error()
        || status == reqwest::StatusCode::NOT_FOUND
        || status == reqwest::StatusCode::UNAUTHORIZED
    {
        GenerationError::ProviderUnavailable(detail)
    } else {
        GenerationError::InvalidResponse(detail)
    }
}

/// Map a transport failure onto the generation error taxonomy.
pub(crate) fn error_for_transport(provider: &str, err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::ProviderUnavailable(format!("{} request timed out: {}", provider, err))
    } else if err.is_decode() {
        GenerationError::InvalidResponse(format!("{} response was not valid JSON: {}", provider, err))
    } else {
        GenerationError::ProviderUnavailable(format!("{} request failed: {}", provider, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_prefers_call_values() {
        let base = GenerationConstraints::default()
            .with_temperature(0.3)
            .with_model("llama3.2");
        let call = GenerationConstraints {
            temperature: Some(0.0),
            max_tokens: Some(512),
            ..Default::default()
        };

        let merged = base.overlay(&call);
        assert_eq!(merged.temperature, Some(0.0));
        assert_eq!(merged.model.as_deref(), Some("llama3.2"));
        assert_eq!(merged.max_tokens, Some(512));
        assert_eq!(merged.top_p, None);
    }

    #[test]
    fn test_provider_name() {
        let openai = Provider::OpenAI {
            api_key: "".to_string(),
            api_base: "".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        assert_eq!(openai.name(), "OpenAI");
        assert_eq!(openai.model(), "gpt-4o-mini");

        let ollama = Provider::Ollama {
            base_url: "".to_string(),
            model: "".to_string(),
        };
        assert_eq!(ollama.name(), "Ollama");
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;

        assert!(matches!(
            error_for_status("Ollama", StatusCode::TOO_MANY_REQUESTS, ""),
            GenerationError::RateLimited(_)
        ));
        assert!(matches!(
            error_for_status("Ollama", StatusCode::BAD_GATEWAY, ""),
            GenerationError::ProviderUnavailable(_)
        ));
        assert!(matches!(
            error_for_status("Ollama", StatusCode::BAD_REQUEST, "bad"),
            GenerationError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(serde_json::to_string(&Role::Synthesizer).unwrap(), "\"synthesizer\"");
        assert_eq!(Role::Evaluator.to_string(), "evaluator");
    }
}
