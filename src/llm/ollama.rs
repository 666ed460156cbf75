use crate::llm::client::{error_for_status, error_for_transport, GenerationConstraints, LLMClient, Prompt};
use crate::types::GenerationError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Client for a local Ollama server (`POST {base_url}/api/chat`).
pub struct OllamaClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn request_body(&self, prompt: &Prompt, constraints: &GenerationConstraints) -> Value {
        let mut options = Map::new();
        if let Some(t) = constraints.temperature {
            options.insert("temperature".into(), json!(t));
        }
        if let Some(p) = constraints.top_p {
            options.insert("top_p".into(), json!(p));
        }
        if let Some(n) = constraints.max_tokens {
            options.insert("num_predict".into(), json!(n));
        }

        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(json!({"role": "system", "content": prompt.system}));
        }
        messages.push(json!({"role": "user", "content": prompt.user}));

        json!({
            "model": constraints.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "stream": false,
            "options": options,
        })
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &Prompt,
        constraints: &GenerationConstraints,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.request_body(prompt, constraints);

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| error_for_transport("Ollama", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(error_for_status("Ollama", status, &text));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| error_for_transport("Ollama", e))?;

        let content = response_json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GenerationError::InvalidResponse("Ollama response has no message content".into())
            })?;

        if content.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(
                "Ollama returned empty content".into(),
            ));
        }

        Ok(content.to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
