use crate::llm::client::{error_for_status, error_for_transport, GenerationConstraints, LLMClient, Prompt};
use crate::types::GenerationError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Client for OpenAI and OpenAI-compatible chat completion endpoints.
pub struct OpenAICompatClient {
    http_client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
}

impl OpenAICompatClient {
    pub fn new(api_key: String, api_base: String, model: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http_client,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn request_body(&self, prompt: &Prompt, constraints: &GenerationConstraints) -> Value {
        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(json!({"role": "system", "content": prompt.system}));
        }
        messages.push(json!({"role": "user", "content": prompt.user}));

        let mut body = json!({
            "model": constraints.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
        });
        if let Some(t) = constraints.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(p) = constraints.top_p {
            body["top_p"] = json!(p);
        }
        if let Some(n) = constraints.max_tokens {
            body["max_tokens"] = json!(n);
        }
        body
    }
}

#[async_trait]
impl LLMClient for OpenAICompatClient {
    async fn generate(
        &self,
        prompt: &Prompt,
        constraints: &GenerationConstraints,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.api_base);
        let mut request = self
            .http_client
            .post(&url)
            .json(&self.request_body(prompt, constraints));
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| error_for_transport("OpenAI", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(error_for_status("OpenAI", status, &text));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| error_for_transport("OpenAI", e))?;

        let content = response_json
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GenerationError::InvalidResponse("OpenAI response has no choices".into())
            })?;

        if content.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(
                "OpenAI returned empty content".into(),
            ));
        }

        Ok(content.to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
