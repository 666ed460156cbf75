use crate::llm::client::{GenerationConstraints, Generator, LLMClient, Prompt, Provider, Role};
use crate::types::GenerationError;
use crate::utils::toml_config::{LlmConfig, LlmProviderKind};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Routes generation requests to a client with per-role sampling defaults.
///
/// Constraints are layered: built-in role defaults, then the caller's
/// constraints, then any `[llm.roles.<role>]` overrides from configuration.
pub struct RoleRouter {
    client: Arc<dyn LLMClient>,
    defaults: HashMap<Role, GenerationConstraints>,
    overrides: HashMap<Role, GenerationConstraints>,
}

impl RoleRouter {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self {
            client,
            defaults: builtin_defaults(),
            overrides: HashMap::new(),
        }
    }

    /// Build the router from `[llm]` configuration.
    pub fn from_config(config: &LlmConfig) -> Self {
        let provider = provider_from_config(config);
        tracing::info!(
            provider = provider.name(),
            model = provider.model(),
            "Configured LLM provider"
        );
        let mut router = Self::new(provider.create_client(config.request_timeout()));

        // Planning benefits from the depth-oriented model when one is configured.
        if let Some(heavy) = &config.heavy_model {
            router.set_default(
                Role::Planner,
                router.defaults_for(Role::Planner).with_model(heavy.clone()),
            );
        }
        for (role, settings) in &config.roles {
            router.overrides.insert(*role, settings.constraints());
        }
        router
    }

    pub fn with_role(mut self, role: Role, constraints: GenerationConstraints) -> Self {
        self.overrides.insert(role, constraints);
        self
    }

    fn set_default(&mut self, role: Role, constraints: GenerationConstraints) {
        self.defaults.insert(role, constraints);
    }

    fn defaults_for(&self, role: Role) -> GenerationConstraints {
        self.defaults.get(&role).cloned().unwrap_or_default()
    }

    /// Effective constraints for a request.
    pub fn resolve(&self, role: Role, call: &GenerationConstraints) -> GenerationConstraints {
        let layered = self.defaults_for(role).overlay(call);
        match self.overrides.get(&role) {
            Some(over) => layered.overlay(over),
            None => layered,
        }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }
}

fn builtin_defaults() -> HashMap<Role, GenerationConstraints> {
    HashMap::from([
        (Role::Planner, GenerationConstraints::default().with_temperature(0.2)),
        (Role::Synthesizer, GenerationConstraints::default().with_temperature(0.3)),
        (Role::Evaluator, GenerationConstraints::default().with_temperature(0.0)),
        (Role::Publisher, GenerationConstraints::default().with_temperature(0.2)),
    ])
}

fn provider_from_config(config: &LlmConfig) -> Provider {
    match config.provider {
        LlmProviderKind::Ollama => Provider::Ollama {
            base_url: config.resolved_base_url(),
            model: config.model.clone(),
        },
        LlmProviderKind::OpenAI => Provider::OpenAI {
            api_key: std::env::var(&config.api_key_env).unwrap_or_default(),
            api_base: config.resolved_base_url(),
            model: config.model.clone(),
        },
    }
}

#[async_trait]
impl Generator for RoleRouter {
    async fn generate(
        &self,
        role: Role,
        prompt: &Prompt,
        constraints: &GenerationConstraints,
    ) -> Result<String, GenerationError> {
        let effective = self.resolve(role, constraints);
        tracing::debug!(
            role = %role,
            model = effective.model.as_deref().unwrap_or(self.client.model_name()),
            temperature = ?effective.temperature,
            "Generating"
        );
        self.client.generate(prompt, &effective).await
    }
}
