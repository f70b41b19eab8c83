use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::openai;
use std::time::Instant;

use crate::domain::{ports::LlmService, DomainError, Generation, GenerationMeta};
use crate::infrastructure::config::LlmConfig;

/// OpenAI chat completion. Wrap in [`TimeoutLlm`](super::TimeoutLlm) to
/// bound the call.
pub struct OpenAiLlm {
    client: openai::Client,
    model: String,
}

impl OpenAiLlm {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            client: openai::Client::from_env(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl LlmService for OpenAiLlm {
    async fn generate(&self, prompt: &str) -> Result<Generation, DomainError> {
        let agent = self.client.agent(&self.model).build();
        let started = Instant::now();

        let reply = agent
            .prompt(prompt)
            .await
            .map_err(|e| DomainError::generation(format!("model call failed: {e}")))?;

        Ok(Generation {
            reply,
            meta: GenerationMeta {
                model: self.model.clone(),
                latency_ms: started.elapsed().as_millis() as u64,
            },
        })
    }
}
