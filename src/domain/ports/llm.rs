use crate::domain::{errors::DomainError, Generation};
use async_trait::async_trait;

#[async_trait]
pub trait LlmService: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, DomainError>;
}
