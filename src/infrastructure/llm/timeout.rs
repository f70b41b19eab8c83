use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{ports::LlmService, DomainError, Generation};

/// Bounds every call of the inner model. A call that runs past the limit
/// is dropped and reported as a generation error.
pub struct TimeoutLlm {
    inner: Arc<dyn LlmService>,
    timeout: Duration,
}

impl TimeoutLlm {
    pub fn new(inner: Arc<dyn LlmService>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl LlmService for TimeoutLlm {
    async fn generate(&self, prompt: &str) -> Result<Generation, DomainError> {
        tokio::time::timeout(self.timeout, self.inner.generate(prompt))
            .await
            .map_err(|_| {
                DomainError::generation(format!(
                    "model call timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
    }
}
