use async_trait::async_trait;

use crate::domain::{errors::DomainError, Document, UploadedFile};

#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Extracts text from an uploaded file. Fails with a conversion error
    /// on unsupported or corrupt input.
    async fn convert(&self, file: &UploadedFile) -> Result<Vec<Document>, DomainError>;
}
