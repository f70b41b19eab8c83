use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;

use crate::api::{error::ApiError, state::AppState};
use crate::domain::DomainError;

/// Upload size accepted by the documents route.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_name: String,
    pub documents_written: usize,
}

/// Accepts one PDF in the multipart field `file` and loads it into the
/// vector store. Other fields are ignored.
pub async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DomainError::validation(format!("malformed upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| DomainError::validation("upload has no file name"))?;
        if !file_name.to_ascii_lowercase().ends_with(".pdf") {
            return Err(DomainError::validation(format!(
                "{file_name} is not a PDF; only .pdf uploads are supported"
            ))
            .into());
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| DomainError::validation(format!("failed to read upload: {e}")))?;
        if bytes.is_empty() {
            return Err(DomainError::validation(format!("{file_name} is empty")).into());
        }

        tracing::info!(file = %file_name, size = bytes.len(), "PDF received");
        // Uploads and chat turns run one at a time.
        let _session = state.session.lock().await;
        let report = state.ingestion.ingest_bytes(&file_name, &bytes).await?;

        return Ok(Json(UploadResponse {
            file_name,
            documents_written: report.documents_written,
        }));
    }

    Err(DomainError::validation("multipart field `file` is missing").into())
}
