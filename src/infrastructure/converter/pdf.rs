use async_trait::async_trait;

use crate::domain::{
    ports::DocumentConverter, text::PAGE_BREAK, Document, DomainError, UploadedFile,
};

const PDF_MAGIC: &[u8] = b"%PDF-";
/// Readers accept the header anywhere in the first kilobyte.
const HEADER_WINDOW: usize = 1024;

/// Offset of the `%PDF-` header, if the file has one.
fn header_offset(bytes: &[u8]) -> Option<usize> {
    bytes[..bytes.len().min(HEADER_WINDOW)]
        .windows(PDF_MAGIC.len())
        .position(|w| w == PDF_MAGIC)
}

/// PDF to text. Pages are extracted one by one with lopdf and joined with
/// form feeds; pdf-extract is the fallback for files lopdf cannot read text
/// from.
pub struct PdfConverter;

impl PdfConverter {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_text(bytes: &[u8]) -> Result<String, DomainError> {
        let offset = header_offset(bytes)
            .ok_or_else(|| DomainError::conversion("file is not a PDF"))?;
        // xref offsets count from the header, not from the file start
        let bytes = &bytes[offset..];

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| DomainError::conversion(format!("failed to load PDF: {e}")))?;

        let pages: Vec<String> = doc
            .get_pages()
            .keys()
            .map(|&page| {
                doc.extract_text(&[page]).unwrap_or_else(|e| {
                    tracing::debug!(page, error = %e, "no text on page");
                    String::new()
                })
            })
            .collect();

        let text = pages.join(&PAGE_BREAK.to_string());
        if !text.trim().is_empty() {
            return Ok(text);
        }

        tracing::warn!("per-page extraction produced no text, trying pdf-extract");
        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| DomainError::conversion(format!("failed to extract text: {e}")))?;
        if text.trim().is_empty() {
            return Err(DomainError::conversion(
                "PDF has no extractable text (it may be scanned or encrypted)",
            ));
        }
        Ok(text)
    }
}

impl Default for PdfConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentConverter for PdfConverter {
    async fn convert(&self, file: &UploadedFile) -> Result<Vec<Document>, DomainError> {
        let is_pdf = file
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            return Err(DomainError::conversion(format!(
                "{} is not a PDF; only .pdf uploads are supported",
                file.name
            )));
        }

        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| DomainError::conversion(format!("cannot read {}: {e}", file.name)))?;

        // Both parsers are synchronous and may panic on malformed input.
        let text = tokio::task::spawn_blocking(move || Self::extract_text(&bytes))
            .await
            .map_err(|e| DomainError::conversion(format!("PDF parser crashed: {e}")))??;

        Ok(vec![Document::new(file.name.clone(), text)])
    }
}
