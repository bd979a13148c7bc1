//! Text extraction from uploaded documents.

use crate::core::error::ExtractionError;
use crate::core::traits::{DocumentExtractor, UploadedFile};
use async_trait::async_trait;
use di::{inject, injectable};
use log::debug;

/// PDFs are parsed on the blocking pool; images need an OCR backend, which is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTextExtractor;

#[injectable(DocumentExtractor)]
impl FileTextExtractor {
    #[inject]
    pub fn new() -> FileTextExtractor {
        FileTextExtractor
    }
}

#[async_trait]
impl DocumentExtractor for FileTextExtractor {
    async fn extract_text(&self, file: &UploadedFile) -> Result<String, ExtractionError> {
        let ext = file.extension().unwrap_or_default();
        match ext.as_str() {
            "pdf" => {
                let bytes = file.bytes.clone();
                let text = tokio::task::spawn_blocking(move || {
                    pdf_extract::extract_text_from_mem(&bytes)
                        .map_err(|e| ExtractionError::Pdf(e.to_string()))
                })
                .await
                .map_err(|e| ExtractionError::Task(e.to_string()))??;

                debug!("Extracted {} chars from {}", text.len(), file.filename);
                Ok(text.trim().to_owned())
            }
            "png" | "jpg" | "jpeg" => Err(ExtractionError::NoOcrBackend),
            _ => Err(ExtractionError::Unsupported(ext)),
        }
    }
}
