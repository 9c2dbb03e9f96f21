use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;

use crate::auth::Session;
use crate::errors::AppError;
use crate::extraction::{DocumentFormat, ExtractedText, ExtractionError, SourceDocument};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfPayload {
    pub pdf_base64: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocxPayload {
    pub docx_base64: Option<String>,
}

async fn extract(
    state: &AppState,
    format: DocumentFormat,
    encoded: Option<String>,
    missing: &str,
) -> Result<Json<ExtractedText>, AppError> {
    let encoded = encoded
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::Validation(missing.to_string()))?;
    let document = SourceDocument::from_base64(format, &encoded)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let size = document.bytes.len();
    let extracted = state.extractor.extract(document).await.map_err(|e| match e {
        ExtractionError::InvalidBase64(e) => AppError::Validation(e.to_string()),
        other => AppError::ExtractionError(format!(
            "Failed to extract text from {}: {other}",
            format.label()
        )),
    })?;
    info!(
        "Extracted {} chars from {size}-byte {}",
        extracted.text.len(),
        format.label()
    );
    Ok(Json(extracted))
}

/// POST /api/extract-pdf-text
pub async fn handle_extract_pdf(
    State(state): State<AppState>,
    _session: Session,
    Json(req): Json<PdfPayload>,
) -> Result<Json<ExtractedText>, AppError> {
    extract(&state, DocumentFormat::Pdf, req.pdf_base64, "No PDF data provided").await
}

/// POST /api/extract-docx-text
pub async fn handle_extract_docx(
    State(state): State<AppState>,
    _session: Session,
    Json(req): Json<DocxPayload>,
) -> Result<Json<ExtractedText>, AppError> {
    extract(&state, DocumentFormat::Docx, req.docx_base64, "No document data provided").await
}
