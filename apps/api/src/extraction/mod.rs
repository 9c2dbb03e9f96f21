//! Document Extraction Gateway: turns uploaded PDF/DOCX binaries into plain
//! text. The parsing itself is delegated to `pdf-extract` and to a small
//! WordprocessingML reader; both are CPU-bound and run on the blocking pool.

pub mod docx;
pub mod handlers;

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
}

impl DocumentFormat {
    /// Guesses the format from a file name; unknown extensions are treated as PDF,
    /// the only binary format uploads are expected in besides DOCX.
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".docx") {
            DocumentFormat::Docx
        } else if lower.ends_with(".txt") {
            DocumentFormat::Text
        } else {
            DocumentFormat::Pdf
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Docx => "DOCX",
            DocumentFormat::Text => "text",
        }
    }
}

/// Raw document bytes tagged with their format.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub format: DocumentFormat,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn from_base64(format: DocumentFormat, encoded: &str) -> Result<Self, ExtractionError> {
        Ok(Self {
            format,
            bytes: decode_base64(encoded)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedText {
    pub text: String,
    /// PDF page count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
    /// PDF document information dictionary (Title, Author, Producer, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraphs: Option<usize>,
    /// Content the DOCX reader could not turn into text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ExtractionMessage>>,
}

impl ExtractedText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
}

impl ExtractionMessage {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: "warning",
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("{0}")]
    Pdf(String),

    #[error("{0}")]
    Docx(String),

    #[error("extraction task failed: {0}")]
    Task(String),
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, ExtractionError> {
    Ok(STANDARD.decode(encoded.trim())?)
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: SourceDocument) -> Result<ExtractedText, ExtractionError>;
}

/// Production extractor backed by the parsing libraries.
pub struct LibraryExtractor;

#[async_trait]
impl TextExtractor for LibraryExtractor {
    async fn extract(&self, document: SourceDocument) -> Result<ExtractedText, ExtractionError> {
        let SourceDocument { format, bytes } = document;
        tokio::task::spawn_blocking(move || extract_sync(format, &bytes))
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))?
    }
}

fn extract_sync(format: DocumentFormat, bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
    match format {
        DocumentFormat::Pdf => pdf_text(bytes),
        DocumentFormat::Docx => docx::extract_text(bytes),
        DocumentFormat::Text => Ok(ExtractedText::plain(String::from_utf8_lossy(bytes))),
    }
}

fn pdf_text(bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
    let document = pdf_extract::Document::load_mem(bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    let pages = document.get_pages().len();
    let info = pdf_info(&document);

    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    Ok(ExtractedText {
        text,
        pages: Some(pages),
        info: Some(info),
        ..Default::default()
    })
}

/// String entries of the trailer's Info dictionary. Non-string values
/// (dates stored as names, numbers) are left out.
fn pdf_info(document: &pdf_extract::Document) -> BTreeMap<String, String> {
    let dict = document
        .trailer
        .get(b"Info")
        .and_then(|info| document.dereference(info))
        .and_then(|(_, info)| info.as_dict());
    let Ok(dict) = dict else {
        return BTreeMap::new();
    };
    dict.iter()
        .filter_map(|(key, value)| {
            let pdf_extract::Object::String(raw, _) = value else {
                return None;
            };
            Some((String::from_utf8_lossy(key).into_owned(), pdf_string(raw)))
        })
        .collect()
}

/// PDF text strings are PDFDocEncoding or UTF-16BE behind a byte-order mark.
fn pdf_string(raw: &[u8]) -> String {
    match raw {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(raw).into_owned(),
    }
}
