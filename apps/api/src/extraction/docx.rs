use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::extraction::{ExtractedText, ExtractionError, ExtractionMessage};

const DOCUMENT_PART: &str = "word/document.xml";

/// Body text pulled out of `word/document.xml`.
#[derive(Debug, Default)]
struct DocumentText {
    text: String,
    paragraphs: usize,
    images: usize,
    embedded_objects: usize,
    alt_chunks: usize,
}

impl DocumentText {
    fn messages(&self) -> Vec<ExtractionMessage> {
        let mut messages = Vec::new();
        if self.images > 0 {
            messages.push(ExtractionMessage::warning(format!(
                "{} image(s) skipped; only text is extracted",
                self.images
            )));
        }
        if self.embedded_objects > 0 {
            messages.push(ExtractionMessage::warning(format!(
                "{} embedded OLE object(s) skipped",
                self.embedded_objects
            )));
        }
        if self.alt_chunks > 0 {
            messages.push(ExtractionMessage::warning(format!(
                "{} imported document chunk(s) (w:altChunk) not supported",
                self.alt_chunks
            )));
        }
        messages
    }
}

/// Raw text of the main document part: one line per paragraph, tabs and
/// breaks preserved, formatting dropped.
pub fn extract_text(bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractionError::Docx(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| ExtractionError::Docx(format!("{DOCUMENT_PART}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractionError::Docx(e.to_string()))?;

    let document = document_xml_text(&xml)?;
    let messages = document.messages();
    Ok(ExtractedText {
        paragraphs: Some(document.paragraphs),
        messages: Some(messages),
        text: document.text,
        ..Default::default()
    })
}

fn document_xml_text(xml: &str) -> Result<DocumentText, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut doc = DocumentText::default();
    let mut in_run_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_run_text = true,
                b"w:drawing" | b"w:pict" => doc.images += 1,
                b"w:object" => doc.embedded_objects += 1,
                b"w:altChunk" => doc.alt_chunks += 1,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => {
                    doc.text.push('\n');
                    doc.paragraphs += 1;
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => doc.text.push('\t'),
                b"w:br" | b"w:cr" => doc.text.push('\n'),
                b"w:p" => {
                    doc.text.push('\n');
                    doc.paragraphs += 1;
                }
                b"w:altChunk" => doc.alt_chunks += 1,
                _ => {}
            },
            Ok(Event::Text(t)) if in_run_text => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractionError::Docx(e.to_string()))?;
                doc.text.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractionError::Docx(format!(
                    "malformed XML at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    Ok(doc)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;

    /// Minimal DOCX archive holding one paragraph per entry of `paragraphs`.
    pub fn docx_with(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{p}</w:t></w:r></w:p>"))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );

        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }
}
