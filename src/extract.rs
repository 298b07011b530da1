//! PDF text extraction.
//!
//! Contract with the segmenter: extraction must preserve layout spacing
//! (text runs are joined with spaces and text-positioning operators become
//! line breaks) so numbered headings stay recognizable. Feeding text from
//! a non-layout extractor materially degrades segmentation quality.

use std::fmt;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};

/// Errors surfaced while extracting text from uploaded bytes.
///
/// All variants are fatal to the ingestion request that triggered them;
/// no document is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The bytes could not be parsed as a PDF document.
    Unreadable(String),
    /// The document is encrypted and its content is inaccessible.
    Encrypted,
    /// The document parsed but contained no extractable text.
    Empty,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreadable(cause) => write!(f, "unreadable document: {cause}"),
            Self::Encrypted => write!(f, "document is encrypted"),
            Self::Empty => write!(f, "document contains no extractable text"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts per-page text from raw PDF bytes, in page order.
pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let document =
        Document::load_mem(bytes).map_err(|err| ExtractError::Unreadable(err.to_string()))?;
    if document.is_encrypted() {
        return Err(ExtractError::Encrypted);
    }

    let pages = document.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for (_, page_id) in pages {
        // A page whose content stream fails to decode contributes an empty
        // page rather than failing the whole document.
        texts.push(page_text(&document, page_id).unwrap_or_default());
    }

    if texts.iter().all(|text| text.trim().is_empty()) {
        return Err(ExtractError::Empty);
    }
    Ok(texts)
}

fn page_text(document: &Document, page_id: ObjectId) -> Result<String, lopdf::Error> {
    let content_bytes = document.get_page_content(page_id)?;
    let content = Content::decode(&content_bytes)?;

    let mut text = String::new();
    for operation in &content.operations {
        match operation.operator.as_str() {
            // Text-showing operators carry the visible strings.
            "Tj" | "TJ" | "'" | "\"" => {
                for operand in &operation.operands {
                    push_text_object(&mut text, operand);
                }
            }
            // Text positioning implies a layout break.
            "Td" | "TD" | "T*" => {
                if !text.ends_with('\n') && !text.is_empty() {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }
    Ok(text)
}

fn push_text_object(out: &mut String, object: &Object) {
    match object {
        Object::String(bytes, _) => {
            if let Some(decoded) = decode_pdf_string(bytes) {
                out.push_str(&decoded);
                out.push(' ');
            }
        }
        // TJ operands are arrays of strings interleaved with kerning
        // adjustments; only the strings matter here.
        Object::Array(items) => {
            for item in items {
                push_text_object(out, item);
            }
        }
        _ => {}
    }
}

fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16(&units).ok();
    }
    // Treat everything else as Latin-1 / PDFDocEncoding.
    Some(bytes.iter().map(|&b| b as char).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = extract_page_texts(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Unreadable(_)));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(extract_page_texts(&[]).is_err());
    }

    #[test]
    fn decodes_utf16be_and_latin1_strings() {
        let utf16 = [0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        assert_eq!(decode_pdf_string(&utf16).unwrap(), "Hi");
        assert_eq!(decode_pdf_string(b"plain").unwrap(), "plain");
    }
}
