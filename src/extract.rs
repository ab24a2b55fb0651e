//! Text extraction for uploaded documents.
//!
//! Dispatches on the (lowercased) file extension: `.txt` and `.md` are read
//! as UTF-8, `.pdf` goes through `pdf-extract`, `.docx` is unpacked as a ZIP
//! and its `word/document.xml` parsed for paragraph text. Anything else is
//! rejected before staging.
//!
//! ZIP entries are read through a size bound so a crafted archive cannot
//! balloon in memory.

use std::io::Read;
use std::path::Path;

use crate::error::{DocChatError, Result};

/// File extensions the pipeline accepts, lowercase, without dots.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "docx"];

/// Maximum decompressed bytes to read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract plain text from an uploaded file's bytes.
///
/// Unsupported extensions are a staging error (reject the upload); parse
/// failures in supported formats are extraction errors (malformed content).
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String> {
    match extension_of(filename).as_deref() {
        Some("txt") | Some("md") => {
            let text = std::str::from_utf8(bytes).map_err(|_| {
                DocChatError::Extract(format!("{} is not valid UTF-8 text", filename))
            })?;
            Ok(text.to_string())
        }
        Some("pdf") => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| DocChatError::Extract(format!("PDF extraction failed: {}", e))),
        Some("docx") => {
            let xml = read_docx_document_xml(bytes)?;
            docx_paragraph_text(&xml)
        }
        _ => Err(DocChatError::Staging(format!(
            "unsupported file type: {} (supported: {})",
            filename,
            SUPPORTED_EXTENSIONS.join(", ")
        ))),
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn read_docx_document_xml(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| DocChatError::Extract(format!("not a valid docx archive: {}", e)))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| DocChatError::Extract("word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| DocChatError::Extract(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(DocChatError::Extract(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    Ok(xml)
}

/// Pull the text runs out of WordprocessingML, one line per paragraph.
///
/// Text is taken only from inside `<w:t>` elements (whitespace there is
/// significant), paragraph ends and explicit `<w:br/>` become newlines.
fn docx_paragraph_text(xml: &[u8]) -> Result<String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"br" {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DocChatError::Extract(format!("malformed docx XML: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}
