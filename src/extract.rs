//! Plain-text extraction for uploaded knowledge documents.
//!
//! Text and Markdown are read as UTF-8, PDFs are extracted page by page and
//! DOCX files paragraph by paragraph. Legacy binary `.doc` files are not
//! supported. Anything else is tried as UTF-8 text.

use std::io::Read;
use std::path::Path;

/// Maximum decompressed bytes to read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error. Callers treat any error as "no text".
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("read failed: {0}")]
    Io(#[source] std::io::Error),
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}

/// File type from the path's extension, lowercased (`"pdf"`, `"md"`, ...).
pub fn detect_file_type(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Read `path` and extract its text. `file_type` overrides the extension.
pub fn extract_file_text(path: &Path, file_type: Option<&str>) -> Result<String, ExtractError> {
    let file_type = file_type
        .map(|t| t.trim_start_matches('.').to_ascii_lowercase())
        .unwrap_or_else(|| detect_file_type(path));
    let bytes = std::fs::read(path).map_err(ExtractError::Io)?;
    extract_text(&bytes, &file_type)
}

/// Extract text from in-memory file contents of the given type.
pub fn extract_text(bytes: &[u8], file_type: &str) -> Result<String, ExtractError> {
    match file_type {
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "doc" => Err(ExtractError::UnsupportedFileType(file_type.to_string())),
        _ => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotUtf8),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let mut out = String::new();
    for page in pages {
        out.push_str(&page);
        out.push('\n');
    }
    Ok(out)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraphs(&doc_xml)
}

/// Concatenate `<w:t>` runs, one line per `<w:p>` paragraph.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"p" => out.push('\n'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
