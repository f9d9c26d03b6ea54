use std::{fmt, path::Path};

use pdf_extract::extract_text_from_mem;

/// Error surfaced to the form page when an uploaded document cannot be read.
#[derive(Debug)]
pub struct ParseError {
    message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Extraction routes keyed off the filename extension.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DocumentKind {
    Pdf,
    Markdown,
    Text,
}

/// Resolves the extractor for a filename. `None` means an unknown extension,
/// which callers handle with a best-effort text decode.
pub fn detect_kind(filename: &str) -> Option<DocumentKind> {
    let extension = Path::new(&filename.to_ascii_lowercase())
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_owned)?;

    match extension.as_str() {
        "pdf" => Some(DocumentKind::Pdf),
        "md" | "markdown" => Some(DocumentKind::Markdown),
        "txt" => Some(DocumentKind::Text),
        _ => None,
    }
}

/// Extracts plain text from an uploaded document held in memory.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String, ParseError> {
    match detect_kind(filename) {
        Some(DocumentKind::Pdf) => extract_pdf(bytes),
        Some(DocumentKind::Markdown) | Some(DocumentKind::Text) => decode_utf8(bytes),
        None => decode_utf8(bytes)
            .map_err(|_| ParseError::new(format!("지원하지 않는 파일 형식입니다: {filename}"))),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ParseError> {
    extract_text_from_mem(bytes)
        .map_err(|err| ParseError::new(format!("PDF에서 텍스트를 추출하지 못했습니다: {err}")))
}

fn decode_utf8(bytes: &[u8]) -> Result<String, ParseError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| ParseError::new("파일을 UTF-8 텍스트로 해석할 수 없습니다."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_kind_routes_known_extensions() {
        assert_eq!(detect_kind("resume.pdf"), Some(DocumentKind::Pdf));
        assert_eq!(detect_kind("RESUME.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(detect_kind("notes.md"), Some(DocumentKind::Markdown));
        assert_eq!(detect_kind("notes.markdown"), Some(DocumentKind::Markdown));
        assert_eq!(detect_kind("career.txt"), Some(DocumentKind::Text));
        assert_eq!(detect_kind("photo.png"), None);
        assert_eq!(detect_kind("no-extension"), None);
    }

    #[test]
    fn text_and_markdown_decode_utf8() {
        let text = extract_text("resume.txt", "5년차 백엔드 개발자".as_bytes()).unwrap();
        assert_eq!(text, "5년차 백엔드 개발자");

        let md = extract_text("resume.md", b"# Career\n- Rust").unwrap();
        assert_eq!(md, "# Career\n- Rust");
    }

    #[test]
    fn unknown_extension_falls_back_to_text_decode() {
        let text = extract_text("resume.rtf", b"plain enough").unwrap();
        assert_eq!(text, "plain enough");
    }

    #[test]
    fn unknown_extension_with_binary_content_is_unsupported() {
        let err = extract_text("resume.bin", &[0xff, 0xfe, 0x00, 0x01]).unwrap_err();
        assert!(err.message().contains("지원하지 않는 파일 형식"));
        assert!(err.message().contains("resume.bin"));
    }

    #[test]
    fn txt_with_invalid_utf8_reports_decode_failure() {
        let err = extract_text("resume.txt", &[0xff, 0xfe]).unwrap_err();
        assert!(err.message().contains("UTF-8"));
    }

    #[test]
    fn corrupt_pdf_reports_extraction_failure() {
        let err = extract_text("resume.pdf", b"not a real pdf").unwrap_err();
        assert!(err.message().contains("PDF"));
    }
}
