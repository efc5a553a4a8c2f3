//! Input resolution: turn an upload, a local path or a URL into a
//! [`SourceDocument`].
//!
//! ## Why sanitise the filename?
//!
//! The declared filename comes from the client. It decides the extension the
//! converter sees (`.docx`, `.pptx`, …) and the name of the returned PDF, but
//! it must never decide *where* a file is written. Only the final path
//! component is kept, and anything outside a conservative character set is
//! replaced.

use crate::error::Doc2TextError;
use std::path::Path;
use tracing::{debug, info};

/// Magic bytes at the start of every PDF.
pub const PDF_MAGIC: &[u8] = b"%PDF";

/// An uploaded document: raw bytes plus the name the client gave it.
#[derive(Clone)]
pub struct SourceDocument {
    filename: String,
    bytes: Vec<u8>,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl SourceDocument {
    /// Wrap uploaded bytes. Empty uploads are rejected.
    pub fn new(filename: impl AsRef<str>, bytes: impl Into<Vec<u8>>) -> Result<Self, Doc2TextError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Doc2TextError::InputInvalid("uploaded file is empty".into()));
        }
        Ok(Self {
            filename: safe_file_name(filename.as_ref()),
            bytes,
        })
    }

    /// Read a local file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, Doc2TextError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Doc2TextError::InputUnreadable {
                path: path.to_path_buf(),
                source: e,
            })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Self::new(name, bytes)
    }

    /// Download a document over HTTP(S).
    pub async fn from_url(url: &str, timeout_secs: u64) -> Result<Self, Doc2TextError> {
        info!("Downloading document from: {}", url);
        let failed = |reason: String| Doc2TextError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| failed(e.to_string()))?;

        let response = client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                failed(format!("timed out after {timeout_secs}s"))
            } else {
                failed(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(failed(format!("HTTP {}", response.status())));
        }

        let name = filename_from_url(url);
        let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        Self::new(name, bytes.to_vec())
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// True when the content starts with the PDF magic bytes.
    pub fn is_pdf(&self) -> bool {
        self.bytes.starts_with(PDF_MAGIC)
    }

    /// Filename with its extension replaced by `.pdf`.
    pub fn pdf_name(&self) -> String {
        let stem = Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "document".to_string());
        format!("{stem}.pdf")
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reduce a client-supplied filename to a safe single path component.
pub fn safe_file_name(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "downloaded".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.docx"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn path_components_are_stripped() {
        assert_eq!(safe_file_name("../../etc/passwd"), "passwd");
        assert_eq!(safe_file_name("C:\\Users\\me\\Deck.pptx"), "Deck.pptx");
        assert_eq!(safe_file_name(".hidden.docx"), "hidden.docx");
        assert_eq!(safe_file_name(""), "document");
        assert_eq!(safe_file_name("a;b|c.xlsx"), "a_b_c.xlsx");
    }

    #[test]
    fn empty_upload_is_invalid() {
        let err = SourceDocument::new("a.docx", Vec::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InputInvalid);
    }

    #[test]
    fn pdf_detected_by_magic_not_extension() {
        let real = SourceDocument::new("scan.bin", b"%PDF-1.4 ...".to_vec()).unwrap();
        let fake = SourceDocument::new("fake.pdf", b"PK\x03\x04".to_vec()).unwrap();
        assert!(real.is_pdf());
        assert!(!fake.is_pdf());
    }

    #[test]
    fn pdf_name_swaps_extension() {
        let d = SourceDocument::new("Quarterly Report.docx", b"x".to_vec()).unwrap();
        assert_eq!(d.pdf_name(), "Quarterly Report.pdf");
        let d = SourceDocument::new("README", b"x".to_vec()).unwrap();
        assert_eq!(d.pdf_name(), "README.pdf");
    }

    #[test]
    fn url_filename() {
        assert_eq!(filename_from_url("https://h/x/slides.pptx"), "slides.pptx");
        assert_eq!(filename_from_url("https://h/"), "downloaded");
    }

    #[tokio::test]
    async fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("memo.odt");
        std::fs::write(&p, b"content").unwrap();
        let doc = SourceDocument::from_path(&p).await.unwrap();
        assert_eq!(doc.filename(), "memo.odt");
        assert_eq!(doc.bytes(), b"content");
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let err = SourceDocument::from_path("/definitely/not/here.docx")
            .await
            .unwrap_err();
        assert!(matches!(err, Doc2TextError::InputUnreadable { .. }));
    }
}
