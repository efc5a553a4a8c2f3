//! Ensure-PDF stage: pass PDFs through, convert everything else.
//!
//! Conversion is delegated to a [`DocumentConverter`]. The production
//! implementation shells out to LibreOffice in headless mode; tests inject a
//! stub. The converter reports success with the path it produced, so the
//! orchestrator never has to guess from directory contents.

use crate::artifact::{ArtifactStore, PdfArtifact, PdfOrigin};
use crate::error::{Doc2TextError, ExternalError};
use crate::pipeline::input::SourceDocument;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Converts an office document into a PDF.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert `input`, writing the PDF somewhere inside `out_dir`.
    ///
    /// Returns the path of the produced PDF.
    async fn convert_to_pdf(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, ExternalError>;
}

/// LibreOffice (`soffice --headless --convert-to pdf`).
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    program: PathBuf,
    timeout: Duration,
}

impl SofficeConverter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("soffice"),
            timeout,
        }
    }

    /// Use a specific `soffice` binary instead of the one on `PATH`.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for SofficeConverter {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn convert_to_pdf(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, ExternalError> {
        // A private profile lets several conversions run side by side;
        // LibreOffice refuses to share one between processes.
        let profile = out_dir.join(".lo-profile");
        let profile_url = format!("file://{}", profile.display());

        let mut cmd = Command::new(&self.program);
        cmd.arg(format!("-env:UserInstallation={profile_url}"))
            .args(["--headless", "--norestore", "--convert-to", "pdf", "--outdir"])
            .arg(out_dir)
            .arg(input)
            .kill_on_drop(true);

        debug!("Running {:?}", cmd.as_std());
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                ExternalError::new(format!(
                    "soffice timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| ExternalError::new(format!("failed to run soffice: {e}")))?;

        if !output.status.success() {
            return Err(ExternalError::new(format!(
                "soffice exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let expected = expected_pdf_path(input, out_dir);
        if !tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            return Err(ExternalError::new(format!(
                "soffice reported success but {} was not created",
                expected.display()
            )));
        }
        Ok(expected)
    }
}

/// Where LibreOffice writes the PDF for `input`.
pub fn expected_pdf_path(input: &Path, out_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    out_dir.join(format!("{stem}.pdf"))
}

/// Write the upload into the request directory and make sure a PDF exists.
///
/// Both the upload and a converted PDF are tracked by `store`, so a failure
/// here leaves nothing behind once the store is cleaned up.
pub async fn ensure_pdf(
    doc: &SourceDocument,
    store: &mut ArtifactStore,
    converter: &dyn DocumentConverter,
) -> Result<PdfArtifact, Doc2TextError> {
    if doc.is_pdf() {
        let path = store.write_file(&doc.pdf_name(), doc.bytes()).await?;
        debug!("{} is already a PDF", doc.filename());
        return Ok(PdfArtifact {
            path,
            origin: PdfOrigin::Uploaded,
        });
    }

    // Uploads get their own directory so no client name can collide with ours.
    store.create_dir("input").await?;
    let upload = store
        .write_file(&format!("input/{}", doc.filename()), doc.bytes())
        .await?;
    let out_dir = store.create_dir("converted").await?;
    info!("Converting {} to PDF", doc.filename());

    let path = converter
        .convert_to_pdf(&upload, &out_dir)
        .await
        .map_err(|e| Doc2TextError::ConversionFailed {
            file: doc.filename().to_string(),
            detail: e.to_string(),
        })?;
    store.track_file(path.clone());

    // The source is no longer needed once the PDF exists.
    store.remove(&upload).await;

    Ok(PdfArtifact {
        path,
        origin: PdfOrigin::Converted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CopyConverter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentConverter for CopyConverter {
        async fn convert_to_pdf(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, ExternalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = expected_pdf_path(input, out_dir);
            tokio::fs::write(&out, b"%PDF-1.7 converted").await?;
            Ok(out)
        }
    }

    struct FailingConverter;

    #[async_trait]
    impl DocumentConverter for FailingConverter {
        async fn convert_to_pdf(&self, _: &Path, _: &Path) -> Result<PathBuf, ExternalError> {
            Err(ExternalError::new("exit status 1"))
        }
    }

    #[test]
    fn expected_path_uses_stem() {
        let p = expected_pdf_path(Path::new("/in/Deck v2.pptx"), Path::new("/out"));
        assert_eq!(p, PathBuf::from("/out/Deck v2.pdf"));
    }

    #[tokio::test]
    async fn pdf_upload_skips_converter() {
        let base = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::create(base.path()).unwrap();
        let conv = CopyConverter {
            calls: AtomicUsize::new(0),
        };
        let doc = SourceDocument::new("paper.pdf", b"%PDF-1.5 body".to_vec()).unwrap();

        let pdf = ensure_pdf(&doc, &mut store, &conv).await.unwrap();

        assert_eq!(pdf.origin, PdfOrigin::Uploaded);
        assert_eq!(conv.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_tracked(&pdf.path));
        store.cleanup().await;
    }

    #[tokio::test]
    async fn office_upload_is_converted_and_source_removed() {
        let base = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::create(base.path()).unwrap();
        let conv = CopyConverter {
            calls: AtomicUsize::new(0),
        };
        let doc = SourceDocument::new("notes.docx", b"PK\x03\x04".to_vec()).unwrap();

        let pdf = ensure_pdf(&doc, &mut store, &conv).await.unwrap();

        assert_eq!(pdf.origin, PdfOrigin::Converted);
        assert!(pdf.path.ends_with("converted/notes.pdf"));
        assert!(!store.path().join("input/notes.docx").exists());
        assert!(store.is_tracked(&pdf.path));
        store.cleanup().await;
    }

    #[tokio::test]
    async fn upload_named_like_a_work_directory_still_converts() {
        let base = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::create(base.path()).unwrap();
        let conv = CopyConverter {
            calls: AtomicUsize::new(0),
        };

        for name in ["converted", "input", "pages"] {
            let doc = SourceDocument::new(name, b"PK\x03\x04".to_vec()).unwrap();
            let pdf = ensure_pdf(&doc, &mut store, &conv).await.unwrap();
            assert_eq!(pdf.origin, PdfOrigin::Converted);
            assert!(pdf.path.ends_with(format!("converted/{name}.pdf")));
        }
        assert_eq!(conv.calls.load(Ordering::SeqCst), 3);
        store.cleanup().await;
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn converter_failure_is_conversion_failed() {
        let base = tempfile::tempdir().unwrap();
        let mut store = ArtifactStore::create(base.path()).unwrap();
        let doc = SourceDocument::new("sheet.xlsx", b"PK".to_vec()).unwrap();

        let err = ensure_pdf(&doc, &mut store, &FailingConverter)
            .await
            .unwrap_err();

        assert!(matches!(err, Doc2TextError::ConversionFailed { ref file, .. } if file == "sheet.xlsx"));
        store.cleanup().await;
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }
}
