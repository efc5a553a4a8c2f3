//! Pipeline integration tests.
//!
//! The converter, renderer and extractor are replaced by in-process stubs, so
//! these run without LibreOffice, pdfium or an LLM. The stubs still write
//! real files, which lets the tests check that nothing is left behind.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_doc2text::{
    DocumentConverter, DocumentService, ErrorKind, ExternalError, JobRegistry, ManualClock,
    PageImage, PageRenderer, PipelineConfig, PipelineProgress, SourceDocument, TextExtractor,
};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Stubs ────────────────────────────────────────────────────────────────────

/// Writes a fake PDF next to the input, like `soffice --outdir`.
struct StubConverter {
    fail: bool,
}

#[async_trait]
impl DocumentConverter for StubConverter {
    async fn convert_to_pdf(&self, input: &Path, out_dir: &Path) -> Result<PathBuf, ExternalError> {
        if self.fail {
            return Err(ExternalError::new("soffice exited with status 1"));
        }
        let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
        let out = out_dir.join(format!("{stem}.pdf"));
        tokio::fs::write(&out, b"%PDF-1.7 converted").await?;
        Ok(out)
    }
}

/// A document with `pages` pages; optionally broken from page `fail_from`.
struct StubRenderer {
    pages: usize,
    fail_from: Option<usize>,
}

impl PageRenderer for StubRenderer {
    fn render_page(&self, _pdf: &Path, page: usize, _dpi: u32, dest: &Path) -> Result<(), ExternalError> {
        if page > self.pages || self.fail_from.is_some_and(|k| page >= k) {
            return Err(ExternalError::new(format!("cannot render page {page}")));
        }
        RgbImage::from_pixel(64, 80, Rgb([250, 250, 250])).save(dest)?;
        Ok(())
    }
}

/// Returns "text N" for page N after a delay, tracking concurrency.
#[derive(Default)]
struct StubExtractor {
    /// Page N sleeps `(pages - N + 1) * step` so later pages finish first.
    reverse_latency: Option<(usize, Duration)>,
    fail_page: Option<usize>,
    raw: Option<String>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    completion_order: Mutex<Vec<usize>>,
}

#[async_trait]
impl TextExtractor for StubExtractor {
    async fn extract_text(&self, page: &PageImage) -> Result<String, ExternalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        assert!(page.path.exists(), "page image must exist while extracting");
        let delay = match self.reverse_latency {
            Some((pages, step)) => step * (pages + 1 - page.page_num) as u32,
            None => Duration::from_millis(5),
        };
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completion_order.lock().unwrap().push(page.page_num);

        if self.fail_page == Some(page.page_num) {
            return Err(ExternalError::new("vision API returned 503"));
        }
        Ok(self
            .raw
            .clone()
            .unwrap_or_else(|| format!("text {}", page.page_num)))
    }
}

#[derive(Default)]
struct RecordingProgress {
    rendered: AtomicUsize,
    extracted: AtomicUsize,
    completed: AtomicUsize,
}

impl PipelineProgress for RecordingProgress {
    fn on_page_rendered(&self, _page_num: usize) {
        self.rendered.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_extracted(&self, _page_num: usize, _text_len: usize) {
        self.extracted.fetch_add(1, Ordering::SeqCst);
    }

    fn on_run_complete(&self, total_pages: usize) {
        self.completed.store(total_pages, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Harness {
    work: TempDir,
    service: DocumentService,
    extractor: Arc<StubExtractor>,
    clock: ManualClock,
}

fn harness(
    config: PipelineConfig,
    renderer: StubRenderer,
    extractor: StubExtractor,
    converter_fails: bool,
) -> Harness {
    let work = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        work_dir: work.path().to_path_buf(),
        ..config
    };
    let clock = ManualClock::default();
    let jobs = JobRegistry::with_clock(config.jobs_dir(), config.job_ttl, Arc::new(clock.clone())).unwrap();
    let extractor = Arc::new(extractor);
    let service = DocumentService::builder(config)
        .converter(Arc::new(StubConverter {
            fail: converter_fails,
        }))
        .renderer(Arc::new(renderer))
        .extractor(Arc::clone(&extractor) as Arc<dyn TextExtractor>)
        .jobs(Arc::new(jobs))
        .build()
        .unwrap();
    Harness {
        work,
        service,
        extractor,
        clock,
    }
}

fn pages(n: usize) -> StubRenderer {
    StubRenderer {
        pages: n,
        fail_from: None,
    }
}

fn docx() -> SourceDocument {
    SourceDocument::new("Quarterly Report.docx", b"PK\x03\x04 not really a docx".to_vec()).unwrap()
}

/// Every file under `dir`, recursively.
fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(files_under(&path));
            } else {
                out.push(path);
            }
        }
    }
    out
}

fn page_headings(markdown: &str) -> Vec<usize> {
    markdown
        .lines()
        .filter_map(|l| l.strip_prefix("## Page "))
        .map(|n| n.trim().parse().unwrap())
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn office_document_end_to_end() {
    let progress = Arc::new(RecordingProgress::default());
    let work = tempfile::tempdir().unwrap();
    let config = PipelineConfig::builder().work_dir(work.path()).build().unwrap();
    let service = DocumentService::builder(config)
        .converter(Arc::new(StubConverter { fail: false }))
        .renderer(Arc::new(pages(3)))
        .extractor(Arc::new(StubExtractor::default()))
        .progress(Arc::clone(&progress) as Arc<dyn PipelineProgress>)
        .build()
        .unwrap();

    let out = service.process_and_extract(&docx()).await.unwrap();

    assert_eq!(out.original_name, "Quarterly Report.docx");
    assert_eq!(
        out.markdown,
        "## Page 1\n\ntext 1\n\n## Page 2\n\ntext 2\n\n## Page 3\n\ntext 3\n"
    );
    assert_eq!(out.download_url, format!("/download/{}", out.job_id));
    assert_eq!(progress.rendered.load(Ordering::SeqCst), 3);
    assert_eq!(progress.extracted.load(Ordering::SeqCst), 3);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 3);

    // Only the registered PDF remains on disk.
    let left = files_under(work.path());
    assert_eq!(left.len(), 1, "unexpected files: {left:?}");
    assert!(left[0].starts_with(work.path().join("jobs")));

    let pdf = service.download_job(&out.job_id).await.unwrap();
    assert_eq!(pdf.filename, "Quarterly Report.pdf");
    assert_eq!(pdf.bytes, b"%PDF-1.7 converted");
    assert!(files_under(work.path()).is_empty());
}

#[tokio::test]
async fn pdf_upload_bypasses_converter() {
    // A failing converter proves it is never called.
    let h = harness(PipelineConfig::default(), pages(1), StubExtractor::default(), true);
    let doc = SourceDocument::new("scan.pdf", b"%PDF-1.4 original".to_vec()).unwrap();

    let out = h.service.process_and_extract(&doc).await.unwrap();
    let pdf = h.service.download_job(&out.job_id).await.unwrap();

    assert_eq!(pdf.bytes, b"%PDF-1.4 original");
    assert_eq!(pdf.filename, "scan.pdf");
}

#[tokio::test]
async fn order_follows_pages_not_completion() {
    let n = 8;
    let extractor = StubExtractor {
        reverse_latency: Some((n, Duration::from_millis(15))),
        ..Default::default()
    };
    let config = PipelineConfig::builder().concurrency(n).build().unwrap();
    let h = harness(config, pages(n), extractor, false);

    let out = h.service.process_and_extract(&docx()).await.unwrap();

    assert_eq!(page_headings(&out.markdown), (1..=n).collect::<Vec<_>>());
    let completed = h.extractor.completion_order.lock().unwrap().clone();
    assert_ne!(completed, (1..=n).collect::<Vec<_>>(), "stub should finish out of order");
}

#[tokio::test]
async fn concurrency_ceiling_is_respected() {
    let config = PipelineConfig::builder()
        .max_pages(12)
        .concurrency(3)
        .build()
        .unwrap();
    let extractor = StubExtractor {
        reverse_latency: Some((12, Duration::from_millis(5))),
        ..Default::default()
    };
    let h = harness(config, pages(12), extractor, false);

    let out = h.service.process_and_extract(&docx()).await.unwrap();

    assert_eq!(page_headings(&out.markdown).len(), 12);
    let peak = h.extractor.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency {peak} exceeded ceiling");
}

#[tokio::test]
async fn max_pages_caps_the_document() {
    let config = PipelineConfig::builder().max_pages(10).build().unwrap();
    let h = harness(config, pages(25), StubExtractor::default(), false);

    let out = h.service.process_and_extract(&docx()).await.unwrap();

    assert_eq!(page_headings(&out.markdown), (1..=10).collect::<Vec<_>>());
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn first_page_render_failure_is_fatal_and_clean() {
    let renderer = StubRenderer {
        pages: 5,
        fail_from: Some(1),
    };
    let h = harness(PipelineConfig::default(), renderer, StubExtractor::default(), false);

    let err = h.service.process_and_extract(&docx()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RasterizationFailed);
    assert_eq!(h.extractor.calls.load(Ordering::SeqCst), 0);
    assert!(files_under(h.work.path()).is_empty());
    assert!(h.service.jobs().is_empty().await);
}

#[tokio::test]
async fn later_render_failure_truncates_without_error() {
    let renderer = StubRenderer {
        pages: 10,
        fail_from: Some(4),
    };
    let h = harness(PipelineConfig::default(), renderer, StubExtractor::default(), false);

    let out = h.service.process_and_extract(&docx()).await.unwrap();

    assert_eq!(page_headings(&out.markdown), vec![1, 2, 3]);
}

#[tokio::test]
async fn extraction_failure_fails_request_and_cleans_up() {
    let extractor = StubExtractor {
        fail_page: Some(2),
        ..Default::default()
    };
    let h = harness(PipelineConfig::default(), pages(4), extractor, false);

    let err = h.service.process_and_extract(&docx()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
    assert!(err.to_string().contains("page 2"));
    assert!(files_under(h.work.path()).is_empty());
    assert!(h.service.jobs().is_empty().await);
}

#[tokio::test]
async fn conversion_failure_is_reported_and_clean() {
    let h = harness(PipelineConfig::default(), pages(1), StubExtractor::default(), true);

    let err = h.service.process_and_extract(&docx()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConversionFailed);

    let err = h.service.convert_and_return(&docx()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConversionFailed);

    assert!(files_under(h.work.path()).is_empty());
}

#[tokio::test]
async fn control_characters_never_reach_the_caller() {
    let extractor = StubExtractor {
        raw: Some("Total:\u{7} 42\u{0}\r\nDone\u{1B}\u{7F}".to_string()),
        ..Default::default()
    };
    let h = harness(PipelineConfig::default(), pages(2), extractor, false);

    let out = h.service.process_and_extract(&docx()).await.unwrap();

    assert!(!out
        .markdown
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t'));
    assert!(out.markdown.contains("Total: 42\nDone"));
    let decoded = STANDARD.decode(&out.markdown_base64).unwrap();
    assert_eq!(String::from_utf8(decoded).unwrap(), out.markdown);
}

#[tokio::test]
async fn convert_only_returns_pdf_and_registers_nothing() {
    let h = harness(PipelineConfig::default(), pages(1), StubExtractor::default(), false);

    let pdf = h.service.convert_and_return(&docx()).await.unwrap();

    assert_eq!(pdf.filename, "Quarterly Report.pdf");
    assert_eq!(pdf.bytes, b"%PDF-1.7 converted");
    assert!(h.service.jobs().is_empty().await);
    assert!(files_under(h.work.path()).is_empty());
}

#[tokio::test]
async fn download_is_one_time_and_expires() {
    let h = harness(PipelineConfig::default(), pages(1), StubExtractor::default(), false);

    let first = h.service.process_and_extract(&docx()).await.unwrap();
    assert!(h.service.download_job(&first.job_id).await.is_ok());
    let again = h.service.download_job(&first.job_id).await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::JobNotFound);

    let second = h.service.process_and_extract(&docx()).await.unwrap();
    h.clock.advance(Duration::from_secs(15 * 60));
    let expired = h.service.download_job(&second.job_id).await.unwrap_err();
    assert_eq!(expired.kind(), ErrorKind::JobNotFound);
    assert!(files_under(h.work.path()).is_empty());

    let bogus = h.service.download_job("not-a-job").await.unwrap_err();
    assert_eq!(bogus.kind(), ErrorKind::JobNotFound);
}

#[tokio::test]
async fn concurrent_requests_do_not_interfere() {
    let h = harness(PipelineConfig::default(), pages(3), StubExtractor::default(), false);
    let a = SourceDocument::new("a.docx", b"PK a".to_vec()).unwrap();
    let b = SourceDocument::new("b.pptx", b"PK b".to_vec()).unwrap();

    let (ra, rb) = tokio::join!(
        h.service.process_and_extract(&a),
        h.service.process_and_extract(&b)
    );
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_ne!(ra.job_id, rb.job_id);
    assert_eq!(h.service.jobs().len().await, 2);
    assert_eq!(h.service.download_job(&rb.job_id).await.unwrap().filename, "b.pdf");
    assert_eq!(h.service.download_job(&ra.job_id).await.unwrap().filename, "a.pdf");
}

#[tokio::test]
async fn upload_without_extension_named_converted_is_processed() {
    let h = harness(PipelineConfig::default(), pages(2), StubExtractor::default(), false);
    let doc = SourceDocument::new("converted", b"PK\x03\x04 office bytes".to_vec()).unwrap();

    let out = h.service.process_and_extract(&doc).await.unwrap();

    assert_eq!(page_headings(&out.markdown), vec![1, 2]);
    let pdf = h.service.download_job(&out.job_id).await.unwrap();
    assert_eq!(pdf.filename, "converted.pdf");
    assert!(files_under(h.work.path()).is_empty());
}
