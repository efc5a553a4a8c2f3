//! The document service: the three operations callers use.
//!
//! ```text
//! convert_and_return   upload ─▶ ensure PDF ─▶ PDF bytes
//! process_and_extract  upload ─▶ ensure PDF ─▶ rasterise ─▶ extract ─▶ assemble ─▶ job
//! download_job         job id ─▶ PDF bytes (once)
//! ```
//!
//! Every request works inside its own [`ArtifactStore`]. Whatever happens, the
//! store is cleaned up before the result is returned, so the only file that
//! outlives a request is the PDF handed to the [`JobRegistry`].

use crate::artifact::ArtifactStore;
use crate::config::PipelineConfig;
use crate::error::Doc2TextError;
use crate::jobs::JobRegistry;
use crate::pipeline::assemble::assemble;
use crate::pipeline::extract::{extract_pages, TextExtractor};
use crate::pipeline::input::SourceDocument;
use crate::pipeline::office::{ensure_pdf, DocumentConverter, SofficeConverter};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer, RasterOptions, Rasterizer};
use crate::progress::{NoopProgress, ProgressCallback};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A document converted to PDF and returned directly.
#[derive(Debug, Clone)]
pub struct ConvertedPdf {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// A PDF fetched through its job id.
#[derive(Debug, Clone)]
pub struct DownloadedPdf {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Result of [`DocumentService::process_and_extract`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutput {
    pub job_id: String,
    pub original_name: String,
    pub markdown: String,
    /// `markdown`, base64-encoded (standard alphabet, padded).
    pub markdown_base64: String,
    /// Omitted when the job can no longer be downloaded (e.g. the CLI purged it).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub download_url: String,
}

/// Runs the pipeline and owns the job registry.
pub struct DocumentService {
    config: PipelineConfig,
    converter: Arc<dyn DocumentConverter>,
    rasterizer: Rasterizer,
    extractor: Option<Arc<dyn TextExtractor>>,
    jobs: Arc<JobRegistry>,
    progress: ProgressCallback,
}

impl std::fmt::Debug for DocumentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentService")
            .field("config", &self.config)
            .field("jobs", &self.jobs)
            .finish_non_exhaustive()
    }
}

impl DocumentService {
    pub fn builder(config: PipelineConfig) -> DocumentServiceBuilder {
        DocumentServiceBuilder {
            config,
            converter: None,
            renderer: None,
            extractor: None,
            jobs: None,
            progress: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    /// Convert `doc` to PDF and return it. Nothing is registered.
    pub async fn convert_and_return(&self, doc: &SourceDocument) -> Result<ConvertedPdf, Doc2TextError> {
        let mut store = ArtifactStore::create(&self.config.requests_dir())?;
        let result = self.convert_in(doc, &mut store).await;
        store.cleanup().await;
        result
    }

    async fn convert_in(
        &self,
        doc: &SourceDocument,
        store: &mut ArtifactStore,
    ) -> Result<ConvertedPdf, Doc2TextError> {
        let pdf = ensure_pdf(doc, store, self.converter.as_ref()).await?;
        let bytes = tokio::fs::read(&pdf.path)
            .await
            .map_err(|e| Doc2TextError::io(format!("reading {}", pdf.path.display()), e))?;
        info!("Converted {} ({} bytes of PDF)", doc.filename(), bytes.len());
        Ok(ConvertedPdf {
            bytes,
            filename: doc.pdf_name(),
        })
    }

    /// Run the full pipeline on `doc` and register its PDF for download.
    pub async fn process_and_extract(&self, doc: &SourceDocument) -> Result<ProcessOutput, Doc2TextError> {
        let extractor = self
            .extractor
            .as_deref()
            .ok_or_else(|| Doc2TextError::InvalidConfig("no text extractor configured".into()))?;
        let start = Instant::now();
        let mut store = ArtifactStore::create(&self.config.requests_dir())?;
        let result = self.process_in(doc, extractor, &mut store).await;
        store.cleanup().await;

        match &result {
            Ok(out) => info!(
                "Processed {} in {:.1}s → job {}",
                doc.filename(),
                start.elapsed().as_secs_f64(),
                out.job_id
            ),
            Err(e) => warn!("Processing {} failed: {}", doc.filename(), e),
        }
        result
    }

    async fn process_in(
        &self,
        doc: &SourceDocument,
        extractor: &dyn TextExtractor,
        store: &mut ArtifactStore,
    ) -> Result<ProcessOutput, Doc2TextError> {
        let pdf = ensure_pdf(doc, store, self.converter.as_ref()).await?;
        self.progress.on_run_start(doc.filename());

        let scratch = store.create_dir("pages").await?;
        let extracted = extract_pages(
            extractor,
            self.rasterizer.pages(&pdf.path, &scratch),
            self.config.concurrency,
            self.progress.as_ref(),
        )
        .await;
        // Page images never outlive extraction, whatever its outcome.
        store.remove(&scratch).await;
        let pages = extracted?;

        let markdown = assemble(&pages);
        let job = self.jobs.register(&pdf, doc.pdf_name()).await?;
        store.release(&pdf.path);
        self.progress.on_run_complete(pages.len());

        let job_id = job.id.to_string();
        Ok(ProcessOutput {
            download_url: self.config.download_url(&job_id),
            original_name: doc.filename().to_string(),
            markdown_base64: STANDARD.encode(markdown.as_bytes()),
            markdown,
            job_id,
        })
    }

    /// Hand out a registered PDF. Each job can be downloaded once.
    pub async fn download_job(&self, job_id: &str) -> Result<DownloadedPdf, Doc2TextError> {
        let job = self
            .jobs
            .retrieve(job_id)
            .await
            .ok_or_else(|| Doc2TextError::JobNotFound(job_id.to_string()))?;
        let filename = job.display_name().to_string();
        let bytes = job.into_bytes().await?;
        Ok(DownloadedPdf { bytes, filename })
    }
}

/// Builder for [`DocumentService`].
///
/// The converter defaults to LibreOffice, the renderer to pdfium, and the
/// registry to `<work_dir>/jobs` with the configured TTL. Without a text
/// extractor only [`DocumentService::convert_and_return`] and
/// [`DocumentService::download_job`] work.
pub struct DocumentServiceBuilder {
    config: PipelineConfig,
    converter: Option<Arc<dyn DocumentConverter>>,
    renderer: Option<Arc<dyn PageRenderer>>,
    extractor: Option<Arc<dyn TextExtractor>>,
    jobs: Option<Arc<JobRegistry>>,
    progress: Option<ProgressCallback>,
}

impl DocumentServiceBuilder {
    pub fn converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Share an existing registry (e.g. one with an injected clock).
    pub fn jobs(mut self, jobs: Arc<JobRegistry>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self) -> Result<DocumentService, Doc2TextError> {
        let jobs = match self.jobs {
            Some(jobs) => jobs,
            None => Arc::new(JobRegistry::new(self.config.jobs_dir(), self.config.job_ttl)?),
        };
        let converter = self.converter.unwrap_or_else(|| {
            Arc::new(SofficeConverter::new(Duration::from_secs(
                self.config.convert_timeout_secs,
            )))
        });
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(PdfiumRenderer::new()));

        Ok(DocumentService {
            rasterizer: Rasterizer::new(renderer, RasterOptions::from(&self.config)),
            config: self.config,
            converter,
            extractor: self.extractor,
            jobs,
            progress: self.progress.unwrap_or_else(|| Arc::new(NoopProgress)),
        })
    }
}
