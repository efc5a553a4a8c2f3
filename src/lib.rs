//! # edgequake-doc2text
//!
//! Turn office documents into page-ordered text using Vision Language Models.
//!
//! A document (DOCX, PPTX, XLSX, ODT, … or a PDF) is converted to PDF by an
//! external converter, rasterised page by page, and each page image is sent
//! to a vision model. The page texts come back concurrently and are
//! reassembled in page order under `## Page N` headings. The PDF stays
//! downloadable, once, for a limited time.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Ensure PDF  pass PDFs through, convert the rest (LibreOffice)
//!  ├─ 2. Rasterise   page 1, 2, … until end of document (pdfium, spawn_blocking)
//!  ├─ 3. Extract     ≤ C concurrent vision calls, results sorted by page
//!  ├─ 4. Assemble    cleanup, `## Page N` headings, control chars stripped
//!  └─ 5. Finalise    page images deleted; PDF registered as a job (15 min TTL)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2text::{
//!     DocumentService, PipelineConfig, SourceDocument, VisionConfig, VisionExtractor,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let extractor = VisionExtractor::from_config(VisionConfig::default())?;
//!     let service = DocumentService::builder(PipelineConfig::default())
//!         .extractor(Arc::new(extractor))
//!         .build()?;
//!
//!     let doc = SourceDocument::from_path("slides.pptx").await?;
//!     let output = service.process_and_extract(&doc).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("PDF: {}", output.download_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `doc2text` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | The axum HTTP API in [`server`] |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-doc2text = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod clock;
pub mod config;
pub mod error;
pub mod jobs;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod prompts;
pub mod service;

#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::{ArtifactStore, PdfArtifact, PdfOrigin};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{Doc2TextError, ErrorKind, ExternalError};
pub use jobs::{Job, JobId, JobRegistry, RetrievedJob};
pub use pipeline::extract::{PageText, TextExtractor, VisionConfig, VisionExtractor};
pub use pipeline::input::SourceDocument;
pub use pipeline::office::{DocumentConverter, SofficeConverter};
pub use pipeline::render::{
    PageImage, PageRenderer, PdfiumRenderer, PdftoppmRenderer, RasterStep, Rasterizer,
};
pub use progress::{NoopProgress, PipelineProgress, ProgressCallback};
pub use service::{ConvertedPdf, DocumentService, DownloadedPdf, ProcessOutput};
