//! Page rasterisation: turn a PDF into reduced page images, one page at a time.
//!
//! ## Why spawn_blocking?
//!
//! Both renderers are blocking: pdfium is a C++ library with thread-local
//! state, and `pdftoppm` is a child process we wait on. Each page render plus
//! its JPEG re-encode runs on the blocking pool so Tokio workers never stall.
//!
//! ## Where does the document end?
//!
//! The page count is never asked for up front. Pages are rendered 1, 2, 3, …
//! until the configured limit or until a render fails. A failure on page 1
//! means the document is unusable; a failure on any later page is read as the
//! end of the document. A transient error on page k therefore truncates the
//! output to k−1 pages, which is logged at `warn` so it is visible.

use crate::config::PipelineConfig;
use crate::error::{Doc2TextError, ExternalError};
use crate::pipeline::encode::{compress_page, PAGE_MIME};
use futures::stream::{self, Stream, TryStreamExt};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Renders a single PDF page to a PNG file.
///
/// Implementations are blocking; callers run them under `spawn_blocking`.
pub trait PageRenderer: Send + Sync {
    /// Render 1-based `page` of `pdf` at `dpi` into `dest` (PNG).
    fn render_page(&self, pdf: &Path, page: usize, dpi: u32, dest: &Path) -> Result<(), ExternalError>;
}

/// Renders through the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    library_dir: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Bind to the system pdfium library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the pdfium shared library found in `dir`.
    pub fn with_library_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: Some(dir.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, ExternalError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ExternalError::new(format!("pdfium library unavailable: {e:?}")))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render_page(&self, pdf: &Path, page: usize, dpi: u32, dest: &Path) -> Result<(), ExternalError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| ExternalError::new(format!("cannot open PDF: {e:?}")))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if page == 0 || page > total {
            return Err(ExternalError::new(format!(
                "page {page} out of range (document has {total})"
            )));
        }

        let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
        let pdf_page = pages
            .get((page - 1) as u16)
            .map_err(|e| ExternalError::new(format!("{e:?}")))?;
        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| ExternalError::new(format!("{e:?}")))?;
        let image = bitmap.as_image();

        image.save_with_format(dest, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Renders by running poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRenderer {
    program: PathBuf,
}

impl Default for PdftoppmRenderer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pdftoppm"),
        }
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render_page(&self, pdf: &Path, page: usize, dpi: u32, dest: &Path) -> Result<(), ExternalError> {
        // pdftoppm appends the extension itself.
        let prefix = dest.with_extension("");
        let page_arg = page.to_string();
        let output = Command::new(&self.program)
            .args(["-png", "-singlefile", "-r"])
            .arg(dpi.to_string())
            .args(["-f", &page_arg, "-l", &page_arg])
            .arg(pdf)
            .arg(&prefix)
            .output()
            .map_err(|e| ExternalError::new(format!("failed to run pdftoppm: {e}")))?;

        if !output.status.success() {
            return Err(ExternalError::new(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let written = prefix.with_extension("png");
        if written != dest {
            std::fs::rename(&written, dest)?;
        }
        Ok(())
    }
}

/// One rasterised, size-reduced page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page number.
    pub page_num: usize,
    pub path: PathBuf,
    pub mime_type: &'static str,
}

impl PageImage {
    pub async fn read(&self) -> Result<Vec<u8>, ExternalError> {
        Ok(tokio::fs::read(&self.path).await?)
    }
}

/// Outcome of trying to produce one page.
#[derive(Debug)]
pub enum RasterStep {
    Page(PageImage),
    /// No page at this position; everything before it is the whole document.
    EndOfDocument,
    /// The document cannot be rasterised at all.
    Fatal(String),
}

/// Rasterisation settings taken from [`PipelineConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RasterOptions {
    pub max_pages: usize,
    pub dpi: u32,
    pub max_image_dimension: u32,
    pub jpeg_quality: u8,
}

impl From<&PipelineConfig> for RasterOptions {
    fn from(c: &PipelineConfig) -> Self {
        Self {
            max_pages: c.max_pages,
            dpi: c.dpi,
            max_image_dimension: c.max_image_dimension,
            jpeg_quality: c.jpeg_quality,
        }
    }
}

/// Drives a [`PageRenderer`] page by page.
#[derive(Clone)]
pub struct Rasterizer {
    renderer: Arc<dyn PageRenderer>,
    options: RasterOptions,
}

impl Rasterizer {
    pub fn new(renderer: Arc<dyn PageRenderer>, options: RasterOptions) -> Self {
        Self { renderer, options }
    }

    pub fn options(&self) -> &RasterOptions {
        &self.options
    }

    /// Render and reduce 1-based `page` of `pdf` into `scratch`.
    ///
    /// The raw render is deleted once the JPEG exists, so at most one raw
    /// image is on disk at a time.
    pub async fn step(&self, pdf: &Path, scratch: &Path, page: usize) -> RasterStep {
        let raw = scratch.join(format!("page-{page:04}.raw.png"));
        let reduced = scratch.join(format!("page-{page:04}.jpg"));
        let renderer = Arc::clone(&self.renderer);
        let opts = self.options;
        let pdf = pdf.to_path_buf();
        let (raw_c, reduced_c) = (raw.clone(), reduced.clone());

        let joined = tokio::task::spawn_blocking(move || {
            renderer.render_page(&pdf, page, opts.dpi, &raw_c)?;
            compress_page(&raw_c, &reduced_c, opts.max_image_dimension, opts.jpeg_quality)
        })
        .await;

        remove_quietly(&raw).await;

        let outcome = match joined {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("render task panicked: {e}")),
        };

        match outcome {
            Ok((w, h)) => {
                debug!("Rendered page {} → {}x{} px", page, w, h);
                RasterStep::Page(PageImage {
                    page_num: page,
                    path: reduced,
                    mime_type: PAGE_MIME,
                })
            }
            Err(detail) => {
                remove_quietly(&reduced).await;
                if page == 1 {
                    RasterStep::Fatal(detail)
                } else {
                    warn!(
                        "Treating render failure on page {} as end of document: {}",
                        page, detail
                    );
                    RasterStep::EndOfDocument
                }
            }
        }
    }

    /// Lazily rasterise pages 1..=max_pages, stopping at the end of the
    /// document.
    ///
    /// Nothing is rendered until the stream is polled, so a bounded consumer
    /// pulls pages only as fast as it can use them. A fatal first page is
    /// yielded as the stream's only item. All images are written under
    /// `scratch`; the caller owns that directory and removes it.
    pub fn pages<'a>(
        &'a self,
        pdf: &'a Path,
        scratch: &'a Path,
    ) -> impl Stream<Item = Result<PageImage, Doc2TextError>> + Send + 'a {
        stream::unfold(Some(1usize), move |next| async move {
            let page = next?;
            if page > self.options.max_pages {
                debug!("Reached page limit ({})", self.options.max_pages);
                return None;
            }
            match self.step(pdf, scratch, page).await {
                RasterStep::Page(img) => Some((Ok(img), Some(page + 1))),
                RasterStep::EndOfDocument => None,
                RasterStep::Fatal(detail) => {
                    Some((Err(Doc2TextError::RasterizationFailed { page, detail }), None))
                }
            }
        })
    }

    /// Rasterise the whole document up front.
    pub async fn rasterize(&self, pdf: &Path, scratch: &Path) -> Result<Vec<PageImage>, Doc2TextError> {
        let pages: Vec<PageImage> = self.pages(pdf, scratch).try_collect().await?;
        info!("Rasterised {} page(s) of {}", pages.len(), pdf.display());
        Ok(pages)
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
