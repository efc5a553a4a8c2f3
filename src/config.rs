//! Configuration types for the document-to-text pipeline.
//!
//! All pipeline and job-lifetime behaviour is controlled through
//! [`PipelineConfig`], built via its [`PipelineConfigBuilder`]. The settings
//! for the vision model live in [`crate::pipeline::extract::VisionConfig`]
//! because only the default extractor needs them.
//!
//! # Design choice: builder over constructor
//! Callers set only what they care about and rely on documented defaults for
//! the rest; `build()` is the single place where ranges are validated.

use crate::error::Doc2TextError;
use std::path::PathBuf;
use std::time::Duration;

/// Default page ceiling for one document.
pub const DEFAULT_MAX_PAGES: usize = 20;
/// Default number of extraction calls allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;
/// Default rasterisation resolution.
pub const DEFAULT_DPI: u32 = 200;
/// How long a processed PDF stays downloadable.
pub const DEFAULT_JOB_TTL: Duration = Duration::from_secs(15 * 60);
/// Longest job TTL the builder accepts.
pub const MAX_JOB_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// How often expired jobs are swept.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for a [`crate::DocumentService`].
///
/// # Example
/// ```rust
/// use edgequake_doc2text::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_pages(10)
///     .concurrency(3)
///     .dpi(150)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 10);
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pages beyond this number are never rasterised. Default: 20.
    pub max_pages: usize,

    /// Ceiling on concurrent extraction calls. Default: 5.
    ///
    /// Extraction is network-bound, so a handful of overlapping calls cuts
    /// wall-clock time sharply; raise it only if the vision endpoint's rate
    /// limit allows.
    pub concurrency: usize,

    /// Rasterisation resolution in DPI. Range: 72–600. Default: 200.
    pub dpi: u32,

    /// Longest edge of a page image after size reduction, in pixels. Default: 2000.
    pub max_image_dimension: u32,

    /// JPEG quality used when re-encoding page images. Range: 1–100. Default: 85.
    pub jpeg_quality: u8,

    /// Root directory for per-request scratch space and registered job files.
    ///
    /// Default: `$TMPDIR/doc2text`.
    pub work_dir: PathBuf,

    /// Upper bound on one document-to-PDF conversion, in seconds. Default: 120.
    pub convert_timeout_secs: u64,

    /// Lifetime of an undownloaded job. Default: 15 minutes.
    pub job_ttl: Duration,

    /// Period of the expired-job sweep. Default: 60 seconds.
    pub sweep_interval: Duration,

    /// Prefix for the `downloadUrl` returned by `process`, e.g.
    /// `https://docs.example.org`. Default: none (relative URL).
    pub public_base_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            concurrency: DEFAULT_CONCURRENCY,
            dpi: DEFAULT_DPI,
            max_image_dimension: 2000,
            jpeg_quality: 85,
            work_dir: std::env::temp_dir().join("doc2text"),
            convert_timeout_secs: 120,
            job_ttl: DEFAULT_JOB_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            public_base_url: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory holding the PDFs of registered jobs.
    pub fn jobs_dir(&self) -> PathBuf {
        self.work_dir.join("jobs")
    }

    /// Directory under which each request gets its own scratch area.
    pub fn requests_dir(&self) -> PathBuf {
        self.work_dir.join("requests")
    }

    /// Download URL for a job id, honouring `public_base_url`.
    pub fn download_url(&self, job_id: &str) -> String {
        let base = self
            .public_base_url
            .as_deref()
            .map(|b| b.trim_end_matches('/'))
            .unwrap_or("");
        format!("{base}/download/{job_id}")
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px.max(64);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q;
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = dir.into();
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout_secs = secs;
        self
    }

    pub fn job_ttl(mut self, ttl: Duration) -> Self {
        self.config.job_ttl = ttl;
        self
    }

    pub fn sweep_interval(mut self, every: Duration) -> Self {
        self.config.sweep_interval = every;
        self
    }

    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.public_base_url = Some(url.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Doc2TextError> {
        let c = &self.config;
        if c.max_pages == 0 {
            return Err(Doc2TextError::InvalidConfig(
                "max_pages must be ≥ 1".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Doc2TextError::InvalidConfig(
                "concurrency must be ≥ 1".into(),
            ));
        }
        if !(72..=600).contains(&c.dpi) {
            return Err(Doc2TextError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if !(1..=100).contains(&c.jpeg_quality) {
            return Err(Doc2TextError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.job_ttl.is_zero() || c.job_ttl > MAX_JOB_TTL {
            return Err(Doc2TextError::InvalidConfig(format!(
                "job TTL must be non-zero and at most {}s, got {:?}",
                MAX_JOB_TTL.as_secs(),
                c.job_ttl
            )));
        }
        if c.sweep_interval.is_zero() {
            return Err(Doc2TextError::InvalidConfig(
                "sweep interval must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.max_pages, 20);
        assert_eq!(c.concurrency, 5);
        assert_eq!(c.dpi, 200);
        assert_eq!(c.job_ttl, Duration::from_secs(900));
        assert_eq!(c.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = PipelineConfig::builder().concurrency(0).build().unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn job_ttl_out_of_range_rejected() {
        assert!(PipelineConfig::builder().job_ttl(Duration::ZERO).build().is_err());
        let err = PipelineConfig::builder()
            .job_ttl(Duration::from_secs(9_000_000_000_000))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("job TTL"));
        assert!(PipelineConfig::builder().job_ttl(MAX_JOB_TTL).build().is_ok());
    }

    #[test]
    fn dpi_out_of_range_rejected() {
        assert!(PipelineConfig::builder().dpi(50).build().is_err());
        assert!(PipelineConfig::builder().dpi(601).build().is_err());
        assert!(PipelineConfig::builder().dpi(300).build().is_ok());
    }

    #[test]
    fn download_url_relative_by_default() {
        let c = PipelineConfig::default();
        assert_eq!(c.download_url("abc"), "/download/abc");
    }

    #[test]
    fn download_url_with_base() {
        let c = PipelineConfig::builder()
            .public_base_url("https://docs.example.org/")
            .build()
            .unwrap();
        assert_eq!(c.download_url("abc"), "https://docs.example.org/download/abc");
    }

    #[test]
    fn job_and_request_dirs_live_under_work_dir() {
        let c = PipelineConfig::builder().work_dir("/srv/d2t").build().unwrap();
        assert_eq!(c.jobs_dir(), PathBuf::from("/srv/d2t/jobs"));
        assert_eq!(c.requests_dir(), PathBuf::from("/srv/d2t/requests"));
    }
}
