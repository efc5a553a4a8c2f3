//! Error types for the edgequake-doc2text library.
//!
//! Two distinct error types reflect two distinct layers:
//!
//! * [`Doc2TextError`] — what a request fails with. Every variant belongs to
//!   exactly one [`ErrorKind`], so the HTTP layer (or any other boundary) can
//!   map failures to status codes without string matching.
//!
//! * [`ExternalError`] — what a collaborator (document converter, page
//!   renderer, text extractor) reports. The orchestrator wraps it into the
//!   `Doc2TextError` variant for the stage that was running, adding the
//!   page number or file name it knows about.
//!
//! Cleanup failures never appear here: they are logged and swallowed so they
//! cannot mask the error that is actually reported to the caller.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-doc2text library.
#[derive(Debug, Error)]
pub enum Doc2TextError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// No usable file was provided (missing upload, empty body, no name).
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    /// A local input path could not be read.
    #[error("Cannot read input file '{path}': {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fetching a remote input failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The external converter failed or did not produce a PDF.
    #[error("Could not convert '{file}' to PDF: {detail}")]
    ConversionFailed { file: String, detail: String },

    /// The first page could not be rasterised, so the document is unusable.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterizationFailed { page: usize, detail: String },

    /// Text extraction failed for one page; the whole batch is abandoned.
    #[error("Text extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    // ── Job errors ────────────────────────────────────────────────────────
    /// Unknown, expired or already downloaded job.
    #[error("Job '{0}' not found or expired")]
    JobNotFound(String),

    // ── Local errors ──────────────────────────────────────────────────────
    /// Local filesystem operation failed (scratch space, job storage).
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2TextError {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InputInvalid(_) | Self::InputUnreadable { .. } | Self::DownloadFailed { .. } => {
                ErrorKind::InputInvalid
            }
            Self::ConversionFailed { .. } => ErrorKind::ConversionFailed,
            Self::RasterizationFailed { .. } => ErrorKind::RasterizationFailed,
            Self::ExtractionFailed { .. } => ErrorKind::ExtractionFailed,
            Self::JobNotFound(_) => ErrorKind::JobNotFound,
            Self::Io { .. } | Self::InvalidConfig(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Classification of every [`Doc2TextError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InputInvalid,
    ConversionFailed,
    RasterizationFailed,
    ExtractionFailed,
    JobNotFound,
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code used in error payloads.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::InputInvalid => "INPUT_INVALID",
            ErrorKind::ConversionFailed => "CONVERSION_FAILED",
            ErrorKind::RasterizationFailed => "RASTERIZATION_FAILED",
            ErrorKind::ExtractionFailed => "EXTRACTION_FAILED",
            ErrorKind::JobNotFound => "JOB_NOT_FOUND",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// A failure reported by an external collaborator.
///
/// Carries only a human-readable reason; the stage that called the
/// collaborator decides which [`Doc2TextError`] variant it becomes.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ExternalError(pub String);

impl ExternalError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<std::io::Error> for ExternalError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<image::ImageError> for ExternalError {
    fn from(e: image::ImageError) -> Self {
        Self(e.to_string())
    }
}
