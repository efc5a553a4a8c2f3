//! Pipeline stages for document-to-text conversion.
//!
//! Each submodule implements one step. The orchestration (which stage runs
//! when, and who cleans up what) lives in [`crate::service`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ office ──▶ render ──▶ extract ──▶ assemble
//! (upload)  (→ PDF)    (pages)    (VLM, ≤C)   (## Page N)
//! ```
//!
//! 1. [`input`]    — wrap the upload; sanitise its name; detect PDFs by magic
//! 2. [`office`]   — convert non-PDF documents with an external converter
//! 3. [`render`]   — rasterise page by page until end of document, shrinking
//!    each image via [`encode`]
//! 4. [`extract`]  — call the text extractor with bounded concurrency
//! 5. [`assemble`] — clean each page, add headings, strip control characters

pub mod assemble;
pub mod encode;
pub mod extract;
pub mod input;
pub mod office;
pub mod render;
