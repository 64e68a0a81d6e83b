//! Pipeline stages for question-paper processing.
//!
//! Each submodule implements exactly one transformation step and can be
//! used on its own; [`crate::extract`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ (external detection) ──▶ render ──▶ crop ──▶ encode
//! (path/URL) (lopdf)                          (pdfium,   (bbox)   (PNG)
//!                                              pdftoppm)
//! ```
//!
//! 1. [`input`]  — load a local path or URL into a `SourceDocument`
//! 2. [`split`]  — cut the document into fixed-size page-range chunks
//! 3. [`render`] — rasterise one page, pdfium first, external tool second
//! 4. [`crop`]   — scale a detector bounding box and cut the diagram out
//! 5. [`encode`] — PNG bytes and data URIs for the upload step

pub mod crop;
pub mod encode;
pub mod input;
pub mod render;
pub mod split;
