//! # exam-pdf-pipeline
//!
//! Page processing for uploaded exam question papers: split a PDF into
//! page-range chunks for AI question extraction, rasterise the pages that
//! hold diagrams, and crop each diagram out using the bounding box the
//! detector reported.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input   load local file or download from URL
//!  ├─ 2. Split   5-page standalone chunks (lopdf)  ──▶ external AI detection
//!  ├─ 3. Render  page → RGBA via pdfium, pdftoppm fallback (spawn_blocking)
//!  ├─ 4. Crop    detector bbox → pixel region → sub-image
//!  └─ 5. Encode  PNG bytes / data URI for the upload step
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exam_pdf_pipeline::{
//!     extract_diagrams, split_document, BoundingBox, DiagramRequest, PipelineConfig,
//!     SourceDocument,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let document = SourceDocument::from(std::fs::read("paper.pdf")?);
//!
//!     for chunk in split_document(&document, &config)? {
//!         println!("pages {}-{}: {} bytes", chunk.start_page, chunk.end_page, chunk.buffer.len());
//!     }
//!
//!     let requests = vec![DiagramRequest::new(
//!         "q7",
//!         3,
//!         BoundingBox::new(120.0, 340.0, 400.0, 260.0).with_page_size(1240.0, 1754.0),
//!     )];
//!     let output = extract_diagrams(&document, &requests, &config).await?;
//!     for diagram in output.into_result()? {
//!         std::fs::write(format!("{}.png", diagram.id), &diagram.png)?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `exampdf` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## Runtime requirements
//!
//! Rendering binds the pdfium shared library from `PDFIUM_LIB_PATH` or the
//! system library path. When pdfium is missing or rejects a page, poppler's
//! `pdftoppm` is used instead. Splitting and cropping need neither.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_DENSITY, DEFAULT_PAGES_PER_CHUNK};
pub use document::{PageChunk, SourceDocument};
pub use error::{DiagramError, PipelineError, RenderError};
pub use extract::{
    describe, extract_diagrams, extract_diagrams_with, inspect, split_document, write_chunks,
    write_diagrams,
};
pub use output::{DiagramImage, DiagramRequest, DocumentInfo, ExtractionOutput, ExtractionStats};
pub use pipeline::crop::{crop, crop_png, region_for, BoundingBox, CropRegion};
pub use pipeline::input::load_source;
pub use pipeline::render::{
    fallback_scale, render, render_page, ExternalToolRenderer, PageRasterizer, PdfiumRenderer,
    RasterImage, RenderStrategy,
};
pub use pipeline::split::{page_count, split};
