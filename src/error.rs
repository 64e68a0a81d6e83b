//! Error types for the exam-pdf-pipeline library.
//!
//! Three error types map onto three failure scopes:
//!
//! * [`PipelineError`] — **Fatal** for the call that returned it: the
//!   document could not be parsed, a page could not be rendered by any
//!   engine, or a crop request was malformed. Returned as `Err` from every
//!   public operation.
//!
//! * [`RenderError`] — a single rendering engine failed. The rasterizer
//!   catches these to drive the primary → fallback handoff and only
//!   surfaces them folded into [`PipelineError::PageRenderFailed`].
//!
//! * [`DiagramError`] — **Non-fatal**: one diagram of a batch could not be
//!   extracted. Stored inside [`crate::output::DiagramImage`] so the other
//!   diagrams of the document survive.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the exam-pdf-pipeline library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they do not start with the PDF header.
    #[error("Input is not a PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: [u8; 4] },

    // ── Document errors ───────────────────────────────────────────────────
    /// The buffer could not be parsed as a PDF document.
    #[error("Invalid PDF document: {detail}")]
    InvalidDocument { detail: String },

    /// Every rendering engine failed for this page.
    #[error("Could not process page {page} of the uploaded document: {detail}")]
    PageRenderFailed { page: u32, detail: String },

    // ── Crop errors ───────────────────────────────────────────────────────
    /// Crop metadata is missing a field, non-numeric, or unusable.
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// The scaled bounding box does not overlap the rendered page.
    #[error(
        "Bounding box lies outside the {image_width}x{image_height} page image \
         (left={left}, top={top})"
    )]
    CropOutOfBounds {
        left: i64,
        top: i64,
        image_width: u32,
        image_height: u32,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// PNG encoding or decoding of a raster image failed.
    #[error("Image encoding failed: {0}")]
    EncodeFailed(String),

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single rendering engine.
#[derive(Debug, Error)]
pub enum RenderError {
    /// pdfium could not be bound, could not load the document, or failed
    /// while rendering the page.
    #[error("pdfium: {0}")]
    Pdfium(String),

    /// The requested page does not exist in the document.
    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: u32 },

    /// The external tool could not be started.
    #[error("external tool '{program}' could not be started: {source}")]
    ToolNotFound {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external tool ran but exited unsuccessfully or produced nothing.
    #[error("external tool '{program}' failed: {detail}")]
    Tool { program: String, detail: String },

    /// Temp-file I/O for the external tool failed.
    #[error("temporary file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The tool's output could not be decoded as an image.
    #[error("could not decode rendered image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A non-fatal error for a single diagram.
///
/// Stored alongside [`crate::output::DiagramImage`] when a diagram fails.
/// The batch continues with the remaining diagrams.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum DiagramError {
    /// The page holding the diagram could not be rendered.
    #[error("Page {page}: rendering failed: {detail}")]
    RenderFailed { page: u32, detail: String },

    /// Rendering the page took longer than the configured timeout.
    #[error("Page {page}: rendering timed out after {secs}s")]
    Timeout { page: u32, secs: u64 },

    /// The bounding box was malformed or had no usable reference size.
    #[error("Diagram '{id}': invalid bounding box: {detail}")]
    InvalidBoundingBox { id: String, detail: String },

    /// The scaled bounding box did not overlap the rendered page.
    #[error("Diagram '{id}': box at ({left}, {top}) lies outside the {image_width}x{image_height} page")]
    OutOfBounds {
        id: String,
        left: i64,
        top: i64,
        image_width: u32,
        image_height: u32,
    },

    /// The cropped image could not be PNG-encoded.
    #[error("Diagram '{id}': encoding failed: {detail}")]
    EncodeFailed { id: String, detail: String },
}

impl DiagramError {
    /// The fatal error a caller that refuses partial results reports.
    pub fn into_pipeline_error(self) -> PipelineError {
        match self {
            DiagramError::RenderFailed { page, detail } => {
                PipelineError::PageRenderFailed { page, detail }
            }
            DiagramError::Timeout { page, secs } => PipelineError::PageRenderFailed {
                page,
                detail: format!("timed out after {secs}s"),
            },
            DiagramError::InvalidBoundingBox { id, detail } => {
                PipelineError::InvalidBoundingBox(format!("diagram '{id}': {detail}"))
            }
            DiagramError::OutOfBounds {
                left,
                top,
                image_width,
                image_height,
                ..
            } => PipelineError::CropOutOfBounds {
                left,
                top,
                image_width,
                image_height,
            },
            DiagramError::EncodeFailed { id, detail } => {
                PipelineError::EncodeFailed(format!("diagram '{id}': {detail}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_render_failed_mentions_page() {
        let e = PipelineError::PageRenderFailed {
            page: 7,
            detail: "pdfium: bad xref; pdftoppm: exit 1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 7"), "got: {msg}");
        assert!(msg.contains("pdftoppm"), "got: {msg}");
    }

    #[test]
    fn crop_out_of_bounds_display() {
        let e = PipelineError::CropOutOfBounds {
            left: 1000,
            top: 0,
            image_width: 400,
            image_height: 400,
        };
        let msg = e.to_string();
        assert!(msg.contains("400x400"), "got: {msg}");
        assert!(msg.contains("left=1000"), "got: {msg}");
    }

    #[test]
    fn render_error_out_of_range_display() {
        let e = RenderError::PageOutOfRange { page: 9, total: 3 };
        assert!(e.to_string().contains("3 pages"));
    }

    #[test]
    fn diagram_error_roundtrips_through_json() {
        let e = DiagramError::Timeout { page: 2, secs: 30 };
        let json = serde_json::to_string(&e).unwrap();
        let back: DiagramError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), e.to_string());
    }
}
