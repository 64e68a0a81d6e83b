//! Page rasterisation: render one PDF page to an RGBA image.
//!
//! Two engines are tried in a fixed order:
//!
//! 1. [`PdfiumRenderer`]: in-process, no filesystem I/O.
//! 2. [`ExternalToolRenderer`]: shells out to poppler's `pdftoppm`, which
//!    copes with some scanned papers (exotic JBIG2/JPX embeds, broken
//!    xref tables) that pdfium rejects.
//!
//! [`PageRasterizer`] owns both and performs the single handoff. There is no
//! retry beyond that handoff; if both engines fail the caller gets
//! [`PipelineError::PageRenderFailed`] and never a partial image.
//!
//! ## Why spawn_blocking?
//!
//! pdfium keeps thread-local state and the external tool blocks on a child
//! process, so [`render_page`] moves the work onto tokio's blocking pool
//! instead of stalling the async workers.

use crate::config::PipelineConfig;
use crate::document::SourceDocument;
use crate::error::{PipelineError, RenderError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Tool resolution (DPI) per unit of [`fallback_scale`]; scale 10 matches
/// the default density of 220.
pub const FALLBACK_DPI_PER_SCALE: u32 = 22;

/// Map a rendering density to the external tool's 1–10 scale.
///
/// `clamp(round(density * 10 / 72), 1, 10)`.
pub fn fallback_scale(density: u32) -> u32 {
    let scaled = (f64::from(density) * 10.0 / 72.0).round();
    (scaled as u32).clamp(1, 10)
}

/// One rasterised page.
#[derive(Debug, Clone)]
pub struct RasterImage {
    /// 1-indexed page number.
    pub page: u32,
    /// RGBA8 pixels.
    pub image: DynamicImage,
    /// Name of the engine that produced the image.
    pub engine: &'static str,
    /// `true` when the primary engine failed and the fallback produced the
    /// image.
    pub used_fallback: bool,
}

impl RasterImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A way of turning one page of a PDF into pixels.
pub trait RenderStrategy: Send + Sync {
    /// Short engine name used in logs and error details.
    fn name(&self) -> &'static str;

    /// Render 1-indexed `page` at `density` DPI.
    fn render(
        &self,
        document: &SourceDocument,
        page: u32,
        density: u32,
    ) -> Result<DynamicImage, RenderError>;
}

// ── Primary: pdfium ──────────────────────────────────────────────────────

/// In-process rendering through the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    library: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the library file at `path` instead of `PDFIUM_LIB_PATH`.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library: Some(path.into()),
        }
    }

    /// Bind pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the system
    /// library.
    fn bind(&self) -> Result<Pdfium, RenderError> {
        let explicit = self
            .library
            .clone()
            .or_else(|| std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from));

        if let Some(path) = explicit {
            match Pdfium::bind_to_library(&path) {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => debug!("pdfium at {} unusable: {:?}", path.display(), e),
            }
        }

        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| RenderError::Pdfium(format!("no pdfium library available: {:?}", e)))
    }
}

impl RenderStrategy for PdfiumRenderer {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn render(
        &self,
        document: &SourceDocument,
        page: u32,
        density: u32,
    ) -> Result<DynamicImage, RenderError> {
        let pdfium = self.bind()?;
        let doc = pdfium
            .load_pdf_from_byte_slice(document.as_bytes(), None)
            .map_err(|e| RenderError::Pdfium(format!("{:?}", e)))?;

        let pages = doc.pages();
        let total = pages.len() as u32;
        if page == 0 || page > total {
            return Err(RenderError::PageOutOfRange { page, total });
        }
        let index = u16::try_from(page - 1).map_err(|_| RenderError::PageOutOfRange { page, total })?;

        let pdf_page = pages
            .get(index)
            .map_err(|e| RenderError::Pdfium(format!("{:?}", e)))?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(density as f32 / 72.0);
        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| RenderError::Pdfium(format!("{:?}", e)))?;

        Ok(bitmap.as_image())
    }
}

// ── Fallback: external tool ──────────────────────────────────────────────

/// Rendering through an external `pdftoppm`-compatible program.
///
/// Each call gets its own scratch input file and output directory, named
/// `exampdf-<unix-millis>-<random>`, so concurrent calls never collide.
#[derive(Debug, Clone)]
pub struct ExternalToolRenderer {
    program: PathBuf,
    temp_root: Option<PathBuf>,
}

impl Default for ExternalToolRenderer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_FALLBACK_TOOL)
    }
}

impl ExternalToolRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            temp_root: None,
        }
    }

    /// Create scratch files under `dir` instead of the OS temp directory.
    pub fn with_temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(dir.into());
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn run_tool(&self, scratch: &Scratch, page: u32, resolution: u32) -> Result<DynamicImage, RenderError> {
        let page_arg = page.to_string();
        let output = Command::new(&self.program)
            .arg("-png")
            .arg("-singlefile")
            .args(["-f", &page_arg, "-l", &page_arg])
            .args(["-r", &resolution.to_string()])
            .arg(scratch.input_path())
            .arg(scratch.output_prefix())
            .output()
            .map_err(|source| RenderError::ToolNotFound {
                program: self.program_name(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Tool {
                program: self.program_name(),
                detail: format!("{}: {}", output.status, stderr.trim()),
            });
        }

        let produced = scratch.output_file();
        if !produced.exists() {
            return Err(RenderError::Tool {
                program: self.program_name(),
                detail: format!("no image written for page {page}"),
            });
        }

        Ok(image::open(&produced)?)
    }
}

impl RenderStrategy for ExternalToolRenderer {
    fn name(&self) -> &'static str {
        "external-tool"
    }

    fn render(
        &self,
        document: &SourceDocument,
        page: u32,
        density: u32,
    ) -> Result<DynamicImage, RenderError> {
        let resolution = fallback_scale(density) * FALLBACK_DPI_PER_SCALE;
        let scratch = Scratch::acquire(self.temp_root.as_deref(), document)?;
        let result = self.run_tool(&scratch, page, resolution);
        scratch.release();
        result
    }
}

/// Temp paths owned by one fallback render.
///
/// Both paths are removed when the value is released or dropped, whichever
/// comes first; removal errors are logged and discarded so they never mask
/// the render outcome.
struct Scratch {
    input: NamedTempFile,
    output_dir: TempDir,
}

impl Scratch {
    fn acquire(root: Option<&Path>, document: &SourceDocument) -> Result<Self, RenderError> {
        let root = root.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir);
        let prefix = scratch_prefix();

        let mut input = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".pdf")
            .tempfile_in(&root)?;
        input.write_all(document.as_bytes())?;
        input.flush()?;

        let output_dir = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix("-out")
            .tempdir_in(&root)?;

        Ok(Self { input, output_dir })
    }

    fn input_path(&self) -> &Path {
        self.input.path()
    }

    fn output_prefix(&self) -> PathBuf {
        self.output_dir.path().join("page")
    }

    /// `-singlefile` makes the tool write `<prefix>.png`.
    fn output_file(&self) -> PathBuf {
        self.output_dir.path().join("page.png")
    }

    fn release(self) {
        let Scratch { input, output_dir } = self;
        if let Err(e) = output_dir.close() {
            debug!("Ignoring scratch directory cleanup error: {}", e);
        }
        if let Err(e) = input.close() {
            debug!("Ignoring scratch file cleanup error: {}", e);
        }
    }
}

fn scratch_prefix() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("exampdf-{millis}-")
}

// ── Rasterizer ───────────────────────────────────────────────────────────

/// Renders pages with a primary engine and falls back to a second one.
#[derive(Debug, Clone, Default)]
pub struct PageRasterizer<P = PdfiumRenderer, F = ExternalToolRenderer> {
    primary: P,
    fallback: F,
}

impl PageRasterizer {
    /// pdfium first, then the configured external tool.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let primary = match &config.pdfium_library {
            Some(path) => PdfiumRenderer::with_library(path),
            None => PdfiumRenderer::new(),
        };
        let mut fallback = ExternalToolRenderer::new(&config.fallback_tool);
        if let Some(root) = &config.temp_root {
            fallback = fallback.with_temp_root(root);
        }
        Self { primary, fallback }
    }
}

impl<P: RenderStrategy, F: RenderStrategy> PageRasterizer<P, F> {
    pub fn with_strategies(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }

    /// Render 1-indexed `page` (clamped to ≥ 1) at `density` DPI.
    pub fn render(
        &self,
        document: &SourceDocument,
        page: u32,
        density: u32,
    ) -> Result<RasterImage, PipelineError> {
        let page = page.max(1);

        let primary_err = match self.primary.render(document, page, density) {
            Ok(image) => return Ok(self.finish(page, image, self.primary.name(), false)),
            Err(e) => e,
        };
        warn!(
            "Page {}: {} failed ({}); falling back to {}",
            page,
            self.primary.name(),
            primary_err,
            self.fallback.name()
        );

        match self.fallback.render(document, page, density) {
            Ok(image) => Ok(self.finish(page, image, self.fallback.name(), true)),
            Err(fallback_err) => Err(PipelineError::PageRenderFailed {
                page,
                detail: format!(
                    "{}: {}; {}: {}",
                    self.primary.name(),
                    primary_err,
                    self.fallback.name(),
                    fallback_err
                ),
            }),
        }
    }

    fn finish(
        &self,
        page: u32,
        image: DynamicImage,
        engine: &'static str,
        used_fallback: bool,
    ) -> RasterImage {
        let image = match image {
            DynamicImage::ImageRgba8(_) => image,
            other => DynamicImage::ImageRgba8(other.to_rgba8()),
        };
        debug!(
            "Rendered page {} with {} → {}x{} px",
            page,
            engine,
            image.width(),
            image.height()
        );
        RasterImage {
            page,
            image,
            engine,
            used_fallback,
        }
    }
}

/// Render one page with pdfium and the default `pdftoppm` fallback.
pub fn render(
    document: &SourceDocument,
    page: u32,
    density: u32,
) -> Result<RasterImage, PipelineError> {
    let rasterizer: PageRasterizer = PageRasterizer::default();
    rasterizer.render(document, page, density)
}

/// Render one page on tokio's blocking pool.
pub async fn render_page<P, F>(
    rasterizer: Arc<PageRasterizer<P, F>>,
    document: SourceDocument,
    page: u32,
    density: u32,
) -> Result<RasterImage, PipelineError>
where
    P: RenderStrategy + 'static,
    F: RenderStrategy + 'static,
{
    let raster = tokio::task::spawn_blocking(move || rasterizer.render(&document, page, density))
        .await
        .map_err(|e| PipelineError::Internal(format!("Render task panicked: {}", e)))??;
    info!(
        "Page {} ready ({}x{}, {})",
        raster.page,
        raster.width(),
        raster.height(),
        raster.engine
    );
    Ok(raster)
}
