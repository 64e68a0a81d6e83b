//! Configuration for the page-processing pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The same config drives the library calls and
//! the CLI, so two runs can be compared by diffing their configs.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default rendering density (dots per inch).
pub const DEFAULT_DENSITY: u32 = 220;

/// Default number of pages per chunk produced by the splitter.
pub const DEFAULT_PAGES_PER_CHUNK: usize = 5;

/// Default external rasterizer used when pdfium fails.
pub const DEFAULT_FALLBACK_TOOL: &str = "pdftoppm";

/// Configuration for splitting, rendering and cropping.
///
/// # Example
/// ```rust
/// use exam_pdf_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .density(150)
///     .pages_per_chunk(10)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.density, 150);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Rendering density in DPI-equivalent units. Range: 1–1200. Default: 220.
    ///
    /// pdfium renders at `density / 72` times the page's point size; the
    /// fallback tool receives the scale derived by
    /// [`crate::pipeline::render::fallback_scale`].
    pub density: u32,

    /// Pages per chunk for [`crate::split_document`]. Default: 5.
    ///
    /// Keeps each sub-document small enough for one AI extraction request.
    pub pages_per_chunk: usize,

    /// Number of pages rendered at the same time by
    /// [`crate::extract_diagrams`]. Default: 4.
    ///
    /// Rendering is CPU-bound; going far above the core count only adds
    /// memory pressure from concurrently held page bitmaps.
    pub concurrency: usize,

    /// Program invoked when pdfium fails. Default: `pdftoppm`.
    ///
    /// Must accept poppler's `pdftoppm` arguments
    /// (`-png -singlefile -f N -l N -r DPI <input> <output-prefix>`).
    pub fallback_tool: PathBuf,

    /// Directory under which fallback scratch files are created.
    /// `None` uses the OS temp directory.
    pub temp_root: Option<PathBuf>,

    /// Explicit path to the pdfium shared library. `None` checks
    /// `PDFIUM_LIB_PATH`, then the system library.
    pub pdfium_library: Option<PathBuf>,

    /// Upper bound on rendering one page inside [`crate::extract_diagrams`].
    /// `None` waits for the engines to finish on their own.
    pub render_timeout_secs: Option<u64>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            density: DEFAULT_DENSITY,
            pages_per_chunk: DEFAULT_PAGES_PER_CHUNK,
            concurrency: 4,
            fallback_tool: PathBuf::from(DEFAULT_FALLBACK_TOOL),
            temp_root: None,
            pdfium_library: None,
            render_timeout_secs: None,
            download_timeout_secs: 120,
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
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn density(mut self, density: u32) -> Self {
        self.config.density = density.clamp(1, 1200);
        self
    }

    pub fn pages_per_chunk(mut self, n: usize) -> Self {
        self.config.pages_per_chunk = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn fallback_tool(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.fallback_tool = program.into();
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = Some(dir.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.pages_per_chunk == 0 {
            return Err(PipelineError::InvalidConfig(
                "pages per chunk must be ≥ 1".into(),
            ));
        }
        if c.fallback_tool.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "fallback tool must not be empty".into(),
            ));
        }
        if c.render_timeout_secs == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "render timeout must be ≥ 1 second".into(),
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
        assert_eq!(c.density, 220);
        assert_eq!(c.pages_per_chunk, 5);
        assert_eq!(c.fallback_tool, PathBuf::from("pdftoppm"));
        assert!(c.render_timeout_secs.is_none());
    }

    #[test]
    fn builder_clamps_density_and_concurrency() {
        let c = PipelineConfig::builder()
            .density(0)
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(c.density, 1);
        assert_eq!(c.concurrency, 1);

        let c = PipelineConfig::builder().density(5000).build().unwrap();
        assert_eq!(c.density, 1200);
    }

    #[test]
    fn zero_pages_per_chunk_is_rejected() {
        let err = PipelineConfig::builder().pages_per_chunk(0).build().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn zero_render_timeout_is_rejected() {
        let err = PipelineConfig::builder()
            .render_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }
}
