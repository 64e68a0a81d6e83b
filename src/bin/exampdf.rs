//! CLI binary for exam-pdf-pipeline.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and writes chunks, page images and diagrams to disk.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exam_pdf_pipeline::pipeline::encode::encode_png;
use exam_pdf_pipeline::{
    crop_png, extract_diagrams, inspect, load_source, split_document, write_chunks,
    write_diagrams, BoundingBox, DiagramRequest, PageRasterizer, PipelineConfig,
    DEFAULT_DENSITY, DEFAULT_PAGES_PER_CHUNK,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Page count and chunk plan
  exampdf inspect paper.pdf

  # 5-page chunks for AI question extraction
  exampdf split paper.pdf --out-dir chunks/

  # Render page 3 at 220 DPI
  exampdf render paper.pdf --page 3 -o page3.png

  # Crop a detected diagram out of a rendered page
  exampdf crop page3.png --bbox '{"x":120,"y":340,"width":400,"height":260,"page_width":1240,"page_height":1754}' -o q7.png

  # Batch: every diagram listed in diagrams.json
  exampdf extract paper.pdf --diagrams diagrams.json --out-dir diagrams/

DIAGRAMS FILE:
  A JSON array of {"id": "...", "page": N, "bbox": {x, y, width, height, page_width?, page_height?}}

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  EXAMPDF_FALLBACK_TOOL   pdftoppm-compatible program used when pdfium fails
  EXAMPDF_DENSITY         Rendering density (DPI)
  RUST_LOG                tracing filter, overrides --verbose/--quiet
"#;

/// Split, rasterise and crop exam question papers.
#[derive(Parser, Debug)]
#[command(
    name = "exampdf",
    version,
    about = "Split, rasterise and crop exam question papers",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// pdftoppm-compatible program used when pdfium fails.
    #[arg(long, global = true, env = "EXAMPDF_FALLBACK_TOOL", default_value = "pdftoppm")]
    fallback_tool: PathBuf,

    /// Explicit pdfium shared library.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Directory for the fallback renderer's scratch files.
    #[arg(long, global = true, env = "EXAMPDF_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "EXAMPDF_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "EXAMPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "EXAMPDF_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print page count and chunk plan.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        #[arg(long, env = "EXAMPDF_PAGES_PER_CHUNK", default_value_t = DEFAULT_PAGES_PER_CHUNK)]
        pages_per_chunk: usize,
    },

    /// Write standalone page-range chunks.
    Split {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        #[arg(long, env = "EXAMPDF_PAGES_PER_CHUNK", default_value_t = DEFAULT_PAGES_PER_CHUNK)]
        pages_per_chunk: usize,

        /// Directory receiving `chunk-<start>-<end>.pdf` files.
        #[arg(long)]
        out_dir: PathBuf,
    },

    /// Rasterise one page to PNG.
    Render {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// 1-indexed page number.
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Rendering density (DPI).
        #[arg(long, env = "EXAMPDF_DENSITY", default_value_t = DEFAULT_DENSITY,
              value_parser = clap::value_parser!(u32).range(1..=1200))]
        density: u32,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Crop a bounding box out of a page image.
    Crop {
        /// PNG or JPEG page image.
        image: PathBuf,

        /// Bounding box JSON: {"x","y","width","height","page_width"?,"page_height"?}.
        #[arg(long)]
        bbox: String,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Extract every diagram listed in a JSON file.
    Extract {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// JSON array of {"id", "page", "bbox"} objects.
        #[arg(long)]
        diagrams: PathBuf,

        /// Directory receiving `<id>.png` files.
        #[arg(long)]
        out_dir: PathBuf,

        /// Rendering density (DPI).
        #[arg(long, env = "EXAMPDF_DENSITY", default_value_t = DEFAULT_DENSITY,
              value_parser = clap::value_parser!(u32).range(1..=1200))]
        density: u32,

        /// Pages rendered at the same time.
        #[arg(short, long, env = "EXAMPDF_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,

        /// Give up on a page after this many seconds.
        #[arg(long, env = "EXAMPDF_RENDER_TIMEOUT")]
        render_timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || cli.json {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match &cli.command {
        Command::Inspect {
            input,
            pages_per_chunk,
        } => {
            let config = base_config(&cli).pages_per_chunk(*pages_per_chunk).build()?;
            let info = inspect(input, &config).await.context("Failed to inspect PDF")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("File:         {}", input);
                println!("Size:         {} bytes", info.byte_len);
                println!("Pages:        {}", info.page_count);
                println!(
                    "Chunks:       {} × up to {} pages",
                    info.chunk_count, info.pages_per_chunk
                );
            }
        }

        Command::Split {
            input,
            pages_per_chunk,
            out_dir,
        } => {
            let config = base_config(&cli).pages_per_chunk(*pages_per_chunk).build()?;
            let document = load_source(input, config.download_timeout_secs)
                .await
                .context("Failed to load PDF")?;
            let chunks = split_document(&document, &config).context("Split failed")?;

            let paths = write_chunks(&chunks, out_dir).await?;
            let written: Vec<serde_json::Value> = chunks
                .iter()
                .zip(&paths)
                .map(|(chunk, path)| {
                    serde_json::json!({
                        "path": path,
                        "startPage": chunk.start_page,
                        "endPage": chunk.end_page,
                    })
                })
                .collect();

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&written)?);
            } else if !cli.quiet {
                for chunk in &chunks {
                    eprintln!(
                        "  {} pages {:>3}-{:<3}  {}",
                        green("✓"),
                        chunk.start_page,
                        chunk.end_page,
                        dim(&format!("{} bytes", chunk.buffer.len()))
                    );
                }
                eprintln!(
                    "{} {} chunks → {}",
                    green("✔"),
                    bold(&chunks.len().to_string()),
                    out_dir.display()
                );
            }
        }

        Command::Render {
            input,
            page,
            density,
            output,
        } => {
            let config = base_config(&cli).density(*density).build()?;
            let document = load_source(input, config.download_timeout_secs)
                .await
                .context("Failed to load PDF")?;
            let rasterizer = Arc::new(PageRasterizer::from_config(&config));
            let raster = exam_pdf_pipeline::render_page(rasterizer, document, *page, config.density)
                .await
                .context("Rendering failed")?;
            let png = encode_png(&raster.image)?;
            write_file(output, &png).await?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "page": raster.page,
                        "width": raster.width(),
                        "height": raster.height(),
                        "engine": raster.engine,
                        "used_fallback": raster.used_fallback,
                        "path": output,
                    })
                );
            } else if !cli.quiet {
                eprintln!(
                    "{} page {} → {}x{} px via {}  →  {}",
                    green("✔"),
                    raster.page,
                    raster.width(),
                    raster.height(),
                    raster.engine,
                    bold(&output.display().to_string())
                );
            }
        }

        Command::Crop {
            image,
            bbox,
            output,
        } => {
            let value: serde_json::Value =
                serde_json::from_str(bbox).context("--bbox is not valid JSON")?;
            let bbox = BoundingBox::from_value(&value)?;
            let bytes = tokio::fs::read(image)
                .await
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let png = crop_png(&bytes, &bbox).context("Crop failed")?;
            write_file(output, &png).await?;
            if !cli.quiet && !cli.json {
                eprintln!("{} → {}", green("✔"), bold(&output.display().to_string()));
            }
        }

        Command::Extract {
            input,
            diagrams,
            out_dir,
            density,
            concurrency,
            render_timeout,
        } => {
            let mut builder = base_config(&cli).density(*density).concurrency(*concurrency);
            if let Some(secs) = render_timeout {
                builder = builder.render_timeout_secs(*secs);
            }
            let config = builder.build()?;

            let requests = read_requests(diagrams).await?;
            let document = load_source(input, config.download_timeout_secs)
                .await
                .context("Failed to load PDF")?;

            let spinner = (!cli.quiet && !cli.json).then(|| {
                let bar = ProgressBar::new_spinner();
                bar.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner())
                        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
                );
                bar.set_prefix("Extracting");
                bar.set_message(format!("{} diagrams", requests.len()));
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            });

            let output = extract_diagrams(&document, &requests, &config)
                .await
                .context("Extraction failed")?;
            if let Some(bar) = spinner {
                bar.finish_and_clear();
            }

            write_diagrams(&output.diagrams, out_dir).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else if !cli.quiet {
                for diagram in &output.diagrams {
                    match &diagram.error {
                        None => eprintln!(
                            "  {} {:<16} page {:>3}  {}",
                            green("✓"),
                            diagram.id,
                            diagram.page,
                            dim(&diagram
                                .region
                                .map(|r| format!("{}x{} px", r.width, r.height))
                                .unwrap_or_default())
                        ),
                        Some(e) => eprintln!("  {} {:<16} {}", red("✗"), diagram.id, red(&e.to_string())),
                    }
                }
                let stats = &output.stats;
                eprintln!(
                    "{} {}/{} diagrams  {} pages ({} via fallback)  {}ms",
                    if stats.diagrams_failed == 0 { green("✔") } else { red("⚠") },
                    stats.diagrams_extracted,
                    output.diagrams.len(),
                    stats.pages_rendered,
                    stats.fallback_renders,
                    stats.total_duration_ms
                );
            }

            if output.stats.diagrams_failed > 0 {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}

/// Config fields shared by every subcommand.
fn base_config(cli: &Cli) -> exam_pdf_pipeline::PipelineConfigBuilder {
    let mut builder = PipelineConfig::builder()
        .fallback_tool(&cli.fallback_tool)
        .download_timeout_secs(cli.download_timeout);
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_root(dir);
    }
    builder
}

/// Parse the `--diagrams` file.
async fn read_requests(path: &Path) -> Result<Vec<DiagramRequest>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;
    let items = value
        .as_array()
        .with_context(|| format!("{} must contain a JSON array", path.display()))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            DiagramRequest::from_value(item, i).with_context(|| format!("Diagram #{i} is invalid"))
        })
        .collect()
}

/// Write `bytes` to `path`, creating parent directories as needed.
async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
