//! Document-level entry points: split, inspect, and batch diagram
//! extraction.
//!
//! [`extract_diagrams`] is the path the exam-creation handler takes once the
//! detector has reported where the diagrams are: every distinct page is
//! rendered exactly once, every diagram on it is cropped from that one
//! bitmap, and the bitmap is dropped before the page's result is returned.
//! Diagram failures are recorded per diagram; only an unusable config or a
//! broken runtime aborts the batch.
//!
//! [`write_chunks`] and [`write_diagrams`] persist results to a directory
//! for callers that hand files on rather than bytes.

use crate::config::PipelineConfig;
use crate::document::{PageChunk, SourceDocument};
use crate::error::{DiagramError, PipelineError};
use crate::output::{DiagramImage, DiagramRequest, DocumentInfo, ExtractionOutput, ExtractionStats};
use crate::pipeline::render::{PageRasterizer, RenderStrategy};
use crate::pipeline::{crop, encode, input, split};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Split a document into chunks of `config.pages_per_chunk` pages.
pub fn split_document(
    document: &SourceDocument,
    config: &PipelineConfig,
) -> Result<Vec<PageChunk>, PipelineError> {
    split::split(document, config.pages_per_chunk)
}

/// Load a path or URL and report page and chunk counts.
///
/// Does not need pdfium or the external tool.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &PipelineConfig,
) -> Result<DocumentInfo, PipelineError> {
    let document = input::load_source(input_str.as_ref(), config.download_timeout_secs).await?;
    describe(&document, config)
}

/// [`inspect`] for a document already in memory.
pub fn describe(
    document: &SourceDocument,
    config: &PipelineConfig,
) -> Result<DocumentInfo, PipelineError> {
    let page_count = split::page_count(document)?;
    Ok(DocumentInfo {
        page_count,
        byte_len: document.len(),
        chunk_count: split::chunk_count(
            page_count,
            u32::try_from(config.pages_per_chunk).unwrap_or(u32::MAX),
        ),
        pages_per_chunk: config.pages_per_chunk,
    })
}

/// Render, crop and PNG-encode every requested diagram.
///
/// Uses pdfium with the configured external-tool fallback.
///
/// # Returns
/// `Ok(ExtractionOutput)` even when some diagrams failed; inspect
/// `DiagramImage::error` or call [`ExtractionOutput::into_result`].
pub async fn extract_diagrams(
    document: &SourceDocument,
    requests: &[DiagramRequest],
    config: &PipelineConfig,
) -> Result<ExtractionOutput, PipelineError> {
    let rasterizer = Arc::new(PageRasterizer::from_config(config));
    extract_diagrams_with(rasterizer, document, requests, config).await
}

/// [`extract_diagrams`] with caller-supplied rendering engines.
pub async fn extract_diagrams_with<P, F>(
    rasterizer: Arc<PageRasterizer<P, F>>,
    document: &SourceDocument,
    requests: &[DiagramRequest],
    config: &PipelineConfig,
) -> Result<ExtractionOutput, PipelineError>
where
    P: RenderStrategy + 'static,
    F: RenderStrategy + 'static,
{
    let start = Instant::now();

    // Group by page, remembering each request's position for the output.
    let mut by_page: BTreeMap<u32, Vec<(usize, DiagramRequest)>> = BTreeMap::new();
    for (pos, req) in requests.iter().enumerate() {
        by_page
            .entry(req.page.max(1))
            .or_default()
            .push((pos, req.clone()));
    }
    info!(
        "Extracting {} diagrams from {} pages",
        requests.len(),
        by_page.len()
    );

    let pages_requested = by_page.len();
    let density = config.density;
    let timeout_secs = config.render_timeout_secs;

    let outcomes: Vec<PageOutcome> = stream::iter(by_page.into_iter().map(|(page, reqs)| {
        let rasterizer = Arc::clone(&rasterizer);
        let document = document.clone();
        async move { run_page(rasterizer, document, page, density, reqs, timeout_secs).await }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .collect()
    .await;

    let mut stats = ExtractionStats {
        pages_requested,
        ..ExtractionStats::default()
    };
    let mut slots: Vec<Option<DiagramImage>> = vec![None; requests.len()];
    for outcome in outcomes {
        if outcome.engine.is_some() {
            stats.pages_rendered += 1;
            if outcome.used_fallback {
                stats.fallback_renders += 1;
            }
        }
        for (pos, diagram) in outcome.diagrams {
            slots[pos] = Some(diagram);
        }
    }

    let diagrams: Vec<DiagramImage> = slots.into_iter().flatten().collect();
    stats.diagrams_extracted = diagrams.iter().filter(|d| d.is_ok()).count();
    stats.diagrams_failed = diagrams.len() - stats.diagrams_extracted;
    stats.total_duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Extraction complete: {}/{} diagrams, {} fallback renders, {}ms",
        stats.diagrams_extracted,
        diagrams.len(),
        stats.fallback_renders,
        stats.total_duration_ms
    );

    Ok(ExtractionOutput { diagrams, stats })
}

// ── Writing results ──────────────────────────────────────────────────────

/// Write each chunk to `dir` as `chunk-<start>-<end>.pdf`, creating `dir`
/// if needed. Returns the written paths in chunk order.
pub async fn write_chunks(chunks: &[PageChunk], dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    create_output_dir(dir).await?;
    let mut written = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let path = dir.join(format!("chunk-{}-{}.pdf", chunk.start_page, chunk.end_page));
        write_output(&path, &chunk.buffer).await?;
        written.push(path);
    }
    info!("Wrote {} chunks to {}", written.len(), dir.display());
    Ok(written)
}

/// Write every successful diagram to `dir` as `<id>.png`.
///
/// Ids are reduced to `[A-Za-z0-9_-]` so they cannot escape `dir`. When two
/// ids reduce to the same name, the later one gets its position in
/// `diagrams` as a suffix (`q_1-3.png`), so no file is overwritten.
/// Returns `(id, path)` pairs for the files written.
pub async fn write_diagrams(
    diagrams: &[DiagramImage],
    dir: &Path,
) -> Result<Vec<(String, PathBuf)>, PipelineError> {
    create_output_dir(dir).await?;
    let mut used = HashSet::new();
    let mut written = Vec::new();
    for (pos, diagram) in diagrams.iter().enumerate() {
        if !diagram.is_ok() {
            continue;
        }
        let stem = unique_stem(&diagram.id, pos, &mut used);
        let path = dir.join(format!("{stem}.png"));
        write_output(&path, &diagram.png).await?;
        written.push((diagram.id.clone(), path));
    }
    debug!("Wrote {} diagrams to {}", written.len(), dir.display());
    Ok(written)
}

fn unique_stem(id: &str, pos: usize, used: &mut HashSet<String>) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let stem = if cleaned.is_empty() {
        "diagram".to_string()
    } else {
        cleaned
    };
    if used.insert(stem.clone()) {
        return stem;
    }
    let mut n = pos;
    loop {
        let candidate = format!("{stem}-{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

async fn create_output_dir(dir: &Path) -> Result<(), PipelineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| PipelineError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source,
        })
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| PipelineError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct PageOutcome {
    engine: Option<&'static str>,
    used_fallback: bool,
    diagrams: Vec<(usize, DiagramImage)>,
}

/// Render one page on the blocking pool and crop its diagrams.
///
/// A timed-out render is abandoned, not cancelled: the blocking task runs to
/// completion and its result is discarded.
async fn run_page<P, F>(
    rasterizer: Arc<PageRasterizer<P, F>>,
    document: SourceDocument,
    page: u32,
    density: u32,
    reqs: Vec<(usize, DiagramRequest)>,
    timeout_secs: Option<u64>,
) -> PageOutcome
where
    P: RenderStrategy + 'static,
    F: RenderStrategy + 'static,
{
    let positions: Vec<(usize, String)> = reqs.iter().map(|(pos, r)| (*pos, r.id.clone())).collect();
    let task = tokio::task::spawn_blocking(move || process_page(&rasterizer, &document, page, density, reqs));

    let joined = match timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("Page {}: rendering timed out after {}s", page, secs);
                return failed_page(page, positions, DiagramError::Timeout { page, secs });
            }
        },
        None => task.await,
    };

    joined.unwrap_or_else(|e| {
        failed_page(
            page,
            positions,
            DiagramError::RenderFailed {
                page,
                detail: format!("render task panicked: {e}"),
            },
        )
    })
}

fn failed_page(page: u32, positions: Vec<(usize, String)>, error: DiagramError) -> PageOutcome {
    PageOutcome {
        engine: None,
        used_fallback: false,
        diagrams: positions
            .into_iter()
            .map(|(pos, id)| {
                (
                    pos,
                    DiagramImage {
                        id,
                        page,
                        region: None,
                        png: Vec::new(),
                        engine: None,
                        error: Some(error.clone()),
                    },
                )
            })
            .collect(),
    }
}

fn process_page<P: RenderStrategy, F: RenderStrategy>(
    rasterizer: &PageRasterizer<P, F>,
    document: &SourceDocument,
    page: u32,
    density: u32,
    reqs: Vec<(usize, DiagramRequest)>,
) -> PageOutcome {
    let raster = match rasterizer.render(document, page, density) {
        Ok(raster) => raster,
        Err(e) => {
            warn!("Page {}: {}", page, e);
            let detail = match e {
                PipelineError::PageRenderFailed { detail, .. } => detail,
                other => other.to_string(),
            };
            let positions = reqs.into_iter().map(|(pos, r)| (pos, r.id)).collect();
            return failed_page(page, positions, DiagramError::RenderFailed { page, detail });
        }
    };

    let diagrams = reqs
        .into_iter()
        .map(|(pos, req)| {
            let mut out = DiagramImage {
                id: req.id.clone(),
                page,
                region: None,
                png: Vec::new(),
                engine: Some(raster.engine.to_string()),
                error: None,
            };
            match crop_one(&raster.image, &req) {
                Ok((region, png)) => {
                    debug!(
                        "Diagram '{}' on page {} → {}x{} px",
                        req.id, page, region.width, region.height
                    );
                    out.region = Some(region);
                    out.png = png;
                }
                Err(e) => {
                    warn!("Diagram '{}' on page {}: {}", req.id, page, e);
                    out.error = Some(e);
                }
            }
            (pos, out)
        })
        .collect();

    PageOutcome {
        engine: Some(raster.engine),
        used_fallback: raster.used_fallback,
        diagrams,
    }
}

fn crop_one(
    image: &image::DynamicImage,
    req: &DiagramRequest,
) -> Result<(crop::CropRegion, Vec<u8>), DiagramError> {
    let region = crop::region_for(&req.bbox, image.width(), image.height()).map_err(|e| {
        match e {
            PipelineError::CropOutOfBounds {
                left,
                top,
                image_width,
                image_height,
            } => DiagramError::OutOfBounds {
                id: req.id.clone(),
                left,
                top,
                image_width,
                image_height,
            },
            other => DiagramError::InvalidBoundingBox {
                id: req.id.clone(),
                detail: other.to_string(),
            },
        }
    })?;

    let cropped = crop::extract_region(image, region);
    let png = encode::encode_png(&cropped).map_err(|e| DiagramError::EncodeFailed {
        id: req.id.clone(),
        detail: e.to_string(),
    })?;
    Ok((region, png))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_document_uses_configured_chunk_size() {
        let config = PipelineConfig::default();
        let err = split_document(&SourceDocument::from(b"junk".to_vec()), &config).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDocument { .. }));
    }

    #[test]
    fn failed_page_marks_every_diagram() {
        let outcome = failed_page(
            3,
            vec![(0, "a".into()), (2, "b".into())],
            DiagramError::Timeout { page: 3, secs: 9 },
        );
        assert!(outcome.engine.is_none());
        assert_eq!(outcome.diagrams.len(), 2);
        assert!(outcome.diagrams.iter().all(|(_, d)| d.error.is_some()));
        assert_eq!(outcome.diagrams[1].0, 2);
    }

    #[test]
    fn colliding_ids_get_position_suffix() {
        let mut used = HashSet::new();
        assert_eq!(unique_stem("q/1", 0, &mut used), "q_1");
        assert_eq!(unique_stem("q_1", 1, &mut used), "q_1-1");
        assert_eq!(unique_stem("q 1", 2, &mut used), "q_1-2");
        assert_eq!(unique_stem("../etc", 3, &mut used), "___etc");
        assert_eq!(unique_stem("", 4, &mut used), "diagram");
    }
}
