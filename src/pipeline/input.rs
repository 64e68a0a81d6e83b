//! Input resolution: turn a user-supplied path or URL into a
//! [`SourceDocument`].
//!
//! Uploaded question papers arrive either as files on disk or as links to
//! object storage. Both end up fully in memory: the splitter and pdfium
//! work from byte slices, and the fallback renderer writes its own scoped
//! copy when it needs a file. The `%PDF` magic bytes are checked here so
//! callers get a meaningful error rather than a parser failure.

use crate::document::SourceDocument;
use crate::error::PipelineError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an in-memory PDF.
///
/// URLs are downloaded; anything else is treated as a local path.
pub async fn load_source(input: &str, timeout_secs: u64) -> Result<SourceDocument, PipelineError> {
    if input.trim().is_empty() {
        return Err(PipelineError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(input).await
    }
}

/// Read a local file, validating existence and PDF magic bytes.
async fn load_local(path_str: &str) -> Result<SourceDocument, PipelineError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied { path });
        }
        Err(_) => return Err(PipelineError::FileNotFound { path }),
    };

    let doc = SourceDocument::from(bytes);
    check_magic(&doc, path_str)?;

    debug!("Loaded local PDF: {} ({} bytes)", path.display(), doc.len());
    Ok(doc)
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, PipelineError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            PipelineError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PipelineError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let doc = SourceDocument::from(bytes.to_vec());
    check_magic(&doc, url)?;

    info!("Downloaded {} bytes", doc.len());
    Ok(doc)
}

fn check_magic(doc: &SourceDocument, source_name: &str) -> Result<(), PipelineError> {
    if doc.has_pdf_magic() {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = doc.len().min(4);
    magic[..n].copy_from_slice(&doc.as_bytes()[..n]);
    Err(PipelineError::NotAPdf {
        source_name: source_name.to_string(),
        magic,
    })
}
