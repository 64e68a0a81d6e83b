//! Result types returned by [`crate::extract_diagrams`] and
//! [`crate::inspect`].

use crate::document::base64_bytes;
use crate::error::{DiagramError, PipelineError};
use crate::pipeline::crop::{BoundingBox, CropRegion};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One diagram to cut out, as reported by the detection step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramRequest {
    /// Caller-chosen identifier, echoed back in the result (e.g. the
    /// question id the diagram belongs to).
    pub id: String,
    /// 1-indexed page number in the source document.
    pub page: u32,
    pub bbox: BoundingBox,
}

impl DiagramRequest {
    pub fn new(id: impl Into<String>, page: u32, bbox: BoundingBox) -> Self {
        Self {
            id: id.into(),
            page,
            bbox,
        }
    }

    /// Parse `{"id": …, "page": N, "bbox": {…}}`, validating the box the same
    /// way [`BoundingBox::from_value`] does.
    ///
    /// A missing `id` defaults to `"diagram-<index>"`.
    pub fn from_value(value: &Value, index: usize) -> Result<Self, PipelineError> {
        let id = match value.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("diagram-{index}"),
        };
        let page = value
            .get("page")
            .and_then(Value::as_u64)
            .and_then(|p| u32::try_from(p).ok())
            .ok_or_else(|| {
                PipelineError::InvalidBoundingBox(format!("diagram '{id}': missing or invalid 'page'"))
            })?;
        let bbox = value
            .get("bbox")
            .ok_or_else(|| PipelineError::InvalidBoundingBox(format!("diagram '{id}': missing 'bbox'")))
            .and_then(BoundingBox::from_value)?;
        Ok(Self { id, page, bbox })
    }
}

/// The outcome for one [`DiagramRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramImage {
    pub id: String,
    pub page: u32,
    /// Pixel region cut from the rendered page; `None` on failure.
    pub region: Option<CropRegion>,
    /// PNG bytes (base64 in JSON); empty on failure.
    #[serde(with = "base64_bytes", default, skip_serializing_if = "Vec::is_empty")]
    pub png: Vec<u8>,
    /// Engine that rendered the page, when rendering succeeded.
    pub engine: Option<String>,
    pub error: Option<DiagramError>,
}

impl DiagramImage {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Run statistics for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Distinct pages that had at least one diagram.
    pub pages_requested: usize,
    /// Pages rendered successfully by either engine.
    pub pages_rendered: usize,
    /// Pages that needed the external-tool fallback.
    pub fallback_renders: usize,
    pub diagrams_extracted: usize,
    pub diagrams_failed: usize,
    pub total_duration_ms: u64,
}

/// All diagrams of one extraction, in request order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub diagrams: Vec<DiagramImage>,
    pub stats: ExtractionStats,
}

impl ExtractionOutput {
    /// Treat any failed diagram as fatal, reporting the first one.
    pub fn into_result(self) -> Result<Vec<DiagramImage>, PipelineError> {
        if let Some(err) = self.diagrams.iter().find_map(|d| d.error.clone()) {
            return Err(err.into_pipeline_error());
        }
        Ok(self.diagrams)
    }
}

/// Basic facts about a document, without rendering anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub page_count: u32,
    pub byte_len: usize,
    /// Chunks [`crate::split_document`] would produce with the configured
    /// chunk size.
    pub chunk_count: u32,
    pub pages_per_chunk: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_from_value() {
        let req = DiagramRequest::from_value(
            &json!({"id": "q3", "page": 2, "bbox": {"x": 1, "y": 2, "width": 3, "height": 4}}),
            0,
        )
        .unwrap();
        assert_eq!(req.id, "q3");
        assert_eq!(req.page, 2);
        assert_eq!(req.bbox.width, 3.0);
    }

    #[test]
    fn request_default_id_and_missing_width() {
        let err = DiagramRequest::from_value(
            &json!({"page": 1, "bbox": {"x": 1, "y": 2, "height": 4}}),
            7,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'width'"), "got: {msg}");

        let req = DiagramRequest::from_value(
            &json!({"page": 1, "bbox": {"x": 0, "y": 0, "width": 1, "height": 1}}),
            7,
        )
        .unwrap();
        assert_eq!(req.id, "diagram-7");
    }

    #[test]
    fn request_without_page_is_rejected() {
        let err = DiagramRequest::from_value(
            &json!({"id": "a", "bbox": {"x": 0, "y": 0, "width": 1, "height": 1}}),
            0,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'page'"));
    }

    #[test]
    fn into_result_surfaces_first_failure() {
        let output = ExtractionOutput {
            diagrams: vec![DiagramImage {
                id: "a".into(),
                page: 4,
                region: None,
                png: Vec::new(),
                engine: None,
                error: Some(DiagramError::RenderFailed {
                    page: 4,
                    detail: "both engines failed".into(),
                }),
            }],
            stats: ExtractionStats::default(),
        };
        match output.into_result().unwrap_err() {
            PipelineError::PageRenderFailed { page, .. } => assert_eq!(page, 4),
            other => panic!("unexpected error: {other}"),
        }
    }
}
