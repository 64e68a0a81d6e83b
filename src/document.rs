//! In-memory PDF buffers passed between pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// An immutable PDF byte buffer.
///
/// Cloning is cheap (the bytes are shared), which lets a document move onto
/// a blocking worker thread while the caller keeps its own handle.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceDocument {
    bytes: Arc<[u8]>,
}

impl SourceDocument {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `true` when the buffer starts with the `%PDF` header.
    pub fn has_pdf_magic(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
    }
}

impl From<Vec<u8>> for SourceDocument {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for SourceDocument {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A standalone sub-document holding pages `start_page..=end_page` of its
/// source (1-indexed, inclusive).
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageChunk {
    /// The chunk serialised as a complete PDF.
    #[serde(with = "base64_bytes")]
    pub buffer: Vec<u8>,
    pub start_page: u32,
    pub end_page: u32,
}

impl PageChunk {
    /// Number of pages in the chunk.
    pub fn page_count(&self) -> u32 {
        self.end_page - self.start_page + 1
    }

    /// The chunk as a document for further processing.
    pub fn to_document(&self) -> SourceDocument {
        SourceDocument::new(self.buffer.clone())
    }
}

impl fmt::Debug for PageChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageChunk")
            .field("start_page", &self.start_page)
            .field("end_page", &self.end_page)
            .field("bytes", &self.buffer.len())
            .finish()
    }
}

/// Serialise binary buffers as base64 strings in JSON output.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
