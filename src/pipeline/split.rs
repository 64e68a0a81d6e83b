//! Chunk splitting: cut a PDF into standalone page-range sub-documents.
//!
//! AI extraction requests have input-size limits, so a 40-page question
//! paper is processed as eight 5-page documents. Each chunk is a complete
//! PDF: the page tree is pruned to the chunk's pages and every object those
//! pages no longer reach is dropped before saving.
//!
//! `lopdf` is used instead of pdfium here because page-tree surgery needs
//! no rendering engine, which keeps splitting available on hosts without
//! the pdfium shared library.

use crate::document::{PageChunk, SourceDocument};
use crate::error::PipelineError;
use lopdf::Document;
use tracing::{debug, info};

/// Split `document` into consecutive chunks of at most `pages_per_chunk`
/// pages each.
///
/// Chunks come back in ascending page order and together cover every page
/// exactly once. A document without pages yields no chunks.
pub fn split(
    document: &SourceDocument,
    pages_per_chunk: usize,
) -> Result<Vec<PageChunk>, PipelineError> {
    if pages_per_chunk == 0 {
        return Err(PipelineError::InvalidConfig(
            "pages per chunk must be ≥ 1".into(),
        ));
    }

    let source = parse(document)?;
    let total = source.get_pages().len() as u32;
    let step = u32::try_from(pages_per_chunk).unwrap_or(u32::MAX);
    info!(
        "Splitting {} pages into chunks of {}",
        total, pages_per_chunk
    );

    let mut chunks = Vec::with_capacity(chunk_count(total, step) as usize);
    let mut start = 1u32;
    while start <= total {
        let end = start.saturating_add(step - 1).min(total);
        let buffer = extract_range(&source, start, end)?;
        debug!("Chunk pages {}-{} → {} bytes", start, end, buffer.len());
        chunks.push(PageChunk {
            buffer,
            start_page: start,
            end_page: end,
        });
        start = match end.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(chunks)
}

/// Number of pages in `document`.
pub fn page_count(document: &SourceDocument) -> Result<u32, PipelineError> {
    Ok(parse(document)?.get_pages().len() as u32)
}

/// Number of chunks a `total`-page document splits into.
pub fn chunk_count(total: u32, pages_per_chunk: u32) -> u32 {
    if pages_per_chunk == 0 {
        return 0;
    }
    total.div_ceil(pages_per_chunk)
}

fn parse(document: &SourceDocument) -> Result<Document, PipelineError> {
    if document.is_empty() {
        return Err(PipelineError::InvalidDocument {
            detail: "empty buffer".into(),
        });
    }
    Document::load_mem(document.as_bytes()).map_err(|e| PipelineError::InvalidDocument {
        detail: e.to_string(),
    })
}

/// Serialise a copy of `source` holding only pages `start..=end`.
fn extract_range(source: &Document, start: u32, end: u32) -> Result<Vec<u8>, PipelineError> {
    let mut doc = source.clone();
    let outside: Vec<u32> = doc
        .get_pages()
        .keys()
        .copied()
        .filter(|n| *n < start || *n > end)
        .collect();
    doc.delete_pages(&outside);
    doc.prune_objects();

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| PipelineError::Internal(format!("saving pages {start}-{end}: {e}")))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object};

    /// A PDF whose page N has a MediaBox `100 + N` points wide.
    fn sample_pdf(pages: u32) -> SourceDocument {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (1..=pages)
            .map(|n| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(100 + n as i64),
                        Object::Integer(800),
                    ],
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => Object::Integer(pages as i64),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        SourceDocument::from(buf)
    }

    fn page_widths(chunk: &PageChunk) -> Vec<i64> {
        let doc = Document::load_mem(&chunk.buffer).unwrap();
        doc.get_pages()
            .values()
            .map(|id| {
                let page = doc.get_dictionary(*id).unwrap();
                page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                    .as_i64()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn twelve_pages_by_five() {
        let chunks = split(&sample_pdf(12), 5).unwrap();
        let ranges: Vec<(u32, u32)> = chunks.iter().map(|c| (c.start_page, c.end_page)).collect();
        assert_eq!(ranges, vec![(1, 5), (6, 10), (11, 12)]);
    }

    #[test]
    fn chunks_hold_the_right_pages() {
        let chunks = split(&sample_pdf(7), 3).unwrap();
        assert_eq!(page_widths(&chunks[0]), vec![101, 102, 103]);
        assert_eq!(page_widths(&chunks[1]), vec![104, 105, 106]);
        assert_eq!(page_widths(&chunks[2]), vec![107]);
    }

    #[test]
    fn chunk_larger_than_document() {
        let chunks = split(&sample_pdf(3), 5).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].start_page, chunks[0].end_page), (1, 3));
        assert_eq!(page_count(&chunks[0].to_document()).unwrap(), 3);
    }

    #[test]
    fn zero_page_document_yields_no_chunks() {
        assert!(split(&sample_pdf(0), 5).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_invalid_document() {
        let err = split(&SourceDocument::from(b"not a pdf".to_vec()), 5).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDocument { .. }));

        let err = split(&SourceDocument::from(Vec::new()), 5).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidDocument { .. }));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = split(&sample_pdf(2), 0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn chunk_count_is_ceiling() {
        assert_eq!(chunk_count(12, 5), 3);
        assert_eq!(chunk_count(10, 5), 2);
        assert_eq!(chunk_count(0, 5), 0);
        assert_eq!(chunk_count(1, 1), 1);
    }
}
