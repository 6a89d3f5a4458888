use crate::models::{metadata_chunk_id, FetchedRecord};
use tracing::warn;

pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Chunks of one source in document order.
#[derive(Debug)]
pub struct OrderedChunks<'a> {
    pub chunks: Vec<&'a FetchedRecord>,
    pub unnumbered: usize,
}

pub fn order_chunks(records: &[FetchedRecord]) -> OrderedChunks<'_> {
    let mut numbered = Vec::new();
    let mut unnumbered = Vec::new();

    for (position, record) in records.iter().enumerate() {
        match metadata_chunk_id(&record.metadata) {
            Some(chunk_id) => numbered.push((chunk_id, position, record)),
            None => unnumbered.push(record),
        }
    }

    numbered.sort_by_key(|(chunk_id, position, _)| (*chunk_id, *position));

    let count = unnumbered.len();
    let chunks = numbered
        .into_iter()
        .map(|(_, _, record)| record)
        .chain(unnumbered)
        .collect();

    OrderedChunks {
        chunks,
        unnumbered: count,
    }
}

pub fn reconstruct_text(source: &str, records: &[FetchedRecord]) -> (String, usize) {
    let ordered = order_chunks(records);
    if ordered.unnumbered > 0 {
        warn!(
            source,
            unnumbered = ordered.unnumbered,
            "chunks without chunk_id appended in retrieval order"
        );
    }

    let text = ordered
        .chunks
        .iter()
        .map(|record| record.text.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR);

    (text, ordered.chunks.len())
}
