use crate::chunking::json_elements;
use crate::config::WriterConfig;
use crate::embeddings::{l2_normalize, Embedder};
use crate::models::{
    full_document_id, Chunk, Document, FetchedRecord, StoredRecord, FULL_DOCUMENT_KEY,
    PAGE_KEY, SOURCE_KEY, TOTAL_CHUNKS_KEY,
};
use crate::reconstruct::reconstruct_text;
use crate::traits::VectorStore;
use crate::SearchError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionSummary {
    pub collection: String,
    pub chunks_written: usize,
    pub full_documents_written: usize,
    pub batches: usize,
    pub verification: Option<VerificationReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingSample {
    pub source: String,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub expected_chunks: usize,
    pub stored_chunks: usize,
    pub sampled_lines: usize,
    pub missing_samples: Vec<MissingSample>,
}

impl VerificationReport {
    pub fn count_matches(&self) -> bool {
        self.expected_chunks == self.stored_chunks
    }

    pub fn is_clean(&self) -> bool {
        self.count_matches() && self.missing_samples.is_empty()
    }
}

pub struct CollectionWriter<'a, S, E>
where
    S: VectorStore,
    E: Embedder,
{
    store: &'a S,
    embedder: &'a E,
    config: WriterConfig,
}

impl<'a, S, E> CollectionWriter<'a, S, E>
where
    S: VectorStore,
    E: Embedder,
{
    pub fn new(store: &'a S, embedder: &'a E, config: WriterConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub async fn replace(
        &self,
        documents: &[Document],
        chunks: &[Chunk],
    ) -> Result<IngestionSummary, SearchError> {
        if chunks.is_empty() {
            return Err(SearchError::Request("no chunks to write".to_string()));
        }
        if self.config.batch_size == 0 {
            return Err(SearchError::Request(
                "write batch size must be positive".to_string(),
            ));
        }

        let collection = self.store.collection().to_string();
        match self.store.delete_collection().await {
            Ok(()) => info!(collection = %collection, "deleted existing collection"),
            Err(error) if error.is_not_found() => {
                debug!(collection = %collection, "no existing collection to delete")
            }
            Err(error) => return Err(error),
        }
        self.store.create_collection().await?;

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        let embeddings = self.embedder.embed_many(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(SearchError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut records = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredRecord {
                id: chunk.record_id(),
                embedding,
                text: chunk.text.clone(),
                metadata: chunk.record_metadata(),
            })
            .collect::<Vec<_>>();

        let full_documents = if self.config.store_full_documents {
            full_document_records(documents, &records)
        } else {
            Vec::new()
        };
        let full_documents_written = full_documents.len();
        records.extend(full_documents);

        let mut batches = 0;
        for batch in records.chunks(self.config.batch_size) {
            self.store.add(batch).await?;
            batches += 1;
            debug!(batch = batches, size = batch.len(), "stored batch");
        }

        info!(
            collection = %collection,
            chunks = chunks.len(),
            full_documents = full_documents_written,
            batches,
            "collection replaced"
        );

        let verification = if self.config.verify {
            match self.verify(documents, chunks).await {
                Ok(report) => Some(report),
                Err(error) => {
                    warn!(collection = %collection, error = %error, "verification failed after write");
                    None
                }
            }
        } else {
            None
        };

        Ok(IngestionSummary {
            collection,
            chunks_written: chunks.len(),
            full_documents_written,
            batches,
            verification,
        })
    }

    /// JSON sources are sampled from their stored elements, other sources from their text.
    pub async fn verify(
        &self,
        documents: &[Document],
        chunks: &[Chunk],
    ) -> Result<VerificationReport, SearchError> {
        let stored = self
            .store
            .get(None)
            .await?
            .into_iter()
            .filter(|record| !record.is_full_document())
            .collect::<Vec<_>>();

        if stored.len() != chunks.len() {
            warn!(
                expected = chunks.len(),
                stored = stored.len(),
                "stored chunk count does not match"
            );
        }

        let mut by_source: HashMap<&str, Vec<FetchedRecord>> = HashMap::new();
        for record in &stored {
            by_source
                .entry(record.source())
                .or_default()
                .push(record.clone());
        }

        let mut sampled_lines = 0;
        let mut missing_samples = Vec::new();
        for (source, chunk_texts) in chunks_by_source(chunks) {
            let reconstructed = by_source
                .get(source)
                .map(|records| reconstruct_text(source, records).0)
                .unwrap_or_default();

            let contents = documents
                .iter()
                .filter(|document| document.source == source)
                .map(|document| document.content.as_str())
                .collect::<Vec<_>>();
            let is_json = !contents.is_empty()
                && contents.iter().all(|content| json_elements(content).is_some());
            let texts = if is_json || contents.is_empty() {
                chunk_texts
            } else {
                contents
            };

            for line in sample_lines(&texts, self.config.sample_lines) {
                sampled_lines += 1;
                if !reconstructed.contains(line) {
                    warn!(source, line, "sampled line missing from stored chunks");
                    missing_samples.push(MissingSample {
                        source: source.to_string(),
                        line: line.to_string(),
                    });
                }
            }
        }

        Ok(VerificationReport {
            expected_chunks: chunks.len(),
            stored_chunks: stored.len(),
            sampled_lines,
            missing_samples,
        })
    }
}

fn chunks_by_source(chunks: &[Chunk]) -> Vec<(&str, Vec<&str>)> {
    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for chunk in chunks {
        match grouped
            .iter()
            .position(|(source, _)| *source == chunk.source)
        {
            Some(index) => grouped[index].1.push(&chunk.text),
            None => grouped.push((chunk.source.as_str(), vec![chunk.text.as_str()])),
        }
    }
    grouped
}

fn sample_lines<'t>(texts: &[&'t str], wanted: usize) -> Vec<&'t str> {
    let candidates = texts
        .iter()
        .copied()
        .flat_map(str::lines)
        .map(str::trim)
        .filter(|line| line.chars().count() > 20)
        .collect::<Vec<_>>();

    if wanted == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let step = (candidates.len() / wanted).max(1);
    candidates.into_iter().step_by(step).take(wanted).collect()
}

// Embedded as the normalised centroid of the source's chunk vectors.
fn full_document_records(documents: &[Document], chunk_records: &[StoredRecord]) -> Vec<StoredRecord> {
    let mut sources: Vec<&str> = Vec::new();
    for document in documents {
        if !sources.contains(&document.source.as_str()) {
            sources.push(&document.source);
        }
    }

    sources
        .into_iter()
        .filter_map(|source| {
            let vectors = chunk_records
                .iter()
                .filter(|record| record.metadata.get(SOURCE_KEY).and_then(Value::as_str) == Some(source))
                .map(|record| record.embedding.as_slice())
                .collect::<Vec<_>>();
            let embedding = centroid(&vectors)?;

            let parts = documents
                .iter()
                .filter(|document| document.source == source)
                .collect::<Vec<_>>();
            let content = parts
                .iter()
                .map(|document| document.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            let mut metadata = parts
                .first()
                .map(|document| document.metadata.clone())
                .unwrap_or_default();
            metadata.remove(PAGE_KEY);
            metadata.insert(SOURCE_KEY.to_string(), Value::String(source.to_string()));
            metadata.insert(FULL_DOCUMENT_KEY.to_string(), Value::Bool(true));
            metadata.insert(TOTAL_CHUNKS_KEY.to_string(), Value::from(vectors.len() as u64));

            Some(StoredRecord {
                id: full_document_id(source),
                embedding,
                text: content,
                metadata,
            })
        })
        .collect()
}

fn centroid(vectors: &[&[f32]]) -> Option<Vec<f32>> {
    let width = vectors.first()?.len();
    let mut sum = vec![0f32; width];
    for vector in vectors {
        for (slot, value) in sum.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
    }
    l2_normalize(&mut sum);
    Some(sum)
}

#[cfg(test)]
mod tests {
    use super::{centroid, sample_lines, CollectionWriter, MissingSample};
    use crate::chunking::{split_documents, ChunkingConfig, RecursiveSplitter};
    use crate::config::{DistanceMetric, WriterConfig};
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{Chunk, Document, FetchedRecord, QueryHit, StoredRecord, PAGE_KEY};
    use crate::stores::InMemoryStore;
    use crate::traits::{MetadataFilter, VectorStore};
    use crate::SearchError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunks_for(documents: &[Document]) -> Vec<Chunk> {
        let splitter = RecursiveSplitter::new(ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 10,
        })
        .expect("valid config");
        split_documents(documents, &splitter).expect("split")
    }

    fn prose() -> Document {
        Document::new(
            "guide.txt",
            "The pump must be primed before the first start of the season.\n\
             Check the seals for wear every two hundred operating hours.\n\
             Replace the filter cartridge whenever the pressure drop rises.",
        )
    }

    #[test]
    fn centroid_is_normalised() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let value = centroid(&[&a, &b]).expect("non-empty");
        let norm = value.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!(centroid(&[]).is_none());
    }

    #[test]
    fn sampling_skips_short_lines() {
        let texts = ["short\nthis line is comfortably long enough\nx"];
        let sampled = sample_lines(&texts, 5);
        assert_eq!(sampled, vec!["this line is comfortably long enough"]);
    }

    #[tokio::test]
    async fn replace_writes_in_batches_and_verifies() -> Result<(), SearchError> {
        let store = InMemoryStore::new("docs", DistanceMetric::Cosine);
        let embedder = CharacterNgramEmbedder::default();
        let documents = vec![prose()];
        let chunks = chunks_for(&documents);
        assert!(chunks.len() > 2);

        let config = WriterConfig {
            batch_size: 2,
            verify: true,
            ..WriterConfig::default()
        };
        let summary = CollectionWriter::new(&store, &embedder, config)
            .replace(&documents, &chunks)
            .await?;

        assert_eq!(summary.chunks_written, chunks.len());
        assert_eq!(summary.batches, chunks.len().div_ceil(2));
        let report = summary.verification.expect("verification requested");
        assert!(report.is_clean());
        assert!(report.sampled_lines > 0);
        assert_eq!(store.len().await, chunks.len());
        Ok(())
    }

    #[tokio::test]
    async fn replace_discards_previous_contents() -> Result<(), SearchError> {
        let store = InMemoryStore::new("docs", DistanceMetric::Cosine);
        let embedder = CharacterNgramEmbedder::default();

        let first = vec![Document::new("old.json", r#"[1, 2, 3, 4]"#)];
        CollectionWriter::new(&store, &embedder, WriterConfig::default())
            .replace(&first, &chunks_for(&first))
            .await?;

        let second = vec![Document::new("new.json", r#"[1]"#)];
        CollectionWriter::new(&store, &embedder, WriterConfig::default())
            .replace(&second, &chunks_for(&second))
            .await?;

        let records = store.get(None).await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "new.json_chunk_0");
        Ok(())
    }

    #[tokio::test]
    async fn full_documents_are_stored_when_requested() -> Result<(), SearchError> {
        let store = InMemoryStore::new("docs", DistanceMetric::Cosine);
        let embedder = CharacterNgramEmbedder::default();
        let documents = vec![prose()];
        let chunks = chunks_for(&documents);

        let config = WriterConfig {
            store_full_documents: true,
            verify: true,
            ..WriterConfig::default()
        };
        let summary = CollectionWriter::new(&store, &embedder, config)
            .replace(&documents, &chunks)
            .await?;
        assert_eq!(summary.full_documents_written, 1);
        assert!(summary.verification.map(|r| r.count_matches()).unwrap_or(false));

        let full = store
            .get(Some(&MetadataFilter::full_document_of("guide.txt")))
            .await?;
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].id, "guide.txt_full");
        assert_eq!(full[0].text, documents[0].content);
        Ok(())
    }

    #[tokio::test]
    async fn full_document_record_drops_page_numbers() -> Result<(), SearchError> {
        let store = InMemoryStore::new("docs", DistanceMetric::Cosine);
        let embedder = CharacterNgramEmbedder::default();
        let documents = (1..=2u64)
            .map(|page| {
                let mut document = Document::new("manual.pdf", format!("Page {page} covers valve seating."));
                document.metadata.insert(PAGE_KEY.to_string(), page.into());
                document
            })
            .collect::<Vec<_>>();

        let config = WriterConfig {
            store_full_documents: true,
            ..WriterConfig::default()
        };
        CollectionWriter::new(&store, &embedder, config)
            .replace(&documents, &chunks_for(&documents))
            .await?;

        let full = store
            .get(Some(&MetadataFilter::full_document_of("manual.pdf")))
            .await?;
        assert_eq!(full.len(), 1);
        assert!(!full[0].metadata.contains_key(PAGE_KEY));
        assert_eq!(
            full[0].text,
            "Page 1 covers valve seating.\n\nPage 2 covers valve seating."
        );
        Ok(())
    }

    struct FailingDeleteStore {
        deletes: AtomicUsize,
        inner: InMemoryStore,
    }

    #[async_trait]
    impl VectorStore for FailingDeleteStore {
        fn collection(&self) -> &str {
            self.inner.collection()
        }

        async fn delete_collection(&self) -> Result<(), SearchError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Err(SearchError::BackendResponse {
                backend: "fake".to_string(),
                details: "boom".to_string(),
            })
        }

        async fn create_collection(&self) -> Result<(), SearchError> {
            self.inner.create_collection().await
        }

        async fn add(&self, records: &[StoredRecord]) -> Result<(), SearchError> {
            self.inner.add(records).await
        }

        async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<FetchedRecord>, SearchError> {
            self.inner.get(filter).await
        }

        async fn query(
            &self,
            embedding: &[f32],
            n_results: usize,
            filter: Option<&MetadataFilter>,
        ) -> Result<Vec<QueryHit>, SearchError> {
            self.inner.query(embedding, n_results, filter).await
        }
    }

    #[tokio::test]
    async fn delete_failures_other_than_not_found_abort() {
        let store = FailingDeleteStore {
            deletes: AtomicUsize::new(0),
            inner: InMemoryStore::new("docs", DistanceMetric::Cosine),
        };
        let embedder = CharacterNgramEmbedder::default();
        let documents = vec![prose()];

        let result = CollectionWriter::new(&store, &embedder, WriterConfig::default())
            .replace(&documents, &chunks_for(&documents))
            .await;

        assert!(matches!(result, Err(SearchError::BackendResponse { .. })));
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn verification_samples_the_source_text() -> Result<(), SearchError> {
        let store = InMemoryStore::new("docs", DistanceMetric::Cosine);
        let embedder = CharacterNgramEmbedder::default();
        let documents = vec![prose()];
        let truncated = vec![Document::new(
            "guide.txt",
            "The pump must be primed before the first start of the season.\n\
             Check the seals for wear every two hundred operating hours.",
        )];
        let chunks = chunks_for(&truncated);

        let config = WriterConfig {
            verify: true,
            ..WriterConfig::default()
        };
        let summary = CollectionWriter::new(&store, &embedder, config)
            .replace(&documents, &chunks)
            .await?;

        let report = summary.verification.expect("verification requested");
        assert!(report.count_matches());
        assert_eq!(report.sampled_lines, 3);
        assert_eq!(
            report.missing_samples,
            vec![MissingSample {
                source: "guide.txt".to_string(),
                line: "Replace the filter cartridge whenever the pressure drop rises.".to_string(),
            }]
        );
        Ok(())
    }

    #[tokio::test]
    async fn json_sources_are_sampled_from_their_elements() -> Result<(), SearchError> {
        let store = InMemoryStore::new("docs", DistanceMetric::Cosine);
        let embedder = CharacterNgramEmbedder::default();
        let documents = vec![Document::new(
            "parts.json",
            r#"[{"note": "inspect the impeller blades for pitting"}, {"note": "replace the mechanical seal every two years"}]"#,
        )];

        let config = WriterConfig {
            verify: true,
            ..WriterConfig::default()
        };
        let summary = CollectionWriter::new(&store, &embedder, config)
            .replace(&documents, &chunks_for(&documents))
            .await?;

        let report = summary.verification.expect("verification requested");
        assert_eq!(report.sampled_lines, 2);
        assert!(report.is_clean());
        Ok(())
    }

    struct FailingGetStore {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl VectorStore for FailingGetStore {
        fn collection(&self) -> &str {
            self.inner.collection()
        }

        async fn delete_collection(&self) -> Result<(), SearchError> {
            self.inner.delete_collection().await
        }

        async fn create_collection(&self) -> Result<(), SearchError> {
            self.inner.create_collection().await
        }

        async fn add(&self, records: &[StoredRecord]) -> Result<(), SearchError> {
            self.inner.add(records).await
        }

        async fn get(&self, _filter: Option<&MetadataFilter>) -> Result<Vec<FetchedRecord>, SearchError> {
            Err(SearchError::Request("transient read failure".to_string()))
        }

        async fn query(
            &self,
            embedding: &[f32],
            n_results: usize,
            filter: Option<&MetadataFilter>,
        ) -> Result<Vec<QueryHit>, SearchError> {
            self.inner.query(embedding, n_results, filter).await
        }
    }

    #[tokio::test]
    async fn failed_verification_keeps_the_written_collection() -> Result<(), SearchError> {
        let store = FailingGetStore {
            inner: InMemoryStore::new("docs", DistanceMetric::Cosine),
        };
        let embedder = CharacterNgramEmbedder::default();
        let documents = vec![prose()];
        let chunks = chunks_for(&documents);

        let config = WriterConfig {
            verify: true,
            ..WriterConfig::default()
        };
        let summary = CollectionWriter::new(&store, &embedder, config)
            .replace(&documents, &chunks)
            .await?;

        assert_eq!(summary.chunks_written, chunks.len());
        assert!(summary.verification.is_none());
        assert_eq!(store.inner.len().await, chunks.len());
        Ok(())
    }

    #[tokio::test]
    async fn empty_chunk_set_is_rejected() {
        let store = InMemoryStore::new("docs", DistanceMetric::Cosine);
        let embedder = CharacterNgramEmbedder::default();
        let result = CollectionWriter::new(&store, &embedder, WriterConfig::default())
            .replace(&[], &[])
            .await;
        assert!(result.is_err());
    }
}
