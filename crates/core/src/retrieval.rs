use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::models::{
    relevance, DocumentResults, QueryHit, Reconstruction, RetrievedChunk, RetrievedDocument,
    SimpleResults, SourceOutcome, SourceRanking,
};
use crate::ranking::rank_sources;
use crate::reconstruct::reconstruct_text;
use crate::traits::{MetadataFilter, VectorStore};
use crate::SearchError;
use futures::future::join_all;
use tracing::{debug, info, warn};

pub struct Retriever<S, E>
where
    S: VectorStore,
    E: Embedder,
{
    store: S,
    embedder: E,
    config: RetrievalConfig,
}

impl<S, E> Retriever<S, E>
where
    S: VectorStore,
    E: Embedder,
{
    pub fn new(store: S, embedder: E, config: RetrievalConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn simple(&self, query: &str, n_results: usize) -> Result<SimpleResults, SearchError> {
        validate(query, n_results)?;

        let embedding = self.embedder.embed_one(query).await?;
        let mut requested = n_results;
        loop {
            let hits = self.store.query(&embedding, requested, None).await?;
            let returned = hits.len();
            let mut chunks = only_chunks(hits);
            let flagged = returned - chunks.len();

            // Full-document records took some of the slots; ask again with
            // room for them unless the collection ran out.
            if chunks.len() >= n_results || returned < requested {
                chunks.truncate(n_results);
                return Ok(SimpleResults {
                    query: query.to_string(),
                    chunks: chunks.into_iter().map(RetrievedChunk::from).collect(),
                });
            }
            requested = n_results + flagged;
            debug!(requested, "widening simple query past full-document records");
        }
    }

    pub async fn documents(
        &self,
        query: &str,
        n_results: usize,
    ) -> Result<DocumentResults, SearchError> {
        validate(query, n_results)?;

        let embedding = self.embedder.embed_one(query).await?;
        let hits = self.overfetch(&embedding, n_results).await?;
        let rankings = rank_sources(&hits, self.config.source_limit(n_results));

        info!(
            hits = hits.len(),
            sources = rankings.len(),
            "ranked sources for document retrieval"
        );

        let outcomes = join_all(rankings.into_iter().map(|ranking| self.resolve(ranking))).await;

        Ok(DocumentResults {
            query: query.to_string(),
            outcomes,
        })
    }

    async fn overfetch(
        &self,
        embedding: &[f32],
        n_results: usize,
    ) -> Result<Vec<QueryHit>, SearchError> {
        let wanted = self.config.overfetch(n_results);

        let hits = match self.store.query(embedding, wanted, None).await {
            Ok(hits) => hits,
            Err(error) => {
                let retry = self.config.retry_overfetch(n_results);
                warn!(wanted, retry, error = %error, "over-fetch failed, retrying with fewer results");
                self.store.query(embedding, retry, None).await?
            }
        };
        Ok(only_chunks(hits))
    }

    async fn resolve(&self, ranking: SourceRanking) -> SourceOutcome {
        let relevance_score = relevance(ranking.min_distance);

        match self.load_document(&ranking.source).await {
            Ok((content, reconstruction)) => SourceOutcome::Retrieved(RetrievedDocument {
                source: ranking.source,
                content,
                relevance_score,
                reconstruction,
            }),
            Err(error) => {
                warn!(source = %ranking.source, error = %error, "could not retrieve document");
                SourceOutcome::Failed {
                    source: ranking.source,
                    relevance_score,
                    reason: error.to_string(),
                }
            }
        }
    }

    async fn load_document(&self, source: &str) -> Result<(String, Reconstruction), SearchError> {
        match self
            .store
            .get(Some(&MetadataFilter::full_document_of(source)))
            .await
        {
            Ok(records) => {
                if let Some(record) = records.into_iter().next() {
                    debug!(source, "using stored full document");
                    return Ok((record.text, Reconstruction::FullDocument));
                }
            }
            Err(error) => {
                debug!(source, error = %error, "full document lookup failed, rebuilding from chunks")
            }
        }

        let chunks = self
            .store
            .get(Some(&MetadataFilter::source(source)))
            .await?
            .into_iter()
            .filter(|record| !record.is_full_document())
            .collect::<Vec<_>>();
        if chunks.is_empty() {
            return Err(SearchError::Request(format!(
                "no stored chunks for source {source}"
            )));
        }

        let (content, count) = reconstruct_text(source, &chunks);
        Ok((content, Reconstruction::Chunks { count }))
    }
}

fn only_chunks(hits: Vec<QueryHit>) -> Vec<QueryHit> {
    hits.into_iter().filter(|hit| !hit.is_full_document()).collect()
}

fn validate(query: &str, n_results: usize) -> Result<(), SearchError> {
    if query.trim().is_empty() {
        return Err(SearchError::Request("query is empty".to_string()));
    }
    if n_results == 0 {
        return Err(SearchError::Request(
            "number of results must be at least 1".to_string(),
        ));
    }
    Ok(())
}
