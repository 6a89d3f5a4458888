use crate::config::StoreConfig;
use crate::models::{FetchedRecord, Metadata, QueryHit, StoredRecord};
use crate::traits::{MetadataFilter, VectorStore};
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const GET_PAGE_SIZE: usize = 1_000;

pub struct ChromaStore {
    endpoint: String,
    config: StoreConfig,
    client: Client,
    collection_id: RwLock<Option<Uuid>>,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Map<String, Value>>>>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Map<String, Value>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f64>>>>,
}

impl ChromaStore {
    pub fn new(config: StoreConfig) -> Result<Self, SearchError> {
        let endpoint = url::Url::parse(&config.url)?
            .as_str()
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            endpoint,
            config,
            client: Client::new(),
            collection_id: RwLock::new(None),
        })
    }

    fn collections_url(&self) -> String {
        format!("{}/api/v1/collections", self.endpoint)
    }

    async fn check(&self, response: Response) -> Result<Response, SearchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND || body.contains("does not exist") {
            return Err(SearchError::CollectionNotFound(self.config.collection.clone()));
        }

        Err(SearchError::BackendResponse {
            backend: "chroma".to_string(),
            details: format!("{status}: {}", body.trim()),
        })
    }

    async fn collection_id(&self) -> Result<Uuid, SearchError> {
        if let Some(id) = *self.collection_id.read().await {
            return Ok(id);
        }

        let response = self
            .client
            .get(format!("{}/{}", self.collections_url(), self.config.collection))
            .send()
            .await?;
        let info: CollectionInfo = self.check(response).await?.json().await?;

        *self.collection_id.write().await = Some(info.id);
        Ok(info.id)
    }

    async fn get_page(
        &self,
        id: Uuid,
        filter: Option<&MetadataFilter>,
        offset: usize,
    ) -> Result<Vec<FetchedRecord>, SearchError> {
        let mut body = json!({
            "include": ["documents", "metadatas"],
            "limit": GET_PAGE_SIZE,
            "offset": offset,
        });
        if let Some(filter) = filter {
            body["where"] = filter.to_where();
        }

        let response = self
            .client
            .post(format!("{}/{id}/get", self.collections_url()))
            .json(&body)
            .send()
            .await?;
        let parsed: GetResponse = self.check(response).await?.json().await?;

        let documents = parsed.documents.unwrap_or_default();
        let metadatas = parsed.metadatas.unwrap_or_default();

        Ok(parsed
            .ids
            .into_iter()
            .enumerate()
            .map(|(index, id)| FetchedRecord {
                id,
                text: documents.get(index).cloned().flatten().unwrap_or_default(),
                metadata: metadatas.get(index).cloned().flatten().unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn collection(&self) -> &str {
        &self.config.collection
    }

    async fn delete_collection(&self) -> Result<(), SearchError> {
        *self.collection_id.write().await = None;

        let response = self
            .client
            .delete(format!("{}/{}", self.collections_url(), self.config.collection))
            .send()
            .await?;
        self.check(response).await?;

        debug!(collection = %self.config.collection, "deleted chroma collection");
        Ok(())
    }

    async fn create_collection(&self) -> Result<(), SearchError> {
        let response = self
            .client
            .post(self.collections_url())
            .json(&json!({
                "name": self.config.collection,
                "metadata": {
                    "hnsw:space": self.config.distance.as_str(),
                    "hnsw:construction_ef": self.config.construction_ef,
                    "hnsw:M": self.config.m,
                },
                "get_or_create": false,
            }))
            .send()
            .await?;
        let info: CollectionInfo = self.check(response).await?.json().await?;

        *self.collection_id.write().await = Some(info.id);
        debug!(collection = %self.config.collection, id = %info.id, "created chroma collection");
        Ok(())
    }

    async fn add(&self, records: &[StoredRecord]) -> Result<(), SearchError> {
        if records.is_empty() {
            return Ok(());
        }

        let id = self.collection_id().await?;
        let body = json!({
            "ids": records.iter().map(|record| record.id.as_str()).collect::<Vec<_>>(),
            "embeddings": records.iter().map(|record| &record.embedding).collect::<Vec<_>>(),
            "metadatas": records.iter().map(|record| &record.metadata).collect::<Vec<_>>(),
            "documents": records.iter().map(|record| record.text.as_str()).collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post(format!("{}/{id}/add", self.collections_url()))
            .json(&body)
            .send()
            .await?;
        self.check(response).await?;

        Ok(())
    }

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<FetchedRecord>, SearchError> {
        let id = self.collection_id().await?;
        let mut records = Vec::new();

        loop {
            let page = self.get_page(id, filter, records.len()).await?;
            let done = page.len() < GET_PAGE_SIZE;
            records.extend(page);
            if done {
                break;
            }
        }

        Ok(records)
    }

    async fn query(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, SearchError> {
        let id = self.collection_id().await?;
        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = filter {
            body["where"] = filter.to_where();
        }

        let response = self
            .client
            .post(format!("{}/{id}/query", self.collections_url()))
            .json(&body)
            .send()
            .await?;
        let parsed: QueryResponse = self.check(response).await?.json().await?;

        Ok(flatten_query(parsed))
    }
}

/// Chroma answers one row per query embedding; only the first is used.
fn flatten_query(parsed: QueryResponse) -> Vec<QueryHit> {
    let ids = parsed.ids.into_iter().next().unwrap_or_default();
    let documents = first_row(parsed.documents);
    let metadatas = first_row(parsed.metadatas);
    let distances = first_row(parsed.distances);

    ids.into_iter()
        .enumerate()
        .map(|(index, id)| QueryHit {
            id,
            text: documents.get(index).cloned().flatten().unwrap_or_default(),
            metadata: metadatas
                .get(index)
                .cloned()
                .flatten()
                .unwrap_or_else(Metadata::new),
            distance: distances.get(index).copied().flatten().unwrap_or(f64::MAX),
        })
        .collect()
}

fn first_row<T>(rows: Option<Vec<Vec<T>>>) -> Vec<T> {
    rows.and_then(|rows| rows.into_iter().next())
        .unwrap_or_default()
}
