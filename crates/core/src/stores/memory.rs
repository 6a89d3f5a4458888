use crate::config::DistanceMetric;
use crate::models::{FetchedRecord, QueryHit, StoredRecord};
use crate::traits::{MetadataFilter, VectorStore};
use crate::SearchError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Collection {
    order: Vec<String>,
    records: HashMap<String, StoredRecord>,
}

#[derive(Debug)]
pub struct InMemoryStore {
    name: String,
    distance: DistanceMetric,
    collection: RwLock<Option<Collection>>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>, distance: DistanceMetric) -> Self {
        Self {
            name: name.into(),
            distance,
            collection: RwLock::new(None),
        }
    }

    pub async fn len(&self) -> usize {
        self.collection
            .read()
            .await
            .as_ref()
            .map(|collection| collection.order.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn not_found(&self) -> SearchError {
        SearchError::CollectionNotFound(self.name.clone())
    }
}

pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    match metric {
        DistanceMetric::Cosine => {
            let norm_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
            let norm_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                return 1.0;
            }
            1.0 - dot / (norm_a * norm_b)
        }
        DistanceMetric::L2 => a
            .iter()
            .zip(b)
            .map(|(x, y)| (f64::from(*x) - f64::from(*y)).powi(2))
            .sum(),
        DistanceMetric::InnerProduct => 1.0 - dot,
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn collection(&self) -> &str {
        &self.name
    }

    async fn delete_collection(&self) -> Result<(), SearchError> {
        let mut guard = self.collection.write().await;
        if guard.take().is_none() {
            return Err(self.not_found());
        }
        Ok(())
    }

    async fn create_collection(&self) -> Result<(), SearchError> {
        let mut guard = self.collection.write().await;
        if guard.is_some() {
            return Err(SearchError::Request(format!(
                "collection {} already exists",
                self.name
            )));
        }
        *guard = Some(Collection::default());
        Ok(())
    }

    async fn add(&self, records: &[StoredRecord]) -> Result<(), SearchError> {
        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().ok_or_else(|| self.not_found())?;

        for record in records {
            if collection
                .records
                .insert(record.id.clone(), record.clone())
                .is_none()
            {
                collection.order.push(record.id.clone());
            }
        }
        Ok(())
    }

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<FetchedRecord>, SearchError> {
        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or_else(|| self.not_found())?;

        Ok(collection
            .order
            .iter()
            .filter_map(|id| collection.records.get(id))
            .filter(|record| filter.map_or(true, |filter| filter.matches(&record.metadata)))
            .map(|record| FetchedRecord {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
            })
            .collect())
    }

    async fn query(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, SearchError> {
        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or_else(|| self.not_found())?;

        let mut hits = collection
            .order
            .iter()
            .filter_map(|id| collection.records.get(id))
            .filter(|record| filter.map_or(true, |filter| filter.matches(&record.metadata)))
            .map(|record| QueryHit {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance: distance(self.distance, embedding, &record.embedding),
            })
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| left.distance.total_cmp(&right.distance));
        hits.truncate(n_results);
        Ok(hits)
    }
}
