use crate::models::{
    FetchedRecord, Metadata, QueryHit, StoredRecord, FULL_DOCUMENT_KEY, SOURCE_KEY,
};
use crate::SearchError;
use async_trait::async_trait;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    Eq(String, Value),
    And(Vec<MetadataFilter>),
}

impl MetadataFilter {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        MetadataFilter::Eq(key.into(), value.into())
    }

    pub fn source(source: &str) -> Self {
        Self::eq(SOURCE_KEY, source)
    }

    pub fn full_document_of(source: &str) -> Self {
        MetadataFilter::And(vec![
            Self::source(source),
            Self::eq(FULL_DOCUMENT_KEY, true),
        ])
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            MetadataFilter::Eq(key, value) => metadata.get(key) == Some(value),
            MetadataFilter::And(filters) => filters.iter().all(|filter| filter.matches(metadata)),
        }
    }

    pub fn to_where(&self) -> Value {
        match self {
            MetadataFilter::Eq(key, value) => clause(key, "$eq", value),
            MetadataFilter::And(filters) => match filters.as_slice() {
                [] => json!({}),
                [single] => single.to_where(),
                many => json!({ "$and": many.iter().map(MetadataFilter::to_where).collect::<Vec<_>>() }),
            },
        }
    }
}

fn clause(key: &str, operator: &str, value: &Value) -> Value {
    let mut condition = serde_json::Map::new();
    condition.insert(operator.to_string(), value.clone());
    let mut outer = serde_json::Map::new();
    outer.insert(key.to_string(), Value::Object(condition));
    Value::Object(outer)
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn collection(&self) -> &str;

    /// Fails with [`SearchError::CollectionNotFound`] when there is nothing to delete.
    async fn delete_collection(&self) -> Result<(), SearchError>;

    async fn create_collection(&self) -> Result<(), SearchError>;

    async fn add(&self, records: &[StoredRecord]) -> Result<(), SearchError>;

    async fn get(&self, filter: Option<&MetadataFilter>) -> Result<Vec<FetchedRecord>, SearchError>;

    async fn query(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, SearchError>;
}
