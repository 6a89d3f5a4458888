use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Metadata = serde_json::Map<String, Value>;

pub const SOURCE_KEY: &str = "source";
pub const FILE_PATH_KEY: &str = "filePath";
pub const CHUNK_ID_KEY: &str = "chunk_id";
pub const TOTAL_CHUNKS_KEY: &str = "total_chunks";
pub const FULL_DOCUMENT_KEY: &str = "is_full_document";
pub const PAGE_KEY: &str = "page";

pub const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    pub file_path: Option<String>,
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        let source = source.into();
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), Value::String(source.clone()));
        Self {
            source,
            file_path: None,
            content: content.into(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub source: String,
    pub chunk_id: usize,
    pub total_chunks: usize,
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn record_id(&self) -> String {
        record_id(Some(&self.source), self.chunk_id)
    }

    pub fn record_metadata(&self) -> Metadata {
        let mut metadata = self.metadata.clone();
        metadata.insert(SOURCE_KEY.to_string(), Value::String(self.source.clone()));
        metadata.insert(CHUNK_ID_KEY.to_string(), Value::from(self.chunk_id as u64));
        metadata.insert(
            TOTAL_CHUNKS_KEY.to_string(),
            Value::from(self.total_chunks as u64),
        );
        metadata.insert(FULL_DOCUMENT_KEY.to_string(), Value::Bool(false));
        metadata
    }
}

pub fn record_id(source: Option<&str>, index: usize) -> String {
    match source.filter(|source| !source.is_empty()) {
        Some(source) => format!("{source}_chunk_{index}"),
        None => format!("chunk_{index}"),
    }
}

pub fn full_document_id(source: &str) -> String {
    format!("{source}_full")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedRecord {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
}

impl FetchedRecord {
    pub fn source(&self) -> &str {
        metadata_source(&self.metadata)
    }

    pub fn is_full_document(&self) -> bool {
        metadata_is_full_document(&self.metadata)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub distance: f64,
}

impl QueryHit {
    pub fn source(&self) -> &str {
        metadata_source(&self.metadata)
    }

    pub fn relevance(&self) -> f64 {
        relevance(self.distance)
    }

    pub fn is_full_document(&self) -> bool {
        metadata_is_full_document(&self.metadata)
    }
}

/// Relevance is exactly one minus distance; distances above 1 go negative.
pub fn relevance(distance: f64) -> f64 {
    1.0 - distance
}

pub fn metadata_source(metadata: &Metadata) -> &str {
    metadata
        .get(SOURCE_KEY)
        .and_then(Value::as_str)
        .filter(|source| !source.is_empty())
        .unwrap_or(UNKNOWN_SOURCE)
}

pub fn metadata_is_full_document(metadata: &Metadata) -> bool {
    metadata
        .get(FULL_DOCUMENT_KEY)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub fn metadata_chunk_id(metadata: &Metadata) -> Option<u64> {
    match metadata.get(CHUNK_ID_KEY)? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|value| *value >= 0.0).map(|value| value as u64)),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRanking {
    pub source: String,
    pub min_distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Simple,
    Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    pub distance: f64,
    pub relevance_score: f64,
}

impl From<QueryHit> for RetrievedChunk {
    fn from(hit: QueryHit) -> Self {
        let relevance_score = hit.relevance();
        Self {
            id: hit.id,
            text: hit.text,
            metadata: hit.metadata,
            distance: hit.distance,
            relevance_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Reconstruction {
    FullDocument,
    Chunks { count: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub source: String,
    pub content: String,
    pub relevance_score: f64,
    pub reconstruction: Reconstruction,
}

/// Per-source result of document-mode retrieval; one failing source never
/// hides the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SourceOutcome {
    Retrieved(RetrievedDocument),
    Failed {
        source: String,
        relevance_score: f64,
        reason: String,
    },
}

impl SourceOutcome {
    pub fn source(&self) -> &str {
        match self {
            SourceOutcome::Retrieved(document) => &document.source,
            SourceOutcome::Failed { source, .. } => source,
        }
    }

    pub fn document(&self) -> Option<&RetrievedDocument> {
        match self {
            SourceOutcome::Retrieved(document) => Some(document),
            SourceOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleResults {
    pub query: String,
    pub chunks: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResults {
    pub query: String,
    pub outcomes: Vec<SourceOutcome>,
}

impl DocumentResults {
    pub fn documents(&self) -> impl Iterator<Item = &RetrievedDocument> {
        self.outcomes.iter().filter_map(SourceOutcome::document)
    }
}
