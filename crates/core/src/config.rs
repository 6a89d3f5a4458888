use serde::{Deserialize, Serialize};

pub const DEFAULT_STORE_URL: &str = "http://localhost:8000";
pub const DEFAULT_COLLECTION: &str = "documents";
pub const DEFAULT_EMBEDDING_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 512;
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 50;
pub const DEFAULT_MAX_DOCUMENT_SOURCES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    #[serde(rename = "ip")]
    InnerProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "ip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    pub collection: String,
    pub distance: DistanceMetric,
    pub construction_ef: u32,
    pub m: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORE_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            distance: DistanceMetric::Cosine,
            construction_ef: 100,
            m: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub url: String,
    pub model: String,
    pub batch_size: usize,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_EMBEDDING_URL.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    pub batch_size: usize,
    pub verify: bool,
    pub store_full_documents: bool,
    pub sample_lines: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_WRITE_BATCH_SIZE,
            verify: false,
            store_full_documents: false,
            sample_lines: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub overfetch_floor: usize,
    pub overfetch_multiplier: usize,
    pub retry_floor: usize,
    pub retry_multiplier: usize,
    pub max_document_sources: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            overfetch_floor: 25,
            overfetch_multiplier: 5,
            retry_floor: 10,
            retry_multiplier: 2,
            max_document_sources: DEFAULT_MAX_DOCUMENT_SOURCES,
        }
    }
}

impl RetrievalConfig {
    pub fn overfetch(&self, n_results: usize) -> usize {
        self.overfetch_floor
            .max(self.overfetch_multiplier.saturating_mul(n_results))
    }

    pub fn retry_overfetch(&self, n_results: usize) -> usize {
        self.retry_floor
            .max(self.retry_multiplier.saturating_mul(n_results))
    }

    pub fn source_limit(&self, n_results: usize) -> usize {
        self.max_document_sources.min(n_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overfetch_uses_floor_or_multiple() {
        let config = RetrievalConfig::default();
        assert_eq!(config.overfetch(1), 25);
        assert_eq!(config.overfetch(5), 25);
        assert_eq!(config.overfetch(8), 40);
        assert_eq!(config.retry_overfetch(3), 10);
        assert_eq!(config.retry_overfetch(7), 14);
    }

    #[test]
    fn source_limit_is_capped() {
        let config = RetrievalConfig::default();
        assert_eq!(config.source_limit(1), 1);
        assert_eq!(config.source_limit(5), 2);

        let wider = RetrievalConfig {
            max_document_sources: 4,
            ..RetrievalConfig::default()
        };
        assert_eq!(wider.source_limit(10), 4);
    }

    #[test]
    fn distance_names_match_hnsw_space() {
        assert_eq!(DistanceMetric::Cosine.as_str(), "cosine");
        assert_eq!(DistanceMetric::InnerProduct.as_str(), "ip");
    }
}
