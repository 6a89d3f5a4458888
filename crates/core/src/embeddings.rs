use crate::config::EmbeddingConfig;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SearchError>;

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    /// Lowercased character trigrams hashed into `dimensions` buckets, then
    /// scaled to unit length. Texts under three characters count as one gram.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let width = self.dimensions.max(1);
        let chars = text.chars().flat_map(char::to_lowercase).collect::<Vec<_>>();

        let mut vector = vec![0f32; width];
        for gram in chars.windows(chars.len().clamp(1, 3)) {
            vector[gram_bucket(gram, width)] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

fn gram_bucket(gram: &[char], width: usize) -> usize {
    let mut hash = FNV_OFFSET;
    let mut utf8 = [0u8; 4];
    for ch in gram {
        for byte in ch.encode_utf8(&mut utf8).bytes() {
            hash = (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME);
        }
    }
    (hash % width as u64) as usize
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|value| *value /= norm);
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(self.embed(text))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

pub struct HttpEmbedder {
    client: Client,
    config: EmbeddingConfig,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(config: EmbeddingConfig) -> Result<Self, SearchError> {
        if config.batch_size == 0 {
            return Err(SearchError::Request(
                "embedding batch size must be positive".to_string(),
            ));
        }
        url::Url::parse(&config.url)?;

        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    fn provider(&self) -> String {
        format!("http:{}", self.config.model)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let endpoint = format!("{}/embeddings", self.config.url.trim_end_matches('/'));
        let mut request = self.client.post(&endpoint).json(&EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        });

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Embedding {
                provider: self.provider(),
                details: format!("{status}: {}", body.trim()),
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        order_embeddings(payload.data, texts.len()).map_err(|details| SearchError::Embedding {
            provider: self.provider(),
            details,
        })
    }
}

fn order_embeddings(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>, String> {
    if data.len() != expected {
        return Err(format!(
            "expected {expected} embeddings, received {}",
            data.len()
        ));
    }

    data.sort_by_key(|item| item.index.unwrap_or(usize::MAX));
    let vectors = data.into_iter().map(|item| item.embedding).collect::<Vec<_>>();

    if let Some(first) = vectors.first() {
        let width = first.len();
        if let Some(odd) = vectors.iter().find(|vector| vector.len() != width) {
            return Err(format!(
                "inconsistent embedding dimensions: {width} vs {}",
                odd.len()
            ));
        }
    }

    Ok(vectors)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        let input = [text.to_string()];
        self.embed_batch(&input)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Embedding {
                provider: self.provider(),
                details: "empty response".to_string(),
            })
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            debug!(size = batch.len(), model = %self.config.model, "embedding batch");
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}
