pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod ranking;
pub mod reconstruct;
pub mod render;
pub mod retrieval;
pub mod stores;
pub mod traits;
pub mod writer;

pub use chunking::{
    json_elements, split_documents, ChunkProfile, ChunkingConfig, RecursiveSplitter,
};
pub use config::{DistanceMetric, EmbeddingConfig, RetrievalConfig, StoreConfig, WriterConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, SearchError};
pub use extractor::{extract_page_texts, PageText, PdfExtractor};
pub use ingest::{
    discover_files, load_directory_best_effort, load_documents, LoadReport, SkippedFile,
    SUPPORTED_EXTENSIONS,
};
pub use models::{
    Chunk, Document, DocumentResults, FetchedRecord, Metadata, QueryHit, Reconstruction,
    RetrievalMode, RetrievedChunk, RetrievedDocument, SimpleResults, SourceOutcome,
    SourceRanking, StoredRecord,
};
pub use ranking::rank_sources;
pub use reconstruct::reconstruct_text;
pub use render::{render_documents, render_json, render_simple};
pub use retrieval::Retriever;
pub use stores::{ChromaStore, InMemoryStore};
pub use traits::{MetadataFilter, VectorStore};
pub use writer::{CollectionWriter, IngestionSummary, VerificationReport};
