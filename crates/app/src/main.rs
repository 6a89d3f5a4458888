use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use docrecall_core::config::{
    DEFAULT_COLLECTION, DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_EMBEDDING_URL, DEFAULT_MAX_DOCUMENT_SOURCES, DEFAULT_STORE_URL,
};
use docrecall_core::{
    load_directory_best_effort, load_documents, render_documents, render_json, render_simple,
    split_documents, CharacterNgramEmbedder, ChromaStore, ChunkProfile, ChunkingConfig,
    CollectionWriter, DistanceMetric, Embedder, EmbeddingConfig, HttpEmbedder, InMemoryStore,
    IngestionSummary, RecursiveSplitter, RetrievalConfig, RetrievalMode, Retriever, StoreConfig,
    VectorStore, WriterConfig,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docrecall", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Vector store backend
    #[arg(long, global = true, value_enum, env = "DOCRECALL_STORE", default_value_t = StoreKind::Chroma)]
    store: StoreKind,

    /// Chroma base URL
    #[arg(long, global = true, env = "CHROMA_URL", default_value = DEFAULT_STORE_URL)]
    chroma_url: String,

    /// Collection holding the chunks
    #[arg(long, global = true, env = "COLLECTION_NAME", default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Distance function used when the collection is created
    #[arg(long, global = true, value_enum, default_value_t = Distance::Cosine)]
    distance: Distance,

    /// Embedding backend
    #[arg(long, global = true, value_enum, env = "DOCRECALL_EMBEDDER", default_value_t = EmbedderKind::Http)]
    embedder: EmbedderKind,

    /// Base URL of an OpenAI-compatible embeddings API
    #[arg(long, global = true, env = "EMBEDDING_URL", default_value = DEFAULT_EMBEDDING_URL)]
    embedding_url: String,

    #[arg(long, global = true, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Texts sent per embeddings request
    #[arg(long, global = true, default_value_t = DEFAULT_EMBEDDING_BATCH_SIZE)]
    embedding_batch_size: usize,

    #[arg(long, global = true, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Upper bound on documents returned in document mode
    #[arg(long, global = true, env = "MAX_DOCUMENT_SOURCES", default_value_t = DEFAULT_MAX_DOCUMENT_SOURCES)]
    max_document_sources: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the collection with chunks of a file or directory.
    Ingest {
        /// JSON, text, markdown or PDF file, or a directory of them.
        path: PathBuf,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        chunk_overlap: Option<usize>,
        /// Re-read the collection and spot-check stored content.
        #[arg(long, default_value_t = false)]
        verify: bool,
        /// Also store each source's complete text as its own record.
        #[arg(long, default_value_t = false)]
        store_full_documents: bool,
    },
    /// Retrieve relevant chunks or whole documents.
    Query {
        text: String,
        #[arg(long = "n-results", alias = "nResults", default_value_t = 5)]
        n_results: usize,
        #[arg(long, value_enum, default_value_t = Mode::Document)]
        mode: Mode,
        /// Print results as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Ingest this path first; needed with the in-memory store.
        #[arg(long)]
        from: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    Chroma,
    Memory,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    Http,
    Ngram,
}

#[derive(Clone, Copy, ValueEnum)]
enum Distance {
    Cosine,
    L2,
    Ip,
}

impl From<Distance> for DistanceMetric {
    fn from(distance: Distance) -> Self {
        match distance {
            Distance::Cosine => DistanceMetric::Cosine,
            Distance::L2 => DistanceMetric::L2,
            Distance::Ip => DistanceMetric::InnerProduct,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Simple,
    Document,
}

impl From<Mode> for RetrievalMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Simple => RetrievalMode::Simple,
            Mode::Document => RetrievalMode::Document,
        }
    }
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            url: self.chroma_url.clone(),
            collection: self.collection.clone(),
            distance: self.distance.into(),
            ..StoreConfig::default()
        }
    }

    fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            url: self.embedding_url.clone(),
            model: self.embedding_model.clone(),
            batch_size: self.embedding_batch_size,
            api_key: self.embedding_api_key.clone(),
        }
    }

    fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            max_document_sources: self.max_document_sources,
            ..RetrievalConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return if error.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "docrecall boot"
    );

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.store {
        StoreKind::Chroma => {
            let store = ChromaStore::new(cli.store_config()).context("invalid chroma settings")?;
            with_store(&cli, store).await
        }
        StoreKind::Memory => {
            let store = InMemoryStore::new(cli.collection.clone(), cli.distance.into());
            with_store(&cli, store).await
        }
    }
}

async fn with_store<S: VectorStore>(cli: &Cli, store: S) -> anyhow::Result<()> {
    match cli.embedder {
        EmbedderKind::Http => {
            let embedder =
                HttpEmbedder::new(cli.embedding_config()).context("invalid embedding settings")?;
            execute(cli, store, embedder).await
        }
        EmbedderKind::Ngram => execute(cli, store, CharacterNgramEmbedder::default()).await,
    }
}

async fn execute<S, E>(cli: &Cli, store: S, embedder: E) -> anyhow::Result<()>
where
    S: VectorStore,
    E: Embedder,
{
    match &cli.command {
        Command::Ingest {
            path,
            chunk_size,
            chunk_overlap,
            verify,
            store_full_documents,
        } => {
            let writer_config = WriterConfig {
                verify: *verify,
                store_full_documents: *store_full_documents,
                ..WriterConfig::default()
            };
            let chunking = chunking_for(path, *chunk_size, *chunk_overlap);
            let summary = ingest(&store, &embedder, path, chunking, writer_config).await?;
            print_summary(&summary, *verify);
        }
        Command::Query {
            text,
            n_results,
            mode,
            json,
            from,
        } => {
            if let Some(path) = from {
                let chunking = chunking_for(path, None, None);
                ingest(&store, &embedder, path, chunking, WriterConfig::default()).await?;
            }

            let retriever = Retriever::new(store, embedder, cli.retrieval_config());
            let output = match RetrievalMode::from(*mode) {
                RetrievalMode::Simple => {
                    let results = retriever
                        .simple(text, *n_results)
                        .await
                        .context("simple query failed")?;
                    if *json {
                        render_json(&results)?
                    } else {
                        render_simple(&results)
                    }
                }
                RetrievalMode::Document => {
                    let results = retriever
                        .documents(text, *n_results)
                        .await
                        .context("document query failed")?;
                    if *json {
                        render_json(&results)?
                    } else {
                        render_documents(&results)
                    }
                }
            };
            print!("{output}");
        }
    }

    Ok(())
}

/// A single file gets the larger `single` profile, a directory the `bulk` one.
fn chunking_for(
    path: &Path,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
) -> ChunkingConfig {
    let profile = if path.is_dir() {
        ChunkProfile::Bulk
    } else {
        ChunkProfile::Single
    };
    let base = ChunkingConfig::from(profile);
    ChunkingConfig {
        chunk_size: chunk_size.unwrap_or(base.chunk_size),
        chunk_overlap: chunk_overlap.unwrap_or(base.chunk_overlap),
    }
}

async fn ingest<S, E>(
    store: &S,
    embedder: &E,
    path: &Path,
    chunking: ChunkingConfig,
    writer_config: WriterConfig,
) -> anyhow::Result<IngestionSummary>
where
    S: VectorStore,
    E: Embedder,
{
    if !path.exists() {
        bail!("path does not exist: {}", path.display());
    }

    let documents = if path.is_dir() {
        let report = load_directory_best_effort(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        if !report.skipped_files.is_empty() {
            warn!(
                skipped = report.skipped_files.len(),
                folder = %path.display(),
                "some files were skipped"
            );
        }
        report.documents
    } else {
        load_documents(path).with_context(|| format!("failed to load {}", path.display()))?
    };

    let splitter = RecursiveSplitter::new(chunking)?;
    let chunks = split_documents(&documents, &splitter)?;
    if chunks.is_empty() {
        bail!("no chunks produced from {}", path.display());
    }

    info!(
        path = %path.display(),
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = chunking.chunk_size,
        chunk_overlap = chunking.chunk_overlap,
        "ingesting chunks"
    );

    CollectionWriter::new(store, embedder, writer_config)
        .replace(&documents, &chunks)
        .await
        .with_context(|| format!("failed to write collection {}", store.collection()))
}

fn print_summary(summary: &IngestionSummary, verify_requested: bool) {
    println!(
        "{} chunks ingested into {} in {} batches at {}",
        summary.chunks_written,
        summary.collection,
        summary.batches,
        Utc::now().to_rfc3339()
    );
    if summary.full_documents_written > 0 {
        println!("{} full documents stored", summary.full_documents_written);
    }
    match &summary.verification {
        Some(report) => println!(
            "verification: {} of {} chunks stored, {} of {} sampled lines found",
            report.stored_chunks,
            report.expected_chunks,
            report
                .sampled_lines
                .saturating_sub(report.missing_samples.len()),
            report.sampled_lines
        ),
        None if verify_requested => println!("verification skipped, see log for the read error"),
        None => {}
    }
}
