//! Command-line argument definitions.
//!
//! Every connection setting can come from a flag or an environment variable;
//! flags win.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use verse_rag::DEFAULT_COLLECTION;

/// Load a verse corpus into a vector index and check quotes against it.
#[derive(Parser, Debug)]
#[command(name = "verse-check", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true, env = "VERSE_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Which vector index holds the verses.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Process-local index; contents are lost on exit.
    Memory,
    /// Qdrant over gRPC.
    Qdrant,
    /// Pinecone serverless.
    Pinecone,
}

/// Which model turns text into vectors.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedderKind {
    /// Local sentence-transformer via fastembed.
    Fastembed,
    /// OpenAI embeddings API.
    Openai,
}

/// Backend selection and credentials.
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Vector index backend.
    #[arg(long, value_enum, default_value_t = StoreKind::Memory, env = "VERSE_STORE", global = true)]
    pub store: StoreKind,

    /// Embedding provider.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Fastembed, env = "VERSE_EMBEDDER", global = true)]
    pub embedder: EmbedderKind,

    /// Collection (index) name.
    #[arg(long, default_value = DEFAULT_COLLECTION, env = "VERSE_COLLECTION", global = true)]
    pub collection: String,

    /// fastembed model name.
    #[arg(long, default_value = "all-MiniLM-L6-v2", env = "VERSE_MODEL", global = true)]
    pub model: String,

    /// Where fastembed keeps downloaded models.
    #[arg(long, default_value = ".fastembed_cache", env = "VERSE_MODEL_CACHE", global = true)]
    pub model_cache: PathBuf,

    /// Output dimensions requested from the OpenAI API.
    #[arg(long, default_value_t = 384, env = "VERSE_DIMENSIONS", global = true)]
    pub dimensions: usize,

    #[arg(long, default_value = "http://localhost:6334", env = "QDRANT_URL", global = true)]
    pub qdrant_url: String,

    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true, global = true)]
    pub qdrant_api_key: Option<String>,

    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true, global = true)]
    pub pinecone_api_key: Option<String>,

    #[arg(long, default_value = "aws", env = "PINECONE_CLOUD", global = true)]
    pub pinecone_cloud: String,

    #[arg(long, default_value = "us-east-1", env = "PINECONE_REGION", global = true)]
    pub pinecone_region: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed a corpus file and store it in the index, resuming a partial load.
    Load {
        /// JSON array of {book, chapter, verse, text} records.
        #[arg(long, env = "VERSE_CORPUS")]
        corpus: PathBuf,

        /// Delete the collection first and load from scratch.
        #[arg(long)]
        reset: bool,

        /// Verses per upsert.
        #[arg(long, default_value_t = 50)]
        batch_size: usize,

        /// Batches in flight at once.
        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// Pause between batches, in milliseconds.
        #[arg(long, default_value_t = 500)]
        batch_delay_ms: u64,
    },

    /// Check whether a quote comes from the corpus.
    Check {
        quote: String,

        /// Give up after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Corpus to load first; required by the in-memory backend.
        #[arg(long, env = "VERSE_CORPUS")]
        corpus: Option<PathBuf>,
    },

    /// Report how much of the corpus the index holds.
    Status {
        /// Corpus used as the expected size.
        #[arg(long, env = "VERSE_CORPUS")]
        corpus: Option<PathBuf>,
    },

    /// Serve quote checks over HTTP.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000", env = "VERSE_BIND_ADDR")]
        bind: SocketAddr,

        /// Corpus to load before listening (in-memory backend) or to size
        /// readiness against.
        #[arg(long, env = "VERSE_CORPUS")]
        corpus: Option<PathBuf>,

        /// Per-request deadline, in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
}
