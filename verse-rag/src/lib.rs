//! # verse-rag
//!
//! Semantic verse matching: decide whether a short quote comes from a known
//! corpus of verses, and if so which one.
//!
//! Two halves share a pair of collaborator traits:
//!
//! - [`IndexBuilder`] turns a [`Corpus`] into a searchable collection, one
//!   entry per verse keyed by `"{book}_{chapter}_{verse}"`. Loads are
//!   resumable and idempotent, tolerate failed batches, and may run
//!   concurrently with each other.
//! - [`MatchEngine`] embeds a quote, fetches the nearest verse and applies an
//!   inclusive similarity threshold, returning a [`MatchResult`].
//!
//! Both depend only on an [`EmbeddingProvider`] and a [`VectorStore`], handed
//! in at construction.
//!
//! ## Backends
//!
//! | Feature     | Type                           | Notes                          |
//! |-------------|--------------------------------|--------------------------------|
//! | (always)    | [`InMemoryVectorStore`]        | exact cosine search            |
//! | `qdrant`    | `qdrant::QdrantVectorStore`    | gRPC, local or hosted Qdrant   |
//! | `pinecone`  | `pinecone::PineconeVectorStore`| serverless Pinecone over REST  |
//! | `fastembed` | `fastembed::FastEmbedProvider` | local all-MiniLM-L6-v2, D=384  |
//! | `openai`    | `openai::OpenAIEmbeddingProvider` | OpenAI embeddings API       |
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use verse_rag::{Corpus, IndexBuilder, InMemoryVectorStore, MatchEngine};
//!
//! let store = Arc::new(InMemoryVectorStore::new());
//! let corpus = Corpus::from_json_file("data/bible.json")?;
//! IndexBuilder::new(embedder.clone(), store.clone(), "bible-verses").build(&corpus).await?;
//!
//! let engine = MatchEngine::new(embedder, store, "bible-verses");
//! let result = engine.check("For God so loved the world").await?;
//! println!("{} ({})", result.reference, result.score);
//! ```

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod inmemory;
pub mod matcher;
pub mod retry;
pub mod vectorstore;
pub mod verse;

#[cfg(feature = "fastembed")]
pub mod fastembed;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pinecone")]
pub mod pinecone;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use config::{DEFAULT_COLLECTION, IndexerConfig, IndexerConfigBuilder, MatchConfig, MatchConfigBuilder};
pub use corpus::Corpus;
pub use embedding::EmbeddingProvider;
pub use error::{Result, VerseError};
pub use indexer::{BuildReport, IndexBuilder};
pub use inmemory::InMemoryVectorStore;
pub use matcher::{EMPTY_QUOTE_MESSAGE, IndexState, MatchEngine, NO_VERSES_MESSAGE, Readiness};
pub use retry::RetryPolicy;
pub use vectorstore::VectorStore;
pub use verse::{IndexEntry, MatchResult, SearchHit, Verse};
