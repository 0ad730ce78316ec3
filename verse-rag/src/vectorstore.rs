//! Vector store trait for storing verse embeddings and finding nearest neighbours.

use async_trait::async_trait;

use crate::error::Result;
use crate::verse::{IndexEntry, SearchHit};

/// A storage backend for verse embeddings with cosine similarity search.
///
/// Entries are keyed by [`IndexEntry::id`]; upserting an existing id replaces
/// the stored vector and payload, which is what makes repeated loads safe.
///
/// `upsert`, `search` and `count` against a collection that was never created
/// return [`VerseError::CollectionNotFound`](crate::VerseError::CollectionNotFound)
/// rather than a transient backend error.
///
/// # Example
///
/// ```rust,ignore
/// use verse_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("bible", 384).await?;
/// store.upsert("bible", &entries).await?;
/// let hits = store.search("bible", &query_embedding, 1).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection with cosine distance. No-op if it already
    /// exists with the same dimension.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::DimensionMismatch`](crate::VerseError::DimensionMismatch)
    /// if the collection exists with a different dimension.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data. No-op if it does not exist.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Insert or replace entries by id.
    async fn upsert(&self, collection: &str, entries: &[IndexEntry]) -> Result<()>;

    /// Return the `top_k` entries closest to `embedding`, ordered by
    /// descending similarity score.
    async fn search(&self, collection: &str, embedding: &[f32], top_k: usize)
    -> Result<Vec<SearchHit>>;

    /// Number of entries currently stored in the collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// A short name used in logs and errors.
    fn backend(&self) -> &str;
}
