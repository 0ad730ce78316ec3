//! In-memory vector store using exact cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a dependency-free vector
//! store backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is
//! suitable for development, tests, and serving a corpus small enough to be
//! embedded at startup.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, VerseError};
use crate::vectorstore::VectorStore;
use crate::verse::{IndexEntry, SearchHit};

const BACKEND: &str = "InMemory";

#[derive(Debug)]
struct Collection {
    dimensions: usize,
    entries: HashMap<String, IndexEntry>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// Collections are stored as collection name → entry id → entry, together
/// with the dimension fixed when the collection was created.
///
/// # Example
///
/// ```rust,ignore
/// use verse_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("bible", 384).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids stored in a collection, sorted. Handy for checking load results.
    pub async fn ids(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        let mut ids: Vec<String> = store.entries.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

fn missing(collection: &str) -> VerseError {
    VerseError::CollectionNotFound(collection.to_string())
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(|| Collection { dimensions, entries: HashMap::new() });
        if collection.dimensions != dimensions {
            return Err(VerseError::DimensionMismatch {
                collection: name.to_string(),
                expected: dimensions,
                actual: collection.dimensions,
            });
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, entries: &[IndexEntry]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != store.dimensions) {
            return Err(VerseError::DimensionMismatch {
                collection: collection.to_string(),
                expected: store.dimensions,
                actual: bad.vector.len(),
            });
        }
        for entry in entries {
            store.entries.insert(entry.id.clone(), entry.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut scored: Vec<SearchHit> = store
            .entries
            .values()
            .map(|entry| SearchHit {
                id: entry.id.clone(),
                score: cosine_similarity(&entry.vector, embedding),
                payload: entry.payload.clone(),
            })
            .collect();

        // Ties broken by id so repeated queries return identical results.
        scored.sort_by(|a, b| {
            b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.entries.len())
    }

    fn backend(&self) -> &str {
        BACKEND
    }
}
