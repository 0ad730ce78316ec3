//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Qdrant only accepts unsigned integers or UUIDs as point ids, so each
//! `"{book}_{chapter}_{verse}"` id is mapped to a name-based UUID (v5). The
//! mapping is deterministic, which keeps upserts idempotent, and the string
//! id travels in the payload.
//!
//! # Example
//!
//! ```rust,ignore
//! use verse_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! store.create_collection("bible-verses", 384).await?;
//! store.upsert("bible-verses", &entries).await?;
//! let hits = store.search("bible-verses", &query_embedding, 1).await?;
//! ```

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CountPointsBuilder, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, VerseError};
use crate::vectorstore::VectorStore;
use crate::verse::{IndexEntry, SearchHit, Verse};

const BACKEND: &str = "qdrant";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Collections use cosine distance. Verse fields are stored as payload so a
/// hit can be turned back into a reference without a second lookup.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_api_key(url, None)
    }

    /// Connect to a hosted cluster that requires an API key.
    pub fn with_api_key(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .build()
            .map_err(|e| VerseError::Config(format!("cannot connect to qdrant at {url}: {e}")))?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    /// The Qdrant point id for an entry id.
    pub fn point_id(entry_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, entry_id.as_bytes()).to_string()
    }

    fn map_err(e: qdrant_client::QdrantError) -> VerseError {
        VerseError::store(BACKEND, e.to_string())
    }

    /// Turn a failed call into `CollectionNotFound` when the collection is
    /// simply not there, so callers do not retry it.
    async fn classify(&self, collection: &str, e: qdrant_client::QdrantError) -> VerseError {
        match self.client.collection_exists(collection).await {
            Ok(false) => VerseError::CollectionNotFound(collection.to_string()),
            _ => Self::map_err(e),
        }
    }

    async fn existing_dimensions(&self, name: &str) -> Result<Option<usize>> {
        let info = self.client.collection_info(name).await.map_err(Self::map_err)?;
        let size = info
            .result
            .and_then(|r| r.config)
            .and_then(|c| c.params)
            .and_then(|p| p.vectors_config)
            .and_then(|v| v.config)
            .and_then(|kind| match kind {
                VectorsConfigKind::Params(params) => Some(params.size as usize),
                VectorsConfigKind::ParamsMap(_) => None,
            });
        Ok(size)
    }

    fn payload(entry: &IndexEntry) -> Result<Payload> {
        let verse = &entry.payload;
        let value = serde_json::json!({
            "entry_id": entry.id,
            "book": verse.book,
            "chapter": verse.chapter,
            "verse": verse.verse,
            "text": verse.text,
        });
        Payload::try_from(value).map_err(Self::map_err)
    }

    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn extract_u32(value: &QdrantValue) -> Option<u32> {
        match &value.kind {
            Some(Kind::IntegerValue(n)) => u32::try_from(*n).ok(),
            Some(Kind::DoubleValue(n)) if *n >= 0.0 => Some(*n as u32),
            _ => None,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.client.collection_exists(name).await.map_err(Self::map_err)? {
            match self.existing_dimensions(name).await? {
                Some(actual) if actual != dimensions => {
                    return Err(VerseError::DimensionMismatch {
                        collection: name.to_string(),
                        expected: dimensions,
                        actual,
                    });
                }
                Some(_) => {}
                None => warn!(collection = name, "qdrant collection uses named vectors"),
            }
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.client.collection_exists(name).await.map_err(Self::map_err)? {
            return Ok(());
        }
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let points = entries
            .iter()
            .map(|entry| {
                Ok(PointStruct::new(
                    Self::point_id(&entry.id),
                    entry.vector.clone(),
                    Self::payload(entry)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Err(e) =
            self.client.upsert_points(UpsertPointsBuilder::new(collection, points).wait(true)).await
        {
            return Err(self.classify(collection, e).await);
        }

        debug!(collection, count = entries.len(), "upserted verses to qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let response = match self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, embedding.to_vec(), top_k as u64)
                    .with_payload(true),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => return Err(self.classify(collection, e).await),
        };

        let hits = response
            .result
            .into_iter()
            .filter_map(|scored| {
                let field = |key: &str| scored.payload.get(key);
                let payload = Verse {
                    book: field("book").and_then(Self::extract_string)?,
                    chapter: field("chapter").and_then(Self::extract_u32)?,
                    verse: field("verse").and_then(Self::extract_u32)?,
                    text: field("text").and_then(Self::extract_string).unwrap_or_default(),
                };
                let id = field("entry_id")
                    .and_then(Self::extract_string)
                    .unwrap_or_else(|| payload.entry_id());
                Some(SearchHit { id, score: scored.score, payload })
            })
            .collect();

        Ok(hits)
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let response = match self.client.count(CountPointsBuilder::new(collection).exact(true)).await {
            Ok(response) => response,
            Err(e) => return Err(self.classify(collection, e).await),
        };
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    fn backend(&self) -> &str {
        BACKEND
    }
}
