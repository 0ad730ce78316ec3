//! Pinecone vector store backend.
//!
//! This module is only available when the `pinecone` feature is enabled.
//!
//! Talks to the Pinecone REST API with `reqwest`. Collections map to
//! serverless indexes. Index management goes through the control plane at
//! `api.pinecone.io`; vector operations go to the per-index host, which is
//! looked up once and cached.
//!
//! # Example
//!
//! ```rust,ignore
//! use verse_rag::pinecone::{PineconeConfig, PineconeVectorStore};
//!
//! let store = PineconeVectorStore::new(PineconeConfig::from_env()?)?;
//! store.create_collection("bible-verses", 384).await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, VerseError};
use crate::vectorstore::VectorStore;
use crate::verse::{IndexEntry, SearchHit, Verse};

const BACKEND: &str = "pinecone";
const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";

/// Connection settings for [`PineconeVectorStore`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PineconeConfig {
    /// API key sent in the `Api-Key` header.
    pub api_key: String,
    /// Cloud for newly created serverless indexes.
    pub cloud: String,
    /// Region for newly created serverless indexes.
    pub region: String,
    /// Control plane base URL.
    pub control_plane_url: String,
}

impl PineconeConfig {
    /// Settings for `api_key` with the `aws` / `us-east-1` defaults.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            control_plane_url: CONTROL_PLANE_URL.to_string(),
        }
    }

    /// Read `PINECONE_API_KEY`, plus optional `PINECONE_CLOUD` and
    /// `PINECONE_REGION`.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::Config`] if the API key is not set.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY").map_err(|_| {
            VerseError::Config("PINECONE_API_KEY environment variable not set".into())
        })?;
        let mut config = Self::new(api_key);
        if let Ok(cloud) = std::env::var("PINECONE_CLOUD") {
            config.cloud = cloud;
        }
        if let Ok(region) = std::env::var("PINECONE_REGION") {
            config.region = region;
        }
        Ok(config)
    }
}

/// A [`VectorStore`] backed by a Pinecone serverless index.
pub struct PineconeVectorStore {
    client: reqwest::Client,
    config: PineconeConfig,
    hosts: RwLock<HashMap<String, String>>,
    ready_poll: Duration,
    ready_attempts: u32,
}

// ── Pinecone API request/response types ────────────────────────────

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: IndexSpec<'a>,
}

#[derive(Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Deserialize)]
struct IndexDescription {
    dimension: usize,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Deserialize, Default)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<VectorRecord<'a>>,
}

#[derive(Serialize)]
struct VectorRecord<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a Verse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Option<HashMap<String, Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStats {
    #[serde(default)]
    total_vector_count: usize,
}

impl PineconeVectorStore {
    /// Create a store for the given account settings.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::Config`] if the key is empty or the HTTP client
    /// cannot be built.
    pub fn new(config: PineconeConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(VerseError::Config("Pinecone API key must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VerseError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            hosts: RwLock::new(HashMap::new()),
            ready_poll: Duration::from_secs(1),
            ready_attempts: 120,
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn index_url(&self, name: &str) -> String {
        format!("{}/indexes/{name}", self.config.control_plane_url)
    }

    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>> {
        let response = self
            .request(reqwest::Method::GET, &self.index_url(name))
            .send()
            .await
            .map_err(|e| VerseError::store(BACKEND, format!("request failed: {e}")))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let description = response
            .json()
            .await
            .map_err(|e| VerseError::store(BACKEND, format!("failed to parse index: {e}")))?;
        Ok(Some(description))
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        for _ in 0..self.ready_attempts {
            if let Some(description) = self.describe(name).await? {
                if description.status.ready && !description.host.is_empty() {
                    return Ok(description);
                }
            }
            tokio::time::sleep(self.ready_poll).await;
        }
        Err(VerseError::Timeout {
            operation: format!("waiting for pinecone index '{name}'"),
            after: self.ready_poll * self.ready_attempts,
        })
    }

    /// Data-plane base URL for an index, cached after the first lookup.
    async fn host(&self, name: &str) -> Result<String> {
        if let Some(host) = self.hosts.read().await.get(name) {
            return Ok(host.clone());
        }
        let description = self
            .describe(name)
            .await?
            .ok_or_else(|| VerseError::CollectionNotFound(name.to_string()))?;
        let host = if description.host.starts_with("http") {
            description.host
        } else {
            format!("https://{}", description.host)
        };
        self.hosts.write().await.insert(name.to_string(), host.clone());
        Ok(host)
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response> {
        let response = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await
            .map_err(|e| VerseError::store(BACKEND, format!("request failed: {e}")))?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("API returned {status}: {body}");
    Err(match status.as_u16() {
        401 | 403 => VerseError::Config(message),
        400 | 422 => VerseError::Validation(message),
        _ => VerseError::store(BACKEND, message),
    })
}

fn metadata_verse(metadata: &HashMap<String, Value>) -> Option<Verse> {
    let number = |key: &str| match metadata.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Some(Verse {
        book: metadata.get("book")?.as_str()?.to_string(),
        chapter: u32::try_from(number("chapter")?).ok()?,
        verse: u32::try_from(number("verse")?).ok()?,
        text: metadata.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
    })
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if let Some(existing) = self.describe(name).await? {
            if existing.dimension != dimensions {
                return Err(VerseError::DimensionMismatch {
                    collection: name.to_string(),
                    expected: dimensions,
                    actual: existing.dimension,
                });
            }
            debug!(collection = name, "pinecone index already exists, skipping creation");
            return Ok(());
        }

        info!(collection = name, dimensions, region = %self.config.region, "creating pinecone index");
        let request = CreateIndexRequest {
            name,
            dimension: dimensions,
            metric: "cosine",
            spec: IndexSpec {
                serverless: ServerlessSpec { cloud: &self.config.cloud, region: &self.config.region },
            },
        };
        let url = format!("{}/indexes", self.config.control_plane_url);
        self.post(&url, &request).await?;

        let ready = self.wait_until_ready(name).await?;
        debug!(collection = name, host = %ready.host, "pinecone index ready");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let response = self
            .request(reqwest::Method::DELETE, &self.index_url(name))
            .send()
            .await
            .map_err(|e| VerseError::store(BACKEND, format!("request failed: {e}")))?;
        self.hosts.write().await.remove(name);
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response).await?;
        debug!(collection = name, "deleted pinecone index");
        Ok(())
    }

    async fn upsert(&self, collection: &str, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let host = self.host(collection).await?;
        let request = UpsertRequest {
            vectors: entries
                .iter()
                .map(|e| VectorRecord { id: &e.id, values: &e.vector, metadata: &e.payload })
                .collect(),
        };
        self.post(&format!("{host}/vectors/upsert"), &request).await?;
        debug!(collection, count = entries.len(), "upserted verses to pinecone");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let host = self.host(collection).await?;
        let request = QueryRequest { vector: embedding, top_k, include_metadata: true };
        let response: QueryResponse = self
            .post(&format!("{host}/query"), &request)
            .await?
            .json()
            .await
            .map_err(|e| VerseError::store(BACKEND, format!("failed to parse query response: {e}")))?;

        Ok(response
            .matches
            .into_iter()
            .filter_map(|m| {
                let payload = m.metadata.as_ref().and_then(metadata_verse)?;
                Some(SearchHit { id: m.id, score: m.score, payload })
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let host = self.host(collection).await?;
        let stats: IndexStats = self
            .post(&format!("{host}/describe_index_stats"), &serde_json::json!({}))
            .await?
            .json()
            .await
            .map_err(|e| VerseError::store(BACKEND, format!("failed to parse index stats: {e}")))?;
        Ok(stats.total_vector_count)
    }

    fn backend(&self) -> &str {
        BACKEND
    }
}
