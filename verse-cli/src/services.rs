//! Builds the embedding provider and vector store selected on the command
//! line, once, and hands them out as shared references.

use std::path::Path;
use std::sync::Arc;

use anyhow::bail;
use tracing::info;
use verse_rag::{
    Corpus, EmbeddingProvider, IndexBuilder, IndexerConfig, InMemoryVectorStore, MatchConfig,
    MatchEngine, VectorStore,
};

use crate::cli::{BackendArgs, EmbedderKind, StoreKind};

/// The collaborators every command works with.
#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
    pub store_kind: StoreKind,
    pub collection: String,
}

impl Services {
    /// Connect to the configured backends.
    ///
    /// Missing credentials or a backend compiled out of this binary fail here,
    /// before any work starts.
    pub fn from_args(args: &BackendArgs) -> anyhow::Result<Self> {
        let store = vector_store(args)?;
        let embedder = embedding_provider(args)?;
        info!(
            store = store.backend(),
            embedder = embedder.name(),
            dimensions = embedder.dimensions(),
            collection = %args.collection,
            "backends ready"
        );
        Ok(Self { embedder, store, store_kind: args.store, collection: args.collection.clone() })
    }

    pub fn index_builder(&self, config: IndexerConfig) -> IndexBuilder {
        IndexBuilder::new(self.embedder.clone(), self.store.clone(), &self.collection).with_config(config)
    }

    pub fn match_engine(&self, config: MatchConfig) -> MatchEngine {
        MatchEngine::new(self.embedder.clone(), self.store.clone(), &self.collection).with_config(config)
    }

    /// Read the corpus, if one was given. The in-memory backend starts empty,
    /// so for it the corpus is required and loaded straight away.
    pub async fn prepare(&self, corpus: Option<&Path>) -> anyhow::Result<Option<Corpus>> {
        let corpus = match corpus {
            Some(path) => Some(Corpus::from_json_file(path)?),
            None if self.store_kind == StoreKind::Memory => {
                bail!("the in-memory store starts empty; pass --corpus to load verses first")
            }
            None => None,
        };

        if let (StoreKind::Memory, Some(corpus)) = (self.store_kind, corpus.as_ref()) {
            let config = IndexerConfig::builder().batch_delay(std::time::Duration::ZERO).build()?;
            let report = self.index_builder(config).build(corpus).await?;
            if !report.complete {
                bail!(
                    "in-memory load incomplete: {} of {} verses stored",
                    report.final_count,
                    report.corpus_size
                );
            }
        }
        Ok(corpus)
    }
}

fn vector_store(args: &BackendArgs) -> anyhow::Result<Arc<dyn VectorStore>> {
    match args.store {
        StoreKind::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        StoreKind::Qdrant => qdrant_store(args),
        StoreKind::Pinecone => pinecone_store(args),
    }
}

#[cfg(feature = "qdrant")]
fn qdrant_store(args: &BackendArgs) -> anyhow::Result<Arc<dyn VectorStore>> {
    let store =
        verse_rag::qdrant::QdrantVectorStore::with_api_key(&args.qdrant_url, args.qdrant_api_key.clone())?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "qdrant"))]
fn qdrant_store(_args: &BackendArgs) -> anyhow::Result<Arc<dyn VectorStore>> {
    bail!("this binary was built without the `qdrant` feature")
}

#[cfg(feature = "pinecone")]
fn pinecone_store(args: &BackendArgs) -> anyhow::Result<Arc<dyn VectorStore>> {
    use anyhow::Context;
    use verse_rag::pinecone::{PineconeConfig, PineconeVectorStore};

    let api_key = args.pinecone_api_key.clone().context("PINECONE_API_KEY is required for --store pinecone")?;
    let mut config = PineconeConfig::new(api_key);
    config.cloud = args.pinecone_cloud.clone();
    config.region = args.pinecone_region.clone();
    Ok(Arc::new(PineconeVectorStore::new(config)?))
}

#[cfg(not(feature = "pinecone"))]
fn pinecone_store(_args: &BackendArgs) -> anyhow::Result<Arc<dyn VectorStore>> {
    bail!("this binary was built without the `pinecone` feature")
}

fn embedding_provider(args: &BackendArgs) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match args.embedder {
        EmbedderKind::Fastembed => fastembed_provider(args),
        EmbedderKind::Openai => openai_provider(args),
    }
}

#[cfg(feature = "fastembed")]
fn fastembed_provider(args: &BackendArgs) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    use anyhow::Context;

    let provider = verse_rag::fastembed::FastEmbedProvider::new(&args.model, args.model_cache.clone())
        .with_context(|| format!("loading embedding model {}", args.model))?;
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "fastembed"))]
fn fastembed_provider(_args: &BackendArgs) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    bail!("this binary was built without the `fastembed` feature")
}

#[cfg(feature = "openai")]
fn openai_provider(args: &BackendArgs) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    use anyhow::Context;

    let api_key = args.openai_api_key.clone().context("OPENAI_API_KEY is required for --embedder openai")?;
    let provider = verse_rag::openai::OpenAIEmbeddingProvider::new(api_key)?.with_dimensions(args.dimensions);
    Ok(Arc::new(provider))
}

#[cfg(not(feature = "openai"))]
fn openai_provider(_args: &BackendArgs) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    bail!("this binary was built without the `openai` feature")
}
