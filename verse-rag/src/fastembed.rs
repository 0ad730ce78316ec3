//! Local embedding provider backed by `fastembed`.
//!
//! This module is only available when the `fastembed` feature is enabled.
//! The default model is all-MiniLM-L6-v2, which produces 384-dimensional
//! vectors and runs on the CPU without any API key.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ::fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, VerseError};

const PROVIDER: &str = "fastembed";

/// An [`EmbeddingProvider`] running a sentence-embedding model in-process.
///
/// fastembed's `embed` needs `&mut self`, so the model sits behind a mutex
/// and inference runs on tokio's blocking pool.
///
/// # Example
///
/// ```rust,ignore
/// use verse_rag::fastembed::FastEmbedProvider;
///
/// let provider = FastEmbedProvider::new("all-MiniLM-L6-v2", "./models".into())?;
/// assert_eq!(provider.dimensions(), 384);
/// ```
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimensions: usize,
}

impl FastEmbedProvider {
    /// Load (downloading on first use) the named model into `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::Config`] for an unknown model name or when the
    /// model cannot be initialised.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self> {
        let model_enum = parse_model_name(model_name)?;
        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            VerseError::Config(format!("cannot create model cache '{}': {e}", cache_dir.display()))
        })?;

        info!(model = model_name, cache_dir = %cache_dir.display(), "loading embedding model");
        let options =
            InitOptions::new(model_enum).with_cache_dir(cache_dir).with_show_download_progress(true);
        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| VerseError::Config(format!("cannot load model '{model_name}': {e}")))?;

        let dimensions = model
            .embed(vec!["probe"], None)
            .map_err(|e| VerseError::Config(format!("cannot probe model dimensions: {e}")))?
            .first()
            .map(Vec::len)
            .ok_or_else(|| VerseError::Config("model returned no embedding".to_string()))?;
        info!(model = model_name, dimensions, "embedding model ready");

        Ok(Self { model: Arc::new(Mutex::new(model)), model_name: model_name.to_string(), dimensions })
    }

    /// The configured model name.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|e| VerseError::embedding(PROVIDER, format!("model lock poisoned: {e}")))?;
            model.embed(texts, None).map_err(|e| VerseError::embedding(PROVIDER, e.to_string()))
        })
        .await
        .map_err(|e| VerseError::embedding(PROVIDER, format!("embedding task failed: {e}")))?
    }
}

fn parse_model_name(name: &str) -> Result<EmbeddingModel> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(EmbeddingModel::BGESmallENV15),
        _ => Err(VerseError::Config(format!(
            "unknown embedding model '{name}', supported: all-MiniLM-L6-v2, all-MiniLM-L6-v2-q, bge-small-en-v1.5"
        ))),
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.run(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VerseError::embedding(PROVIDER, "no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding batch");
        self.run(texts.iter().map(|t| t.to_string()).collect()).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
