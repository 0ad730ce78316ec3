//! Embedding provider trait for turning verse and quote text into vectors.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that maps text to a fixed-length vector.
///
/// Implementations must be deterministic for a given model version: the same
/// text always yields the same vector. Every vector returned has exactly
/// [`dimensions`](EmbeddingProvider::dimensions) components.
///
/// # Example
///
/// ```rust,ignore
/// use verse_rag::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("For God so loved the world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A short name used in logs and errors.
    fn name(&self) -> &str {
        "embedding"
    }
}
