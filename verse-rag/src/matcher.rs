//! Quote classification against an indexed corpus.
//!
//! The [`MatchEngine`] embeds a quote, looks up its single nearest verse and
//! applies an inclusive similarity threshold. It never touches the index
//! except to read from it, so one engine can serve any number of concurrent
//! checks.
//!
//! Infrastructure failures are returned as errors and never turned into a
//! non-match; whether the index is fully loaded is reported separately by
//! [`MatchEngine::readiness`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::MatchConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, VerseError};
use crate::vectorstore::VectorStore;
use crate::verse::{MatchResult, SearchHit};

/// Message for a quote that is empty after trimming.
pub const EMPTY_QUOTE_MESSAGE: &str = "empty quote provided";

/// Message for a query against an index with no entries.
pub const NO_VERSES_MESSAGE: &str = "no verses found in database";

/// How much of the corpus the index currently holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    /// Nothing stored yet.
    Empty,
    /// Some entries stored, but fewer than the completeness ratio requires.
    Partial,
    /// Enough entries stored to serve queries with full recall.
    Ready,
}

/// Index readiness, reported independently of any match verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Readiness {
    /// Overall state.
    pub state: IndexState,
    /// Entries currently stored.
    pub stored: usize,
    /// Entries expected for a full corpus.
    pub expected: usize,
}

impl Readiness {
    /// Whether queries can be served with full recall.
    pub fn is_ready(&self) -> bool {
        self.state == IndexState::Ready
    }
}

/// Classifies quotes as matches or non-matches of indexed verses.
pub struct MatchEngine {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    collection: String,
    config: MatchConfig,
}

impl MatchEngine {
    /// Create an engine with the default [`MatchConfig`].
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedding_provider,
            vector_store,
            collection: collection.into(),
            config: MatchConfig::default(),
        }
    }

    /// Replace the decision policy.
    pub fn with_config(mut self, config: MatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// The collection queried by this engine.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Check a quote, applying [`MatchConfig::query_timeout`] if one is set.
    ///
    /// A collection that was never created is treated as an empty index.
    ///
    /// # Errors
    ///
    /// - [`VerseError::Config`] if the configuration fails
    ///   [`MatchConfig::validate`]
    /// - [`VerseError::InvalidQuote`] if the quote is longer than
    ///   [`MatchConfig::max_quote_chars`]
    /// - [`VerseError::Embedding`] or [`VerseError::VectorStore`] if the
    ///   provider or index stays unreachable after retries
    /// - [`VerseError::Timeout`] if the configured deadline expires
    pub async fn check(&self, quote: &str) -> Result<MatchResult> {
        match self.config.query_timeout {
            Some(timeout) => self.check_with_timeout(quote, timeout).await,
            None => self.evaluate(quote).await,
        }
    }

    /// Check a quote under a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// As [`check`](MatchEngine::check); expiry of `timeout` yields
    /// [`VerseError::Timeout`].
    pub async fn check_with_timeout(&self, quote: &str, timeout: Duration) -> Result<MatchResult> {
        tokio::time::timeout(timeout, self.evaluate(quote))
            .await
            .map_err(|_| VerseError::Timeout { operation: "quote check".to_string(), after: timeout })?
    }

    /// Compare the stored entry count against the expected corpus size.
    ///
    /// # Errors
    ///
    /// Returns the vector store error if the index cannot be counted.
    pub async fn readiness(&self, expected: usize) -> Result<Readiness> {
        let stored = self.stored().await?;
        let state = if stored == 0 {
            IndexState::Empty
        } else if stored as f64 >= expected as f64 * self.config.completeness_ratio {
            IndexState::Ready
        } else {
            IndexState::Partial
        };
        Ok(Readiness { state, stored, expected })
    }

    /// Number of entries currently in the index; 0 if the collection does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the vector store error once retries are exhausted.
    pub async fn stored(&self) -> Result<usize> {
        self.config.validate()?;
        let store = &self.vector_store;
        let collection = self.collection.as_str();
        match self.config.retry.run("count", move || store.count(collection)).await {
            Err(VerseError::CollectionNotFound(_)) => {
                debug!(collection, "collection does not exist yet");
                Ok(0)
            }
            other => other,
        }
    }

    async fn evaluate(&self, quote: &str) -> Result<MatchResult> {
        self.config.validate()?;

        let quote = quote.trim();
        let chars = quote.chars().count();
        if chars > self.config.max_quote_chars {
            return Err(VerseError::InvalidQuote(format!(
                "quote is {chars} characters, the limit is {}",
                self.config.max_quote_chars
            )));
        }
        if quote.is_empty() {
            return Ok(self.verdict(None, EMPTY_QUOTE_MESSAGE.to_string()));
        }

        let provider = &self.embedding_provider;
        let embedding = self.config.retry.run("embed quote", move || provider.embed(quote)).await?;

        let store = &self.vector_store;
        let collection = self.collection.as_str();
        let embedding = embedding.as_slice();
        let hits = match self.config.retry.run("search", move || store.search(collection, embedding, 1)).await {
            Err(VerseError::CollectionNotFound(_)) => Vec::new(),
            other => other?,
        };

        let Some(best) = hits.into_iter().next() else {
            info!(collection, "no verses found in index");
            return Ok(self.verdict(None, NO_VERSES_MESSAGE.to_string()));
        };

        let score = clamp_score(best.score);
        let reference = best.payload.reference();
        let message = if score >= self.config.threshold {
            format!("Strong match found! This appears to be from {reference}.")
        } else if score >= self.config.near_miss_threshold {
            format!("Possible match from {reference}. Similarity: {score:.3}")
        } else {
            format!("Low similarity score ({score:.3}). Possibly not a Bible quote.")
        };

        let result = self.verdict(Some((&best, score)), message);
        debug!(reference = %result.reference, score = result.score, matched = result.matched, "quote checked");
        Ok(result)
    }

    /// The single place a [`MatchResult`] is assembled.
    fn verdict(&self, nearest: Option<(&SearchHit, f32)>, message: String) -> MatchResult {
        match nearest {
            Some((hit, score)) => MatchResult {
                matched: score >= self.config.threshold,
                score: round_to(score, self.config.score_precision),
                reference: hit.payload.reference(),
                text: hit.payload.text.clone(),
                message: Some(message),
            },
            None => MatchResult {
                matched: false,
                score: 0.0,
                reference: String::new(),
                text: String::new(),
                message: Some(message),
            },
        }
    }
}

/// Cosine similarity lives in `[-1, 1]`; reported scores live in `[0, 1]`.
fn clamp_score(score: f32) -> f32 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

fn round_to(score: f32, places: u32) -> f32 {
    let factor = 10f64.powi(places as i32);
    ((score as f64 * factor).round() / factor) as f32
}
