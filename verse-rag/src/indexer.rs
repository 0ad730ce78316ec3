//! Resumable bulk loading of a verse corpus into a vector index.
//!
//! The [`IndexBuilder`] embeds verses in fixed-size batches and upserts each
//! batch by its stable ids. Progress is never persisted: every run asks the
//! index how many entries it already holds, backs off a little from that
//! point and carries on. Because upserts are keyed by verse id, re-processing
//! a batch (after a crash, from a concurrent run, or from the resume buffer)
//! rewrites the same entries rather than adding new ones.
//!
//! # Example
//!
//! ```rust,ignore
//! use verse_rag::{Corpus, IndexBuilder, IndexerConfig, InMemoryVectorStore};
//!
//! let corpus = Corpus::from_json_file("data/bible.json")?;
//! let builder = IndexBuilder::new(embedder, Arc::new(InMemoryVectorStore::new()), "bible-verses")
//!     .with_config(IndexerConfig::default());
//! let report = builder.build(&corpus).await?;
//! assert!(report.complete);
//! ```

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::IndexerConfig;
use crate::corpus::Corpus;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, VerseError};
use crate::retry::RetryPolicy;
use crate::vectorstore::VectorStore;
use crate::verse::{IndexEntry, Verse};

/// Summary of a single [`IndexBuilder::build`] run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildReport {
    /// Number of verses in the corpus.
    pub corpus_size: usize,
    /// Entries already stored when the run started.
    pub initial_count: usize,
    /// Corpus position the run resumed from.
    pub resume_offset: usize,
    /// Verses the run tried to load.
    pub attempted: usize,
    /// Entries written by successful upserts, including re-written ones.
    pub upserted: usize,
    /// Verses dropped because their embedding could not be produced.
    pub skipped: usize,
    /// Batch numbers that still failed after the final retry pass.
    pub failed_batches: Vec<usize>,
    /// Entries stored when the run finished.
    pub final_count: usize,
    /// The index already held the whole corpus; nothing was done.
    pub already_complete: bool,
    /// The final count reached the configured share of the corpus.
    pub complete: bool,
}

/// A contiguous run of corpus verses loaded with one upsert.
#[derive(Debug, Clone, Copy)]
struct Batch<'a> {
    /// 1-based batch number, stable across runs for the same batch size.
    number: usize,
    /// Corpus position of the first verse.
    start: usize,
    verses: &'a [Verse],
}

#[derive(Debug)]
struct BatchOutcome {
    number: usize,
    end: usize,
    book: String,
    upserted: usize,
    skipped: usize,
    failed: bool,
}

/// Loads a [`Corpus`] into a [`VectorStore`] collection.
///
/// The builder holds no mutable state, so it is safe to run two builds of the
/// same corpus at once; they merely repeat each other's upserts.
pub struct IndexBuilder {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    collection: String,
    config: IndexerConfig,
}

impl IndexBuilder {
    /// Create a builder with the default [`IndexerConfig`].
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedding_provider,
            vector_store,
            collection: collection.into(),
            config: IndexerConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    /// Return a reference to the builder configuration.
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// The collection this builder loads.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Drop the collection and everything in it, so the next build starts
    /// from an empty index.
    ///
    /// # Errors
    ///
    /// Returns the vector store error once retries are exhausted.
    pub async fn reset(&self) -> Result<()> {
        let store = &self.vector_store;
        let collection = self.collection.as_str();
        self.config.retry.run("delete collection", move || store.delete_collection(collection)).await?;
        warn!(collection, "deleted collection");
        Ok(())
    }

    /// Load `corpus`, resuming from whatever the collection already holds.
    ///
    /// Batch failures are tolerated and reported in [`BuildReport`]; check
    /// [`BuildReport::complete`] to decide whether the load succeeded.
    ///
    /// # Errors
    ///
    /// Fails only when the run cannot proceed at all:
    /// - the configuration fails [`IndexerConfig::validate`]
    ///   ([`VerseError::Config`])
    /// - the collection cannot be created or counted ([`VerseError::VectorStore`]
    ///   after retries)
    /// - the collection or provider disagree on the vector dimension
    ///   ([`VerseError::DimensionMismatch`])
    /// - any other configuration error surfaced by a backend
    pub async fn build(&self, corpus: &Corpus) -> Result<BuildReport> {
        self.config.validate()?;
        let dimensions = self.embedding_provider.dimensions();
        let store = &self.vector_store;
        let collection = self.collection.as_str();
        let retry = &self.config.retry;

        retry
            .run("create collection", move || store.create_collection(collection, dimensions))
            .await
            .inspect_err(|e| error!(collection, error = %e, "cannot open collection"))?;

        let initial_count = self.count().await?;
        let corpus_size = corpus.len();
        let mut report = BuildReport { corpus_size, initial_count, ..BuildReport::default() };

        if initial_count >= corpus_size {
            info!(collection, stored = initial_count, corpus_size, "index already complete");
            report.already_complete = true;
            report.resume_offset = corpus_size;
            report.final_count = initial_count;
            report.complete = true;
            return Ok(report);
        }

        let resume_offset = self.config.resume_offset(initial_count);
        let batches = self.batches(corpus, resume_offset);
        report.resume_offset = resume_offset;
        report.attempted = corpus_size - resume_offset;
        info!(
            collection,
            stored = initial_count,
            corpus_size,
            resume_offset,
            batches = batches.len(),
            batch_size = self.config.batch_size,
            "starting index build"
        );

        let last_batch = batches.last().map(|b| b.number);
        let outcomes: Vec<BatchOutcome> = futures::stream::iter(batches.iter().copied())
            .map(|batch| async move {
                let outcome = self.process_batch(batch, retry).await?;
                if !outcome.failed {
                    info!(
                        batch = outcome.number,
                        stored = outcome.upserted,
                        percent = (outcome.end as f64 / corpus_size as f64 * 1000.0).round() / 10.0,
                        book = %outcome.book,
                        "batch stored"
                    );
                }
                if Some(batch.number) != last_batch && !self.config.batch_delay.is_zero() {
                    tokio::time::sleep(self.config.batch_delay).await;
                }
                Ok::<_, VerseError>(outcome)
            })
            .buffered(self.config.max_in_flight)
            .try_collect()
            .await?;

        let mut failed = Vec::new();
        for outcome in outcomes {
            report.upserted += outcome.upserted;
            report.skipped += outcome.skipped;
            if outcome.failed {
                failed.push((outcome.number, outcome.skipped));
            }
        }

        if !failed.is_empty() && self.config.retry_failed_batches {
            warn!(count = failed.len(), "retrying failed batches");
            let final_retry = retry.clone().with_max_attempts(self.config.failed_batch_attempts);
            let mut still_failed = Vec::new();
            for (number, skipped_before) in failed {
                let Some(batch) = batches.iter().find(|b| b.number == number) else { continue };
                let outcome = self.process_batch(*batch, &final_retry).await?;
                report.upserted += outcome.upserted;
                report.skipped = report.skipped - skipped_before + outcome.skipped;
                if outcome.failed {
                    still_failed.push((outcome.number, outcome.skipped));
                }
            }
            failed = still_failed;
        }

        report.failed_batches = failed.into_iter().map(|(number, _)| number).collect();
        report.final_count = self.count().await?;
        report.complete = self.config.is_complete(report.final_count, corpus_size);

        if report.complete {
            info!(
                collection,
                final_count = report.final_count,
                corpus_size,
                upserted = report.upserted,
                "index build complete"
            );
        } else {
            warn!(
                collection,
                final_count = report.final_count,
                corpus_size,
                failed_batches = report.failed_batches.len(),
                skipped = report.skipped,
                "index build incomplete, re-run to fill the gaps"
            );
        }
        Ok(report)
    }

    /// Number of entries currently stored, retried like any index call.
    ///
    /// # Errors
    ///
    /// Returns the vector store error once retries are exhausted.
    pub async fn count(&self) -> Result<usize> {
        let store = &self.vector_store;
        let collection = self.collection.as_str();
        self.config.retry.run("count", move || store.count(collection)).await
    }

    fn batches<'a>(&self, corpus: &'a Corpus, offset: usize) -> Vec<Batch<'a>> {
        let size = self.config.batch_size;
        corpus.verses()[offset..]
            .chunks(size)
            .enumerate()
            .map(|(i, verses)| {
                let start = offset + i * size;
                Batch { number: start / size + 1, start, verses }
            })
            .collect()
    }

    /// Embed and upsert one batch.
    ///
    /// The whole batch is embedded with one request. If that keeps failing,
    /// each verse is embedded on its own so a single bad verse is skipped
    /// instead of the batch. A batch whose upsert keeps failing is marked
    /// failed. Only configuration errors, which would fail every batch the
    /// same way, abort the build.
    async fn process_batch(&self, batch: Batch<'_>, retry: &RetryPolicy) -> Result<BatchOutcome> {
        let (entries, skipped) = match self.embed_batch(batch, retry).await? {
            Some(entries) => (entries, 0),
            None => self.embed_each(batch, retry).await?,
        };

        let mut outcome = BatchOutcome {
            number: batch.number,
            end: batch.start + batch.verses.len(),
            book: batch.verses.first().map(|v| v.book.clone()).unwrap_or_default(),
            upserted: 0,
            skipped,
            failed: false,
        };

        if entries.is_empty() {
            warn!(batch = batch.number, "no valid entries in batch");
            return Ok(outcome);
        }

        let store = &self.vector_store;
        let collection = self.collection.as_str();
        let entries = &entries;
        let label = format!("upsert batch {}", batch.number);
        match retry.run(&label, move || store.upsert(collection, entries)).await {
            Ok(()) => outcome.upserted = entries.len(),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                error!(
                    batch = batch.number,
                    attempts = retry.max_attempts,
                    error = %e,
                    "batch upsert failed"
                );
                outcome.failed = true;
            }
        }
        Ok(outcome)
    }

    /// One request for the whole batch. `None` means fall back to per-verse
    /// embedding.
    async fn embed_batch(&self, batch: Batch<'_>, retry: &RetryPolicy) -> Result<Option<Vec<IndexEntry>>> {
        let provider = &self.embedding_provider;
        let texts: Vec<&str> = batch.verses.iter().map(|v| v.text.as_str()).collect();
        let texts = texts.as_slice();
        let label = format!("embed batch {}", batch.number);
        let vectors = match retry.run(&label, move || provider.embed_batch(texts)).await {
            Ok(vectors) if vectors.len() == batch.verses.len() => vectors,
            Ok(vectors) => {
                warn!(
                    batch = batch.number,
                    expected = batch.verses.len(),
                    returned = vectors.len(),
                    "provider returned the wrong number of embeddings"
                );
                return Ok(None);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(batch = batch.number, error = %e, "batch embedding failed, embedding verses one by one");
                return Ok(None);
            }
        };

        batch
            .verses
            .iter()
            .zip(vectors)
            .map(|(verse, vector)| {
                self.check_dimensions(&vector)?;
                Ok(IndexEntry::new(verse.clone(), vector))
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// Embed verse by verse, skipping any verse whose embedding keeps failing.
    async fn embed_each(&self, batch: Batch<'_>, retry: &RetryPolicy) -> Result<(Vec<IndexEntry>, usize)> {
        let mut entries = Vec::with_capacity(batch.verses.len());
        let mut skipped = 0;

        for (offset, verse) in batch.verses.iter().enumerate() {
            let provider = &self.embedding_provider;
            let text = verse.text.as_str();
            match retry.run("embed", move || provider.embed(text)).await {
                Ok(vector) => {
                    self.check_dimensions(&vector)?;
                    entries.push(IndexEntry::new(verse.clone(), vector));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(
                        batch = batch.number,
                        position = batch.start + offset,
                        reference = %verse.reference(),
                        error = %e,
                        "skipping verse, embedding failed"
                    );
                    skipped += 1;
                }
            }
        }
        Ok((entries, skipped))
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        let expected = self.embedding_provider.dimensions();
        if vector.len() != expected {
            return Err(VerseError::DimensionMismatch {
                collection: self.collection.clone(),
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}
