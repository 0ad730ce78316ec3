//! Shared fixtures: a deterministic embedder and stores that misbehave on demand.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use verse_rag::{
    Corpus, EmbeddingProvider, IndexEntry, InMemoryVectorStore, Result, SearchHit, VectorStore,
    Verse, VerseError,
};

pub const DIM: usize = 384;

pub const JOHN_3_16: &str = "For God so loved the world, that he gave his only begotten Son, \
that whosoever believeth in him should not perish, but have everlasting life.";

/// Bag-of-words embedder: each lowercased word adds 1 to a hashed bucket and
/// the result is L2-normalised. Same words, same vector.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self { dimensions: DIM }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            v[fnv1a(&word.to_lowercase()) as usize % self.dimensions] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| (hash ^ b as u64).wrapping_mul(0x100_0000_01b3))
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Counts calls and optionally fails or stalls.
pub struct ScriptedEmbedder {
    inner: HashingEmbedder,
    pub calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    poison: Option<String>,
    delay: Option<Duration>,
}

impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self {
            inner: HashingEmbedder::new(),
            calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            poison: None,
            delay: None,
        }
    }

    /// Fail every text containing `word`.
    pub fn poisoned(word: &str) -> Self {
        Self { poison: Some(word.to_string()), ..Self::new() }
    }

    /// Sleep before answering.
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::new() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.poison.as_deref().is_some_and(|p| text.contains(p)) {
            return Err(VerseError::Embedding {
                provider: "scripted".into(),
                message: "model rejected input".into(),
            });
        }
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

fn unavailable(operation: &str) -> VerseError {
    VerseError::VectorStore { backend: "faulty".into(), message: format!("{operation} unavailable") }
}

/// Wraps an [`InMemoryVectorStore`] and injects retryable failures.
pub struct FaultyStore {
    pub inner: Arc<InMemoryVectorStore>,
    fail_next_upserts: AtomicUsize,
    upsert_budget: Option<AtomicUsize>,
    fail_searches: AtomicBool,
    pub upserts: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryVectorStore>) -> Self {
        Self {
            inner,
            fail_next_upserts: AtomicUsize::new(0),
            upsert_budget: None,
            fail_searches: AtomicBool::new(false),
            upserts: AtomicUsize::new(0),
        }
    }

    /// The next `n` upserts fail, later ones succeed.
    pub fn failing_next_upserts(self, n: usize) -> Self {
        self.fail_next_upserts.store(n, Ordering::SeqCst);
        self
    }

    /// `n` upserts succeed, every one after that fails.
    pub fn with_upsert_budget(mut self, n: usize) -> Self {
        self.upsert_budget = Some(AtomicUsize::new(n));
        self
    }

    pub fn failing_searches(self) -> Self {
        self.fail_searches.store(true, Ordering::SeqCst);
        self
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for FaultyStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        self.inner.create_collection(name, dimensions).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }

    async fn upsert(&self, collection: &str, entries: &[IndexEntry]) -> Result<()> {
        let decrement = |n: usize| n.checked_sub(1);
        if self.fail_next_upserts.fetch_update(Ordering::SeqCst, Ordering::SeqCst, decrement).is_ok() {
            return Err(unavailable("upsert"));
        }
        if let Some(budget) = &self.upsert_budget {
            if budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, decrement).is_err() {
                return Err(unavailable("upsert"));
            }
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(collection, entries).await
    }

    async fn search(&self, collection: &str, embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(unavailable("search"));
        }
        self.inner.search(collection, embedding, top_k).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }

    fn backend(&self) -> &str {
        "faulty"
    }
}

/// Returns one fixed hit for every query, whatever the embedding.
pub struct FixedScoreStore {
    pub score: f32,
    pub verse: Verse,
}

impl FixedScoreStore {
    pub fn new(score: f32) -> Self {
        Self { score, verse: Verse::new("John", 3, 16, JOHN_3_16) }
    }
}

#[async_trait]
impl VectorStore for FixedScoreStore {
    async fn create_collection(&self, _name: &str, _dimensions: usize) -> Result<()> {
        Ok(())
    }

    async fn delete_collection(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _collection: &str, _entries: &[IndexEntry]) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _collection: &str, _embedding: &[f32], _top_k: usize) -> Result<Vec<SearchHit>> {
        Ok(vec![SearchHit { id: self.verse.entry_id(), score: self.score, payload: self.verse.clone() }])
    }

    async fn count(&self, _collection: &str) -> Result<usize> {
        Ok(1)
    }

    fn backend(&self) -> &str {
        "fixed"
    }
}

/// `n` distinct verses spread over a few books.
pub fn sample_corpus(n: usize) -> Corpus {
    let books = ["Genesis", "Psalms", "Isaiah", "Matthew", "John"];
    Corpus::from_verses((0..n).map(|i| {
        let book = books[i * books.len() / n.max(1)];
        let chapter = (i / 20 + 1) as u32;
        let verse = (i % 20 + 1) as u32;
        Verse::new(book, chapter, verse, format!("{book} chapter {chapter} verse {verse} word{i} token{}", i * 7))
    }))
    .expect("sample corpus is valid")
}

/// A handful of well-known verses, John 3:16 among them.
pub fn known_corpus() -> Corpus {
    Corpus::from_verses([
        Verse::new("Genesis", 1, 1, "In the beginning God created the heaven and the earth."),
        Verse::new("Psalms", 23, 1, "The LORD is my shepherd; I shall not want."),
        Verse::new("John", 3, 16, JOHN_3_16),
        Verse::new("John", 11, 35, "Jesus wept."),
        Verse::new(
            "Romans",
            8,
            28,
            "And we know that all things work together for good to them that love God, \
             to them who are the called according to his purpose.",
        ),
    ])
    .expect("known corpus is valid")
}
