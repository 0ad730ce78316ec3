//! Data types for verses, index entries, search hits and match verdicts.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerseError};

/// A single verse of the corpus.
///
/// The `(book, chapter, verse)` triple identifies the verse and is the source
/// of the stable [`IndexEntry`] id, so re-uploading a verse replaces its entry
/// instead of adding a second one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Verse {
    /// Book name, e.g. `"John"` or `"1 Corinthians"`.
    pub book: String,
    /// Chapter number, starting at 1.
    pub chapter: u32,
    /// Verse number within the chapter, starting at 1.
    pub verse: u32,
    /// The verse text.
    pub text: String,
}

impl Verse {
    /// Create a new verse. Use [`validate`](Verse::validate) before indexing it.
    pub fn new(book: impl Into<String>, chapter: u32, verse: u32, text: impl Into<String>) -> Self {
        Self { book: book.into(), chapter, verse, text: text.into() }
    }

    /// Check that all four fields are populated.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.book.trim().is_empty() {
            return Err(VerseError::Validation("book must not be empty".to_string()));
        }
        if self.chapter == 0 {
            return Err(VerseError::Validation(format!(
                "{}: chapter must be a positive integer",
                self.book
            )));
        }
        if self.verse == 0 {
            return Err(VerseError::Validation(format!(
                "{} {}: verse must be a positive integer",
                self.book, self.chapter
            )));
        }
        if self.text.trim().is_empty() {
            return Err(VerseError::Validation(format!("{}: text must not be empty", self.reference())));
        }
        Ok(())
    }

    /// The stable index-entry id, `"{book}_{chapter}_{verse}"`.
    pub fn entry_id(&self) -> String {
        format!("{}_{}_{}", self.book, self.chapter, self.verse)
    }

    /// The human-readable reference, `"{book} {chapter}:{verse}"`.
    pub fn reference(&self) -> String {
        format!("{} {}:{}", self.book, self.chapter, self.verse)
    }

    /// The identity key used for de-duplication.
    pub fn key(&self) -> (&str, u32, u32) {
        (self.book.as_str(), self.chapter, self.verse)
    }
}

/// The unit stored in a [`VectorStore`](crate::VectorStore).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// Stable id derived from the verse key.
    pub id: String,
    /// The embedding of the verse text.
    pub vector: Vec<f32>,
    /// The originating verse, used to rebuild the reference at query time.
    pub payload: Verse,
}

impl IndexEntry {
    /// Build the entry for `verse` with an already computed embedding.
    pub fn new(verse: Verse, vector: Vec<f32>) -> Self {
        Self { id: verse.entry_id(), vector, payload: verse }
    }
}

/// A stored entry returned by a nearest-neighbour query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// The entry id.
    pub id: String,
    /// Cosine similarity to the query vector (higher is closer).
    pub score: f32,
    /// The verse stored with the entry.
    pub payload: Verse,
}

/// The verdict for a single quote.
///
/// `reference` and `text` are filled from the nearest verse even when the
/// quote is not a match, since a near miss is still useful to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    /// Whether the nearest verse scored at or above the threshold.
    pub matched: bool,
    /// Cosine similarity clamped to `[0, 1]` and rounded for display.
    pub score: f32,
    /// `"{book} {chapter}:{verse}"`, empty when nothing was compared.
    pub reference: String,
    /// The nearest verse's text, empty when nothing was compared.
    pub text: String,
    /// Human-readable explanation of the verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
