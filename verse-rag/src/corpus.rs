//! Loading and validating the verse corpus.
//!
//! The corpus source is a JSON array of `{book, chapter, verse, text}`
//! objects. Malformed records are skipped individually; only a source that is
//! missing, unparseable or has no usable verse at all is an error.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Result, VerseError};
use crate::verse::Verse;

/// A validated, de-duplicated, ordered verse collection.
///
/// Order is preserved from the source; it matters for resumable loads, which
/// use positions in this sequence as their progress marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    verses: Vec<Verse>,
    rejected: usize,
    duplicates: usize,
}

/// Field-tolerant shape of a source record, so one bad record does not fail
/// the whole parse.
#[derive(Deserialize)]
struct RawVerse {
    book: Option<String>,
    chapter: Option<Value>,
    verse: Option<Value>,
    text: Option<String>,
}

impl RawVerse {
    fn into_verse(self) -> Result<Verse> {
        let book = self.book.ok_or_else(|| VerseError::Validation("missing book".into()))?;
        let chapter = positive_number(self.chapter.as_ref(), "chapter")?;
        let verse = positive_number(self.verse.as_ref(), "verse")?;
        let text = self.text.ok_or_else(|| VerseError::Validation("missing text".into()))?;
        Ok(Verse::new(book, chapter, verse, text))
    }
}

/// Accept `3` as well as `"3"`; some published datasets quote their numbers.
fn positive_number(value: Option<&Value>, field: &str) -> Result<u32> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
        None => return Err(VerseError::Validation(format!("missing {field}"))),
    };
    parsed
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| VerseError::Validation(format!("{field} must be a positive integer")))
}

impl Corpus {
    /// Build a corpus from already parsed verses.
    ///
    /// Invalid verses are skipped and counted. When two verses share a
    /// `(book, chapter, verse)` key the first one wins.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::Corpus`] if no valid verse remains.
    pub fn from_verses(verses: impl IntoIterator<Item = Verse>) -> Result<Self> {
        Self::collect(verses.into_iter().map(Ok))
    }

    /// Parse a JSON array of verse objects.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::Corpus`] if the input is not a JSON array or
    /// contains no valid verse.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: Vec<Value> = serde_json::from_str(json)
            .map_err(|e| VerseError::Corpus(format!("corpus is not a JSON array of verses: {e}")))?;

        let parsed = records.into_iter().enumerate().map(|(index, record)| {
            serde_json::from_value::<RawVerse>(record)
                .map_err(|e| VerseError::Validation(format!("record {index}: {e}")))
                .and_then(|raw| {
                    raw.into_verse().map_err(|e| VerseError::Validation(format!("record {index}: {e}")))
                })
        });
        Self::collect(parsed)
    }

    /// Read and parse a JSON corpus file.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::Corpus`] if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            VerseError::Corpus(format!("cannot read corpus file '{}': {e}", path.display()))
        })?;
        let corpus = Self::from_json_str(&json)?;
        info!(
            path = %path.display(),
            verses = corpus.len(),
            rejected = corpus.rejected,
            duplicates = corpus.duplicates,
            "loaded corpus"
        );
        Ok(corpus)
    }

    fn collect(records: impl Iterator<Item = Result<Verse>>) -> Result<Self> {
        let mut rejected = 0;
        let mut seen: HashSet<(String, u32, u32)> = HashSet::new();
        let mut verses = Vec::new();
        let mut duplicates = 0;

        for record in records {
            let verse = match record.and_then(|v| v.validate().map(|()| v)) {
                Ok(verse) => verse,
                Err(e) => {
                    warn!(error = %e, "skipping invalid verse record");
                    rejected += 1;
                    continue;
                }
            };
            if !seen.insert((verse.book.clone(), verse.chapter, verse.verse)) {
                warn!(reference = %verse.reference(), "skipping duplicate verse");
                duplicates += 1;
                continue;
            }
            verses.push(verse);
        }

        if verses.is_empty() {
            return Err(VerseError::Corpus(format!(
                "corpus contains no valid verses ({rejected} rejected)"
            )));
        }
        Ok(Self { verses, rejected, duplicates })
    }

    /// The verses in source order.
    pub fn verses(&self) -> &[Verse] {
        &self.verses
    }

    /// Number of valid, unique verses.
    pub fn len(&self) -> usize {
        self.verses.len()
    }

    /// Always `false`; an empty corpus cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    /// Number of source records skipped as invalid.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Number of source records skipped as duplicate keys.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}
