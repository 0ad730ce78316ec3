//! Configuration for the index builder and the match engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerseError};
use crate::retry::RetryPolicy;

/// Default collection (index) name.
pub const DEFAULT_COLLECTION: &str = "bible-verses";

/// Tuning parameters for [`IndexBuilder`](crate::IndexBuilder).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexerConfig {
    /// Number of verses embedded and upserted per request.
    pub batch_size: usize,
    /// Retry policy for each batch upsert and each verse embedding.
    pub retry: RetryPolicy,
    /// Retry batches that failed in the main pass once more before finishing.
    pub retry_failed_batches: bool,
    /// Attempt ceiling used by the final retry pass.
    pub failed_batch_attempts: u32,
    /// Pause between batches to stay under the index's rate limits.
    pub batch_delay: Duration,
    /// Fraction of already stored entries to re-process when resuming.
    pub resume_buffer_ratio: f64,
    /// Upper bound on the number of entries re-processed when resuming.
    pub resume_buffer_cap: usize,
    /// Minimum share of the corpus that must be stored for a load to succeed.
    pub completeness_ratio: f64,
    /// Batches allowed in flight at once. 1 processes batches sequentially.
    pub max_in_flight: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry: RetryPolicy::default(),
            retry_failed_batches: true,
            failed_batch_attempts: 3,
            batch_delay: Duration::from_millis(500),
            resume_buffer_ratio: 0.10,
            resume_buffer_cap: 100,
            completeness_ratio: 0.95,
            max_in_flight: 1,
        }
    }
}

impl IndexerConfig {
    /// Create a new builder for constructing an [`IndexerConfig`].
    pub fn builder() -> IndexerConfigBuilder {
        IndexerConfigBuilder::default()
    }

    /// How far back from `stored` a resumed load starts.
    ///
    /// `max(0, stored - buffer)` where the buffer is `resume_buffer_ratio` of
    /// `stored`, capped at `resume_buffer_cap`.
    pub fn resume_offset(&self, stored: usize) -> usize {
        let buffer = ((stored as f64 * self.resume_buffer_ratio) as usize).min(self.resume_buffer_cap);
        stored.saturating_sub(buffer)
    }

    /// Check that the parameters are consistent.
    ///
    /// Called by the builder and again by
    /// [`IndexBuilder::build`](crate::IndexBuilder::build), so a config
    /// assembled as a struct literal is held to the same rules.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::Config`] if:
    /// - `batch_size == 0` or `max_in_flight == 0`
    /// - `resume_buffer_ratio` is outside `[0, 0.1]`
    /// - `completeness_ratio` is outside `(0, 1]`
    /// - `failed_batch_attempts == 0`
    /// - the retry policy is invalid
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(VerseError::Config("batch_size must be greater than zero".to_string()));
        }
        if self.max_in_flight == 0 {
            return Err(VerseError::Config("max_in_flight must be greater than zero".to_string()));
        }
        if !(0.0..=0.1).contains(&self.resume_buffer_ratio) {
            return Err(VerseError::Config(format!(
                "resume_buffer_ratio ({}) must be within [0, 0.1]",
                self.resume_buffer_ratio
            )));
        }
        if !(self.completeness_ratio > 0.0 && self.completeness_ratio <= 1.0) {
            return Err(VerseError::Config(format!(
                "completeness_ratio ({}) must be within (0, 1]",
                self.completeness_ratio
            )));
        }
        if self.failed_batch_attempts == 0 {
            return Err(VerseError::Config("failed_batch_attempts must be at least 1".to_string()));
        }
        self.retry.validate()
    }

    /// Whether `stored` entries are enough to call a corpus of `total` loaded.
    pub fn is_complete(&self, stored: usize, total: usize) -> bool {
        stored as f64 >= total as f64 * self.completeness_ratio
    }
}

/// Builder for constructing a validated [`IndexerConfig`].
#[derive(Debug, Clone, Default)]
pub struct IndexerConfigBuilder {
    config: IndexerConfig,
}

impl IndexerConfigBuilder {
    /// Set the number of verses per batch.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the retry policy for batch upserts and verse embeddings.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Enable or disable the final pass over failed batches.
    pub fn retry_failed_batches(mut self, enabled: bool) -> Self {
        self.config.retry_failed_batches = enabled;
        self
    }

    /// Set the attempt ceiling of the final retry pass.
    pub fn failed_batch_attempts(mut self, attempts: u32) -> Self {
        self.config.failed_batch_attempts = attempts;
        self
    }

    /// Set the pause between batches.
    pub fn batch_delay(mut self, delay: Duration) -> Self {
        self.config.batch_delay = delay;
        self
    }

    /// Set the resume buffer as a ratio of stored entries and an absolute cap.
    pub fn resume_buffer(mut self, ratio: f64, cap: usize) -> Self {
        self.config.resume_buffer_ratio = ratio;
        self.config.resume_buffer_cap = cap;
        self
    }

    /// Set the share of the corpus that counts as a complete load.
    pub fn completeness_ratio(mut self, ratio: f64) -> Self {
        self.config.completeness_ratio = ratio;
        self
    }

    /// Set how many batches may be in flight at once.
    pub fn max_in_flight(mut self, batches: usize) -> Self {
        self.config.max_in_flight = batches;
        self
    }

    /// Build the [`IndexerConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`IndexerConfig::validate`].
    pub fn build(self) -> Result<IndexerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Decision policy for [`MatchEngine`](crate::MatchEngine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchConfig {
    /// Minimum similarity (inclusive) for a quote to count as a match.
    pub threshold: f32,
    /// Scores at or above this, but below `threshold`, are reported as a
    /// possible match.
    pub near_miss_threshold: f32,
    /// Decimal places kept in the reported score.
    pub score_precision: u32,
    /// Longest accepted quote, in characters.
    pub max_quote_chars: usize,
    /// Deadline applied to every check, if set.
    pub query_timeout: Option<Duration>,
    /// Share of the corpus that must be stored before the index is ready.
    pub completeness_ratio: f64,
    /// Retry policy for the embedding and index calls of a single check.
    pub retry: RetryPolicy,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            near_miss_threshold: 0.6,
            score_precision: 4,
            max_quote_chars: 1000,
            query_timeout: None,
            completeness_ratio: 0.95,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(2),
                jitter: 0.25,
            },
        }
    }
}

impl MatchConfig {
    /// Create a new builder for constructing a [`MatchConfig`].
    pub fn builder() -> MatchConfigBuilder {
        MatchConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`VerseError::Config`] if:
    /// - `threshold` is outside `[0, 1]`
    /// - `near_miss_threshold > threshold`
    /// - `score_precision > 6`
    /// - `max_quote_chars == 0`
    /// - `completeness_ratio` is outside `(0, 1]`
    /// - the retry policy is invalid
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(VerseError::Config(format!(
                "threshold ({}) must be within [0, 1]",
                self.threshold
            )));
        }
        if self.near_miss_threshold > self.threshold {
            return Err(VerseError::Config(format!(
                "near_miss_threshold ({}) must not exceed threshold ({})",
                self.near_miss_threshold, self.threshold
            )));
        }
        if self.score_precision > 6 {
            return Err(VerseError::Config("score_precision must be at most 6".to_string()));
        }
        if self.max_quote_chars == 0 {
            return Err(VerseError::Config("max_quote_chars must be greater than zero".to_string()));
        }
        if !(self.completeness_ratio > 0.0 && self.completeness_ratio <= 1.0) {
            return Err(VerseError::Config(format!(
                "completeness_ratio ({}) must be within (0, 1]",
                self.completeness_ratio
            )));
        }
        self.retry.validate()
    }
}

/// Builder for constructing a validated [`MatchConfig`].
#[derive(Debug, Clone, Default)]
pub struct MatchConfigBuilder {
    config: MatchConfig,
}

impl MatchConfigBuilder {
    /// Set the inclusive match threshold.
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.config.threshold = threshold;
        self
    }

    /// Set the lower bound for "possible match" messages.
    pub fn near_miss_threshold(mut self, threshold: f32) -> Self {
        self.config.near_miss_threshold = threshold;
        self
    }

    /// Set the number of decimal places in reported scores.
    pub fn score_precision(mut self, places: u32) -> Self {
        self.config.score_precision = places;
        self
    }

    /// Set the longest accepted quote in characters.
    pub fn max_quote_chars(mut self, chars: usize) -> Self {
        self.config.max_quote_chars = chars;
        self
    }

    /// Apply a deadline to every check.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout = Some(timeout);
        self
    }

    /// Set the share of the corpus that must be stored before the index is ready.
    pub fn completeness_ratio(mut self, ratio: f64) -> Self {
        self.config.completeness_ratio = ratio;
        self
    }

    /// Set the retry policy for embedding and index calls.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`MatchConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`MatchConfig::validate`].
    pub fn build(self) -> Result<MatchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_offset_backs_off_ten_percent_capped_at_hundred() {
        let config = IndexerConfig::default();
        assert_eq!(config.resume_offset(0), 0);
        assert_eq!(config.resume_offset(9), 9);
        assert_eq!(config.resume_offset(50), 45);
        assert_eq!(config.resume_offset(500), 450);
        assert_eq!(config.resume_offset(31_000), 30_900);
    }

    #[test]
    fn completeness_uses_ratio() {
        let config = IndexerConfig::default();
        assert!(config.is_complete(95, 100));
        assert!(!config.is_complete(94, 100));
        assert!(config.is_complete(120, 100));
    }

    #[test]
    fn builders_reject_inconsistent_values() {
        assert!(IndexerConfig::builder().batch_size(0).build().is_err());
        assert!(IndexerConfig::builder().max_in_flight(0).build().is_err());
        assert!(IndexerConfig::builder().resume_buffer(0.5, 100).build().is_err());
        assert!(IndexerConfig::builder().completeness_ratio(0.0).build().is_err());
        assert!(MatchConfig::builder().threshold(1.5).build().is_err());
        assert!(MatchConfig::builder().threshold(0.5).near_miss_threshold(0.6).build().is_err());
        assert!(MatchConfig::builder().max_quote_chars(0).build().is_err());
    }

    #[test]
    fn struct_literals_are_held_to_the_same_rules() {
        let indexer = IndexerConfig { batch_size: 0, ..Default::default() };
        assert!(matches!(indexer.validate(), Err(VerseError::Config(_))));
        let indexer = IndexerConfig { max_in_flight: 0, ..Default::default() };
        assert!(matches!(indexer.validate(), Err(VerseError::Config(_))));
        let matcher = MatchConfig { threshold: 1.5, ..Default::default() };
        assert!(matches!(matcher.validate(), Err(VerseError::Config(_))));
        assert!(IndexerConfig::default().validate().is_ok());
        assert!(MatchConfig::default().validate().is_ok());
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(IndexerConfig::builder().build().unwrap(), IndexerConfig::default());
        assert_eq!(MatchConfig::builder().build().unwrap(), MatchConfig::default());
    }
}
