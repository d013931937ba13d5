//! Error types for catalog ingestion and queries.
//!
//! Per-record problems are not errors: they surface as
//! [`SkipReason`](crate::models::SkipReason) values and counters. Everything
//! in [`CatalogError`] is fatal to the call that produced it and leaves the
//! published snapshot untouched.

use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur during ingestion, persistence, or queries.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The feed source could not be read (missing file, HTTP failure).
    #[error("feed not found: {source_name}: {reason}")]
    FeedNotFound {
        /// Path or URL of the feed.
        source_name: String,
        /// Description of why the feed is unavailable.
        reason: String,
    },

    /// The feed document is not well-formed.
    #[error("feed parse error: {message}")]
    FeedParse {
        /// Description of the parse failure.
        message: String,
    },

    /// A required top-level section of the feed is absent.
    #[error("feed structure error: missing <{section}> section")]
    FeedStructure {
        /// Name of the missing element (`shop`, `categories`, `offers`).
        section: &'static str,
    },

    /// Another ingestion currently holds the ingestion lock.
    #[error("ingestion already in progress")]
    ConcurrentIngestion,

    /// A query parameter failed validation.
    #[error("invalid query parameter: {message}")]
    InvalidQueryParameter {
        /// Which parameter was rejected and why.
        message: String,
    },

    /// The snapshot store failed to save or load.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },
}

impl CatalogError {
    pub fn feed_parse(message: impl Into<String>) -> Self {
        CatalogError::FeedParse {
            message: message.into(),
        }
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        CatalogError::InvalidQueryParameter {
            message: message.into(),
        }
    }

    pub fn storage(message: impl std::fmt::Display) -> Self {
        CatalogError::Storage {
            message: message.to_string(),
        }
    }

    /// True for failures caused by the feed itself rather than the engine.
    pub fn is_feed_error(&self) -> bool {
        matches!(
            self,
            CatalogError::FeedNotFound { .. }
                | CatalogError::FeedParse { .. }
                | CatalogError::FeedStructure { .. }
        )
    }
}
