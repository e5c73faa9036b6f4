//! Error types for the image search core
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use std::path::PathBuf;
use thiserror::Error;

/// Error returned by search, load and tool-call operations.
///
/// A lookup miss is not an error: `get_by_id` returns `None` instead.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Caller supplied something unusable: blank query, out-of-range
    /// `top_k`, unknown tool, missing tool parameter.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A query arrived before any successful `load()`.
    #[error("Search index is not ready: no catalog has been loaded yet")]
    NotReady,

    /// Embedding, ingestion or index-build failure.
    #[error("Internal failure during {operation}: {cause}")]
    Internal { operation: String, cause: String },
}

impl SearchError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn internal(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Internal {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::NotReady => "NOT_READY",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidArgument { .. } => vec![
                "Provide a non-empty query",
                "Keep top_k between 1 and the configured search.max_top_k",
            ],
            Self::NotReady => vec![
                "Wait for the catalog to finish loading",
                "Check the startup log for a failed load and the data.dataset_path setting",
            ],
            Self::Internal { .. } => vec![
                "Verify the dataset file is valid JSON with unique nasa_id values",
                "Check that the embedding model can be downloaded or is cached",
            ],
        }
    }
}

/// Errors raised while reading a catalog snapshot.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read dataset '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse dataset '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Dataset has an unsupported layout: {reason}")]
    UnsupportedLayout { reason: String },

    #[error("Record at position {position} has an empty nasa_id")]
    EmptyId { position: usize },

    #[error("Duplicate nasa_id '{id}' in dataset")]
    DuplicateId { id: String },
}

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
