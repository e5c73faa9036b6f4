//! Type-safe wrappers and core types for vector search functionality.
//!
//! Newtypes here keep dimensions and positions from being confused with
//! plain integers at the index boundary.

use thiserror::Error;

/// Dimension produced by the default embedding model (all-MiniLM-L6-v2).
pub const VECTOR_DIMENSION_384: usize = 384;

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent
/// dimension mismatches during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Insertion position of a record inside an index.
///
/// Positions are assigned in load order and double as the tie-break key
/// when two records score the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(usize);

impl Position {
    #[must_use]
    pub const fn new(position: usize) -> Self {
        Self(position)
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }
}

/// One hit of a nearest-neighbor scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: Position,
    /// Cosine similarity, roughly in [-1.0, 1.0].
    pub score: f32,
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Record/vector count mismatch: {records} records but {vectors} vectors\nSuggestion: Embed every record exactly once"
    )]
    CountMismatch { records: usize, vectors: usize },

    #[error("Cannot build an index from zero vectors\nSuggestion: Load a non-empty catalog")]
    EmptyIndex,

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error("Unknown embedding model '{0}'\nSuggestion: Use \"hashing\" or a fastembed model name such as AllMiniLML6V2")]
    UnknownModel(String),
}
