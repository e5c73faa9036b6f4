//! Semantic search over the image catalog
//!
//! [`SearchEngine`] ties a catalog source, an embedding provider and a
//! vector index together and exposes ranked search plus read accessors.

mod engine;

pub use engine::SearchEngine;

// Re-export key types
pub use fastembed::EmbeddingModel;
