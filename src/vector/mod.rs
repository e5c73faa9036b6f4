//! Vector search functionality for the image catalog.
//!
//! This module owns everything below the search engine: embedding
//! providers, type-safe dimensions, and the nearest-neighbor index.
//!
//! # Architecture
//! Similarity is cosine throughout: every stored vector and every query is
//! L2-normalized, so the inner product is the score. The exact
//! [`FlatIndex`] scans all vectors per query, which is adequate for catalogs
//! of a few thousand images. A larger catalog can plug an approximate
//! structure in through [`NeighborSearch`] without changing the engine.

mod embedding;
mod index;
mod types;

pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, HASHING_MODEL, HashingEmbedder, create_embedder,
    models_dir, parse_embedding_model,
};
pub use index::{FlatIndex, NeighborSearch, VectorIndex, normalize};
pub use types::{Neighbor, Position, VECTOR_DIMENSION_384, VectorDimension, VectorError};
