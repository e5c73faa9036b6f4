//! In-memory nearest-neighbor index over unit-normalized embeddings.
//!
//! [`VectorIndex`] pairs records 1:1 with vectors. The scan itself sits
//! behind [`NeighborSearch`] so the exact [`FlatIndex`] can be swapped for
//! an approximate structure without touching callers.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::vector::{Neighbor, Position, VectorDimension, VectorError};

/// Below this many vectors the scan runs on the calling thread.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// Contract for anything that can rank stored vectors against a query.
///
/// Implementations receive a query that is already unit-normalized and of
/// the index dimension, and a `k` already clamped to `[1, len]`. They must
/// return exactly `k` neighbors ordered by descending score with ties
/// broken by ascending position.
pub trait NeighborSearch: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> VectorDimension;

    fn nearest(&self, query: &[f32], k: usize) -> Vec<Neighbor>;
}

/// Exact O(N·D) inner-product scan over contiguous storage.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: VectorDimension,
    data: Vec<f32>,
    count: usize,
}

impl FlatIndex {
    /// Normalize and pack vectors. All vectors must share the dimension of
    /// the first one.
    pub fn from_vectors(vectors: Vec<Vec<f32>>) -> Result<Self, VectorError> {
        let first = vectors.first().ok_or(VectorError::EmptyIndex)?;
        let dimension = VectorDimension::new(first.len())?;

        let count = vectors.len();

        let mut data = Vec::with_capacity(count * dimension.get());
        for mut vector in vectors {
            dimension.validate_vector(&vector)?;
            normalize(&mut vector);
            data.extend_from_slice(&vector);
        }

        Ok(Self {
            dimension,
            data,
            count,
        })
    }

    #[cfg(test)]
    fn vector(&self, position: usize) -> &[f32] {
        let dim = self.dimension.get();
        &self.data[position * dim..(position + 1) * dim]
    }
}

impl NeighborSearch for FlatIndex {
    fn len(&self) -> usize {
        self.count
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn nearest(&self, query: &[f32], k: usize) -> Vec<Neighbor> {
        let dim = self.dimension.get();
        let score = |(position, stored): (usize, &[f32])| Neighbor {
            position: Position::new(position),
            score: sanitize(dot(query, stored)),
        };

        let neighbors: Vec<Neighbor> = if self.count >= PARALLEL_SCAN_THRESHOLD {
            self.data.par_chunks(dim).enumerate().map(score).collect()
        } else {
            self.data.chunks(dim).enumerate().map(score).collect()
        };

        top_k(neighbors, k)
    }
}

/// Records paired with a neighbor search backend.
///
/// Invariants: `records.len() == backend.len()`, and record `i` belongs to
/// vector `i`. Both are fixed for the lifetime of the index.
pub struct VectorIndex<R> {
    records: Vec<R>,
    backend: Box<dyn NeighborSearch>,
}

impl<R> std::fmt::Debug for VectorIndex<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("records", &self.records.len())
            .field("dimension", &self.backend.dimension())
            .finish()
    }
}

impl<R> VectorIndex<R> {
    /// Build an exact index. Vectors are L2-normalized on the way in.
    pub fn build(records: Vec<R>, vectors: Vec<Vec<f32>>) -> Result<Self, VectorError> {
        if records.len() != vectors.len() {
            return Err(VectorError::CountMismatch {
                records: records.len(),
                vectors: vectors.len(),
            });
        }
        let backend = FlatIndex::from_vectors(vectors)?;
        Self::with_backend(records, Box::new(backend))
    }

    /// Pair records with an already built backend.
    pub fn with_backend(
        records: Vec<R>,
        backend: Box<dyn NeighborSearch>,
    ) -> Result<Self, VectorError> {
        if records.len() != backend.len() {
            return Err(VectorError::CountMismatch {
                records: records.len(),
                vectors: backend.len(),
            });
        }
        Ok(Self { records, backend })
    }

    /// Rank records against `vector` by cosine similarity.
    ///
    /// `k` is clamped to `[1, len]`; asking for more than the index holds
    /// returns every record.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(&R, f32)>, VectorError> {
        self.backend.dimension().validate_vector(vector)?;
        if self.records.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = vector.to_vec();
        normalize(&mut query);
        let k = k.clamp(1, self.records.len());

        Ok(self
            .backend
            .nearest(&query, k)
            .into_iter()
            .map(|n| (&self.records[n.position.get()], n.score))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> VectorDimension {
        self.backend.dimension()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn get(&self, position: Position) -> Option<&R> {
        self.records.get(position.get())
    }
}

/// Scale `vector` to unit length in place. Zero vectors stay zero.
pub fn normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 && magnitude.is_finite() {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

// NaN has no place in the ordering; it ranks below every real score.
fn sanitize(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

fn rank_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    // Scores are sanitized, so partial_cmp only sees comparable values
    // and treats -0.0 and 0.0 as a tie.
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.position.cmp(&b.position))
}

/// Keep the `k` best neighbors, best first.
pub(crate) fn top_k(mut neighbors: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    if k == 0 {
        return Vec::new();
    }
    if k < neighbors.len() {
        neighbors.select_nth_unstable_by(k - 1, rank_order);
        neighbors.truncate(k);
    }
    neighbors.sort_unstable_by(rank_order);
    neighbors
}
