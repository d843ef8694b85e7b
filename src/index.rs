//! In-memory vector index.
//!
//! Stores `(Chunk, vector)` pairs and answers top-k queries with brute-force
//! cosine similarity. The index owns the [`EmbeddingHandle`] it was built
//! with, so text queries are always embedded into the same vector space as
//! the stored chunks.

use tracing::debug;

use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};
use crate::provider::EmbeddingHandle;

struct IndexedChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

pub struct VectorIndex {
    embedder: EmbeddingHandle,
    entries: Vec<IndexedChunk>,
    dims: Option<usize>,
}

impl VectorIndex {
    pub fn new(embedder: EmbeddingHandle) -> Self {
        Self {
            embedder,
            entries: Vec::new(),
            dims: None,
        }
    }

    /// Add a chunk with its embedding. All vectors must share one
    /// dimensionality, fixed by the first insert.
    pub fn insert(&mut self, chunk: Chunk, vector: Vec<f32>) -> Result<()> {
        match self.dims {
            Some(expected) if expected != vector.len() => {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                })
            }
            None => self.dims = Some(vector.len()),
            _ => {}
        }
        self.entries.push(IndexedChunk { chunk, vector });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> Option<usize> {
        self.dims
    }

    /// The embedding model every stored vector came from.
    pub fn embedder(&self) -> &EmbeddingHandle {
        &self.embedder
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    /// Top-`k` chunks by cosine similarity, best first. Ties keep insertion
    /// order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if let Some(expected) = self.dims {
            if expected != query_vec.len() {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: query_vec.len(),
                });
            }
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query_vec, &e.vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Embed `text` with the index's own model and return the top-`k` chunks.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed_one(text).await?;
        let results = self.search(&query_vec, k)?;
        debug!(
            query = text,
            hits = results.len(),
            best = results.first().map(|r| r.score),
            "index query"
        );
        Ok(results)
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("embedder", &self.embedder)
            .field("chunks", &self.entries.len())
            .field("dims", &self.dims)
            .finish()
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
