//! Embedder seam.
//!
//! The crate never runs an embedding model itself — the host supplies an [`Embedder`]
//! producing L2-normalized vectors of a fixed dimension. Failures are caught at every
//! call site and degrade retrieval to lexical-only; they never crash indexing.

use crate::error::Result;

/// Default embedding dimensionality (all-MiniLM-class models).
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly [`Embedder::dimensions`]
/// entries. All methods are synchronous — callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait Embedder: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this embedder produces.
    fn dimensions(&self) -> usize {
        DEFAULT_EMBEDDING_DIM
    }
}
