// Embeddings module
// Passage segmentation and the capability interface for embedding providers

pub mod chunking;
pub mod voyage;

use async_trait::async_trait;

use crate::{RagError, Result};

pub use chunking::{ChunkingConfig, Passage, Segments, passage_count, segment};
pub use voyage::VoyageClient;

/// Maps text to fixed-dimension vectors
///
/// Implementations return exactly one vector per input, in input order, and
/// report throttling as [`RagError::RateLimit`] so callers can back off.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of documents
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            RagError::Service("embedding service returned no vector for the query".to_string())
        })
    }

    /// Dimension of every vector this embedder produces
    fn dimension(&self) -> usize;
}
