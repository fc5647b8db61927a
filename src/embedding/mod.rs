//! Embedding capability consumed by the vector store
//!
//! The default embedder is a feature-hashed TF-IDF: deterministic, fast,
//! and dependency-free, so semantic search works without any API key.

mod hashed;

pub use hashed::HashedEmbedder;

use std::sync::Arc;

use crate::error::Result;

/// Default embedding dimensions for the hashed embedder
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Create the default embedder
pub fn default_embedder() -> Arc<dyn Embedder> {
    Arc::new(HashedEmbedder::new(DEFAULT_DIMENSIONS))
}

/// Cosine similarity between two vectors of equal dimensions
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Serialize an embedding as little-endian f32 bytes for BLOB storage
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize a BLOB back into an embedding
pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| {
            let mut arr = [0u8; 4];
            arr.copy_from_slice(chunk);
            f32::from_le_bytes(arr)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_blob_round_trip() {
        let original = vec![0.5, -1.25, 3.75, 0.0];
        let blob = embedding_to_blob(&original);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_embedding(&blob), original);
    }
}
