//! Embedding provider trait and mock implementation.
//!
//! The router embeds query text before searching the semantic store, and the
//! sync manager embeds extracted concepts before upserting them. Both go
//! through [`EmbeddingProvider`], selected once at composition time.

use async_trait::async_trait;

use crate::Result;

/// Trait for generating text embeddings.
///
/// Implementations wrap a concrete model (local or remote) and must be
/// shareable across async tasks.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The embedding dimension.
    fn dimension(&self) -> usize;

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// A deterministic embedding provider for tests and local runs.
///
/// Vectors are derived from lowercase word hashes (a hashed bag of words),
/// so texts sharing vocabulary land near each other under cosine similarity.
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = blake3::hash(word.to_lowercase().as_bytes());
            let bytes = digest.as_bytes();
            let slot = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimension;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[slot] += sign;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.deterministic_embedding(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.deterministic_embedding(t))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Cosine similarity between two vectors; 0.0 when either is zero or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockEmbeddingProvider::new(64);
        assert_eq!(provider.dimension(), 64);
        assert_eq!(provider.name(), "mock");
    }

    #[tokio::test]
    async fn test_mock_embed_unit_norm() {
        let provider = MockEmbeddingProvider::new(32);
        let embedding = provider.embed("customer loyalty program").await.unwrap();
        assert_eq!(embedding.len(), 32);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_mock_embed_deterministic_and_case_insensitive() {
        let provider = MockEmbeddingProvider::new(32);
        let e1 = provider.embed("Shipping Delays").await.unwrap();
        let e2 = provider.embed("shipping delays").await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_is_closer() {
        let provider = MockEmbeddingProvider::new(128);
        let base = provider.embed("late shipping complaints").await.unwrap();
        let near = provider.embed("shipping complaints").await.unwrap();
        let far = provider.embed("quarterly revenue forecast").await.unwrap();
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[tokio::test]
    async fn test_mock_embed_empty_text_is_zero() {
        let provider = MockEmbeddingProvider::new(4);
        let embedding = provider.embed("").await.unwrap();
        assert!(embedding.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_trait_object_safety() {
        fn _assert_object_safe(_: &dyn EmbeddingProvider) {}
    }
}
