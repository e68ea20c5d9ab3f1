//! Deterministic feature-hashing embedder.
//!
//! Each lowercase alphanumeric token is hashed with SHA-256 into one of
//! `dims` buckets, with the sign taken from a second hash byte. Word bigrams
//! are added at half weight so phrase overlap counts for more than bag
//! overlap. The result is L2-normalized.
//!
//! No model, no network: runs are reproducible across machines.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use persona_sift_core::embedding::EmbeddingProvider;
use persona_sift_core::models::EmbeddingVector;

pub const DEFAULT_HASH_DIMS: usize = 512;

pub struct HashProvider {
    dims: usize,
    max_input_chars: usize,
}

impl HashProvider {
    pub fn new(dims: usize, max_input_chars: usize) -> Self {
        Self {
            dims: dims.max(1),
            max_input_chars,
        }
    }

    pub fn embed_one(&self, text: &str) -> EmbeddingVector {
        let mut vec = vec![0.0f32; self.dims];
        let tokens = tokenize(text);

        for token in &tokens {
            self.add_feature(&mut vec, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vec, bigram.as_bytes(), 0.5);
        }

        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }

    fn add_feature(&self, vec: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vec[index] += sign * weight;
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        "hash"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_sift_core::embedding::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let p = HashProvider::new(64, 2000);
        let a = p.embed_one("Vegetable lasagna with spinach");
        let b = p.embed_one("Vegetable lasagna with spinach");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let p = HashProvider::new(64, 2000);
        let a = p.embed_one("Grilled, vegetables!");
        let b = p.embed_one("grilled vegetables");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_overlap_scores_higher() {
        let p = HashProvider::new(512, 2000);
        let q = p.embed_one("vegetarian buffet dinner menu");
        let near = p.embed_one("a buffet dinner menu for guests");
        let far = p.embed_one("quarterly tax filing deadlines");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let p = HashProvider::new(16, 2000);
        assert!(p.embed_one("  ").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let p = HashProvider::new(32, 2000);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let out = p.embed(&texts).await.unwrap();
        assert_eq!(out[0], p.embed_one("alpha"));
        assert_eq!(out[1], p.embed_one("beta"));
    }
}
