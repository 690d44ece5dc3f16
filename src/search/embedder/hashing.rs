use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::Result;
use crate::search::hybrid::tokenize;

/// Offline feature-hashing embedder: each token adds weight to a bucket
/// chosen by its hash, then the vector is L2-normalized. Deterministic and
/// dependency-free, so texts sharing words land close together.
pub struct HashingEmbedder {
    dimensions: usize,
    max_batch_size: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize, max_batch_size: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            max_batch_size: max_batch_size.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dimensions;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.vectorize(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
