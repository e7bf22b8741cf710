//! Embedding backends.
//!
//! An [`Embedder`] turns text into a fixed-width vector. The semantic index
//! records [`Embedder::model_id`] and [`Embedder::dimension`] with every build
//! so switching backends invalidates previously stored vectors.

use crate::tokenize::content_words;
use katiba_core::error::{KatibaError, Result};

/// Dimension used by the offline hashing backend.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.5;

/// A text-to-vector model.
pub trait Embedder: Send + Sync {
    /// Stable identifier stored in index metadata.
    fn model_id(&self) -> &str;

    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Embed `texts`, one vector per input, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`KatibaError::EmbeddingModel`] when the backend fails and
    /// [`KatibaError::Timeout`] when a remote backend does not answer in time.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Same as [`Embedder::embed_batch`].
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| KatibaError::EmbeddingModel("backend returned no vector".into()))
    }
}

/// Deterministic feature-hashing embedder that needs no model files.
///
/// Unigrams and adjacent-word bigrams over content words are hashed with
/// BLAKE3 into `dimension` signed buckets, then the vector is L2-normalized.
/// Texts sharing vocabulary land close together; there is no notion of
/// synonymy.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hash-v1-{dimension}"),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        let words = content_words(text);

        for word in &words {
            self.accumulate(&mut vector, word.as_bytes(), UNIGRAM_WEIGHT);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), BIGRAM_WEIGHT);
        }

        normalize(&mut vector);
        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = blake3::hash(feature);
        let bytes = hash.as_bytes();
        let mut bucket_bytes = [0_u8; 8];
        bucket_bytes.copy_from_slice(&bytes[..8]);
        let bucket = u64::from_le_bytes(bucket_bytes) % self.dimension as u64;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        let slot = usize::try_from(bucket).unwrap_or(0);
        vector[slot] += sign * weight;
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Scale `vector` to unit length; zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::knn::cosine_similarity;

    #[test]
    fn vectors_have_requested_dimension() {
        let embedder = HashEmbedder::new(64);
        assert_eq!(embedder.dimension(), 64);
        assert_eq!(embedder.model_id(), "hash-v1-64");
        assert_eq!(embedder.embed("sovereign power").expect("embed").len(), 64);
    }

    #[test]
    fn zero_dimension_is_clamped() {
        let embedder = HashEmbedder::new(0);
        assert_eq!(embedder.dimension(), 1);
        assert_eq!(embedder.embed("anything").expect("embed").len(), 1);
    }

    #[test]
    fn embedding_is_deterministic_and_unit_length() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("All sovereign power belongs to the people").expect("embed");
        let b = embedder.embed("All sovereign power belongs to the people").expect("embed");
        assert_eq!(a, b);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
    }

    #[test]
    fn stop_words_only_text_is_zero_vector() {
        let embedder = HashEmbedder::default();
        let v = embedder.embed("the of and").expect("embed");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_vocabulary_scores_higher() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed("sovereign power of the people").expect("embed");
        let close = embedder
            .embed("All sovereign power belongs to the people of Kenya")
            .expect("embed");
        let far = embedder
            .embed("An arrested person has the right to remain silent")
            .expect("embed");

        let close_score = cosine_similarity(&query, &close);
        let far_score = cosine_similarity(&query, &far);
        assert!(close_score > far_score, "{close_score} <= {far_score}");
    }

    #[test]
    fn batch_preserves_order() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed_batch(&["land", "senate"]).expect("batch");
        assert_eq!(batch[0], embedder.embed("land").expect("embed"));
        assert_eq!(batch[1], embedder.embed("senate").expect("embed"));
    }
}
