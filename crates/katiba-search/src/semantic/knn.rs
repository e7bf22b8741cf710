//! Brute-force cosine KNN over an in-memory embedding matrix.

use serde::Serialize;
use std::cmp::Ordering;

/// One scored neighbour: position into the matrix and cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbour {
    pub position: usize,
    pub score: f32,
}

/// Cosine similarity in `[-1, 1]`; 0 when either side is a zero vector or
/// the lengths differ.
#[must_use]
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut left_norm_sq = 0.0_f32;
    let mut right_norm_sq = 0.0_f32;

    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        left_norm_sq += a * a;
        right_norm_sq += b * b;
    }

    let denom = left_norm_sq.sqrt() * right_norm_sq.sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

/// The `limit` rows of `matrix` most similar to `query`.
///
/// Ordered by descending score; equal scores keep ascending `tie_key`, so
/// results do not depend on storage order.
pub fn top_k<K, F>(query: &[f32], matrix: &[Vec<f32>], limit: usize, tie_key: F) -> Vec<Neighbour>
where
    K: Ord,
    F: Fn(usize) -> K,
{
    if limit == 0 {
        return Vec::new();
    }

    let mut scored: Vec<Neighbour> = matrix
        .iter()
        .enumerate()
        .map(|(position, row)| Neighbour {
            position,
            score: cosine_similarity(query, row),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| tie_key(a.position).cmp(&tie_key(b.position)))
    });
    scored.truncate(limit);
    scored
}

/// JSON array text for one embedding, as stored in `article_embeddings`.
#[must_use]
pub fn encode_embedding_json(embedding: &[f32]) -> String {
    let mut encoded = String::from("[");
    for (idx, value) in embedding.iter().enumerate() {
        if idx != 0 {
            encoded.push(',');
        }
        encoded.push_str(&value.to_string());
    }
    encoded.push(']');
    encoded
}
