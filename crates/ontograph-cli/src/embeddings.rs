//! Deterministic token-hash embeddings for the CLI's local mode.
//!
//! Real deployments get vectors from an external embedding service; the CLI
//! needs something reproducible to exercise the vector branch without one.
//! Each token hashes to a bucket, bucket counts are L2-normalized, and the
//! same text always yields the same vector.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const HASH_EMBEDDING_DIM: usize = 64;

/// Embed every chunk of a document, keyed by chunk id.
pub fn hash_embeddings(chunks: &[ontograph_pipeline::Chunk]) -> BTreeMap<u32, Vec<f32>> {
    chunks
        .iter()
        .map(|c| (c.chunk_id, hash_embed(&c.text)))
        .collect()
}

/// Token-hash embedding of one text.
pub fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; HASH_EMBEDDING_DIM];
    for token in text.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        let mut hasher = Sha256::new();
        hasher.update(token.to_lowercase().as_bytes());
        let digest = hasher.finalize();
        let bucket = u16::from_be_bytes([digest[0], digest[1]]) as usize % HASH_EMBEDDING_DIM;
        vector[bucket] += 1.0;
    }
    normalize_in_place(&mut vector);
    vector
}

fn normalize_in_place(v: &mut [f32]) {
    let norm2: f32 = v.iter().map(|x| x * x).sum();
    if norm2 <= 0.0 {
        return;
    }
    let inv = 1.0 / norm2.sqrt();
    for x in v.iter_mut() {
        *x *= inv;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_deterministic() {
        assert_eq!(hash_embed("Acme shipped widgets"), hash_embed("Acme shipped widgets"));
    }

    #[test]
    fn nonempty_text_yields_unit_vector() {
        let v = hash_embed("alpha beta gamma");
        let norm: f32 = v.iter().map(|x| x * x).sum();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_yields_zero_vector() {
        let v = hash_embed("");
        assert!(v.iter().all(|x| *x == 0.0));
    }
}
