//! Text encoder trait and vector utilities.
//!
//! Defines the [`TextEncoder`] trait that every sentence-encoder backend
//! implements, a deterministic [`HashingEncoder`] that needs no model
//! download, and pure helpers for similarity computation.
//!
//! Model-backed encoders (fastembed) live in the `lexspace` app crate.

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A black-box function from text to a fixed-length vector.
///
/// Implementations must be pure with respect to their input and their own
/// fixed configuration, so entities can be encoded on any worker in any
/// order.
pub trait TextEncoder: Send + Sync {
    /// Model identifier recorded next to every vector this encoder produces.
    fn model_id(&self) -> &str;
    /// Output dimensionality.
    fn dims(&self) -> usize;
    /// Encode a batch of texts, one vector per input, in input order.
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Encode a single text.
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.encode_batch(&[text])?
            .pop()
            .ok_or_else(|| Error::Encoder("empty embedding response".to_string()))
    }
}

/// Feature-hashing bag-of-words encoder.
///
/// Lowercased alphanumeric tokens are hashed (SHA-256) into `dims` signed
/// buckets and the result is L2-normalised. Texts sharing vocabulary get a
/// positive cosine similarity; disjoint texts are near-orthogonal.
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    model_id: String,
    dims: usize,
}

impl HashingEncoder {
    pub fn new(dims: usize) -> Result<Self> {
        if dims == 0 {
            return Err(Error::Encoder("hashing encoder dims must be > 0".to_string()));
        }
        Ok(Self {
            model_id: format!("lexspace-hashing-v1/{}", dims),
            dims,
        })
    }

    fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }
        l2_normalize(&mut vec);
        vec
    }
}

impl TextEncoder for HashingEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, or zero vectors.
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

/// Plain dot product; `0.0` for vectors of different lengths.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm >= f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
