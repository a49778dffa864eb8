//! Text similarity.
//!
//! The pipeline ranks courses by similarity in several places (duplicate
//! repair, credit top-up, topic guard, catalog nearest-neighbour lookup). All
//! of them go through the [`Embedder`] trait so that a real embedding model
//! can be plugged in; [`HashingEmbedder`] is the dependency-free default.

use std::fmt;

/// Dimension of vectors produced by [`HashingEmbedder`].
const DEFAULT_DIMENSIONS: usize = 512;

/// Words ignored when building bag-of-words vectors.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "into", "is", "of", "on", "or",
    "the", "to", "with",
];

/// Maps text to a fixed-size vector. Vectors from the same embedder are
/// comparable with [`cosine_similarity`].
pub trait Embedder: Send + Sync + fmt::Debug {
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Hashed bag-of-words embedder.
///
/// Lower-cased alphanumeric tokens are hashed (FNV-1a) into a fixed number of
/// buckets and the resulting vector is L2-normalised. Deterministic across
/// runs and platforms.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty() && !STOP_WORDS.contains(t))
        {
            let bucket = (fnv1a(token.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// Cosine similarity of two vectors; 0.0 when either is all zeros or the
/// lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Index of the candidate text most similar to `target`.
///
/// Ties keep the earliest candidate. Returns `None` for an empty slice.
pub fn most_similar<S: AsRef<str>>(
    embedder: &dyn Embedder,
    target: &str,
    candidates: &[S],
) -> Option<usize> {
    let target_vec = embedder.embed(target);
    let mut best: Option<(usize, f32)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let score = cosine_similarity(&target_vec, &embedder.embed(candidate.as_ref()));
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Similarity of two texts under `embedder`.
pub fn text_similarity(embedder: &dyn Embedder, a: &str, b: &str) -> f32 {
    cosine_similarity(&embedder.embed(a), &embedder.embed(b))
}
