//! Feature-hashed TF-IDF embedder
//!
//! Tokens and token bigrams are hashed into a fixed number of dimensions
//! with signed hashing; the result is L2-normalized. Deterministic across
//! processes, so stored embeddings stay comparable after restarts.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::embedding::Embedder;
use crate::error::Result;

pub struct HashedEmbedder {
    dimensions: usize,
}

impl HashedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.len() > 1)
            .map(String::from)
            .collect()
    }

    fn bucket(&self, term: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        term.hash(&mut hasher);
        (hasher.finish() as usize) % self.dimensions
    }

    /// Signed hashing reduces the impact of bucket collisions
    fn sign(term: &str) -> f32 {
        let mut hasher = DefaultHasher::new();
        term.hash(&mut hasher);
        b'~'.hash(&mut hasher);
        if hasher.finish() & 1 == 0 {
            1.0
        } else {
            -1.0
        }
    }
}

impl Embedder for HashedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        let mut embedding = vec![0.0_f32; self.dimensions];

        if tokens.is_empty() {
            return Ok(embedding);
        }

        let mut counts: HashMap<String, f32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            *counts.entry(bigram).or_insert(0.0) += 1.0;
        }

        let doc_len = tokens.len() as f32;
        for (term, count) in counts {
            // Sublinear term frequency, length-weighted as a cheap IDF proxy
            let tf = (1.0 + count / doc_len).ln();
            let idf = 1.0 + (term.len() as f32).sqrt() * 0.25;
            let weight = tf * idf;

            embedding[self.bucket(&term)] += weight * Self::sign(&term);
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hashed-tfidf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = HashedEmbedder::new(128);
        let a = embedder.embed("tabs over spaces").unwrap();
        let b = embedder.embed("tabs over spaces").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dimensions_fixed() {
        let embedder = HashedEmbedder::new(64);
        let v = embedder.embed("some text to embed").unwrap();
        assert_eq!(v.len(), 64);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashedEmbedder::new(32);
        let v = embedder.embed("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_normalized_output() {
        let embedder = HashedEmbedder::new(256);
        let v = embedder.embed("indentation style preferences").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashedEmbedder::new(384);
        let doc = embedder
            .embed("the user prefers tabs over spaces for indentation")
            .unwrap();
        let related = embedder.embed("indentation tabs spaces").unwrap();
        let unrelated = embedder.embed("quarterly revenue forecast meeting").unwrap();
        assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
    }
}
