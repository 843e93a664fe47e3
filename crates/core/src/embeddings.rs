use crate::error::ModelError;
use crate::traits::Embedder;
use async_trait::async_trait;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Offline, deterministic embedder hashing character trigrams into buckets.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        normalize_in_place(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "char-trigram"
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

pub fn normalize_in_place(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector {
            *value /= magnitude;
        }
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let len = left.len().min(right.len());
    let dot = (0..len).map(|i| left[i] * right[i]).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Hydraulic pressure and flow");
        let second = embedder.embed("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn similar_text_scores_higher() {
        let embedder = CharacterNgramEmbedder::default();
        let query = embedder.embed("What is the capital of France?");
        let close = embedder.embed("The capital of France is Paris.");
        let far = embedder.embed("Hydraulic pumps need regular maintenance.");
        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["alpha beta".to_string(), "gamma delta".to_string()];
        let vectors = embedder.embed_batch(&texts).await.expect("offline embedder");
        assert_eq!(vectors[0], embedder.embed("alpha beta"));
        assert_eq!(vectors[1], embedder.embed("gamma delta"));
    }
}
