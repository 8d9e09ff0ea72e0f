use crate::api::embeddings::Embedder;
use anyhow::Result;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

pub struct SimilarityGuard<'a> {
    embedder: &'a dyn Embedder,
    threshold: f32,
}

impl<'a> SimilarityGuard<'a> {
    pub fn new(embedder: &'a dyn Embedder, threshold: f32) -> Self {
        Self { embedder, threshold }
    }

    pub async fn most_similar(&self, text: &str, corpus: &[String]) -> Result<f32> {
        if corpus.is_empty() {
            return Ok(0.0);
        }
        let draft = self.embedder.embed(&[text.to_string()]).await?;
        let Some(draft) = draft.first() else {
            return Ok(0.0);
        };
        let past = self.embedder.embed(corpus).await?;
        Ok(past
            .iter()
            .map(|v| cosine_similarity(draft, v))
            .fold(f32::MIN, f32::max))
    }

    pub fn is_repetitive(&self, score: f32) -> bool {
        score >= self.threshold
    }
}
