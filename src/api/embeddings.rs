use super::body_snippet;
use crate::config::Config;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct OpenAiCompatEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatEmbedder {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.llm_base_url.trim_end_matches('/').to_string(),
            model: cfg.embedding_model.clone(),
            api_key: cfg.llm_api_key.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

fn parse_embeddings(raw: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut resp: EmbeddingResponse =
        serde_json::from_str(raw).context("Failed to parse embeddings response")?;
    if resp.data.len() != expected {
        anyhow::bail!(
            "Embeddings response has {} vectors, expected {}",
            resp.data.len(),
            expected
        );
    }
    resp.data.sort_by_key(|item| item.index);
    Ok(resp.data.into_iter().map(|item| item.embedding).collect())
}

#[async_trait]
impl Embedder for OpenAiCompatEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let mut req = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.context("Embeddings request failed")?;
        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            logw(format!("Embeddings HTTP {}: {}", status.as_u16(), body_snippet(&raw)));
            anyhow::bail!("Embeddings request returned HTTP {}", status.as_u16());
        }

        parse_embeddings(&raw, texts.len())
    }
}
