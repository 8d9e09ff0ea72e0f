use super::body_snippet;
use crate::config::Config;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, system_prompt: &str, user_prompt: &str, params: ChatParams) -> Result<String>;
}

pub struct OpenAiCompatChat {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatChat {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            base_url: cfg.llm_base_url.trim_end_matches('/').to_string(),
            model: cfg.llm_model.clone(),
            api_key: cfg.llm_api_key.clone(),
        }
    }
}

fn extract_message_content(resp_json: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error") {
        let msg = err
            .get("message")
            .and_then(|v| v.as_str())
            .or_else(|| err.as_str())
            .unwrap_or("unknown error");
        logw(format!("LLM error message: {}", msg));
        return None;
    }

    root.get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.trim().to_string())
}

#[async_trait]
impl ChatModel for OpenAiCompatChat {
    async fn chat(&self, system_prompt: &str, user_prompt: &str, params: ChatParams) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_tokens": params.max_new_tokens,
            "stream": false,
        });

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.context("LLM request failed")?;
        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            logw(format!("LLM HTTP {}", status.as_u16()));
            if !raw.is_empty() {
                logw(format!("LLM raw body: {}", body_snippet(&raw)));
            }
            anyhow::bail!("LLM request returned HTTP {}", status.as_u16());
        }

        match extract_message_content(&raw) {
            Some(text) => Ok(text),
            None => {
                logw(format!("LLM raw body: {}", body_snippet(&raw)));
                anyhow::bail!("LLM response parse failed")
            }
        }
    }
}
