use crate::config::Config;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const SECTION_MIN_CHARS: usize = 350;
const SECTION_MAX_CHARS: usize = 1200;
const FACT_WIDTH: usize = 400;
const FACT_PLACEHOLDER: &str = " ...";

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(={2,})\s*(.*?)\s*={2,}\s*$").expect("heading regex is valid"));

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<QueryPage>,
}

#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    extract: Option<String>,
}

pub struct WikiClient {
    client: Client,
    api_url: String,
    user_agent: String,
}

impl WikiClient {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_url: format!("https://{}.wikipedia.org/w/api.php", cfg.wikipedia_language),
            user_agent: cfg.wikipedia_user_agent.clone(),
        }
    }

    async fn fetch_extract(&self, title: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .get(&self.api_url)
            .header("User-Agent", &self.user_agent)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .with_context(|| format!("Wikipedia request failed for {}", title))?;

        let status = resp.status();
        if !status.is_success() {
            logw(format!("Wikipedia HTTP {} for {}", status.as_u16(), title));
            return Ok(None);
        }

        let body: QueryResponse = resp.json().await.context("Wikipedia response parse failed")?;
        let page = body.query.and_then(|q| q.pages.into_iter().next());
        Ok(match page {
            Some(p) if !p.missing && !p.invalid => Some(p.extract.unwrap_or_default()),
            _ => None,
        })
    }
}

#[async_trait]
pub trait FactSource: Send + Sync {
    async fn page_exists(&self, title: &str) -> Result<bool>;

    async fn passages(&self, title: &str, max_passages: usize) -> Result<Vec<String>>;
}

#[async_trait]
impl FactSource for WikiClient {
    async fn page_exists(&self, title: &str) -> Result<bool> {
        Ok(self.fetch_extract(title).await?.is_some())
    }

    async fn passages(&self, title: &str, max_passages: usize) -> Result<Vec<String>> {
        match self.fetch_extract(title).await? {
            Some(extract) => Ok(split_passages(&extract, max_passages)),
            None => Ok(Vec::new()),
        }
    }
}

pub fn split_passages(extract: &str, max_passages: usize) -> Vec<String> {
    let mut summary = String::new();
    let mut sections: Vec<(usize, String)> = Vec::new();

    for line in extract.lines() {
        if let Some(caps) = HEADING.captures(line) {
            sections.push((caps[1].len(), String::new()));
            continue;
        }
        let target = match sections.last_mut() {
            Some((_, body)) => body,
            None => &mut summary,
        };
        target.push_str(line);
        target.push('\n');
    }

    let mut chunks = Vec::new();
    let summary = summary.trim();
    if !summary.is_empty() {
        chunks.push(summary.to_string());
    }
    for (level, body) in sections {
        if chunks.len() >= max_passages {
            break;
        }
        if level != 2 {
            continue;
        }
        let body = body.trim();
        let len = body.chars().count();
        if SECTION_MIN_CHARS < len && len < SECTION_MAX_CHARS {
            chunks.push(body.to_string());
        }
    }
    chunks.truncate(max_passages);
    chunks
}

fn hyphen_pieces(word: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = word.char_indices().collect();
    let mut pieces = Vec::new();
    let mut start = 0;
    for w in chars.windows(3) {
        let [(_, prev), (_, c), (next_at, next)] = [w[0], w[1], w[2]];
        if c == '-' && prev.is_alphanumeric() && next.is_alphabetic() {
            pieces.push(&word[start..next_at]);
            start = next_at;
        }
    }
    pieces.push(&word[start..]);
    pieces
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn shorten(text: &str, width: usize, placeholder: &str) -> String {
    let text = collapse_whitespace(text);
    if text.chars().count() <= width {
        return text;
    }

    let budget = width.saturating_sub(placeholder.chars().count());
    let mut out = String::new();
    let mut used = 0usize;
    'words: for word in text.split(' ') {
        for (i, piece) in hyphen_pieces(word).into_iter().enumerate() {
            let space = i == 0 && !out.is_empty();
            let add = piece.chars().count() + usize::from(space);
            if used + add > budget {
                break 'words;
            }
            if space {
                out.push(' ');
            }
            out.push_str(piece);
            used += add;
        }
    }

    if out.is_empty() {
        return placeholder.trim_start().to_string();
    }
    out.push_str(placeholder);
    out
}

pub fn build_fact_block(passages: &[String], limit_chars: usize) -> String {
    let mut combined = Vec::new();
    let mut total = 0usize;
    for p in passages {
        let p = collapse_whitespace(p);
        let len = p.chars().count();
        if total + len > limit_chars {
            break;
        }
        total += len;
        combined.push(p);
    }

    combined
        .iter()
        .map(|p| format!("- {}", shorten(p, FACT_WIDTH, FACT_PLACEHOLDER)))
        .collect::<Vec<_>>()
        .join("\n")
}
