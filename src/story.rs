use crate::api::embeddings::Embedder;
use crate::api::llm::{ChatModel, ChatParams};
use crate::api::wikipedia::{build_fact_block, FactSource};
use crate::config::Config;
use crate::error::PipelineError;
use crate::guard::SimilarityGuard;
use crate::prompts::{format_image_prompt_list, format_story_variables, parse_numbered_list, MAX_PROMPTS};
use crate::store::ScriptStore;
use crate::text::{enforce_word_range, sanitize_narration, word_count};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

const MAX_LENGTH_REWRITES: usize = 2;

const GEN_PROMPT: &str = "You write YouTube Shorts narration scripts between 300 and 500 words.\n\
Use ONLY the provided facts; do not copy sentences from sources.\n\
Start with a 1-sentence hook that creates curiosity.\n\
Keep sentences short for TTS. Include exactly one twist.\n\
End with a 1-sentence punch.\n\
Write only the narration text. Do not include lists, headings, or meta notes.";

const REWRITE_PROMPT: &str = "Rewrite the script with a different storytelling angle and vocabulary, \
keeping the same facts. Expand if under 300 words. Keep it between 300 and 500 words. \
New hook, new twist, new punch. Write only narration text.";

const IMAGE_PROMPT_SYSTEM: &str = "Return ONLY a numbered list from 1 to 10 of image prompts. \
Each line MUST contain a single prompt. \
No preface, no system/user/assistant text, no extra lines.";

#[derive(Debug, Clone)]
pub struct StoryFiles {
    pub topic: String,
    pub narration: String,
    pub prompts: Vec<String>,
    pub narration_path: PathBuf,
    pub images_path: PathBuf,
}

pub struct StoryWriter<'a> {
    cfg: &'a Config,
    llm: &'a dyn ChatModel,
    embedder: &'a dyn Embedder,
    facts: &'a dyn FactSource,
    store: &'a ScriptStore,
}

impl<'a> StoryWriter<'a> {
    pub fn new(
        cfg: &'a Config,
        llm: &'a dyn ChatModel,
        embedder: &'a dyn Embedder,
        facts: &'a dyn FactSource,
        store: &'a ScriptStore,
    ) -> Self {
        Self {
            cfg,
            llm,
            embedder,
            facts,
            store,
        }
    }

    fn narration_params(&self) -> ChatParams {
        ChatParams {
            temperature: self.cfg.temperature,
            top_p: self.cfg.top_p,
            max_new_tokens: self.cfg.max_new_tokens,
        }
    }

    pub async fn pick_topic<R: Rng>(&self, rng: &mut R) -> Result<String> {
        let recent = self.store.recent_topics(self.cfg.topic_cooldown_days)?;
        let mut topics = self.cfg.seed_topics.clone();
        topics.shuffle(rng);

        for topic in &topics {
            if recent.contains(topic) {
                continue;
            }
            if self.facts.page_exists(topic).await? {
                return Ok(topic.clone());
            }
        }

        logw("Every seed topic is cooling down or missing; picking one at random");
        topics
            .choose(rng)
            .cloned()
            .context("seed_topics is empty")
    }

    pub async fn generate_script(&self, topic: &str, fact_block: &str) -> Result<String> {
        let user_msg = format!(
            "Topic: {}\nFacts (from Wikipedia):\n{}\nConstraints: {}–{} words.",
            topic, fact_block, self.cfg.min_words, self.cfg.max_words
        );
        let draft = self
            .llm
            .chat(GEN_PROMPT, &user_msg, self.narration_params())
            .await?;
        Ok(sanitize_narration(&draft))
    }

    pub async fn rewrite_script(&self, original: &str, fact_block: &str) -> Result<String> {
        let user_msg = format!("Facts:\n{}\n---\nOriginal script:\n{}", fact_block, original);
        let rewrite = self
            .llm
            .chat(REWRITE_PROMPT, &user_msg, self.narration_params())
            .await?;
        Ok(sanitize_narration(&rewrite))
    }

    pub async fn generate_image_prompts(&self, topic: &str) -> Result<Vec<String>> {
        let params = ChatParams {
            temperature: self.cfg.prompt_temperature,
            top_p: self.cfg.top_p,
            max_new_tokens: self.cfg.prompt_max_new_tokens,
        };
        let raw = self
            .llm
            .chat(IMAGE_PROMPT_SYSTEM, &format!("Topic: {}", topic), params)
            .await?;
        Ok(finish_image_prompts(topic, parse_numbered_list(&raw)))
    }

    fn enforce(&self, text: String) -> String {
        enforce_word_range(&text, self.cfg.min_words, self.cfg.max_words)
    }

    pub async fn write_story<R: Rng>(&self, rng: &mut R) -> Result<StoryFiles> {
        let topic = self.pick_topic(rng).await?;
        logi(format!("Topic: {}", topic));

        let passages = self.facts.passages(&topic, self.cfg.max_passages).await?;
        if passages.is_empty() {
            return Err(PipelineError::NoFacts { topic }.into());
        }
        let fact_block = build_fact_block(&passages, self.cfg.fact_char_limit);

        let draft = self.generate_script(&topic, &fact_block).await?;
        let mut draft = self.enforce(draft);

        let mut attempts = 0;
        while word_count(&draft) < self.cfg.min_words && attempts < MAX_LENGTH_REWRITES {
            logi(format!(
                "Draft has {} words (< {}); rewriting",
                word_count(&draft),
                self.cfg.min_words
            ));
            draft = self.enforce(self.rewrite_script(&draft, &fact_block).await?);
            attempts += 1;
        }

        let past = self.store.recent_texts(self.cfg.past_k)?;
        let guard = SimilarityGuard::new(self.embedder, self.cfg.similarity_threshold);
        let sim = guard.most_similar(&draft, &past).await?;
        if guard.is_repetitive(sim) {
            logw(format!("Draft similarity {:.3} >= {:.2}; rewriting once", sim, self.cfg.similarity_threshold));
            draft = self.enforce(self.rewrite_script(&draft, &fact_block).await?);
        }

        let prompts = self.generate_image_prompts(&topic).await?;

        self.store.save(&topic, &draft)?;
        let (narration_path, images_path) =
            save_story_files(&self.cfg.output_dir, &topic, &draft, &prompts, Local::now()).await?;

        logok(format!("Narration ({} words): {}", word_count(&draft), narration_path.display()));
        logok(format!("Image prompts: {}", images_path.display()));
        tracing::debug!("\n{}", format_story_variables(1, &draft, &prompts));

        Ok(StoryFiles {
            topic,
            narration: draft,
            prompts,
            narration_path,
            images_path,
        })
    }
}

pub fn finish_image_prompts(topic: &str, prompts: Vec<String>) -> Vec<String> {
    let topic_lower = topic.to_lowercase();
    let mut out: Vec<String> = prompts
        .into_iter()
        .map(|p| {
            if p.to_lowercase().contains(&topic_lower) {
                p
            } else {
                format!("{}: {}", topic, p)
            }
        })
        .collect();
    while out.len() < MAX_PROMPTS {
        out.push(format!("{}: cinematic wide shot, detailed, high resolution", topic));
    }
    out.truncate(MAX_PROMPTS);
    out
}

pub fn story_base_name(topic: &str, now: DateTime<Local>) -> String {
    let digest = Sha256::digest(topic.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}_{}", now.format("%Y-%m-%d_%H-%M"), &hex[..10])
}

pub async fn save_story_files(
    output_dir: &Path,
    topic: &str,
    narration: &str,
    prompts: &[String],
    now: DateTime<Local>,
) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let base = story_base_name(topic, now);
    let narr_path = output_dir.join(format!("{}_narration.txt", base));
    let img_path = output_dir.join(format!("{}_images.txt", base));

    fs::write(&narr_path, sanitize_narration(narration)).await?;
    fs::write(&img_path, format_image_prompt_list("images_prompt", prompts)).await?;
    Ok((narr_path, img_path))
}
