use crate::error::PipelineError;
use crate::prompts::parse_image_prompt_list;
use crate::{logi, logw};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Timelike};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;

pub const RUN_DIR_LEN: usize = 12;
const NARRATION_SUFFIX: &str = "_narration.txt";
const IMAGES_SUFFIX: &str = "_images.txt";

pub const VOICE_FILE: &str = "voice/final_output.wav";
pub const BACKGROUND_FILE: &str = "vid_no_pic.mp4";
pub const PROMPTS_FILE: &str = "prompts.json";
pub const IMAGES_DIR: &str = "images";
pub const FINAL_FILE: &str = "Final.mp4";

pub fn is_run_dir_name(name: &str) -> bool {
    name.len() == RUN_DIR_LEN && name.bytes().all(|b| b.is_ascii_digit())
}

// Run directory names sort chronologically.
pub async fn latest_timestamped_dir(base: &Path) -> Result<Option<PathBuf>> {
    let mut best: Option<(String, PathBuf)> = None;
    let mut entries = fs::read_dir(base)
        .await
        .with_context(|| format!("Failed to list {}", base.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_run_dir_name(&name) {
            continue;
        }
        if best.as_ref().is_none_or(|(b, _)| name > *b) {
            best = Some((name, entry.path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

pub async fn require_latest_run_dir(base: &Path) -> Result<PathBuf> {
    latest_timestamped_dir(base)
        .await?
        .ok_or_else(|| PipelineError::NoRunDir { base: base.to_path_buf() }.into())
}

pub fn run_dir_name(now: DateTime<Local>) -> String {
    now.format("%Y%m%d%H%M").to_string()
}

// Waits for the next minute when this one is already taken.
pub async fn create_run_dir(base: &Path) -> Result<PathBuf> {
    loop {
        let now = Local::now();
        let dir = base.join(run_dir_name(now));
        match fs::create_dir(&dir).await {
            Ok(()) => {
                logi(format!("Run directory: {}", dir.display()));
                return Ok(dir);
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let wait = 60 - u64::from(now.second()) + 1;
                logw(format!("{} already exists; waiting {}s for the next minute", dir.display(), wait));
                tokio::time::sleep(Duration::from_secs(wait)).await;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to create {}", dir.display()));
            }
        }
    }
}

async fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

pub async fn list_pairs(dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut narrations: Vec<(String, PathBuf)> = Vec::new();
    let mut images: HashMap<String, PathBuf> = HashMap::new();

    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(base) = name.strip_suffix(NARRATION_SUFFIX) {
            narrations.push((base.to_string(), entry.path()));
        } else if let Some(base) = name.strip_suffix(IMAGES_SUFFIX) {
            images.insert(base.to_string(), entry.path());
        }
    }

    let mut pairs = Vec::new();
    for (base, narr) in narrations {
        if let Some(img) = images.remove(&base) {
            let newest = modified(&narr).await.max(modified(&img).await);
            pairs.push((newest, narr, img));
        }
    }
    pairs.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(pairs.into_iter().map(|(_, n, i)| (n, i)).collect())
}

pub async fn newest_pair(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    list_pairs(dir)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::NoStoryPair { dir: dir.to_path_buf() }.into())
}

pub async fn read_narration(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read narration: {}", path.display()))?;
    Ok(text.trim().to_string())
}

pub async fn read_image_prompts(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read image prompts: {}", path.display()))?;
    match parse_image_prompt_list(&text) {
        Ok(prompts) => Ok(prompts),
        Err(err) => {
            logw(format!("Error parsing image prompts from {}: {}", path.display(), err));
            Ok(Vec::new())
        }
    }
}

pub async fn write_prompts_json(run_dir: &Path, prompts: &[String]) -> Result<PathBuf> {
    let path = run_dir.join(PROMPTS_FILE);
    let json = serde_json::to_string_pretty(prompts)?;
    fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub async fn read_prompts_json(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid prompts JSON: {}", path.display()))
}

pub async fn require_file(path: &Path) -> Result<()> {
    match fs::metadata(path).await {
        Ok(m) if m.is_file() => Ok(()),
        _ => Err(PipelineError::MissingInput { path: path.to_path_buf() }.into()),
    }
}

pub async fn require_output(path: &Path) -> Result<()> {
    match fs::metadata(path).await {
        Ok(m) if m.is_file() && m.len() > 0 => Ok(()),
        _ => Err(PipelineError::MissingOutput { path: path.to_path_buf() }.into()),
    }
}
