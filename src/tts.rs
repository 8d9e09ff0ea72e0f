use crate::config::{expand_command, Config};
use crate::error::PipelineError;
use crate::ffmpeg::{self, concat_list, run_cmd};
use crate::runs::{require_output, VOICE_FILE};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

const CHUNKS_DIR: &str = "voice/chunks";
const CONCAT_LIST: &str = "concat_list.txt";

fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if chars.peek().map(|(_, n)| *n) != Some(' ') {
            continue;
        }
        out.push(&text[start..i + c.len_utf8()]);
        while chars.peek().map(|(_, n)| *n) == Some(' ') {
            chars.next();
        }
        start = chars.peek().map(|(j, _)| *j).unwrap_or(text.len());
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}

pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for sentence in split_sentences(text) {
        if current.chars().count() + sentence.chars().count() <= max_chars {
            current.push(' ');
            current.push_str(sentence);
        } else {
            if !current.trim().is_empty() {
                chunks.push(current.trim().to_string());
            }
            current = sentence.to_string();
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }
    chunks
}

async fn clear_directory_contents(dir_path: &Path) -> Result<()> {
    if fs::metadata(dir_path).await.is_err() {
        return Ok(());
    }

    for entry in WalkDir::new(dir_path).min_depth(1).contents_first(true) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir(path).await.ok();
        } else {
            fs::remove_file(path).await.ok();
        }
    }

    Ok(())
}

async fn non_empty_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

pub async fn render_narration(cfg: &Config, text: &str, run_dir: &Path) -> Result<PathBuf> {
    let chunk_dir = run_dir.join(CHUNKS_DIR);
    clear_directory_contents(&chunk_dir).await?;
    fs::create_dir_all(&chunk_dir)
        .await
        .with_context(|| format!("Failed to create {}", chunk_dir.display()))?;

    let chunks = split_into_chunks(text, cfg.tts_chunk_chars);
    let mut rendered = Vec::new();
    for (idx, chunk) in chunks.iter().enumerate() {
        let name = format!("chunk_{}.wav", idx + 1);
        let out = chunk_dir.join(&name);
        logi(format!("Generating chunk {}/{}...", idx + 1, chunks.len()));

        let out_str = out.display().to_string();
        let argv = expand_command(&cfg.tts_command, &[("text", chunk.as_str()), ("out", out_str.as_str())]);
        if let Err(err) = run_cmd(&argv).await {
            logw(format!("Failed at chunk {}: {}", idx + 1, err));
            continue;
        }
        if !non_empty_file(&out).await {
            logw(format!("Skipped empty chunk {}", idx + 1));
            continue;
        }
        rendered.push(name);
    }

    if rendered.is_empty() {
        return Err(PipelineError::NoAudio {
            failed: chunks.len(),
            total: chunks.len(),
        }
        .into());
    }
    if rendered.len() < chunks.len() {
        logw(format!(
            "{} of {} chunks failed; narration will be shorter",
            chunks.len() - rendered.len(),
            chunks.len()
        ));
    }

    let list = chunk_dir.join(CONCAT_LIST);
    fs::write(&list, concat_list(&rendered)).await?;

    let voice = run_dir.join(VOICE_FILE);
    ffmpeg::ffmpeg_concat_audio(&list, &voice).await?;
    require_output(&voice).await?;
    logok(format!("Saved narration audio: {}", voice.display()));
    Ok(voice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences() {
        assert_eq!(
            split_sentences("One. Two!  Three? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("Pi is 3.14 today."), vec!["Pi is 3.14 today."]);
        assert!(split_sentences("").is_empty());
    }

    #[test]
    fn test_split_into_chunks_packs_sentences() {
        let text = "Aaaa aaaa. Bbbb bbbb. Cccc cccc.";
        assert_eq!(
            split_into_chunks(text, 22),
            vec!["Aaaa aaaa. Bbbb bbbb.", "Cccc cccc."]
        );
    }

    #[test]
    fn test_split_into_chunks_long_sentence_stands_alone() {
        let long = "x".repeat(150);
        let text = format!("Short one. {}. Tail.", long);
        let chunks = split_into_chunks(&text, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "Short one.");
        assert_eq!(chunks[1], format!("{}.", long));
        assert_eq!(chunks[2], "Tail.");
    }

    #[tokio::test]
    async fn test_render_narration_all_chunks_failing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            tts_command: vec!["false".to_string()],
            ..Config::default()
        };
        let err = render_narration(&cfg, "One. Two.", dir.path()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoAudio { failed: 1, total: 1 })
        ));
    }

    #[tokio::test]
    async fn test_render_narration_skips_empty_outputs() {
        let dir = tempfile::tempdir().unwrap();
        // `touch` succeeds but leaves a zero-length file.
        let cfg = Config {
            tts_command: vec!["touch".to_string(), "{out}".to_string()],
            ..Config::default()
        };
        let err = render_narration(&cfg, "Hello there.", dir.path()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoAudio { .. })
        ));
    }
}
