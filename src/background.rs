use crate::config::Config;
use crate::error::PipelineError;
use crate::ffmpeg::{self, CropJob};
use crate::runs::{require_file, require_output, BACKGROUND_FILE, VOICE_FILE};
use crate::{logi, logok};
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;

const VIDEO_EXTS: &[&str] = &["mp4", "mov", "mkv"];

pub async fn list_videos(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(_) => return Ok(out),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|e| VIDEO_EXTS.iter().any(|x| e.eq_ignore_ascii_case(x)));
        if matches && entry.file_type().await?.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub fn short_duration(audio_secs: f64, padding_secs: f64) -> f64 {
    audio_secs + padding_secs
}

pub fn pick_start<R: Rng>(clip_secs: f64, short_secs: f64, rng: &mut R) -> f64 {
    let max_start = (clip_secs - short_secs).max(0.0);
    if max_start <= 0.0 {
        return 0.0;
    }
    rng.gen_range(0.0..=max_start)
}

pub fn crop_window_9_16(w: u32, h: u32) -> (u32, u32) {
    let new_w = ((h as u64 * 9 / 16) as u32).min(w) & !1;
    let x = (w - new_w) / 2;
    (new_w, x)
}

pub async fn make_background<R: Rng>(cfg: &Config, run_dir: &Path, rng: &mut R) -> Result<PathBuf> {
    let voice = run_dir.join(VOICE_FILE);
    require_file(&voice).await?;

    let videos = list_videos(&cfg.video_folder).await?;
    let video = videos
        .choose(rng)
        .cloned()
        .ok_or_else(|| PipelineError::NoBackgroundVideos { dir: cfg.video_folder.clone() })?;

    let audio_secs = ffmpeg::ffprobe_duration_seconds(&voice).await?;
    let clip_secs = ffmpeg::ffprobe_duration_seconds(&video).await?;
    let (w, h) = ffmpeg::ffprobe_video_dimensions(&video).await?;

    let wanted = short_duration(audio_secs, cfg.tail_padding_secs);
    let start = pick_start(clip_secs, wanted, rng);
    let duration = wanted.min(clip_secs - start);
    let (crop_w, crop_x) = crop_window_9_16(w, h);

    let job = CropJob {
        start,
        duration,
        crop_w,
        crop_h: h & !1,
        crop_x,
        audio_limit: audio_secs.min(duration),
    };
    logi(format!(
        "Background {} ({:.2}s clip) for {:.2}s narration",
        video.display(),
        clip_secs,
        audio_secs
    ));

    let out = run_dir.join(BACKGROUND_FILE);
    ffmpeg::ffmpeg_crop_with_audio(&video, &voice, &job, cfg.fps, &out)
        .await
        .context("Background render failed")?;
    require_output(&out).await?;
    logok(format!("Background clip: {}", out.display()));
    Ok(out)
}
