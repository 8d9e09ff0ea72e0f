use crate::compose::OverlaySlot;
use crate::error::PipelineError;
use crate::logi;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

pub(crate) async fn run_cmd(args: &[String]) -> Result<()> {
    let Some((program, rest)) = args.split_first() else {
        return Ok(());
    };

    let status = Command::new(program)
        .args(rest)
        .status()
        .await
        .with_context(|| format!("Failed to start {}", program))?;
    if !status.success() {
        return Err(PipelineError::CommandFailed {
            program: program.clone(),
            status: status.to_string(),
        }
        .into());
    }

    Ok(())
}

fn ffmpeg_base() -> Vec<String> {
    ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn push_h264(args: &mut Vec<String>, fps: u32) {
    for a in [
        "-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "veryfast", "-crf", "22", "-c:a", "aac",
        "-b:a", "192k", "-movflags", "+faststart", "-r",
    ] {
        args.push(a.to_string());
    }
    args.push(fps.to_string());
}

pub async fn ffprobe_video_dimensions(path: &Path) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe execution failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed on {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let mut parts = text.split('x');
    let w = parts.next().and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(0);
    let h = parts.next().and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(0);

    if w == 0 || h == 0 {
        return Err(anyhow::anyhow!("Invalid dimensions for {}: {:?}", path.display(), text));
    }

    Ok((w, h))
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed on {}", path.display()));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.0 {
        return Err(anyhow::anyhow!("Invalid duration for {}: {:?}", path.display(), text));
    }
    Ok(duration)
}

fn concat_entry(name: &str) -> String {
    format!("file '{}'\n", name.replace('\'', "'\\''"))
}

pub fn concat_list(names: &[String]) -> String {
    names.iter().map(|n| concat_entry(n)).collect()
}

pub async fn ffmpeg_concat_audio(list_txt: &Path, out_wav: &Path) -> Result<()> {
    let mut args = ffmpeg_base();
    args.extend(
        [
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list_txt.display().to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            out_wav.display().to_string(),
        ]
        .into_iter(),
    );
    run_cmd(&args).await
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropJob {
    pub start: f64,
    pub duration: f64,
    pub crop_w: u32,
    pub crop_h: u32,
    pub crop_x: u32,
    pub audio_limit: f64,
}

pub fn crop_filter(job: &CropJob) -> String {
    format!(
        "[0:v]crop={}:{}:{}:0,setsar=1[v]",
        job.crop_w, job.crop_h, job.crop_x
    )
}

pub async fn ffmpeg_crop_with_audio(
    video: &Path,
    audio: &Path,
    job: &CropJob,
    fps: u32,
    out_mp4: &Path,
) -> Result<()> {
    let mut args = ffmpeg_base();
    args.extend([
        "-ss".to_string(),
        format!("{:.3}", job.start),
        "-t".to_string(),
        format!("{:.3}", job.duration),
        "-i".to_string(),
        video.display().to_string(),
        "-t".to_string(),
        format!("{:.3}", job.audio_limit),
        "-i".to_string(),
        audio.display().to_string(),
        "-filter_complex".to_string(),
        crop_filter(job),
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        "1:a".to_string(),
    ]);
    push_h264(&mut args, fps);
    args.push(out_mp4.display().to_string());

    logi(format!(
        "Cropping {:.2}s from {:.2}s of {} ({}x{} at x={})",
        job.duration,
        job.start,
        video.display(),
        job.crop_w,
        job.crop_h,
        job.crop_x
    ));
    run_cmd(&args).await
}

// Image `i` is filter input `i + 1`.
pub fn overlay_filter(slots: &[OverlaySlot], image_height: u32, crossfade: f64) -> String {
    let mut parts = Vec::with_capacity(slots.len() * 2);
    let mut prev = "0:v".to_string();

    for (i, slot) in slots.iter().enumerate() {
        let end = slot.start + slot.duration;
        let fade = crossfade.min(slot.duration / 2.0);
        parts.push(format!(
            "[{}:v]scale=-2:{},format=rgba,fade=t=in:st={:.3}:d={:.3}:alpha=1,fade=t=out:st={:.3}:d={:.3}:alpha=1[img{}]",
            i + 1,
            image_height,
            slot.start,
            fade,
            end - fade,
            fade,
            i
        ));
        let out = if i + 1 == slots.len() {
            "v".to_string()
        } else {
            format!("v{}", i)
        };
        parts.push(format!(
            "[{}][img{}]overlay=(W-w)/2:(H-h)/2:enable='between(t,{:.3},{:.3})'[{}]",
            prev, i, slot.start, end, out
        ));
        prev = out;
    }

    parts.join(";")
}

#[allow(clippy::too_many_arguments)]
pub async fn ffmpeg_overlay_images(
    base_video: &Path,
    narration: &Path,
    slots: &[OverlaySlot],
    image_height: u32,
    crossfade: f64,
    total_duration: f64,
    fps: u32,
    out_mp4: &Path,
) -> Result<()> {
    let mut args = ffmpeg_base();
    args.push("-i".to_string());
    args.push(base_video.display().to_string());
    for slot in slots {
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-t".to_string(),
            format!("{:.3}", total_duration),
            "-i".to_string(),
            slot.image.display().to_string(),
        ]);
    }
    args.push("-i".to_string());
    args.push(narration.display().to_string());

    args.push("-filter_complex".to_string());
    args.push(overlay_filter(slots, image_height, crossfade));
    args.extend([
        "-map".to_string(),
        "[v]".to_string(),
        "-map".to_string(),
        format!("{}:a", slots.len() + 1),
        "-t".to_string(),
        format!("{:.3}", total_duration),
    ]);
    push_h264(&mut args, fps);
    args.push(out_mp4.display().to_string());

    run_cmd(&args).await
}
