use crate::config::Config;
use crate::error::PipelineError;
use crate::ffmpeg;
use crate::runs::{require_file, require_output, BACKGROUND_FILE, FINAL_FILE, IMAGES_DIR, VOICE_FILE};
use crate::{logi, logok};
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySlot {
    pub image: PathBuf,
    pub start: f64,
    pub duration: f64,
}

pub fn plan_overlays(images: &[PathBuf], duration: f64) -> Result<Vec<OverlaySlot>, PipelineError> {
    if images.is_empty() {
        return Err(PipelineError::NoImages { dir: PathBuf::from(IMAGES_DIR) });
    }
    let slot = duration / images.len() as f64;
    Ok(images
        .iter()
        .enumerate()
        .map(|(i, image)| OverlaySlot {
            image: image.clone(),
            start: i as f64 * slot,
            duration: slot,
        })
        .collect())
}

pub fn overlay_height(video_height: u32, divisor: f64) -> u32 {
    let h = (video_height as f64 / divisor) as u32;
    (h & !1).max(2)
}

pub async fn list_pngs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(out),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_png = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if is_png && entry.file_type().await?.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

pub async fn compose_final<R: Rng>(cfg: &Config, run_dir: &Path, rng: &mut R) -> Result<PathBuf> {
    let video = run_dir.join(BACKGROUND_FILE);
    let audio = run_dir.join(VOICE_FILE);
    let image_dir = run_dir.join(IMAGES_DIR);
    let out = run_dir.join(FINAL_FILE);
    require_file(&video).await?;
    require_file(&audio).await?;

    let mut images = list_pngs(&image_dir).await?;
    if images.is_empty() {
        return Err(PipelineError::NoImages { dir: image_dir }.into());
    }
    images.shuffle(rng);

    let duration = ffmpeg::ffprobe_duration_seconds(&video).await?;
    let (_, height) = ffmpeg::ffprobe_video_dimensions(&video).await?;
    let slots = plan_overlays(&images, duration)?;
    let image_height = overlay_height(height, cfg.overlay_height_divisor);

    logi(format!(
        "Compositing {} images ({:.2}s each) over {}",
        slots.len(),
        duration / slots.len() as f64,
        video.display()
    ));
    ffmpeg::ffmpeg_overlay_images(
        &video,
        &audio,
        &slots,
        image_height,
        cfg.crossfade_secs,
        duration,
        cfg.fps,
        &out,
    )
    .await
    .context("Overlay render failed")?;
    require_output(&out).await?;

    logok(format!("Final video: {}", out.display()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_plan_overlays_even_slots() {
        let images: Vec<PathBuf> = ["a.png", "b.png", "c.png", "d.png"].into_iter().map(PathBuf::from).collect();
        let slots = plan_overlays(&images, 20.0).unwrap();
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[0].start, 0.0);
        assert_eq!(slots[3].start, 15.0);
        assert!(slots.iter().all(|s| s.duration == 5.0));
        assert_eq!(slots[2].image, PathBuf::from("c.png"));
    }

    #[test]
    fn test_plan_overlays_empty_is_error() {
        assert!(matches!(plan_overlays(&[], 10.0), Err(PipelineError::NoImages { .. })));
    }

    #[test]
    fn test_overlay_height() {
        assert_eq!(overlay_height(1080, 2.5), 432);
        assert_eq!(overlay_height(1081, 3.0), 360);
        assert_eq!(overlay_height(3, 2.5), 2);
    }

    #[tokio::test]
    async fn test_list_pngs_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["generated_2.png", "generated_1.PNG", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").await.unwrap();
        }
        fs::create_dir(dir.path().join("sub.png")).await.unwrap();

        let pngs = list_pngs(dir.path()).await.unwrap();
        let names: Vec<_> = pngs.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["generated_1.PNG", "generated_2.png"]);
    }

    #[tokio::test]
    async fn test_compose_without_images_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(BACKGROUND_FILE), b"v").await.unwrap();
        fs::create_dir_all(dir.path().join("voice")).await.unwrap();
        fs::write(dir.path().join(VOICE_FILE), b"a").await.unwrap();

        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let err = compose_final(&Config::default(), dir.path(), &mut rng).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::NoImages { .. })));
    }
}
