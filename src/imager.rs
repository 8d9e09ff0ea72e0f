use crate::compose::list_pngs;
use crate::config::{expand_command, Config};
use crate::error::PipelineError;
use crate::ffmpeg::run_cmd;
use crate::runs::{require_file, IMAGES_DIR};
use crate::{logi, logok};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

pub async fn render_images(cfg: &Config, prompts_json: &Path, run_dir: &Path) -> Result<Vec<PathBuf>> {
    require_file(prompts_json).await?;
    let out_dir = run_dir.join(IMAGES_DIR);
    fs::create_dir_all(&out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let prompts = prompts_json.display().to_string();
    let out = out_dir.display().to_string();
    let argv = expand_command(&cfg.imager_command, &[("prompts", prompts.as_str()), ("out_dir", out.as_str())]);
    logi(format!("Generating images from {}", prompts_json.display()));
    run_cmd(&argv).await.context("Image generation failed")?;

    let images = list_pngs(&out_dir).await?;
    if images.is_empty() {
        return Err(PipelineError::NoImages { dir: out_dir }.into());
    }
    logok(format!("{} images in {}", images.len(), out_dir.display()));
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_with(cmd: &[&str]) -> Config {
        Config {
            imager_command: cmd.iter().map(|s| s.to_string()).collect(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_render_images_collects_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("prompts.json");
        fs::write(&json, r#"["a fox"]"#).await.unwrap();

        let cfg = cfg_with(&["sh", "-c", "touch \"$1/generated_0.png\" \"$1/generated_1.png\"", "sh", "{out_dir}"]);
        let images = render_images(&cfg, &json, dir.path()).await.unwrap();
        assert_eq!(images.len(), 2);
        assert!(images[0].ends_with("images/generated_0.png"));
    }

    #[tokio::test]
    async fn test_render_images_none_produced() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("prompts.json");
        fs::write(&json, "[]").await.unwrap();

        let err = render_images(&cfg_with(&["true"]), &json, dir.path()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::NoImages { .. })));
    }

    #[tokio::test]
    async fn test_render_images_command_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("prompts.json");
        fs::write(&json, "[]").await.unwrap();

        let err = render_images(&cfg_with(&["false"]), &json, dir.path()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::CommandFailed { .. })
        ));
    }
}
