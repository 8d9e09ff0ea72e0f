use crate::api::embeddings::OpenAiCompatEmbedder;
use crate::api::llm::OpenAiCompatChat;
use crate::api::wikipedia::WikiClient;
use crate::background::make_background;
use crate::compose::compose_final;
use crate::config::Config;
use crate::imager::render_images;
use crate::prompts::parse_story_inputs;
use crate::runs::{
    create_run_dir, newest_pair, read_image_prompts, read_narration, require_latest_run_dir, write_prompts_json,
};
use crate::store::ScriptStore;
use crate::story::{StoryFiles, StoryWriter};
use crate::tts::render_narration;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl PipelineSummary {
    fn record<T>(&mut self, label: &str, result: Result<T>) {
        match result {
            Ok(_) => {
                self.succeeded += 1;
                logok(format!("DONE: {}", label));
            }
            Err(err) => {
                self.failed += 1;
                logw(format!("FAILED: {}: {:#}", label, err));
            }
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

struct Services {
    chat: OpenAiCompatChat,
    embedder: OpenAiCompatEmbedder,
    wiki: WikiClient,
    store: ScriptStore,
}

impl Services {
    fn connect(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            chat: OpenAiCompatChat::new(client.clone(), cfg),
            embedder: OpenAiCompatEmbedder::new(client.clone(), cfg),
            wiki: WikiClient::new(client, cfg),
            store: ScriptStore::open(&cfg.db_path)?,
        })
    }

    fn writer<'a>(&'a self, cfg: &'a Config) -> StoryWriter<'a> {
        StoryWriter::new(cfg, &self.chat, &self.embedder, &self.wiki, &self.store)
    }
}

pub async fn run_pipeline(cfg: &Config, count: usize) -> Result<PipelineSummary> {
    let services = Services::connect(cfg)?;
    let writer = services.writer(cfg);
    let mut rng = StdRng::seed_from_u64(now_seed());
    let mut summary = PipelineSummary::default();

    for run in 1..=count {
        logi(format!("=== Run {}/{} ===", run, count));
        let result = write_and_render(cfg, &writer, &mut rng).await;
        summary.record(&format!("run {}", run), result);
    }

    logi(format!(
        "All done. Succeeded: {}, failed: {}",
        summary.succeeded, summary.failed
    ));
    Ok(summary)
}

async fn write_and_render<R: Rng>(cfg: &Config, writer: &StoryWriter<'_>, rng: &mut R) -> Result<PathBuf> {
    let story = writer.write_story(rng).await?;
    make_video_from_pair(cfg, &story.narration_path, &story.images_path, rng).await
}

pub async fn write_only(cfg: &Config) -> Result<StoryFiles> {
    let services = Services::connect(cfg)?;
    let mut rng = StdRng::seed_from_u64(now_seed());
    services.writer(cfg).write_story(&mut rng).await
}

pub async fn render_latest(cfg: &Config) -> Result<PathBuf> {
    let (narration, images) = newest_pair(&cfg.output_dir).await?;
    let mut rng = StdRng::seed_from_u64(now_seed());
    make_video_from_pair(cfg, &narration, &images, &mut rng).await
}

pub async fn make_video_from_pair<R: Rng>(
    cfg: &Config,
    narration_path: &Path,
    images_path: &Path,
    rng: &mut R,
) -> Result<PathBuf> {
    logi(format!("Rendering {}", narration_path.display()));
    let narration = read_narration(narration_path).await?;
    let prompts = read_image_prompts(images_path).await?;
    render_story(cfg, &narration, &prompts, rng).await
}

pub async fn render_story<R: Rng>(cfg: &Config, narration: &str, prompts: &[String], rng: &mut R) -> Result<PathBuf> {
    if prompts.is_empty() {
        logw("No image prompts for this story");
    }
    let run_dir = create_run_dir(&cfg.runs_root).await?;
    let prompts_json = write_prompts_json(&run_dir, prompts).await?;

    render_narration(cfg, narration, &run_dir).await?;
    make_background(cfg, &run_dir, rng).await?;
    render_images(cfg, &prompts_json, &run_dir).await?;
    compose_final(cfg, &run_dir, rng).await
}

pub async fn run_batch(cfg: &Config, inputs_file: &Path) -> Result<PipelineSummary> {
    let text = fs::read_to_string(inputs_file)
        .await
        .with_context(|| format!("Failed to read story inputs: {}", inputs_file.display()))?;
    let stories = parse_story_inputs(&text)
        .with_context(|| format!("Invalid story inputs: {}", inputs_file.display()))?;
    logi(format!("{} stories in {}", stories.len(), inputs_file.display()));

    let mut rng = StdRng::seed_from_u64(now_seed());
    let mut summary = PipelineSummary::default();
    for input in &stories {
        logi(format!("=== Story {} ===", input.id));
        let result = render_story(cfg, &input.story, &input.prompts, &mut rng).await;
        summary.record(&format!("story {}", input.id), result);
    }
    Ok(summary)
}

pub async fn stage_tts(cfg: &Config, text: &str) -> Result<PathBuf> {
    let run_dir = create_run_dir(&cfg.runs_root).await?;
    render_narration(cfg, text, &run_dir).await
}

pub async fn stage_crop(cfg: &Config) -> Result<PathBuf> {
    let run_dir = require_latest_run_dir(&cfg.runs_root).await?;
    let mut rng = StdRng::seed_from_u64(now_seed());
    make_background(cfg, &run_dir, &mut rng).await
}

pub async fn stage_images(cfg: &Config, prompts_json: &Path) -> Result<Vec<PathBuf>> {
    let run_dir = require_latest_run_dir(&cfg.runs_root).await?;
    render_images(cfg, prompts_json, &run_dir).await
}

pub async fn stage_compose(cfg: &Config) -> Result<PathBuf> {
    let run_dir = require_latest_run_dir(&cfg.runs_root).await?;
    let mut rng = StdRng::seed_from_u64(now_seed());
    compose_final(cfg, &run_dir, &mut rng).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::guard::tests::LetterEmbedder;
    use crate::runs::{is_run_dir_name, latest_timestamped_dir, read_prompts_json, PROMPTS_FILE};
    use crate::story::tests::{ScriptedChat, StaticFacts};

    fn offline_cfg(root: &Path) -> Config {
        Config {
            output_dir: root.join("outputs"),
            runs_root: root.join("runs"),
            video_folder: root.join("vids"),
            tts_command: vec!["false".to_string()],
            ..Config::default()
        }
    }

    #[test]
    fn test_summary_records_outcomes() {
        let mut summary = PipelineSummary::default();
        summary.record("a", Ok(()));
        summary.record::<()>("b", Err(anyhow::anyhow!("boom")));
        summary.record("c", Ok(1));
        assert_eq!(summary, PipelineSummary { succeeded: 2, failed: 1 });
        assert!(!summary.all_succeeded());
        assert!(PipelineSummary::default().all_succeeded());
    }

    #[tokio::test]
    async fn test_render_story_stops_at_failed_narration() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = offline_cfg(dir.path());
        fs::create_dir_all(&cfg.runs_root).await.unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let prompts = vec!["a fox".to_string()];
        let err = render_story(&cfg, "A short story.", &prompts, &mut rng).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::NoAudio { .. })));

        let run_dir = latest_timestamped_dir(&cfg.runs_root).await.unwrap().unwrap();
        assert!(is_run_dir_name(run_dir.file_name().unwrap().to_str().unwrap()));
        assert!(run_dir.join(PROMPTS_FILE).is_file());
    }

    #[tokio::test]
    async fn test_write_and_render_uses_the_written_pair() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            min_words: 5,
            max_words: 8,
            seed_topics: vec!["Neon".to_string()],
            ..offline_cfg(dir.path())
        };
        fs::create_dir_all(&cfg.runs_root).await.unwrap();

        let store = ScriptStore::open_in_memory().unwrap();
        let llm = ScriptedChat::new(&["glow glow glow glow glow glow", "1. tube"]);
        let facts = StaticFacts::new(&["Neon is a noble gas."]);
        let writer = StoryWriter::new(&cfg, &llm, &LetterEmbedder, &facts, &store);

        // A pair stamped in the future always wins an mtime scan.
        fs::create_dir_all(&cfg.output_dir).await.unwrap();
        let later = SystemTime::now() + std::time::Duration::from_secs(3600);
        for (name, body) in [("zz_narration.txt", "decoy"), ("zz_images.txt", "images_prompt = [\"decoy\"]")] {
            let path = cfg.output_dir.join(name);
            fs::write(&path, body).await.unwrap();
            std::fs::File::options().write(true).open(&path).unwrap().set_modified(later).unwrap();
        }

        let mut rng = StdRng::seed_from_u64(5);
        let err = write_and_render(&cfg, &writer, &mut rng).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::NoAudio { .. })));

        let run_dir = latest_timestamped_dir(&cfg.runs_root).await.unwrap().unwrap();
        let prompts = read_prompts_json(&run_dir.join(PROMPTS_FILE)).await.unwrap();
        assert_eq!(prompts[0], "Neon: tube");
    }

    #[tokio::test]
    async fn test_render_latest_without_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = offline_cfg(dir.path());
        fs::create_dir_all(&cfg.output_dir).await.unwrap();
        let err = render_latest(&cfg).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::NoStoryPair { .. })));
    }

    #[tokio::test]
    async fn test_run_batch_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = offline_cfg(dir.path());
        fs::create_dir_all(&cfg.runs_root).await.unwrap();
        let inputs = dir.path().join("story_inputs.py");
        fs::write(
            &inputs,
            "story_1 = \"One story.\"\npic_prompts_1 = [\"a cat\"]\n",
        )
        .await
        .unwrap();

        let summary = run_batch(&cfg, &inputs).await.unwrap();
        assert_eq!(summary, PipelineSummary { succeeded: 0, failed: 1 });
    }

    #[tokio::test]
    async fn test_stages_need_a_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = offline_cfg(dir.path());
        fs::create_dir_all(&cfg.runs_root).await.unwrap();

        for err in [
            stage_crop(&cfg).await.unwrap_err(),
            stage_compose(&cfg).await.unwrap_err(),
        ] {
            assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::NoRunDir { .. })));
        }
    }
}
