use crate::error::ConfigError;
use crate::logi;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder regex is valid"));

const DEFAULT_SEED_TOPICS: &[&str] = &[
    "Black holes", "Pompeii", "Tardigrades", "Hedy Lamarr", "Sagrada Família",
    "Antikythera mechanism", "Roanoke Colony", "Voyager 1", "Quokka", "Fibonacci",
    "Neon", "Basilisk", "Great Barrier Reef", "Quantum entanglement", "Library of Alexandria",
    "Stonehenge", "Machu Picchu", "Great Wall of China", "Terracotta Army", "Shackleton Expedition",
    "Rosetta Stone", "Eiffel Tower", "Mona Lisa", "Vincent van Gogh", "Leonardo da Vinci",
    "Nikola Tesla", "Marie Curie", "Albert Einstein", "Isaac Newton", "Charles Darwin",
    "Periodic Table", "DNA double helix", "CRISPR", "Apollo 11", "Saturn V",
    "Mars Rover Perseverance", "James Webb Space Telescope", "Andromeda Galaxy", "Supernova",
    "Aurora Borealis", "Volcano Krakatoa", "Mount Everest", "Sahara Desert", "Amazon Rainforest",
    "Giant Squid", "Komodo Dragon", "Platypus", "Axolotl", "Okapi", "Narwhal",
    "Dodo bird", "Passenger pigeon", "Woolly mammoth", "Saber-toothed cat",
    "Silk Road", "Roman Empire", "Maya Civilization", "Aztec Empire", "Inca Empire",
    "Vikings", "Samurai", "Spartans", "Medieval Knights", "Crusades",
    "Printing Press", "Steam Engine", "Light Bulb", "Telephone", "Internet",
    "Artificial Intelligence", "Blockchain", "Quantum Computing",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
    pub prompt_temperature: f32,
    pub prompt_max_new_tokens: u32,

    pub embedding_model: String,

    pub db_path: PathBuf,
    pub past_k: usize,
    pub similarity_threshold: f32,
    pub topic_cooldown_days: i64,

    pub min_words: usize,
    pub max_words: usize,

    pub seed_topics: Vec<String>,

    pub wikipedia_language: String,
    pub wikipedia_user_agent: String,
    pub max_passages: usize,
    pub fact_char_limit: usize,

    pub output_dir: PathBuf,
    pub runs_root: PathBuf,
    pub video_folder: PathBuf,

    // `{text}` and `{out}` are substituted per chunk.
    pub tts_command: Vec<String>,
    // `{prompts}` and `{out_dir}` are substituted once per run.
    pub imager_command: Vec<String>,

    pub tts_chunk_chars: usize,
    pub tail_padding_secs: f64,
    pub fps: u32,
    pub crossfade_secs: f64,
    pub overlay_height_divisor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_base_url: "http://localhost:11434/v1".to_string(),
            llm_model: "llama3.1:8b-instruct-q4_K_M".to_string(),
            llm_api_key: None,
            temperature: 0.8,
            top_p: 0.9,
            max_new_tokens: 768,
            prompt_temperature: 0.7,
            prompt_max_new_tokens: 256,
            embedding_model: "all-minilm".to_string(),
            db_path: PathBuf::from("memory.sqlite"),
            past_k: 50,
            similarity_threshold: 0.86,
            topic_cooldown_days: 30,
            min_words: 300,
            max_words: 500,
            seed_topics: DEFAULT_SEED_TOPICS.iter().map(|s| s.to_string()).collect(),
            wikipedia_language: "en".to_string(),
            wikipedia_user_agent: "fact-shorts/0.1 (local short-video pipeline)".to_string(),
            max_passages: 5,
            fact_char_limit: 1600,
            output_dir: PathBuf::from("outputs"),
            runs_root: PathBuf::from("."),
            video_folder: PathBuf::from("vids"),
            tts_command: ["tts", "--text", "{text}", "--out_path", "{out}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            imager_command: ["python", "run_imager.py", "{prompts}", "{out_dir}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tts_chunk_chars: 100,
            tail_padding_secs: 2.0,
            fps: 30,
            crossfade_secs: 0.5,
            overlay_height_divisor: 2.5,
        }
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                logi(format!("No config at {}; using defaults", path.display()));
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read config: {}", path.display()));
            }
        };
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_words == 0 || self.min_words > self.max_words {
            return Err(ConfigError::WordRange {
                min: self.min_words,
                max: self.max_words,
            });
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ConfigError::Threshold(self.similarity_threshold));
        }
        if self.seed_topics.is_empty() {
            return Err(ConfigError::NoSeedTopics);
        }
        if self.tts_command.is_empty() {
            return Err(ConfigError::EmptyCommand("tts_command"));
        }
        if self.imager_command.is_empty() {
            return Err(ConfigError::EmptyCommand("imager_command"));
        }
        if self.fps == 0 {
            return Err(ConfigError::NotPositive { name: "fps", value: 0.0 });
        }
        if self.overlay_height_divisor <= 0.0 {
            return Err(ConfigError::NotPositive {
                name: "overlay_height_divisor",
                value: self.overlay_height_divisor,
            });
        }
        if self.tts_chunk_chars == 0 {
            return Err(ConfigError::NotPositive { name: "tts_chunk_chars", value: 0.0 });
        }
        Ok(())
    }
}

pub fn expand_command(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            PLACEHOLDER
                .replace_all(arg, |caps: &Captures| {
                    vars.iter()
                        .find(|(key, _)| *key == &caps[1])
                        .map(|(_, value)| value.to_string())
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"min_words": 120, "max_words": 180}"#).unwrap();
        assert_eq!(cfg.min_words, 120);
        assert_eq!(cfg.max_words, 180);
        assert_eq!(cfg.past_k, 50);
        assert_eq!(cfg.output_dir, PathBuf::from("outputs"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let res: Result<Config, _> = serde_json::from_str(r#"{"min_wrods": 10}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_inverted_word_range_rejected() {
        let cfg = Config {
            min_words: 600,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::WordRange { min: 600, max: 500 })
        );
    }

    #[test]
    fn test_threshold_bounds() {
        let cfg = Config {
            similarity_threshold: 1.5,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::Threshold(1.5)));
    }

    #[test]
    fn test_expand_command() {
        let template = vec!["tts".to_string(), "--text={text}".to_string(), "{out}".to_string()];
        let argv = expand_command(&template, &[("text", "Hello there."), ("out", "a.wav")]);
        assert_eq!(argv, vec!["tts", "--text=Hello there.", "a.wav"]);
    }

    #[test]
    fn test_expand_command_leaves_substituted_text_alone() {
        let template = vec!["{text}".to_string(), "{out}".to_string(), "{voice}".to_string()];
        let argv = expand_command(&template, &[("text", "say {out} twice"), ("out", "a.wav")]);
        assert_eq!(argv, vec!["say {out} twice", "a.wav", "{voice}"]);
    }

    #[tokio::test]
    async fn test_unreadable_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists at the path but cannot be read as a file.
        assert!(Config::load(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path().join("config.json")).await.unwrap();
        assert_eq!(cfg.max_words, 500);
    }
}
