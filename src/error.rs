use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No Wikipedia passages found for topic: {topic}")]
    NoFacts { topic: String },

    #[error("No narration/images pair found in {dir}")]
    NoStoryPair { dir: PathBuf },

    #[error("No timestamped run directory found under {base}")]
    NoRunDir { base: PathBuf },

    #[error("Missing input file: {path}")]
    MissingInput { path: PathBuf },

    #[error("Command left no output file: {path}")]
    MissingOutput { path: PathBuf },

    #[error("No narration audio was generated ({failed} of {total} chunks failed)")]
    NoAudio { failed: usize, total: usize },

    #[error("No background videos found in {dir}")]
    NoBackgroundVideos { dir: PathBuf },

    #[error("No PNG images found in {dir}")]
    NoImages { dir: PathBuf },

    #[error("Command failed ({status}): {program}")]
    CommandFailed { program: String, status: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("min_words ({min}) must be positive and not exceed max_words ({max})")]
    WordRange { min: usize, max: usize },

    #[error("similarity_threshold must be in (0, 1], got {0}")]
    Threshold(f32),

    #[error("seed_topics must not be empty")]
    NoSeedTopics,

    #[error("{0} must not be empty")]
    EmptyCommand(&'static str),

    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },
}

#[derive(Error, Debug, PartialEq)]
pub enum PromptListError {
    #[error("no '=' assignment found")]
    MissingAssignment,

    #[error("expected '[' at offset {0}")]
    ExpectedOpenBracket(usize),

    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("unexpected character {found:?} at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("list is not closed with ']'")]
    Unclosed,

    #[error("story_{0} has no matching pic_prompts_{0}")]
    MissingPrompts(String),
}
