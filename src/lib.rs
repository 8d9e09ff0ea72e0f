pub mod api;
pub mod background;
pub mod compose;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod guard;
pub mod imager;
pub mod init;
pub mod pipeline;
pub mod prompts;
pub mod runs;
pub mod store;
pub mod story;
pub mod text;
pub mod tts;

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!(tag, "{}", message),
        _ => tracing::info!(tag, "{}", message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
