pub mod embeddings;
pub mod llm;
pub mod wikipedia;

const BODY_SNIPPET_CHARS: usize = 800;

pub(crate) fn body_snippet(raw: &str) -> String {
    raw.chars().take(BODY_SNIPPET_CHARS).collect()
}
