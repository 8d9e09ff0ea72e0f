use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

// Chat-template leftovers and prompt echoes a local model tends to repeat.
static META_PATTERNS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)^\s*system\b.*$",
        r"(?i)^\s*user\b.*$",
        r"(?i)^\s*assistant\b.*$",
        r"(?i)^\s*Cutting Knowledge Date:.*$",
        r"(?i)^\s*Today Date:.*$",
        r"(?i)^\s*You write YouTube Shorts narration scripts.*$",
        r"(?i)^\s*Use ONLY the provided facts.*$",
        r"(?i)^\s*Start with a 1-sentence hook.*$",
        r"(?i)^\s*Keep sentences short for TTS.*$",
        r"(?i)^\s*End with a 1-sentence punch.*$",
        r"(?i)^\s*Write only the narration text.*$",
        r"(?i)^\s*Topic:.*$",
        r"(?i)^\s*Facts \(from Wikipedia\):.*$",
        r"(?i)^\s*Constraints:.*$",
    ])
    .expect("meta patterns are valid")
});

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{2,}").expect("paragraph regex is valid"));

pub fn strip_meta_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !META_PATTERNS.is_match(line))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn sanitize_narration(text: &str) -> String {
    let text = strip_meta_lines(text);
    let mut best: Option<&str> = None;
    for part in PARAGRAPH_BREAK.split(&text).map(str::trim) {
        if part.is_empty() {
            continue;
        }
        if best.is_none_or(|b| part.len() > b.len()) {
            best = Some(part);
        }
    }
    match best {
        Some(part) => part.to_string(),
        None => text.trim().to_string(),
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn enforce_word_range(text: &str, _min_words: usize, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > max_words {
        return words[..max_words].join(" ");
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_meta_lines() {
        let raw = "system\nCutting Knowledge Date: December 2023\nuser\nTopic: Neon\n\nNeon glows red.\nassistant\nIt is a noble gas.";
        assert_eq!(strip_meta_lines(raw), "Neon glows red.\nIt is a noble gas.");
    }

    #[test]
    fn test_strip_meta_is_case_insensitive() {
        let raw = "CONSTRAINTS: 300 words\nThe text.";
        assert_eq!(strip_meta_lines(raw), "The text.");
    }

    #[test]
    fn test_sanitize_keeps_longest_paragraph() {
        // Blank lines are removed by strip_meta_lines, so the reply collapses
        // into one paragraph.
        let raw = "Short intro.\n\nA much longer paragraph with the actual narration.";
        assert_eq!(
            sanitize_narration(raw),
            "Short intro.\nA much longer paragraph with the actual narration."
        );
    }

    #[test]
    fn test_sanitize_empty_reply() {
        assert_eq!(sanitize_narration("assistant\n\n"), "");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\tthree\nfour "), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_enforce_truncates_to_exact_max() {
        let text = "a b c d e f g";
        let out = enforce_word_range(text, 2, 5);
        assert_eq!(out, "a b c d e");
        assert_eq!(word_count(&out), 5);
    }

    #[test]
    fn test_enforce_leaves_short_text_unchanged() {
        let text = "one  two\nthree";
        assert_eq!(enforce_word_range(text, 10, 20), text);
    }

    #[test]
    fn test_enforce_exact_max_unchanged() {
        let text = "one two  three";
        assert_eq!(enforce_word_range(text, 1, 3), text);
    }
}
