use crate::error::PromptListError;
use crate::text::strip_meta_lines;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

pub const MAX_PROMPTS: usize = 10;

static NUM_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{1,2})\.\s+(.*\S)\s*$").expect("numbered line regex is valid"));

static STORY_ASSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(story|pic_prompts)_(\w+)[ \t]*=[ \t]*")
        .expect("story assignment regex is valid")
});

// Stops at the first unnumbered line once the list has started.
pub fn parse_numbered_list(text: &str) -> Vec<String> {
    let text = strip_meta_lines(text);
    let mut prompts: Vec<(u32, String)> = Vec::new();
    let mut found_numbered = false;

    for line in text.lines() {
        if let Some(caps) = NUM_LINE.captures(line) {
            found_numbered = true;
            let idx: u32 = caps[1].parse().unwrap_or(0);
            let content = caps[2].trim();
            if (1..=MAX_PROMPTS as u32).contains(&idx) && !content.is_empty() {
                prompts.push((idx, content.to_string()));
            }
        } else if found_numbered {
            break;
        }
    }

    if !prompts.is_empty() {
        prompts.sort_by_key(|(idx, _)| *idx);
        return prompts
            .into_iter()
            .map(|(_, content)| content)
            .take(MAX_PROMPTS)
            .collect();
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(MAX_PROMPTS)
        .map(str::to_string)
        .collect()
}

fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn push_list_body(lines: &mut Vec<String>, prompts: &[String]) {
    for (i, p) in prompts.iter().enumerate() {
        let sep = if i + 1 < prompts.len() { "," } else { "" };
        lines.push(format!("    \"{}\"{}", escape_literal(p), sep));
    }
    lines.push("]".to_string());
}

pub fn format_image_prompt_list(var_name: &str, prompts: &[String]) -> String {
    let mut lines = vec![format!("{} = [", var_name)];
    push_list_body(&mut lines, prompts);
    lines.join("\n")
}

pub fn format_story_variables(idx: usize, narration: &str, prompts: &[String]) -> String {
    let mut lines = vec![
        format!("story_{}=\"{}\"", idx, escape_literal(narration)),
        format!("pic_prompts_{} = [", idx),
    ];
    push_list_body(&mut lines, prompts);
    lines.join("\n")
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str, pos: usize) -> Self {
        Self { src, pos }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn string(&mut self) -> Result<String, PromptListError> {
        let start = self.pos;
        let quote = match self.bump() {
            Some(q @ ('"' | '\'')) => q,
            Some(found) => return Err(PromptListError::Unexpected { found, offset: start }),
            None => return Err(PromptListError::Unclosed),
        };

        let mut out = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(PromptListError::UnterminatedString(start)),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c @ ('\\' | '"' | '\'')) => out.push(c),
                    Some(c) => {
                        out.push('\\');
                        out.push(c);
                    }
                    None => return Err(PromptListError::UnterminatedString(start)),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn list(&mut self) -> Result<Vec<String>, PromptListError> {
        self.skip_trivia();
        if self.peek() != Some('[') {
            return Err(PromptListError::ExpectedOpenBracket(self.pos));
        }
        self.bump();

        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(']') => {
                    self.bump();
                    return Ok(items);
                }
                Some('"' | '\'') => items.push(self.string()?),
                Some(found) => return Err(PromptListError::Unexpected { found, offset: self.pos }),
                None => return Err(PromptListError::Unclosed),
            }

            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {}
                Some(found) => return Err(PromptListError::Unexpected { found, offset: self.pos }),
                None => return Err(PromptListError::Unclosed),
            }
        }
    }
}

pub fn parse_image_prompt_list(text: &str) -> Result<Vec<String>, PromptListError> {
    let eq = text.find('=').ok_or(PromptListError::MissingAssignment)?;
    let items = Cursor::new(text, eq + 1).list()?;
    Ok(items
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoryInput {
    pub id: String,
    pub story: String,
    pub prompts: Vec<String>,
}

pub fn parse_story_inputs(text: &str) -> Result<Vec<StoryInput>, PromptListError> {
    let mut stories: BTreeMap<String, String> = BTreeMap::new();
    let mut prompts: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for caps in STORY_ASSIGN.captures_iter(text) {
        let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let id = caps[2].to_string();
        let mut cursor = Cursor::new(text, whole);
        if &caps[1] == "story" {
            stories.insert(id, cursor.string()?);
        } else {
            prompts.insert(id, cursor.list()?);
        }
    }

    let mut out = Vec::with_capacity(stories.len());
    for (id, story) in stories {
        let list = prompts
            .remove(&id)
            .ok_or_else(|| PromptListError::MissingPrompts(id.clone()))?;
        out.push(StoryInput {
            id,
            story: story.trim().to_string(),
            prompts: list,
        });
    }
    out.sort_by(|a, b| {
        let ka = a.id.parse::<u64>().ok();
        let kb = b.id.parse::<u64>().ok();
        ka.cmp(&kb).then_with(|| a.id.cmp(&b.id))
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_list_sorted_and_bounded() {
        let raw = "3. third\n1. first\n11. eleven\n0. zero\n2. second";
        assert_eq!(parse_numbered_list(raw), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_numbered_list_stops_after_first_unnumbered_line() {
        let raw = "Here you go:\n1. a castle\n2. a moat\nHope this helps!\n3. not collected";
        assert_eq!(parse_numbered_list(raw), vec!["a castle", "a moat"]);
    }

    #[test]
    fn test_numbered_list_skips_meta_lines() {
        let raw = "assistant\n1. glowing tube\n2. gas discharge";
        assert_eq!(parse_numbered_list(raw), vec!["glowing tube", "gas discharge"]);
    }

    #[test]
    fn test_numbered_list_fallback_to_raw_lines() {
        let raw = "  a quokka smiling \n\n- a beach\n";
        assert_eq!(parse_numbered_list(raw), vec!["a quokka smiling", "- a beach"]);
    }

    #[test]
    fn test_numbered_list_out_of_range_only_falls_back() {
        // Numbered lines were seen but none were in range: fall back.
        let raw = "12. too big\n13. also too big";
        assert_eq!(parse_numbered_list(raw), vec!["12. too big", "13. also too big"]);
    }

    #[test]
    fn test_format_image_prompt_list() {
        let prompts = vec!["a \"quoted\" sky".to_string(), "back\\slash".to_string()];
        let text = format_image_prompt_list("images_prompt", &prompts);
        assert_eq!(
            text,
            "images_prompt = [\n    \"a \\\"quoted\\\" sky\",\n    \"back\\\\slash\"\n]"
        );
        assert_eq!(parse_image_prompt_list(&text).unwrap(), prompts);
    }

    #[test]
    fn test_format_story_variables() {
        let text = format_story_variables(2, "Say \"hi\".", &["one".to_string()]);
        assert_eq!(text, "story_2=\"Say \\\"hi\\\".\"\npic_prompts_2 = [\n    \"one\"\n]");
    }

    #[test]
    fn test_parse_list_literal_variants() {
        let text = "x = [\n  'single',  # comment\n  \"  padded  \",\n  \"\",\n]\n";
        assert_eq!(parse_image_prompt_list(text).unwrap(), vec!["single", "padded"]);
    }

    #[test]
    fn test_parse_list_literal_errors() {
        assert_eq!(parse_image_prompt_list("[\"a\"]"), Err(PromptListError::MissingAssignment));
        assert_eq!(parse_image_prompt_list("x = \"a\""), Err(PromptListError::ExpectedOpenBracket(4)));
        assert_eq!(parse_image_prompt_list("x = [\"a\""), Err(PromptListError::Unclosed));
        assert!(matches!(
            parse_image_prompt_list("x = [\"a"),
            Err(PromptListError::UnterminatedString(_))
        ));
        assert!(matches!(
            parse_image_prompt_list("x = [1, 2]"),
            Err(PromptListError::Unexpected { found: '1', .. })
        ));
    }

    #[test]
    fn test_parse_story_inputs() {
        let text = r#"
story_10="Tenth story."
pic_prompts_10 = [
    "ten"
]

story_2="It’s a \"second\" story."
pic_prompts_2 = [
    "two a",
    "two b"
]
"#;
        let stories = parse_story_inputs(text).unwrap();
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].id, "2");
        assert_eq!(stories[0].story, "It’s a \"second\" story.");
        assert_eq!(stories[0].prompts, vec!["two a", "two b"]);
        assert_eq!(stories[1].id, "10");
    }

    #[test]
    fn test_story_without_prompts_rejected() {
        let text = "story_1=\"Lonely.\"\n";
        assert_eq!(
            parse_story_inputs(text),
            Err(PromptListError::MissingPrompts("1".to_string()))
        );
    }
}
