//! Text normalisation for product names and descriptions
//!
//! Product descriptions arrive as HTML fragments. When cleaning is enabled the
//! client strips markup and punctuation noise so the stored text is plain,
//! lowercase and single-spaced.

use regex::Regex;

/// Compiled patterns used by [`TextCleaner::clean`]
#[derive(Debug, Clone)]
pub struct TextCleaner {
    tags: Regex,
    attribute_words: Regex,
    disallowed: Regex,
}

impl TextCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            tags: Regex::new(r"<[^>]+>")?,
            // leftovers of broken markup such as `img src` or `style`
            attribute_words: Regex::new(r"(?i)\b(p|img|id|style|src)\b")?,
            // keep Latin and Vietnamese letters, digits, whitespace and basic punctuation
            disallowed: Regex::new(r#"[^a-zA-Z0-9À-ỹà-ỹ\s.,!?():;"'-]"#)?,
        })
    }

    /// Normalise `text`; empty input stays empty
    pub fn clean(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }

        let text = self.tags.replace_all(text, " ");
        let text = self.attribute_words.replace_all(&text, " ");
        let text = self.disallowed.replace_all(&text, " ");

        text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
