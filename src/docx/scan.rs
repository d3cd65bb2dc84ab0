use regex::Regex;

use crate::docx::pattern::VariablePattern;
use crate::error::{Result, TemplateError};

/// A placeholder occurrence in flattened paragraph text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMatch {
    /// Byte offset of the first delimiter byte.
    pub start: usize,
    /// Byte offset one past the last delimiter byte.
    pub end: usize,
    /// The full wrapped token, delimiters included.
    pub token: String,
}

/// Non-greedy placeholder scanner for one delimiter pair.
///
/// Delimiters are matched literally; characters significant to the pattern
/// language are escaped before compilation. The scanner reports every
/// token, known or not — filtering against the catalog is the caller's job,
/// which is what leaves unknown tokens verbatim in the output.
pub struct PlaceholderScanner {
    regex: Regex,
}

impl PlaceholderScanner {
    /// Compile a scanner for the given delimiter pair.
    pub fn new(pattern: &VariablePattern) -> Result<Self> {
        let source = format!(
            "{}(?s:.*?){}",
            regex::escape(&pattern.prefix),
            regex::escape(&pattern.suffix)
        );
        let regex = Regex::new(&source).map_err(|e| TemplateError::Pattern(e.to_string()))?;
        Ok(Self { regex })
    }

    /// All non-overlapping matches, left to right.
    pub fn find(&self, text: &str) -> Vec<TokenMatch> {
        self.regex
            .find_iter(text)
            .map(|m| TokenMatch {
                start: m.start(),
                end: m.end(),
                token: m.as_str().to_string(),
            })
            .collect()
    }
}
