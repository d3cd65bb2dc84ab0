/// Placeholder delimiter pair.
///
/// A placeholder token is `prefix + inner name + suffix`. Both ends are
/// independently configurable and any literal string pair is legal,
/// including multi-character and asymmetric pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablePattern {
    pub prefix: String,
    pub suffix: String,
}

impl VariablePattern {
    /// Create a pattern from a literal delimiter pair.
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Wrap a bare key in this pattern, unless it is already wrapped.
    ///
    /// Callers may declare variables either as `name` or as `${name}`; both
    /// resolve to the same token.
    pub fn ensure_wrapped(&self, key: &str) -> String {
        if key.starts_with(&self.prefix)
            && key.ends_with(&self.suffix)
            && key.len() >= self.prefix.len() + self.suffix.len()
        {
            key.to_string()
        } else {
            format!("{}{}{}", self.prefix, key, self.suffix)
        }
    }
}

impl Default for VariablePattern {
    /// The conventional `${name}` pattern.
    fn default() -> Self {
        Self::new("${", "}")
    }
}
