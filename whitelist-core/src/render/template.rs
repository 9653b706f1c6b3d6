//! Base configuration templates with placeholder tokens

use super::{MAPS_PLACEHOLDER, RULES_PLACEHOLDER};

/// Forward-proxy configuration shipped with the binary
const BUILTIN_TEMPLATE: &str = include_str!("../../templates/forward-proxy.conf");

/// A base configuration containing placeholder tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    text: String,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The built-in forward-proxy template
    pub fn builtin() -> Self {
        Self::new(BUILTIN_TEMPLATE)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn contains(&self, placeholder: &str) -> bool {
        self.text.contains(placeholder)
    }

    /// Whether any known placeholder is still present
    pub fn has_placeholders(&self) -> bool {
        self.contains(MAPS_PLACEHOLDER) || self.contains(RULES_PLACEHOLDER)
    }

    /// Replace every occurrence of `placeholder` with `lines`
    ///
    /// Lines after the first are indented to the column of the placeholder
    /// when it is the first non-blank item on its line.
    pub fn substitute(&mut self, placeholder: &str, lines: &[String]) {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();

        while let Some(pos) = rest.find(placeholder) {
            let (before, after) = rest.split_at(pos);
            out.push_str(before);

            let line_start = out.rfind('\n').map(|i| i + 1).unwrap_or(0);
            let lead = &out[line_start..];
            let indent = if lead.chars().all(|c| c == ' ' || c == '\t') {
                lead.to_string()
            } else {
                String::new()
            };

            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                    if !line.is_empty() {
                        out.push_str(&indent);
                    }
                }
                out.push_str(line);
            }

            rest = &after[placeholder.len()..];
        }

        out.push_str(rest);
        self.text = out;
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Template {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
