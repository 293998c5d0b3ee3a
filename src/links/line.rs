//! The stored `Label | URL` line format.

use std::fmt;

pub const SEPARATOR: &str = " | ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLine {
    pub label: String,
    pub url: String,
}

impl LinkLine {
    pub fn new(label: &str, url: &str) -> Self {
        Self {
            label: clean_label(label),
            url: url.to_string(),
        }
    }
}

impl fmt::Display for LinkLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.label, SEPARATOR, self.url)
    }
}

/// Labels must not contain the separator, a comma or a line break: each of
/// those would split the stored line when it is sanitized again.
pub fn clean_label(label: &str) -> String {
    label
        .split(|c: char| c == '|' || c == ',' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// URL portion of each stored line: text after the last pipe, or the whole
/// line when there is none. Blank lines are skipped.
pub fn stored_urls(product_url: &str) -> Vec<String> {
    product_url
        .lines()
        .filter_map(|line| {
            let url = line.rsplit('|').next().unwrap_or(line).trim();
            (!url.is_empty()).then(|| url.to_string())
        })
        .collect()
}
