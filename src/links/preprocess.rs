//! Text cleanup applied to raw admin input before any URL is looked at, and
//! the split of the cleaned text into per-URL entries.

use once_cell::sync::Lazy;
use regex::Regex;

static PERCENT_NEWLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)%0D%0A|%0A|%0D").expect("valid newline pattern"));

// `|` and `=` are excluded from the glue class so `Label|https://..` and
// `?u=https://..` stay on their line.
static GLUED_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([^\s|=])(https?://)").expect("valid glue pattern"));

static URL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<>"|]+"#).expect("valid token pattern"));

/// One URL candidate from admin input with the manual label of its line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUrlEntry {
    pub label: Option<String>,
    pub raw_url: String,
}

/// Run the cleanup steps in order. Returns one logical entry per line.
pub fn normalize_text(raw: &str) -> String {
    let text = PERCENT_NEWLINE.replace_all(raw, "\n");
    let text = normalize_unicode(&text);
    let text = text.replace(',', "\n");
    let text = GLUED_URL.replace_all(&text, "${1}\n${2}");
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{00A0}' => out.push(' '),
            '\u{2028}' | '\u{2029}' => out.push('\n'),
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Split one cleaned line into its manual label and every URL token after it.
pub fn parse_line(line: &str) -> Vec<RawUrlEntry> {
    let (label, urls) = match line.split_once('|') {
        Some((label, rest)) => {
            let label = label.trim();
            ((!label.is_empty()).then(|| label.to_string()), rest)
        }
        None => (None, line),
    };
    URL_TOKEN
        .find_iter(urls)
        .map(|m| RawUrlEntry {
            label: label.clone(),
            raw_url: m.as_str().to_string(),
        })
        .collect()
}

/// Normalize `raw` and return its entries in encounter order.
pub fn extract_entries(raw: &str) -> Vec<RawUrlEntry> {
    normalize_text(raw).lines().flat_map(parse_line).collect()
}
