use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

static WORD_JOINERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[_-]+").expect("valid joiner pattern"));

/// Fallback label built from the URL itself: the last path segment (or the
/// host), percent-decoded, `_`/`-` runs turned into spaces, each word
/// capitalized. Returns the raw input when nothing usable is left.
pub fn infer_label(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
        .or_else(|| parsed.host_str().map(str::to_string));
    let Some(segment) = segment else {
        return url.to_string();
    };

    let decoded = urlencoding::decode(&segment)
        .map(|s| s.into_owned())
        .unwrap_or(segment);
    let spaced = WORD_JOINERS.replace_all(&decoded, " ");
    let label = spaced
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ");

    if label.is_empty() {
        url.to_string()
    } else {
        label
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
