//! Page title lookup for link labels.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::Url;
use tracing::debug;

use super::client::LinkClient;

static OG_TITLE_PROPERTY_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]+property\s*=\s*["']og:title["'][^>]*content\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
    )
    .expect("valid og:title pattern")
});

static OG_TITLE_CONTENT_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]+content\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*property\s*=\s*["']og:title["']"#,
    )
    .expect("valid og:title pattern")
});

static TITLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid title pattern"));

static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid entity pattern")
});

/// Sites append their name after one of these.
const TITLE_SEPARATORS: [&str; 8] = [" | ", " – ", " — ", " • ", "|", "–", "—", "•"];

/// Titles served by bot walls and error pages.
const BLOCKED_TITLE_SIGNATURES: [&str; 10] = [
    "access denied",
    "forbidden",
    "captcha",
    "not found",
    "just a moment",
    "attention required",
    "robot check",
    "are you a robot",
    "service unavailable",
    "page unavailable",
];

/// Fetch `url` and return a short human title for it. Any failure is `None`.
pub async fn fetch_title(client: &dyn LinkClient, url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    match client.get(&parsed).await {
        Ok(page) if page.status < 400 && page.is_html() => extract_title(&page.body),
        Ok(page) => {
            debug!(url, status = page.status, "no usable title in response");
            None
        }
        Err(err) => {
            debug!(?err, url, "title fetch failed");
            None
        }
    }
}

fn first_group<'h>(caps: &Captures<'h>) -> Option<&'h str> {
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str())
}

/// `og:title` wins over `<title>`. Entities are decoded, the site-name tail is
/// cut, and bot-wall titles are rejected.
pub fn extract_title(html: &str) -> Option<String> {
    let raw = OG_TITLE_PROPERTY_FIRST
        .captures(html)
        .or_else(|| OG_TITLE_CONTENT_FIRST.captures(html))
        .and_then(|caps| first_group(&caps).map(str::to_string))
        .filter(|t| !t.trim().is_empty())
        .or_else(|| {
            TITLE_TAG
                .captures(html)
                .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        })?;

    let decoded = decode_entities(&raw);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || is_blocked(&collapsed) {
        return None;
    }
    Some(cut_site_name(&collapsed))
}

fn is_blocked(title: &str) -> bool {
    let lower = title.to_lowercase();
    BLOCKED_TITLE_SIGNATURES
        .iter()
        .any(|sig| lower.contains(sig))
}

fn cut_site_name(title: &str) -> String {
    for sep in TITLE_SEPARATORS {
        if !title.contains(sep) {
            continue;
        }
        if let Some(head) = title.split(sep).map(str::trim).find(|s| !s.is_empty()) {
            return head.to_string();
        }
    }
    title.to_string()
}

pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(name)
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Only the names that show up in shop titles are known; anything else is
/// left encoded.
fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "bull" => '•',
        "hellip" => '…',
        "rsquo" => '’',
        "lsquo" => '‘',
        "rdquo" => '”',
        "ldquo" => '“',
        "reg" => '®',
        "trade" => '™',
        "copy" => '©',
        _ => return None,
    };
    Some(ch)
}
