//! Redirector resolution: a bounded hop loop over HEAD, GET and HTML hints.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::collections::HashSet;
use tracing::{debug, instrument};

use super::client::LinkClient;
use super::title::decode_entities;

static META_REFRESH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+http-equiv\s*=\s*["']?refresh["']?[^>]*content\s*=\s*["']\s*\d*\s*;?\s*url\s*=\s*['"]?([^"'>\s]+)"#,
    )
    .expect("valid meta refresh pattern")
});

static JS_LOCATION_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)window\.location(?:\.href)?\s*=\s*["']([^"']+)["']"#)
        .expect("valid location.href pattern")
});

static JS_LOCATION_REPLACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)location\.replace\(\s*["']([^"']+)["']\s*\)"#)
        .expect("valid location.replace pattern")
});

static JS_LOCATION_ASSIGN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|[^\w\-])location\s*=\s*["']([^"']+)["']"#)
        .expect("valid location pattern")
});

static CANONICAL_REL_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<link[^>]+rel\s*=\s*["']canonical["'][^>]*href\s*=\s*["']([^"']+)["']"#,
    )
    .expect("valid canonical pattern")
});

static CANONICAL_HREF_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)<link[^>]+href\s*=\s*["']([^"']+)["'][^>]*rel\s*=\s*["']canonical["']"#,
    )
    .expect("valid canonical pattern")
});

type HintExtractor = fn(&str) -> Option<String>;

/// Tried in this order; the first usable target wins.
const HINT_EXTRACTORS: [HintExtractor; 5] = [
    meta_refresh,
    js_location_href,
    js_location_replace,
    js_location_assign,
    canonical_link,
];

fn capture(re: &Regex, html: &str) -> Option<String> {
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .filter(|s| !s.is_empty())
}

fn meta_refresh(html: &str) -> Option<String> {
    capture(&META_REFRESH, html)
}

fn js_location_href(html: &str) -> Option<String> {
    capture(&JS_LOCATION_HREF, html)
}

fn js_location_replace(html: &str) -> Option<String> {
    capture(&JS_LOCATION_REPLACE, html)
}

fn js_location_assign(html: &str) -> Option<String> {
    capture(&JS_LOCATION_ASSIGN, html)
}

fn canonical_link(html: &str) -> Option<String> {
    capture(&CANONICAL_REL_FIRST, html).or_else(|| capture(&CANONICAL_HREF_FIRST, html))
}

/// First redirect hint in `html` that resolves (against `base`) to an http(s)
/// URL different from `current`.
pub fn redirect_target(html: &str, base: &Url, current: &Url) -> Option<Url> {
    HINT_EXTRACTORS.iter().find_map(|extract| {
        let hint = extract(html)?;
        let target = base.join(&hint).ok()?;
        let usable = matches!(target.scheme(), "http" | "https") && &target != current;
        usable.then_some(target)
    })
}

/// Dedup key: scheme, host, explicit port, path and query.
pub fn normalized_key(url: &Url) -> String {
    let mut key = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }
    key.push_str(url.path());
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

/// Host patterns whose URLs are indirections. Matching is a case-insensitive
/// substring test on the hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectorSet {
    patterns: Vec<String>,
}

impl RedirectorSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        self.patterns.iter().any(|p| host.contains(p.as_str()))
    }
}

pub struct Resolver<'a> {
    client: &'a dyn LinkClient,
    redirectors: &'a RedirectorSet,
    max_hops: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(client: &'a dyn LinkClient, redirectors: &'a RedirectorSet, max_hops: usize) -> Self {
        Self {
            client,
            redirectors,
            max_hops,
        }
    }

    /// Follow `start` until it leaves the redirector hosts, the hop budget
    /// runs out, or a URL repeats. Never fails: the best URL reached so far is
    /// returned.
    #[instrument(skip_all, fields(url = %start))]
    pub async fn resolve(&self, start: &Url) -> Url {
        let mut current = start.clone();
        let mut visited = HashSet::new();

        for hop in 0..self.max_hops {
            if !self.redirectors.matches(&current) {
                return current;
            }
            if !visited.insert(normalized_key(&current)) {
                debug!(hop, url = %current, "redirect cycle");
                break;
            }

            match self.client.head(&current).await {
                Ok(probe) if probe.final_url != current => {
                    debug!(hop, from = %current, to = %probe.final_url, "HEAD redirect");
                    current = probe.final_url;
                    continue;
                }
                Ok(_) => {}
                Err(err) => debug!(hop, ?err, "HEAD probe failed"),
            }

            let page = match self.client.get(&current).await {
                Ok(page) => page,
                Err(err) => {
                    debug!(hop, ?err, "GET probe failed");
                    break;
                }
            };
            let hinted = if page.is_html() {
                redirect_target(&page.body, &page.final_url, &current)
            } else {
                None
            };
            let next = hinted.unwrap_or(page.final_url);
            debug!(hop, from = %current, to = %next, "GET hop");
            current = next;
        }

        current
    }
}
