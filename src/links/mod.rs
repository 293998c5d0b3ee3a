//! Link sanitization pipeline.
//!
//! Raw admin text goes in; a normalized multiline `Label | URL` string comes
//! out. Redirector links are resolved to their destination, labels come from
//! the admin, the destination page title, or the URL path (in that order).
//! Nothing in here fails on a bad URL or a dead host: a failed step falls back
//! to the best value known so far.

use futures::stream::{self, StreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::config::Config;

pub mod client;
pub mod health;
pub mod label;
pub mod line;
pub mod preprocess;
pub mod resolve;
pub mod title;

pub use client::{HttpLinkClient, LinkClient, Page, Probe};
pub use health::is_alive;
pub use label::infer_label;
pub use line::{stored_urls, LinkLine};
pub use preprocess::{extract_entries, normalize_text, RawUrlEntry};
pub use resolve::{normalized_key, RedirectorSet, Resolver};
pub use title::extract_title;

/// Entries resolved concurrently by [`LinkPipeline::resolve_urls`].
const RESOLVE_CONCURRENCY: usize = 4;

/// Response of the batch resolve operation; both vectors match the input
/// order and length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUrls {
    pub resolved: Vec<String>,
    pub titles: Vec<Option<String>>,
}

pub struct LinkPipeline {
    client: Arc<dyn LinkClient>,
    redirectors: RedirectorSet,
    max_links: usize,
    max_hops: usize,
}

impl LinkPipeline {
    pub fn new(
        client: Arc<dyn LinkClient>,
        redirectors: RedirectorSet,
        max_links: usize,
        max_hops: usize,
    ) -> Self {
        Self {
            client,
            redirectors,
            max_links,
            max_hops,
        }
    }

    pub fn from_config(cfg: &Config, client: Arc<dyn LinkClient>) -> Self {
        Self::new(
            client,
            RedirectorSet::new(&cfg.links.redirector_hosts),
            cfg.links.max_links,
            cfg.links.max_hops,
        )
    }

    pub fn client(&self) -> Arc<dyn LinkClient> {
        Arc::clone(&self.client)
    }

    pub async fn resolve(&self, url: &Url) -> Url {
        Resolver::new(self.client.as_ref(), &self.redirectors, self.max_hops)
            .resolve(url)
            .await
    }

    pub async fn fetch_title(&self, url: &str) -> Option<String> {
        title::fetch_title(self.client.as_ref(), url).await
    }

    /// Normalize admin link text. Whitespace-only input is returned as-is.
    /// Entries are handled one at a time in encounter order; at most
    /// `max_links` lines are produced.
    #[instrument(skip_all)]
    pub async fn sanitize(&self, raw: &str) -> String {
        if raw.trim().is_empty() {
            return raw.to_string();
        }

        let mut seen = HashSet::new();
        let mut lines: Vec<LinkLine> = Vec::new();
        for entry in extract_entries(raw) {
            if lines.len() >= self.max_links {
                debug!(max = self.max_links, "link cap reached");
                break;
            }
            let url = match Url::parse(&entry.raw_url) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => url,
                _ => {
                    debug!(raw = %entry.raw_url, "skipping malformed link");
                    continue;
                }
            };

            let resolved = self.resolve(&url).await;
            if !seen.insert(normalized_key(&resolved)) {
                debug!(url = %resolved, "duplicate link dropped");
                continue;
            }

            let label = self.label_for(entry.label.as_deref(), &resolved).await;
            lines.push(LinkLine::new(&label, resolved.as_str()));
        }

        info!(count = lines.len(), "sanitized links");
        lines
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn label_for(&self, manual: Option<&str>, resolved: &Url) -> String {
        if let Some(label) = manual.map(line::clean_label).filter(|l| !l.is_empty()) {
            return label;
        }
        if let Some(title) = self
            .fetch_title(resolved.as_str())
            .await
            .map(|t| line::clean_label(&t))
            .filter(|t| !t.is_empty())
        {
            return title;
        }
        infer_label(resolved.as_str())
    }

    /// Batch resolve for the admin link picker. Input beyond `max_links` is
    /// ignored. Only redirector links are resolved and titled; everything else
    /// passes through with no title.
    #[instrument(skip_all, fields(count = urls.len()))]
    pub async fn resolve_urls(&self, urls: &[String]) -> ResolvedUrls {
        let results: Vec<(String, Option<String>)> = stream::iter(urls.iter().take(self.max_links))
            .map(|raw| self.resolve_entry(raw))
            .buffered(RESOLVE_CONCURRENCY)
            .collect()
            .await;

        let (resolved, titles) = results.into_iter().unzip();
        ResolvedUrls { resolved, titles }
    }

    async fn resolve_entry(&self, raw: &str) -> (String, Option<String>) {
        let url = match Url::parse(raw.trim()) {
            Ok(url) if self.redirectors.matches(&url) => url,
            _ => return (raw.to_string(), None),
        };
        let resolved = self.resolve(&url).await;
        let title = self.fetch_title(resolved.as_str()).await;
        (resolved.to_string(), title)
    }
}
