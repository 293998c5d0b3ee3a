use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client, Url};
use std::fmt;
use std::time::Duration;

use crate::config::Config;

/// Outcome of a HEAD probe after native redirects were followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub final_url: Url,
    pub status: u16,
}

/// A fetched page after native redirects were followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl Page {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            })
            .unwrap_or(false)
    }
}

/// HTTP capability used by the pipeline and the sweep. Both calls follow
/// redirects and fail only on connection-level errors or timeouts.
#[async_trait]
pub trait LinkClient: Send + Sync {
    async fn head(&self, url: &Url) -> Result<Probe>;

    async fn get(&self, url: &Url) -> Result<Page>;
}

#[derive(Clone)]
pub struct HttpLinkClient {
    http: Client,
}

impl fmt::Debug for HttpLinkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpLinkClient").finish_non_exhaustive()
    }
}

impl HttpLinkClient {
    /// `timeout` caps every call (connect and total); there are no retries.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(timeout)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.http_timeout(), &cfg.http.user_agent)
    }
}

#[async_trait]
impl LinkClient for HttpLinkClient {
    async fn head(&self, url: &Url) -> Result<Probe> {
        let res = self
            .http
            .head(url.clone())
            .send()
            .await
            .with_context(|| format!("HEAD {} failed", url))?;
        Ok(Probe {
            final_url: res.url().clone(),
            status: res.status().as_u16(),
        })
    }

    async fn get(&self, url: &Url) -> Result<Page> {
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        let final_url = res.url().clone();
        let status = res.status().as_u16();
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = res
            .text()
            .await
            .with_context(|| format!("failed to read body of {}", final_url))?;
        Ok(Page {
            final_url,
            status,
            content_type,
            body,
        })
    }
}
