#![allow(dead_code)]

use anyhow::{anyhow, Result};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use shoplink::links::{LinkClient, Page, Probe};

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Head(String),
    Get(String),
}

/// Link client answering from fixed scripts keyed by exact URL. Anything not
/// scripted fails like an unreachable host.
#[derive(Clone, Default)]
pub struct ScriptedLinks {
    heads: HashMap<String, Probe>,
    gets: HashMap<String, Page>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ScriptedLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// HEAD on `url` ends at `final_url` with `status`.
    pub fn head(mut self, url: &str, final_url: &str, status: u16) -> Self {
        self.heads.insert(
            url.to_string(),
            Probe {
                final_url: Url::parse(final_url).unwrap(),
                status,
            },
        );
        self
    }

    /// GET on `url` returns an HTML body after ending at `final_url`.
    pub fn html(mut self, url: &str, final_url: &str, status: u16, body: &str) -> Self {
        self.gets.insert(
            url.to_string(),
            Page {
                final_url: Url::parse(final_url).unwrap(),
                status,
                content_type: Some("text/html; charset=utf-8".to_string()),
                body: body.to_string(),
            },
        );
        self
    }

    /// GET on `url` returns a non-HTML body in place.
    pub fn plain(mut self, url: &str, status: u16) -> Self {
        self.gets.insert(
            url.to_string(),
            Page {
                final_url: Url::parse(url).unwrap(),
                status,
                content_type: Some("application/json".to_string()),
                body: "{}".to_string(),
            },
        );
        self
    }

    /// GET on `url` follows native redirects to `final_url` and returns a
    /// non-HTML body.
    pub fn redirected(mut self, url: &str, final_url: &str, status: u16) -> Self {
        self.gets.insert(
            url.to_string(),
            Page {
                final_url: Url::parse(final_url).unwrap(),
                status,
                content_type: Some("application/octet-stream".to_string()),
                body: String::new(),
            },
        );
        self
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn got(&self, url: &str) -> bool {
        self.calls().await.contains(&Call::Get(url.to_string()))
    }
}

#[async_trait::async_trait]
impl LinkClient for ScriptedLinks {
    async fn head(&self, url: &Url) -> Result<Probe> {
        self.calls.lock().await.push(Call::Head(url.to_string()));
        self.heads
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {}", url))
    }

    async fn get(&self, url: &Url) -> Result<Page> {
        self.calls.lock().await.push(Call::Get(url.to_string()));
        self.gets
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {}", url))
    }
}
