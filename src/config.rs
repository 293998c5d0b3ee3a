//! Configuration loader and validator for the catalog and link pipeline.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub links: Links,
    #[serde(default)]
    pub sweep: Sweep,
    #[serde(default)]
    pub feed: Feed,
    pub admin: Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Outbound HTTP settings shared by the resolver, title fetcher and sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Http {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            timeout_secs: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Link pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Links {
    /// Host patterns treated as redirectors (substring match on the hostname).
    pub redirector_hosts: Vec<String>,
    pub max_links: usize,
    pub max_hops: usize,
}

impl Default for Links {
    fn default() -> Self {
        Self {
            redirector_hosts: vec!["trychannel3.com".to_string()],
            max_links: 10,
            max_hops: 3,
        }
    }
}

/// Link health sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sweep {
    /// Replacement link written in safe mode.
    pub placeholder_url: String,
    /// Interval for the scheduled sweep run by `shoplink watch`.
    pub interval_secs: u64,
}

impl Default for Sweep {
    fn default() -> Self {
        Self {
            placeholder_url: DEFAULT_PLACEHOLDER_URL.to_string(),
            interval_secs: 6 * 60 * 60,
        }
    }
}

pub const DEFAULT_PLACEHOLDER_URL: &str = "https://www.amazon.com/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feed {
    pub public_enabled: bool,
}

impl Default for Feed {
    fn default() -> Self {
        Self {
            public_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admin {
    pub password: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins; otherwise a file inside `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/shoplink.db?mode=rwc",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    parse(&content)
}

/// Parse and validate configuration from YAML text.
pub fn parse(content: &str) -> Result<Config, ConfigError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.http.timeout_secs == 0 {
        return Err(ConfigError::Invalid("http.timeout_secs must be > 0"));
    }
    if cfg.links.max_links == 0 {
        return Err(ConfigError::Invalid("links.max_links must be > 0"));
    }
    if cfg.links.max_hops == 0 {
        return Err(ConfigError::Invalid("links.max_hops must be > 0"));
    }
    if cfg
        .links
        .redirector_hosts
        .iter()
        .any(|h| h.trim().is_empty())
    {
        return Err(ConfigError::Invalid(
            "links.redirector_hosts entries must be non-empty",
        ));
    }
    let placeholder = cfg.sweep.placeholder_url.trim();
    if !(placeholder.starts_with("http://") || placeholder.starts_with("https://")) {
        return Err(ConfigError::Invalid(
            "sweep.placeholder_url must be an http(s) URL",
        ));
    }
    if cfg.sweep.interval_secs == 0 {
        return Err(ConfigError::Invalid("sweep.interval_secs must be > 0"));
    }
    if cfg.admin.password.trim().is_empty() {
        return Err(ConfigError::Invalid("admin.password must be non-empty"));
    }
    Ok(())
}

/// Returns a complete example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

http:
  timeout_secs: 3
  user_agent: "Mozilla/5.0 (compatible; shoplink/0.1)"

links:
  redirector_hosts:
    - "trychannel3.com"
  max_links: 10
  max_hops: 3

sweep:
  placeholder_url: "https://www.amazon.com/"
  interval_secs: 21600

feed:
  public_enabled: true

admin:
  password: "CHANGE_ME"
"#
}
