use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_ENV: &str = "GIST_WATCH_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub poll: PollConfig,
    pub icons: IconConfig,
    pub cursor: CursorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    /// GitHub rejects requests without a User-Agent.
    pub user_agent: String,
    pub request_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com/gists".to_string(),
            user_agent: concat!("gist-watch/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PollConfig {
    pub interval_s: u64,
    /// Lower bound of the first fetch window when no cursor was saved.
    pub initial_lookback_s: u64,
    /// Re-arm the timer at the server's reset time after exhausting the
    /// budget. When false, exhaustion halts polling for good.
    pub resume_on_reset: bool,
    /// How many announced identifiers to remember.
    pub seen_capacity: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_s: 3600,
            initial_lookback_s: 3600,
            resume_on_reset: true,
            seen_capacity: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IconConfig {
    pub max_concurrent: usize,
    pub max_bytes: usize,
    pub request_timeout_ms: u64,
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            max_bytes: 1024 * 1024,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CursorConfig {
    pub path: PathBuf,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gist-watch.state.toml"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Log to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "gist_watch=info".to_string(),
            file: None,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse config TOML")
    }

    /// Path from `GIST_WATCH_CONFIG`, else `config.toml`.
    pub fn default_path() -> PathBuf {
        match std::env::var(CONFIG_ENV) {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p.trim()),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Load the config file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
