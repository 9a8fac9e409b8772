//! Configuration for the completion pipeline.
//!
//! Keys use the same camelCase names as the editor settings so an exported
//! settings block can be dropped into `~/.lmcomplete/config.json` unchanged.
//! Every field has a default; a missing file yields [`Config::default`].

pub mod watcher;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompletionError, Result};

pub use watcher::ConfigWatcher;

/// Default completion server.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Completion cache sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Maximum resident entries before FIFO eviction.
    pub max_entries: usize,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            ttl_secs: 300,
        }
    }
}

/// Sampling parameters forwarded with every completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SamplingConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Stop at a blank line so suggestions don't run on.
    pub stop: Vec<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 50,
            temperature: 0.2,
            stop: vec!["\n\n".to_string()],
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub enable_inline_completion: bool,
    pub server_url: String,
    pub model: String,
    pub debounce_ms: u64,
    /// Lines of preceding text sent as the prompt.
    pub context_lines: usize,
    /// Completion request timeout in milliseconds.
    pub request_timeout: u64,
    pub enable_code_analysis: bool,
    /// Overrides the language derived from the editor when non-empty.
    pub analysis_language: String,
    /// Quick-fix request timeout in milliseconds.
    pub quick_fix_timeout: u64,
    pub sampling: SamplingConfig,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_inline_completion: true,
            server_url: DEFAULT_SERVER_URL.to_string(),
            model: "default".to_string(),
            debounce_ms: 500,
            context_lines: 50,
            request_timeout: 2000,
            enable_code_analysis: false,
            analysis_language: String::new(),
            quick_fix_timeout: 3000,
            sampling: SamplingConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Default config location: `~/.lmcomplete/config.json`.
    pub fn path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lmcomplete")
            .join("config.json")
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_at(&Self::path())
    }

    /// Load `path`, apply environment overrides and validate the result.
    pub fn load_at(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load a config file. A missing file yields defaults; a malformed one is
    /// an error so a typo doesn't silently reset every setting.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&data).map_err(|e| {
            CompletionError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Apply `LMCOMPLETE_*` environment variables on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("LMCOMPLETE_SERVER_URL") {
            if !url.trim().is_empty() {
                self.server_url = url.trim().to_string();
            }
        }
        if let Ok(model) = std::env::var("LMCOMPLETE_MODEL") {
            if !model.trim().is_empty() {
                self.model = model.trim().to_string();
            }
        }
        if let Some(ms) = env_u64("LMCOMPLETE_DEBOUNCE_MS") {
            self.debounce_ms = ms;
        }
        if let Some(ms) = env_u64("LMCOMPLETE_REQUEST_TIMEOUT") {
            self.request_timeout = ms;
        }
    }

    /// Reject configs the pipeline cannot use.
    pub fn validate(&self) -> Result<()> {
        let raw = self.server_url.trim();
        if raw.is_empty() {
            return Err(CompletionError::Config("serverUrl must not be empty".into()));
        }
        let parsed = url::Url::parse(raw)
            .map_err(|e| CompletionError::Config(format!("invalid serverUrl '{}': {}", raw, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CompletionError::Config(format!(
                "serverUrl must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        Ok(())
    }

    /// Server URL without a trailing slash, ready for path joining.
    pub fn base_url(&self) -> &str {
        self.server_url.trim().trim_end_matches('/')
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn quick_fix_timeout(&self) -> Duration {
        Duration::from_millis(self.quick_fix_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// True when switching from `self` to `other` could change what the
    /// backend returns for the same prompt, so cached completions are stale.
    pub fn invalidates_cache(&self, other: &Config) -> bool {
        self.server_url != other.server_url
            || self.model != other.model
            || self.sampling != other.sampling
            || self.enable_code_analysis != other.enable_code_analysis
            || self.analysis_language != other.analysis_language
            || self.context_lines != other.context_lines
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
