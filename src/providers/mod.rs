//! Completion backend abstraction and wire types.
//!
//! The backend is an external server reached over HTTP; [`HttpBackend`] is
//! the production implementation. The pipeline only sees the
//! [`CompletionBackend`] trait so tests can substitute counting fakes.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;

pub use http::HttpBackend;

/// Body of `POST /v1/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stop: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_analysis: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Response of `POST /v1/completions`.
///
/// Every field is optional on the wire; a missing `choices` or `text` means
/// "no completion", not a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl CompletionResponse {
    /// A response with a single choice carrying `text`.
    pub fn with_text(text: &str) -> Self {
        Self {
            choices: vec![Choice {
                text: Some(text.to_string()),
                analysis: None,
            }],
        }
    }

    /// Non-empty text of the first choice.
    pub fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.text.as_deref())
            .filter(|t| !t.is_empty())
    }

    pub fn first_analysis(&self) -> Option<&Analysis> {
        self.choices.first().and_then(|c| c.analysis.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
}

/// Code analysis attached to a completion when `include_analysis` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub issues: Vec<serde_json::Value>,
    #[serde(default)]
    pub summary: AnalysisSummary,
    #[serde(default)]
    pub complexity: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default)]
    pub by_severity: SeverityCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    #[serde(default)]
    pub critical: u32,
    #[serde(default)]
    pub high: u32,
    #[serde(default)]
    pub medium: u32,
}

impl SeverityCounts {
    pub fn total(&self) -> u32 {
        self.critical + self.high + self.medium
    }
}

/// Body of `POST /v1/refactor/quick-fixes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickFixRequest {
    pub prompt: String,
    pub language: String,
}

/// A single fix suggested by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickFix {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub auto_fixable: bool,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuickFixResponse {
    #[serde(default)]
    pub fixes: Vec<QuickFix>,
}

/// A server that turns prompts into completions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Issue one completion request. Implementations enforce their own
    /// timeout and report it as [`crate::error::CompletionError::Timeout`].
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Ask for quick fixes for a single line.
    async fn quick_fixes(&self, request: &QuickFixRequest) -> Result<QuickFixResponse>;

    /// Pick up a new server URL or timeouts after a config reload.
    fn reconfigure(&self, _config: &Config) {}

    /// Short identifier used in logs.
    fn name(&self) -> &'static str;
}
