//! HTTP completion backend.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{CompletionError, Result};

use super::{
    CompletionBackend, CompletionRequest, CompletionResponse, QuickFixRequest, QuickFixResponse,
};

/// Connect timeout applied to every request, independent of the per-request
/// timeout. Keeps a blackholed host from eating the whole budget.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    request_timeout: Duration,
    quick_fix_timeout: Duration,
}

/// Talks to an OpenAI-style `/v1/completions` server.
pub struct HttpBackend {
    client: Client,
    endpoint: RwLock<Endpoint>,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

impl HttpBackend {
    pub fn new(base_url: &str, request_timeout: Duration, quick_fix_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: RwLock::new(Endpoint {
                base_url: base_url.trim_end_matches('/').to_string(),
                request_timeout,
                quick_fix_timeout,
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.base_url(),
            config.request_timeout(),
            config.quick_fix_timeout(),
        )
    }

    /// Current server URL.
    pub fn base_url(&self) -> String {
        self.endpoint().base_url
    }

    /// Check `GET /health`. Any 2xx counts as up.
    pub async fn health(&self) -> Result<()> {
        let endpoint = self.endpoint();
        let url = format!("{}/health", endpoint.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(endpoint.request_timeout)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn endpoint(&self) -> Endpoint {
        self.endpoint
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn post_json<B, R>(&self, path: &str, body: &B, timeout: Duration) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let url = format!("{}{}", self.endpoint().base_url, path);
        debug!(url = %url, timeout_ms = timeout.as_millis() as u64, "POST");
        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<R>().await?)
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let timeout = self.endpoint().request_timeout;
        self.post_json("/v1/completions", request, timeout).await
    }

    async fn quick_fixes(&self, request: &QuickFixRequest) -> Result<QuickFixResponse> {
        let timeout = self.endpoint().quick_fix_timeout;
        self.post_json("/v1/refactor/quick-fixes", request, timeout)
            .await
    }

    fn reconfigure(&self, config: &Config) {
        let mut endpoint = self.endpoint.write().unwrap_or_else(|e| e.into_inner());
        *endpoint = Endpoint {
            base_url: config.base_url().to_string(),
            request_timeout: config.request_timeout(),
            quick_fix_timeout: config.quick_fix_timeout(),
        };
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
