//! Loopback HTTP backend client
//!
//! Plain JSON GETs against the inspector HTTP API on `127.0.0.1`. Every
//! request is bounded by one configured timeout; failures are split into
//! connect failures, timeouts and upstream failures so the dispatcher can
//! report them distinctly.

use crate::error::BackendError;
use reqwest::header::ACCEPT;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default backend port
pub const DEFAULT_PORT: u16 = 5050;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Poll interval for [`BackendClient::wait_until_healthy`]
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// HTTP client bound to one loopback base URL
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: HttpClient,
    base_url: String,
    timeout: Duration,
}

impl BackendClient {
    /// Client for `http://127.0.0.1:<port>`
    pub fn new(port: u16, timeout: Duration) -> Result<Self, BackendError> {
        Self::with_base_url(format!("http://127.0.0.1:{}", port), timeout)
    }

    /// Client for an explicit base URL (no trailing slash needed)
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let http = HttpClient::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| BackendError::Unreachable {
                url: base_url.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Configured per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `path` and parse the body as JSON
    #[instrument(skip(self))]
    pub async fn get_json(&self, path: &str) -> Result<Value, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "backend request");

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.classify(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "backend returned failure status");
            return Err(BackendError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(&url, e))?;
        serde_json::from_slice(&body).map_err(|e| BackendError::MalformedBody {
            url,
            message: e.to_string(),
        })
    }

    /// Poll `/health` every 200 ms until it answers 2xx or `budget` runs out.
    /// Returns whether the backend became healthy.
    pub async fn wait_until_healthy(&self, budget: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + budget;
        loop {
            match self.get_json("/health").await {
                Ok(_) => {
                    info!(base_url = %self.base_url, "backend healthy");
                    return true;
                }
                Err(e) => debug!(error = %e, "backend not ready"),
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                warn!(
                    budget_ms = budget.as_millis() as u64,
                    "backend did not become healthy; serving anyway"
                );
                return false;
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout {
                url: url.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            BackendError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}
