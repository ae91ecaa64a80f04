use std::{collections::HashMap, num::NonZeroU32, sync::Arc, time::Duration};

use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use rand::{thread_rng, Rng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fetcher for the catalog and marketplace sources.
///
/// Retry contract:
/// - retries only on 429, 5xx, and network-level failures, up to
///   `retry_attempts` total attempts;
/// - linear backoff `base * (attempt + 1)` with a small random jitter;
/// - any other non-success status is surfaced immediately without retry.
///
/// Per-host pacing is enforced through a keyed rate limiter so concurrent
/// callers targeting the same host share one token bucket.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub retry_attempts: u32,
    pub json_backoff_ms: u64,
    pub html_backoff_ms: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub rps_per_host: u32,
    pub extra_headers: HashMap<String, String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        dotenv::dotenv().ok();
        let retry_attempts = std::env::var("FETCH_RETRY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);
        let timeout_secs = std::env::var("FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20);
        let user_agent = std::env::var("FETCH_USER_AGENT")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "cardpulse/0.1".to_string());
        let rps_per_host = std::env::var("FETCH_RPS_PER_HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);
        Self {
            retry_attempts,
            json_backoff_ms: 400,
            html_backoff_ms: 500,
            timeout_secs,
            user_agent,
            rps_per_host,
            extra_headers: HashMap::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("network: {0}")]
    Net(#[from] reqwest::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl FetchError {
    /// Status code when the failure was a definite HTTP status (0 otherwise).
    pub fn status(&self) -> u16 {
        match self {
            FetchError::Http { status, .. } => *status,
            _ => 0,
        }
    }

    /// True when the failure category is one the retry loop already
    /// exhausted (429 / 5xx / transport), as opposed to an immediate 4xx.
    pub fn is_exhausted_transient(&self) -> bool {
        match self {
            FetchError::Http { status, .. } => *status == 429 || *status >= 500,
            FetchError::Net(_) => true,
            FetchError::Json(_) => false,
        }
    }
}

enum Payload {
    Json,
    Html,
}

#[derive(Clone)]
pub struct FetchClient {
    http: Client,
    cfg: Arc<FetchConfig>,
    limiter: Arc<RateLimiter<String, DashMapStateStore<String>, DefaultClock>>,
}

impl FetchClient {
    pub fn new(cfg: FetchConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&cfg.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("cardpulse/0.1")),
        );
        for (k, v) in &cfg.extra_headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(name, val);
            }
        }

        let http = Client::builder()
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .pool_idle_timeout(Duration::from_secs(120))
            .pool_max_idle_per_host(8)
            .build()
            .expect("failed to build reqwest client");

        let limiter = RateLimiter::keyed(Quota::per_second(
            NonZeroU32::new(cfg.rps_per_host.max(1)).expect("non-zero rps"),
        ));

        Self {
            http,
            cfg: Arc::new(cfg),
            limiter: Arc::new(limiter),
        }
    }

    /// GET a JSON document. `Ok` carries the parsed body; `Err` carries the
    /// terminal failure after the retry policy ran its course.
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Value, FetchError> {
        let body = self.get_with_retry(url, headers, Payload::Json).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// GET an HTML (or any text) document.
    pub async fn get_html(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<String, FetchError> {
        self.get_with_retry(url, headers, Payload::Html).await
    }

    /// Convenience wrappers for callers that treat any failure as "missing".
    pub async fn get_json_opt(&self, url: &str, headers: &[(&str, &str)]) -> Option<Value> {
        match self.get_json(url, headers).await {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(url = %url, error = %e, "json fetch gave up");
                None
            }
        }
    }

    pub async fn get_html_opt(&self, url: &str, headers: &[(&str, &str)]) -> Option<String> {
        match self.get_html(url, headers).await {
            Ok(v) => Some(v),
            Err(e) => {
                debug!(url = %url, error = %e, "html fetch gave up");
                None
            }
        }
    }

    async fn get_with_retry(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        payload: Payload,
    ) -> Result<String, FetchError> {
        let max_attempts = self.cfg.retry_attempts.max(1);
        let base_ms = match payload {
            Payload::Json => self.cfg.json_backoff_ms,
            Payload::Html => self.cfg.html_backoff_ms,
        };
        let host = host_key(url);

        let mut attempt = 0u32;
        loop {
            let _ = self.limiter.until_key_ready(&host).await;

            let mut req = self.http.get(url);
            for (k, v) in headers {
                req = req.header(*k, *v);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, url = %url, error = %e, "fetch network error");
                    if attempt + 1 >= max_attempts {
                        return Err(FetchError::Net(e));
                    }
                    self.backoff(base_ms, attempt).await;
                    attempt += 1;
                    continue;
                }
            };

            let status = resp.status();
            let body = match resp.text().await {
                Ok(b) => b,
                Err(e) => {
                    warn!(attempt, url = %url, error = %e, "fetch body read error");
                    if attempt + 1 >= max_attempts {
                        return Err(FetchError::Net(e));
                    }
                    self.backoff(base_ms, attempt).await;
                    attempt += 1;
                    continue;
                }
            };

            if status.is_success() {
                debug!(url = %url, status = %status.as_u16(), body_len = body.len(), "fetch ok");
                return Ok(body);
            }

            if retryable_status(status) {
                warn!(attempt, url = %url, status = %status.as_u16(), "fetch transient status");
                if attempt + 1 >= max_attempts {
                    return Err(FetchError::Http {
                        status: status.as_u16(),
                        body: truncate(body, 300),
                    });
                }
                self.backoff(base_ms, attempt).await;
                attempt += 1;
                continue;
            }

            // Non-retryable 4xx: surface at once. 401/403 stay loud since they
            // usually mean a revoked key rather than a missing resource.
            let status_u16 = status.as_u16();
            if status_u16 == 401 || status_u16 == 403 {
                warn!(url = %url, status = %status_u16, "fetch auth/forbidden");
            } else {
                info!(url = %url, status = %status_u16, "fetch client error");
            }
            return Err(FetchError::Http {
                status: status_u16,
                body: truncate(body, 300),
            });
        }
    }

    async fn backoff(&self, base_ms: u64, attempt: u32) {
        let delay = base_ms.saturating_mul(u64::from(attempt) + 1);
        let jitter = thread_rng().gen_range(0..=base_ms / 4);
        tokio::time::sleep(Duration::from_millis(delay + jitter)).await;
    }
}

fn retryable_status(status: StatusCode) -> bool {
    status.as_u16() == 429 || status.as_u16() >= 500
}

fn host_key(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or("default")
        .to_string()
}

fn truncate(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_extracts_authority() {
        assert_eq!(host_key("https://api.example.com/v2/cards?page=1"), "api.example.com");
        assert_eq!(host_key("not a url"), "default");
    }

    #[test]
    fn transient_classification() {
        let e = FetchError::Http { status: 429, body: String::new() };
        assert!(e.is_exhausted_transient());
        let e = FetchError::Http { status: 404, body: String::new() };
        assert!(!e.is_exhausted_transient());
        assert_eq!(e.status(), 404);
    }

    #[test]
    fn retryable_statuses() {
        assert!(retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!retryable_status(StatusCode::NOT_FOUND));
        assert!(!retryable_status(StatusCode::FORBIDDEN));
    }
}
