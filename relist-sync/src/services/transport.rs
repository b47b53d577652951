//! Rate-limit-aware HTTP transport
//!
//! Every outbound API request goes through [`RateLimitedTransport`]. On
//! `429 Too Many Requests` it reads `Retry-After`, sleeps `(delay + 1)` seconds
//! and re-sends the identical request, for as long as the server keeps asking.
//! Callers never see the 429. Any other non-2xx response becomes
//! [`TransportError::Status`] with a best-effort message from the body.
//!
//! The raw exchange sits behind [`HttpBackend`] so tests can script responses.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Delay assumed when a 429 carries no usable `Retry-After`
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Longest body excerpt used as an error message
const MAX_MESSAGE_LEN: usize = 200;

/// HTTP method subset used by the catalog APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        }
    }
}

/// One fully-specified request; replayed verbatim after a rate limit
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    /// Bearer token, omitted when `None`
    pub token: Option<String>,
    pub body: Option<Value>,
}

/// Raw response as seen by the transport
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed `Retry-After` header in seconds
    pub retry_after: Option<u64>,
    pub body: String,
}

/// Sends a single request without interpreting the status
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-based backend
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(user_agent: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), &request.url);

        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| raw.trim().parse::<u64>().ok());
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Request contract consumed by the API clients
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `method endpoint` and return the JSON body.
    ///
    /// `endpoint` is either absolute or relative to the transport's base URL.
    /// An empty `token` sends no `Authorization` header.
    async fn request(
        &self,
        endpoint: &str,
        method: Method,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError>;
}

/// Transport that transparently replays rate-limited requests
pub struct RateLimitedTransport<B> {
    backend: B,
    base_url: String,
    /// Added to every `Retry-After`
    retry_padding: Duration,
}

impl<B: HttpBackend> RateLimitedTransport<B> {
    pub fn new(backend: B, base_url: impl Into<String>) -> Self {
        Self {
            backend,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_padding: Duration::from_secs(1),
        }
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// Send `request`, replaying it after every 429
    pub async fn execute(&self, request: &HttpRequest) -> Result<Value, TransportError> {
        let mut rate_limited = 0u32;

        loop {
            let response = self.backend.send(request).await?;

            if response.status == 429 {
                rate_limited += 1;
                let delay = Duration::from_secs(
                    response.retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
                ) + self.retry_padding;
                tracing::warn!(
                    url = %request.url,
                    retry_after = ?response.retry_after,
                    delay_ms = delay.as_millis() as u64,
                    rate_limited,
                    "Rate limited, replaying request after delay"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !(200..300).contains(&response.status) {
                let message = extract_error_message(response.status, &response.body);
                tracing::debug!(
                    url = %request.url,
                    status = response.status,
                    message = %message,
                    "Request failed"
                );
                return Err(TransportError::Status {
                    status: response.status,
                    message,
                });
            }

            if response.body.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&response.body)
                .map_err(|e| TransportError::Parse(e.to_string()));
        }
    }
}

#[async_trait]
impl<B: HttpBackend> Transport for RateLimitedTransport<B> {
    async fn request(
        &self,
        endpoint: &str,
        method: Method,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let request = HttpRequest {
            method,
            url: self.url_for(endpoint),
            token: (!token.is_empty()).then(|| token.to_string()),
            body: body.cloned(),
        };
        self.execute(&request).await
    }
}

/// Best-effort error message from a failed response body
///
/// Understands `{"error":{"message":..}}`, `{"error":"..","message":..}` and
/// `{"error_description":..}`; falls back to the raw text, then the status.
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let candidates = [
            json.pointer("/error/message"),
            json.get("message"),
            json.get("error_description"),
            json.get("error"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str() {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }

    let text = body.trim();
    if text.is_empty() {
        return format!("Request failed with status {}", status);
    }
    text.chars().take(MAX_MESSAGE_LEN).collect()
}
