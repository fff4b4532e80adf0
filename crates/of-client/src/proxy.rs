//! Authenticated access to the ObjectiveFunction server API.

use std::time::Duration;

use of_types::{ObjFunError, ObjFunResult};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Base URL used when none is configured.
pub const DEFAULT_URL_BASE: &str = "http://localhost:5000/api/";

/// Status codes that are retried by the proxy.
const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// A response from the remote service: status code and raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> ObjFunResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Turn an unexpected response into a transport error.
    pub fn into_error(self) -> ObjFunError {
        ObjFunError::Http {
            status: self.status,
            body: self.body,
        }
    }
}

/// Request/response access to the remote service, relative to its API base.
pub trait Transport: Send {
    fn get(&self, path: &str) -> ObjFunResult<ApiResponse>;

    fn post(&self, path: &str, body: &serde_json::Value) -> ObjFunResult<ApiResponse>;

    fn put(&self, path: &str, body: &serde_json::Value) -> ObjFunResult<ApiResponse>;
}

/// Exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub max_retries: u32,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff_factor: Duration::from_millis(300),
            max_backoff: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_factor
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct StudiesResponse {
    data: Vec<serde_json::Value>,
}

/// Normalise the base URL so that endpoint paths can be appended.
pub fn normalise_url_base(url_base: &str) -> String {
    if url_base.ends_with('/') {
        url_base.to_string()
    } else {
        format!("{url_base}/")
    }
}

/// HTTP transport with token authentication and retries.
///
/// A token is requested once with the app credentials when the proxy is
/// created; every later request authenticates with that token.
pub struct Proxy {
    client: Client,
    url_base: String,
    token: String,
    retry: RetryPolicy,
}

impl Proxy {
    pub fn connect(app: &str, secret: &str, url_base: &str) -> ObjFunResult<Self> {
        Self::connect_with_policy(app, secret, url_base, RetryPolicy::default())
    }

    pub fn connect_with_policy(
        app: &str,
        secret: &str,
        url_base: &str,
        retry: RetryPolicy,
    ) -> ObjFunResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("objfun-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ObjFunError::Transport(format!("Failed to create HTTP client: {e}")))?;

        let mut proxy = Self {
            client,
            url_base: normalise_url_base(url_base),
            token: String::new(),
            retry,
        };

        let response = proxy.send(Method::GET, "token", None, |request| {
            request.basic_auth(app, Some(secret))
        })?;
        if response.status != 200 {
            return Err(response.into_error());
        }
        proxy.token = response.json::<TokenResponse>()?.token;
        tracing::debug!("obtained token from {}", proxy.url_base);
        Ok(proxy)
    }

    /// Full URL of an endpoint.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.url_base, path)
    }

    /// List the studies known to the server.
    pub fn studies(&self) -> ObjFunResult<Vec<serde_json::Value>> {
        let response = self.get("studies")?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        Ok(response.json::<StudiesResponse>()?.data)
    }

    fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.token, Some(""))
    }

    fn send<F>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        auth: F,
    ) -> ObjFunResult<ApiResponse>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = self.url(path);
        let mut last_error = None;

        for attempt in 0..=self.retry.max_retries {
            let mut request = auth(self.client.request(method.clone(), &url));
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !RETRY_STATUSES.contains(&status) || attempt == self.retry.max_retries {
                        let body = response.text().map_err(|e| {
                            ObjFunError::Transport(format!("Failed to read response body: {e}"))
                        })?;
                        tracing::debug!("{method} {path} -> {status}");
                        return Ok(ApiResponse { status, body });
                    }
                    tracing::warn!("{method} {url} returned {status}, retrying");
                    last_error = Some(format!("HTTP server error: {status}"));
                }
                Err(e) => {
                    tracing::warn!("{method} {url} failed: {e}");
                    last_error = Some(format!("Network error: {e}"));
                }
            }

            if attempt < self.retry.max_retries {
                std::thread::sleep(self.retry.delay(attempt));
            }
        }

        Err(ObjFunError::Transport(format!(
            "All {} attempts failed: {}",
            self.retry.max_retries + 1,
            last_error.unwrap_or_default()
        )))
    }
}

impl Transport for Proxy {
    fn get(&self, path: &str) -> ObjFunResult<ApiResponse> {
        self.send(Method::GET, path, None, |r| self.authenticated(r))
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> ObjFunResult<ApiResponse> {
        self.send(Method::POST, path, Some(body), |r| self.authenticated(r))
    }

    fn put(&self, path: &str, body: &serde_json::Value) -> ObjFunResult<ApiResponse> {
        self.send(Method::PUT, path, Some(body), |r| self.authenticated(r))
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("url_base", &self.url_base)
            .field("has_token", &!self.token.is_empty())
            .finish_non_exhaustive()
    }
}
