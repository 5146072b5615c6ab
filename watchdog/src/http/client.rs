//! HTTP session against a single base URL.

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{Result, WatchdogError};
use crate::policy::{with_retry, RetryConfig};

/// Headers sent on every request unless the caller overrides them.
///
/// `Accept-Encoding` is negotiated by reqwest itself (gzip, deflate).
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[
    ("user-agent", "DxWatchDog"),
    ("accept", "*/*"),
    ("connection", "keep-alive"),
    ("content-type", "application/json"),
];

/// Transport options for an [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpOptions {
    /// Whether to verify TLS certificates.
    #[serde(default)]
    pub verify_tls: bool,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry policy for transport failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            verify_tls: false,
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// A JSON HTTP session bound to one base URL.
///
/// Paths are resolved against the base URL, session headers (default plus
/// caller-supplied plus anything set later with [`HttpClient::set_header`])
/// go out on every request, and transport failures are retried.
#[derive(Debug)]
pub struct HttpClient {
    base_url: Url,
    inner: reqwest::Client,
    headers: RwLock<HeaderMap>,
    retry: RetryConfig,
}

impl HttpClient {
    /// Creates a client with default options.
    pub fn new(base_url: &str, headers: &[(&str, &str)]) -> Result<Self> {
        Self::with_options(base_url, headers, &HttpOptions::default())
    }

    /// Creates a client with explicit transport options.
    pub fn with_options(base_url: &str, headers: &[(&str, &str)], options: &HttpOptions) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| WatchdogError::Url(format!("{base_url}: {e}")))?;

        let mut merged = HeaderMap::new();
        for (name, value) in DEFAULT_HEADERS.iter().chain(headers.iter()) {
            let (name, value) = parse_header(name, value)?;
            merged.insert(name, value);
        }

        let inner = reqwest::Client::builder()
            .danger_accept_invalid_certs(!options.verify_tls)
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            inner,
            headers: RwLock::new(merged),
            retry: options.retry.clone(),
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| WatchdogError::Url(format!("{path}: {e}")))
    }

    /// Adds or replaces a header on every later request.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.write().insert(name, value);
        Ok(())
    }

    /// Returns the current value of a session header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .read()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Sends a GET request.
    pub async fn get(&self, path: &str) -> Result<Response> {
        self.send(Method::GET, path, &[], None).await
    }

    /// Sends a POST request with a JSON body.
    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, &[], Some(body)).await
    }

    /// Sends a POST request with query parameters and a JSON body.
    pub async fn post_json_with_query<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &B,
    ) -> Result<Response> {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, query, Some(body)).await
    }

    /// Sends a PUT request with a JSON body.
    pub async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let body = serde_json::to_value(body)?;
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    /// GETs `path` and decodes a 2xx JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Self::json_or_error(self.get(path).await?).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<Response> {
        let url = self.url(path)?;
        let headers = self.headers.read().clone();
        debug!(method = %method, url = %url, "Sending request");

        with_retry(&self.retry, url.as_str(), WatchdogError::is_connect_failure, || {
            let mut request = self
                .inner
                .request(method.clone(), url.clone())
                .headers(headers.clone());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = &body {
                request = request.json(body);
            }
            async move { request.send().await.map_err(WatchdogError::from) }
        })
        .await
    }

    /// Returns the decoded JSON body of a 2xx response.
    ///
    /// Any other status becomes [`WatchdogError::Client`] carrying the
    /// status code and the raw body.
    pub async fn json_or_error<T: DeserializeOwned>(response: Response) -> Result<T> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn ensure_success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = WatchdogError::client(status.as_u16(), body);
        warn!("{err}");
        Err(err)
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| WatchdogError::config(format!("invalid header name {name:?}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| WatchdogError::config(format!("invalid value for header {name}: {e}")))?;
    Ok((name, value))
}
