//! HTTP origin client.
//!
//! ### Transport vs. status
//! - Every HTTP response, 2xx or not, is returned as a [`ResponseSnapshot`]
//! - Only transport problems are errors: connect/DNS failures, timeouts,
//!   body read failures and bodies larger than `max_bytes`
//!
//! ### Limits
//! - Max redirects: 5 (configurable)
//! - Max body bytes: 5MB (configurable)

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::HeaderMap;
use shelter_core::{AppConfig, Error, Method, ProxyRequest, ResponseSnapshot};
use std::time::{Duration, Instant};

use crate::origin::Origin;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "shelter/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "shelter/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn transport_error(request: &ProxyRequest, err: &reqwest::Error) -> Error {
    if err.is_builder() {
        Error::InvalidInput(format!("{} {}: {}", request.method, request.url, err))
    } else if err.is_timeout() {
        Error::NetworkFailure(format!("timeout: {} {}", request.method, request.url))
    } else {
        Error::NetworkFailure(format!("{} {}: {}", request.method, request.url, err))
    }
}

/// HTTP client for the origin and third-party static hosts.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::InvalidInput(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn too_large(&self, request: &ProxyRequest, len: usize) -> Error {
        Error::FetchTooLarge(format!("{}: {} bytes exceeds {}", request.url, len, self.config.max_bytes))
    }
}

#[async_trait]
impl Origin for FetchClient {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ResponseSnapshot, Error> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(to_reqwest_method(request.method), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| transport_error(request, &e))?;
        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(self.too_large(request, len as usize));
        }

        let headers = collect_headers(response.headers());

        let bytes = response.bytes().await.map_err(|e| transport_error(request, &e))?;

        if bytes.len() > self.config.max_bytes {
            return Err(self.too_large(request, bytes.len()));
        }

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            bytes = bytes.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "origin fetch complete"
        );

        Ok(ResponseSnapshot::new(status.as_u16(), headers, bytes))
    }
}

/// Header list in wire order. Values that are not valid UTF-8 are kept with
/// replacement characters rather than dropped.
fn collect_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = match value.to_str() {
                Ok(v) => v.to_string(),
                Err(_) => {
                    tracing::debug!(header = %name, "non UTF-8 header value stored lossily");
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                }
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}
