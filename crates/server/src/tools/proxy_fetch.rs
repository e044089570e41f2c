//! proxy_fetch tool implementation.
//!
//! Sends one request through the cache proxy, exactly as an intercepted
//! application request would be handled.

use std::collections::BTreeMap;
use std::str::FromStr;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::CacheProxy;
use shelter_core::{Destination, Error, Method, ProxyRequest, canonicalize};

use super::{Header, headers_out, json_result};
use crate::error::ToolError;

/// Input parameters for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchParams {
    /// The URL to request.
    pub url: String,

    /// HTTP method (default: GET). Only GET and HEAD are cached.
    #[serde(default)]
    pub method: Option<String>,

    /// Treat the request as a top-level page load.
    #[serde(default)]
    pub navigate: bool,

    /// Request destination, e.g. "font", "image", "script".
    #[serde(default)]
    pub destination: Option<String>,

    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Output structure for proxy_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyFetchOutput {
    /// The canonical URL that was requested.
    pub url: String,
    pub status: u16,
    pub headers: Vec<Header>,
    /// Body decoded as UTF-8; invalid sequences are replaced.
    pub body: String,
    pub body_bytes: usize,
    /// "network", "cache" or "offline".
    pub source: String,
    /// Request class, absent for requests that bypassed the cache.
    pub classification: Option<String>,
    /// ISO8601 timestamp of when the response was captured.
    pub captured_at: String,
}

pub(crate) fn parse_method(method: Option<&str>) -> Result<Method, Error> {
    method.map_or(Ok(Method::Get), Method::from_str)
}

fn build_request(params: ProxyFetchParams) -> Result<ProxyRequest, McpError> {
    let url = canonicalize(&params.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;
    let method = parse_method(params.method.as_deref())?;
    let destination = match params.destination.as_deref() {
        Some(d) => Destination::from_str(d)?,
        None => Destination::Empty,
    };

    let mut request = ProxyRequest::get(url).with_method(method).with_destination(destination);
    request.navigate = params.navigate;

    for (name, value) in params.headers {
        if name.trim().is_empty() {
            return Err(ToolError::InvalidInput("header names must not be blank".into()).into());
        }
        request = request.with_header(name, value);
    }

    Ok(request)
}

/// Implementation of the proxy_fetch tool.
pub async fn fetch_impl(proxy: &CacheProxy, params: ProxyFetchParams) -> Result<CallToolResult, McpError> {
    let request = build_request(params)?;
    let url = request.url.to_string();

    let served = proxy.handle(request).await?;

    let output = ProxyFetchOutput {
        url,
        status: served.response.status,
        headers: headers_out(&served.response.headers),
        body: String::from_utf8_lossy(&served.response.body).into_owned(),
        body_bytes: served.response.body.len(),
        source: served.source.as_str().to_string(),
        classification: served.class.map(|c| c.to_string()),
        captured_at: served.response.captured_at.to_rfc3339(),
    };

    Ok(json_result(&output)?)
}
