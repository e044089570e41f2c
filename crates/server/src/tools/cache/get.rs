//! cache_get tool implementation.
//!
//! Retrieves the stored response for a request from the controlling
//! generation, without touching the network.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::CacheProxy;
use shelter_core::{Error, ProxyRequest, canonicalize};

use crate::tools::proxy_fetch::parse_method;
use crate::tools::{Header, headers_out, json_result};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// The URL of the cached request.
    pub url: String,

    /// HTTP method of the cached request (default: GET).
    #[serde(default)]
    pub method: Option<String>,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    /// Request key (SHA-256 of method and URL).
    pub key: String,
    pub generation: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: String,
    pub body_bytes: usize,
    pub captured_at: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(proxy: &CacheProxy, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let url = canonicalize(&params.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;
    let method = parse_method(params.method.as_deref())?;

    let entry = proxy.lookup(&ProxyRequest::get(url).with_method(method)).await?;
    let generation = proxy.controller().await.unwrap_or_default();

    let output = CacheGetOutput {
        key: entry.key,
        generation,
        method: entry.method,
        url: entry.url,
        status: entry.response.status,
        headers: headers_out(&entry.response.headers),
        body: String::from_utf8_lossy(&entry.response.body).into_owned(),
        body_bytes: entry.response.body.len(),
        captured_at: entry.response.captured_at.to_rfc3339(),
    };

    Ok(json_result(&output)?)
}
