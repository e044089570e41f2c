//! MCP tool implementations.
//!
//! This module contains all tools exposed by the shelter server.

pub mod cache;
pub mod proxy_fetch;
pub mod proxy_status;

#[cfg(test)]
pub(crate) mod testing;

use rmcp::model::{CallToolResult, Content};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// One response header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Header {
    pub name: String,
    pub value: String,
}

pub(crate) fn headers_out(headers: &[(String, String)]) -> Vec<Header> {
    headers
        .iter()
        .map(|(name, value)| Header { name: name.clone(), value: value.clone() })
        .collect()
}

/// Pretty JSON text content, the shape every tool returns.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, ToolError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Encode(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
