//! proxy_status tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shelter_client::CacheProxy;

use super::json_result;

/// Output from the proxy_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProxyStatusOutput {
    /// Generation this build installs.
    pub target: String,
    /// URLs the target generation precaches.
    pub manifest: Vec<String>,
    /// Lifecycle state of the target generation.
    pub state: String,
    /// Generation currently answering requests, if any.
    pub controller: Option<String>,
    /// Every generation in the store.
    pub generations: Vec<String>,
    /// Entries stored in the controlling generation.
    pub entries: u64,
    /// Background writes and revalidations still running.
    pub pending_tasks: usize,
}

/// Implementation of the proxy_status tool.
pub async fn status_impl(proxy: &CacheProxy) -> Result<CallToolResult, McpError> {
    let status = proxy.status().await?;

    let output = ProxyStatusOutput {
        target: status.target,
        manifest: status.manifest,
        state: status.state.to_string(),
        controller: status.controller,
        generations: status.generations,
        entries: status.entries,
        pending_tasks: status.pending_tasks,
    };

    Ok(json_result(&output)?)
}
