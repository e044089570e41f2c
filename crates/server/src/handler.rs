//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the cache proxy.
use std::sync::Arc;

use crate::tools::cache::{CacheGetParams, get_impl};
use crate::tools::proxy_fetch::{ProxyFetchParams, fetch_impl};
use crate::tools::proxy_status::status_impl;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use shelter_client::CacheProxy;

/// The main MCP server handler for shelter.
#[derive(Clone)]
pub struct ShelterServer {
    tool_router: ToolRouter<Self>,
    proxy: Arc<CacheProxy>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ShelterServer {
    /// Create a new server handler around a ready proxy.
    pub fn new(proxy: Arc<CacheProxy>) -> Self {
        Self { tool_router: Self::tool_router(), proxy }
    }

    /// Send a request through the cache proxy.
    ///
    /// Navigations fall back to the cached app shell when offline, static assets
    /// are served cache-first and everything else is stale-while-revalidate.
    #[tool(
        description = "Send a request through the offline cache proxy. Returns status, headers, body and whether the response came from the network, the cache, or the offline page."
    )]
    async fn proxy_fetch(&self, params: Parameters<ProxyFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.proxy, params.0).await
    }

    #[tool(description = "Read the response stored for a URL in the active generation. Never touches the network.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.proxy, params.0).await
    }

    #[tool(description = "Report the cache generation lifecycle: state, active generation, stored generations and entry count.")]
    async fn proxy_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.proxy).await
    }
}

impl ServerHandler for ShelterServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shelter".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
