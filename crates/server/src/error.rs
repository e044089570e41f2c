//! Tool-level errors for the shelter server.
//!
//! Proxy and store failures arrive as `shelter_core::Error` and convert
//! straight into MCP errors; this type covers problems in the tool layer
//! itself.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Parameters that parse but make no sense (e.g., a blank header name).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Tool output could not be encoded as JSON.
    #[error("ENCODE_FAILED: {0}")]
    Encode(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::Encode(msg) => (-32000, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
