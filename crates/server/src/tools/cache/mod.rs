//! Cache-related MCP tools.
//!
//! Read-only views of the generation that currently controls requests.

pub mod get;

pub use get::{CacheGetParams, get_impl};
