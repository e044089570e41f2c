//! Core types and shared functionality for shelter.
//!
//! This crate provides:
//! - Generation-partitioned response store with SQLite backend
//! - Request/response model and request classification
//! - URL canonicalization shared by configuration and request handling
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod canonical;
pub mod classify;
pub mod config;
pub mod error;
pub mod model;

pub use cache::{CacheDb, CacheEntry, GenerationHandle};
pub use canonical::{UrlError, canonicalize};
pub use classify::{RequestClass, StaticRules, classify};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use model::{Destination, Method, ProxyRequest, ResponseSnapshot};
