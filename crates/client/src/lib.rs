//! Client code for shelter.
//!
//! This crate provides the HTTP origin client and the cache proxy engine:
//! request strategies, precaching and the generation lifecycle.

pub mod fetch;
pub mod origin;
pub mod proxy;

pub use fetch::{FetchClient, FetchConfig};
pub use origin::Origin;
pub use proxy::lifecycle::{GenerationManager, GenerationState};
pub use proxy::strategy::Strategy;
pub use proxy::{CacheProxy, ProxyResponse, ProxySettings, ProxyStatus, Source};
