//! The network side of the proxy.

use async_trait::async_trait;
use shelter_core::{Error, ProxyRequest, ResponseSnapshot};

/// Something that can answer a request over the network.
///
/// Implementations return `Ok` for every HTTP response, whatever its status.
/// `Err` means the request never produced a response (connection refused,
/// timeout, truncated body), which is the only condition strategies treat as
/// being offline.
#[async_trait]
pub trait Origin: Send + Sync {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ResponseSnapshot, Error>;
}
