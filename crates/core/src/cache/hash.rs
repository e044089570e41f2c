//! Request-identity cache key generation.

use sha2::{Digest, Sha256};

use crate::model::ProxyRequest;

/// Compute the cache key for a method and canonical URL.
///
/// The URL must already be canonicalized (lowercase host, no fragment);
/// the query string is part of the identity.
pub fn compute_request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache key for an intercepted request. Fragments never reach the origin,
/// so they are not part of the identity.
pub fn request_key(request: &ProxyRequest) -> String {
    let mut url = request.url.clone();
    url.set_fragment(None);
    compute_request_key(request.method.as_str(), url.as_str())
}
