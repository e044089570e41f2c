//! Precache population for a new generation.
//!
//! All manifest resources are fetched before anything is written. A single
//! failed fetch or non-2xx status aborts the whole population, so a generation
//! is either complete or never written to by this module.

use futures_util::future::try_join_all;
use shelter_core::{CacheDb, CacheEntry, Error, GenerationHandle, ProxyRequest, ResponseSnapshot};
use url::Url;

use crate::origin::Origin;

async fn fetch_manifest_entry(origin: &dyn Origin, url: &Url) -> Result<(ProxyRequest, ResponseSnapshot), Error> {
    let request = ProxyRequest::get(url.clone());
    let response = origin
        .fetch(&request)
        .await
        .map_err(|e| Error::PrecacheFailure { url: url.to_string(), reason: e.to_string() })?;

    if !response.is_success() {
        return Err(Error::PrecacheFailure { url: url.to_string(), reason: format!("status {}", response.status) });
    }

    Ok((request, response))
}

/// Fetch every manifest URL and store the responses in `generation`.
///
/// Returns the number of entries written.
///
/// # Errors
///
/// Returns [`Error::PrecacheFailure`] naming the first resource that could not
/// be fetched, returned a non-2xx status, or could not be stored.
pub async fn populate(
    store: &CacheDb, origin: &dyn Origin, generation: &GenerationHandle, manifest: &[Url],
) -> Result<usize, Error> {
    let fetched = try_join_all(manifest.iter().map(|url| fetch_manifest_entry(origin, url))).await?;

    for (request, response) in &fetched {
        let entry = CacheEntry::new(request, response.clone());
        store
            .put_entry(generation, &entry)
            .await
            .map_err(|e| Error::PrecacheFailure { url: request.url.to_string(), reason: e.to_string() })?;
    }

    tracing::info!(generation = %generation, entries = fetched.len(), "precache complete");
    Ok(fetched.len())
}
