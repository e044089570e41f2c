//! Caching strategies.
//!
//! Each request class is bound to one strategy:
//!
//! | class          | strategy                 | network                         | store                |
//! |----------------|--------------------------|---------------------------------|----------------------|
//! | `NAVIGATION`   | navigation fallback      | always, first                   | read shell offline   |
//! | `STATIC_ASSET` | cache first              | only on a miss                  | write 2xx on a miss  |
//! | `OTHER`        | stale while revalidate   | always, in the background       | write 2xx, always    |
//!
//! Store writes never affect the response the caller gets; their failures
//! are logged and dropped.

use std::sync::Arc;

use shelter_core::{CacheDb, CacheEntry, Error, GenerationHandle, ProxyRequest, RequestClass, ResponseSnapshot};
use tokio::sync::oneshot;
use url::Url;

use super::background::Background;
use super::{ProxyResponse, Source};
use crate::origin::Origin;

/// How a classified request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NavigationFallback,
    CacheFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn for_class(class: RequestClass) -> Self {
        match class {
            RequestClass::Navigation => Strategy::NavigationFallback,
            RequestClass::StaticAsset => Strategy::CacheFirst,
            RequestClass::Other => Strategy::StaleWhileRevalidate,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::NavigationFallback => "navigation-fallback",
            Strategy::CacheFirst => "cache-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

/// Runs strategies against one generation.
///
/// Cheap to clone; background tasks take their own copy.
#[derive(Clone)]
pub(crate) struct Executor {
    pub(crate) store: CacheDb,
    pub(crate) origin: Arc<dyn Origin>,
    pub(crate) generation: GenerationHandle,
    pub(crate) background: Background,
    pub(crate) fallbacks: Arc<[Url]>,
}

impl Executor {
    pub(crate) async fn run(&self, strategy: Strategy, request: ProxyRequest) -> Result<ProxyResponse, Error> {
        match strategy {
            Strategy::NavigationFallback => self.navigation_fallback(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    /// Network first; on a transport failure serve the cached shell document.
    async fn navigation_fallback(&self, request: ProxyRequest) -> Result<ProxyResponse, Error> {
        let err = match self.origin.fetch(&request).await {
            Ok(response) => return Ok(ProxyResponse::new(response, Source::Network)),
            Err(e) if e.is_transport() => e,
            Err(e) => return Err(e),
        };

        tracing::debug!(url = %request.url, error = %err, "navigation failed; looking for cached shell");

        for url in self.fallbacks.iter() {
            if let Some(entry) = self.lookup(&ProxyRequest::get(url.clone())).await {
                tracing::debug!(url = %request.url, shell = %url, "serving cached shell");
                return Ok(ProxyResponse::new(entry.response, Source::Cache));
            }
        }

        tracing::warn!(url = %request.url, generation = %self.generation, "offline with no cached shell");
        Ok(ProxyResponse::new(ResponseSnapshot::offline(), Source::Offline))
    }

    /// Serve from the store; fetch and store only on a miss.
    async fn cache_first(&self, request: ProxyRequest) -> Result<ProxyResponse, Error> {
        if let Some(entry) = self.lookup(&request).await {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok(ProxyResponse::new(entry.response, Source::Cache));
        }

        tracing::debug!(url = %request.url, "cache miss");
        let response = self.origin.fetch(&request).await?;

        if response.is_success() {
            // runs detached so a cancelled caller still populates the store
            let stored = self.store_in_background(&request, response.clone());
            let _ = stored.await;
        }

        Ok(ProxyResponse::new(response, Source::Network))
    }

    /// Serve the cached copy at once while the network refreshes it.
    async fn stale_while_revalidate(&self, request: ProxyRequest) -> Result<ProxyResponse, Error> {
        let (tx, rx) = oneshot::channel();
        let revalidate = self.clone();
        let revalidate_request = request.clone();

        self.background.spawn(async move {
            let result = revalidate.origin.fetch(&revalidate_request).await;
            let fresh = match &result {
                Ok(response) if response.is_success() => Some(response.clone()),
                Ok(response) => {
                    tracing::debug!(url = %revalidate_request.url, status = response.status, "not caching response");
                    None
                }
                Err(e) => {
                    tracing::debug!(url = %revalidate_request.url, error = %e, "revalidation fetch failed");
                    None
                }
            };

            // the caller may already have been answered from the store
            let _ = tx.send(result);

            if let Some(response) = fresh {
                revalidate.write(&revalidate_request, response).await;
            }
        });

        if let Some(entry) = self.lookup(&request).await {
            tracing::debug!(url = %request.url, "cache hit; revalidating in background");
            return Ok(ProxyResponse::new(entry.response, Source::Cache));
        }

        match rx.await {
            Ok(Ok(response)) => Ok(ProxyResponse::new(response, Source::Network)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::NetworkFailure(format!("revalidation aborted: {}", request.url))),
        }
    }

    /// Store lookup; read errors count as a miss.
    async fn lookup(&self, request: &ProxyRequest) -> Option<CacheEntry> {
        match self.store.match_request(&self.generation, request).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(url = %request.url, generation = %self.generation, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn write(&self, request: &ProxyRequest, response: ResponseSnapshot) {
        let entry = CacheEntry::new(request, response);
        if let Err(e) = self.store.put_entry(&self.generation, &entry).await {
            tracing::warn!(url = %request.url, generation = %self.generation, error = %e, "cache write failed");
        }
    }

    fn store_in_background(&self, request: &ProxyRequest, response: ResponseSnapshot) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        let executor = self.clone();
        let request = request.clone();
        self.background.spawn(async move {
            executor.write(&request, response).await;
            let _ = tx.send(());
        });
        rx
    }
}
