//! Shared fixtures for tool tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use shelter_client::{CacheProxy, Origin, ProxySettings};
use shelter_core::{CacheDb, Error, ProxyRequest, ResponseSnapshot, StaticRules};
use url::Url;

pub(crate) fn url(path: &str) -> Url {
    Url::parse("https://loans.example.com/").unwrap().join(path).unwrap()
}

/// Fixed-table origin that can be switched offline.
#[derive(Default)]
pub(crate) struct TableOrigin {
    responses: HashMap<String, ResponseSnapshot>,
    offline: AtomicBool,
}

impl TableOrigin {
    pub(crate) fn with(mut self, path: &str, status: u16, body: &'static str) -> Self {
        self.responses.insert(url(path).to_string(), ResponseSnapshot::new(status, vec![], body));
        self
    }

    pub(crate) fn set_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Origin for TableOrigin {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ResponseSnapshot, Error> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::NetworkFailure(format!("offline: {}", request.url)));
        }
        self.responses
            .get(request.url.as_str())
            .cloned()
            .ok_or_else(|| Error::NetworkFailure(format!("connection refused: {}", request.url)))
    }
}

/// An active proxy over `origin` with `/index.html` precached.
pub(crate) async fn active_proxy(origin: Arc<TableOrigin>) -> Arc<CacheProxy> {
    let settings = ProxySettings {
        generation: "v1".into(),
        manifest: vec![url("/index.html")],
        navigation_fallbacks: vec![url("/index.html")],
        rules: StaticRules::default(),
    };
    let proxy = CacheProxy::new(CacheDb::open_in_memory().await.unwrap(), origin, settings);
    proxy.on_install().await.unwrap();
    proxy.on_activate().await.unwrap();
    Arc::new(proxy)
}

/// Text of the first content block.
pub(crate) fn text(result: &rmcp::model::CallToolResult) -> String {
    result.content[0].as_text().unwrap().text.clone()
}
