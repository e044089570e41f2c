//! Scripted origin for proxy tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use shelter_core::{Error, ProxyRequest, ResponseSnapshot};
use url::Url;

use crate::origin::Origin;

/// Answers from a fixed URL table; unknown URLs and offline mode are
/// transport failures.
#[derive(Default)]
pub(crate) struct MockOrigin {
    responses: Mutex<HashMap<String, ResponseSnapshot>>,
    calls: Mutex<Vec<String>>,
    total: AtomicUsize,
    offline: AtomicBool,
    delay: Option<Duration>,
}

impl MockOrigin {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_ok(self, url: Url, body: &'static str) -> Self {
        self.with_response(url, ResponseSnapshot::new(200, vec![("content-type".into(), "text/plain".into())], body))
    }

    pub(crate) fn with_response(self, url: Url, response: ResponseSnapshot) -> Self {
        self.set_response(&url, response);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn set_response(&self, url: &Url, response: ResponseSnapshot) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, url: &Url) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url.as_str())
            .count()
    }
}

#[async_trait]
impl Origin for MockOrigin {
    async fn fetch(&self, request: &ProxyRequest) -> Result<ResponseSnapshot, Error> {
        self.total.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(request.url.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::NetworkFailure(format!("offline: {}", request.url)));
        }

        let response = self.responses.lock().unwrap().get(request.url.as_str()).cloned();
        response.ok_or_else(|| Error::NetworkFailure(format!("connection refused: {}", request.url)))
    }
}
