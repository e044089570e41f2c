//! Offline request interception and response caching.
//!
//! [`CacheProxy`] sits between an application and its origin. Every outbound
//! request is classified, then answered by the strategy bound to its class
//! (see [`strategy`]) against the generation that currently controls traffic
//! (see [`lifecycle`]).
//!
//! ### Pass-through
//! - Methods other than GET and HEAD go straight to the network
//! - Until a generation controls traffic every request does too; failed
//!   navigations still get the offline page

pub mod lifecycle;
pub mod precache;
pub mod strategy;

mod background;
#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use serde::Serialize;
use shelter_core::cache::hash::request_key;
use shelter_core::{
    AppConfig, CacheDb, CacheEntry, ConfigError, Error, ProxyRequest, RequestClass, ResponseSnapshot, StaticRules,
    classify,
};
use url::Url;

use self::background::Background;
use self::lifecycle::{GenerationManager, GenerationState};
use self::strategy::{Executor, Strategy};
use crate::origin::Origin;

/// Resolved proxy settings.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Version name of the generation to install.
    pub generation: String,
    /// Absolute URLs precached at install.
    pub manifest: Vec<Url>,
    /// Shell documents tried, in order, for failed navigations.
    pub navigation_fallbacks: Vec<Url>,
    pub rules: StaticRules,
}

impl ProxySettings {
    /// Resolve manifest and fallback entries against the configured origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin or any entry does not
    /// resolve to an http(s) URL; exactly the entries `AppConfig::validate`
    /// rejects.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            generation: config.generation.clone(),
            manifest: config.manifest_urls()?,
            navigation_fallbacks: config.fallback_urls()?,
            rules: config.static_rules(),
        })
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Network,
    Cache,
    /// Synthesized because neither the network nor the store could answer.
    Offline,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Network => "network",
            Source::Cache => "cache",
            Source::Offline => "offline",
        }
    }
}

/// A response together with how it was produced.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub response: ResponseSnapshot,
    pub source: Source,
    /// `None` for requests that bypassed classification.
    pub class: Option<RequestClass>,
}

impl ProxyResponse {
    pub(crate) fn new(response: ResponseSnapshot, source: Source) -> Self {
        Self { response, source, class: None }
    }

    fn classified(mut self, class: RequestClass) -> Self {
        self.class = Some(class);
        self
    }
}

/// Snapshot of proxy state for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatus {
    pub target: String,
    /// URLs the target generation precaches.
    pub manifest: Vec<String>,
    pub state: GenerationState,
    pub controller: Option<String>,
    pub generations: Vec<String>,
    pub entries: u64,
    pub pending_tasks: usize,
}

/// The cache proxy.
pub struct CacheProxy {
    store: CacheDb,
    origin: Arc<dyn Origin>,
    settings: ProxySettings,
    manager: GenerationManager,
    background: Background,
    fallbacks: Arc<[Url]>,
}

impl CacheProxy {
    pub fn new(store: CacheDb, origin: Arc<dyn Origin>, settings: ProxySettings) -> Self {
        let manager = GenerationManager::new(settings.generation.clone(), settings.manifest.clone());
        let fallbacks = Arc::from(settings.navigation_fallbacks.clone());
        Self { store, origin, settings, manager, background: Background::default(), fallbacks }
    }

    /// Precache the target generation.
    pub async fn on_install(&self) -> Result<(), Error> {
        self.manager.install(&self.store, self.origin.as_ref()).await
    }

    /// Make the installed generation the only one.
    pub async fn on_activate(&self) -> Result<(), Error> {
        self.manager.activate(&self.store).await
    }

    /// Answer one intercepted request.
    ///
    /// # Errors
    ///
    /// Transport failures surface as [`Error::NetworkFailure`] or
    /// [`Error::FetchTooLarge`] wherever the strategy has nothing cached to
    /// serve instead. Navigations never fail for transport reasons.
    pub async fn handle(&self, request: ProxyRequest) -> Result<ProxyResponse, Error> {
        if !request.method.is_cacheable() {
            tracing::debug!(method = %request.method, url = %request.url, "bypassing cache");
            let response = self.origin.fetch(&request).await?;
            return Ok(ProxyResponse::new(response, Source::Network));
        }

        let class = classify(&request, &self.settings.rules);

        let Some(generation) = self.manager.controller().await else {
            return self.pass_through(request, class).await;
        };

        let strategy = Strategy::for_class(class);
        tracing::debug!(
            url = %request.url,
            class = %class,
            strategy = strategy.name(),
            generation = %generation,
            "intercepted request"
        );

        let executor = Executor {
            store: self.store.clone(),
            origin: self.origin.clone(),
            generation,
            background: self.background.clone(),
            fallbacks: self.fallbacks.clone(),
        };
        let served = executor.run(strategy, request).await?;
        Ok(served.classified(class))
    }

    async fn pass_through(&self, request: ProxyRequest, class: RequestClass) -> Result<ProxyResponse, Error> {
        match self.origin.fetch(&request).await {
            Ok(response) => Ok(ProxyResponse::new(response, Source::Network).classified(class)),
            Err(e) if class == RequestClass::Navigation && e.is_transport() => {
                tracing::warn!(url = %request.url, error = %e, "offline before any generation was installed");
                Ok(ProxyResponse::new(ResponseSnapshot::offline(), Source::Offline).classified(class))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn state(&self) -> GenerationState {
        self.manager.state().await
    }

    /// Name of the generation currently answering requests.
    pub async fn controller(&self) -> Option<String> {
        self.manager.controller().await.map(|g| g.name().to_string())
    }

    pub fn store(&self) -> &CacheDb {
        &self.store
    }

    /// Wait for every background write and revalidation started so far.
    pub async fn settle(&self) {
        self.background.settle().await;
    }

    /// Look a request up in the controlling generation without touching the
    /// network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheMiss`] if no generation controls traffic or no
    /// entry matches.
    pub async fn lookup(&self, request: &ProxyRequest) -> Result<CacheEntry, Error> {
        let generation = self
            .manager
            .controller()
            .await
            .ok_or_else(|| Error::CacheMiss("no generation controls requests".into()))?;

        self.store
            .get_entry(&generation, &request_key(request))
            .await?
            .ok_or_else(|| Error::CacheMiss(format!("{} {} in {}", request.method, request.url, generation)))
    }

    pub async fn status(&self) -> Result<ProxyStatus, Error> {
        let controller = self.manager.controller().await;
        let entries = match &controller {
            Some(generation) => self.store.count_entries(generation).await?,
            None => 0,
        };

        Ok(ProxyStatus {
            target: self.manager.target().to_string(),
            manifest: self.manager.manifest().iter().map(Url::to_string).collect(),
            state: self.manager.state().await,
            controller: controller.map(|g| g.name().to_string()),
            generations: self.store.list_generations().await?,
            entries,
            pending_tasks: self.background.pending(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mock::MockOrigin;
    use shelter_core::Destination;
    use shelter_core::cache::hash::compute_request_key;
    use std::time::Duration;

    const ORIGIN: &str = "https://loans.example.com/";

    fn url(path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    fn settings(generation: &str) -> ProxySettings {
        ProxySettings {
            generation: generation.into(),
            manifest: vec![url("/"), url("/index.html"), url("/manifest.json")],
            navigation_fallbacks: vec![url("/index.html"), url("/")],
            rules: StaticRules::new(["cdn.tailwindcss.com"], [Destination::Font, Destination::Image]),
        }
    }

    fn app_origin() -> MockOrigin {
        MockOrigin::new()
            .with_ok(url("/"), "<html>root v1</html>")
            .with_ok(url("/index.html"), "<html>shell v1</html>")
            .with_ok(url("/manifest.json"), "{\"name\":\"loans\"}")
    }

    async fn proxy(store: CacheDb, origin: Arc<MockOrigin>, generation: &str) -> CacheProxy {
        CacheProxy::new(store, origin, settings(generation))
    }

    async fn active_proxy(origin: Arc<MockOrigin>) -> CacheProxy {
        let store = CacheDb::open_in_memory().await.unwrap();
        let proxy = proxy(store, origin, "v1").await;
        proxy.on_install().await.unwrap();
        proxy.on_activate().await.unwrap();
        proxy
    }

    #[test]
    fn test_settings_from_config() {
        let config = AppConfig {
            origin: "https://loans.example.com/app/".into(),
            precache: vec!["./".into(), "./index.html".into(), "https://cdn.tailwindcss.com".into()],
            ..Default::default()
        };

        let settings = ProxySettings::from_config(&config).unwrap();

        assert_eq!(settings.generation, "app-shell-v1");
        assert_eq!(settings.manifest[0].as_str(), "https://loans.example.com/app/");
        assert_eq!(settings.manifest[1].as_str(), "https://loans.example.com/app/index.html");
        assert_eq!(settings.manifest[2].as_str(), "https://cdn.tailwindcss.com/");
        assert_eq!(settings.navigation_fallbacks[0].as_str(), "https://loans.example.com/app/index.html");
        assert!(settings.rules.is_static_host("fonts.gstatic.com"));
    }

    #[test]
    fn test_settings_agree_with_validation() {
        let config = AppConfig {
            precache: vec!["./index.html".into(), "ftp://files.example.com/app.js".into()],
            ..Default::default()
        };

        let validated = config.validate();
        let settings = ProxySettings::from_config(&config);

        assert!(validated.is_err());
        assert!(matches!(settings, Err(ConfigError::Invalid { field, .. }) if field == "precache"));
    }

    #[test]
    fn test_settings_reject_bad_origin() {
        let config = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert!(matches!(ProxySettings::from_config(&config), Err(ConfigError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_shell() {
        let origin = Arc::new(app_origin());
        let proxy = active_proxy(origin.clone()).await;

        origin.set_offline(true);
        let served = proxy.handle(ProxyRequest::navigation(url("/loans/42"))).await.unwrap();

        assert_eq!(served.source, Source::Cache);
        assert_eq!(served.class, Some(RequestClass::Navigation));
        assert_eq!(served.response.status, 200);
        assert_eq!(&served.response.body[..], b"<html>shell v1</html>");
    }

    #[tokio::test]
    async fn test_precached_script_served_without_network() {
        let origin = Arc::new(
            MockOrigin::new()
                .with_ok(url("/index.html"), "<html>shell</html>")
                .with_ok(url("/app.js"), "boot()"),
        );
        let settings = ProxySettings {
            generation: "v1".into(),
            manifest: vec![url("/index.html"), url("/app.js")],
            navigation_fallbacks: vec![url("/index.html")],
            rules: StaticRules::new(Vec::<String>::new(), [Destination::Script]),
        };
        let proxy = CacheProxy::new(CacheDb::open_in_memory().await.unwrap(), origin.clone(), settings);
        proxy.on_install().await.unwrap();
        proxy.on_activate().await.unwrap();
        assert_eq!(proxy.state().await, GenerationState::Active);

        let before = origin.calls();
        let served = proxy
            .handle(ProxyRequest::get(url("/app.js")).with_destination(Destination::Script))
            .await
            .unwrap();

        assert_eq!(served.source, Source::Cache);
        assert_eq!(served.class, Some(RequestClass::StaticAsset));
        assert_eq!(&served.response.body[..], b"boot()");
        assert_eq!(origin.calls(), before);
    }

    #[tokio::test]
    async fn test_uncached_api_offline_is_network_failure() {
        let origin = Arc::new(app_origin());
        let proxy = active_proxy(origin.clone()).await;

        origin.set_offline(true);
        let result = proxy.handle(ProxyRequest::get(url("/api/loans"))).await;

        assert!(matches!(result, Err(Error::NetworkFailure(_))));
    }

    #[tokio::test]
    async fn test_static_font_cached_after_first_fetch() {
        let font = Url::parse("https://fonts.gstatic.com/s/inter/v1.woff2").unwrap();
        let origin = Arc::new(app_origin().with_ok(font.clone(), "woff2"));
        let proxy = active_proxy(origin.clone()).await;

        let first = proxy
            .handle(ProxyRequest::get(font.clone()).with_destination(Destination::Font))
            .await
            .unwrap();
        assert_eq!(first.source, Source::Network);
        assert_eq!(first.class, Some(RequestClass::StaticAsset));

        origin.set_offline(true);
        let second = proxy
            .handle(ProxyRequest::get(font.clone()).with_destination(Destination::Font))
            .await
            .unwrap();

        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.response.body, first.response.body);
        assert_eq!(origin.calls_for(&font), 1);
    }

    #[tokio::test]
    async fn test_cache_first_hit_makes_no_network_call() {
        let logo = url("/logo.png");
        let origin = Arc::new(app_origin().with_ok(logo.clone(), "png"));
        let proxy = active_proxy(origin.clone()).await;

        proxy.handle(ProxyRequest::get(logo.clone()).with_destination(Destination::Image)).await.unwrap();
        proxy.handle(ProxyRequest::get(logo.clone()).with_destination(Destination::Image)).await.unwrap();
        proxy.handle(ProxyRequest::get(logo.clone()).with_destination(Destination::Image)).await.unwrap();

        assert_eq!(origin.calls_for(&logo), 1);
    }

    #[tokio::test]
    async fn test_new_generation_replaces_old() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let origin = Arc::new(app_origin());

        let v1 = proxy(store.clone(), origin.clone(), "v1").await;
        v1.on_install().await.unwrap();
        v1.on_activate().await.unwrap();

        origin.set_response(&url("/index.html"), ResponseSnapshot::new(200, vec![], "<html>shell v2</html>"));
        let v2 = proxy(store.clone(), origin.clone(), "v2").await;
        v2.on_install().await.unwrap();
        v2.on_activate().await.unwrap();

        assert_eq!(store.list_generations().await.unwrap(), vec!["v2".to_string()]);
        assert_eq!(v2.controller().await.as_deref(), Some("v2"));

        origin.set_offline(true);
        let served = v2.handle(ProxyRequest::navigation(url("/anything"))).await.unwrap();
        assert_eq!(&served.response.body[..], b"<html>shell v2</html>");
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_generation_serving() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let origin = Arc::new(app_origin());

        let v1 = proxy(store.clone(), origin.clone(), "v1").await;
        v1.on_install().await.unwrap();
        v1.on_activate().await.unwrap();

        origin.set_response(&url("/manifest.json"), ResponseSnapshot::new(404, vec![], "gone"));
        let v2 = proxy(store.clone(), origin.clone(), "v2").await;

        let result = v2.on_install().await;
        assert!(matches!(result, Err(Error::PrecacheFailure { .. })));
        assert_eq!(v2.state().await, GenerationState::Uninstalled);
        assert_eq!(store.list_generations().await.unwrap(), vec!["v1".to_string()]);
        assert_eq!(v2.controller().await.as_deref(), Some("v1"));

        origin.set_offline(true);
        let served = v2.handle(ProxyRequest::navigation(url("/loans"))).await.unwrap();
        assert_eq!(served.source, Source::Cache);
        assert_eq!(&served.response.body[..], b"<html>shell v1</html>");
    }

    #[tokio::test]
    async fn test_swr_returns_cached_while_network_is_slow() {
        let api = url("/api/loans");
        let store = CacheDb::open_in_memory().await.unwrap();
        let origin = Arc::new(app_origin().with_ok(api.clone(), "[1]"));
        let proxy = proxy(store, origin.clone(), "v1").await;
        proxy.on_install().await.unwrap();
        proxy.on_activate().await.unwrap();

        let first = proxy.handle(ProxyRequest::get(api.clone())).await.unwrap();
        assert_eq!(first.source, Source::Network);
        assert_eq!(first.class, Some(RequestClass::Other));
        proxy.settle().await;

        let slow = Arc::new(app_origin().with_ok(api.clone(), "[1,2]").with_delay(Duration::from_millis(500)));
        let slow_proxy = CacheProxy::new(proxy.store().clone(), slow.clone(), settings("v1"));
        slow_proxy.on_install().await.unwrap();
        slow_proxy.on_activate().await.unwrap();

        let cached = tokio::time::timeout(Duration::from_millis(250), slow_proxy.handle(ProxyRequest::get(api.clone())))
            .await
            .expect("stale entry should be served immediately")
            .unwrap();
        assert_eq!(cached.source, Source::Cache);
        assert_eq!(&cached.response.body[..], b"[1]");

        slow_proxy.settle().await;
        let refreshed = slow_proxy.lookup(&ProxyRequest::get(api)).await.unwrap();
        assert_eq!(&refreshed.response.body[..], b"[1,2]");
    }

    #[tokio::test]
    async fn test_non_success_is_never_stored() {
        let api = url("/api/broken");
        let origin = Arc::new(app_origin().with_response(api.clone(), ResponseSnapshot::new(500, vec![], "oops")));
        let proxy = active_proxy(origin).await;

        let served = proxy.handle(ProxyRequest::get(api.clone())).await.unwrap();
        proxy.settle().await;

        assert_eq!(served.response.status, 500);
        assert!(matches!(proxy.lookup(&ProxyRequest::get(api)).await, Err(Error::CacheMiss(_))));
    }

    #[tokio::test]
    async fn test_post_bypasses_cache() {
        let api = url("/api/loans");
        let origin = Arc::new(app_origin().with_ok(api.clone(), "created"));
        let proxy = active_proxy(origin.clone()).await;

        let request = ProxyRequest::get(api.clone()).with_method(shelter_core::Method::Post);
        let served = proxy.handle(request.clone()).await.unwrap();
        proxy.settle().await;

        assert_eq!(served.source, Source::Network);
        assert_eq!(served.class, None);
        assert!(proxy.lookup(&request).await.is_err());

        origin.set_offline(true);
        assert!(matches!(proxy.handle(request).await, Err(Error::NetworkFailure(_))));
    }

    #[tokio::test]
    async fn test_pass_through_before_install() {
        let origin = Arc::new(app_origin().with_ok(url("/api/loans"), "[]"));
        let store = CacheDb::open_in_memory().await.unwrap();
        let proxy = proxy(store.clone(), origin.clone(), "v1").await;

        let served = proxy.handle(ProxyRequest::get(url("/api/loans"))).await.unwrap();
        proxy.settle().await;
        assert_eq!(served.source, Source::Network);
        assert!(store.list_generations().await.unwrap().is_empty());

        origin.set_offline(true);
        let page = proxy.handle(ProxyRequest::navigation(url("/loans"))).await.unwrap();
        assert_eq!(page.source, Source::Offline);
        assert_eq!(page.response.status, 503);

        let api = proxy.handle(ProxyRequest::get(url("/api/loans"))).await;
        assert!(matches!(api, Err(Error::NetworkFailure(_))));
    }

    #[tokio::test]
    async fn test_cancelled_request_still_stores() {
        let api = url("/api/slow");
        let origin = Arc::new(app_origin().with_ok(api.clone(), "late"));
        let proxy = active_proxy(origin.clone()).await;

        let slow = Arc::new(app_origin().with_ok(api.clone(), "late").with_delay(Duration::from_millis(200)));
        let slow_proxy = CacheProxy::new(proxy.store().clone(), slow, settings("v1"));
        slow_proxy.on_install().await.unwrap();
        slow_proxy.on_activate().await.unwrap();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), slow_proxy.handle(ProxyRequest::get(api.clone()))).await;
        assert!(cancelled.is_err());

        slow_proxy.settle().await;
        let stored = slow_proxy.lookup(&ProxyRequest::get(api)).await.unwrap();
        assert_eq!(&stored.response.body[..], b"late");
    }

    #[tokio::test]
    async fn test_lookup_and_status() {
        let origin = Arc::new(app_origin());
        let proxy = active_proxy(origin).await;

        let shell = proxy.lookup(&ProxyRequest::get(url("/index.html"))).await.unwrap();
        assert_eq!(shell.key, compute_request_key("GET", url("/index.html").as_str()));

        let status = proxy.status().await.unwrap();
        assert_eq!(status.target, "v1");
        assert_eq!(status.manifest.len(), 3);
        assert_eq!(status.manifest[1], "https://loans.example.com/index.html");
        assert_eq!(status.state, GenerationState::Active);
        assert_eq!(status.controller.as_deref(), Some("v1"));
        assert_eq!(status.generations, vec!["v1".to_string()]);
        assert_eq!(status.entries, 3);
    }

    #[tokio::test]
    async fn test_status_before_install() {
        let store = CacheDb::open_in_memory().await.unwrap();
        let proxy = proxy(store, Arc::new(app_origin()), "v1").await;

        let status = proxy.status().await.unwrap();
        assert_eq!(status.state, GenerationState::Uninstalled);
        assert_eq!(status.controller, None);
        assert_eq!(status.entries, 0);
        assert!(matches!(
            proxy.lookup(&ProxyRequest::get(url("/index.html"))).await,
            Err(Error::CacheMiss(_))
        ));
    }
}
