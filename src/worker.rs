//! Lifecycle event dispatch
//!
//! The host delivers `install`, `activate` and `fetch` events; each handler
//! here is a thin adapter over the cache manager or the interceptor and
//! answers with an `EventOutcome` that acknowledges the event.

use std::sync::Arc;

use tracing::warn;

use crate::cache::{ActivationReport, AssetCacheManager, CacheStorage, InstallError};
use crate::config::Config;
use crate::interceptor::{RequestInterceptor, Served};
use crate::lifecycle::GenerationId;
use crate::network::{Fetcher, HttpFetcher, NetworkError, Request};

/// A lifecycle event delivered by the host
#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(Request),
}

/// How an event was handled
#[derive(Debug)]
pub enum EventOutcome {
    Installed(GenerationId),
    InstallFailed(InstallError),
    Activated(ActivationReport),
    Responded(Result<Served, NetworkError>),
    /// Install/activate with no cache layer behind the worker
    CacheUnavailable,
}

impl EventOutcome {
    /// Whether the lifecycle transition the event asked for went through
    pub fn succeeded(&self) -> bool {
        match self {
            EventOutcome::Installed(_) => true,
            EventOutcome::InstallFailed(_) => false,
            EventOutcome::Activated(report) => report.activated,
            EventOutcome::Responded(result) => result.is_ok(),
            EventOutcome::CacheUnavailable => false,
        }
    }
}

/// Binds one generation and manifest to a cache and a network
pub struct ServiceWorker {
    generation: GenerationId,
    manifest: Vec<String>,
    cache: Option<Arc<AssetCacheManager>>,
    network: Arc<dyn Fetcher>,
    interceptor: RequestInterceptor,
}

impl ServiceWorker {
    pub fn new(
        generation: GenerationId,
        manifest: Vec<String>,
        cache: Option<Arc<AssetCacheManager>>,
        network: Arc<dyn Fetcher>,
    ) -> Self {
        let interceptor = RequestInterceptor::new(cache.clone(), network.clone());
        Self {
            generation,
            manifest,
            cache,
            network,
            interceptor,
        }
    }

    /// Builds a worker from configuration
    ///
    /// If the cache root cannot be resolved or opened the worker still comes up
    /// and passes every request through to the network.
    pub fn from_config(config: &Config) -> Result<Self, NetworkError> {
        let timeout = config.network.fetch_timeout();
        let network = Arc::new(HttpFetcher::with_timeout(
            config.network.origin.clone(),
            timeout,
        )?);

        let storage = match &config.cache.dir {
            Some(dir) => Some(CacheStorage::with_dir(dir.clone())),
            None => CacheStorage::new(),
        };
        let cache = match storage.map(AssetCacheManager::open) {
            Some(Ok(manager)) => Some(Arc::new(manager.with_fetch_timeout(timeout))),
            Some(Err(err)) => {
                warn!(error = %err, "cache unavailable, falling back to network only");
                None
            }
            None => {
                warn!("no cache directory available, falling back to network only");
                None
            }
        };

        Ok(Self::new(
            config.cache.generation_id(),
            config.cache.manifest.clone(),
            cache,
            network,
        ))
    }

    pub fn generation(&self) -> &GenerationId {
        &self.generation
    }

    pub fn cache(&self) -> Option<&AssetCacheManager> {
        self.cache.as_deref()
    }

    pub async fn dispatch(&self, event: Event) -> EventOutcome {
        match event {
            Event::Install => self.on_install().await,
            Event::Activate => self.on_activate(),
            Event::Fetch(request) => EventOutcome::Responded(self.interceptor.serve(&request).await),
        }
    }

    async fn on_install(&self) -> EventOutcome {
        let Some(cache) = &self.cache else {
            return EventOutcome::CacheUnavailable;
        };
        match cache
            .install(&self.generation, &self.manifest, self.network.as_ref())
            .await
        {
            Ok(()) => EventOutcome::Installed(self.generation.clone()),
            Err(err) => EventOutcome::InstallFailed(err),
        }
    }

    fn on_activate(&self) -> EventOutcome {
        match &self.cache {
            Some(cache) => EventOutcome::Activated(cache.activate(&self.generation)),
            None => EventOutcome::CacheUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::Source;
    use crate::network::Response;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Echoes the locator back as the body
    #[derive(Default)]
    struct EchoFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for EchoFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(200, request.locator.clone()))
        }
    }

    fn build_worker(
        temp_dir: &TempDir,
        generation: &str,
        manifest: &[&str],
        network: Arc<EchoFetcher>,
    ) -> ServiceWorker {
        let manager =
            AssetCacheManager::open(CacheStorage::with_dir(temp_dir.path().to_path_buf())).unwrap();
        ServiceWorker::new(
            GenerationId::from(generation),
            manifest.iter().map(|s| s.to_string()).collect(),
            Some(Arc::new(manager)),
            network,
        )
    }

    #[tokio::test]
    async fn test_dispatch_install_activate_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let network = Arc::new(EchoFetcher::default());
        let worker = build_worker(&temp_dir, "v1", &["/", "/style.css"], network.clone());

        let outcome = worker.dispatch(Event::Install).await;
        assert!(matches!(outcome, EventOutcome::Installed(ref g) if g.as_str() == "v1"));

        let outcome = worker.dispatch(Event::Activate).await;
        assert!(outcome.succeeded());

        let calls_before = network.calls.load(Ordering::SeqCst);
        match worker.dispatch(Event::Fetch(Request::get("/style.css"))).await {
            EventOutcome::Responded(Ok(served)) => {
                assert_eq!(served.source, Source::Cache);
                assert_eq!(served.response.body, b"/style.css");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(network.calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_activate_before_install_is_not_acknowledged() {
        let temp_dir = TempDir::new().unwrap();
        let worker = build_worker(&temp_dir, "v1", &["/"], Arc::new(EchoFetcher::default()));

        let outcome = worker.dispatch(Event::Activate).await;
        assert!(!outcome.succeeded());
        assert!(worker.cache().unwrap().current().is_none());
    }

    #[tokio::test]
    async fn test_worker_without_cache_passes_through() {
        let network = Arc::new(EchoFetcher::default());
        let worker = ServiceWorker::new(
            GenerationId::from("v1"),
            vec!["/".to_string()],
            None,
            network.clone(),
        );

        assert!(matches!(worker.dispatch(Event::Install).await, EventOutcome::CacheUnavailable));
        assert!(matches!(worker.dispatch(Event::Activate).await, EventOutcome::CacheUnavailable));

        match worker.dispatch(Event::Fetch(Request::get("/"))).await {
            EventOutcome::Responded(Ok(served)) => assert_eq!(served.source, Source::Network),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(network.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_config_uses_configured_cache_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(temp_dir.path().to_path_buf());
        config.cache.generation = "v7".to_string();

        let worker = ServiceWorker::from_config(&config).unwrap();

        assert_eq!(worker.generation().as_str(), "v7");
        let cache = worker.cache().expect("cache should be available");
        assert_eq!(cache.storage().root(), temp_dir.path());
    }

    #[tokio::test]
    async fn test_from_config_survives_corrupt_active_pointer() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("active.json"), "{garbage").unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(temp_dir.path().to_path_buf());

        let worker = ServiceWorker::from_config(&config).unwrap();

        let cache = worker.cache().expect("cache should be available");
        assert!(cache.current().is_none());
        assert!(!matches!(worker.dispatch(Event::Activate).await, EventOutcome::CacheUnavailable));
    }
}
