//! Request interception with a cache-first policy
//!
//! Every outgoing request goes through `RequestInterceptor::handle`: a hit in
//! the serving generation is answered locally, anything else is forwarded to
//! the network once and its result returned untouched.

use std::sync::Arc;

use reqwest::Method;
use tracing::debug;

use crate::cache::AssetCacheManager;
use crate::network::{Fetcher, NetworkError, Request, Response};

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
}

/// A response together with its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: Response,
    pub source: Source,
}

/// Sits between the application and the network
#[derive(Clone)]
pub struct RequestInterceptor {
    /// `None` when the cache layer is unavailable; everything passes through
    cache: Option<Arc<AssetCacheManager>>,
    network: Arc<dyn Fetcher>,
}

impl RequestInterceptor {
    pub fn new(cache: Option<Arc<AssetCacheManager>>, network: Arc<dyn Fetcher>) -> Self {
        Self { cache, network }
    }

    /// An interceptor with no cache behind it
    pub fn passthrough(network: Arc<dyn Fetcher>) -> Self {
        Self::new(None, network)
    }

    /// Answers the request from cache, or from the network on a miss
    pub async fn handle(&self, request: &Request) -> Result<Response, NetworkError> {
        self.serve(request).await.map(|served| served.response)
    }

    /// Like `handle`, but also reports where the response came from
    pub async fn serve(&self, request: &Request) -> Result<Served, NetworkError> {
        if request.method == Method::GET {
            if let Some(hit) = self.cache.as_ref().and_then(|c| c.lookup(&request.locator)) {
                debug!(locator = %request.locator, "served from cache");
                return Ok(Served {
                    response: hit.into_response(),
                    source: Source::Cache,
                });
            }
        }

        debug!(locator = %request.locator, method = %request.method, "forwarding to network");
        let response = self.network.fetch(request).await?;
        Ok(Served {
            response,
            source: Source::Network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use crate::lifecycle::GenerationId;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every request; answers with a fixed result
    struct RecordingFetcher {
        calls: Mutex<Vec<Request>>,
        offline: bool,
    }

    impl RecordingFetcher {
        fn online() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                offline: false,
            })
        }

        fn offline() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                offline: true,
            })
        }

        fn calls(&self) -> Vec<Request> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
            self.calls.lock().unwrap().push(request.clone());
            if self.offline {
                return Err(NetworkError::Unavailable("offline".to_string()));
            }
            Ok(Response::new(200, format!("network:{}", request.locator)))
        }
    }

    async fn active_cache(temp_dir: &TempDir) -> Arc<AssetCacheManager> {
        let manager =
            AssetCacheManager::open(CacheStorage::with_dir(temp_dir.path().to_path_buf())).unwrap();
        let source = RecordingFetcher::online();
        let v1 = GenerationId::from("v1");
        manager
            .install(&v1, &["/index.html".to_string()], source.as_ref())
            .await
            .unwrap();
        assert!(manager.activate(&v1).activated);
        Arc::new(manager)
    }

    #[tokio::test]
    async fn test_hit_never_touches_network() {
        let temp_dir = TempDir::new().unwrap();
        let network = RecordingFetcher::online();
        let interceptor = RequestInterceptor::new(Some(active_cache(&temp_dir).await), network.clone());

        let served = interceptor.serve(&Request::get("/index.html")).await.unwrap();

        assert_eq!(served.source, Source::Cache);
        assert_eq!(served.response.body, b"network:/index.html");
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_miss_issues_exactly_one_network_request() {
        let temp_dir = TempDir::new().unwrap();
        let network = RecordingFetcher::online();
        let interceptor = RequestInterceptor::new(Some(active_cache(&temp_dir).await), network.clone());

        let response = interceptor.handle(&Request::get("/unknown.png")).await.unwrap();

        assert_eq!(response.body, b"network:/unknown.png");
        assert_eq!(network.calls(), vec![Request::get("/unknown.png")]);
    }

    #[tokio::test]
    async fn test_miss_does_not_populate_cache() {
        let temp_dir = TempDir::new().unwrap();
        let network = RecordingFetcher::online();
        let cache = active_cache(&temp_dir).await;
        let interceptor = RequestInterceptor::new(Some(cache.clone()), network.clone());

        interceptor.handle(&Request::get("/unknown.png")).await.unwrap();
        interceptor.handle(&Request::get("/unknown.png")).await.unwrap();

        assert!(cache.lookup("/unknown.png").is_none());
        assert_eq!(network.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_network_failure_is_passed_through() {
        let temp_dir = TempDir::new().unwrap();
        let network = RecordingFetcher::offline();
        let interceptor = RequestInterceptor::new(Some(active_cache(&temp_dir).await), network.clone());

        let err = interceptor.handle(&Request::get("/unknown.png")).await.unwrap_err();

        assert!(matches!(err, NetworkError::Unavailable(_)));
        assert_eq!(network.calls().len(), 1, "no retries");
    }

    #[tokio::test]
    async fn test_cached_assets_survive_offline_network() {
        let temp_dir = TempDir::new().unwrap();
        let network = RecordingFetcher::offline();
        let interceptor = RequestInterceptor::new(Some(active_cache(&temp_dir).await), network.clone());

        let response = interceptor.handle(&Request::get("/index.html")).await.unwrap();
        assert!(response.is_success());
        assert!(network.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_get_requests_bypass_cache() {
        let temp_dir = TempDir::new().unwrap();
        let network = RecordingFetcher::online();
        let interceptor = RequestInterceptor::new(Some(active_cache(&temp_dir).await), network.clone());

        let request = Request {
            method: Method::POST,
            locator: "/index.html".to_string(),
        };
        let served = interceptor.serve(&request).await.unwrap();

        assert_eq!(served.source, Source::Network);
        assert_eq!(network.calls(), vec![request]);
    }

    #[tokio::test]
    async fn test_passthrough_without_cache() {
        let network = RecordingFetcher::online();
        let interceptor = RequestInterceptor::passthrough(network.clone());

        let served = interceptor.serve(&Request::get("/index.html")).await.unwrap();

        assert_eq!(served.source, Source::Network);
        assert_eq!(network.calls().len(), 1);
    }
}
