//! Network access for asset fetches
//!
//! This module defines the request/response types shared by the cache layer and
//! the `Fetcher` seam the cache uses to reach the network. `HttpFetcher` is the
//! reqwest-backed implementation that resolves locators against an origin.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use thiserror::Error;

/// Errors that can occur when fetching from the network
#[derive(Debug, Error)]
pub enum NetworkError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The locator cannot be resolved to a URL
    #[error("Invalid locator: '{0}'")]
    InvalidLocator(String),

    /// The network could not be reached at all
    #[error("Network unavailable: {0}")]
    Unavailable(String),
}

/// An outgoing application request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Resource locator, e.g. `/index.html`
    pub locator: String,
}

impl Request {
    /// Creates a GET request for the given locator
    pub fn get(locator: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            locator: locator.into(),
        }
    }
}

/// A response, either fresh from the network or replayed from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers in received order
    pub headers: Vec<(String, String)>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a response with no headers
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can perform a request against the network
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs the request and returns whatever the network answered
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Fetcher backed by a reqwest client and a fixed origin
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: String,
}

impl HttpFetcher {
    /// Create a new HttpFetcher with default client settings
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            origin: origin.into(),
        }
    }

    /// Create a new HttpFetcher with a custom HTTP client
    pub fn with_client(client: Client, origin: impl Into<String>) -> Self {
        Self {
            client,
            origin: origin.into(),
        }
    }

    /// Create a new HttpFetcher whose requests give up after `timeout`
    ///
    /// `None` leaves the client without a request timeout.
    pub fn with_timeout(
        origin: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, NetworkError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            origin: origin.into(),
        })
    }

    /// Resolves a locator to an absolute URL
    ///
    /// Absolute `http(s)://` locators are used verbatim; paths are joined onto
    /// the origin.
    pub fn url_for(&self, locator: &str) -> Result<String, NetworkError> {
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return Ok(locator.to_string());
        }
        if !locator.starts_with('/') {
            return Err(NetworkError::InvalidLocator(locator.to_string()));
        }
        Ok(format!("{}{}", self.origin.trim_end_matches('/'), locator))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = self.url_for(&request.locator)?;

        let response = self
            .client
            .request(request.method.clone(), &url)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_path_onto_origin() {
        let fetcher = HttpFetcher::new("http://localhost:8080/");
        assert_eq!(
            fetcher.url_for("/style.css").unwrap(),
            "http://localhost:8080/style.css"
        );
    }

    #[test]
    fn test_url_for_keeps_query_string_verbatim() {
        let fetcher = HttpFetcher::new("https://example.org");
        assert_eq!(
            fetcher.url_for("/script.js?v=2").unwrap(),
            "https://example.org/script.js?v=2"
        );
    }

    #[test]
    fn test_url_for_accepts_absolute_urls() {
        let fetcher = HttpFetcher::new("https://example.org");
        assert_eq!(
            fetcher.url_for("https://cdn.example.org/font.woff2").unwrap(),
            "https://cdn.example.org/font.woff2"
        );
    }

    #[test]
    fn test_url_for_rejects_relative_locator() {
        let fetcher = HttpFetcher::new("https://example.org");
        let err = fetcher.url_for("style.css").unwrap_err();
        assert!(matches!(err, NetworkError::InvalidLocator(_)));
        assert!(err.to_string().contains("style.css"));
    }

    #[test]
    fn test_with_timeout_builds_client() {
        let fetcher = HttpFetcher::with_timeout("http://localhost", Some(Duration::from_secs(5)));
        assert!(fetcher.is_ok());
    }

    #[test]
    fn test_response_is_success() {
        assert!(Response::new(200, "ok").is_success());
        assert!(Response::new(204, Vec::new()).is_success());
        assert!(!Response::new(404, "missing").is_success());
        assert!(!Response::new(500, "boom").is_success());
    }

    #[test]
    fn test_request_get_defaults_to_get_method() {
        let request = Request::get("/index.html");
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.locator, "/index.html");
    }
}
