//! HTTP client abstraction for testability.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;

/// Boxed future returned by [`HttpClient`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from a single HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    /// Server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Connection, TLS, timeout or body read failure.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

impl HttpError {
    /// Whether the server rejected the bearer token.
    pub fn is_credential(&self) -> bool {
        matches!(self, HttpError::Status { status: 401 | 403, .. })
    }
}

/// Trait for authenticated HTTP downloads.
///
/// Uses boxed futures so the fetcher can hold an `Arc<dyn HttpClient>` and
/// tests can inject scripted clients.
pub trait HttpClient: Send + Sync {
    /// Downloads `url` with `Authorization: Bearer <token>`.
    fn get_with_bearer<'a>(&'a self, url: &'a str, token: &'a str) -> BoxFuture<'a, Result<Bytes, HttpError>>;
}

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the default timeout.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Creates a client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Transport {
                url: String::new(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get_with_bearer<'a>(&'a self, url: &'a str, token: &'a str) -> BoxFuture<'a, Result<Bytes, HttpError>> {
        Box::pin(async move {
            let transport = |e: reqwest::Error| HttpError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            };

            let response = self
                .client
                .get(url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(transport)?;

            let status = response.status();
            if !status.is_success() {
                return Err(HttpError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            response.bytes().await.map_err(transport)
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted HTTP client for testing.
    ///
    /// Each URL has a queue of responses; once a queue is empty the last
    /// response is repeated. Unknown URLs answer 404.
    #[derive(Default)]
    pub struct MockHttpClient {
        responses: Mutex<HashMap<String, VecDeque<Result<Bytes, HttpError>>>>,
        last: Mutex<HashMap<String, Result<Bytes, HttpError>>>,
        calls: AtomicUsize,
        tokens: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, url: &str, response: Result<Bytes, HttpError>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(response);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn tokens(&self) -> Vec<String> {
            self.tokens.lock().unwrap().clone()
        }
    }

    impl HttpClient for MockHttpClient {
        fn get_with_bearer<'a>(&'a self, url: &'a str, token: &'a str) -> BoxFuture<'a, Result<Bytes, HttpError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tokens.lock().unwrap().push(token.to_string());

            let next = self
                .responses
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(VecDeque::pop_front);
            let response = match next {
                Some(response) => {
                    self.last
                        .lock()
                        .unwrap()
                        .insert(url.to_string(), response.clone());
                    response
                }
                None => self.last.lock().unwrap().get(url).cloned().unwrap_or_else(|| {
                    Err(HttpError::Status {
                        status: 404,
                        url: url.to_string(),
                    })
                }),
            };
            Box::pin(async move { response })
        }
    }

    pub fn status(code: u16) -> Result<Bytes, HttpError> {
        Err(HttpError::Status {
            status: code,
            url: String::new(),
        })
    }

    pub fn transport() -> Result<Bytes, HttpError> {
        Err(HttpError::Transport {
            url: String::new(),
            reason: "connection reset".to_string(),
        })
    }

    #[test]
    fn test_credential_classification() {
        assert!(status(401).unwrap_err().is_credential());
        assert!(status(403).unwrap_err().is_credential());
        assert!(!status(500).unwrap_err().is_credential());
        assert!(!status(404).unwrap_err().is_credential());
        assert!(!transport().unwrap_err().is_credential());
    }

    #[tokio::test]
    async fn test_mock_replays_queue_then_repeats_last() {
        let mock = MockHttpClient::new()
            .respond("a", transport())
            .respond("a", Ok(Bytes::from_static(b"ok")));

        assert!(mock.get_with_bearer("a", "t").await.is_err());
        assert_eq!(mock.get_with_bearer("a", "t").await.unwrap(), "ok");
        assert_eq!(mock.get_with_bearer("a", "t").await.unwrap(), "ok");
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.tokens(), vec!["t", "t", "t"]);
    }

    #[tokio::test]
    async fn test_mock_unknown_url_is_not_found() {
        let mock = MockHttpClient::new();
        let err = mock.get_with_bearer("missing", "t").await.unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 404, .. }));
    }
}
