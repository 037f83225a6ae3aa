//! HTTP transport for parcel delivery.
//!
//! The transport performs exactly one POST per call and never follows
//! redirects: redirect semantics belong to the delivery engine, because
//! HTTP clients do not reliably resubmit POST bodies on 307/308.

use std::{collections::HashMap, fmt, time::Duration};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::HeaderMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Largest response body kept in memory; the rest is discarded.
pub const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;

/// A single POST to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRequest {
    /// Target URL.
    pub url: String,
    /// Request body, sent verbatim.
    pub body: Bytes,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Timeout of the whole request.
    pub timeout: Duration,
}

/// An HTTP response of any status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, keyed by lower-case name.
    pub headers: HashMap<String, String>,
    /// Response body, possibly truncated.
    pub body: Bytes,
    /// Set when `body` is shorter than what the server sent, either because
    /// it hit [`MAX_RESPONSE_BODY_SIZE`] or because reading it failed.
    pub body_truncated: bool,
}

impl TransportResponse {
    /// Creates a response with no headers and an empty body.
    pub fn new(status: u16) -> Self {
        Self { status, ..Self::default() }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Marks the body as incomplete.
    #[must_use]
    pub fn with_truncated_body(mut self) -> Self {
        self.body_truncated = true;
        self
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Failure that produced no HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete in time.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds
        timeout_ms: u64,
    },

    /// The connection could not be established.
    #[error("{message}")]
    Connect {
        /// Error message describing the connection failure
        message: String,
    },

    /// The request failed for another reason.
    #[error("{message}")]
    Request {
        /// Error message describing the failure
        message: String,
    },
}

impl TransportError {
    /// Creates a connection error from a message.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX) }
    }

    /// Creates a generic request error from a message.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request { message: message.into() }
    }
}

/// Performs a single HTTP POST.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `request`, returning the response whatever its status.
    async fn post(&self, request: PostRequest) -> Result<TransportResponse, TransportError>;
}

/// Configuration of [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// User agent string for requests.
    pub user_agent: String,
    /// How long idle pooled connections are kept alive.
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("pohttp/{}", env!("CARGO_PKG_VERSION")),
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Transport over a pooled `reqwest` client.
///
/// Cloning is cheap and clones share the connection pool, so a single
/// instance should be built per process.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the HTTP client cannot be
    /// configured with the provided settings.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_keepalive(config.pool_idle_timeout)
            .build()
            .map_err(|e| TransportError::request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Creates a transport with default configuration.
    pub fn with_defaults() -> Result<Self, TransportError> {
        Self::new(&TransportConfig::default())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: PostRequest) -> Result<TransportResponse, TransportError> {
        let mut http_request =
            self.client.post(&request.url).timeout(request.timeout).body(request.body);
        for (name, value) in request.headers {
            http_request = http_request.header(name, value);
        }

        let mut response = http_request.send().await.map_err(|e| {
            warn!(url = %request.url, "Request failed: {}", e);
            if e.is_timeout() {
                TransportError::timeout(request.timeout)
            } else if e.is_connect() {
                TransportError::connect(e.to_string())
            } else {
                TransportError::request(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = extract_headers(response.headers());

        let mut body = BytesMut::new();
        let mut body_truncated = false;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let room = MAX_RESPONSE_BODY_SIZE - body.len();
                    if chunk.len() > room {
                        body.extend_from_slice(&chunk[..room]);
                        body_truncated = true;
                        debug!(status, "Response body truncated");
                        break;
                    }
                    body.extend_from_slice(&chunk);
                },
                Ok(None) => break,
                Err(e) => {
                    // The status is already known; keep what was read.
                    warn!(status, "Failed to read response body: {}", e);
                    body_truncated = true;
                    break;
                },
            }
        }

        debug!(status, body_len = body.len(), body_truncated, "Received response");
        Ok(TransportResponse { status, headers, body: body.freeze(), body_truncated })
    }
}

/// Extracts headers from a reqwest `HeaderMap`, skipping non-text values.
fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    for (key, value) in header_map {
        if let Ok(value_str) = value.to_str() {
            headers.insert(key.as_str().to_string(), value_str.to_string());
        }
    }

    headers
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn create_test_request(url: String) -> PostRequest {
        PostRequest {
            url,
            body: Bytes::from_static(b"Hey"),
            headers: vec![("Content-Type".to_string(), "application/vnd.awala.parcel".to_string())],
            timeout: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn body_and_headers_are_posted() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/"))
            .and(matchers::header("Content-Type", "application/vnd.awala.parcel"))
            .and(matchers::body_bytes(b"Hey".to_vec()))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_defaults().unwrap();
        let response = transport.post(create_test_request(mock_server.uri())).await.unwrap();

        assert_eq!(response.status, 202);
    }

    #[tokio::test]
    async fn redirects_are_not_followed() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/"))
            .respond_with(
                ResponseTemplate::new(307).insert_header("Location", "https://example.com/foo"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_defaults().unwrap();
        let response = transport.post(create_test_request(mock_server.uri())).await.unwrap();

        assert_eq!(response.status, 307);
        assert_eq!(response.header("Location"), Some("https://example.com/foo"));
    }

    #[tokio::test]
    async fn error_statuses_are_returned_as_responses() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_defaults().unwrap();
        let response = transport.post(create_test_request(mock_server.uri())).await.unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(&response.body[..], b"Internal Server Error");
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_defaults().unwrap();
        let mut request = create_test_request(mock_server.uri());
        request.timeout = Duration::from_millis(100);

        let result = transport.post(request).await;
        assert_eq!(result, Err(TransportError::Timeout { timeout_ms: 100 }));
    }

    #[tokio::test]
    async fn connection_refused_is_reported() {
        let transport = HttpTransport::with_defaults().unwrap();
        // Port 9 (discard) is closed on test hosts.
        let result = transport.post(create_test_request("http://127.0.0.1:9/".to_string())).await;

        assert!(matches!(result, Err(TransportError::Connect { .. })), "got {result:?}");
    }

    #[tokio::test]
    async fn large_bodies_are_truncated() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 200 * 1024]))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_defaults().unwrap();
        let response = transport.post(create_test_request(mock_server.uri())).await.unwrap();

        assert_eq!(response.body.len(), MAX_RESPONSE_BODY_SIZE);
        assert!(response.body_truncated);
    }

    #[tokio::test]
    async fn body_at_the_limit_is_complete() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_bytes(vec![b'x'; MAX_RESPONSE_BODY_SIZE]),
            )
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_defaults().unwrap();
        let response = transport.post(create_test_request(mock_server.uri())).await.unwrap();

        assert_eq!(response.status, 500);
        assert_eq!(response.body.len(), MAX_RESPONSE_BODY_SIZE);
        assert!(!response.body_truncated);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = TransportResponse::new(308).with_header("Location", "https://example.com");
        assert_eq!(response.header("location"), Some("https://example.com"));
        assert_eq!(response.header("LOCATION"), Some("https://example.com"));
        assert_eq!(response.header("Retry-After"), None);
    }

    #[test]
    fn timeout_display_format() {
        let error = TransportError::timeout(Duration::from_millis(3000));
        assert_eq!(error.to_string(), "request timed out after 3000ms");
    }
}
