//! Mock PoHTTP endpoint backed by wiremock.

use serde_json::json;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

/// A PoHTTP endpoint listening on a random local port.
pub struct MockPohttpServer {
    server: MockServer,
}

impl MockPohttpServer {
    /// Starts a new mock server.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Returns the base URL of the server, without a trailing slash.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Returns the full URL of `path` on this server.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.server.uri(), path)
    }

    /// Accepts parcels POSTed to `endpoint` with HTTP 202.
    pub async fn mock_accept(&self, endpoint: &str) {
        self.mount(endpoint, ResponseTemplate::new(202), None).await;
    }

    /// Redirects POSTs to `endpoint` towards `location`.
    pub async fn mock_redirect(&self, endpoint: &str, status: u16, location: &str) {
        let response = ResponseTemplate::new(status).insert_header("Location", location);
        self.mount(endpoint, response, None).await;
    }

    /// Redirects the next `times` POSTs to `endpoint` towards `location`.
    pub async fn mock_redirect_times(
        &self,
        endpoint: &str,
        status: u16,
        location: &str,
        times: u64,
    ) {
        self.mount(
            endpoint,
            ResponseTemplate::new(status).insert_header("Location", location),
            Some(times),
        )
        .await;
    }

    /// Answers POSTs to `endpoint` with `status`, and a JSON reason when
    /// `reason` is given.
    pub async fn mock_status(&self, endpoint: &str, status: u16, reason: Option<&str>) {
        let mut response = ResponseTemplate::new(status);
        if let Some(reason) = reason {
            response = response.set_body_json(json!({ "message": reason }));
        }
        self.mount(endpoint, response, None).await;
    }

    /// Returns all requests received by the server.
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Asserts that exactly `expected` requests were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let requests = self.received_requests().await;
        assert_eq!(
            requests.len(),
            expected,
            "Expected {} requests, received {}",
            expected,
            requests.len()
        );
    }

    async fn mount(&self, endpoint: &str, response: ResponseTemplate, times: Option<u64>) {
        let mock = Mock::given(method("POST")).and(path(endpoint)).respond_with(response);
        match times {
            Some(times) => mock.up_to_n_times(times).mount(&self.server).await,
            None => mock.mount(&self.server).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_server_starts() {
        let server = MockPohttpServer::start().await;
        assert!(server.url().starts_with("http://"));
        assert_eq!(server.endpoint_url("/foo"), format!("{}/foo", server.url()));
        server.assert_request_count(0).await;
    }
}
