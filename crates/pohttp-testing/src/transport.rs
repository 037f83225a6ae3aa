//! Transport that replays scripted outcomes and records every request.

use std::collections::VecDeque;

use async_trait::async_trait;
use pohttp_delivery::client::{PostRequest, Transport, TransportError, TransportResponse};
use tokio::sync::Mutex;

/// Outcome returned for one POST.
pub type Outcome = Result<TransportResponse, TransportError>;

/// Transport returning queued outcomes in order.
///
/// Once the script runs out every further POST fails with a connection
/// error, which makes unexpected extra attempts visible in assertions.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome>>,
    requests: Mutex<Vec<PostRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport replaying `outcomes`.
    pub fn with_script(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        Self { script: Mutex::new(outcomes.into_iter().collect()), requests: Mutex::default() }
    }

    /// Queues a response.
    pub async fn respond(&self, response: TransportResponse) {
        self.script.lock().await.push_back(Ok(response));
    }

    /// Queues a transport failure.
    pub async fn fail(&self, error: TransportError) {
        self.script.lock().await.push_back(Err(error));
    }

    /// Returns every request received so far.
    pub async fn requests(&self) -> Vec<PostRequest> {
        self.requests.lock().await.clone()
    }

    /// Returns the number of POSTs attempted.
    pub async fn attempts(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Returns the URL of every POST in order.
    pub async fn urls(&self) -> Vec<String> {
        self.requests.lock().await.iter().map(|request| request.url.clone()).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post(&self, request: PostRequest) -> Outcome {
        self.requests.lock().await.push(request);
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::connect("no scripted response left")))
    }
}

/// Builds a 307/308 response pointing at `location`.
pub fn redirect(status: u16, location: &str) -> TransportResponse {
    TransportResponse::new(status).with_header("Location", location)
}

/// Builds a response whose body carries `message` as the JSON reason.
pub fn with_reason(status: u16, message: &str) -> TransportResponse {
    TransportResponse::new(status)
        .with_header("Content-Type", "application/json")
        .with_body(serde_json::json!({ "message": message }).to_string())
}
