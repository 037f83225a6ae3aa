//! Resolver returning a fixed outcome and recording lookups.

use async_trait::async_trait;
use pohttp_delivery::resolver::{AddressResolver, ResolutionError, ResolvedAddress};
use tokio::sync::Mutex;

/// Resolver with a fixed answer for every address.
#[derive(Debug)]
pub struct StubResolver {
    outcome: Result<Option<ResolvedAddress>, ResolutionError>,
    lookups: Mutex<Vec<String>>,
}

impl StubResolver {
    /// Resolves every address to `host:port`.
    pub fn resolving_to(host: &str, port: u16) -> Self {
        Self::with_outcome(Ok(Some(ResolvedAddress::new(host, port))))
    }

    /// Finds no record for any address.
    pub fn empty() -> Self {
        Self::with_outcome(Ok(None))
    }

    /// Fails every lookup with `message`.
    pub fn failing(message: &str) -> Self {
        Self::with_outcome(Err(ResolutionError::new(message)))
    }

    fn with_outcome(outcome: Result<Option<ResolvedAddress>, ResolutionError>) -> Self {
        Self { outcome, lookups: Mutex::default() }
    }

    /// Returns every address looked up so far.
    pub async fn lookups(&self) -> Vec<String> {
        self.lookups.lock().await.clone()
    }
}

#[async_trait]
impl AddressResolver for StubResolver {
    async fn resolve(&self, address: &str) -> Result<Option<ResolvedAddress>, ResolutionError> {
        self.lookups.lock().await.push(address.to_string());
        self.outcome.clone()
    }
}
