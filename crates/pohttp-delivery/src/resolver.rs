//! Resolution of overlay network addresses to concrete hosts.
//!
//! An Awala Internet address such as `example.com` designates a public
//! node whose PoHTTP endpoint is published as a DNS SRV record under
//! `_awala-pdc._tcp.example.com`. Resolution is a collaborator of the
//! delivery engine, injected through the [`AddressResolver`] trait.

use std::{collections::HashMap, fmt, time::Duration};

use async_trait::async_trait;
use hickory_resolver::{
    config::{ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    TokioResolver,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// SRV service label of public endpoints reached over PoHTTP.
pub const PDC_SRV_SERVICE: &str = "_awala-pdc._tcp";

/// Concrete endpoint an overlay address resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ResolvedAddress {
    /// Creates a resolved address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Failure of the resolution service itself.
///
/// The absence of a record is not a failure; resolvers report it as
/// `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ResolutionError {
    message: String,
}

impl ResolutionError {
    /// Creates a resolution error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<hickory_resolver::ResolveError> for ResolutionError {
    fn from(err: hickory_resolver::ResolveError) -> Self {
        Self::new(err.to_string())
    }
}

/// Maps a logical overlay address to a concrete host and port.
#[async_trait]
pub trait AddressResolver: Send + Sync + fmt::Debug {
    /// Resolves `address`, returning `None` when no record exists.
    async fn resolve(&self, address: &str) -> Result<Option<ResolvedAddress>, ResolutionError>;
}

/// Upstream nameservers used for SRV lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nameserver {
    /// Nameservers from the operating system configuration.
    #[default]
    System,
    /// Cloudflare's public resolvers.
    Cloudflare,
}

/// Configuration of [`SrvAddressResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Upstream nameservers.
    pub nameserver: Nameserver,
    /// Timeout of each DNS query.
    pub timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self { nameserver: Nameserver::System, timeout: Duration::from_secs(5) }
    }
}

/// Resolves overlay addresses through DNS SRV records.
#[derive(Debug)]
pub struct SrvAddressResolver {
    resolver: TokioResolver,
}

impl SrvAddressResolver {
    /// Creates a resolver with the given settings.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` if the system DNS configuration cannot be
    /// loaded.
    pub fn new(settings: &ResolverSettings) -> Result<Self, ResolutionError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = settings.timeout;

        let resolver = match settings.nameserver {
            Nameserver::System => TokioResolver::builder(TokioConnectionProvider::default())?
                .with_options(opts)
                .build(),
            Nameserver::Cloudflare => TokioResolver::builder_with_config(
                ResolverConfig::cloudflare(),
                TokioConnectionProvider::default(),
            )
            .with_options(opts)
            .build(),
        };

        Ok(Self { resolver })
    }
}

#[async_trait]
impl AddressResolver for SrvAddressResolver {
    async fn resolve(&self, address: &str) -> Result<Option<ResolvedAddress>, ResolutionError> {
        let name = srv_name(address);
        debug!(%name, "Looking up SRV record");

        let lookup = match self.resolver.srv_lookup(name.as_str()).await {
            Ok(lookup) => lookup,
            Err(e) if e.is_no_records_found() || e.is_nx_domain() => {
                debug!(%name, "No SRV record found");
                return Ok(None);
            },
            Err(e) => return Err(e.into()),
        };

        let best = lookup
            .iter()
            .min_by(|a, b| a.priority().cmp(&b.priority()).then(b.weight().cmp(&a.weight())))
            .map(|srv| {
                let target = srv.target().to_utf8();
                ResolvedAddress::new(target.trim_end_matches('.'), srv.port())
            });

        if let Some(resolved) = &best {
            debug!(%name, %resolved, "Resolved SRV record");
        }
        Ok(best)
    }
}

/// Returns the SRV record name of a public address.
pub fn srv_name(address: &str) -> String {
    format!("{PDC_SRV_SERVICE}.{}", address.trim_end_matches('.'))
}

/// Resolver backed by a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticAddressResolver {
    records: HashMap<String, ResolvedAddress>,
}

impl StaticAddressResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record.
    #[must_use]
    pub fn with_record(mut self, address: impl Into<String>, resolved: ResolvedAddress) -> Self {
        self.records.insert(address.into(), resolved);
        self
    }
}

#[async_trait]
impl AddressResolver for StaticAddressResolver {
    async fn resolve(&self, address: &str) -> Result<Option<ResolvedAddress>, ResolutionError> {
        Ok(self.records.get(address).cloned())
    }
}
