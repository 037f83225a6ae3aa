//! Per-call delivery options and the process-wide TLS policy.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT_MS};

/// Media type of a serialized parcel.
pub const PARCEL_CONTENT_TYPE: &str = "application/vnd.awala.parcel";

/// Request header used to announce the sending gateway or relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GatewayHeader {
    /// `X-Awala-Gateway`
    #[default]
    AwalaGateway,
    /// `X-Relaynet-Gateway`
    RelaynetGateway,
    /// `X-Relaynet-Relay`
    RelaynetRelay,
}

impl GatewayHeader {
    /// Returns the header name as sent on the wire.
    pub const fn name(self) -> &'static str {
        match self {
            Self::AwalaGateway => "X-Awala-Gateway",
            Self::RelaynetGateway => "X-Relaynet-Gateway",
            Self::RelaynetRelay => "X-Relaynet-Relay",
        }
    }
}

impl fmt::Display for GatewayHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for a single delivery.
///
/// Serializes with the timeout as whole milliseconds under `timeout_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryOptions {
    /// Address of the sending node, announced in `gateway_header`.
    pub gateway_address: Option<String>,
    /// Header carrying `gateway_address`.
    pub gateway_header: GatewayHeader,
    /// Number of 307/308 responses to follow before giving up.
    pub max_redirects: u32,
    /// Timeout of each individual POST attempt.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    /// Whether resolved addresses use `https` and TLS is required.
    pub use_tls: bool,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            gateway_address: None,
            gateway_header: GatewayHeader::default(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            use_tls: true,
        }
    }
}

impl DeliveryOptions {
    /// Sets the gateway address announced to the recipient.
    #[must_use]
    pub fn with_gateway_address(mut self, address: impl Into<String>) -> Self {
        self.gateway_address = Some(address.into());
        self
    }

    /// Sets the header used for the gateway address.
    #[must_use]
    pub fn with_gateway_header(mut self, header: GatewayHeader) -> Self {
        self.gateway_header = header;
        self
    }

    /// Sets the redirect budget.
    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables TLS.
    #[must_use]
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Headers sent with every attempt of this delivery.
    pub(crate) fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), PARCEL_CONTENT_TYPE.to_string())];
        if let Some(address) = &self.gateway_address {
            headers.push((self.gateway_header.name().to_string(), address.clone()));
        }
        headers
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Process-wide TLS enforcement switch.
///
/// Resolved once when the deliverer is built. When `enforced` is false,
/// plain HTTP targets are accepted regardless of [`DeliveryOptions::use_tls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsPolicy {
    /// Whether `use_tls` turns into a hard requirement.
    pub enforced: bool,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self { enforced: true }
    }
}

impl TlsPolicy {
    /// Policy that never requires TLS.
    pub const fn permissive() -> Self {
        Self { enforced: false }
    }

    /// Whether a call made with `options` may only POST to HTTPS URLs.
    pub fn requires_tls(self, options: &DeliveryOptions) -> bool {
        self.enforced && options.use_tls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol() {
        let options = DeliveryOptions::default();
        assert_eq!(options.max_redirects, 3);
        assert_eq!(options.timeout, Duration::from_millis(3000));
        assert!(options.use_tls);
        assert!(options.gateway_address.is_none());
    }

    #[test]
    fn options_serialize_timeout_in_milliseconds() {
        let options = DeliveryOptions::default()
            .with_gateway_address("0123")
            .with_gateway_header(GatewayHeader::RelaynetGateway)
            .with_timeout(Duration::from_millis(1500));

        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["timeout_ms"], 1500);
        assert_eq!(json["gateway_header"], "relaynet-gateway");

        let restored: DeliveryOptions = serde_json::from_value(json).unwrap();
        assert_eq!(restored, options);
    }

    #[test]
    fn missing_option_fields_take_defaults() {
        let options: DeliveryOptions =
            serde_json::from_str(r#"{"max_redirects": 0, "use_tls": false}"#).unwrap();

        assert_eq!(options.max_redirects, 0);
        assert!(!options.use_tls);
        assert_eq!(options.timeout, Duration::from_millis(3000));
        assert!(options.gateway_address.is_none());
    }

    #[test]
    fn content_type_is_always_sent() {
        let headers = DeliveryOptions::default().request_headers();
        assert_eq!(
            headers,
            vec![("Content-Type".to_string(), "application/vnd.awala.parcel".to_string())]
        );
    }

    #[test]
    fn exactly_one_gateway_header_is_sent() {
        let headers = DeliveryOptions::default()
            .with_gateway_address("0deadbeef")
            .with_gateway_header(GatewayHeader::RelaynetRelay)
            .request_headers();

        let gateway_headers: Vec<_> =
            headers.iter().filter(|(name, _)| name.starts_with("X-")).collect();
        assert_eq!(gateway_headers.len(), 1);
        assert_eq!(gateway_headers[0].0, "X-Relaynet-Relay");
        assert_eq!(gateway_headers[0].1, "0deadbeef");
    }

    #[test]
    fn tls_requirement_combines_policy_and_options() {
        let secure = DeliveryOptions::default();
        let insecure = DeliveryOptions::default().with_tls(false);

        assert!(TlsPolicy::default().requires_tls(&secure));
        assert!(!TlsPolicy::default().requires_tls(&insecure));
        assert!(!TlsPolicy::permissive().requires_tls(&secure));
        assert!(!TlsPolicy::permissive().requires_tls(&insecure));
    }

    #[test]
    fn gateway_header_deserializes_from_kebab_case() {
        let header: GatewayHeader = serde_json::from_str("\"relaynet-gateway\"").unwrap();
        assert_eq!(header, GatewayHeader::RelaynetGateway);
        assert_eq!(header.to_string(), "X-Relaynet-Gateway");
    }
}
