//! Error types for parcel delivery.
//!
//! Every failure surfaced to a caller is a [`DeliveryError`]. Resolution
//! failures, transport failures and unexpected responses are wrapped into
//! one of three kinds, each carrying the exact human-readable message that
//! peers and operators rely on.

use std::fmt;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Failure to hand a parcel off to the next hop.
///
/// `ClientBinding` and `InvalidParcel` are specializations of `Generic`:
/// code that only cares that delivery failed can match on any variant and
/// read [`DeliveryError::message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Catch-all delivery failure.
    ///
    /// Covers address resolution, connectivity, TLS policy, redirect
    /// exhaustion and any unclassified non-2xx response.
    #[error("{message}")]
    Generic {
        /// Human-readable description
        message: String,
    },

    /// The server refused the request, blaming a protocol violation by this
    /// client (HTTP 4xx other than 403).
    #[error("{message}")]
    ClientBinding {
        /// Human-readable description
        message: String,
    },

    /// The server refused the parcel itself (HTTP 403).
    #[error("{message}")]
    InvalidParcel {
        /// Human-readable description
        message: String,
    },
}

impl DeliveryError {
    /// Creates a generic delivery error from a message.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic { message: message.into() }
    }

    /// Wraps a failure of the overlay address resolver.
    pub fn resolution_failed(cause: impl fmt::Display) -> Self {
        Self::generic(format!("Public address resolution failed: {cause}"))
    }

    /// Refuses to POST to a URL that is not protected by TLS.
    pub fn tls_required(url: &str) -> Self {
        Self::generic(format!("Can only POST to HTTPS URLs (got {url})"))
    }

    /// Wraps a failure that produced no HTTP response at all.
    pub fn connection(cause: impl fmt::Display) -> Self {
        Self::generic(format!("Connection error: {cause}"))
    }

    /// Reports that the redirect budget ran out.
    ///
    /// `max_redirects` is the budget configured for the call, not what was
    /// left of it.
    pub fn redirect_limit(max_redirects: u32) -> Self {
        Self::generic(format!("Reached maximum number of redirects ({max_redirects})"))
    }

    /// Reports a 307/308 response that cannot be followed.
    pub fn missing_location(status: u16) -> Self {
        Self::generic(format!(
            "Redirect response (HTTP {status}) did not include a valid Location header"
        ))
    }

    /// Reports an HTTP 403 rejection of the parcel.
    pub fn invalid_parcel(reason: Option<&str>) -> Self {
        Self::InvalidParcel { message: with_reason("Server rejected parcel".to_string(), reason) }
    }

    /// Reports an HTTP 4xx rejection of the request.
    pub fn client_binding(status: u16, reason: Option<&str>) -> Self {
        Self::ClientBinding {
            message: with_reason(
                format!("Server rejected request due to protocol violation (HTTP {status})"),
                reason,
            ),
        }
    }

    /// Reports any other unsuccessful response.
    pub fn unexpected_status(status: u16, reason: Option<&str>) -> Self {
        Self::generic(with_reason(format!("Failed to deliver parcel (HTTP {status})"), reason))
    }

    /// Returns the discriminator of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Generic { .. } => ErrorKind::Generic,
            Self::ClientBinding { .. } => ErrorKind::ClientBinding,
            Self::InvalidParcel { .. } => ErrorKind::InvalidParcel,
        }
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        match self {
            Self::Generic { message }
            | Self::ClientBinding { message }
            | Self::InvalidParcel { message } => message,
        }
    }
}

fn with_reason(message: String, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("{message}: {reason}"),
        None => message,
    }
}

/// Kind of delivery error, for logging and caller-side retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Catch-all failure.
    Generic,
    /// Protocol violation reported by the server.
    ClientBinding,
    /// Parcel rejected by the server.
    InvalidParcel,
}

impl ErrorKind {
    /// Every kind is a delivery error; this is the capability the
    /// specializations share with `Generic`.
    pub const fn is_delivery_error(self) -> bool {
        true
    }

    /// Whether this kind refines the generic delivery failure.
    pub const fn is_specialization(self) -> bool {
        matches!(self, Self::ClientBinding | Self::InvalidParcel)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic => write!(f, "generic"),
            Self::ClientBinding => write!(f, "client_binding"),
            Self::InvalidParcel => write!(f, "invalid_parcel"),
        }
    }
}
