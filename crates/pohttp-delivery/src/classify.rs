//! Classification of PoHTTP responses.
//!
//! Pure functions from a status code (and the short reason a server may
//! include in a JSON body) to the engine's next step or to a typed error.

use serde_json::Value;

use crate::error::DeliveryError;

/// What the engine does with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 2xx: the parcel was delivered.
    Success,
    /// 307/308 with budget left: resubmit the parcel to `Location`.
    Redirect,
    /// Anything else ends the delivery with an error.
    Failure,
}

/// Decides how to handle a response with `status` when `remaining`
/// redirects may still be followed.
pub fn evaluate(status: u16, remaining: u32) -> Disposition {
    match status {
        200..=299 => Disposition::Success,
        _ if is_redirect(status) && remaining > 0 => Disposition::Redirect,
        _ => Disposition::Failure,
    }
}

/// Only 307 and 308 preserve the method and body of the original request.
pub const fn is_redirect(status: u16) -> bool {
    matches!(status, 307 | 308)
}

/// Maps a terminal, unsuccessful status to a delivery error.
///
/// `max_redirects` is the budget configured for the call; it is only
/// reported when the status is a redirect that could no longer be followed.
pub fn classify_failure(status: u16, reason: Option<&str>, max_redirects: u32) -> DeliveryError {
    match status {
        403 => DeliveryError::invalid_parcel(reason),
        400..=499 => DeliveryError::client_binding(status, reason),
        _ if is_redirect(status) => DeliveryError::redirect_limit(max_redirects),
        _ => DeliveryError::unexpected_status(status, reason),
    }
}

/// Extracts the `message` field of a JSON response body.
///
/// Returns `None` for empty, non-JSON or message-less bodies.
pub fn extract_reason(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let parsed: Value = serde_json::from_slice(body).ok()?;
    parsed
        .get("message")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}
