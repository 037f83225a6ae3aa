//! Target URL resolution and TLS enforcement.

use tracing::debug;
use url::Url;

use crate::{
    error::{DeliveryError, Result},
    resolver::AddressResolver,
};

/// Computes the initial URL for a recipient.
///
/// A recipient that already is an absolute URL is used verbatim and its
/// scheme is authoritative. Anything else is an overlay address: it is
/// resolved, and the scheme follows `use_tls`. When the resolver has no
/// record, the recipient itself becomes the host.
///
/// # Errors
///
/// Returns `DeliveryError::Generic` if the resolver fails.
pub async fn resolve_target(
    recipient: &str,
    use_tls: bool,
    resolver: &dyn AddressResolver,
) -> Result<String> {
    if is_absolute_url(recipient) {
        return Ok(recipient.to_string());
    }

    let scheme = if use_tls { "https" } else { "http" };
    let resolved = resolver.resolve(recipient).await.map_err(DeliveryError::resolution_failed)?;

    let url = match resolved {
        Some(address) => format!("{scheme}://{}:{}", address.host, address.port),
        None => format!("{scheme}://{recipient}"),
    };
    debug!(recipient, %url, "Resolved recipient");
    Ok(url)
}

/// Rejects `url` unless it uses HTTPS, when TLS is required.
///
/// # Errors
///
/// Returns `DeliveryError::Generic` for a URL that is not `https`,
/// including URLs that cannot be parsed.
pub fn enforce_tls(url: &str, tls_required: bool) -> Result<()> {
    if !tls_required {
        return Ok(());
    }
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "https" => Ok(()),
        _ => Err(DeliveryError::tls_required(url)),
    }
}

/// Computes the URL a redirect points to.
///
/// An absolute `Location` is used verbatim; a relative one is resolved
/// against `current`. Returns `None` when no URL can be derived.
pub fn follow_location(current: &str, location: &str) -> Option<String> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    if is_absolute_url(location) {
        return Some(location.to_string());
    }
    Url::parse(current).and_then(|base| base.join(location)).ok().map(String::from)
}

fn is_absolute_url(candidate: &str) -> bool {
    Url::parse(candidate).is_ok_and(|url| url.has_host())
}
