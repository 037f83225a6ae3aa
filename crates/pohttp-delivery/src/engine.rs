//! Parcel delivery engine.
//!
//! Drives a delivery from recipient to final response: resolves the
//! target, POSTs the parcel, and follows 307/308 redirects itself within a
//! bounded budget, re-checking TLS policy at every hop.

use std::{collections::HashMap, sync::Arc};

use bytes::Bytes;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    classify::{classify_failure, evaluate, extract_reason, Disposition},
    client::{PostRequest, Transport, TransportResponse},
    error::{DeliveryError, Result},
    options::{DeliveryOptions, TlsPolicy},
    resolver::AddressResolver,
    target::{enforce_tls, follow_location, resolve_target},
};

/// Successful outcome of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    /// HTTP status code (2xx).
    pub status: u16,
    /// Response headers, keyed by lower-case name.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
    /// Whether `body` was cut short, see [`TransportResponse::body_truncated`].
    pub body_truncated: bool,
    /// URL that accepted the parcel.
    pub url: String,
    /// Number of redirects followed to reach `url`.
    pub redirects: u32,
}

/// Delivers parcels over PoHTTP.
///
/// Holds no per-call state: clones share the transport and resolver and
/// may deliver concurrently.
#[derive(Debug, Clone)]
pub struct ParcelDeliverer {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn AddressResolver>,
    tls: TlsPolicy,
}

impl ParcelDeliverer {
    /// Creates a deliverer enforcing TLS whenever a call asks for it.
    pub fn new(transport: Arc<dyn Transport>, resolver: Arc<dyn AddressResolver>) -> Self {
        Self { transport, resolver, tls: TlsPolicy::default() }
    }

    /// Replaces the process-wide TLS policy.
    #[must_use]
    pub fn with_tls_policy(mut self, tls: TlsPolicy) -> Self {
        self.tls = tls;
        self
    }

    /// Returns the TLS policy in effect.
    pub fn tls_policy(&self) -> TlsPolicy {
        self.tls
    }

    /// Delivers `parcel` to `recipient`.
    ///
    /// `recipient` is either an absolute URL or an overlay address to
    /// resolve first.
    ///
    /// # Errors
    ///
    /// - `InvalidParcel` when the server rejects the parcel (HTTP 403)
    /// - `ClientBinding` for any other 4xx response
    /// - `Generic` for resolution, connection, TLS and redirect failures,
    ///   and any other unsuccessful response
    pub async fn deliver(
        &self,
        recipient: &str,
        parcel: Bytes,
        options: &DeliveryOptions,
    ) -> Result<DeliveryResponse> {
        let span = info_span!(
            "parcel_delivery",
            delivery_id = %Uuid::new_v4(),
            recipient,
            max_redirects = options.max_redirects,
            parcel_len = parcel.len(),
        );

        async move {
            let url = resolve_target(recipient, options.use_tls, self.resolver.as_ref()).await?;
            self.post_parcel(url, parcel, options).await
        }
        .instrument(span)
        .await
    }

    /// POSTs `parcel` to `url`, following redirects.
    ///
    /// Every attempt carries the same body, headers and timeout.
    ///
    /// # Errors
    ///
    /// See [`ParcelDeliverer::deliver`].
    pub async fn post_parcel(
        &self,
        url: String,
        parcel: Bytes,
        options: &DeliveryOptions,
    ) -> Result<DeliveryResponse> {
        let tls_required = self.tls.requires_tls(options);
        let headers = options.request_headers();
        let mut current = url;
        let mut remaining = options.max_redirects;

        let result = loop {
            if let Err(e) = enforce_tls(&current, tls_required) {
                break Err(e);
            }

            let attempt = options.max_redirects - remaining + 1;
            debug!(url = %current, attempt, "Posting parcel");

            let request = PostRequest {
                url: current.clone(),
                body: parcel.clone(),
                headers: headers.clone(),
                timeout: options.timeout,
            };
            let response = match self.transport.post(request).await {
                Ok(response) => response,
                Err(e) => break Err(DeliveryError::connection(e)),
            };

            match evaluate(response.status, remaining) {
                Disposition::Success => {
                    break Ok(DeliveryResponse {
                        status: response.status,
                        headers: response.headers,
                        body: response.body,
                        body_truncated: response.body_truncated,
                        url: current.clone(),
                        redirects: options.max_redirects - remaining,
                    });
                },
                Disposition::Redirect => match next_location(&current, &response) {
                    Some(next) => {
                        debug!(
                            status = response.status,
                            from = %current,
                            to = %next,
                            "Following redirect"
                        );
                        remaining -= 1;
                        current = next;
                    },
                    None => break Err(DeliveryError::missing_location(response.status)),
                },
                Disposition::Failure => {
                    let reason = extract_reason(&response.body);
                    if reason.is_none() && response.body_truncated {
                        debug!(
                            status = response.status,
                            "Rejection reason lost to incomplete body"
                        );
                    }
                    break Err(classify_failure(
                        response.status,
                        reason.as_deref(),
                        options.max_redirects,
                    ));
                },
            }
        };

        match &result {
            Ok(response) => info!(
                status = response.status,
                url = %response.url,
                redirects = response.redirects,
                "Parcel delivered"
            ),
            Err(e) => warn!(kind = %e.kind(), url = %current, "Parcel delivery failed: {}", e),
        }
        result
    }
}

fn next_location(current: &str, response: &TransportResponse) -> Option<String> {
    response.header("location").and_then(|location| follow_location(current, location))
}
