//! Client-side parcel delivery over HTTP (PoHTTP).
//!
//! Nodes of an Awala-style overlay network hand parcels to the next hop by
//! POSTing them to the recipient's PoHTTP endpoint. This crate implements
//! the sending side of that binding.
//!
//! # Architecture
//!
//! Delivery of a parcel goes through three steps:
//!
//! 1. **Target Resolution** - A recipient URL is used as is; an overlay
//!    address is resolved through an [`AddressResolver`]
//! 2. **Delivery** - The parcel is POSTed through a [`Transport`] that
//!    never follows redirects on its own
//! 3. **Classification** - 307/308 responses are followed manually within
//!    a bounded budget; other unsuccessful responses become a typed
//!    [`DeliveryError`]
//!
//! HTTP clients commonly fail to resubmit POST bodies on 307/308, which is
//! why the engine owns redirects. TLS policy is enforced on every hop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use pohttp_delivery::{
//!     client::HttpTransport,
//!     resolver::{ResolverSettings, SrvAddressResolver},
//!     DeliveryOptions, ParcelDeliverer,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = Arc::new(HttpTransport::with_defaults()?);
//! let resolver = Arc::new(SrvAddressResolver::new(&ResolverSettings::default())?);
//! let deliverer = ParcelDeliverer::new(transport, resolver);
//!
//! let response = deliverer
//!     .deliver("example.com", Bytes::from_static(b"parcel"), &DeliveryOptions::default())
//!     .await?;
//! println!("Delivered with HTTP {}", response.status);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod options;
pub mod resolver;
pub mod target;

pub use client::{Transport, TransportError, TransportResponse};
pub use config::Config;
pub use engine::{DeliveryResponse, ParcelDeliverer};
pub use error::{DeliveryError, ErrorKind, Result};
pub use options::{DeliveryOptions, GatewayHeader, TlsPolicy, PARCEL_CONTENT_TYPE};
pub use resolver::{AddressResolver, ResolutionError, ResolvedAddress};

/// Default number of 307/308 redirects followed per delivery.
pub const DEFAULT_MAX_REDIRECTS: u32 = 3;

/// Default timeout of each POST attempt in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
