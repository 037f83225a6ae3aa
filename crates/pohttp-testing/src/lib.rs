//! Test doubles for PoHTTP delivery.
//!
//! Provides a scripted transport and a stub resolver for hermetic engine
//! tests, and a wiremock-backed PoHTTP server for tests that go over the
//! network.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod http;
pub mod resolver;
pub mod transport;

pub use http::MockPohttpServer;
pub use resolver::StubResolver;
pub use transport::ScriptedTransport;

/// Parcel body used across tests.
pub const TEST_PARCEL: &[u8] = b"Hey";
