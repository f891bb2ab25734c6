//! Shared types for the mailq delivery service.
//!
//! - [`objects`]: request / response bodies, webhook envelope and analytics
//!   summary as they appear on the wire.
//! - [`signature`]: the webhook signing scheme.
//! - `client` (feature `client`): a typed HTTP client for the service API.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(unsafe_code)]

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
pub mod signature;
