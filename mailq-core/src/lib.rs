#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod admission;
pub mod clock;
pub mod config;
pub mod entities;
pub mod events;
pub mod framework;
pub mod processors;
pub mod queue;
pub mod service;
pub mod store;
pub mod tracker;
pub mod transport;
