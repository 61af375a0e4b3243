//! # kiln-stream
//!
//! Streaming event client for a kiln generation backend.
//!
//! The client holds one persistent WebSocket connection, decodes inbound
//! progress envelopes, and fans events out to per-prompt listeners:
//!
//! - [`endpoint::Endpoint`]: validated connection target (ws/wss, host policy)
//! - [`codec::EnvelopeCodec`]: size-gated envelope decoding
//! - [`registry::ListenerRegistry`]: capped, concurrency-safe listener table
//! - [`router::EventRouter`]: non-blocking per-listener delivery
//! - [`connection::ConnectionManager`]: connect/read/reconnect state machine
//! - [`client::KilnClient`]: the facade surrounding code talks to

#![deny(unsafe_code)]

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod endpoint;
pub mod listener;
pub mod registry;
pub mod router;

pub use client::KilnClient;
pub use config::StreamConfig;
pub use connection::ConnectionState;
pub use endpoint::{Endpoint, HostPolicy};
pub use listener::{DeliveryTarget, ListenerHandle, PromptFilter};
