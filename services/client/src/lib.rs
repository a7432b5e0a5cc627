//! Neuro Link Client Library Crate
//!
//! This library contains the runtime half of the Neuro message channel:
//! configuration, connection lifecycle state, and the WebSocket session
//! logic with heartbeats and automatic reconnect. The `neuro-client` binary
//! is a thin console wrapper around this library.

pub mod config;
pub mod state;
pub mod ws;

pub use config::{Config, ConfigError};
pub use state::ConnectionState;
pub use ws::{ClientError, NeuroClient};
