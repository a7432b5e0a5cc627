//! WebSocket Connection Management
//!
//! This module contains the runtime half of the Neuro channel. It is
//! structured into submodules:
//!
//! - `session`: The connection manager. Owns the transport, the lifecycle
//!   state and the reconnect policy.
//! - `receive`: The per-session read loop feeding the dispatcher.
//! - `heartbeat`: The per-session keep-alive timer.

mod heartbeat;
mod receive;
pub mod session;

use futures_util::stream::{SplitSink, SplitStream};
use neuro_link_core::ProtocolError;
use std::sync::Arc;
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite};

pub use session::NeuroClient;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSource = SplitStream<WsStream>;
pub(crate) type SharedSink = Arc<Mutex<SplitSink<WsStream, tungstenite::Message>>>;

/// Errors surfaced to callers of [`NeuroClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not connected to the Neuro service")]
    NotConnected,
    #[error("Refusing to send an empty chat message")]
    EmptyMessage,
    #[error("The client has been shut down")]
    Stopped,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("WebSocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// Why a session stopped being open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The service sent a close frame.
    PeerClosed,
    /// The frame stream ended without a close frame.
    StreamEnded,
    /// No frame arrived within the read timeout.
    TimedOut,
    /// A read failed at the transport level.
    ReceiveFailed(String),
    /// A heartbeat could not be written.
    HeartbeatFailed(String),
}

impl SessionEnd {
    /// Orderly endings return the client to idle; everything else is a failure.
    pub(crate) fn is_failure(&self) -> bool {
        !matches!(self, Self::PeerClosed | Self::StreamEnded)
    }
}
