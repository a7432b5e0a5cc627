//! The per-session read loop.

use super::{
    SessionEnd, WsSource,
    session::{ClientInner, SessionShared},
};
use futures_util::{FutureExt, StreamExt};
use neuro_link_core::InboundMessage;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

/// Reads frames until the session ends, dispatching text frames in arrival
/// order. Every read is bounded by the configured read timeout; a read that
/// does not complete in time is treated as a dead connection and not retried.
///
/// A panic raised by a delivery target or observer is logged and the message
/// is dropped; the loop keeps reading.
pub(crate) async fn run(
    inner: Arc<ClientInner>,
    shared: Arc<SessionShared>,
    mut stream: WsSource,
) {
    let read_timeout = inner.config.read_timeout;

    let end = loop {
        if !shared.is_open() {
            break None;
        }
        let next = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break None,
            next = tokio::time::timeout(read_timeout, stream.next()) => next,
        };

        match next {
            Err(_) => {
                warn!(
                    timeout_secs = read_timeout.as_secs_f64(),
                    "No frame received within read timeout"
                );
                break Some(SessionEnd::TimedOut);
            }
            Ok(None) => break Some(SessionEnd::StreamEnded),
            Ok(Some(Err(e))) => {
                error!(error = %e, "Error receiving from Neuro WebSocket");
                break Some(SessionEnd::ReceiveFailed(e.to_string()));
            }
            Ok(Some(Ok(Message::Text(text)))) => match InboundMessage::decode(text.as_str()) {
                Ok(msg) => {
                    let dispatch = AssertUnwindSafe(inner.dispatcher.dispatch(msg));
                    match dispatch.catch_unwind().await {
                        Ok(route) => trace!(?route, "Dispatched message"),
                        Err(_) => error!("Message handler panicked, message dropped"),
                    }
                }
                Err(e) => warn!(error = %e, "Failed to parse server message"),
            },
            Ok(Some(Ok(Message::Close(frame)))) => {
                info!(?frame, "Neuro service closed the connection");
                break Some(SessionEnd::PeerClosed);
            }
            Ok(Some(Ok(Message::Binary(data)))) => {
                debug!(len = data.len(), "Ignoring binary frame");
            }
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)))) => {}
        }
    };

    match end {
        Some(end) => inner.session_lost(&shared, end),
        None => debug!("Receive loop cancelled"),
    }
}
