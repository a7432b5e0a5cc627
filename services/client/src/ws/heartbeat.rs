//! The per-session keep-alive timer.

use super::{
    SessionEnd, SharedSink,
    session::{ClientInner, SessionShared},
};
use futures_util::SinkExt;
use neuro_link_core::OutboundMessage;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{Instrument, error, trace};

/// Sends a heartbeat every `interval` while the session is open.
///
/// Each send runs as its own task so a slow write never delays the timer.
/// Send failures come back over a channel; the first one ends the session.
pub(crate) async fn run(
    inner: Arc<ClientInner>,
    shared: Arc<SessionShared>,
    sink: SharedSink,
    interval: Duration,
) {
    let (failure_tx, mut failure_rx) = mpsc::channel::<tungstenite::Error>(1);

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            Some(e) = failure_rx.recv() => {
                error!(error = %e, "Heartbeat send failed, treating connection as dead");
                inner.session_lost(&shared, SessionEnd::HeartbeatFailed(e.to_string()));
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        if !shared.is_open() {
            break;
        }

        let payload = match OutboundMessage::heartbeat().encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode heartbeat");
                continue;
            }
        };
        let sink = sink.clone();
        let failure_tx = failure_tx.clone();
        let cancel = shared.cancel.clone();
        tokio::spawn(
            async move {
                let send = async { sink.lock().await.send(Message::Text(payload.into())).await };
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    result = send => match result {
                        Ok(()) => trace!("Heartbeat sent"),
                        Err(e) => {
                            let _ = failure_tx.try_send(e);
                        }
                    },
                }
            }
            .in_current_span(),
        );
    }
    trace!("Heartbeat timer stopped");
}
