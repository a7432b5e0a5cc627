//! Routes decoded inbound messages by their `type` discriminator.

use crate::{delivery::ChatDelivery, events::Notifications, protocol::InboundMessage};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The route a message took through the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// The service announced the connection.
    Connected,
    /// A chat response was handed to the delivery collaborator.
    ChatResponse,
    /// The service acknowledged a heartbeat.
    HeartbeatAck,
    /// The service reported a problem with something we sent.
    ServerError,
    /// Any other `type`, including an empty one.
    Unknown,
}

/// Maps message types to handlers. No message is ever fatal.
#[derive(Clone)]
pub struct Dispatcher {
    delivery: Arc<dyn ChatDelivery>,
    notifications: Arc<Notifications>,
}

impl Dispatcher {
    pub fn new(delivery: Arc<dyn ChatDelivery>, notifications: Arc<Notifications>) -> Self {
        Self {
            delivery,
            notifications,
        }
    }

    pub fn notifications(&self) -> &Arc<Notifications> {
        &self.notifications
    }

    /// Handles one message. Delivery completes before this returns, so
    /// calling it sequentially preserves wire order.
    pub async fn dispatch(&self, msg: InboundMessage) -> Dispatched {
        match msg.kind.as_str() {
            "connected" => {
                info!(
                    detail = msg.message.as_deref().unwrap_or_default(),
                    "Neuro service acknowledged connection"
                );
                Dispatched::Connected
            }
            "neuro_response" | "ai_response" => {
                let text = msg.text.unwrap_or_default();
                debug!(kind = %msg.kind, chars = text.len(), "Received chat response");
                if let Err(e) = self.delivery.deliver(&text).await {
                    error!(error = ?e, "Chat delivery failed");
                }
                self.notifications.notify_message_received(&text);
                Dispatched::ChatResponse
            }
            "pong" | "heartbeat_response" => {
                debug!(timestamp = ?msg.timestamp, "Heartbeat acknowledged");
                Dispatched::HeartbeatAck
            }
            "error" => {
                warn!(
                    detail = msg.message.as_deref().unwrap_or_default(),
                    "Neuro service reported an error"
                );
                Dispatched::ServerError
            }
            other => {
                debug!(kind = other, "Ignoring unhandled message type");
                Dispatched::Unknown
            }
        }
    }
}
