//! Transport-agnostic building blocks of the Neuro message channel.
//!
//! The runtime that owns sockets and tasks lives in `neuro-link-client`;
//! this crate only knows how messages look and where they go.

pub mod delivery;
pub mod dispatch;
pub mod events;
pub mod protocol;

pub use delivery::{ChatDelivery, LogDelivery};
pub use dispatch::{Dispatched, Dispatcher};
pub use events::Notifications;
pub use protocol::{EngineClock, InboundMessage, OutboundMessage, ProtocolError};
