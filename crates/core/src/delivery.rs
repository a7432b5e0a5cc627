//! The seam between the message channel and the game's dialog pipeline.

use anyhow::Result;
use async_trait::async_trait;

/// Hands chat responses from the Neuro service to an external dialog
/// pipeline.
///
/// Failures are reported back to the caller for logging only; they never
/// affect the state of the connection.
///
/// `deliver` runs inside the client's read loop, and the next frame is not
/// read until it returns. An implementation must not await the client's
/// `connect`, `disconnect` or `shutdown` from here: those wait for the read
/// loop to finish and would never complete. Spawn a task for that instead.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatDelivery: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<()>;
}

/// A delivery target that only logs what it receives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl ChatDelivery for LogDelivery {
    async fn deliver(&self, text: &str) -> Result<()> {
        tracing::info!(chars = text.len(), "Chat response: {}", text);
        Ok(())
    }
}
