//! Observer slots for connection lifecycle and chat notifications.

use std::sync::{Arc, Mutex, MutexGuard};

type Callback = Arc<dyn Fn() + Send + Sync>;
type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback lists fired by the client. Observers run synchronously, in the
/// order they were registered, on whichever task raised the event.
///
/// The lists are snapshotted before invocation, so an observer may register
/// further observers without deadlocking.
#[derive(Default)]
pub struct Notifications {
    connected: Mutex<Vec<Callback>>,
    disconnected: Mutex<Vec<Callback>>,
    message_received: Mutex<Vec<TextCallback>>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.connected).push(Arc::new(callback));
    }

    pub fn on_disconnected<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock(&self.disconnected).push(Arc::new(callback));
    }

    /// Registers an observer for chat responses delivered by the service.
    pub fn on_message_received<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        lock(&self.message_received).push(Arc::new(callback));
    }

    pub fn notify_connected(&self) {
        let callbacks = lock(&self.connected).clone();
        for cb in callbacks {
            cb();
        }
    }

    pub fn notify_disconnected(&self) {
        let callbacks = lock(&self.disconnected).clone();
        for cb in callbacks {
            cb();
        }
    }

    pub fn notify_message_received(&self, text: &str) {
        let callbacks = lock(&self.message_received).clone();
        for cb in callbacks {
            cb(text);
        }
    }
}

// A panicking observer must not disable the remaining slots.
fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
