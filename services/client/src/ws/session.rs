//! Manages the WebSocket connection lifecycle and the reconnect policy.

use super::{ClientError, SessionEnd, SharedSink, heartbeat, receive};
use crate::{
    config::Config,
    state::{ConnectionState, StateCell},
};
use futures_util::{SinkExt, StreamExt};
use neuro_link_core::{ChatDelivery, Dispatcher, EngineClock, Notifications, OutboundMessage};
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// How long an operator teardown waits for the close frame to go out.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// State shared by the tasks of one session.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) id: u64,
    open: AtomicBool,
    pub(crate) cancel: CancellationToken,
}

impl SessionShared {
    pub(crate) fn new(id: u64, cancel: CancellationToken) -> Self {
        Self {
            id,
            open: AtomicBool::new(true),
            cancel,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// The single open -> not-open transition. Only the first caller wins.
    fn close(&self) -> bool {
        self.open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct ActiveSession {
    shared: Arc<SessionShared>,
    sink: SharedSink,
    tasks: TaskTracker,
}

/// What `connect` does with a session that is already open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reuse {
    Replace,
    KeepOpen,
}

pub(crate) struct ClientInner {
    pub(crate) config: Config,
    state: StateCell,
    pub(crate) dispatcher: Dispatcher,
    clock: EngineClock,
    session: Mutex<Option<ActiveSession>>,
    connect_lock: tokio::sync::Mutex<()>,
    next_session_id: AtomicU64,
    reconnect_enabled: AtomicBool,
    reconnect_pending: AtomicBool,
    reconnects_scheduled: AtomicU64,
    shutdown: CancellationToken,
}

/// A resilient connection to the Neuro service.
///
/// Cloning is cheap; all clones drive the same connection. Background tasks
/// keep the connection alive until [`NeuroClient::shutdown`] is called.
#[derive(Clone)]
pub struct NeuroClient {
    inner: Arc<ClientInner>,
}

impl NeuroClient {
    pub fn new(config: Config, delivery: Arc<dyn ChatDelivery>) -> Self {
        let notifications = Arc::new(Notifications::new());
        let reconnect_enabled = config.auto_reconnect;
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: StateCell::default(),
                dispatcher: Dispatcher::new(delivery, notifications),
                clock: EngineClock::start(),
                session: Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                next_session_id: AtomicU64::new(1),
                reconnect_enabled: AtomicBool::new(reconnect_enabled),
                reconnect_pending: AtomicBool::new(false),
                reconnects_scheduled: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Observer slots for connected, disconnected and message-received events.
    pub fn notifications(&self) -> &Notifications {
        self.inner.dispatcher.notifications()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn reconnect_enabled(&self) -> bool {
        self.inner.reconnect_enabled.load(Ordering::Acquire)
    }

    /// Total number of reconnect attempts scheduled so far.
    pub fn reconnects_scheduled(&self) -> u64 {
        self.inner.reconnects_scheduled.load(Ordering::Acquire)
    }

    /// Opens a new session, replacing any existing one.
    ///
    /// On failure the reconnect policy is applied before the error is returned.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.connect(Reuse::Replace).await
    }

    /// Closes the current session without triggering a reconnect.
    pub async fn disconnect(&self) {
        self.inner.teardown(ConnectionState::Idle).await;
    }

    /// Disables the reconnect policy. An open session stays open.
    pub fn stop_reconnecting(&self) {
        info!("Automatic reconnect disabled");
        self.inner.reconnect_enabled.store(false, Ordering::Release);
    }

    pub fn enable_reconnecting(&self) {
        info!("Automatic reconnect enabled");
        self.inner.reconnect_enabled.store(true, Ordering::Release);
    }

    /// Sends a chat line on behalf of the configured user.
    pub async fn send_chat(&self, text: &str) -> Result<(), ClientError> {
        self.inner.send_chat(text).await
    }

    /// Stops reconnecting, closes the session and moves to the terminal
    /// `Stopped` state. Pending reconnect attempts are abandoned.
    pub async fn shutdown(&self) {
        self.stop_reconnecting();
        self.inner.shutdown.cancel();
        let _guard = self.inner.connect_lock.lock().await;
        self.inner.teardown(ConnectionState::Stopped).await;
        self.inner.state.set(ConnectionState::Stopped);
        info!("Neuro client stopped");
    }
}

impl ClientInner {
    async fn connect(self: &Arc<Self>, reuse: Reuse) -> Result<(), ClientError> {
        let _guard = self.connect_lock.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(ClientError::Stopped);
        }
        // Checked under the lock so a connect that finished while we waited counts.
        if reuse == Reuse::KeepOpen && self.state.get() == ConnectionState::Open {
            debug!("Already connected, skipping reconnect");
            return Ok(());
        }

        self.teardown(ConnectionState::Idle).await;
        if !self.state.set(ConnectionState::Connecting) {
            return Err(ClientError::Stopped);
        }

        let endpoint = self.config.endpoint.as_str();
        info!(endpoint, "Connecting to Neuro service");
        let connected = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(ClientError::Stopped),
            connected = connect_async(endpoint) => connected,
        };
        let ws_stream = match connected {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                error!(endpoint, error = %e, "Failed to connect to Neuro service");
                self.state.set(ConnectionState::Failed);
                self.schedule_reconnect();
                return Err(ClientError::Transport(e));
            }
        };

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(SessionShared::new(id, self.shutdown.child_token()));
        let (sink, stream) = ws_stream.split();
        let sink: SharedSink = Arc::new(tokio::sync::Mutex::new(sink));

        if !self.state.set(ConnectionState::Open) {
            return Err(ClientError::Stopped);
        }
        info!(endpoint, session_id = id, "Connected to Neuro service");
        self.dispatcher.notifications().notify_connected();

        // Registered before the tasks start so an immediate failure can find it.
        let tasks = TaskTracker::new();
        *lock(&self.session) = Some(ActiveSession {
            shared: shared.clone(),
            sink: sink.clone(),
            tasks: tasks.clone(),
        });

        let span = info_span!("neuro_session", session_id = id, endpoint);
        tasks.spawn(receive::run(self.clone(), shared.clone(), stream).instrument(span.clone()));
        match self.config.heartbeat_interval {
            Some(interval) => {
                tasks.spawn(heartbeat::run(self.clone(), shared, sink, interval).instrument(span));
            }
            None => debug!(session_id = id, "Heartbeat disabled"),
        }
        tasks.close();
        Ok(())
    }

    /// Ends the current session on operator request. Never reconnects.
    async fn teardown(&self, final_state: ConnectionState) {
        let Some(active) = lock(&self.session).take() else {
            return;
        };
        let was_open = active.shared.close();
        if was_open {
            self.state.set(ConnectionState::Closing);
            let send_close = async {
                let mut sink = active.sink.lock().await;
                sink.send(Message::Close(None)).await
            };
            match tokio::time::timeout(CLOSE_FRAME_TIMEOUT, send_close).await {
                Ok(Ok(())) => debug!(session_id = active.shared.id, "Close frame sent"),
                Ok(Err(e)) => debug!(error = %e, "Could not send close frame"),
                Err(_) => debug!("Timed out sending close frame"),
            }
        }
        active.shared.cancel.cancel();
        active.tasks.wait().await;
        drop(active);

        self.state.set(final_state);
        if was_open {
            info!("Disconnected from Neuro service");
            self.dispatcher.notifications().notify_disconnected();
        }
    }

    /// Called by session tasks when they detect that the connection is dead.
    /// Safe to call from several tasks at once; only the first call acts.
    pub(crate) fn session_lost(self: &Arc<Self>, shared: &SessionShared, end: SessionEnd) {
        if !shared.close() {
            debug!(session_id = shared.id, ?end, "Session already closed");
            return;
        }
        shared.cancel.cancel();
        {
            let mut session = lock(&self.session);
            if session.as_ref().is_some_and(|s| s.shared.id == shared.id) {
                session.take();
            }
        }

        if end.is_failure() {
            warn!(session_id = shared.id, ?end, "Connection to Neuro service lost");
            self.state.set(ConnectionState::Failed);
        } else {
            info!(session_id = shared.id, ?end, "Connection to Neuro service closed");
            self.state.set(ConnectionState::Idle);
        }
        self.dispatcher.notifications().notify_disconnected();
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.reconnect_enabled.load(Ordering::Acquire) || self.shutdown.is_cancelled() {
            return;
        }
        if self.reconnect_pending.swap(true, Ordering::AcqRel) {
            debug!("Reconnect already pending");
            return;
        }
        let attempt = self.reconnects_scheduled.fetch_add(1, Ordering::AcqRel) + 1;
        let delay = self.config.reconnect_delay;
        info!(
            attempt,
            delay_secs = delay.as_secs_f64(),
            "Scheduling reconnect to Neuro service"
        );

        let inner = self.clone();
        tokio::spawn(async move { inner.reconnect_after(delay).await });
    }

    async fn reconnect_after(self: Arc<Self>, delay: Duration) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                self.reconnect_pending.store(false, Ordering::Release);
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        self.reconnect_pending.store(false, Ordering::Release);

        if !self.reconnect_enabled.load(Ordering::Acquire) {
            info!("Reconnect cancelled");
            return;
        }
        if let Err(e) = self.connect(Reuse::KeepOpen).await {
            debug!(error = %e, "Reconnect attempt failed");
        }
    }

    async fn send_chat(&self, text: &str) -> Result<(), ClientError> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let (session_id, sink) = lock(&self.session)
            .as_ref()
            .filter(|s| s.shared.is_open())
            .map(|s| (s.shared.id, s.sink.clone()))
            .ok_or(ClientError::NotConnected)?;

        let payload =
            OutboundMessage::chat(text, self.config.user_id.as_str(), &self.clock).encode()?;
        let result = sink.lock().await.send(Message::Text(payload.into())).await;
        if let Err(e) = result {
            error!(session_id, error = %e, "Failed to send chat message");
            return Err(ClientError::Transport(e));
        }
        debug!(session_id, chars = text.len(), "Chat message sent");
        Ok(())
    }
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
