use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use intervue_core::model::Violation;
use intervue_core::wire::{self, Envelope};
use intervue_core::{BackoffPolicy, QuestionId, SessionId};
use intervue_settings::InterviewSettings;

use crate::error::ChannelError;
use crate::transport::{CloseReason, InboundFrame, OutboundFrame, Transport, TransportLink};

/// Reconnection and queueing parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelConfig {
    /// Reconnect attempts after a drop before giving up.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ChannelConfig {
    pub fn from_settings(settings: &InterviewSettings) -> Self {
        Self {
            max_attempts: settings.channel.max_reconnect_attempts,
            base_delay: Duration::from_millis(settings.channel.reconnect_base_delay_ms),
            ..Default::default()
        }
    }

    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.max_attempts, self.base_delay).with_max_delay(self.max_delay)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

/// Observable connection status.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelConnection {
    pub state: ChannelState,
    /// Reconnect attempt in progress, 0 while connected.
    pub attempt: u32,
    pub next_backoff_ms: Option<u64>,
    /// Set when `Closed` was reached by giving up rather than by `close()`.
    pub exhausted: bool,
}

impl ChannelConnection {
    fn new(state: ChannelState) -> Self {
        Self {
            state,
            attempt: 0,
            next_backoff_ms: None,
            exhausted: false,
        }
    }
}

/// Which frames a subscriber receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventFilter {
    /// Frames of one type; the handler gets the payload.
    Type(String),
    /// Every frame; the handler gets `{type, payload}`.
    Wildcard,
}

impl From<&str> for EventFilter {
    fn from(s: &str) -> Self {
        if s == "*" {
            Self::Wildcard
        } else {
            Self::Type(s.to_string())
        }
    }
}

type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, EventFilter, Handler)>,
}

impl Subscribers {
    /// Matching handlers: typed ones in registration order, then wildcards.
    fn matching(&self, kind: &str) -> (Vec<Handler>, Vec<Handler>) {
        let mut typed = Vec::new();
        let mut wildcard = Vec::new();
        for (_, filter, handler) in &self.entries {
            match filter {
                EventFilter::Type(t) if t == kind => typed.push(Arc::clone(handler)),
                EventFilter::Wildcard => wildcard.push(Arc::clone(handler)),
                EventFilter::Type(_) => {}
            }
        }
        (typed, wildcard)
    }
}

struct Shared {
    state: watch::Sender<ChannelConnection>,
    subscribers: Mutex<Subscribers>,
    outbound: Mutex<Option<mpsc::Sender<OutboundFrame>>>,
}

impl Shared {
    fn set(&self, conn: ChannelConnection) {
        self.state.send_replace(conn);
    }

    fn dispatch(&self, envelope: &Envelope) {
        let (typed, wildcard) = self.subscribers.lock().matching(&envelope.kind);
        for handler in typed {
            handler(&envelope.payload);
        }
        if !wildcard.is_empty() {
            let frame = envelope.to_value();
            for handler in wildcard {
                handler(&frame);
            }
        }
    }

    fn dispatch_text(&self, text: &str) {
        match Envelope::parse(text) {
            Ok(envelope) => self.dispatch(&envelope),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }
}

/// Handle returned by [`RealtimeChannel::subscribe`].
pub struct Subscription {
    id: u64,
    shared: std::sync::Weak<Shared>,
}

impl Subscription {
    /// Remove the handler. Safe to call after the channel is gone.
    pub fn unsubscribe(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.subscribers.lock().entries.retain(|(id, _, _)| *id != self.id);
        }
    }
}

struct Supervisor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Resilient publish/subscribe connection to the interview backend.
///
/// After an abnormal closure the channel reconnects with exponential
/// backoff, up to `max_attempts` times; then it settles in `Closed` with
/// `exhausted` set and delivers a `channel_exhausted` frame to subscribers.
/// `close()` ends the connection with code 1000 and never reconnects.
pub struct RealtimeChannel {
    transport: Arc<dyn Transport>,
    config: ChannelConfig,
    shared: Arc<Shared>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl RealtimeChannel {
    pub fn new(transport: Arc<dyn Transport>, config: ChannelConfig) -> Self {
        let (state, _) = watch::channel(ChannelConnection::new(ChannelState::Disconnected));
        Self {
            transport,
            config,
            shared: Arc::new(Shared {
                state,
                subscribers: Mutex::new(Subscribers::default()),
                outbound: Mutex::new(None),
            }),
            supervisor: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ChannelConnection {
        self.shared.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelConnection> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.borrow().state == ChannelState::Connected
    }

    /// Open the connection for `session_id`.
    ///
    /// Only `Disconnected` and `Closed` channels connect; an active channel
    /// returns `Ok` untouched. A failed first attempt is returned as an error
    /// and handed to the reconnect loop like any other abnormal closure.
    pub async fn connect(&self, session_id: &SessionId) -> Result<(), ChannelError> {
        let current = self.state().state;
        if !matches!(current, ChannelState::Disconnected | ChannelState::Closed) {
            debug!(state = current.as_str(), "connect ignored, channel active");
            return Ok(());
        }
        self.stop_supervisor();
        self.shared.set(ChannelConnection::new(ChannelState::Connecting));

        let cancel = CancellationToken::new();
        let (initial, result) = match self.transport.open(session_id).await {
            Ok(link) => {
                *self.shared.outbound.lock() = Some(link.outbound.clone());
                self.shared.set(ChannelConnection::new(ChannelState::Connected));
                (Some(link), Ok(()))
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "initial connect failed");
                (None, Err(e))
            }
        };

        let task = tokio::spawn(supervise(
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            self.config.backoff(),
            session_id.clone(),
            initial,
            cancel.clone(),
        ));
        *self.supervisor.lock() = Some(Supervisor { cancel, task });
        result
    }

    /// Register `handler` for frames matching `filter` (`"*"` for all).
    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut subs = self.shared.subscribers.lock();
        subs.next_id += 1;
        let id = subs.next_id;
        subs.entries.push((id, filter.into(), Arc::new(handler)));
        Subscription {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Queue `{type, payload}` for delivery. At most once: `false` when not
    /// connected or the send queue is full, and nothing is buffered.
    pub fn send(&self, kind: &str, payload: Value) -> bool {
        if !self.is_connected() {
            debug!(kind, "send dropped, channel not connected");
            return false;
        }
        let Some(outbound) = self.shared.outbound.lock().clone() else {
            return false;
        };
        let text = Envelope::new(kind, payload).to_value().to_string();
        match outbound.try_send(OutboundFrame::Text(text)) {
            Ok(()) => true,
            Err(e) => {
                warn!(kind, error = %e, "send queue rejected frame");
                false
            }
        }
    }

    fn send_envelope(&self, envelope: Envelope) -> bool {
        self.send(&envelope.kind, envelope.payload)
    }

    pub fn send_answer(&self, question_id: &QuestionId, answer: &str) -> bool {
        self.send_envelope(Envelope::answer(question_id, answer))
    }

    pub fn send_proctoring(&self, violation: &Violation) -> bool {
        self.send_envelope(Envelope::proctoring(violation))
    }

    pub fn request_next_question(&self) -> bool {
        self.send_envelope(Envelope::next_question())
    }

    /// Intentional close with code 1000. Clears subscribers; no reconnect.
    pub fn close(&self) {
        self.stop_supervisor();
        if let Some(outbound) = self.shared.outbound.lock().take() {
            let _ = outbound.try_send(OutboundFrame::Close(CloseReason::normal("Client disconnecting")));
        }
        self.shared.subscribers.lock().entries.clear();
        self.shared.set(ChannelConnection::new(ChannelState::Closed));
        info!("channel closed");
    }

    fn stop_supervisor(&self) {
        if let Some(sup) = self.supervisor.lock().take() {
            sup.cancel.cancel();
            sup.task.abort();
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.stop_supervisor();
    }
}

/// Owns the live connection and the reconnect schedule.
async fn supervise(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    backoff: BackoffPolicy,
    session_id: SessionId,
    mut link: Option<TransportLink>,
    cancel: CancellationToken,
) {
    let mut attempt = 0u32;
    loop {
        if let Some(TransportLink { outbound, mut inbound }) = link.take() {
            attempt = 0;
            *shared.outbound.lock() = Some(outbound);
            shared.set(ChannelConnection::new(ChannelState::Connected));
            info!(session_id = %session_id, "channel connected");

            let closed = pump(&shared, &mut inbound, &cancel).await;
            shared.outbound.lock().take();
            match closed {
                None => return,
                Some(reason) if reason.is_normal() => {
                    info!(session_id = %session_id, reason = %reason.reason, "channel closed by server");
                    shared.set(ChannelConnection::new(ChannelState::Disconnected));
                    return;
                }
                Some(reason) => {
                    warn!(session_id = %session_id, code = reason.code, reason = %reason.reason, "abnormal closure");
                }
            }
        }

        attempt += 1;
        if !backoff.allows(attempt) {
            let attempts = attempt - 1;
            warn!(session_id = %session_id, attempts, "reconnection abandoned");
            shared.set(ChannelConnection {
                state: ChannelState::Closed,
                attempt: attempts,
                next_backoff_ms: None,
                exhausted: true,
            });
            shared.dispatch(&Envelope::new(
                wire::CHANNEL_EXHAUSTED,
                json!({ "attempts": attempts }),
            ));
            return;
        }

        let delay = backoff.delay_for(attempt);
        let delay_ms = delay.as_millis() as u64;
        warn!(session_id = %session_id, attempt, delay_ms, "scheduling reconnect");
        shared.set(ChannelConnection {
            state: ChannelState::Reconnecting,
            attempt,
            next_backoff_ms: Some(delay_ms),
            exhausted: false,
        });

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = transport.open(&session_id) => opened,
        };
        match opened {
            Ok(new_link) => link = Some(new_link),
            Err(e) => warn!(session_id = %session_id, attempt, error = %e, "reconnect failed"),
        }
    }
}

/// Deliver inbound frames until the connection ends. `None` means cancelled.
async fn pump(
    shared: &Shared,
    inbound: &mut mpsc::Receiver<InboundFrame>,
    cancel: &CancellationToken,
) -> Option<CloseReason> {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return None,
            frame = inbound.recv() => frame,
        };
        match frame {
            Some(InboundFrame::Text(text)) => shared.dispatch_text(&text),
            Some(InboundFrame::Closed(reason)) => return Some(reason),
            None => return Some(CloseReason::abnormal("transport dropped")),
        }
    }
}
