//! In-process transport for tests and offline sessions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use intervue_core::wire::Envelope;
use intervue_core::SessionId;

use crate::error::ChannelError;
use crate::transport::{CloseReason, InboundFrame, OutboundFrame, Transport, TransportLink};

/// Server side of one accepted mock connection.
pub struct MockServerEnd {
    pub session_id: SessionId,
    to_client: mpsc::Sender<InboundFrame>,
    from_client: mpsc::Receiver<OutboundFrame>,
}

impl MockServerEnd {
    /// Push a `{type, payload}` frame to the client.
    pub async fn push(&self, kind: &str, payload: Value) -> bool {
        let text = Envelope::new(kind, payload).to_value().to_string();
        self.push_raw(text).await
    }

    pub async fn push_raw(&self, text: impl Into<String>) -> bool {
        self.to_client
            .send(InboundFrame::Text(text.into()))
            .await
            .is_ok()
    }

    /// Close the connection with `code`.
    pub async fn close(&self, code: u16) {
        let _ = self
            .to_client
            .send(InboundFrame::Closed(CloseReason::new(code, "server closed")))
            .await;
    }

    /// Next frame written by the client.
    pub async fn recv(&mut self) -> Option<OutboundFrame> {
        self.from_client.recv().await
    }

    /// Next text frame written by the client, parsed.
    pub async fn recv_envelope(&mut self) -> Option<Envelope> {
        loop {
            match self.from_client.recv().await? {
                OutboundFrame::Text(text) => return Envelope::parse(&text).ok(),
                OutboundFrame::Close(_) => return None,
            }
        }
    }
}

/// Transport whose connections are driven by the test through
/// [`MockServerEnd`]s. Refusals are scripted per attempt.
pub struct MockTransport {
    refusals: Mutex<VecDeque<bool>>,
    refuse_all: AtomicBool,
    opens: AtomicUsize,
    open_times: Mutex<Vec<Instant>>,
    accepted: mpsc::UnboundedSender<MockServerEnd>,
}

impl MockTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServerEnd>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        (
            Self {
                refusals: Mutex::new(VecDeque::new()),
                refuse_all: AtomicBool::new(false),
                opens: AtomicUsize::new(0),
                open_times: Mutex::new(Vec::new()),
                accepted,
            },
            rx,
        )
    }

    /// Refuse the next `n` open attempts.
    pub fn refuse_next(&self, n: usize) {
        self.refusals.lock().extend(std::iter::repeat(true).take(n));
    }

    /// Refuse every open attempt until cleared.
    pub fn set_refuse_all(&self, refuse: bool) {
        self.refuse_all.store(refuse, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// When each open attempt happened, on the tokio clock.
    pub fn open_times(&self) -> Vec<Instant> {
        self.open_times.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, session_id: &SessionId) -> Result<TransportLink, ChannelError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.open_times.lock().push(Instant::now());

        let scripted = self.refusals.lock().pop_front().unwrap_or(false);
        if scripted || self.refuse_all.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect("connection refused".into()));
        }

        let (to_client, inbound) = mpsc::channel(64);
        let (outbound, from_client) = mpsc::channel(64);
        let end = MockServerEnd {
            session_id: session_id.clone(),
            to_client,
            from_client,
        };
        self.accepted
            .send(end)
            .map_err(|_| ChannelError::Connect("mock server gone".into()))?;
        Ok(TransportLink { outbound, inbound })
    }
}
