//! Byte-level connection behind [`RealtimeChannel`](crate::RealtimeChannel).
//!
//! A transport opens one connection per call and hands back a pair of
//! queues. The channel never sees sockets; it reads [`InboundFrame`]s until
//! a close arrives and writes [`OutboundFrame`]s.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use intervue_core::SessionId;

use crate::error::ChannelError;

pub const NORMAL_CLOSURE: u16 = 1000;
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code and reason of a finished connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal(reason: impl Into<String>) -> Self {
        Self::new(NORMAL_CLOSURE, reason)
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(ABNORMAL_CLOSURE, reason)
    }

    /// Only 1000 counts as an intentional close.
    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close(CloseReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Closed(CloseReason),
}

/// Queues of one open connection. A closed `inbound` queue without a
/// preceding [`InboundFrame::Closed`] is an abnormal closure.
pub struct TransportLink {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub inbound: mpsc::Receiver<InboundFrame>,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, session_id: &SessionId) -> Result<TransportLink, ChannelError>;
}

/// WebSocket transport connecting to `{base_url}/interview/{session_id}`.
pub struct WsTransport {
    base_url: String,
    queue: usize,
}

impl WsTransport {
    pub fn new(base_url: impl Into<String>, queue: usize) -> Self {
        Self {
            base_url: base_url.into(),
            queue: queue.max(1),
        }
    }

    pub fn url_for(&self, session_id: &SessionId) -> String {
        format!("{}/interview/{}", self.base_url.trim_end_matches('/'), session_id)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, session_id: &SessionId) -> Result<TransportLink, ChannelError> {
        let url = self.url_for(session_id);
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ChannelError::Protocol(format!("not a websocket url: {url}")));
        }
        let (ws, _) = connect_async(&url)
            .await
            .map_err(|e| ChannelError::Connect(format!("{url}: {e}")))?;
        debug!(%url, "websocket open");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(self.queue);
        let (in_tx, in_rx) = mpsc::channel::<InboundFrame>(self.queue);

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                match frame {
                    OutboundFrame::Text(text) => {
                        if let Err(e) = ws_tx.send(Message::text(text)).await {
                            warn!(error = %e, "websocket write failed");
                            break;
                        }
                    }
                    OutboundFrame::Close(reason) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(reason.code),
                            reason: reason.reason.into(),
                        };
                        let _ = ws_tx.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
            let _ = ws_tx.close().await;
        });

        tokio::spawn(async move {
            let closed = loop {
                match ws_rx.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx
                            .send(InboundFrame::Text(text.as_str().to_string()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) => CloseReason::new(u16::from(f.code), f.reason.as_str()),
                            None => CloseReason::new(1005, "no status"),
                        };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break CloseReason::abnormal(e.to_string()),
                    None => break CloseReason::abnormal("stream ended"),
                }
            };
            let _ = in_tx.send(InboundFrame::Closed(closed)).await;
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
