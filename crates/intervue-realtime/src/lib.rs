//! Realtime channel between a running session and the interview backend.
//!
//! Frames are `{ "type": ..., "payload": ... }` JSON objects carried by a
//! pluggable [`Transport`]; [`RealtimeChannel`] adds subscription dispatch,
//! at-most-once sends and bounded exponential reconnection.

mod channel;
mod error;
pub mod mock;
mod transport;

pub use channel::{
    ChannelConfig, ChannelConnection, ChannelState, EventFilter, RealtimeChannel, Subscription,
};
pub use error::ChannelError;
pub use mock::{MockServerEnd, MockTransport};
pub use transport::{
    CloseReason, InboundFrame, OutboundFrame, Transport, TransportLink, WsTransport,
    ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};
