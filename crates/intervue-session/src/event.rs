//! The single queue every session input flows through.

use serde_json::Value;
use tokio::sync::oneshot;

use intervue_core::model::{SessionSetup, Violation};
use intervue_core::QuestionId;
use intervue_realtime::ChannelConnection;

use crate::error::SessionError;

/// Client actions.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    Start(SessionSetup),
    /// Replace the buffered answer text.
    UpdateAnswer(String),
    Submit(QuestionId),
    Pause,
    Resume,
    StartRecording,
    StopRecording,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::UpdateAnswer(_) => "update_answer",
            Self::Submit(_) => "submit",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::StartRecording => "start_recording",
            Self::StopRecording => "stop_recording",
        }
    }
}

/// Countdown output. `generation` identifies the countdown that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { generation: u64, remaining_secs: u32 },
    Expired { generation: u64 },
}

pub type Reply = oneshot::Sender<Result<(), SessionError>>;

#[derive(Debug)]
pub enum SessionEvent {
    Command {
        command: SessionCommand,
        reply: Option<Reply>,
    },
    Timer(TimerEvent),
    /// Settled speech. `epoch` is the capture epoch the recording started in.
    TranscriptFinal { epoch: u64, text: String },
    Violation(Violation),
    ChannelState(ChannelConnection),
    ChannelFrame(Value),
}
