use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::CaptureError;
use crate::ids::StreamId;

/// Reference to an acquired camera/microphone stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRef {
    pub id: StreamId,
    pub video: bool,
    pub audio: bool,
}

impl StreamRef {
    pub fn audio_video() -> Self {
        Self {
            id: StreamId::new(),
            video: true,
            audio: true,
        }
    }
}

/// Recorded audio returned by `stop_recording`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioArtifact {
    pub mime_type: String,
    pub data: Vec<u8>,
    pub duration: Duration,
}

impl AudioArtifact {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One unit of continuous speech-to-text output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TranscriptSegment {
    /// Volatile hypothesis, superseded by the next interim or final segment.
    Interim(String),
    /// Settled text that will not change.
    Final(String),
}

/// Camera/microphone capability of the host platform.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    async fn acquire(&self) -> Result<StreamRef, CaptureError>;

    async fn start_recording(&self, stream: &StreamRef) -> Result<(), CaptureError>;

    async fn stop_recording(&self, stream: &StreamRef) -> Result<AudioArtifact, CaptureError>;

    async fn start_transcription(
        &self,
        stream: &StreamRef,
    ) -> Result<mpsc::Receiver<TranscriptSegment>, CaptureError>;

    fn stop_transcription(&self, stream: &StreamRef);

    /// Stop every track of `stream`. Must tolerate repeated calls.
    fn release(&self, stream: &StreamRef);
}

/// Text-to-speech capability used to read questions aloud.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), CaptureError>;

    fn cancel(&self);
}
