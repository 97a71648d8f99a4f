//! Media and proctoring adapters for a plain terminal.
//!
//! A terminal has no camera, no speech engine and no exclusive display
//! mode, so sessions run in degraded capture mode: answers are typed, the
//! candidate is always considered present and immersive requests are refused.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use intervue_core::media::{AudioArtifact, MediaDevice, SpeechSynthesizer, StreamRef, TranscriptSegment};
use intervue_core::proctor::{DisplayControl, Presence, PresenceDetector};
use intervue_core::CaptureError;

pub struct TerminalMedia;

#[async_trait]
impl MediaDevice for TerminalMedia {
    async fn acquire(&self) -> Result<StreamRef, CaptureError> {
        Err(CaptureError::DeviceUnavailable(
            "terminal sessions have no camera or microphone".into(),
        ))
    }

    async fn start_recording(&self, _stream: &StreamRef) -> Result<(), CaptureError> {
        Err(CaptureError::DeviceUnavailable("no microphone".into()))
    }

    async fn stop_recording(&self, _stream: &StreamRef) -> Result<AudioArtifact, CaptureError> {
        Ok(AudioArtifact::default())
    }

    async fn start_transcription(
        &self,
        _stream: &StreamRef,
    ) -> Result<mpsc::Receiver<TranscriptSegment>, CaptureError> {
        Err(CaptureError::Speech("speech recognition unavailable".into()))
    }

    fn stop_transcription(&self, _stream: &StreamRef) {}

    fn release(&self, _stream: &StreamRef) {}
}

pub struct AlwaysPresent;

#[async_trait]
impl PresenceDetector for AlwaysPresent {
    async fn detect(&self) -> Presence {
        Presence::Present
    }
}

pub struct HeadlessDisplay;

#[async_trait]
impl DisplayControl for HeadlessDisplay {
    async fn request_immersive(&self) -> bool {
        debug!("immersive mode unsupported in a terminal");
        false
    }
}

/// Prints questions instead of reading them aloud.
pub struct PrintedSpeech;

#[async_trait]
impl SpeechSynthesizer for PrintedSpeech {
    async fn speak(&self, text: &str) -> Result<(), CaptureError> {
        println!("\n  {text}\n");
        Ok(())
    }

    fn cancel(&self) {}
}
