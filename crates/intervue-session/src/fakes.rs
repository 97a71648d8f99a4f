//! In-memory media and proctoring doubles for tests and offline runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use intervue_core::media::{AudioArtifact, MediaDevice, SpeechSynthesizer, StreamRef, TranscriptSegment};
use intervue_core::proctor::{DisplayControl, Presence, PresenceDetector};
use intervue_core::CaptureError;

#[derive(Default)]
struct MediaState {
    active: Option<StreamRef>,
    transcript: Vec<TranscriptSegment>,
    segments: Option<mpsc::Sender<TranscriptSegment>>,
}

/// Media device with scripted permission and transcript.
#[derive(Default)]
pub struct ScriptedMedia {
    deny: bool,
    unavailable: bool,
    state: Mutex<MediaState>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    recordings: AtomicUsize,
}

impl ScriptedMedia {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `acquire` fails with `PermissionDenied`.
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    /// Every `acquire` fails with `DeviceUnavailable`.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Segments delivered as soon as transcription starts.
    pub fn with_transcript(self, segments: Vec<TranscriptSegment>) -> Self {
        self.state.lock().transcript = segments;
        self
    }

    /// Deliver a segment to the running transcription. Returns false if none.
    pub fn push_segment(&self, segment: TranscriptSegment) -> bool {
        let state = self.state.lock();
        state
            .segments
            .as_ref()
            .is_some_and(|tx| tx.try_send(segment).is_ok())
    }

    pub fn acquire_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn recordings_started(&self) -> usize {
        self.recordings.load(Ordering::SeqCst)
    }

    /// Whether a stream is still held.
    pub fn is_active(&self) -> bool {
        self.state.lock().active.is_some()
    }
}

#[async_trait]
impl MediaDevice for ScriptedMedia {
    async fn acquire(&self) -> Result<StreamRef, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied("camera and microphone blocked".into()));
        }
        if self.unavailable {
            return Err(CaptureError::DeviceUnavailable("no camera attached".into()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let stream = StreamRef::audio_video();
        self.state.lock().active = Some(stream.clone());
        Ok(stream)
    }

    async fn start_recording(&self, _stream: &StreamRef) -> Result<(), CaptureError> {
        self.recordings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_recording(&self, _stream: &StreamRef) -> Result<AudioArtifact, CaptureError> {
        Ok(AudioArtifact {
            mime_type: "audio/webm".into(),
            data: vec![0u8; 64],
            duration: Duration::from_secs(1),
        })
    }

    async fn start_transcription(
        &self,
        _stream: &StreamRef,
    ) -> Result<mpsc::Receiver<TranscriptSegment>, CaptureError> {
        let mut state = self.state.lock();
        let (tx, rx) = mpsc::channel(state.transcript.len() + 16);
        for segment in state.transcript.drain(..) {
            let _ = tx.try_send(segment);
        }
        state.segments = Some(tx);
        Ok(rx)
    }

    fn stop_transcription(&self, _stream: &StreamRef) {
        self.state.lock().segments = None;
    }

    fn release(&self, stream: &StreamRef) {
        let mut state = self.state.lock();
        if state.active.as_ref().is_some_and(|s| s.id == stream.id) {
            state.active = None;
            state.segments = None;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Detector that replays a script, then reports `Present` forever.
#[derive(Default)]
pub struct ScriptedPresence {
    script: Mutex<VecDeque<Presence>>,
}

impl ScriptedPresence {
    pub fn new(script: Vec<Presence>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }

    pub fn push(&self, presence: Presence) {
        self.script.lock().push_back(presence);
    }
}

#[async_trait]
impl PresenceDetector for ScriptedPresence {
    async fn detect(&self) -> Presence {
        self.script.lock().pop_front().unwrap_or(Presence::Present)
    }
}

/// Display that always grants immersive mode and counts requests.
#[derive(Default)]
pub struct StaticDisplay {
    requests: AtomicUsize,
}

impl StaticDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reentry_requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DisplayControl for StaticDisplay {
    async fn request_immersive(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        true
    }
}

/// Synthesizer that records what it was asked to say.
#[derive(Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
    cancelled: AtomicBool,
}

impl RecordingSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSpeech {
    async fn speak(&self, text: &str) -> Result<(), CaptureError> {
        self.spoken.lock().push(text.to_string());
        Ok(())
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}
