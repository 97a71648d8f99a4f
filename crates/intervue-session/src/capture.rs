use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use intervue_core::media::{AudioArtifact, MediaDevice, StreamRef, TranscriptSegment};
use intervue_core::CaptureError;

use crate::event::SessionEvent;

/// Committed and in-flight speech-to-text output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    committed: String,
    interim: String,
}

impl TranscriptBuffer {
    /// Fold one segment in. Returns the text of a final segment.
    pub fn apply(&mut self, segment: TranscriptSegment) -> Option<String> {
        match segment {
            TranscriptSegment::Interim(text) => {
                self.interim = text;
                None
            }
            TranscriptSegment::Final(text) => {
                self.interim.clear();
                let text = text.trim().to_string();
                if text.is_empty() {
                    return None;
                }
                if !self.committed.is_empty() {
                    self.committed.push(' ');
                }
                self.committed.push_str(&text);
                Some(text)
            }
        }
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    pub fn interim(&self) -> &str {
        &self.interim
    }

    /// Committed text followed by the current hypothesis.
    pub fn display(&self) -> String {
        match (self.committed.is_empty(), self.interim.is_empty()) {
            (_, true) => self.committed.clone(),
            (true, false) => self.interim.clone(),
            (false, false) => format!("{} {}", self.committed, self.interim),
        }
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.interim.clear();
    }
}

/// An acquired stream and what is running on it.
#[derive(Clone, Debug)]
pub struct CaptureHandle {
    pub stream: StreamRef,
    pub recording: bool,
}

/// Owns the camera/microphone stream for one session.
///
/// The stream is released on `release()`, and again on drop, so every exit
/// path gives the hardware back. Final transcript segments are forwarded to
/// the session queue as [`SessionEvent::TranscriptFinal`], tagged with the
/// epoch the recording started in. [`clear_transcript`](Self::clear_transcript)
/// starts a new epoch; segments from an earlier one are discarded.
pub struct MediaCaptureManager {
    device: Arc<dyn MediaDevice>,
    events: mpsc::UnboundedSender<SessionEvent>,
    handle: Option<CaptureHandle>,
    transcript: Arc<Mutex<TranscriptBuffer>>,
    transcription: Option<JoinHandle<()>>,
    epoch: Arc<AtomicU64>,
}

impl MediaCaptureManager {
    pub fn new(device: Arc<dyn MediaDevice>, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            device,
            events,
            handle: None,
            transcript: Arc::new(Mutex::new(TranscriptBuffer::default())),
            transcription: None,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Acquire the audio/video stream, or return the one already held.
    pub async fn acquire(&mut self) -> Result<&CaptureHandle, CaptureError> {
        if self.handle.is_none() {
            let stream = self.device.acquire().await?;
            info!(stream_id = %stream.id, "capture acquired");
            self.handle = Some(CaptureHandle {
                stream,
                recording: false,
            });
        }
        self.handle
            .as_ref()
            .ok_or_else(|| CaptureError::DeviceUnavailable("stream not acquired".into()))
    }

    pub fn handle(&self) -> Option<&CaptureHandle> {
        self.handle.as_ref()
    }

    pub fn is_recording(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| h.recording)
    }

    /// Start recording and continuous transcription. A no-op while already
    /// recording.
    pub async fn start_recording(&mut self) -> Result<&CaptureHandle, CaptureError> {
        let stream = match &self.handle {
            None => return Err(CaptureError::DeviceUnavailable("stream not acquired".into())),
            Some(h) if h.recording => {
                debug!("start_recording ignored, already recording");
                return self.current();
            }
            Some(h) => h.stream.clone(),
        };

        self.device.start_recording(&stream).await?;
        match self.device.start_transcription(&stream).await {
            Ok(segments) => self.spawn_transcription(segments),
            Err(e) => warn!(error = %e, "transcription unavailable, recording audio only"),
        }
        if let Some(h) = self.handle.as_mut() {
            h.recording = true;
        }
        info!(stream_id = %stream.id, "recording started");
        self.current()
    }

    /// Stop recording and transcription. Returns an empty artifact when
    /// nothing was recording.
    pub async fn stop_recording(&mut self) -> Result<AudioArtifact, CaptureError> {
        let stream = match &self.handle {
            Some(h) if h.recording => h.stream.clone(),
            _ => return Ok(AudioArtifact::default()),
        };
        if let Some(h) = self.handle.as_mut() {
            h.recording = false;
        }
        self.device.stop_transcription(&stream);
        let artifact = self.device.stop_recording(&stream).await?;
        info!(
            stream_id = %stream.id,
            bytes = artifact.data.len(),
            duration_ms = artifact.duration.as_millis() as u64,
            "recording stopped"
        );
        Ok(artifact)
    }

    /// Current transcript state.
    pub fn transcript(&self) -> TranscriptBuffer {
        self.transcript.lock().clone()
    }

    /// Forget transcript text and start a new epoch, e.g. when moving to
    /// the next question.
    pub fn clear_transcript(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.transcript.lock().clear();
    }

    /// Epoch current transcript events must carry.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Stop all hardware access. Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(task) = self.transcription.take() {
            task.abort();
        }
        if let Some(handle) = self.handle.take() {
            if handle.recording {
                self.device.stop_transcription(&handle.stream);
            }
            self.device.release(&handle.stream);
            info!(stream_id = %handle.stream.id, "capture released");
        }
    }

    fn current(&self) -> Result<&CaptureHandle, CaptureError> {
        self.handle
            .as_ref()
            .ok_or_else(|| CaptureError::DeviceUnavailable("stream not acquired".into()))
    }

    fn spawn_transcription(&mut self, mut segments: mpsc::Receiver<TranscriptSegment>) {
        if let Some(previous) = self.transcription.take() {
            previous.abort();
        }
        let transcript = Arc::clone(&self.transcript);
        let events = self.events.clone();
        let current = Arc::clone(&self.epoch);
        let epoch = current.load(Ordering::SeqCst);
        self.transcription = Some(tokio::spawn(async move {
            while let Some(segment) = segments.recv().await {
                if current.load(Ordering::SeqCst) != epoch {
                    debug!(epoch, "transcription outlived its epoch, dropping segment");
                    return;
                }
                let committed = transcript.lock().apply(segment);
                if let Some(text) = committed {
                    if events.send(SessionEvent::TranscriptFinal { epoch, text }).is_err() {
                        return;
                    }
                }
            }
        }));
    }
}

impl Drop for MediaCaptureManager {
    fn drop(&mut self) {
        self.release();
    }
}
