use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use intervue_core::media::{MediaDevice, SpeechSynthesizer};
use intervue_core::model::{
    Answer, Evaluation, IntegrityReport, Question, Report, Session, SessionSetup, SessionStatus,
    Violation, ViolationKind, ViolationLog, NO_ANSWER_SENTINEL,
};
use intervue_core::proctor::{DisplayControl, PlatformSignal, PresenceDetector};
use intervue_core::service::{QuestionService, ReportService};
use intervue_core::wire::{self, Envelope};
use intervue_core::{QuestionId, ServiceError, SessionId};
use intervue_realtime::{ChannelConnection, RealtimeChannel, Subscription};

use crate::capture::MediaCaptureManager;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::event::{SessionCommand, SessionEvent, TimerEvent};
use crate::fallback::fallback_question;
use crate::integrity::IntegrityMonitor;
use crate::scheduler::QuestionFlowScheduler;

/// Collaborators a session talks to.
#[derive(Clone)]
pub struct SessionDeps {
    pub questions: Arc<dyn QuestionService>,
    pub reports: Arc<dyn ReportService>,
    pub media: Arc<dyn MediaDevice>,
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub presence: Arc<dyn PresenceDetector>,
    pub display: Arc<dyn DisplayControl>,
    /// Realtime channel; `None` runs the session without one.
    pub channel: Option<Arc<RealtimeChannel>>,
}

/// Point-in-time view of a session, published after every change.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session_id: Option<SessionId>,
    pub question_index: u32,
    pub total_questions: u32,
    pub current_question: Option<Question>,
    pub answers: Vec<Answer>,
    pub violations: usize,
    pub integrity: IntegrityReport,
    pub remaining_secs: u32,
    pub paused: bool,
    pub recording: bool,
    /// Text that will be submitted for the current question.
    pub answer_buffer: String,
    /// Volatile speech-to-text hypothesis.
    pub interim: String,
    pub channel: Option<ChannelConnection>,
}

impl SessionSnapshot {
    fn idle(config: &SessionConfig) -> Self {
        Self {
            status: SessionStatus::Idle,
            session_id: None,
            question_index: 0,
            total_questions: config.total_questions,
            current_question: None,
            answers: Vec::new(),
            violations: 0,
            integrity: ViolationLog::new().report(),
            remaining_secs: 0,
            paused: false,
            recording: false,
            answer_buffer: String::new(),
            interim: String::new(),
            channel: None,
        }
    }
}

/// What a finished session leaves behind.
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub session: Option<Session>,
    pub answers: Vec<Answer>,
    pub violations: Vec<Violation>,
    pub integrity: IntegrityReport,
    pub report: Option<Report>,
    /// Evaluation frames received over the realtime channel.
    pub feedback: HashMap<QuestionId, Value>,
    /// Why the session failed, if it did.
    pub error: Option<SessionError>,
    /// Recovered failures: fallbacks, degraded channel or capture.
    pub warnings: Vec<SessionError>,
}

/// Client side of a running [`SessionController`].
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    signals: mpsc::UnboundedSender<PlatformSignal>,
    abort: CancellationToken,
}

impl SessionHandle {
    /// Start the session. Resolves once the first question is being
    /// answered, or with the error that stopped it.
    pub async fn start(&self, setup: SessionSetup) -> Result<(), SessionError> {
        self.command(SessionCommand::Start(setup)).await
    }

    /// Replace the typed answer for the current question.
    pub async fn update_answer(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.command(SessionCommand::UpdateAnswer(text.into())).await
    }

    /// Submit the buffered answer. Resolves after the next question is
    /// delivered or the session has completed.
    pub async fn submit(&self, question_id: QuestionId) -> Result<(), SessionError> {
        self.command(SessionCommand::Submit(question_id)).await
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::Resume).await
    }

    pub async fn start_recording(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::StartRecording).await
    }

    pub async fn stop_recording(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::StopRecording).await
    }

    /// Fail the session from any state.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    /// Forward a focus or display-mode change from the host platform.
    pub fn platform_signal(&self, signal: PlatformSignal) {
        let _ = self.signals.send(signal);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    async fn command(&self, command: SessionCommand) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.events
            .send(SessionEvent::Command {
                command,
                reply: Some(reply),
            })
            .map_err(|_| SessionError::Aborted)?;
        rx.await.unwrap_or(Err(SessionError::Aborted))
    }
}

/// Owns the session state machine.
///
/// Every input (client commands, countdown ticks, transcript segments,
/// violations, channel changes) arrives through one queue and is applied
/// in order by [`run`](Self::run). Nothing else mutates session state.
pub struct SessionController {
    config: SessionConfig,
    deps: SessionDeps,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
    abort: CancellationToken,

    scheduler: QuestionFlowScheduler,
    capture: MediaCaptureManager,
    monitor: IntegrityMonitor,

    status: SessionStatus,
    setup: Option<SessionSetup>,
    session: Option<Session>,
    question: Option<Question>,
    timer_generation: Option<u64>,
    answer_buffer: String,
    answers: Vec<Answer>,
    violations: ViolationLog,
    feedback: HashMap<QuestionId, Value>,
    channel_state: Option<ChannelConnection>,
    channel_sub: Option<Subscription>,
    channel_watch: Option<JoinHandle<()>>,
    report: Option<Report>,
    error: Option<SessionError>,
    warnings: Vec<SessionError>,
}

impl SessionController {
    pub fn new(config: SessionConfig, deps: SessionDeps) -> (Self, SessionHandle) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (snapshot, snapshot_rx) = watch::channel(SessionSnapshot::idle(&config));
        let abort = CancellationToken::new();

        let monitor = IntegrityMonitor::new(
            Arc::clone(&deps.presence),
            Arc::clone(&deps.display),
            config.integrity.clone(),
            events_tx.clone(),
        );
        let handle = SessionHandle {
            events: events_tx.clone(),
            snapshot: snapshot_rx,
            signals: monitor.signal_sender(),
            abort: abort.clone(),
        };

        let controller = Self {
            scheduler: QuestionFlowScheduler::new(events_tx.clone()),
            capture: MediaCaptureManager::new(Arc::clone(&deps.media), events_tx.clone()),
            monitor,
            config,
            deps,
            events_tx,
            events,
            snapshot,
            abort,
            status: SessionStatus::Idle,
            setup: None,
            session: None,
            question: None,
            timer_generation: None,
            answer_buffer: String::new(),
            answers: Vec::new(),
            violations: ViolationLog::new(),
            feedback: HashMap::new(),
            channel_state: None,
            channel_sub: None,
            channel_watch: None,
            report: None,
            error: None,
            warnings: Vec::new(),
        };
        (controller, handle)
    }

    /// Process events until the session completes, fails or is aborted.
    pub async fn run(mut self) -> SessionOutcome {
        while !self.status.is_terminal() {
            let event = tokio::select! {
                biased;
                _ = self.abort.cancelled() => None,
                event = self.events.recv() => event,
            };
            match event {
                Some(event) => self.handle_event(event).await,
                None => self.fail(SessionError::Aborted),
            }
        }
        self.teardown().await;
        self.outcome()
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Command { command, reply } => {
                let name = command.name();
                let result = self.handle_command(command).await;
                if let Err(e) = &result {
                    debug!(command = name, error = %e, "command rejected");
                }
                self.settle(&result);
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            SessionEvent::Timer(TimerEvent::Tick {
                generation,
                remaining_secs,
            }) => {
                if self.timer_generation == Some(generation) {
                    self.snapshot.send_modify(|s| s.remaining_secs = remaining_secs);
                }
            }
            SessionEvent::Timer(TimerEvent::Expired { generation }) => {
                if self.timer_generation != Some(generation) || self.status != SessionStatus::Answering {
                    debug!(generation, "stale countdown expiry ignored");
                    return;
                }
                info!(session_id = %self.session_label(), "question budget exhausted, auto-submitting");
                let spent = self.config.per_question_budget_secs;
                let result = self.submit_current(spent).await;
                self.settle(&result);
            }
            SessionEvent::TranscriptFinal { epoch, text } => {
                if epoch != self.capture.epoch() {
                    debug!(epoch, "transcript from an earlier question dropped");
                    return;
                }
                if self.status == SessionStatus::Answering {
                    if !self.answer_buffer.is_empty() {
                        self.answer_buffer.push(' ');
                    }
                    self.answer_buffer.push_str(&text);
                    self.publish();
                }
            }
            SessionEvent::Violation(violation) => self.record_violation(violation),
            SessionEvent::ChannelState(conn) => {
                if conn.exhausted && !self.channel_state.as_ref().is_some_and(|c| c.exhausted) {
                    warn!(
                        session_id = %self.session_label(),
                        attempts = conn.attempt,
                        "realtime channel exhausted, continuing without it"
                    );
                    self.warnings.push(SessionError::ChannelExhausted {
                        attempts: conn.attempt,
                    });
                }
                self.channel_state = Some(conn);
                self.publish();
            }
            SessionEvent::ChannelFrame(frame) => self.handle_frame(frame),
        }
    }

    /// Fail the session when a handler was interrupted by abort.
    fn settle(&mut self, result: &Result<(), SessionError>) {
        if matches!(result, Err(SessionError::Aborted)) && !self.status.is_terminal() {
            self.fail(SessionError::Aborted);
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        match command {
            SessionCommand::Start(setup) => self.start(setup).await,
            SessionCommand::UpdateAnswer(text) => {
                self.require(SessionStatus::Answering, "update_answer")?;
                self.answer_buffer = text;
                self.publish();
                Ok(())
            }
            SessionCommand::Submit(question_id) => {
                self.require(SessionStatus::Answering, "submit")?;
                let active = self
                    .question
                    .as_ref()
                    .map(|q| q.id.clone())
                    .ok_or(SessionError::InvalidTransition {
                        action: "submit",
                        status: self.status,
                    })?;
                if question_id != active {
                    return Err(SessionError::Validation {
                        submitted: question_id,
                        active,
                    });
                }
                let spent = self.scheduler.elapsed_secs();
                self.submit_current(spent).await
            }
            SessionCommand::Pause => {
                self.require(SessionStatus::Answering, "pause")?;
                if self.scheduler.pause() {
                    info!(session_id = %self.session_label(), remaining_secs = self.scheduler.remaining_secs(), "countdown paused");
                }
                self.publish();
                Ok(())
            }
            SessionCommand::Resume => {
                self.require(SessionStatus::Answering, "resume")?;
                if self.scheduler.resume() {
                    info!(session_id = %self.session_label(), remaining_secs = self.scheduler.remaining_secs(), "countdown resumed");
                }
                self.publish();
                Ok(())
            }
            SessionCommand::StartRecording => {
                self.require(SessionStatus::Answering, "start_recording")?;
                self.capture.start_recording().await?;
                self.publish();
                Ok(())
            }
            SessionCommand::StopRecording => {
                self.capture.stop_recording().await?;
                self.publish();
                Ok(())
            }
        }
    }

    fn require(&self, status: SessionStatus, action: &'static str) -> Result<(), SessionError> {
        if self.status == status {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                action,
                status: self.status,
            })
        }
    }

    async fn start(&mut self, setup: SessionSetup) -> Result<(), SessionError> {
        self.require(SessionStatus::Idle, "start")?;
        let setup = self.config.resolve_setup(setup)?;
        self.setup = Some(setup.clone());
        self.transition(SessionStatus::Initializing);

        match self.capture.acquire().await.map(|h| h.stream.id.clone()) {
            Ok(stream_id) => debug!(%stream_id, "media ready"),
            Err(e) if e.is_permission_denied() => {
                self.record_violation(Violation::with_message(ViolationKind::CaptureDenied, e.to_string()));
                let err = SessionError::from(e);
                self.fail(err.clone());
                return Err(err);
            }
            Err(e) => {
                warn!(error = %e, "media unavailable, continuing without capture");
                self.warnings.push(SessionError::Capture(e));
            }
        }

        let questions = Arc::clone(&self.deps.questions);
        let created = self
            .retrying("create_session", || {
                let questions = Arc::clone(&questions);
                let setup = setup.clone();
                async move { questions.create_session(&setup).await }
            })
            .await
            .ok_or(SessionError::Aborted)?;
        let created = match created {
            Ok(created) => created,
            Err(e) => {
                let err = SessionError::from_service("create_session", e);
                warn!(error = %err, "session creation failed");
                self.fail(err.clone());
                return Err(err);
            }
        };

        let total_questions = created
            .total_questions
            .filter(|n| *n > 0)
            .unwrap_or(self.config.total_questions);
        let session = Session {
            id: created.id,
            status: SessionStatus::Initializing,
            question_index: 0,
            total_questions,
            per_question_budget_secs: self.config.per_question_budget_secs,
            started_at: Utc::now(),
        };
        info!(session_id = %session.id, total_questions, "session created");
        let session_id = session.id.clone();
        self.session = Some(session);

        self.connect_channel(&session_id).await;
        if !self.deps.display.request_immersive().await {
            debug!("immersive mode not granted");
        }
        self.monitor.start();

        self.transition(SessionStatus::AwaitingQuestion);
        self.advance().await
    }

    async fn connect_channel(&mut self, session_id: &SessionId) {
        let Some(channel) = self.deps.channel.clone() else {
            return;
        };

        let frames = self.events_tx.clone();
        self.channel_sub = Some(channel.subscribe("*", move |frame| {
            let _ = frames.send(SessionEvent::ChannelFrame(frame.clone()));
        }));

        let states = self.events_tx.clone();
        let mut watch = channel.watch_state();
        self.channel_watch = Some(tokio::spawn(async move {
            while watch.changed().await.is_ok() {
                let conn = watch.borrow_and_update().clone();
                if states.send(SessionEvent::ChannelState(conn)).is_err() {
                    return;
                }
            }
        }));

        if let Err(e) = channel.connect(session_id).await {
            warn!(session_id = %session_id, error = %e, "realtime channel unavailable, retrying in background");
        }
        self.channel_state = Some(channel.state());
    }

    /// Fetch the question for the current index and start answering it.
    async fn advance(&mut self) -> Result<(), SessionError> {
        let (session_id, index) = match &self.session {
            Some(s) => (s.id.clone(), s.question_index),
            None => {
                return Err(SessionError::InvalidTransition {
                    action: "advance",
                    status: self.status,
                })
            }
        };
        if let Some(channel) = &self.deps.channel {
            channel.request_next_question();
        }

        let questions = Arc::clone(&self.deps.questions);
        let previous = self.answers.clone();
        let fetched = self
            .retrying("next_question", || {
                let questions = Arc::clone(&questions);
                let session_id = session_id.clone();
                let previous = previous.clone();
                async move { questions.next_question(&session_id, &previous).await }
            })
            .await
            .ok_or(SessionError::Aborted)?;

        let question = match fetched {
            Ok(question) => question,
            Err(e) => {
                let setup = self.setup.clone().unwrap_or_default();
                let question = fallback_question(&setup, index);
                warn!(
                    session_id = %session_id,
                    question_index = index,
                    error = %e,
                    fallback_id = %question.id,
                    "question service unavailable, serving built-in question"
                );
                self.warnings.push(SessionError::from_service("next_question", e));
                question
            }
        };
        self.enter_answering(question);
        Ok(())
    }

    fn enter_answering(&mut self, question: Question) {
        let text = question.text.clone();
        info!(
            session_id = %self.session_label(),
            question_id = %question.id,
            topic = %question.topic,
            "question delivered"
        );
        self.question = Some(question);
        self.answer_buffer.clear();
        self.capture.clear_transcript();
        self.timer_generation = Some(self.scheduler.start(self.config.per_question_budget_secs));
        self.transition(SessionStatus::Answering);

        if self.config.speak_questions {
            if let Some(speech) = self.deps.speech.clone() {
                tokio::spawn(async move {
                    if let Err(e) = speech.speak(&text).await {
                        warn!(error = %e, "question read-aloud failed");
                    }
                });
            }
        }
    }

    /// Leave `Answering` with the buffered text and move on.
    async fn submit_current(&mut self, time_spent_seconds: u32) -> Result<(), SessionError> {
        let Some(question) = self.question.clone() else {
            return Err(SessionError::InvalidTransition {
                action: "submit",
                status: self.status,
            });
        };
        let session_id = self
            .session
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or(SessionError::InvalidTransition {
                action: "submit",
                status: self.status,
            })?;

        self.transition(SessionStatus::Submitting);
        self.leave_answering().await;

        let text = match self.answer_buffer.trim() {
            "" => NO_ANSWER_SENTINEL.to_string(),
            t => t.to_string(),
        };
        if let Some(channel) = &self.deps.channel {
            channel.send_answer(&question.id, &text);
        }

        let questions = Arc::clone(&self.deps.questions);
        let evaluated = self
            .retrying("submit_answer", || {
                let questions = Arc::clone(&questions);
                let session_id = session_id.clone();
                let question_id = question.id.clone();
                let text = text.clone();
                async move {
                    questions
                        .submit_answer(&session_id, &question_id, &text, time_spent_seconds)
                        .await
                }
            })
            .await
            .ok_or(SessionError::Aborted)?;
        let evaluation = match evaluated {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!(session_id = %session_id, question_id = %question.id, error = %e, "evaluation unavailable");
                self.warnings.push(SessionError::from_service("submit_answer", e));
                Evaluation::unavailable()
            }
        };

        self.answers.push(Answer {
            question_id: question.id.clone(),
            text,
            time_spent_seconds,
            evaluation,
        });
        self.answer_buffer.clear();
        let (index, total, last) = match self.session.as_mut() {
            Some(s) => {
                let last = s.is_last_question();
                s.question_index += 1;
                (s.question_index, s.total_questions, last)
            }
            None => (0, 0, true),
        };
        info!(
            session_id = %session_id,
            question_id = %question.id,
            answered = index,
            total,
            time_spent_seconds,
            "answer recorded"
        );

        if last {
            self.transition(SessionStatus::Finalizing);
            self.finalize(session_id).await
        } else {
            self.transition(SessionStatus::AwaitingQuestion);
            self.advance().await
        }
    }

    /// Side effects of every exit from `Answering`.
    async fn leave_answering(&mut self) {
        self.scheduler.stop();
        self.timer_generation = None;
        if let Some(speech) = &self.deps.speech {
            speech.cancel();
        }
        if let Err(e) = self.capture.stop_recording().await {
            warn!(error = %e, "failed to stop recording");
        }
    }

    async fn finalize(&mut self, session_id: SessionId) -> Result<(), SessionError> {
        let questions = Arc::clone(&self.deps.questions);
        let ended = self
            .retrying("end_session", || {
                let questions = Arc::clone(&questions);
                let session_id = session_id.clone();
                async move { questions.end_session(&session_id).await }
            })
            .await
            .ok_or(SessionError::Aborted)?;
        if let Err(e) = ended {
            warn!(session_id = %session_id, error = %e, "end_session failed");
        }

        let reports = Arc::clone(&self.deps.reports);
        let generated = self
            .retrying("generate_report", || {
                let reports = Arc::clone(&reports);
                let session_id = session_id.clone();
                async move { reports.generate_report(&session_id).await }
            })
            .await
            .ok_or(SessionError::Aborted)?;

        let report = match generated {
            Ok(report) => report,
            Err(e) => {
                let Some(session) = self.session.as_ref() else {
                    return Err(SessionError::ReportGenerationFailed(e));
                };
                warn!(session_id = %session_id, error = %e, "report generation failed, using fallback report");
                let report = Report::fallback(session, &self.answers, &self.violations.report());
                self.warnings.push(SessionError::ReportGenerationFailed(e));
                report
            }
        };
        self.report = Some(report);
        self.transition(SessionStatus::Completed);
        Ok(())
    }

    /// Run a service call under the retry policy. `None` if aborted.
    async fn retrying<T, F, Fut>(&self, operation: &'static str, call: F) -> Option<Result<T, ServiceError>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => None,
            result = self.config.retry.retry(operation, call) => Some(result),
        }
    }

    fn record_violation(&mut self, violation: Violation) {
        if self.status.is_terminal() {
            return;
        }
        if let Some(channel) = &self.deps.channel {
            channel.send_proctoring(&violation);
        }
        debug!(
            session_id = %self.session_label(),
            kind = violation.kind.as_str(),
            total = self.violations.len() + 1,
            "violation recorded"
        );
        self.violations.push(violation);
        self.publish();
    }

    fn handle_frame(&mut self, frame: Value) {
        let Ok(envelope) = serde_json::from_value::<Envelope>(frame) else {
            return;
        };
        match envelope.kind.as_str() {
            wire::EVALUATION => {
                if let Some(question_id) = envelope.question_id() {
                    debug!(%question_id, "realtime evaluation received");
                    self.feedback.insert(question_id, envelope.payload);
                }
            }
            wire::ERROR => warn!(payload = %envelope.payload, "backend reported an error"),
            kind => debug!(kind, "realtime frame"),
        }
    }

    fn transition(&mut self, to: SessionStatus) {
        let from = self.status;
        if from == to {
            return;
        }
        self.status = to;
        if let Some(session) = self.session.as_mut() {
            session.status = to;
        }
        info!(
            session_id = %self.session_label(),
            from = from.as_str(),
            to = to.as_str(),
            "session transition"
        );
        self.publish();
    }

    fn fail(&mut self, error: SessionError) {
        warn!(session_id = %self.session_label(), error = %error, "session failed");
        self.error = Some(error);
        self.transition(SessionStatus::Failed);
    }

    fn publish(&self) {
        let transcript = self.capture.transcript();
        let snapshot = SessionSnapshot {
            status: self.status,
            session_id: self.session.as_ref().map(|s| s.id.clone()),
            question_index: self.session.as_ref().map_or(0, |s| s.question_index),
            total_questions: self
                .session
                .as_ref()
                .map_or(self.config.total_questions, |s| s.total_questions),
            current_question: self.question.clone(),
            answers: self.answers.clone(),
            violations: self.violations.len(),
            integrity: self.violations.report(),
            remaining_secs: self.scheduler.remaining_secs(),
            paused: self.scheduler.is_paused(),
            recording: self.capture.is_recording(),
            answer_buffer: self.answer_buffer.clone(),
            interim: transcript.interim().to_string(),
            channel: self.channel_state.clone(),
        };
        self.snapshot.send_replace(snapshot);
    }

    fn session_label(&self) -> String {
        self.session
            .as_ref()
            .map_or_else(|| "-".to_string(), |s| s.id.to_string())
    }

    /// Scheduler, then recording, then the channel; hardware last.
    async fn teardown(&mut self) {
        self.scheduler.stop();
        self.timer_generation = None;
        if let Some(speech) = &self.deps.speech {
            speech.cancel();
        }
        if let Err(e) = self.capture.stop_recording().await {
            warn!(error = %e, "failed to stop recording during teardown");
        }
        if let Some(sub) = self.channel_sub.take() {
            sub.unsubscribe();
        }
        if let Some(task) = self.channel_watch.take() {
            task.abort();
        }
        if let Some(channel) = &self.deps.channel {
            channel.close();
            self.channel_state = Some(channel.state());
        }
        self.monitor.stop();
        self.capture.release();
        self.publish();
        info!(
            session_id = %self.session_label(),
            status = self.status.as_str(),
            answers = self.answers.len(),
            violations = self.violations.len(),
            "session ended"
        );
    }

    fn outcome(self) -> SessionOutcome {
        SessionOutcome {
            status: self.status,
            integrity: self.violations.report(),
            violations: self.violations.as_slice().to_vec(),
            session: self.session,
            answers: self.answers,
            report: self.report,
            feedback: self.feedback,
            error: self.error,
            warnings: self.warnings,
        }
    }
}
