use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use intervue_client::mock::{MockOp, MockQuestionService, MockReportService};
use intervue_core::media::TranscriptSegment;
use intervue_core::model::{SessionSetup, SessionStatus, ViolationKind, NO_ANSWER_SENTINEL};
use intervue_core::proctor::{PlatformSignal, Presence};
use intervue_core::{QuestionId, ServiceError};
use intervue_session::fakes::{RecordingSpeech, ScriptedMedia, ScriptedPresence, StaticDisplay};
use intervue_session::{
    SessionConfig, SessionController, SessionDeps, SessionError, SessionHandle, SessionOutcome,
    SessionSnapshot,
};

struct Harness {
    questions: Arc<MockQuestionService>,
    reports: Arc<MockReportService>,
    media: Arc<ScriptedMedia>,
    presence: Arc<ScriptedPresence>,
    speech: Arc<RecordingSpeech>,
    display: Arc<StaticDisplay>,
    config: SessionConfig,
}

impl Harness {
    fn new() -> Self {
        Self {
            questions: Arc::new(MockQuestionService::new()),
            reports: Arc::new(MockReportService::new()),
            media: Arc::new(ScriptedMedia::new()),
            presence: Arc::new(ScriptedPresence::default()),
            speech: Arc::new(RecordingSpeech::new()),
            display: Arc::new(StaticDisplay::new()),
            config: SessionConfig::default(),
        }
    }

    fn questions(mut self, questions: MockQuestionService) -> Self {
        self.questions = Arc::new(questions);
        self
    }

    fn reports(mut self, reports: MockReportService) -> Self {
        self.reports = Arc::new(reports);
        self
    }

    fn media(mut self, media: ScriptedMedia) -> Self {
        self.media = Arc::new(media);
        self
    }

    fn total_questions(mut self, n: u32) -> Self {
        self.config.total_questions = n;
        self
    }

    fn spawn(&self) -> (SessionHandle, JoinHandle<SessionOutcome>) {
        let deps = SessionDeps {
            questions: self.questions.clone(),
            reports: self.reports.clone(),
            media: self.media.clone(),
            speech: Some(self.speech.clone()),
            presence: self.presence.clone(),
            display: self.display.clone(),
            channel: None,
        };
        let (controller, handle) = SessionController::new(self.config.clone(), deps);
        (handle, tokio::spawn(controller.run()))
    }
}

fn setup() -> SessionSetup {
    SessionSetup {
        role: Some("Backend Engineer".into()),
        tech_stack: vec!["Rust".into(), "Postgres".into()],
        ..Default::default()
    }
}

async fn wait_until(handle: &SessionHandle, pred: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
    let mut rx = handle.watch();
    let snapshot = rx.wait_for(|s| pred(s)).await.expect("controller gone");
    snapshot.clone()
}

fn current_id(handle: &SessionHandle) -> QuestionId {
    handle
        .snapshot()
        .current_question
        .expect("no active question")
        .id
}

fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

// ── full interview ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn five_submit_cycles_complete_with_five_answers() {
    let h = Harness::new();
    let (handle, run) = h.spawn();

    handle.start(setup()).await.unwrap();
    assert_eq!(handle.snapshot().status, SessionStatus::Answering);

    for n in 1..=5u32 {
        let id = current_id(&handle);
        assert_eq!(id.as_str(), format!("q{n}"));
        handle.update_answer(format!("answer number {n}")).await.unwrap();
        handle.submit(id).await.unwrap();

        let snap = handle.snapshot();
        assert_eq!(snap.answers.len() as u32, snap.question_index);
        assert!(snap.answers.len() <= 5);
    }

    let outcome = run.await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.answers.len(), 5);
    assert_eq!(outcome.answers[2].text, "answer number 3");
    assert!(outcome.answers.iter().all(|a| a.evaluation.is_available()));
    assert!(outcome.error.is_none());

    let report = outcome.report.expect("report");
    assert!(!report.fallback);
    assert_eq!(h.questions.calls(MockOp::SubmitAnswer), 5);
    assert_eq!(h.questions.calls(MockOp::EndSession), 1);
    assert_eq!(h.reports.calls(), 1);

    assert_eq!(h.media.release_count(), 1);
    assert!(!h.media.is_active());
    assert_eq!(h.speech.spoken().len(), 5);
    assert_eq!(h.display.reentry_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn setup_defaults_reach_the_question_service() {
    let h = Harness::new().total_questions(1);
    let (handle, run) = h.spawn();

    handle.start(setup()).await.unwrap();
    handle.submit(current_id(&handle)).await.unwrap();
    run.await.unwrap();

    let sent = h.questions.setups();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].interview_type.as_deref(), Some("technical"));
    assert_eq!(sent[0].persona.as_deref(), Some("balanced"));
    assert_eq!(sent[0].role.as_deref(), Some("Backend Engineer"));
}

#[tokio::test(start_paused = true)]
async fn server_question_count_overrides_config() {
    let h = Harness::new().questions(MockQuestionService::new().with_total_questions(2));
    let (handle, run) = h.spawn();

    handle.start(setup()).await.unwrap();
    assert_eq!(handle.snapshot().total_questions, 2);
    handle.submit(current_id(&handle)).await.unwrap();
    handle.submit(current_id(&handle)).await.unwrap();

    let outcome = run.await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.answers.len(), 2);
}

// ── countdown ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn silent_question_times_out_with_sentinel() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();
    let start = Instant::now();

    handle.start(setup()).await.unwrap();
    assert_eq!(handle.snapshot().remaining_secs, 180);

    let snap = wait_until(&handle, |s| s.question_index == 1 && s.status == SessionStatus::Answering).await;
    assert_elapsed(start, Duration::from_secs(180));

    assert_eq!(snap.answers.len(), 1);
    assert_eq!(snap.answers[0].text, NO_ANSWER_SENTINEL);
    assert_eq!(snap.answers[0].time_spent_seconds, 180);
    assert_eq!(snap.current_question.unwrap().id.as_str(), "q2");

    let submitted = h.questions.submissions();
    assert_eq!(submitted[0].text, NO_ANSWER_SENTINEL);
    assert_eq!(submitted[0].time_spent_seconds, 180);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn timeout_submits_buffered_text() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();

    handle.start(setup()).await.unwrap();
    handle.update_answer("half an answer").await.unwrap();

    let snap = wait_until(&handle, |s| s.question_index == 1).await;
    assert_eq!(snap.answers[0].text, "half an answer");
    assert!(snap.answer_buffer.is_empty());
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn explicit_submit_records_elapsed_time() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();

    handle.start(setup()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(42_300)).await;
    handle.update_answer("borrow checker").await.unwrap();
    handle.submit(current_id(&handle)).await.unwrap();

    let snap = handle.snapshot();
    assert_eq!(snap.answers[0].time_spent_seconds, 42);
    assert_eq!(snap.remaining_secs, 180, "countdown restarted for q2");
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_countdown() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();
    let start = Instant::now();

    handle.start(setup()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.pause().await.unwrap();
    tokio::time::sleep(Duration::from_secs(500)).await;

    let snap = handle.snapshot();
    assert!(snap.paused);
    assert_eq!(snap.remaining_secs, 170);
    assert_eq!(snap.status, SessionStatus::Answering);
    assert!(snap.answers.is_empty());

    handle.resume().await.unwrap();
    let snap = wait_until(&handle, |s| s.question_index == 1).await;
    assert_elapsed(start, Duration::from_secs(680));
    assert_eq!(snap.answers[0].time_spent_seconds, 180);
    handle.abort();
}

// ── validation and guards ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn submit_for_other_question_is_rejected() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();
    handle.start(setup()).await.unwrap();
    handle.update_answer("kept").await.unwrap();

    let err = handle.submit(QuestionId::from_raw("q7")).await.unwrap_err();
    assert!(matches!(err, SessionError::Validation { ref submitted, .. } if submitted.as_str() == "q7"));

    let snap = handle.snapshot();
    assert!(snap.answers.is_empty());
    assert_eq!(snap.status, SessionStatus::Answering);
    assert_eq!(snap.answer_buffer, "kept");
    assert_eq!(h.questions.calls(MockOp::SubmitAnswer), 0);

    handle.submit(current_id(&handle)).await.unwrap();
    assert_eq!(handle.snapshot().answers[0].text, "kept");
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn missing_role_stays_idle_without_network() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();

    let err = handle
        .start(SessionSetup {
            tech_stack: vec!["Go".into()],
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ConfigInvalid(_)));
    assert_eq!(handle.snapshot().status, SessionStatus::Idle);
    assert_eq!(h.questions.calls(MockOp::CreateSession), 0);
    assert_eq!(h.media.acquire_count(), 0);

    handle.start(setup()).await.unwrap();
    assert_eq!(handle.snapshot().status, SessionStatus::Answering);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn only_idle_accepts_start() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();
    handle.start(setup()).await.unwrap();

    let err = handle.start(setup()).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidTransition { action: "start", status: SessionStatus::Answering }
    ));
    assert_eq!(h.questions.calls(MockOp::CreateSession), 1);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn commands_before_start_are_rejected() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();
    assert!(matches!(
        handle.pause().await,
        Err(SessionError::InvalidTransition { action: "pause", .. })
    ));
    assert!(matches!(
        handle.submit(QuestionId::from_raw("q1")).await,
        Err(SessionError::InvalidTransition { action: "submit", .. })
    ));
    handle.abort();
}

// ── failures ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn capture_denial_fails_session() {
    let h = Harness::new().media(ScriptedMedia::denying());
    let (handle, run) = h.spawn();

    let err = handle.start(setup()).await.unwrap_err();
    assert!(matches!(err, SessionError::CapturePermissionDenied(_)));

    let outcome = run.await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert!(matches!(outcome.error, Some(SessionError::CapturePermissionDenied(_))));
    assert_eq!(outcome.integrity.capture_denied, 1);
    assert_eq!(h.questions.calls(MockOp::CreateSession), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_camera_degrades_but_continues() {
    let h = Harness::new().media(ScriptedMedia::unavailable()).total_questions(1);
    let (handle, run) = h.spawn();

    handle.start(setup()).await.unwrap();
    assert!(matches!(
        handle.start_recording().await,
        Err(SessionError::Capture(_))
    ));
    handle.submit(current_id(&handle)).await.unwrap();

    let outcome = run.await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| matches!(w, SessionError::Capture(_))));
}

#[tokio::test(start_paused = true)]
async fn creation_failure_after_retries_fails_session() {
    let h = Harness::new().questions(MockQuestionService::new().fail(
        MockOp::CreateSession,
        3,
        ServiceError::Network("connection refused".into()),
    ));
    let (handle, run) = h.spawn();
    let start = Instant::now();

    let err = handle.start(setup()).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::TransientNetwork { operation: "create_session", .. }
    ));
    // 1s + 2s of backoff between three calls
    assert_elapsed(start, Duration::from_secs(3));
    assert_eq!(h.questions.calls(MockOp::CreateSession), 3);

    let outcome = run.await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(h.media.release_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn creation_recovers_within_retry_budget() {
    let h = Harness::new().questions(MockQuestionService::new().fail(
        MockOp::CreateSession,
        2,
        ServiceError::Timeout(Duration::from_secs(60)),
    ));
    let (handle, _run) = h.spawn();

    handle.start(setup()).await.unwrap();
    assert_eq!(handle.snapshot().status, SessionStatus::Answering);
    assert_eq!(h.questions.calls(MockOp::CreateSession), 3);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn unauthorized_creation_is_not_retried() {
    let h = Harness::new().questions(MockQuestionService::new().fail(
        MockOp::CreateSession,
        1,
        ServiceError::Unauthorized("token expired".into()),
    ));
    let (handle, run) = h.spawn();

    let err = handle.start(setup()).await.unwrap_err();
    assert!(matches!(err, SessionError::Service(ServiceError::Unauthorized(_))));
    assert_eq!(h.questions.calls(MockOp::CreateSession), 1);
    assert_eq!(run.await.unwrap().status, SessionStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn report_failure_falls_back_and_completes() {
    let h = Harness::new()
        .total_questions(1)
        .reports(MockReportService::new().fail(
            3,
            ServiceError::ServerError {
                status: 503,
                body: "unavailable".into(),
            },
        ));
    let (handle, run) = h.spawn();

    handle.start(setup()).await.unwrap();
    handle.update_answer("tokio").await.unwrap();
    handle.submit(current_id(&handle)).await.unwrap();

    let outcome = run.await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Completed);
    let report = outcome.report.expect("fallback report");
    assert!(report.fallback);
    assert_eq!(report.body["questionsAnswered"], 1);
    assert_eq!(report.body["proctoring"]["status"], "clean");
    assert_eq!(h.reports.calls(), 3);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| matches!(w, SessionError::ReportGenerationFailed(_))));
}

#[tokio::test(start_paused = true)]
async fn question_outage_serves_fallback_question() {
    let h = Harness::new().questions(MockQuestionService::new().fail(
        MockOp::NextQuestion,
        3,
        ServiceError::Network("reset".into()),
    ));
    let (handle, _run) = h.spawn();

    handle.start(setup()).await.unwrap();
    let snap = handle.snapshot();
    assert_eq!(snap.status, SessionStatus::Answering);
    let question = snap.current_question.unwrap();
    assert_eq!(question.id.as_str(), "fallback_1");

    handle.submit(question.id).await.unwrap();
    assert_eq!(current_id(&handle).as_str(), "q2");
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn evaluation_outage_records_unavailable() {
    let h = Harness::new().questions(MockQuestionService::new().fail(
        MockOp::SubmitAnswer,
        3,
        ServiceError::Timeout(Duration::from_secs(60)),
    ));
    let (handle, _run) = h.spawn();

    handle.start(setup()).await.unwrap();
    handle.update_answer("lifetimes").await.unwrap();
    handle.submit(current_id(&handle)).await.unwrap();

    let snap = handle.snapshot();
    assert_eq!(snap.answers.len(), 1);
    assert!(!snap.answers[0].evaluation.is_available());
    assert_eq!(snap.question_index, 1);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn abort_fails_and_releases_hardware() {
    let h = Harness::new();
    let (handle, run) = h.spawn();

    handle.start(setup()).await.unwrap();
    handle.start_recording().await.unwrap();
    handle.abort();

    let outcome = run.await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert!(matches!(outcome.error, Some(SessionError::Aborted)));
    assert_eq!(h.media.release_count(), 1);
    assert!(!h.media.is_active());
    assert!(h.speech.was_cancelled());

    assert!(matches!(
        handle.submit(QuestionId::from_raw("q1")).await,
        Err(SessionError::Aborted)
    ));
}

#[tokio::test(start_paused = true)]
async fn abort_interrupts_pending_service_call() {
    let h = Harness::new().questions(MockQuestionService::new().with_latency(Duration::from_secs(30)));
    let (handle, run) = h.spawn();

    let starter = handle.clone();
    let pending = tokio::spawn(async move { starter.start(setup()).await });
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.abort();

    assert!(matches!(pending.await.unwrap(), Err(SessionError::Aborted)));
    let outcome = run.await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert!(outcome.session.is_none());
}

// ── capture ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn final_transcript_segments_fill_the_answer() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();

    handle.start(setup()).await.unwrap();
    handle.start_recording().await.unwrap();
    handle.start_recording().await.unwrap();
    assert_eq!(h.media.recordings_started(), 1);
    assert!(handle.snapshot().recording);

    assert!(h.media.push_segment(TranscriptSegment::Interim("owner".into())));
    assert!(h.media.push_segment(TranscriptSegment::Final("ownership moves values".into())));
    assert!(h.media.push_segment(TranscriptSegment::Final("borrows do not".into())));
    wait_until(&handle, |s| s.answer_buffer == "ownership moves values borrows do not").await;

    handle.submit(current_id(&handle)).await.unwrap();
    let snap = handle.snapshot();
    assert!(!snap.recording, "leaving Answering stops recording");
    assert_eq!(snap.answers[0].text, "ownership moves values borrows do not");
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn speech_settling_after_submit_stays_with_its_question() {
    let h = Harness::new();
    let (handle, _run) = h.spawn();

    handle.start(setup()).await.unwrap();
    handle.start_recording().await.unwrap();
    let first = current_id(&handle);

    assert!(h.media.push_segment(TranscriptSegment::Final("answer to question one".into())));
    handle.submit(first.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snap = handle.snapshot();
    assert_ne!(current_id(&handle), first);
    assert_eq!(snap.status, SessionStatus::Answering);
    assert_eq!(snap.answers[0].question_id, first);
    assert_eq!(snap.answers[0].text, NO_ANSWER_SENTINEL);
    assert_eq!(snap.answer_buffer, "", "speech for {first} reached the next question");
    handle.abort();
}

// ── integrity ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn violations_accumulate_without_changing_status() {
    let h = Harness::new();
    for p in [Presence::Absent, Presence::Present, Presence::Absent, Presence::Absent] {
        h.presence.push(p);
    }
    let (handle, run) = h.spawn();
    handle.start(setup()).await.unwrap();

    let mut last = 0;
    for second in 0..6 {
        if second == 2 {
            handle.platform_signal(PlatformSignal::FocusLost);
            handle.platform_signal(PlatformSignal::ImmersiveExited);
        }
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let snap = handle.snapshot();
        assert!(snap.violations >= last, "violation count went backwards");
        assert_eq!(snap.status, SessionStatus::Answering);
        last = snap.violations;
    }

    handle.abort();
    let outcome = run.await.unwrap();
    assert_eq!(outcome.integrity.presence_lost, 3);
    assert_eq!(outcome.integrity.focus_lost, 1);
    assert_eq!(outcome.integrity.immersive_mode_exited, 1);
    assert_eq!(outcome.integrity.total, 5);
    assert!(outcome
        .violations
        .iter()
        .any(|v| v.kind == ViolationKind::ImmersiveModeExited));
    // one request on start, one re-entry after the exit
    assert_eq!(h.display.reentry_requests(), 2);
}
