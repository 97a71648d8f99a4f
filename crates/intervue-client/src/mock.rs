//! Scripted service doubles for deterministic sessions without a backend.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use intervue_core::model::{
    Answer, CreatedSession, Difficulty, Evaluation, Question, Report, SessionSetup, SessionSummary,
};
use intervue_core::service::{QuestionService, ReportService};
use intervue_core::{QuestionId, ServiceError, SessionId};

/// Which [`QuestionService`] call a scripted failure applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOp {
    CreateSession,
    NextQuestion,
    SubmitAnswer,
    EndSession,
}

/// One answer as received by the mock.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedSubmission {
    pub session_id: SessionId,
    pub question_id: QuestionId,
    pub text: String,
    pub time_spent_seconds: u32,
}

#[derive(Default)]
struct Script {
    failures: HashMap<MockOp, VecDeque<ServiceError>>,
    calls: HashMap<MockOp, usize>,
    setups: Vec<SessionSetup>,
    submissions: Vec<RecordedSubmission>,
}

impl Script {
    /// Count the call and pop the next scripted failure, if any.
    fn enter(&mut self, op: MockOp) -> Result<(), ServiceError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Question service that answers from a script.
///
/// Questions are numbered by how many answers precede them, so the `n`th
/// call for a session with `n - 1` answers yields `q{n}`. Scripted failures
/// are consumed in order before the call succeeds.
pub struct MockQuestionService {
    questions: Vec<Question>,
    session_id: Option<SessionId>,
    total_questions: Option<u32>,
    latency: Option<Duration>,
    script: Mutex<Script>,
}

impl Default for MockQuestionService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockQuestionService {
    pub fn new() -> Self {
        Self {
            questions: Vec::new(),
            session_id: None,
            total_questions: None,
            latency: None,
            script: Mutex::new(Script::default()),
        }
    }

    /// Serve these questions in order instead of generated ones.
    pub fn with_questions(mut self, questions: Vec<Question>) -> Self {
        self.questions = questions;
        self
    }

    pub fn with_session_id(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    /// Report a question count on creation, overriding the local setting.
    pub fn with_total_questions(mut self, total: u32) -> Self {
        self.total_questions = Some(total);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `times` calls of `op` with `error`.
    pub fn fail(self, op: MockOp, times: usize, error: ServiceError) -> Self {
        {
            let mut script = self.script.lock();
            let queue = script.failures.entry(op).or_default();
            queue.extend(std::iter::repeat(error).take(times));
        }
        self
    }

    pub fn calls(&self, op: MockOp) -> usize {
        self.script.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn setups(&self) -> Vec<SessionSetup> {
        self.script.lock().setups.clone()
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.script.lock().submissions.clone()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn question_for(&self, number: usize, setup: Option<&SessionSetup>) -> Question {
        if !self.questions.is_empty() {
            return self.questions[(number - 1) % self.questions.len()].clone();
        }
        let topic = setup
            .and_then(|s| s.tech_stack.get((number - 1) % s.tech_stack.len().max(1)))
            .cloned()
            .unwrap_or_else(|| "General".to_string());
        let difficulty = match number {
            1 | 2 => Difficulty::Easy,
            3 | 4 => Difficulty::Medium,
            _ => Difficulty::Hard,
        };
        Question {
            id: QuestionId::from_raw(format!("q{number}")),
            text: format!("Question {number}: describe a problem you solved with {topic}."),
            topic,
            difficulty,
        }
    }
}

#[async_trait]
impl QuestionService for MockQuestionService {
    async fn create_session(&self, setup: &SessionSetup) -> Result<CreatedSession, ServiceError> {
        self.simulate_latency().await;
        let mut script = self.script.lock();
        script.enter(MockOp::CreateSession)?;
        script.setups.push(setup.clone());
        Ok(CreatedSession {
            id: self.session_id.clone().unwrap_or_default(),
            total_questions: self.total_questions,
        })
    }

    async fn next_question(
        &self,
        _session_id: &SessionId,
        previous_answers: &[Answer],
    ) -> Result<Question, ServiceError> {
        self.simulate_latency().await;
        let mut script = self.script.lock();
        script.enter(MockOp::NextQuestion)?;
        Ok(self.question_for(previous_answers.len() + 1, script.setups.last()))
    }

    async fn submit_answer(
        &self,
        session_id: &SessionId,
        question_id: &QuestionId,
        text: &str,
        time_spent_seconds: u32,
    ) -> Result<Evaluation, ServiceError> {
        self.simulate_latency().await;
        let mut script = self.script.lock();
        script.enter(MockOp::SubmitAnswer)?;
        script.submissions.push(RecordedSubmission {
            session_id: session_id.clone(),
            question_id: question_id.clone(),
            text: text.to_string(),
            time_spent_seconds,
        });
        let words = text.split_whitespace().count();
        Ok(Evaluation(json!({
            "score": (words.min(50) / 5).max(1),
            "feedback": format!("Received {words} words."),
        })))
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<SessionSummary, ServiceError> {
        self.simulate_latency().await;
        let mut script = self.script.lock();
        script.enter(MockOp::EndSession)?;
        Ok(SessionSummary(json!({
            "sessionId": session_id,
            "answered": script.submissions.iter().filter(|s| &s.session_id == session_id).count(),
        })))
    }
}

/// Report service that fails a scripted number of times, then succeeds.
pub struct MockReportService {
    failures: Mutex<VecDeque<ServiceError>>,
    calls: Mutex<usize>,
}

impl Default for MockReportService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockReportService {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        }
    }

    pub fn fail(self, times: usize, error: ServiceError) -> Self {
        self.failures
            .lock()
            .extend(std::iter::repeat(error).take(times));
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ReportService for MockReportService {
    async fn generate_report(&self, session_id: &SessionId) -> Result<Report, ServiceError> {
        *self.calls.lock() += 1;
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        Ok(Report::from_service(json!({
            "id": format!("report_{session_id}"),
            "sessionId": session_id,
            "overallScore": 75,
            "status": "completed",
        })))
    }
}
