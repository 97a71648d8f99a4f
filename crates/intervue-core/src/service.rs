use async_trait::async_trait;

use crate::errors::ServiceError;
use crate::ids::{QuestionId, SessionId};
use crate::model::{Answer, CreatedSession, Evaluation, Question, Report, SessionSetup, SessionSummary};

/// Remote question generation and evaluation backend.
#[async_trait]
pub trait QuestionService: Send + Sync {
    async fn create_session(&self, setup: &SessionSetup) -> Result<CreatedSession, ServiceError>;

    async fn next_question(
        &self,
        session_id: &SessionId,
        previous_answers: &[Answer],
    ) -> Result<Question, ServiceError>;

    async fn submit_answer(
        &self,
        session_id: &SessionId,
        question_id: &QuestionId,
        text: &str,
        time_spent_seconds: u32,
    ) -> Result<Evaluation, ServiceError>;

    async fn end_session(&self, session_id: &SessionId) -> Result<SessionSummary, ServiceError>;
}

/// Remote report generation.
#[async_trait]
pub trait ReportService: Send + Sync {
    async fn generate_report(&self, session_id: &SessionId) -> Result<Report, ServiceError>;
}
