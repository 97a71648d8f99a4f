//! Question and Report service clients.
//!
//! [`HttpQuestionService`] / [`HttpReportService`] talk to the REST backend;
//! the [`mock`] module provides scripted stand-ins for tests and offline runs.

mod http;
pub mod mock;

pub use http::{HttpConfig, HttpQuestionService, HttpReportService};
pub use mock::{MockOp, MockQuestionService, MockReportService, RecordedSubmission};
