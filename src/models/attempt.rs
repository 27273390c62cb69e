// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::grading::{LetterGrade, PassStatus};

/// Marker for a question the student has not answered.
pub const UNANSWERED: i32 = -1;

/// One student's attempt at one quiz (the 'quiz_attempts' table).
///
/// Student fields are a snapshot taken when the attempt starts so reporting
/// survives later roster edits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: i64,
    pub quiz_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub student_gr_number: String,
    pub student_roll_number: String,
    pub class_name: String,
    /// Indices into the quiz's question list, fixed at first start.
    pub question_order: Vec<i32>,
    /// Selected option per ordered position, `UNANSWERED` when blank.
    pub answers: Vec<i32>,
    /// Only meaningful once `submitted_at` is set.
    pub score: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub late: bool,
    /// Bumped on every write; autosave callers may echo it back.
    pub version: i64,
}

impl Attempt {
    pub fn is_finalized(&self) -> bool {
        self.submitted_at.is_some()
    }

    pub fn total_questions(&self) -> usize {
        self.question_order.len()
    }
}

/// Fields of a freshly started attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub quiz_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub student_gr_number: String,
    pub student_roll_number: String,
    pub class_name: String,
    pub question_order: Vec<i32>,
    pub started_at: DateTime<Utc>,
}

impl NewAttempt {
    pub fn blank_answers(&self) -> Vec<i32> {
        vec![UNANSWERED; self.question_order.len()]
    }
}

/// Result of an autosave write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { version: i64 },
    Missing,
    Finalized,
    VersionMismatch { current: i64 },
}

/// A finalized attempt joined with whatever is left of its quiz.
#[derive(Debug, Clone)]
pub struct ResultRecord {
    pub attempt: Attempt,
    pub quiz_title: Option<String>,
    pub quiz_subject: Option<String>,
    pub results_announced: Option<bool>,
    pub pass_percentage: Option<i32>,
}

/// Store-level filter for result listings.
#[derive(Debug, Clone, Default)]
pub struct ResultFilter {
    pub student_id: Option<i64>,
    pub quiz_id: Option<i64>,
    pub class_name: Option<String>,
    pub submitted_since: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl ResultFilter {
    pub fn matches(&self, attempt: &Attempt) -> bool {
        attempt.is_finalized()
            && self.student_id.is_none_or(|id| attempt.student_id == id)
            && self.quiz_id.is_none_or(|id| attempt.quiz_id == id)
            && self
                .class_name
                .as_deref()
                .is_none_or(|c| attempt.class_name == c)
            && self
                .submitted_since
                .is_none_or(|since| attempt.submitted_at.is_some_and(|at| at >= since))
    }
}

/// DTO for starting or resuming an attempt.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    pub quiz_id: i64,
    pub student_id: i64,
    /// Client-proposed order; the server derives one when absent.
    pub question_order: Option<Vec<i32>>,
    pub exam_key: Option<String>,
}

/// DTO for autosaving answers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub result_id: i64,
    pub answers: Vec<i32>,
    pub version: Option<i64>,
}

/// DTO for the final submission.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub quiz_id: i64,
    pub student_id: i64,
    pub answers: Vec<i32>,
    pub question_order: Vec<i32>,
    pub result_id: Option<i64>,
    /// Only consulted when the submission itself starts the attempt.
    pub exam_key: Option<String>,
}

/// Query parameters for listing results.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultListParams {
    pub student_id: Option<i64>,
    pub quiz_id: Option<i64>,
    pub class_name: Option<String>,
    pub last_days: Option<i64>,
    pub limit: Option<i64>,
}

/// Query parameters for the administrators' bulk delete.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResultsParams {
    pub quiz_id: i64,
    pub class_name: Option<String>,
}

/// One row of a result listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultListItem {
    pub result_id: i64,
    pub quiz_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub student_gr_number: String,
    pub student_roll_number: String,
    pub class_name: String,
    pub quiz_title: Option<String>,
    pub subject: Option<String>,
    pub results_announced: bool,
    pub total_questions: usize,
    pub submitted_at: Option<DateTime<Utc>>,
    pub late: bool,
    /// Hidden (null) for students until results are announced.
    pub score: Option<i32>,
    pub percentage: Option<i32>,
    pub grade: Option<LetterGrade>,
    pub pass_status: Option<PassStatus>,
}

/// Detailed view of one attempt, including its class rank.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub result_id: i64,
    pub quiz_id: i64,
    pub student_id: i64,
    pub student_name: String,
    pub class_name: String,
    pub quiz_title: Option<String>,
    pub subject: Option<String>,
    pub results_announced: bool,
    pub finalized: bool,
    pub total_questions: usize,
    pub submitted_at: Option<DateTime<Utc>>,
    pub late: bool,
    pub score: Option<i32>,
    pub percentage: Option<i32>,
    pub grade: Option<LetterGrade>,
    pub pass_status: Option<PassStatus>,
    pub rank: Option<usize>,
    pub class_size: Option<usize>,
}
