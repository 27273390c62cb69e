// src/store/mod.rs

//! Persistence seam for quizzes, attempts and the roster.
//!
//! Handlers only talk to [`QuizStore`]. `PgStore` backs production,
//! `MemoryStore` serves local runs without a database and the test suite.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, NewAttempt, ResultFilter, ResultRecord, SaveOutcome},
        quiz::{NewQuiz, Quiz, QuizFilter},
        student::{NewStudent, Student},
        user::{NewUser, User},
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type DynStore = Arc<dyn QuizStore>;

#[async_trait]
pub trait QuizStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    // Users

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;

    // Students

    /// Creates the student together with its login (username = GR number).
    /// Fails with `Conflict` when the GR number is taken.
    async fn create_student(
        &self,
        student: NewStudent,
        password_hash: String,
    ) -> Result<Student, AppError>;

    async fn get_student(&self, id: i64) -> Result<Option<Student>, AppError>;

    async fn list_students(&self, class_name: Option<&str>) -> Result<Vec<Student>, AppError>;

    /// Removes the student and its login. Attempts keep their snapshot.
    async fn delete_student(&self, id: i64) -> Result<bool, AppError>;

    // Quizzes

    async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError>;

    async fn update_quiz(&self, id: i64, quiz: NewQuiz) -> Result<Option<Quiz>, AppError>;

    async fn set_results_announced(&self, id: i64, announced: bool) -> Result<bool, AppError>;

    /// Does not cascade to attempts.
    async fn delete_quiz(&self, id: i64) -> Result<bool, AppError>;

    async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>, AppError>;

    /// Newest first.
    async fn list_quizzes(&self, filter: &QuizFilter) -> Result<Vec<Quiz>, AppError>;

    // Attempts

    /// Conditional create keyed by (quiz, student). Returns the attempt that
    /// now exists and whether this call created it.
    async fn create_attempt_if_absent(
        &self,
        attempt: NewAttempt,
    ) -> Result<(Attempt, bool), AppError>;

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError>;

    async fn find_attempt(&self, quiz_id: i64, student_id: i64)
    -> Result<Option<Attempt>, AppError>;

    /// Overwrites the answers of an in-progress attempt. When
    /// `expected_version` is given the write only happens if it matches.
    async fn save_answers(
        &self,
        id: i64,
        answers: &[i32],
        expected_version: Option<i64>,
    ) -> Result<SaveOutcome, AppError>;

    /// Moves an in-progress attempt to finalized. Returns `None` if the
    /// attempt is missing or already finalized; nothing is written then.
    async fn finalize_attempt(
        &self,
        id: i64,
        answers: &[i32],
        score: i32,
        submitted_at: DateTime<Utc>,
        late: bool,
    ) -> Result<Option<Attempt>, AppError>;

    /// Finalized attempts joined with their quiz, newest submission first.
    async fn list_results(&self, filter: &ResultFilter) -> Result<Vec<ResultRecord>, AppError>;

    /// Finalized attempts of one quiz and class, in ranking order.
    async fn class_results(&self, quiz_id: i64, class_name: &str)
    -> Result<Vec<Attempt>, AppError>;

    async fn delete_results(&self, quiz_id: i64, class_name: Option<&str>)
    -> Result<u64, AppError>;
}
