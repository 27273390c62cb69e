// src/handlers/session.rs

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use crate::{
    error::AppError,
    models::{
        attempt::{Attempt, InitRequest, NewAttempt, SaveOutcome, SaveRequest},
        quiz::{Quiz, public_questions},
        student::Student,
    },
    services::{
        grading::validate_answers,
        ordering::{balanced_order, validate_order},
    },
    store::DynStore,
    utils::jwt::AuthUser,
};

/// Seconds left on the exam clock, never negative.
fn remaining_seconds(quiz: &Quiz, attempt: &Attempt, now: DateTime<Utc>) -> i64 {
    let deadline = attempt.started_at + Duration::minutes(quiz.duration_minutes as i64);
    (deadline - now).num_seconds().max(0)
}

/// Students may only reach quizzes served to them.
pub(crate) fn ensure_assigned(user: &AuthUser, quiz: &Quiz, student: &Student) -> Result<(), AppError> {
    if user.is_admin() || quiz.is_visible_to(student) {
        Ok(())
    } else {
        Err(AppError::Forbidden("This quiz is not assigned to you".to_string()))
    }
}

/// Gate for creating a new attempt, whichever endpoint creates it.
pub(crate) fn ensure_can_start(
    user: &AuthUser,
    quiz: &Quiz,
    student: &Student,
    exam_key: Option<&str>,
) -> Result<(), AppError> {
    ensure_assigned(user, quiz, student)?;
    if !quiz.accepts_key(exam_key) {
        return Err(AppError::Forbidden("Invalid exam key".to_string()));
    }
    Ok(())
}

/// Shapes the init response for an existing or fresh attempt.
fn session_payload(quiz: &Quiz, attempt: &Attempt, resumed: bool) -> Value {
    if attempt.is_finalized() {
        return json!({
            "ok": false,
            "alreadyCompleted": true,
            "resultId": attempt.id
        });
    }

    json!({
        "ok": true,
        "resultId": attempt.id,
        "resumed": resumed,
        "questionOrder": attempt.question_order,
        "answers": attempt.answers,
        "version": attempt.version,
        "durationMinutes": quiz.duration_minutes,
        "remainingSeconds": remaining_seconds(quiz, attempt, Utc::now()),
        "questions": public_questions(quiz, &attempt.question_order)
    })
}

/// Starts a new attempt or resumes the existing one.
///
/// * One attempt per (quiz, student); the store's conditional create is the
///   enforcement point.
/// * A finalized attempt answers `alreadyCompleted` instead of restarting.
/// * A resumed attempt returns its persisted order and answers verbatim.
/// * The exam key is only checked when a new attempt would be created.
pub async fn init_attempt(
    State(store): State<DynStore>,
    user: AuthUser,
    Json(req): Json<InitRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_student(req.student_id)?;

    let quiz = store
        .get_quiz(req.quiz_id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let student = store
        .get_student(req.student_id)
        .await?
        .ok_or(AppError::NotFound("Student not found".to_string()))?;

    ensure_assigned(&user, &quiz, &student)?;

    if let Some(existing) = store.find_attempt(quiz.id, student.id).await? {
        tracing::debug!(result_id = existing.id, "resuming quiz attempt");
        return Ok(Json(session_payload(&quiz, &existing, true)));
    }

    ensure_can_start(&user, &quiz, &student, req.exam_key.as_deref())?;

    let served = quiz.served_count();
    if served == 0 {
        return Err(AppError::BadRequest("Quiz has no questions".to_string()));
    }

    let question_order = match req.question_order {
        Some(order) => {
            validate_order(&order, quiz.questions.len(), served).map_err(AppError::BadRequest)?;
            order
        }
        None => balanced_order(&quiz.questions, served, &mut rand::thread_rng()),
    };

    let (attempt, created) = store
        .create_attempt_if_absent(NewAttempt {
            quiz_id: quiz.id,
            student_id: student.id,
            student_name: student.name,
            student_gr_number: student.gr_number,
            student_roll_number: student.roll_number,
            class_name: student.class_name,
            question_order,
            started_at: Utc::now(),
        })
        .await?;

    if created {
        tracing::info!(
            result_id = attempt.id,
            quiz_id = quiz.id,
            student_id = attempt.student_id,
            user_id = user.user_id,
            "quiz attempt started"
        );
    }

    Ok(Json(session_payload(&quiz, &attempt, !created)))
}

/// Autosaves the answers of an in-progress attempt.
///
/// Overwrites the stored answers wholesale. Clients treat failures here as
/// non-fatal and keep going.
pub async fn save_answers(
    State(store): State<DynStore>,
    user: AuthUser,
    Json(req): Json<SaveRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = store
        .get_attempt(req.result_id)
        .await?
        .ok_or(AppError::NotFound("Quiz session not found".to_string()))?;

    user.ensure_student(attempt.student_id)?;
    validate_answers(&req.answers, attempt.total_questions()).map_err(AppError::BadRequest)?;

    match store
        .save_answers(attempt.id, &req.answers, req.version)
        .await?
    {
        SaveOutcome::Saved { version } => Ok(Json(json!({ "ok": true, "version": version }))),
        SaveOutcome::Missing => Err(AppError::NotFound("Quiz session not found".to_string())),
        SaveOutcome::Finalized => Err(AppError::Conflict("Quiz already submitted".to_string())),
        SaveOutcome::VersionMismatch { current } => {
            tracing::warn!(
                result_id = attempt.id,
                user_id = user.user_id,
                expected = ?req.version,
                current,
                "stale autosave rejected"
            );
            Err(AppError::Conflict(format!(
                "Stale autosave, current version is {}",
                current
            )))
        }
    }
}
