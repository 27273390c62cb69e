// src/handlers/results.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};

use crate::{
    config::{Config, DEFAULT_RESULT_LIMIT, MAX_RESULT_LIMIT},
    error::AppError,
    handlers::session::ensure_can_start,
    models::attempt::{
        Attempt, DeleteResultsParams, NewAttempt, ResultFilter, ResultListItem, ResultListParams,
        ResultView, SubmitRequest,
    },
    services::{
        grading::{competition_rank, score_answers, summarize, validate_answers},
        ordering::validate_order,
    },
    store::DynStore,
    utils::jwt::AuthUser,
};

/// Scores are visible to administrators always, to students once announced.
fn can_see_scores(user: &AuthUser, announced: bool) -> bool {
    user.is_admin() || announced
}

fn submission_payload(
    attempt: &Attempt,
    already_submitted: bool,
    visible: bool,
    pass_threshold: i32,
) -> Value {
    let mut body = json!({
        "ok": true,
        "resultId": attempt.id,
        "totalQuestions": attempt.total_questions(),
        "submittedAt": attempt.submitted_at,
        "alreadySubmitted": already_submitted,
        "late": attempt.late,
        "scoreVisible": visible,
        "score": Value::Null
    });

    if visible {
        let summary = summarize(attempt, pass_threshold);
        body["score"] = json!(summary.score);
        body["percentage"] = json!(summary.percentage);
        body["grade"] = json!(summary.grade);
        body["passStatus"] = json!(summary.status);
    }
    body
}

/// Submits an attempt for grading.
///
/// * The score is recomputed here from the answers and the persisted order.
/// * Re-submitting a finalized attempt is a no-op that reports the stored
///   result with `alreadySubmitted: true`.
/// * Without a prior init the attempt is created here, behind the same
///   audience and exam key gate as init.
/// * Submissions after the quiz duration plus grace are graded but flagged late.
/// * Any store failure surfaces as an error so the client can retry.
pub async fn submit_results(
    State(store): State<DynStore>,
    State(config): State<Config>,
    user: AuthUser,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    user.ensure_student(req.student_id)?;

    if req.answers.len() != req.question_order.len() {
        return Err(AppError::BadRequest(
            "answers and questionOrder must have the same length".to_string(),
        ));
    }

    let quiz = store
        .get_quiz(req.quiz_id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
    let visible = can_see_scores(&user, quiz.results_announced);

    let attempt = match req.result_id {
        Some(result_id) => {
            let attempt = store
                .get_attempt(result_id)
                .await?
                .ok_or(AppError::NotFound("Quiz session not found".to_string()))?;
            if attempt.quiz_id != req.quiz_id || attempt.student_id != req.student_id {
                return Err(AppError::BadRequest(
                    "resultId does not belong to this quiz and student".to_string(),
                ));
            }
            attempt
        }
        None => match store.find_attempt(req.quiz_id, req.student_id).await? {
            Some(attempt) => attempt,
            None => {
                // Never initialised: start it now with the submitted order.
                let student = store
                    .get_student(req.student_id)
                    .await?
                    .ok_or(AppError::NotFound("Student not found".to_string()))?;
                ensure_can_start(&user, &quiz, &student, req.exam_key.as_deref())?;
                validate_order(&req.question_order, quiz.questions.len(), quiz.served_count())
                    .map_err(AppError::BadRequest)?;
                let (attempt, _) = store
                    .create_attempt_if_absent(NewAttempt {
                        quiz_id: quiz.id,
                        student_id: student.id,
                        student_name: student.name,
                        student_gr_number: student.gr_number,
                        student_roll_number: student.roll_number,
                        class_name: student.class_name,
                        question_order: req.question_order.clone(),
                        started_at: Utc::now(),
                    })
                    .await?;
                attempt
            }
        },
    };

    if attempt.is_finalized() {
        tracing::info!(result_id = attempt.id, "duplicate submission ignored");
        return Ok(Json(submission_payload(
            &attempt,
            true,
            visible,
            quiz.pass_percentage,
        )));
    }

    if attempt.question_order != req.question_order {
        return Err(AppError::BadRequest(
            "questionOrder does not match the started session".to_string(),
        ));
    }
    validate_answers(&req.answers, attempt.total_questions()).map_err(AppError::BadRequest)?;

    let score = score_answers(&quiz.questions, &attempt.question_order, &req.answers);
    let now = Utc::now();
    let deadline = attempt.started_at
        + Duration::minutes(quiz.duration_minutes as i64)
        + Duration::seconds(config.submission_grace_seconds);
    let late = now > deadline;
    if late {
        tracing::warn!(
            result_id = attempt.id,
            overdue_secs = (now - deadline).num_seconds(),
            "late quiz submission"
        );
    }

    match store
        .finalize_attempt(attempt.id, &req.answers, score, now, late)
        .await?
    {
        Some(done) => {
            tracing::info!(
                result_id = done.id,
                user_id = user.user_id,
                score,
                "quiz attempt finalized"
            );
            Ok(Json(submission_payload(
                &done,
                false,
                visible,
                quiz.pass_percentage,
            )))
        }
        None => {
            // Finalized concurrently; report what is stored.
            let current = store
                .get_attempt(attempt.id)
                .await?
                .ok_or(AppError::NotFound("Quiz session not found".to_string()))?;
            Ok(Json(submission_payload(
                &current,
                true,
                visible,
                quiz.pass_percentage,
            )))
        }
    }
}

/// Lists finalized attempts with their quiz metadata.
///
/// Students only ever see their own attempts; score fields stay null until
/// the quiz's results are announced.
pub async fn list_results(
    State(store): State<DynStore>,
    State(config): State<Config>,
    user: AuthUser,
    Query(params): Query<ResultListParams>,
) -> Result<impl IntoResponse, AppError> {
    let submitted_since = match params.last_days {
        Some(days) if days < 0 => {
            return Err(AppError::BadRequest("lastDays must not be negative".to_string()));
        }
        // Spans reaching past the representable range mean no lower bound.
        Some(days) => Duration::try_days(days).and_then(|span| Utc::now().checked_sub_signed(span)),
        None => None,
    };

    let mut filter = ResultFilter {
        student_id: params.student_id,
        quiz_id: params.quiz_id,
        class_name: params.class_name,
        submitted_since,
        limit: params
            .limit
            .unwrap_or(DEFAULT_RESULT_LIMIT)
            .clamp(1, MAX_RESULT_LIMIT),
    };

    if !user.is_admin() {
        let own_id = user
            .student_id
            .ok_or(AppError::Forbidden("No student linked to this login".to_string()))?;
        if let Some(requested) = params.student_id {
            user.ensure_student(requested)?;
        }
        filter.student_id = Some(own_id);
    }

    let rows = store.list_results(&filter).await?;
    let items: Vec<ResultListItem> = rows
        .into_iter()
        .map(|row| {
            let announced = row.results_announced.unwrap_or(false);
            let threshold = row
                .pass_percentage
                .unwrap_or(config.default_pass_percentage);
            let summary = can_see_scores(&user, announced)
                .then(|| summarize(&row.attempt, threshold));
            let a = row.attempt;
            ResultListItem {
                result_id: a.id,
                quiz_id: a.quiz_id,
                student_id: a.student_id,
                total_questions: a.total_questions(),
                student_name: a.student_name,
                student_gr_number: a.student_gr_number,
                student_roll_number: a.student_roll_number,
                class_name: a.class_name,
                quiz_title: row.quiz_title,
                subject: row.quiz_subject,
                results_announced: announced,
                submitted_at: a.submitted_at,
                late: a.late,
                score: summary.as_ref().map(|s| s.score),
                percentage: summary.as_ref().map(|s| s.percentage),
                grade: summary.as_ref().map(|s| s.grade),
                pass_status: summary.as_ref().map(|s| s.status),
            }
        })
        .collect();

    Ok(Json(items))
}

/// Detailed result of one attempt with percentage, grade, pass/fail and
/// class rank. Rank uses competition ranking among finalized attempts of
/// the same quiz and class.
pub async fn get_result(
    State(store): State<DynStore>,
    State(config): State<Config>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = store
        .get_attempt(id)
        .await?
        .ok_or(AppError::NotFound("Result not found".to_string()))?;
    user.ensure_student(attempt.student_id)?;

    // The quiz may have been deleted since.
    let quiz = store.get_quiz(attempt.quiz_id).await?;
    let announced = quiz.as_ref().is_some_and(|q| q.results_announced);
    let threshold = quiz
        .as_ref()
        .map(|q| q.pass_percentage)
        .unwrap_or(config.default_pass_percentage);

    let mut view = ResultView {
        result_id: attempt.id,
        quiz_id: attempt.quiz_id,
        student_id: attempt.student_id,
        student_name: attempt.student_name.clone(),
        class_name: attempt.class_name.clone(),
        quiz_title: quiz.as_ref().map(|q| q.title.clone()),
        subject: quiz.as_ref().map(|q| q.subject.clone()),
        results_announced: announced,
        finalized: attempt.is_finalized(),
        total_questions: attempt.total_questions(),
        submitted_at: attempt.submitted_at,
        late: attempt.late,
        score: None,
        percentage: None,
        grade: None,
        pass_status: None,
        rank: None,
        class_size: None,
    };

    if attempt.is_finalized() && can_see_scores(&user, announced) {
        let siblings = store
            .class_results(attempt.quiz_id, &attempt.class_name)
            .await?;
        let summary = summarize(&attempt, threshold);
        view.score = Some(summary.score);
        view.percentage = Some(summary.percentage);
        view.grade = Some(summary.grade);
        view.pass_status = Some(summary.status);
        view.rank = Some(competition_rank(&attempt, &siblings));
        view.class_size = Some(siblings.len());
    }

    Ok(Json(view))
}

/// Bulk-deletes attempts of a quiz, optionally for one class only.
/// Admin only.
pub async fn delete_results(
    State(store): State<DynStore>,
    user: AuthUser,
    Query(params): Query<DeleteResultsParams>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = store
        .delete_results(params.quiz_id, params.class_name.as_deref())
        .await?;
    tracing::info!(
        quiz_id = params.quiz_id,
        class = ?params.class_name,
        deleted,
        user_id = user.user_id,
        "quiz results deleted"
    );
    Ok(Json(json!({ "ok": true, "deleted": deleted })))
}
