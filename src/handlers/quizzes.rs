// src/handlers/quizzes.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::quiz::{
        AnnounceRequest, NewQuiz, PublicQuiz, QuizFilter, QuizListParams, QuizTarget,
        UpsertQuizRequest,
    },
    store::DynStore,
    utils::{html::clean_quiz, jwt::AuthUser},
};

/// Lists quiz definitions for an audience.
///
/// * Admins get full definitions and may filter freely (`id`, `studentId`, `className`).
/// * Students get the public view of quizzes served to them; audience
///   filters come from their own roster entry.
/// * With `id` a single quiz is returned (404 when missing or not served).
pub async fn list_quizzes(
    State(store): State<DynStore>,
    user: AuthUser,
    Query(params): Query<QuizListParams>,
) -> Result<Response, AppError> {
    if user.is_admin() {
        let filter = QuizFilter {
            id: params.id,
            student_id: params.student_id,
            class_name: params.class_name,
        };
        let mut quizzes = store.list_quizzes(&filter).await?;
        if params.id.is_some() {
            let quiz = quizzes
                .pop()
                .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
            return Ok(Json(quiz).into_response());
        }
        return Ok(Json(quizzes).into_response());
    }

    let own_id = user
        .student_id
        .ok_or(AppError::Forbidden("No student linked to this login".to_string()))?;
    if let Some(requested) = params.student_id {
        user.ensure_student(requested)?;
    }
    let student = store
        .get_student(own_id)
        .await?
        .ok_or(AppError::AuthError("Invalid session".to_string()))?;

    let filter = QuizFilter {
        id: params.id,
        student_id: Some(student.id),
        class_name: Some(student.class_name),
    };
    let quizzes: Vec<PublicQuiz> = store
        .list_quizzes(&filter)
        .await?
        .iter()
        .map(PublicQuiz::from)
        .collect();

    if params.id.is_some() {
        let quiz = quizzes
            .into_iter()
            .next()
            .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
        return Ok(Json(quiz).into_response());
    }
    Ok(Json(quizzes).into_response())
}

/// Validates, sanitises and fills defaults for an authored quiz.
async fn prepare_quiz(
    store: &DynStore,
    config: &Config,
    payload: UpsertQuizRequest,
) -> Result<NewQuiz, AppError> {
    payload.validate()?;

    if payload.target == QuizTarget::Student {
        let student_id = payload.student_id.unwrap_or_default();
        if store.get_student(student_id).await?.is_none() {
            return Err(AppError::NotFound("Target student not found".to_string()));
        }
    }

    let payload = clean_quiz(payload);
    let question_count = payload.questions.len() as i32;
    let (class_name, student_id) = match payload.target {
        QuizTarget::All => (None, None),
        QuizTarget::Class => (payload.class_name.map(|c| c.trim().to_string()), None),
        QuizTarget::Student => (None, payload.student_id),
    };

    Ok(NewQuiz {
        title: payload.title,
        subject: payload.subject,
        exam_key: payload.exam_key.filter(|k| !k.is_empty()),
        duration_minutes: payload.duration_minutes,
        question_limit: payload.question_limit.unwrap_or(question_count),
        target: payload.target,
        class_name,
        student_id,
        results_announced: payload.results_announced,
        pass_percentage: payload
            .pass_percentage
            .unwrap_or(config.default_pass_percentage),
        questions: payload.questions,
    })
}

/// Creates a new quiz.
/// Admin only.
pub async fn create_quiz(
    State(store): State<DynStore>,
    State(config): State<Config>,
    Json(payload): Json<UpsertQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_quiz = prepare_quiz(&store, &config, payload).await?;
    let quiz = store.create_quiz(new_quiz).await?;
    tracing::info!(quiz_id = quiz.id, target = %quiz.target, "quiz created");
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Replaces a quiz definition. Attempts already started keep their order.
/// Admin only.
pub async fn update_quiz(
    State(store): State<DynStore>,
    State(config): State<Config>,
    Path(id): Path<i64>,
    Json(payload): Json<UpsertQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let new_quiz = prepare_quiz(&store, &config, payload).await?;
    let quiz = store
        .update_quiz(id, new_quiz)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;
    Ok(Json(quiz))
}

/// Opens or closes the results-announced gate.
/// Admin only.
pub async fn announce_results(
    State(store): State<DynStore>,
    Path(id): Path<i64>,
    Json(payload): Json<AnnounceRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !store
        .set_results_announced(id, payload.results_announced)
        .await?
    {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }
    tracing::info!(quiz_id = id, announced = payload.results_announced, "results gate changed");
    Ok(Json(json!({
        "ok": true,
        "resultsAnnounced": payload.results_announced
    })))
}

/// Deletes a quiz. Its attempts are left in place.
/// Admin only.
pub async fn delete_quiz(
    State(store): State<DynStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_quiz(id).await? {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
