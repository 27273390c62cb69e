// src/handlers/students.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::student::{CreateStudentRequest, NewStudent, StudentListParams},
    store::DynStore,
    utils::hash::hash_password,
};

/// Enrolls a student and creates its login (username = GR number).
/// Admin only.
pub async fn create_student(
    State(store): State<DynStore>,
    Json(payload): Json<CreateStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let hashed_password = hash_password(&payload.password)?;
    let student = store
        .create_student(
            NewStudent {
                name: payload.name.trim().to_string(),
                gr_number: payload.gr_number.trim().to_string(),
                roll_number: payload.roll_number.trim().to_string(),
                class_name: payload.class_name.trim().to_string(),
            },
            hashed_password,
        )
        .await?;

    tracing::info!(student_id = student.id, class = %student.class_name, "student enrolled");
    Ok((StatusCode::CREATED, Json(student)))
}

/// Lists students, optionally restricted to one class.
/// Admin only.
pub async fn list_students(
    State(store): State<DynStore>,
    Query(params): Query<StudentListParams>,
) -> Result<impl IntoResponse, AppError> {
    let students = store.list_students(params.class_name.as_deref()).await?;
    Ok(Json(students))
}

/// Deletes a student and its login. Existing attempts keep their snapshot.
/// Admin only.
pub async fn delete_student(
    State(store): State<DynStore>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !store.delete_student(id).await? {
        return Err(AppError::NotFound("Student not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
