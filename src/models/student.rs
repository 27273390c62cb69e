// src/models/student.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'students' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub name: String,
    /// School-wide general register number. Doubles as the login username.
    pub gr_number: String,
    pub roll_number: String,
    pub class_name: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for an administrator enrolling a student.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub gr_number: String,
    #[validate(length(min = 1, max = 20))]
    pub roll_number: String,
    #[validate(length(min = 1, max = 50))]
    pub class_name: String,
    #[validate(length(
        min = 4,
        max = 128,
        message = "Password length must be between 4 and 128 characters."
    ))]
    pub password: String,
}

/// Student fields handed to the store.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub gr_number: String,
    pub roll_number: String,
    pub class_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentListParams {
    pub class_name: Option<String>,
}
