// src/handlers/auth.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::user::{LoginRequest, NewUser, ROLE_ADMIN},
    store::{DynStore, QuizStore},
    utils::{
        hash::{hash_password, verify_password},
        jwt::sign_jwt,
    },
};

/// Authenticates an administrator or a student and returns a JWT token.
///
/// Students log in with their GR number as username.
/// The token carries the role and, for students, the linked student id.
pub async fn login(
    State(store): State<DynStore>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = store
        .find_user_by_username(&payload.username)
        .await?
        .ok_or(AppError::AuthError("Invalid username or password".to_string()))?;

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Invalid username or password".to_string()));
    }

    let token = sign_jwt(&user, &config.jwt_secret, config.jwt_expiration)?;
    tracing::info!(user_id = user.id, role = %user.role, "login");

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "role": user.role,
        "studentId": user.student_id
    })))
}

/// Creates the configured administrator account if it does not exist yet.
pub async fn seed_admin_user(store: &dyn QuizStore, config: &Config) -> Result<(), AppError> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    if store.find_user_by_username(username).await?.is_some() {
        return Ok(());
    }

    tracing::info!("Seeding admin user: {}", username);
    store
        .create_user(NewUser {
            username: username.clone(),
            password: hash_password(password)?,
            role: ROLE_ADMIN.to_string(),
            student_id: None,
        })
        .await?;
    tracing::info!("Admin user created successfully.");
    Ok(())
}
