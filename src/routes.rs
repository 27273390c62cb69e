// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, quizzes, results, session, students},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, quizzes, quiz sessions, results, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store + config).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new().route("/login", post(auth::login));

    // Everything a logged-in student or admin can reach.
    let quiz_routes = Router::new()
        .route("/quizzes", get(quizzes::list_quizzes))
        .route("/quiz/init", post(session::init_attempt))
        .route("/quiz/save", post(session::save_answers))
        .route(
            "/quiz-results",
            get(results::list_results).post(results::submit_results),
        )
        .route("/quiz-results/{id}", get(results::get_result))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/quizzes", post(quizzes::create_quiz))
        .route(
            "/quizzes/{id}",
            put(quizzes::update_quiz).delete(quizzes::delete_quiz),
        )
        .route("/quizzes/{id}/announce", put(quizzes::announce_results))
        .route(
            "/students",
            get(students::list_students).post(students::create_student),
        )
        .route("/students/{id}", delete(students::delete_student))
        .route("/quiz-results", delete(results::delete_results))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api", quiz_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
