// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Pass threshold used when a quiz does not carry its own.
pub const DEFAULT_PASS_PERCENTAGE: i32 = 40;

/// Default page size for result listings.
pub const DEFAULT_RESULT_LIMIT: i64 = 50;

/// Hard cap on result listing page size.
pub const MAX_RESULT_LIMIT: i64 = 200;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When unset the service keeps its data in memory.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub default_pass_percentage: i32,
    /// Slack granted after a quiz's duration before a submission is flagged late.
    pub submission_grace_seconds: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        let default_pass_percentage = env::var("DEFAULT_PASS_PERCENTAGE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|p| (0..=100).contains(p))
            .unwrap_or(DEFAULT_PASS_PERCENTAGE);

        let submission_grace_seconds = env::var("SUBMISSION_GRACE_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            port,
            cors_origins,
            default_pass_percentage,
            submission_grace_seconds,
        }
    }
}

/// Splits a comma separated origin list, dropping blanks.
pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins_trims_and_skips_blanks() {
        let origins = parse_origins(" http://a.test , ,http://b.test,");
        assert_eq!(origins, vec!["http://a.test", "http://b.test"]);
    }

    #[test]
    fn test_parse_origins_empty() {
        assert!(parse_origins("").is_empty());
    }
}
