pub mod cli;
pub mod clock;
pub mod db;
pub mod domain;
pub mod logger;
pub mod metrics;
pub mod ports;
pub mod rate_limit;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod settings;
pub mod signature;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use diesel::PgConnection;
use diesel_migrations::embed_migrations;
use diesel_migrations::EmbeddedMigrations;
use diesel_migrations::MigrationHarness;
use serde_json::json;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_migration(conn: &mut PgConnection) {
    conn.run_pending_migrations(MIGRATIONS)
        .expect("migrations to succeed");
}

/// Our app's top level error type, extended with the error kinds from §7.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    InvalidTransition(String),
    StatusMismatch(String),
    SignatureInvalid(String),
    /// Caught at the HTTP boundary; webhook callers still get a 200 to avoid provider retry
    /// storms for non-idempotent misconfigurations.
    Internal(String),
    /// Database unavailable, migrations stale, etc. — must propagate, not ack.
    Fatal(String),
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(format!("{e:#}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidTransition(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::StatusMismatch(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::SignatureInvalid(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Internal(msg) => (StatusCode::OK, msg),
            AppError::Fatal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({ "error": error_message }));

        (status, body).into_response()
    }
}
