use crate::models::MigrationStatus;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credentials error: {0}")]
    Credentials(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown kie server: {0}")]
    UnknownServer(String),

    /// Nothing answered at the configured host. Logged apart from other
    /// connectivity failures, handled the same way.
    #[error("No endpoint found at {0}")]
    EndpointNotFound(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Remote server error: {0}")]
    Remote(String),

    #[error("Process definition {container_id}:{process_id} not found on {server_id}")]
    ProcessDefinitionNotFound {
        server_id: String,
        container_id: String,
        process_id: String,
    },

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Migration not found: {0}")]
    MigrationNotFound(String),

    #[error("Migration report not found: {0}")]
    ReportNotFound(String),

    #[error("Cannot {operation} migration {id} in status {status}")]
    InvalidMigrationState {
        id: String,
        status: MigrationStatus,
        operation: &'static str,
    },

    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Http(_) | AppError::Remote(_) => StatusCode::BAD_GATEWAY,
            AppError::EndpointNotFound(_) | AppError::Connectivity(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Credentials(_) | AppError::Configuration(_) | AppError::InvalidData(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::UnknownServer(_)
            | AppError::ProcessDefinitionNotFound { .. }
            | AppError::PlanNotFound(_)
            | AppError::MigrationNotFound(_)
            | AppError::ReportNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidMigrationState { .. } => StatusCode::CONFLICT,
            AppError::InvalidMigration(_) => StatusCode::BAD_REQUEST,
        };

        let body = json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
