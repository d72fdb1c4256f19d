use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input for {instrument}: {reason}")]
    InvalidInput { instrument: String, reason: String },

    #[error("Not available: {0}")]
    NotAvailable(String),

    #[error("Scan aborted for {symbol} at bar {index}: {reason}")]
    ScanAborted {
        symbol: String,
        index: usize,
        reason: String,
    },

    #[error("Scan cancelled for {0}")]
    Cancelled(String),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn invalid(instrument: &str, reason: impl Into<String>) -> Self {
        AppError::InvalidInput {
            instrument: instrument.to_string(),
            reason: reason.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotAvailable(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
