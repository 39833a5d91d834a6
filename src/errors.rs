//! Errors for Stadthavet tracker
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Invalid MMSI: {0}")]
    InvalidMmsi(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("{service} API error {status}: {message}")]
    ApiError {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Database migration error")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),
}
