use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DbError(String),

    #[error("Failed to connect to database: {0}")]
    DbConnectionError(String),

    #[error("HTTP request error: {0}")]
    RequestError(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Geolocation error: {0}")]
    GeolocationError(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),
}

// Utility methods for error conversion
impl AppError {
    pub fn from_reqwest_error(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::JsonError(err.to_string())
        } else {
            AppError::RequestError(err.to_string())
        }
    }

    pub fn from_sqlx_error(err: sqlx::Error) -> Self {
        AppError::DbError(err.to_string())
    }

    pub fn from_serde_error(err: serde_json::Error) -> Self {
        AppError::JsonError(err.to_string())
    }
}

// From trait implementations for common error types
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest_error(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx_error(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_serde_error(err)
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::InvalidAddress(err.to_string())
    }
}
