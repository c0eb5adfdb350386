use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Account not found: {id}")]
    AccountNotFound { id: i64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn account_not_found(id: i64) -> Self {
        Self::AccountNotFound { id }
    }
}

/// Errors raised inside the post-dispatch pipeline.
///
/// Every variant ends up as a recorded failure. The client/server split is kept
/// for upstream classification only; recovery policy does not depend on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PostError {
    #[error("{message}")]
    Client { message: String, suppress_log: bool },

    #[error("{message}")]
    Server { message: String, suppress_log: bool },

    #[error("image missing")]
    MissingImage,
}

pub type PostResult<T> = Result<T, PostError>;

/// Message value that upstream callers use to mark an error as not worth logging.
/// It is translated into the `suppress_log` flag at construction time.
pub const NOLOG_SENTINEL: &str = "nolog";

impl PostError {
    pub fn client(message: impl Into<String>) -> Self {
        let message = message.into();
        let suppress_log = message == NOLOG_SENTINEL;
        Self::Client {
            message,
            suppress_log,
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        let message = message.into();
        let suppress_log = message == NOLOG_SENTINEL;
        Self::Server {
            message,
            suppress_log,
        }
    }

    /// Client error that is recorded as a failure but never written to the diagnostic log.
    pub fn silent_client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
            suppress_log: true,
        }
    }

    /// Server error that is recorded as a failure but never written to the diagnostic log.
    pub fn silent_server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
            suppress_log: true,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, PostError::Client { .. })
    }

    pub fn suppresses_log(&self) -> bool {
        match self {
            PostError::Client { suppress_log, .. } | PostError::Server { suppress_log, .. } => {
                *suppress_log
            }
            PostError::MissingImage => false,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<reqwest::Error> for PostError {
    fn from(error: reqwest::Error) -> Self {
        PostError::server(format!("Network error: {}", error))
    }
}

impl From<image::ImageError> for PostError {
    fn from(error: image::ImageError) -> Self {
        PostError::client(format!("Invalid image: {}", error))
    }
}

impl From<serde_json::Error> for PostError {
    fn from(error: serde_json::Error) -> Self {
        PostError::server(format!("Malformed service response: {}", error))
    }
}
