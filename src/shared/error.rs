use thiserror::Error;
use serde::Serialize;

/// Application error taxonomy.
///
/// `Validation`, `Translation` and `Persistence` are the three categories the
/// user sees; the rest are plumbing failures that surface with their message.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Translation Error: {0}")]
    Translation(String),

    #[error("Persistence Error: {0}")]
    Persistence(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("I/O Error: {0}")]
    Io(String),

    #[error("Unknown Error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Stable tag used by the presentation layer to pick a notification style
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Translation(_) => "translation",
            AppError::Persistence(_) => "persistence",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Unknown(_) => "unknown",
        }
    }

    /// Message without the category prefix
    pub fn message(&self) -> &str {
        match self {
            AppError::Validation(m)
            | AppError::Translation(m)
            | AppError::Persistence(m)
            | AppError::Config(m)
            | AppError::Io(m)
            | AppError::Unknown(m) => m,
        }
    }
}

// Implement conversion from standard errors
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Translation(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Persistence(format!("Serialization error: {}", err))
    }
}

impl From<redb::Error> for AppError {
    fn from(err: redb::Error) -> Self {
        AppError::Persistence(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
