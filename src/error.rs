//! Error handling and custom error types
//!
//! Provides unified error handling across the service using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI provider error: {0}")]
    AiProvider(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Missing credential: {0} not set")]
    MissingCredential(&'static str),

    /// Image job reached a terminal state without a usable URL, or ran out of poll budget.
    #[error("Image render error: {message}")]
    ImageRender {
        message: String,
        raw_output: serde_json::Value,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    pub fn image_render(message: impl Into<String>, raw_output: serde_json::Value) -> Self {
        Error::ImageRender {
            message: message.into(),
            raw_output,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
