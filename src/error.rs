use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Coarse error category exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnreadableFile,
    UnsupportedFormat,
    TransportError,
    ProviderError,
    Timeout,
}

impl ErrorKind {
    /// Input-stage errors are fixed by picking another image, call-stage
    /// errors need the whole flow retried.
    pub fn is_input_stage(&self) -> bool {
        matches!(self, ErrorKind::UnreadableFile | ErrorKind::UnsupportedFormat)
    }

    /// The single user-facing message for this kind. Provider text never
    /// reaches the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::UnreadableFile => "The image could not be read. Please try another photo.",
            ErrorKind::UnsupportedFormat => {
                "This file type is not supported. Please use a JPEG, PNG or GIF image."
            }
            ErrorKind::TransportError => {
                "Could not reach the analysis service. Check your connection and try again."
            }
            ErrorKind::ProviderError => {
                "The analysis service could not process this image. Please try again later."
            }
            ErrorKind::Timeout => "The analysis took too long. Please try again.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::UnreadableFile => "unreadable_file",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::ProviderError => "provider_error",
            ErrorKind::Timeout => "timeout",
        };
        write!(f, "{}", s)
    }
}

/// Errors raised while normalizing input or calling the vision model.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Unreadable file: {0}")]
    UnreadableFile(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("No response within {0:?}")]
    Timeout(Duration),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::UnreadableFile(_) => ErrorKind::UnreadableFile,
            AnalysisError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            AnalysisError::Transport(_) => ErrorKind::TransportError,
            AnalysisError::Provider { .. } => ErrorKind::ProviderError,
            AnalysisError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        AnalysisError::UnreadableFile(err.to_string())
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
