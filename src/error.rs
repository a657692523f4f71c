//! WolfKV Error Types

use thiserror::Error;

use crate::replication::protocol::ErrorCode;

/// Result type alias for WolfKV operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfKV error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Store errors
    #[error("failed to find data for key {0}")]
    NotFound(String),

    #[error("Causal merge failed: {0}")]
    CausalMerge(String),

    // Wire errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(&'static str),

    #[error("Remote error ({code:?}): {message}")]
    Remote { code: ErrorCode, message: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("TLS error: {0}")]
    Tls(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionTimeout(_)
                | Error::ConnectionFailed { .. }
                | Error::Network(_)
                | Error::Io(_)
        )
    }

    /// Wire error code reported to the remote side of a call
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::CausalMerge(_) => ErrorCode::CausalMerge,
            Error::UnexpectedMessage(_) | Error::FrameTooLarge(_) | Error::Serialization(_) => {
                ErrorCode::BadRequest
            }
            Error::Remote { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }
}
