//! Storage error taxonomy shared by the store, the backends and the service.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Boxed underlying cause carried by a [`StorageError`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors reported by the persistence layer
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage quota exceeded: {message}")]
    QuotaExceeded {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Stored memos are corrupted: {message}")]
    ParseError {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Memo not found: {message}")]
    NotFound {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("Storage failure: {message}")]
    Unknown {
        message: String,
        #[source]
        cause: Option<BoxError>,
    },
}

/// Tag of a [`StorageError`], cheap to copy and compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StorageErrorKind {
    QuotaExceeded,
    ParseError,
    NotFound,
    Unknown,
}

impl StorageError {
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        StorageError::QuotaExceeded {
            message: message.into(),
            cause: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        StorageError::ParseError {
            message: message.into(),
            cause: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        StorageError::NotFound {
            message: message.into(),
            cause: None,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        StorageError::Unknown {
            message: message.into(),
            cause: None,
        }
    }

    /// Attach an underlying cause, replacing any previous one
    pub fn with_cause(mut self, err: impl Into<BoxError>) -> Self {
        let slot = match &mut self {
            StorageError::QuotaExceeded { cause, .. }
            | StorageError::ParseError { cause, .. }
            | StorageError::NotFound { cause, .. }
            | StorageError::Unknown { cause, .. } => cause,
        };
        *slot = Some(err.into());
        self
    }

    pub fn kind(&self) -> StorageErrorKind {
        match self {
            StorageError::QuotaExceeded { .. } => StorageErrorKind::QuotaExceeded,
            StorageError::ParseError { .. } => StorageErrorKind::ParseError,
            StorageError::NotFound { .. } => StorageErrorKind::NotFound,
            StorageError::Unknown { .. } => StorageErrorKind::Unknown,
        }
    }

    /// Message without the kind prefix
    pub fn message(&self) -> &str {
        match self {
            StorageError::QuotaExceeded { message, .. }
            | StorageError::ParseError { message, .. }
            | StorageError::NotFound { message, .. }
            | StorageError::Unknown { message, .. } => message,
        }
    }
}
