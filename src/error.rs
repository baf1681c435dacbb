//! Error types for the Pinpoint analytics event recorder.
//!
//! Internally every fallible step returns [`AnalyticsError`]. The public
//! recording and submission entry points never surface these errors to the
//! caller; they are logged and reflected in store state instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for the analytics event pipeline.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The local record store rejected a read or write.
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing what went wrong
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    SerDes {
        /// Error message describing the serialization failure
        message: String,
    },

    /// The events service rejected the whole call with a classified error.
    #[error("Service error ({status_code}): {message}")]
    Service {
        /// Error message describing what went wrong
        message: String,
        /// HTTP status code returned by the service
        status_code: u16,
        /// AWS error details carrying the error code used for classification
        aws_error: AwsError,
    },

    /// Transport or otherwise unclassified failure talking to the service.
    #[error("Transport error: {message}")]
    Transport {
        /// Error message describing what went wrong
        message: String,
    },

    /// Validation error for invalid configuration or arguments.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation failure
        message: String,
    },
}

impl AnalyticsError {
    /// Creates a new Storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new SerDes error.
    pub fn serdes(message: impl Into<String>) -> Self {
        Self::SerDes {
            message: message.into(),
        }
    }

    /// Creates a new Service error from an AWS error code.
    pub fn service(
        status_code: u16,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self::Service {
            message: message.clone(),
            status_code,
            aws_error: AwsError {
                code: code.into(),
                message,
                request_id: None,
            },
        }
    }

    /// Creates a new Transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a new Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns the AWS error code if this is a classified service error.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Service { aws_error, .. } => Some(aws_error.code.as_str()),
            _ => None,
        }
    }

    /// Returns true if this is a classified service error.
    pub fn is_service_error(&self) -> bool {
        matches!(self, Self::Service { .. })
    }

    /// Returns true if this is a storage error.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

/// AWS error details for rejected service calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsError {
    /// The AWS error code
    pub code: String,
    /// The AWS error message
    pub message: String,
    /// The request ID if available
    pub request_id: Option<String>,
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerDes {
            message: error.to_string(),
        }
    }
}

impl From<rusqlite::Error> for AnalyticsError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Storage {
            message: error.to_string(),
        }
    }
}
