//! Application-wide error types.

use std::time::Duration;

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A store, network, email or push call failed. Eligible for retry next cycle.
    #[error("Transient failure during {operation}: {message}")]
    TransientIo {
        operation: &'static str,
        message: String,
    },

    /// An external call exceeded its time budget.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The snapshot of a resource cannot be classified.
    #[error("Invalid state for resource {resource_id}: {reason}")]
    InvalidResourceState { resource_id: String, reason: String },

    /// The ordering collaborator refused the request on business grounds.
    #[error("Action rejected: {0}")]
    ActionRejected(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transient(operation: &'static str, message: impl Into<String>) -> Self {
        Self::TransientIo {
            operation,
            message: message.into(),
        }
    }

    pub fn invalid_state(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResourceState {
            resource_id: resource_id.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::ActionRejected(reason.into())
    }

    /// Whether the failure is worth retrying on a later cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientIo { .. }
            | Self::Timeout { .. }
            | Self::Http(_)
            | Self::DatabaseSqlx(_)
            | Self::Database(_)
            | Self::Io(_) => true,
            Self::Serialization(_)
            | Self::NotFound { .. }
            | Self::Validation(_)
            | Self::Configuration(_)
            | Self::InvalidResourceState { .. }
            | Self::ActionRejected(_)
            | Self::Other(_) => false,
        }
    }
}
