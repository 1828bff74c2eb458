//! Error taxonomy shared by the request manager, provisioner and messaging

use crate::db::DbError;
use thiserror::Error;

/// Typed failure of a core operation.
///
/// Callers branch on the variant; the API layer maps them to 400, 404, 409
/// and 500 respectively.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input, attributed to a request field
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    /// A referenced user, request or conversation does not exist
    #[error("{0}")]
    NotFound(String),

    /// An invariant would be violated; re-read state before retrying
    #[error("{0}")]
    Conflict(String),

    /// Storage failure after bounded retries
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UserNotFound(_)
            | DbError::RequestNotFound(_)
            | DbError::ConversationNotFound(_) => CoreError::NotFound(err.to_string()),
            DbError::DuplicateUser { .. }
            | DbError::PendingRequestExists { .. }
            | DbError::StatusChanged { .. } => CoreError::Conflict(err.to_string()),
            DbError::Sqlite(_) | DbError::Busy { .. } | DbError::Corrupt(_) => {
                tracing::error!(error = %err, "Storage failure");
                CoreError::Internal(err.to_string())
            }
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
