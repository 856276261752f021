use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskError {
    #[error("Validation failed on {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Concurrent write conflict, retry: {detail}")]
    ConcurrencyConflict { detail: String },

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DeskError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DeskError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DeskError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeskError::ConcurrencyConflict { .. })
    }
}

// Busy and locked are retryable; everything else stays a Database error.
impl From<rusqlite::Error> for DeskError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                DeskError::ConcurrencyConflict {
                    detail: err.to_string(),
                }
            }
            _ => DeskError::Database(err),
        }
    }
}

pub type DeskResult<T> = Result<T, DeskError>;
