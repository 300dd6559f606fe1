use crate::lifecycle::state::IllegalTransition;
use thiserror::Error;
use uuid::Uuid;

/// SQLSTATE codes a distributed backend returns when a transaction lost a conflict and must be
/// re-run from the start.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// A pagination marker that does not resolve to a row in scope
    #[error("Invalid marker")]
    InvalidMarker,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// The row exists but its current lifecycle state forbids the operation
    #[error("{entity_type} {entity_id} cannot be modified: {reason}")]
    Conflict {
        entity_type: String,
        entity_id: String,
        reason: String,
    },

    /// Referenced rows do not exist or are not visible to the caller
    #[error("{entity_type}(s) not found: {ids:?}")]
    MissingReferences { entity_type: String, ids: Vec<Uuid> },

    /// Serialization failure or deadlock; the whole transaction may be retried
    #[error("Transaction aborted by the database and may be retried: {message}")]
    Retryable { message: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Retryable { .. })
    }

    /// Conflict raised when the state machine refuses a transition of the row `id`.
    pub fn illegal_transition(id: Uuid, err: IllegalTransition) -> Self {
        DbError::Conflict {
            entity_type: err.kind.display_name().to_string(),
            entity_id: id.to_string(),
            reason: format!("provisioning status is {}", err.from),
        }
    }

    pub fn conflict(entity_type: &str, id: Uuid, reason: impl Into<String>) -> Self {
        DbError::Conflict {
            entity_type: entity_type.to_string(),
            entity_id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.code().is_some_and(|c| RETRYABLE_SQLSTATES.contains(&c.as_ref())) {
                    DbError::Retryable {
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_unique_violation() {
                    DbError::UniqueViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        constraint: db_err.constraint().map(|s| s.to_string()),
                        table: db_err.table().map(|s| s.to_string()),
                        message: db_err.message().to_string(),
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;
