use crate::db::errors::DbError;
use crate::db::transaction::Retryable;
use crate::pagination::PaginationError;
use axum::{
    Json,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// No project identity on the request
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Request body exceeds the size the server is willing to buffer
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Pagination marker does not resolve to a row the caller can see
    #[error("Invalid marker")]
    InvalidMarker,

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Conflict with the current state of a resource
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Admission rejected because the project has used up its quota
    #[error("Quota has been met for resource: {resource}")]
    QuotaExceeded { resource: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u16,
    error: &'static str,
    message: String,
}

/// Full error chain attached to 5xx responses so that [`verbose_errors`] can expose it.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub Arc<String>);

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::InvalidMarker => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::InvalidMarker => StatusCode::BAD_REQUEST,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::CONFLICT,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Conflict { .. } => StatusCode::CONFLICT,
                DbError::MissingReferences { .. } => StatusCode::NOT_FOUND,
                DbError::Retryable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code, stable across message wording changes
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthenticated { .. } => "unauthenticated",
            Error::BadRequest { .. } => "validation_failed",
            Error::PayloadTooLarge { .. } => "payload_too_large",
            Error::InvalidMarker | Error::Database(DbError::InvalidMarker) => "invalid_marker",
            Error::NotFound { .. } | Error::Database(DbError::NotFound) => "not_found",
            Error::Database(DbError::MissingReferences { .. }) => "references_not_found",
            Error::Conflict { .. } | Error::Database(DbError::Conflict { .. }) => "conflict",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::Database(DbError::UniqueViolation { table, .. }) => match table.as_deref() {
                Some("member") => "duplicate_member",
                Some("monitor") => "duplicate_monitor",
                Some("domain") => "duplicate_domain",
                _ => "duplicate",
            },
            Error::Database(DbError::ForeignKeyViolation { .. }) => "in_use",
            Error::Database(DbError::CheckViolation { .. }) => "validation_failed",
            Error::Database(DbError::Retryable { .. }) => "retry_later",
            Error::Internal { .. } | Error::Database(DbError::Other(_)) | Error::Other(_) => "internal_error",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::BadRequest { message } => message.clone(),
            Error::PayloadTooLarge { limit } => format!("Request body exceeds {limit} bytes"),
            Error::InvalidMarker => "invalid marker".to_string(),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Conflict { message } => message.clone(),
            Error::QuotaExceeded { resource } => format!("Quota has been met for resource: {resource}"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::InvalidMarker => "invalid marker".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => match (table.as_deref(), constraint.as_deref()) {
                    (Some("member"), _) => "endpoint already exists in pool".to_string(),
                    (Some("monitor"), _) => "pool already has a monitor".to_string(),
                    (Some("domain"), _) => "domain with this fqdn already exists for the provider".to_string(),
                    (Some("geographic_map_assignment"), _) => "country is assigned more than once".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { table, .. } => match table.as_deref() {
                    Some("datacenter") => "datacenter is in use".to_string(),
                    Some("pool") | Some("domain_pool_relation") => "pool is attached to a domain".to_string(),
                    _ => "Invalid reference to related resource".to_string(),
                },
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Conflict {
                    entity_type, reason, ..
                } => format!("{entity_type} cannot be modified: {reason}"),
                DbError::MissingReferences { entity_type, ids } => format!(
                    "{entity_type}(s) not found: [{}]",
                    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                ),
                DbError::Retryable { .. } => "Request conflicted with a concurrent change, please retry".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl From<PaginationError> for Error {
    fn from(err: PaginationError) -> Self {
        Error::BadRequest { message: err.to_string() }
    }
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        matches!(self, Error::Database(db_err) if db_err.is_retryable())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::QuotaExceeded { .. } => {
                tracing::info!("Admission error: {}", self);
            }
            Error::BadRequest { .. }
            | Error::PayloadTooLarge { .. }
            | Error::InvalidMarker
            | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
        }

        let status = self.status_code();
        let body = ErrorBody {
            code: status.as_u16(),
            error: self.code(),
            message: self.user_message(),
        };

        let mut response = (status, Json(body)).into_response();
        if status.is_server_error() {
            response
                .extensions_mut()
                .insert(ErrorDetail(Arc::new(format!("{:#}", anyhow::Error::new(self)))));
        }
        response
    }
}

/// Operator/debug mode middleware: copies the internal error chain into 5xx response bodies.
///
/// Only mounted when `debug` is enabled; production responses carry the generic message alone.
pub async fn verbose_errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let status = response.status();
    let (_, body) = response.into_parts();
    let original = axum::body::to_bytes(body, 64 * 1024).await.unwrap_or_default();
    let mut json_body: serde_json::Value = serde_json::from_slice(&original).unwrap_or_else(|_| json!({}));
    if let Some(object) = json_body.as_object_mut() {
        object.insert("detail".to_string(), json!(detail.as_str()));
    }
    (status, Json(json_body)).into_response()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(Error::InvalidMarker.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Database(DbError::InvalidMarker).code(), "invalid_marker");
        assert_eq!(
            Error::QuotaExceeded {
                resource: "pool".to_string()
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::Database(DbError::Conflict {
                entity_type: "Pool".to_string(),
                entity_id: "x".to_string(),
                reason: "attached domain is pending".to_string()
            })
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_ne!(Error::InvalidMarker.code(), Error::Database(DbError::NotFound).code());
    }

    #[test]
    fn test_duplicate_member_message() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("member_endpoint_unique".to_string()),
            table: Some("member".to_string()),
            message: "duplicate key value violates unique constraint".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "duplicate_member");
        assert_eq!(err.user_message(), "endpoint already exists in pool");
    }

    #[test]
    fn test_internal_errors_do_not_leak() {
        let err = Error::Database(DbError::Other(anyhow::anyhow!("syntax error at or near \"FROM pool\"")));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.user_message().contains("FROM pool"));
    }

    #[tokio::test]
    async fn test_internal_error_response_carries_detail_extension() {
        let response = Error::Other(anyhow::anyhow!("connection reset")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<ErrorDetail>().unwrap();
        assert!(detail.0.contains("connection reset"));

        let response = Error::InvalidMarker.into_response();
        assert!(response.extensions().get::<ErrorDetail>().is_none());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Database(DbError::Retryable { message: "40001".to_string() }).is_retryable());
        assert!(!Error::InvalidMarker.is_retryable());
    }
}
