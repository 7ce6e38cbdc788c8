use sea_orm::error::{DbErr, SqlErr};

/// Errors surfaced by the ingestion services.
///
/// Resolution and evaluation silence are not errors: an unresolved reference
/// code is `None`, an unverifiable price is a no-op decision. Only a duplicate
/// line reference is reported to callers as a recoverable [`ServiceError::Conflict`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Convenience constructor for wrapping string-based database errors.
    pub fn database_error_message(message: impl Into<String>) -> Self {
        ServiceError::DatabaseError(DbErr::Custom(message.into()))
    }

    /// Short machine-readable code, used for CLI output and stored error codes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::InvalidStatus(_) => "invalid_status",
            Self::ExtractionError(_) => "ocr_failed",
        }
    }

    /// True for errors the caller may retry with different input.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Returns true when the database rejected a write because of a unique index.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Maps a unique-index violation to [`ServiceError::Conflict`] with the given
/// message, passing every other database error through unchanged.
pub fn conflict_on_unique(err: DbErr, message: impl FnOnce() -> String) -> ServiceError {
    if is_unique_violation(&err) {
        ServiceError::Conflict(message())
    } else {
        ServiceError::DatabaseError(err)
    }
}
