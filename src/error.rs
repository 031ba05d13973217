//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Missing, invalid, or expired token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Valid identity, insufficient privilege. Carries no detail about which
    /// action or role was missing.
    #[error("Access denied")]
    Forbidden,

    /// Entity absence, surfaced only for entities the caller may know about
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input: bad UUID, unknown hierarchy level, illegal field
    #[error("Wrong arguments: {0}")]
    WrongArguments(String),

    /// Duplicate role name/scope or similar uniqueness violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The type chain is branching or disconnected. Non-recoverable; the
    /// operation touching that subtree must abort.
    #[error("Hierarchy corrupt: {0}")]
    HierarchyCorrupt(String),

    /// Resource Directory call failed
    #[error("Directory error: {0}")]
    Directory(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Address parse error
    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::WrongArguments(_) => "WRONG_ARGUMENTS",
            AppError::Conflict(_) => "CONFLICT",
            AppError::HierarchyCorrupt(_) => "HIERARCHY_CORRUPT",
            AppError::Directory(_) => "DIRECTORY_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::AddrParse(_) => "ADDR_PARSE_ERROR",
            AppError::Json(_) => "JSON_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Service misconfigured".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database operation failed".to_string(),
            ),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            // Never reveal which missing action or role caused the denial.
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Access denied".to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::WrongArguments(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::HierarchyCorrupt(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Hierarchy configuration is corrupt".to_string(),
            ),
            AppError::Directory(_) => (
                StatusCode::BAD_GATEWAY,
                "Resource directory unavailable".to_string(),
            ),
            AppError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO operation failed".to_string(),
            ),
            AppError::AddrParse(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalid address".to_string(),
            ),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, "Invalid JSON".to_string()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error".to_string(),
            ),
        };

        let code = self.code();
        tracing::error!(error = %self, code = code, "Request error");

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Error code stability
    // -----------------------------------------------------------------------

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Unauthorized("x".into()).code(), "UNAUTHORIZED");
        assert_eq!(AppError::Forbidden.code(), "FORBIDDEN");
        assert_eq!(AppError::NotFound("x".into()).code(), "NOT_FOUND");
        assert_eq!(
            AppError::WrongArguments("x".into()).code(),
            "WRONG_ARGUMENTS"
        );
        assert_eq!(AppError::Conflict("x".into()).code(), "CONFLICT");
        assert_eq!(
            AppError::HierarchyCorrupt("x".into()).code(),
            "HIERARCHY_CORRUPT"
        );
    }

    #[test]
    fn test_forbidden_carries_no_detail() {
        // The denial reason must never leak to the caller.
        let err = AppError::Forbidden;
        assert_eq!(err.to_string(), "Access denied");
    }

    // -----------------------------------------------------------------------
    // HTTP status mapping
    // -----------------------------------------------------------------------

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Unauthorized("no token".into()), 401),
            (AppError::Forbidden, 403),
            (AppError::NotFound("role".into()), 404),
            (AppError::WrongArguments("bad uuid".into()), 400),
            (AppError::Conflict("duplicate role".into()), 409),
            (AppError::HierarchyCorrupt("branching".into()), 500),
        ];
        for (err, status) in cases {
            let resp = err.into_response();
            assert_eq!(resp.status().as_u16(), status);
        }
    }
}
