/// Unified error handling for the application.
///
/// Domain-specific error enums keep each failure family separate;
/// `AppError` is the single type route handlers return, and its
/// `ResponseError` impl maps every variant to an HTTP response with a
/// structured body and a tracking id.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// Validation errors for input data
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    OutOfRange(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} is too short (minimum {} characters)", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::OutOfRange(field) => write!(f, "{} is out of range", field),
        }
    }
}

impl StdError for ValidationError {}

/// Authentication and authorization errors
#[derive(Debug)]
pub enum AuthError {
    InvalidCredentials,
    TokenExpired,
    TokenInvalid,
    MissingToken,
    Forbidden,
    AccountInactive,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenInvalid => write!(f, "Invalid token"),
            AuthError::MissingToken => write!(f, "Missing authentication token"),
            AuthError::Forbidden => write!(f, "Insufficient permissions"),
            AuthError::AccountInactive => write!(f, "Account is inactive"),
        }
    }
}

impl StdError for AuthError {}

/// Invitation redemption errors
///
/// All three variants render the same user-facing message so the response
/// body never helps token enumeration; the status code still distinguishes
/// the cases for a legitimately held token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvitationError {
    NotFound,
    Expired,
    AlreadyConsumed,
}

impl fmt::Display for InvitationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvitationError::NotFound => write!(f, "invitation not found"),
            InvitationError::Expired => write!(f, "invitation has expired"),
            InvitationError::AlreadyConsumed => write!(f, "invitation already consumed"),
        }
    }
}

impl StdError for InvitationError {}

/// Row-store operation errors
#[derive(Debug)]
pub enum StorageError {
    UniqueViolation(String),
    NotFound(String),
    QueryExecution(String),
    ConnectionPool(String),
    Unexpected(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::UniqueViolation(msg) => write!(f, "Duplicate entry: {}", msg),
            StorageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StorageError::QueryExecution(msg) => write!(f, "Query error: {}", msg),
            StorageError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            StorageError::Unexpected(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for StorageError {}

/// Email service errors
#[derive(Debug, Clone)]
pub enum EmailError {
    SendFailed(String),
    InvalidRecipient(String),
}

impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailError::SendFailed(msg) => write!(f, "Failed to send email: {}", msg),
            EmailError::InvalidRecipient(msg) => write!(f, "Invalid recipient: {}", msg),
        }
    }
}

impl StdError for EmailError {}

/// Central error type that all application errors map to
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Invitation(InvitationError),
    Storage(StorageError),
    Email(EmailError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Invitation(e) => write!(f, "{}", e),
            AppError::Storage(e) => write!(f, "{}", e),
            AppError::Email(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<InvitationError> for AppError {
    fn from(err: InvitationError) -> Self {
        AppError::Invitation(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Storage(err)
    }
}

impl From<EmailError> for AppError {
    fn from(err: EmailError) -> Self {
        AppError::Email(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let error_msg = err.to_string();

        if error_msg.contains("duplicate key") || error_msg.contains("unique constraint") {
            AppError::Storage(StorageError::UniqueViolation(
                "record already exists".to_string(),
            ))
        } else if error_msg.contains("no rows") {
            AppError::Storage(StorageError::NotFound("record not found".to_string()))
        } else if error_msg.contains("pool") || error_msg.contains("connect") {
            AppError::Storage(StorageError::ConnectionPool(error_msg))
        } else {
            AppError::Storage(StorageError::Unexpected(error_msg))
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking (request ID or trace ID)
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// Every invitation failure renders this message: the body must not help a
// caller tell guessed tokens apart from real ones.
const INVITATION_MESSAGE: &str =
    "This invitation link is invalid, expired, or has already been used.";

impl AppError {
    fn response_parts(&self, error_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code, message) = match self {
            AppError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR".to_string(),
                e.to_string(),
            ),

            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => (
                    StatusCode::UNAUTHORIZED,
                    "INVALID_CREDENTIALS".to_string(),
                    "Invalid email or password".to_string(),
                ),
                AuthError::TokenExpired | AuthError::TokenInvalid => (
                    StatusCode::UNAUTHORIZED,
                    "TOKEN_INVALID".to_string(),
                    "Invalid or expired token".to_string(),
                ),
                AuthError::MissingToken => (
                    StatusCode::UNAUTHORIZED,
                    "MISSING_TOKEN".to_string(),
                    "Missing authentication token".to_string(),
                ),
                AuthError::Forbidden => (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN".to_string(),
                    "Insufficient permissions".to_string(),
                ),
                AuthError::AccountInactive => (
                    StatusCode::FORBIDDEN,
                    "ACCOUNT_INACTIVE".to_string(),
                    "Account is inactive".to_string(),
                ),
            },

            AppError::Invitation(e) => match e {
                InvitationError::NotFound => (
                    StatusCode::NOT_FOUND,
                    "INVITATION_INVALID".to_string(),
                    INVITATION_MESSAGE.to_string(),
                ),
                InvitationError::Expired => (
                    StatusCode::GONE,
                    "INVITATION_EXPIRED".to_string(),
                    INVITATION_MESSAGE.to_string(),
                ),
                InvitationError::AlreadyConsumed => (
                    StatusCode::CONFLICT,
                    "INVITATION_CONSUMED".to_string(),
                    INVITATION_MESSAGE.to_string(),
                ),
            },

            AppError::Storage(e) => match e {
                StorageError::UniqueViolation(_) => (
                    StatusCode::CONFLICT,
                    "DUPLICATE_ENTRY".to_string(),
                    e.to_string(),
                ),
                StorageError::NotFound(_) => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND".to_string(),
                    e.to_string(),
                ),
                StorageError::ConnectionPool(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE".to_string(),
                    "Database service temporarily unavailable".to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR".to_string(),
                    "Database error occurred".to_string(),
                ),
            },

            AppError::Email(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "EMAIL_SERVICE_ERROR".to_string(),
                "Email service temporarily unavailable".to_string(),
            ),

            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
                "Internal server error".to_string(),
            ),
        };

        let error_response =
            ErrorResponse::new(error_id.to_string(), message, code, status.as_u16());

        (status, error_response)
    }

    fn log(&self, error_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Validation error");
            }
            AppError::Auth(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Authentication error");
            }
            AppError::Invitation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Invitation rejected");
            }
            AppError::Storage(StorageError::UniqueViolation(_)) => {
                tracing::warn!(error_id = error_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Storage(e) => {
                tracing::error!(error_id = error_id, error = %e, "Storage error");
            }
            AppError::Email(e) => {
                tracing::error!(error_id = error_id, error = %e, "Email service error");
            }
            AppError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log(&error_id);

        let (status, error_response) = self.response_parts(&error_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(e) => match e {
                AuthError::Forbidden | AuthError::AccountInactive => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Invitation(e) => match e {
                InvitationError::NotFound => StatusCode::NOT_FOUND,
                InvitationError::Expired => StatusCode::GONE,
                InvitationError::AlreadyConsumed => StatusCode::CONFLICT,
            },
            AppError::Storage(e) => match e {
                StorageError::UniqueViolation(_) => StatusCode::CONFLICT,
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Email(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error context for enhanced logging and debugging
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn log_error(&self, error: &AppError) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AppError::Validation(_) | AppError::Auth(_) | AppError::Invitation(_) => {
                tracing::warn!(error = %error, context = ?context, "Request rejected");
            }
            _ => {
                tracing::error!(error = %error, context = ?context, "Operation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::EmptyField("email".to_string());
        assert_eq!(err.to_string(), "email is empty");
    }

    #[test]
    fn test_app_error_conversion() {
        let val_err = ValidationError::InvalidFormat("test".to_string());
        let app_err: AppError = val_err.into();
        match app_err {
            AppError::Validation(_) => (),
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn test_invitation_errors_share_one_message() {
        let variants = [
            InvitationError::NotFound,
            InvitationError::Expired,
            InvitationError::AlreadyConsumed,
        ];

        for variant in variants {
            let (_, response) = AppError::Invitation(variant).response_parts("test-id");
            assert_eq!(response.message, INVITATION_MESSAGE);
        }
    }

    #[test]
    fn test_invitation_status_codes() {
        assert_eq!(
            AppError::Invitation(InvitationError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Invitation(InvitationError::Expired).status_code(),
            StatusCode::GONE
        );
        assert_eq!(
            AppError::Invitation(InvitationError::AlreadyConsumed).status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_forbidden_maps_to_403() {
        assert_eq!(
            AppError::Auth(AuthError::Forbidden).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_error_response_creation() {
        let error_id = "test-123".to_string();
        let response = ErrorResponse::new(
            error_id.clone(),
            "Test error".to_string(),
            "TEST_ERROR".to_string(),
            400,
        );

        assert_eq!(response.error_id, error_id);
        assert_eq!(response.code, "TEST_ERROR");
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("test_operation");
        assert_eq!(ctx.operation, "test_operation");
        assert!(ctx.user_id.is_none());

        let ctx_with_user = ctx.with_user_id("user-123".to_string());
        assert_eq!(ctx_with_user.user_id, Some("user-123".to_string()));
    }
}
