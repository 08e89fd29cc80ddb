// HTTP API Error Types
use axum::{response::IntoResponse, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::session::UserSession;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized - missing/blank/unknown token, unauthenticated
    // session, or IP-lock violation; deliberately not distinguishable
    NotAuthenticated(String),

    // 403 Forbidden - authenticated but lacking role or org scope
    Unauthorized(String),

    // 404 Not Found
    NotFound(String),

    // 410 Gone - client build below the study minimum
    UnsupportedVersion(String),

    // 412 Precondition Failed - participant must consent first; carries the
    // session so the client can render the remaining consent requirements
    ConsentRequired { message: String, session: Box<UserSession> },

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::NotAuthenticated(_) => 401,
            ApiError::Unauthorized(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::UnsupportedVersion(_) => 410,
            ApiError::ConsentRequired { .. } => 412,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::NotAuthenticated(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::UnsupportedVersion(msg) => msg,
            ApiError::ConsentRequired { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ConsentRequired { message, session } => {
                json!({
                    "error": true,
                    "message": message,
                    "code": self.error_code(),
                    "consent_statuses": session.consent_statuses,
                })
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::NotAuthenticated(_) => "NOT_AUTHENTICATED",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
            ApiError::ConsentRequired { .. } => "CONSENT_REQUIRED",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_authenticated(message: impl Into<String>) -> Self {
        ApiError::NotAuthenticated(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert gateway denials to ApiError
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::NotAuthenticated => ApiError::not_authenticated(err.to_string()),
            AuthError::Unauthorized => ApiError::unauthorized(err.to_string()),
            AuthError::UnsupportedVersion => ApiError::UnsupportedVersion(err.to_string()),
            AuthError::EntityNotFound(_) => ApiError::not_found(err.to_string()),
            AuthError::ConsentRequired(session) => ApiError::ConsentRequired {
                message: "consent is required before accessing this service".to_string(),
                session,
            },
            AuthError::Store(store_err) => {
                // Log the real error but return a generic message
                tracing::error!("Store error during authorization: {}", store_err);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
