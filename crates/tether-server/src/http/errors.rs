//! HTTP error responses.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tether_core::errors::{ErrorBody, ErrorCode};

use crate::auth::AuthError;
use crate::gateway::GatewayError;
use crate::token::TokenError;

/// An error rendered as `{ error, code, details? }`.
#[derive(Debug)]
pub struct ApiError {
    body: ErrorBody,
}

impl ApiError {
    /// Build an error with an explicit code.
    pub fn new(code: ErrorCode, error: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            body: ErrorBody {
                error: error.into(),
                code,
                details,
            },
        }
    }

    /// 400 with a human message.
    pub fn validation(error: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, error, None)
    }

    /// 500 for failures inside this process.
    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, error, None)
    }

    /// 401.
    pub fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthRequired, error, None)
    }

    /// Error code carried by the body.
    pub fn code(&self) -> ErrorCode {
        self.body.code
    }

    /// HTTP status for the code.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.body.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let code = err.code();
        let details = err.details().cloned();
        Self::new(code, err.to_string(), details)
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        Self::new(err.code(), err.to_string(), None)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::unauthorized(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}
