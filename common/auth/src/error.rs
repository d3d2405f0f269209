use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_security::{AccessLevel, SecurityError};
use common_token::TokenError;
use serde::Serialize;
use thiserror::Error;

use crate::identity::LookupError;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("proxy identity headers missing")]
    MissingIdentity,
    #[error("proxy identity headers are not trusted")]
    UntrustedProxy,
    #[error("access token missing")]
    MissingToken,
    #[error("access token invalid")]
    InvalidToken(#[source] TokenError),
    #[error("access token expired")]
    TokenExpired,
    #[error("identity not found")]
    IdentityNotFound,
    #[error("identity provider unavailable: {0}")]
    IdentityLookup(String),
    #[error("requires {required} access (have {actual})")]
    InsufficientLevel {
        required: AccessLevel,
        actual: AccessLevel,
    },
    #[error("failed to issue access token: {0}")]
    Issue(#[source] TokenError),
}

impl From<TokenError> for AuthError {
    fn from(value: TokenError) -> Self {
        if value.is_expired() {
            Self::TokenExpired
        } else {
            Self::InvalidToken(value)
        }
    }
}

impl From<LookupError> for AuthError {
    fn from(value: LookupError) -> Self {
        match value {
            LookupError::NotFound => Self::IdentityNotFound,
            LookupError::Transient(detail) => Self::IdentityLookup(detail),
        }
    }
}

impl From<SecurityError> for AuthError {
    fn from(value: SecurityError) -> Self {
        match value {
            SecurityError::InsufficientLevel { required, actual } => {
                Self::InsufficientLevel { required, actual }
            }
        }
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::IdentityLookup(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InsufficientLevel { .. } => StatusCode::FORBIDDEN,
            AuthError::Issue(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingIdentity | AuthError::UntrustedProxy => "AUTH_HEADER",
            AuthError::MissingToken => "AUTH_TOKEN_MISSING",
            AuthError::InvalidToken(_) => "AUTH_TOKEN",
            AuthError::TokenExpired => "AUTH_TOKEN_EXPIRED",
            AuthError::IdentityNotFound => "AUTH_IDENTITY",
            AuthError::IdentityLookup(_) => "AUTH_LOOKUP",
            AuthError::InsufficientLevel { .. } => "AUTH_LEVEL",
            AuthError::Issue(_) => "AUTH_ISSUE",
        }
    }

    // Provider and codec details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AuthError::IdentityLookup(_) => "identity provider unavailable".to_string(),
            AuthError::Issue(_) => "failed to issue access token".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}
