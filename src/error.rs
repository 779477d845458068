use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::error;

/// The error taxonomy shared by the REST and RPC surfaces.
///
/// `Duplicated` is an internal signal only: repositories translate a
/// unique-constraint violation into it, and usecase code either swallows
/// it (idempotent paths) or converts it into a more specific variant
/// before it can escape to an adapter.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("request invalid: {0}")]
    RequestInvalid(String),
    #[error("request too large: {0}")]
    RequestTooLarge(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicated")]
    Duplicated,
    #[error("file invalid content: {0}")]
    FileInvalidContent(String),
    #[error("file mismatched type: {0}")]
    FileMismatchedType(String),
    #[error("file mismatched size: {0}")]
    FileMismatchedSize(String),
    #[error("server error")]
    Server {
        tag: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Wrap an arbitrary error as a `Server` error, logging it with a
    /// structured tag so the cause isn't lost even though callers only
    /// ever see "server error".
    pub fn server(tag: &'static str, source: impl Into<anyhow::Error>) -> Self {
        let source = source.into();
        error!(tag, error = ?source, "internal error");
        AppError::Server { tag, source }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn request_invalid(msg: impl Into<String>) -> Self {
        AppError::RequestInvalid(msg.into())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::RequestInvalid(_) => StatusCode::BAD_REQUEST,
            AppError::RequestTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::FileInvalidContent(_) => StatusCode::BAD_REQUEST,
            AppError::FileMismatchedType(_) => StatusCode::BAD_REQUEST,
            AppError::FileMismatchedSize(_) => StatusCode::BAD_REQUEST,
            AppError::Duplicated => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Server { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

impl From<crate::token::TokenError> for AppError {
    /// Token verification failure surfaces as forbidden.
    fn from(err: crate::token::TokenError) -> Self {
        AppError::Forbidden(err.to_string())
    }
}

impl From<AppError> for tonic::Status {
    fn from(err: AppError) -> Self {
        match err {
            AppError::RequestInvalid(msg) => tonic::Status::invalid_argument(msg),
            AppError::RequestTooLarge(msg) => tonic::Status::invalid_argument(msg),
            AppError::Unauthenticated(msg) => tonic::Status::unauthenticated(msg),
            AppError::Forbidden(msg) => tonic::Status::permission_denied(msg),
            AppError::NotFound(msg) => tonic::Status::not_found(msg),
            AppError::FileInvalidContent(msg) => tonic::Status::invalid_argument(msg),
            AppError::FileMismatchedType(msg) => tonic::Status::invalid_argument(msg),
            AppError::FileMismatchedSize(msg) => tonic::Status::invalid_argument(msg),
            AppError::Duplicated => tonic::Status::internal("unexpected duplicate"),
            AppError::Server { .. } => tonic::Status::internal("internal server error"),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
