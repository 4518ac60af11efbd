use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lumen_core::error::{CoreError, ErrorKind};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, ErrorKind) {
        match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", ErrorKind::Auth),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", ErrorKind::Validation),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                ErrorKind::Infra,
            ),
            ApiError::Core(err) => {
                let kind = err.kind();
                let status = match kind {
                    ErrorKind::Auth => StatusCode::UNAUTHORIZED,
                    ErrorKind::Authz => StatusCode::FORBIDDEN,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::State if matches!(err, CoreError::Conflict(_)) => StatusCode::CONFLICT,
                    ErrorKind::State => StatusCode::BAD_REQUEST,
                    ErrorKind::Infra => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code(), kind)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, kind) = self.parts();
        let message = if kind == ErrorKind::Infra {
            tracing::error!("API internal error: {self:#}");
            "internal server error".to_string()
        } else {
            match &self {
                ApiError::Core(CoreError::BadRequest(msg) | CoreError::Conflict(msg)) => msg.clone(),
                ApiError::BadRequest(msg) => msg.clone(),
                other => other.to_string(),
            }
        };
        (
            status,
            Json(json!({ "error": message, "code": code, "kind": kind.as_str() })),
        )
            .into_response()
    }
}

impl From<lumen_db::DbError> for ApiError {
    fn from(e: lumen_db::DbError) -> Self {
        ApiError::Core(CoreError::Database(e))
    }
}
