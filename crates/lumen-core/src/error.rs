use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("you are blocked by this user")]
    BlockedByUser,
    #[error("you have blocked this user; unblock to send")]
    UserBlocked,
    #[error("a message request to this user is already pending")]
    RequestAlreadyPending,
    #[error("this user declined your message request")]
    RequestRejected,
    #[error("insufficient points")]
    InsufficientPoints,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("database error: {0}")]
    Database(#[from] lumen_db::DbError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error class exposed to clients alongside the machine code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Authz,
    State,
    Validation,
    NotFound,
    Infra,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Authz => "authz",
            ErrorKind::State => "state",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Infra => "infra",
        }
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound | CoreError::Database(lumen_db::DbError::NotFound) => {
                ErrorKind::NotFound
            }
            CoreError::Forbidden | CoreError::BlockedByUser | CoreError::UserBlocked => {
                ErrorKind::Authz
            }
            CoreError::BadRequest(_) => ErrorKind::Validation,
            CoreError::Conflict(_)
            | CoreError::RequestAlreadyPending
            | CoreError::RequestRejected
            | CoreError::InsufficientPoints => ErrorKind::State,
            CoreError::InvalidCredentials => ErrorKind::Auth,
            CoreError::Database(_) | CoreError::Internal(_) => ErrorKind::Infra,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound | CoreError::Database(lumen_db::DbError::NotFound) => "not_found",
            CoreError::Forbidden => "forbidden",
            CoreError::BadRequest(_) => "bad_request",
            CoreError::Conflict(_) => "conflict",
            CoreError::BlockedByUser => "blocked_by_user",
            CoreError::UserBlocked => "user_blocked",
            CoreError::RequestAlreadyPending => "request_already_pending",
            CoreError::RequestRejected => "request_rejected",
            CoreError::InsufficientPoints => "insufficient_points",
            CoreError::InvalidCredentials => "invalid_credentials",
            CoreError::Database(_) => "database_error",
            CoreError::Internal(_) => "internal_error",
        }
    }
}
