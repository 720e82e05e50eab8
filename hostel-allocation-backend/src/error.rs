use core::convert::Infallible;

use hostel_allocation_config::ConfigError;
use hostel_allocation_database::{DatabaseError, HostelError};
use http::StatusCode;
use serde::Serialize;
use tracing::{error, warn};

use crate::permission::Permission;
use crate::routes::Reply;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Hostel(#[from] HostelError),
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid cookie key: {0}")]
    CookieKey(#[from] cookie::KeyError),
    #[error("no cookie key available")]
    NoCookieKey,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("webserver error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid request body: {0}")]
    InvalidBody(#[source] serde_json::Error),
    #[error("invalid query string: {0}")]
    InvalidQuery(#[from] serde_urlencoded::de::Error),
    #[error("not signed in")]
    Unauthenticated,
    #[error("not allowed to {0}")]
    Forbidden(Permission),
    #[error("wrong csrf token")]
    WrongCsrfToken,
    #[error("no such route")]
    RouteNotFound,
    #[error("method not allowed")]
    MethodNotAllowed,
}

impl From<Infallible> for AppError {
    fn from(value: Infallible) -> Self {
        match value {}
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: &'a str,
}

impl AppError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Hostel(HostelError::Validation(_))
            | Self::InvalidBody(_)
            | Self::InvalidQuery(_)
            | Self::Hyper(_)
            | Self::WrongCsrfToken => StatusCode::BAD_REQUEST,
            Self::Hostel(HostelError::Conflict(_)) => StatusCode::CONFLICT,
            Self::Hostel(HostelError::NotFound { .. }) | Self::RouteNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Hostel(HostelError::Database(_))
            | Self::Database(_)
            | Self::Config(_)
            | Self::CookieKey(_)
            | Self::NoCookieKey
            | Self::Io(_)
            | Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine readable `error` field of the response body.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hostel(HostelError::Validation(_)) => "validation",
            Self::Hostel(HostelError::Conflict(_)) => "conflict",
            Self::Hostel(HostelError::NotFound { .. }) | Self::RouteNotFound => "not_found",
            Self::InvalidBody(_) | Self::InvalidQuery(_) | Self::Hyper(_) => "bad_request",
            Self::WrongCsrfToken => "csrf",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Hostel(HostelError::Database(_))
            | Self::Database(_)
            | Self::Config(_)
            | Self::CookieKey(_)
            | Self::NoCookieKey
            | Self::Io(_)
            | Self::Json(_) => "internal",
        }
    }

    pub fn into_reply(self) -> Reply {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("request failed: {self}");
            "internal server error".to_owned()
        } else {
            warn!(status = status.as_u16(), "request rejected: {self}");
            self.to_string()
        };
        let body = ErrorBody {
            error: self.kind(),
            message: &message,
        };
        Reply::json(status, &body).unwrap_or_else(|_| Reply::empty(status))
    }
}
