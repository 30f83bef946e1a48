use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use tollgate_infra::SsoError;
use tollgate_infra::directory::DirectoryError;

use crate::app::response::{MessageCode, Reply};
use crate::authz::GateError;

/// An error envelope plus the HTTP status that accompanies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: MessageCode,
}

impl ApiError {
    pub const fn new(status: StatusCode, code: MessageCode) -> Self {
        Self { status, code }
    }

    pub const fn bind() -> Self {
        Self::new(StatusCode::BAD_REQUEST, MessageCode::BindError)
    }

    pub const fn bad_url() -> Self {
        Self::new(StatusCode::BAD_REQUEST, MessageCode::BadUrlParse)
    }

    pub const fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, MessageCode::Unauthorized)
    }

    pub const fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, MessageCode::Unauthorized)
    }

    pub const fn user_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, MessageCode::UserNotExist)
    }

    /// Log the cause server-side; the caller only learns the store is unavailable.
    pub fn upstream(context: &str, cause: impl core::fmt::Display) -> Self {
        tracing::error!(context, error = %cause, "upstream failure");
        Self::new(StatusCode::SERVICE_UNAVAILABLE, MessageCode::DatabaseError)
    }

    pub fn internal(context: &str, code: MessageCode, cause: impl core::fmt::Display) -> Self {
        tracing::error!(context, error = %cause, "internal failure");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code)
    }

    /// Directory failure while working on user accounts.
    pub fn user_store(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound => Self::user_not_found(),
            DirectoryError::Conflict(_) => Self::new(StatusCode::CONFLICT, MessageCode::UserIsExist),
            DirectoryError::Unavailable(cause) => Self::upstream("user directory", cause),
        }
    }

    /// Directory failure while working on registered applications.
    pub fn app_store(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound => Self::new(StatusCode::NOT_FOUND, MessageCode::AppExist),
            DirectoryError::Conflict(_) => Self::new(StatusCode::CONFLICT, MessageCode::AppExist),
            DirectoryError::Unavailable(cause) => Self::upstream("application directory", cause),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Reply::<()>::Error(self.code).into_envelope())).into_response()
    }
}

impl From<SsoError> for ApiError {
    fn from(err: SsoError) -> Self {
        match err {
            SsoError::BadRedirectUrl(_) => Self::bad_url(),
            SsoError::ApplicationNotFound => Self::new(StatusCode::NOT_FOUND, MessageCode::AppExist),
            SsoError::UserNotFound => Self::unauthorized(),
            SsoError::IncorrectPassword => Self::new(StatusCode::UNAUTHORIZED, MessageCode::IncorrectPassword),
            SsoError::InvalidApplicationKey => Self::new(StatusCode::UNAUTHORIZED, MessageCode::AppKeyInvalid),
            SsoError::InvalidOrExpiredTicket => Self::new(StatusCode::UNAUTHORIZED, MessageCode::BadTicket),
            // Already logged where the cause was known.
            SsoError::UpstreamUnavailable(_) => Self::new(StatusCode::SERVICE_UNAVAILABLE, MessageCode::DatabaseError),
            SsoError::Signing(e) => Self::internal("token signing", MessageCode::TokenSignError, e),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Denied(_) => Self::forbidden(),
            GateError::Upstream(cause) => Self::upstream("role directory", cause),
        }
    }
}
