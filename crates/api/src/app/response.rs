//! The `{message, code, data}` envelope every endpoint answers with.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Serialize, Serializer};

/// Stable, client-visible `message` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCode {
    Ok,
    DatabaseError,
    BindError,
    BadTicket,
    IncorrectPassword,
    BadUrlParse,
    AppExist,
    AppKeyInvalid,
    Unauthorized,
    GetJwtError,
    CheckJwtError,
    UserIsExist,
    UserNotExist,
    CalculateOffset,
    TokenSignError,
}

impl MessageCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageCode::Ok => "ok",
            MessageCode::DatabaseError => "error.database",
            MessageCode::BindError => "bind.error",
            MessageCode::BadTicket => "bad.ticket",
            MessageCode::IncorrectPassword => "incorrect.password",
            MessageCode::BadUrlParse => "bad.url.parse",
            MessageCode::AppExist => "app.exist",
            MessageCode::AppKeyInvalid => "app.key.invalid",
            MessageCode::Unauthorized => "unauthorized",
            MessageCode::GetJwtError => "get.jwt.error",
            MessageCode::CheckJwtError => "check.jwt.error",
            MessageCode::UserIsExist => "user.is.exist",
            MessageCode::UserNotExist => "user.not.exist",
            MessageCode::CalculateOffset => "calculate.offset",
            MessageCode::TokenSignError => "token.sign.error",
        }
    }
}

impl core::fmt::Display for MessageCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Numeric severity: 0 ok, 1 warning, 2 error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Ok = 0,
    Warning = 1,
    Error = 2,
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Empty {}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub message: MessageCode,
    pub code: Severity,
    pub data: T,
}

#[derive(Debug)]
pub enum Reply<T> {
    Ok(T),
    Warning(MessageCode, T),
    Error(MessageCode),
}

impl<T: Serialize> Reply<T> {
    pub fn into_envelope(self) -> Envelope<serde_json::Value> {
        let (message, code, data) = match self {
            Reply::Ok(data) => (MessageCode::Ok, Severity::Ok, to_value(data)),
            Reply::Warning(message, data) => (message, Severity::Warning, to_value(data)),
            Reply::Error(message) => (message, Severity::Error, to_value(Empty {})),
        };
        Envelope { message, code, data }
    }
}

fn to_value<T: Serialize>(data: T) -> serde_json::Value {
    serde_json::to_value(data).unwrap_or_else(|e| {
        tracing::error!(error = %e, "response data failed to serialize");
        serde_json::Value::Object(Default::default())
    })
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self.into_envelope())).into_response()
    }
}
