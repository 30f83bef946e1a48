use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};

use crate::app::errors::ApiError;
use crate::app::response::MessageCode;
use crate::app::services::AppServices;
use crate::context::SessionContext;

pub const SESSION_COOKIE: &str = "tollgate_session";

/// Require a valid session cookie and attach a [`SessionContext`].
///
/// No cookie is `get.jwt.error`; a cookie that fails verification (or carries a
/// scoped token instead of a session) is `check.jwt.error`.
pub async fn require_session(
    State(services): State<Arc<AppServices>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_cookie(req.headers()).ok_or(ApiError::new(
        axum::http::StatusCode::UNAUTHORIZED,
        MessageCode::GetJwtError,
    ))?;

    let rejected = ApiError::new(axum::http::StatusCode::UNAUTHORIZED, MessageCode::CheckJwtError);
    let claims = services.issuer().verify_session(token).map_err(|_| rejected)?;
    let session = SessionContext::from_claims(claims).ok_or_else(|| {
        tracing::warn!("session cookie does not carry a user id");
        rejected
    })?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

/// Value of the session cookie, if present and non-empty.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value delivering a session token.
pub fn set_session_cookie(token: &str, expires_at: DateTime<Utc>, secure: bool) -> Result<HeaderValue, ApiError> {
    let max_age = (expires_at - Utc::now()).num_seconds().max(0);
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; Expires={}; Max-Age={max_age}; HttpOnly; SameSite=Lax",
        expires_at.format("%a, %d %b %Y %H:%M:%S GMT"),
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal("session cookie", MessageCode::TokenSignError, e))
}
