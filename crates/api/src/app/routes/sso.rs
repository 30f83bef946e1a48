//! Login and the two halves of the cross-domain handoff.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::header,
    response::{IntoResponse, Response},
};

use crate::app::dto::{AuthRequest, CredentialsRequest, RedirectResponse, TokenResponse, VerifyRequest};
use crate::app::errors::ApiError;
use crate::app::extract::{AppKeyHeader, BindJson};
use crate::app::response::{Empty, Reply};
use crate::app::services::AppServices;
use crate::context::SessionContext;
use crate::middleware::set_session_cookie;

/// POST /api/v1/login - set the central session cookie.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    BindJson(body): BindJson<CredentialsRequest>,
) -> Result<Response, ApiError> {
    let session = services.sso().login(&body.username, &body.password).await?;
    let cookie = set_session_cookie(&session.token, session.claims.expires_at, services.cookie_secure())?;
    Ok(([(header::SET_COOKIE, cookie)], Reply::Ok(Empty {})).into_response())
}

/// POST /api/v1/auth - mint a ticket for the application that owns `redirect`.
pub async fn auth(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
    BindJson(body): BindJson<AuthRequest>,
) -> Result<Reply<RedirectResponse>, ApiError> {
    let handoff = services.sso().initiate_handoff(session.claims(), &body.redirect).await?;
    Ok(Reply::Ok(RedirectResponse {
        redirect: handoff.url.to_string(),
    }))
}

/// POST /api/v1/verify - an application backend redeems a ticket.
pub async fn verify(
    Extension(services): Extension<Arc<AppServices>>,
    AppKeyHeader(app_key): AppKeyHeader,
    BindJson(body): BindJson<VerifyRequest>,
) -> Result<Reply<TokenResponse>, ApiError> {
    let scoped = services.sso().verify_handoff(&app_key, &body.ticket).await?;
    Ok(Reply::Ok(TokenResponse { token: scoped.token }))
}
