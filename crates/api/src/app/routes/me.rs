use std::sync::Arc;

use axum::extract::Extension;

use crate::app::dto::{UpdatePasswordRequest, UpdateUsernameRequest};
use crate::app::errors::ApiError;
use crate::app::extract::BindJson;
use crate::app::response::{Empty, MessageCode, Reply};
use crate::app::services::AppServices;
use crate::context::SessionContext;

/// PUT /api/v1/me/username
pub async fn update_username(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
    BindJson(body): BindJson<UpdateUsernameRequest>,
) -> Result<Reply<Empty>, ApiError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError::bind());
    }
    services
        .users()
        .rename_user(session.user_id(), username)
        .await
        .map_err(ApiError::user_store)?;
    tracing::info!(user_id = %session.user_id(), "username changed");
    Ok(Reply::Ok(Empty {}))
}

/// PUT /api/v1/me/password - requires the current password.
pub async fn update_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(session): Extension<SessionContext>,
    BindJson(body): BindJson<UpdatePasswordRequest>,
) -> Result<Reply<Empty>, ApiError> {
    let user = services
        .users()
        .find_user(session.user_id())
        .await
        .map_err(ApiError::user_store)?
        .ok_or(ApiError::user_not_found())?;

    if !services.verify_password(&user.password_hash, &body.password).await? {
        tracing::info!(user_id = %user.id, "password change with incorrect current password");
        return Err(ApiError::new(
            axum::http::StatusCode::UNAUTHORIZED,
            MessageCode::IncorrectPassword,
        ));
    }

    let hash = services.hash_password(&body.new_password).await?;
    services
        .users()
        .set_password_hash(user.id, &hash)
        .await
        .map_err(ApiError::user_store)?;
    tracing::info!(user_id = %user.id, "password changed");
    Ok(Reply::Ok(Empty {}))
}
