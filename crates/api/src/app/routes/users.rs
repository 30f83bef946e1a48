//! Account management and admin role assignment. Admin only.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    routing::post,
    Router,
};

use tollgate_auth::Role;
use tollgate_core::UserId;

use crate::app::dto::{CreatedUserResponse, CredentialsRequest, PageResponse, SearchQuery, UserIdRequest, UserView};
use crate::app::errors::ApiError;
use crate::app::extract::{BindJson, BindQuery};
use crate::app::response::{Empty, MessageCode, Reply};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/users", post(create_user).get(list_users).delete(delete_user))
        .route("/users/admin", post(grant_admin).delete(revoke_admin))
}

/// POST /api/v1/users
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    BindJson(body): BindJson<CredentialsRequest>,
) -> Result<Reply<CreatedUserResponse>, ApiError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err(ApiError::bind());
    }
    if services
        .users()
        .find_user_by_name(username)
        .await
        .map_err(ApiError::user_store)?
        .is_some()
    {
        return Err(ApiError::new(StatusCode::CONFLICT, MessageCode::UserIsExist));
    }

    let hash = services.hash_password(&body.password).await?;
    let user = services
        .users()
        .create_user(username, &hash)
        .await
        .map_err(ApiError::user_store)?;
    tracing::info!(user_id = %user.id, "user created");
    Ok(Reply::Ok(CreatedUserResponse { id: user.id }))
}

/// GET /api/v1/users?username&page&pageSize
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    BindQuery(query): BindQuery<SearchQuery>,
) -> Result<Reply<PageResponse<UserView>>, ApiError> {
    let page = services
        .users()
        .list_users(query.username_filter(), query.page_request())
        .await
        .map_err(ApiError::user_store)?;

    if page.is_past_end() {
        return Ok(Reply::Warning(MessageCode::CalculateOffset, page.map(UserView::from).into()));
    }
    Ok(Reply::Ok(page.map(UserView::from).into()))
}

/// DELETE /api/v1/users
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    BindJson(body): BindJson<UserIdRequest>,
) -> Result<Reply<Empty>, ApiError> {
    services.users().delete_user(body.id).await.map_err(ApiError::user_store)?;
    tracing::info!(user_id = %body.id, "user deleted");
    Ok(Reply::Ok(Empty {}))
}

/// POST /api/v1/users/admin
pub async fn grant_admin(
    Extension(services): Extension<Arc<AppServices>>,
    BindJson(body): BindJson<UserIdRequest>,
) -> Result<Reply<Empty>, ApiError> {
    ensure_user(&services, body.id).await?;
    services
        .roles()
        .grant_role(body.id, &Role::ADMIN)
        .await
        .map_err(ApiError::user_store)?;
    tracing::info!(user_id = %body.id, "admin role granted");
    Ok(Reply::Ok(Empty {}))
}

/// DELETE /api/v1/users/admin - removes only the admin role.
pub async fn revoke_admin(
    Extension(services): Extension<Arc<AppServices>>,
    BindJson(body): BindJson<UserIdRequest>,
) -> Result<Reply<Empty>, ApiError> {
    ensure_user(&services, body.id).await?;
    services
        .roles()
        .revoke_role(body.id, &Role::ADMIN)
        .await
        .map_err(ApiError::user_store)?;
    tracing::info!(user_id = %body.id, "admin role revoked");
    Ok(Reply::Ok(Empty {}))
}

async fn ensure_user(services: &AppServices, id: UserId) -> Result<(), ApiError> {
    services
        .users()
        .find_user(id)
        .await
        .map_err(ApiError::user_store)?
        .map(|_| ())
        .ok_or(ApiError::user_not_found())
}
