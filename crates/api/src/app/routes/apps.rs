//! Registered application management. Admin only.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::post,
    Router,
};

use tollgate_core::{AppKey, Origin, parse_redirect_target};
use tollgate_infra::directory::{ApplicationUpdate, NewApplication};
use tollgate_infra::tickets::token::{APP_KEY_LEN, random_alphanumeric};

use crate::app::dto::{
    AppKeyResponse, ApplicationIdRequest, ApplicationView, CreateApplicationRequest, PageResponse, SearchQuery,
    UpdateApplicationRequest,
};
use crate::app::errors::ApiError;
use crate::app::extract::{BindJson, BindQuery};
use crate::app::response::{Empty, MessageCode, Reply};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route(
        "/apps",
        post(create_app).get(list_apps).put(update_app).delete(delete_app),
    )
}

/// Validated `site` and `redirect` fields.
fn parse_targets(site: &str, redirect: &str) -> Result<(Origin, String), ApiError> {
    let origin = Origin::parse(site).map_err(|_| ApiError::bad_url())?;
    let redirect = parse_redirect_target(redirect).map_err(|_| ApiError::bad_url())?;
    Ok((origin, redirect.to_string()))
}

/// POST /api/v1/apps - the generated key is returned once, here.
pub async fn create_app(
    Extension(services): Extension<Arc<AppServices>>,
    BindJson(body): BindJson<CreateApplicationRequest>,
) -> Result<Reply<AppKeyResponse>, ApiError> {
    let (site, redirect) = parse_targets(&body.site, &body.redirect)?;
    let app = services
        .applications()
        .create_application(NewApplication {
            name: body.name,
            app_key: AppKey::new(random_alphanumeric(APP_KEY_LEN)),
            site,
            redirect,
        })
        .await
        .map_err(ApiError::app_store)?;
    tracing::info!(application_id = %app.id, site = %app.site, "application registered");
    Ok(Reply::Ok(AppKeyResponse {
        app_key: app.app_key.expose().to_string(),
    }))
}

/// GET /api/v1/apps?name&page&pageSize
pub async fn list_apps(
    Extension(services): Extension<Arc<AppServices>>,
    BindQuery(query): BindQuery<SearchQuery>,
) -> Result<Reply<PageResponse<ApplicationView>>, ApiError> {
    let page = services
        .applications()
        .list_applications(query.name_filter(), query.page_request())
        .await
        .map_err(ApiError::app_store)?;

    if page.is_past_end() {
        return Ok(Reply::Warning(MessageCode::CalculateOffset, page.map(ApplicationView::from).into()));
    }
    Ok(Reply::Ok(page.map(ApplicationView::from).into()))
}

/// PUT /api/v1/apps - the application key is not changed.
pub async fn update_app(
    Extension(services): Extension<Arc<AppServices>>,
    BindJson(body): BindJson<UpdateApplicationRequest>,
) -> Result<Reply<Empty>, ApiError> {
    let (site, redirect) = parse_targets(&body.site, &body.redirect)?;
    services
        .applications()
        .update_application(ApplicationUpdate {
            id: body.id,
            name: body.name,
            site,
            redirect,
        })
        .await
        .map_err(ApiError::app_store)?;
    tracing::info!(application_id = %body.id, "application updated");
    Ok(Reply::Ok(Empty {}))
}

/// DELETE /api/v1/apps
pub async fn delete_app(
    Extension(services): Extension<Arc<AppServices>>,
    BindJson(body): BindJson<ApplicationIdRequest>,
) -> Result<Reply<Empty>, ApiError> {
    services
        .applications()
        .delete_application(body.id)
        .await
        .map_err(ApiError::app_store)?;
    tracing::info!(application_id = %body.id, "application deleted");
    Ok(Reply::Ok(Empty {}))
}
