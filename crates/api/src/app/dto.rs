use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tollgate_core::{ApplicationId, RegisteredApplication, UserId};
use tollgate_infra::directory::{Page, PageRequest, UserRecord};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub redirect: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub ticket: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUsernameRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub password: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserIdRequest {
    pub id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationIdRequest {
    pub id: ApplicationId,
}

#[derive(Debug, Deserialize)]
pub struct CreateApplicationRequest {
    pub name: String,
    pub site: String,
    pub redirect: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateApplicationRequest {
    pub id: ApplicationId,
    pub name: String,
    pub site: String,
    pub redirect: String,
}

/// `?<filter>&page&pageSize`. Values that are not integers fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub username: Option<String>,
    pub name: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
}

impl SearchQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::normalize(lenient_int(self.page.as_deref()), lenient_int(self.page_size.as_deref()))
    }

    pub fn username_filter(&self) -> Option<&str> {
        non_empty(self.username.as_deref())
    }

    pub fn name_filter(&self) -> Option<&str> {
        non_empty(self.name.as_deref())
    }
}

fn lenient_int(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse().ok())
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RedirectResponse {
    pub redirect: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedUserResponse {
    pub id: UserId,
}

#[derive(Debug, Serialize)]
pub struct AppKeyResponse {
    pub app_key: String,
}

#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    pub list: Vec<T>,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            page: page.request.page,
            page_size: page.request.page_size,
            list: page.items,
        }
    }
}

/// User listing entry; never includes the password hash.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserView {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApplicationView {
    pub id: ApplicationId,
    pub name: String,
    pub app_key: String,
    pub site: String,
    pub redirect: String,
}

impl From<RegisteredApplication> for ApplicationView {
    fn from(app: RegisteredApplication) -> Self {
        Self {
            id: app.id,
            name: app.name,
            app_key: app.app_key.expose().to_string(),
            site: app.site.to_string(),
            redirect: app.redirect,
        }
    }
}
