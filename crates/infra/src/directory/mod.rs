//! Account, role and application directories.
//!
//! The handoff flow only reads from these (user by id, application by site or
//! key, role names for a user). Writes come from the administrative surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tollgate_auth::Role;
use tollgate_core::{AppKey, ApplicationId, Origin, RegisteredApplication, RoleId, UserId, UserIdentity};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryDirectory;
pub use postgres::PostgresDirectory;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity::new(self.id, self.username.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApplication {
    pub name: String,
    pub app_key: AppKey,
    pub site: Origin,
    pub redirect: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationUpdate {
    pub id: ApplicationId,
    pub name: String,
    pub site: Origin,
    pub redirect: String,
}

/// One-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Missing or non-positive values fall back to page 1 / the default page size.
    pub fn normalize(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = page.filter(|p| *p > 0).map_or(1, |p| p.min(u32::MAX as i64) as u32);
        let page_size = page_size
            .filter(|s| *s > 0)
            .map_or(DEFAULT_PAGE_SIZE, |s| s.min(u32::MAX as i64) as u32);
        Self { page, page_size }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::normalize(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub request: PageRequest,
    pub total: u64,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// The requested page starts beyond the last existing record.
    pub fn is_past_end(&self) -> bool {
        self.total > 0 && self.request.offset() >= self.total
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            request: self.request,
            total: self.total,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> DirectoryResult<Option<UserRecord>>;

    async fn find_user_by_name(&self, username: &str) -> DirectoryResult<Option<UserRecord>>;

    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> DirectoryResult<UserRecord>;

    async fn rename_user(&self, id: UserId, username: &str) -> DirectoryResult<()>;

    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> DirectoryResult<()>;

    /// Also drops the user's role assignments.
    async fn delete_user(&self, id: UserId) -> DirectoryResult<()>;

    async fn list_users(&self, username_filter: Option<&str>, page: PageRequest) -> DirectoryResult<Page<UserRecord>>;
}

#[async_trait]
pub trait ApplicationDirectory: Send + Sync {
    /// Every application registered for `site`. Callers decide how to treat more than one.
    async fn applications_by_site(&self, site: &Origin) -> DirectoryResult<Vec<RegisteredApplication>>;

    async fn applications_by_key(&self, app_key: &str) -> DirectoryResult<Vec<RegisteredApplication>>;

    /// Fails with `Conflict` when the key, site or redirect is already registered.
    async fn create_application(&self, new: NewApplication) -> DirectoryResult<RegisteredApplication>;

    async fn update_application(&self, update: ApplicationUpdate) -> DirectoryResult<()>;

    async fn delete_application(&self, id: ApplicationId) -> DirectoryResult<()>;

    async fn list_applications(
        &self,
        name_filter: Option<&str>,
        page: PageRequest,
    ) -> DirectoryResult<Page<RegisteredApplication>>;
}

#[async_trait]
pub trait RoleDirectory: Send + Sync {
    /// Role names assigned to a user (empty when none, or the user is unknown).
    async fn roles_for_user(&self, user: UserId) -> DirectoryResult<Vec<Role>>;

    /// Create the role if missing; returns its id either way.
    async fn ensure_role(&self, role: &Role, description: &str) -> DirectoryResult<RoleId>;

    /// Idempotent. `NotFound` when the user or role does not exist.
    async fn grant_role(&self, user: UserId, role: &Role) -> DirectoryResult<()>;

    /// Idempotent.
    async fn revoke_role(&self, user: UserId, role: &Role) -> DirectoryResult<()>;
}
