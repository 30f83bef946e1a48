//! Postgres-backed directory.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | DirectoryError |
//! |------------|----------------------|----------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Any other | Any other | `Unavailable` |
//!
//! Callers treat `Unavailable` as an upstream failure; the cause is logged here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use tollgate_auth::Role;
use tollgate_core::{AppKey, ApplicationId, Origin, RegisteredApplication, RoleId, UserId};

use super::{
    ApplicationDirectory, ApplicationUpdate, DirectoryError, DirectoryResult, NewApplication, Page, PageRequest,
    RoleDirectory, UserDirectory, UserRecord,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id BIGINT NOT NULL REFERENCES users (id) ON DELETE CASCADE,
        role_id BIGINT NOT NULL REFERENCES roles (id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS applications (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        app_key TEXT NOT NULL UNIQUE,
        site TEXT NOT NULL UNIQUE,
        redirect TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

/// Postgres directory over the `users`, `roles`, `user_roles` and `applications` tables.
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(database_url: &str, max_connections: u32, acquire_timeout: Duration) -> DirectoryResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the schema if missing. Safe to run repeatedly.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> DirectoryResult<()> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, sqlx::Error> {
    Ok(UserRecord {
        id: UserId::new(row.try_get("id")?),
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn application_from_row(row: &PgRow) -> Result<RegisteredApplication, sqlx::Error> {
    let site: String = row.try_get("site")?;
    let site = Origin::parse(&site).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(RegisteredApplication {
        id: ApplicationId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        app_key: AppKey::new(row.try_get::<String, _>("app_key")?),
        site,
        redirect: row.try_get("redirect")?,
    })
}

fn rows_into<T>(
    op: &str,
    rows: Vec<PgRow>,
    map: impl Fn(&PgRow) -> Result<T, sqlx::Error>,
) -> DirectoryResult<Vec<T>> {
    rows.iter().map(|row| map(row).map_err(|e| map_sqlx_error(op, e))).collect()
}

fn require_affected(rows: u64) -> DirectoryResult<()> {
    if rows == 0 { Err(DirectoryError::NotFound) } else { Ok(()) }
}

fn like_pattern(filter: Option<&str>) -> Option<String> {
    filter.map(|f| {
        let escaped = f.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        format!("%{escaped}%")
    })
}

#[async_trait]
impl UserDirectory for PostgresDirectory {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn find_user(&self, id: UserId) -> DirectoryResult<Option<UserRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user", e))?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_user", e))
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_name(&self, username: &str) -> DirectoryResult<Option<UserRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_name", e))?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_user_by_name", e))
    }

    #[instrument(skip(self, password_hash), err)]
    async fn create_user(&self, username: &str, password_hash: &str) -> DirectoryResult<UserRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING id, username, password_hash, created_at, updated_at
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;

        user_from_row(&row).map_err(|e| map_sqlx_error("create_user", e))
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn rename_user(&self, id: UserId, username: &str) -> DirectoryResult<()> {
        let result = sqlx::query("UPDATE users SET username = $2, updated_at = now() WHERE id = $1")
            .bind(id.get())
            .bind(username)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("rename_user", e))?;
        require_affected(result.rows_affected())
    }

    #[instrument(skip(self, password_hash), fields(user_id = %id), err)]
    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> DirectoryResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id.get())
            .bind(password_hash)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_password_hash", e))?;
        require_affected(result.rows_affected())
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete_user(&self, id: UserId) -> DirectoryResult<()> {
        // user_roles rows go with it (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        require_affected(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self, username_filter: Option<&str>, page: PageRequest) -> DirectoryResult<Page<UserRecord>> {
        let pattern = like_pattern(username_filter);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE ($1::text IS NULL OR username LIKE $1)")
            .bind(pattern.as_deref())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;

        let rows = match sql_window(page) {
            Some((limit, offset)) => sqlx::query(
                r#"
                SELECT id, username, password_hash, created_at, updated_at
                FROM users
                WHERE ($1::text IS NULL OR username LIKE $1)
                ORDER BY id ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(pattern.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?,
            None => Vec::new(),
        };

        Ok(Page {
            request: page,
            total: total.max(0) as u64,
            items: rows_into("list_users", rows, user_from_row)?,
        })
    }
}

#[async_trait]
impl ApplicationDirectory for PostgresDirectory {
    #[instrument(skip(self), fields(site = %site), err)]
    async fn applications_by_site(&self, site: &Origin) -> DirectoryResult<Vec<RegisteredApplication>> {
        let rows = sqlx::query("SELECT id, name, app_key, site, redirect FROM applications WHERE site = $1")
            .bind(site.as_str())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("applications_by_site", e))?;
        rows_into("applications_by_site", rows, application_from_row)
    }

    #[instrument(skip_all, err)]
    async fn applications_by_key(&self, app_key: &str) -> DirectoryResult<Vec<RegisteredApplication>> {
        let rows = sqlx::query("SELECT id, name, app_key, site, redirect FROM applications WHERE app_key = $1")
            .bind(app_key)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("applications_by_key", e))?;
        rows_into("applications_by_key", rows, application_from_row)
    }

    #[instrument(skip_all, fields(site = %new.site), err)]
    async fn create_application(&self, new: NewApplication) -> DirectoryResult<RegisteredApplication> {
        let row = sqlx::query(
            r#"
            INSERT INTO applications (name, app_key, site, redirect)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, app_key, site, redirect
            "#,
        )
        .bind(&new.name)
        .bind(new.app_key.expose())
        .bind(new.site.as_str())
        .bind(&new.redirect)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_application", e))?;

        application_from_row(&row).map_err(|e| map_sqlx_error("create_application", e))
    }

    #[instrument(skip_all, fields(application_id = %update.id), err)]
    async fn update_application(&self, update: ApplicationUpdate) -> DirectoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET name = $2, site = $3, redirect = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(update.id.get())
        .bind(&update.name)
        .bind(update.site.as_str())
        .bind(&update.redirect)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_application", e))?;
        require_affected(result.rows_affected())
    }

    #[instrument(skip(self), fields(application_id = %id), err)]
    async fn delete_application(&self, id: ApplicationId) -> DirectoryResult<()> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_application", e))?;
        require_affected(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn list_applications(
        &self,
        name_filter: Option<&str>,
        page: PageRequest,
    ) -> DirectoryResult<Page<RegisteredApplication>> {
        let pattern = like_pattern(name_filter);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applications WHERE ($1::text IS NULL OR name LIKE $1)")
            .bind(pattern.as_deref())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_applications", e))?;

        let rows = match sql_window(page) {
            Some((limit, offset)) => sqlx::query(
                r#"
                SELECT id, name, app_key, site, redirect
                FROM applications
                WHERE ($1::text IS NULL OR name LIKE $1)
                ORDER BY id ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(pattern.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_applications", e))?,
            None => Vec::new(),
        };

        Ok(Page {
            request: page,
            total: total.max(0) as u64,
            items: rows_into("list_applications", rows, application_from_row)?,
        })
    }
}

#[async_trait]
impl RoleDirectory for PostgresDirectory {
    #[instrument(skip(self), fields(user_id = %user), err)]
    async fn roles_for_user(&self, user: UserId) -> DirectoryResult<Vec<Role>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT r.name
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.id ASC
            "#,
        )
        .bind(user.get())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("roles_for_user", e))?;

        Ok(names.into_iter().map(Role::new).collect())
    }

    #[instrument(skip(self), fields(role = %role), err)]
    async fn ensure_role(&self, role: &Role, description: &str) -> DirectoryResult<RoleId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO roles (name, description)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(role.as_str())
        .bind(description)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_role", e))?;
        Ok(RoleId::new(id))
    }

    #[instrument(skip(self), fields(user_id = %user, role = %role), err)]
    async fn grant_role(&self, user: UserId, role: &Role) -> DirectoryResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            SELECT u.id, r.id
            FROM users u, roles r
            WHERE u.id = $1 AND r.name = $2
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user.get())
        .bind(role.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant_role", e))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing inserted: either already granted, or the user/role is missing.
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users u, roles r WHERE u.id = $1 AND r.name = $2
            )
            "#,
        )
        .bind(user.get())
        .bind(role.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant_role", e))?;

        if exists { Ok(()) } else { Err(DirectoryError::NotFound) }
    }

    #[instrument(skip(self), fields(user_id = %user, role = %role), err)]
    async fn revoke_role(&self, user: UserId, role: &Role) -> DirectoryResult<()> {
        sqlx::query(
            r#"
            DELETE FROM user_roles ur
            USING roles r
            WHERE ur.role_id = r.id AND ur.user_id = $1 AND r.name = $2
            "#,
        )
        .bind(user.get())
        .bind(role.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke_role", e))?;
        Ok(())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DirectoryError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => DirectoryError::Conflict(msg),
                Some("23503") => DirectoryError::NotFound,
                _ => {
                    tracing::error!(operation, error = %msg, "directory query failed");
                    DirectoryError::Unavailable(msg)
                }
            }
        }
        sqlx::Error::RowNotFound => DirectoryError::NotFound,
        other => {
            tracing::error!(operation, error = %other, "directory backend unavailable");
            DirectoryError::Unavailable(format!("{operation}: {other}"))
        }
    }
}

/// `LIMIT`/`OFFSET` for `page`, or `None` when the offset does not fit a BIGINT
/// (such a page is past the end of any table).
fn sql_window(page: PageRequest) -> Option<(i64, i64)> {
    let offset = i64::try_from(page.offset()).ok()?;
    Some((i64::from(page.page_size), offset))
}
