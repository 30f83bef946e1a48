//! Seeding the `admin` role and an optional administrator account.

use tollgate_auth::{Role, hash_password};
use tollgate_core::UserId;

use crate::config::BootstrapAdmin;
use crate::directory::{DirectoryError, RoleDirectory, UserDirectory};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("could not hash bootstrap password: {0}")]
    Password(String),
}

/// Make sure the `admin` role exists and, when configured, that the bootstrap
/// account exists and holds it. An existing account keeps its password.
pub async fn ensure_admin(
    users: &dyn UserDirectory,
    roles: &dyn RoleDirectory,
    admin: Option<&BootstrapAdmin>,
) -> Result<Option<UserId>, BootstrapError> {
    roles.ensure_role(&Role::ADMIN, "administrator").await?;

    let Some(admin) = admin else {
        return Ok(None);
    };

    let user = match users.find_user_by_name(&admin.username).await? {
        Some(user) => user,
        None => {
            let password = admin.password.clone();
            let hash = tokio::task::spawn_blocking(move || hash_password(&password))
                .await
                .map_err(|e| BootstrapError::Password(e.to_string()))?
                .map_err(|e| BootstrapError::Password(e.to_string()))?;
            let created = users.create_user(&admin.username, &hash).await?;
            tracing::info!(user_id = %created.id, username = %created.username, "bootstrap admin created");
            created
        }
    };

    roles.grant_role(user.id, &Role::ADMIN).await?;
    Ok(Some(user.id))
}
