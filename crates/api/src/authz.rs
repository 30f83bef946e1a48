//! Role-resolving authorization gate for administrative routes.
//!
//! Role names come from the directory on every request; the decision itself is
//! the pure [`tollgate_auth::authorize`] rule.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use thiserror::Error;

use tollgate_auth::{AuthzError, Capability, authorize};
use tollgate_core::UserId;
use tollgate_infra::directory::RoleDirectory;

use crate::app::errors::ApiError;
use crate::app::response::MessageCode;
use crate::app::services::AppServices;
use crate::context::SessionContext;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error(transparent)]
    Denied(#[from] AuthzError),

    #[error("role lookup failed: {0}")]
    Upstream(String),
}

#[derive(Clone)]
pub struct AuthorizationGate {
    roles: Arc<dyn RoleDirectory>,
}

impl AuthorizationGate {
    pub fn new(roles: Arc<dyn RoleDirectory>) -> Self {
        Self { roles }
    }

    pub async fn authorize(&self, subject: UserId, capability: &Capability) -> Result<(), GateError> {
        let roles = self
            .roles
            .roles_for_user(subject)
            .await
            .map_err(|e| GateError::Upstream(e.to_string()))?;

        authorize(&roles, capability).inspect_err(|_| {
            tracing::info!(user_id = %subject, capability = %capability, "authorization denied");
        })?;
        Ok(())
    }
}

/// Admit only sessions holding [`Capability::ADMINISTRATOR`].
///
/// Runs after `require_session`.
pub async fn require_admin(
    State(services): State<Arc<AppServices>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(session) = req.extensions().get::<SessionContext>() else {
        return Err(ApiError::new(axum::http::StatusCode::UNAUTHORIZED, MessageCode::GetJwtError));
    };
    services
        .gate()
        .authorize(session.user_id(), &Capability::ADMINISTRATOR)
        .await?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tollgate_auth::Role;
    use tollgate_core::RoleId;
    use tollgate_infra::directory::{DirectoryError, DirectoryResult, InMemoryDirectory, UserDirectory};

    use super::*;

    struct DownRoles;

    #[async_trait]
    impl RoleDirectory for DownRoles {
        async fn roles_for_user(&self, _: UserId) -> DirectoryResult<Vec<Role>> {
            Err(DirectoryError::Unavailable("connection reset".into()))
        }

        async fn ensure_role(&self, _: &Role, _: &str) -> DirectoryResult<RoleId> {
            unreachable!()
        }

        async fn grant_role(&self, _: UserId, _: &Role) -> DirectoryResult<()> {
            unreachable!()
        }

        async fn revoke_role(&self, _: UserId, _: &Role) -> DirectoryResult<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn admin_allowed_viewer_and_roleless_denied() {
        let directory = Arc::new(InMemoryDirectory::new());
        let admin = directory.create_user("alice", "h").await.unwrap();
        let viewer = directory.create_user("bob", "h").await.unwrap();
        let nobody = directory.create_user("carol", "h").await.unwrap();
        directory.grant_role(admin.id, &Role::ADMIN).await.unwrap();
        directory.ensure_role(&Role::new("viewer"), "read only").await.unwrap();
        directory.grant_role(viewer.id, &Role::new("viewer")).await.unwrap();

        let gate = AuthorizationGate::new(directory);
        assert_eq!(gate.authorize(admin.id, &Capability::ADMINISTRATOR).await, Ok(()));
        assert!(matches!(
            gate.authorize(viewer.id, &Capability::ADMINISTRATOR).await,
            Err(GateError::Denied(_))
        ));
        assert!(matches!(
            gate.authorize(nobody.id, &Capability::ADMINISTRATOR).await,
            Err(GateError::Denied(_))
        ));
    }

    #[tokio::test]
    async fn directory_failure_is_upstream() {
        let gate = AuthorizationGate::new(Arc::new(DownRoles));
        assert!(matches!(
            gate.authorize(UserId::new(1), &Capability::ADMINISTRATOR).await,
            Err(GateError::Upstream(_))
        ));
    }
}
