use tollgate_auth::{SessionClaims, TokenKind};
use tollgate_core::UserId;

/// Verified central session attached to a request by the session middleware.
///
/// Immutable; handlers receive it as an extension and pass it on explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    user_id: UserId,
    claims: SessionClaims,
}

impl SessionContext {
    /// `None` unless these are session claims whose subject is a user id.
    pub fn from_claims(claims: SessionClaims) -> Option<Self> {
        if claims.kind() != TokenKind::Session {
            return None;
        }
        let user_id = claims.subject().parse().ok()?;
        Some(Self { user_id, claims })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }
}
