use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which credential a token is. Carried as the `aud` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Central session delivered in the cookie.
    Session,
    /// Token handed to an application backend after ticket redemption.
    Scoped,
}

impl TokenKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TokenKind::Session => "session",
            TokenKind::Scoped => "scoped",
        }
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims carried by every token the authority signs.
///
/// Serialized with the registered JWT names (`sub`, `aud`, `iat`, `exp`) at second
/// granularity, so a decoded token compares equal to the claims it was signed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject: the user id for session tokens, the username for scoped tokens.
    pub sub: String,

    #[serde(rename = "aud")]
    pub kind: TokenKind,

    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Claims of `kind` for `subject`, valid from `now` for `ttl`.
    pub fn new(kind: TokenKind, subject: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let issued_at = now.trunc_subsecs(0);
        Self {
            sub: subject.into(),
            kind,
            issued_at,
            expires_at: issued_at + ttl,
        }
    }

    pub fn subject(&self) -> &str {
        &self.sub
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }
}

/// How long each kind of credential lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    /// Lifetime of the cookie-delivered session token.
    pub session_ttl: Duration,
    /// Lifetime of the token handed to an application backend after redemption.
    pub scoped_token_ttl: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            session_ttl: Duration::days(365),
            scoped_token_ttl: Duration::hours(1),
        }
    }
}

impl ExpiryPolicy {
    pub fn session_claims(&self, subject: impl Into<String>, now: DateTime<Utc>) -> SessionClaims {
        SessionClaims::new(TokenKind::Session, subject, now, self.session_ttl)
    }

    pub fn scoped_claims(&self, subject: impl Into<String>, now: DateTime<Utc>) -> SessionClaims {
        SessionClaims::new(TokenKind::Scoped, subject, now, self.scoped_token_ttl)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time window of a set of claims.
///
/// Signature verification and decoding live in [`crate::SessionIssuer`].
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.expires_at <= claims.issued_at {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now >= claims.expires_at {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_serialize_as_registered_names() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let claims = SessionClaims::new(TokenKind::Session, "7", now, Duration::seconds(60));
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["sub"], "7");
        assert_eq!(json["aud"], "session");
        assert_eq!(json["iat"], 1_700_000_000_i64);
        assert_eq!(json["exp"], 1_700_000_060_i64);
    }

    #[test]
    fn claims_are_truncated_to_seconds() {
        let now = DateTime::from_timestamp(1_700_000_000, 999_000_000).unwrap();
        let claims = SessionClaims::new(TokenKind::Session, "7", now, Duration::seconds(1));
        assert_eq!(claims.issued_at.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn default_policy_is_one_year_session_one_hour_scoped() {
        let policy = ExpiryPolicy::default();
        let now = Utc::now();
        let session = policy.session_claims("1", now);
        let scoped = policy.scoped_claims("bob", now);
        assert_eq!(session.expires_at - session.issued_at, Duration::days(365));
        assert_eq!(scoped.expires_at - scoped.issued_at, Duration::hours(1));
        assert_eq!(session.kind(), TokenKind::Session);
        assert_eq!(scoped.kind(), TokenKind::Scoped);
    }

    #[test]
    fn validate_rejects_expired_and_inverted_windows() {
        let now = Utc::now();
        let claims = SessionClaims::new(TokenKind::Session, "1", now, Duration::seconds(10));
        assert_eq!(validate_claims(&claims, now), Ok(()));
        assert_eq!(
            validate_claims(&claims, now + Duration::seconds(11)),
            Err(TokenValidationError::Expired)
        );

        let inverted = SessionClaims::new(TokenKind::Session, "1", now, Duration::seconds(-5));
        assert_eq!(
            validate_claims(&inverted, now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }
}
