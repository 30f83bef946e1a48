//! Cross-domain handoff orchestration.
//!
//! `login` mints the central session. `initiate_handoff` turns a valid session
//! plus the URL the browser wants to reach into a redirect carrying a one-time
//! ticket. `verify_handoff` lets the application backend trade that ticket (and
//! its application key) for a scoped token.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use url::Url;

use tollgate_auth::{ExpiryPolicy, SessionClaims, SessionIssuer, SigningError, verify_password};
use tollgate_core::{ApplicationId, Origin, RegisteredApplication, UserId, UserIdentity, parse_redirect_target};

use crate::directory::{ApplicationDirectory, DirectoryError, UserDirectory};
use crate::tickets::{TicketBroker, TicketError, TicketToken};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SsoError {
    #[error("bad redirect url: {0}")]
    BadRedirectUrl(String),

    #[error("no application registered for this site")]
    ApplicationNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("incorrect username or password")]
    IncorrectPassword,

    #[error("invalid application key")]
    InvalidApplicationKey,

    #[error("invalid or expired ticket")]
    InvalidOrExpiredTicket,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

impl From<DirectoryError> for SsoError {
    fn from(err: DirectoryError) -> Self {
        tracing::error!(error = %err, "directory lookup failed during handoff");
        SsoError::UpstreamUnavailable(err.to_string())
    }
}

/// A freshly minted central session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
    pub user: UserIdentity,
}

/// Where to send the browser after a successful handoff initiation.
#[derive(Debug, Clone)]
pub struct HandoffRedirect {
    pub url: Url,
    pub ticket: TicketToken,
    pub application: ApplicationId,
}

/// Credential returned to an application backend.
#[derive(Debug, Clone)]
pub struct ScopedToken {
    pub token: String,
    pub claims: SessionClaims,
}

pub struct SsoOrchestrator {
    issuer: Arc<SessionIssuer>,
    broker: TicketBroker,
    users: Arc<dyn UserDirectory>,
    applications: Arc<dyn ApplicationDirectory>,
    policy: ExpiryPolicy,
}

impl SsoOrchestrator {
    pub fn new(
        issuer: Arc<SessionIssuer>,
        broker: TicketBroker,
        users: Arc<dyn UserDirectory>,
        applications: Arc<dyn ApplicationDirectory>,
        policy: ExpiryPolicy,
    ) -> Self {
        Self {
            issuer,
            broker,
            users,
            applications,
            policy,
        }
    }

    pub fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    pub fn policy(&self) -> &ExpiryPolicy {
        &self.policy
    }

    /// Check a username/password pair and mint a session whose subject is the user id.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedSession, SsoError> {
        let Some(user) = self.users.find_user_by_name(username).await? else {
            tracing::info!(username, "login for unknown user");
            return Err(SsoError::IncorrectPassword);
        };

        let hash = user.password_hash.clone();
        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&hash, &password))
            .await
            .map_err(|e| SsoError::UpstreamUnavailable(format!("password check failed: {e}")))?;
        if !matches {
            tracing::info!(user_id = %user.id, "login with incorrect password");
            return Err(SsoError::IncorrectPassword);
        }

        let session = self.mint_session(user.identity())?;
        tracing::info!(user_id = %user.id, "session issued");
        Ok(session)
    }

    /// Sign a session token for an already authenticated user.
    pub fn mint_session(&self, user: UserIdentity) -> Result<IssuedSession, SsoError> {
        let claims = self.policy.session_claims(user.id.to_string(), Utc::now());
        let token = self.issuer.sign(&claims)?;
        Ok(IssuedSession { token, claims, user })
    }

    /// `session` must already have passed signature and expiry checks.
    pub async fn initiate_handoff(&self, session: &SessionClaims, requested_redirect: &str) -> Result<HandoffRedirect, SsoError> {
        let origin = Origin::parse(requested_redirect).map_err(|e| SsoError::BadRedirectUrl(e.to_string()))?;

        let app = self.application_for_site(&origin).await?;

        let user_id: UserId = session.subject().parse().map_err(|_| {
            tracing::warn!(subject = session.subject(), "session subject is not a user id");
            SsoError::UserNotFound
        })?;
        let user = self.users.find_user(user_id).await?.ok_or(SsoError::UserNotFound)?;

        let ticket = self.broker.issue(user.identity()).await.map_err(ticket_error)?;

        let mut url = parse_redirect_target(&app.redirect).map_err(|e| {
            tracing::error!(application_id = %app.id, error = %e, "registered redirect is not a valid url");
            SsoError::UpstreamUnavailable(e.to_string())
        })?;
        url.query_pairs_mut()
            .append_pair("redirect", requested_redirect)
            .append_pair("ticket", ticket.as_str());

        tracing::info!(application_id = %app.id, user_id = %user.id, site = %origin, "handoff initiated");
        Ok(HandoffRedirect {
            url,
            ticket,
            application: app.id,
        })
    }

    pub async fn verify_handoff(&self, application_key: &str, ticket: &str) -> Result<ScopedToken, SsoError> {
        if application_key.is_empty() {
            return Err(SsoError::InvalidApplicationKey);
        }
        let apps = self.applications.applications_by_key(application_key).await?;
        let [app] = apps.as_slice() else {
            tracing::warn!(matches = apps.len(), "application key did not identify exactly one application");
            return Err(SsoError::InvalidApplicationKey);
        };

        let subject = self.broker.redeem(ticket).await.map_err(ticket_error)?;

        let claims = self.policy.scoped_claims(subject.username.clone(), Utc::now());
        let token = self.issuer.sign(&claims)?;

        tracing::info!(application_id = %app.id, user_id = %subject.id, "handoff verified");
        Ok(ScopedToken { token, claims })
    }

    async fn application_for_site(&self, origin: &Origin) -> Result<RegisteredApplication, SsoError> {
        let mut apps = self.applications.applications_by_site(origin).await?;
        if apps.len() != 1 {
            tracing::warn!(site = %origin, matches = apps.len(), "site did not identify exactly one application");
            return Err(SsoError::ApplicationNotFound);
        }
        apps.pop().ok_or(SsoError::ApplicationNotFound)
    }
}

fn ticket_error(err: TicketError) -> SsoError {
    match err {
        TicketError::NotFound => SsoError::InvalidOrExpiredTicket,
        other => SsoError::UpstreamUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tollgate_auth::hash_password;
    use tollgate_core::AppKey;

    use super::*;
    use crate::directory::{InMemoryDirectory, NewApplication};
    use crate::tickets::InMemoryTicketStore;

    const PRIVATE_KEY: &str = include_str!("../../auth/testdata/private.rsa");

    struct Fixture {
        sso: SsoOrchestrator,
        directory: Arc<InMemoryDirectory>,
        issuer: Arc<SessionIssuer>,
    }

    fn fixture(ticket_ttl: Duration) -> Fixture {
        let issuer = Arc::new(SessionIssuer::from_private_key_pem(PRIVATE_KEY).unwrap());
        let directory = Arc::new(InMemoryDirectory::new());
        let broker = TicketBroker::new(Arc::new(InMemoryTicketStore::new()), ticket_ttl).unwrap();
        let sso = SsoOrchestrator::new(
            issuer.clone(),
            broker,
            directory.clone(),
            directory.clone(),
            ExpiryPolicy::default(),
        );
        Fixture { sso, directory, issuer }
    }

    async fn register(dir: &InMemoryDirectory, site: &str, key: &str) -> RegisteredApplication {
        dir.create_application(NewApplication {
            name: "app".into(),
            app_key: AppKey::new(key),
            site: Origin::parse(site).unwrap(),
            redirect: format!("{site}/sso/callback"),
        })
        .await
        .unwrap()
    }

    fn query_param(url: &Url, name: &str) -> Option<String> {
        url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn login_with_correct_password_mints_user_id_session() {
        let f = fixture(Duration::from_secs(60));
        let bob = f.directory.create_user("bob", &hash_password("pw").unwrap()).await.unwrap();

        let session = f.sso.login("bob", "pw").await.unwrap();
        let claims = f.issuer.verify(&session.token).unwrap();
        assert_eq!(claims.sub, bob.id.to_string());
        assert_eq!(claims, session.claims);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let f = fixture(Duration::from_secs(60));
        f.directory.create_user("bob", &hash_password("pw").unwrap()).await.unwrap();

        assert_eq!(f.sso.login("bob", "wrong").await.unwrap_err(), SsoError::IncorrectPassword);
        assert_eq!(f.sso.login("nobody", "pw").await.unwrap_err(), SsoError::IncorrectPassword);
    }

    #[tokio::test]
    async fn full_handoff_yields_scoped_token_for_username() {
        let f = fixture(Duration::from_secs(60));
        let bob = f.directory.create_user("bob", "unused").await.unwrap();
        let app = register(&f.directory, "https://a.example", "key-a").await;
        let session = f.sso.mint_session(bob.identity()).unwrap();

        let requested = "https://a.example/dashboard?tab=1";
        let redirect = f.sso.initiate_handoff(&session.claims, requested).await.unwrap();
        assert_eq!(redirect.application, app.id);
        assert!(redirect.url.as_str().starts_with("https://a.example/sso/callback?"));
        assert_eq!(query_param(&redirect.url, "redirect").as_deref(), Some(requested));
        let ticket = query_param(&redirect.url, "ticket").unwrap();
        assert_eq!(ticket, redirect.ticket.as_str());

        let scoped = f.sso.verify_handoff("key-a", &ticket).await.unwrap();
        let claims = f.issuer.verify(&scoped.token).unwrap();
        assert_eq!(claims.sub, "bob");
        assert_eq!(claims.expires_at - claims.issued_at, chrono::Duration::hours(1));

        let replay = f.sso.verify_handoff("key-a", &ticket).await.unwrap_err();
        assert_eq!(replay, SsoError::InvalidOrExpiredTicket);
    }

    #[tokio::test]
    async fn unregistered_site_is_application_not_found() {
        let f = fixture(Duration::from_secs(60));
        let bob = f.directory.create_user("bob", "unused").await.unwrap();
        register(&f.directory, "https://a.example", "key-a").await;
        let session = f.sso.mint_session(bob.identity()).unwrap();

        let err = f
            .sso
            .initiate_handoff(&session.claims, "https://other.example/")
            .await
            .unwrap_err();
        assert_eq!(err, SsoError::ApplicationNotFound);
    }

    #[tokio::test]
    async fn unparseable_redirect_is_rejected() {
        let f = fixture(Duration::from_secs(60));
        let bob = f.directory.create_user("bob", "unused").await.unwrap();
        let session = f.sso.mint_session(bob.identity()).unwrap();

        for bad in ["not a url", "/relative/path", ""] {
            let err = f.sso.initiate_handoff(&session.claims, bad).await.unwrap_err();
            assert!(matches!(err, SsoError::BadRedirectUrl(_)), "{bad:?} -> {err:?}");
        }
    }

    #[tokio::test]
    async fn deleted_user_cannot_start_handoff() {
        let f = fixture(Duration::from_secs(60));
        let bob = f.directory.create_user("bob", "unused").await.unwrap();
        register(&f.directory, "https://a.example", "key-a").await;
        let session = f.sso.mint_session(bob.identity()).unwrap();
        f.directory.delete_user(bob.id).await.unwrap();

        let err = f
            .sso
            .initiate_handoff(&session.claims, "https://a.example/")
            .await
            .unwrap_err();
        assert_eq!(err, SsoError::UserNotFound);
    }

    #[tokio::test]
    async fn non_numeric_subject_is_user_not_found() {
        let f = fixture(Duration::from_secs(60));
        register(&f.directory, "https://a.example", "key-a").await;
        let scoped = ExpiryPolicy::default().scoped_claims("bob", Utc::now());

        let err = f.sso.initiate_handoff(&scoped, "https://a.example/").await.unwrap_err();
        assert_eq!(err, SsoError::UserNotFound);
    }

    #[tokio::test]
    async fn wrong_application_key_is_rejected_before_redeeming() {
        let f = fixture(Duration::from_secs(60));
        let bob = f.directory.create_user("bob", "unused").await.unwrap();
        register(&f.directory, "https://a.example", "key-a").await;
        let session = f.sso.mint_session(bob.identity()).unwrap();
        let redirect = f.sso.initiate_handoff(&session.claims, "https://a.example/").await.unwrap();

        assert_eq!(
            f.sso.verify_handoff("key-z", redirect.ticket.as_str()).await.unwrap_err(),
            SsoError::InvalidApplicationKey
        );
        assert_eq!(
            f.sso.verify_handoff("", redirect.ticket.as_str()).await.unwrap_err(),
            SsoError::InvalidApplicationKey
        );

        // The ticket survived the rejected attempts.
        assert!(f.sso.verify_handoff("key-a", redirect.ticket.as_str()).await.is_ok());
    }

    #[tokio::test]
    async fn expired_ticket_is_rejected() {
        let f = fixture(Duration::from_secs(1));
        let bob = f.directory.create_user("bob", "unused").await.unwrap();
        register(&f.directory, "https://a.example", "key-a").await;
        let session = f.sso.mint_session(bob.identity()).unwrap();
        let redirect = f.sso.initiate_handoff(&session.claims, "https://a.example/").await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            f.sso.verify_handoff("key-a", redirect.ticket.as_str()).await.unwrap_err(),
            SsoError::InvalidOrExpiredTicket
        );
    }

    #[tokio::test]
    async fn existing_redirect_query_is_preserved() {
        let f = fixture(Duration::from_secs(60));
        let bob = f.directory.create_user("bob", "unused").await.unwrap();
        f.directory
            .create_application(NewApplication {
                name: "b".into(),
                app_key: AppKey::new("key-b"),
                site: Origin::parse("https://b.example").unwrap(),
                redirect: "https://b.example/cb?lang=en".into(),
            })
            .await
            .unwrap();
        let session = f.sso.mint_session(bob.identity()).unwrap();

        let redirect = f.sso.initiate_handoff(&session.claims, "https://b.example/x").await.unwrap();
        assert_eq!(query_param(&redirect.url, "lang").as_deref(), Some("en"));
        assert!(query_param(&redirect.url, "ticket").is_some());
    }
}
