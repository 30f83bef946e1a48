//! Service wiring: signing key, directories, ticket store, orchestrator, gate.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use tollgate_auth::{ExpiryPolicy, SessionIssuer, hash_password, verify_password};
use tollgate_infra::config::{DirectoryBackend, SigningConfig, TicketBackend, TollgateConfig};
use tollgate_infra::directory::{
    ApplicationDirectory, InMemoryDirectory, PostgresDirectory, RoleDirectory, UserDirectory,
};
use tollgate_infra::tickets::{InMemoryTicketStore, TicketBroker, TicketStore};
use tollgate_infra::{SsoOrchestrator, bootstrap};

use crate::app::errors::ApiError;
use crate::app::response::MessageCode;
use crate::authz::AuthorizationGate;

pub struct AppServices {
    sso: SsoOrchestrator,
    users: Arc<dyn UserDirectory>,
    applications: Arc<dyn ApplicationDirectory>,
    roles: Arc<dyn RoleDirectory>,
    gate: AuthorizationGate,
    cookie_secure: bool,
    memory_tickets: Option<Arc<InMemoryTicketStore>>,
}

struct Directories {
    users: Arc<dyn UserDirectory>,
    applications: Arc<dyn ApplicationDirectory>,
    roles: Arc<dyn RoleDirectory>,
}

impl Directories {
    fn in_memory() -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        Self {
            users: directory.clone(),
            applications: directory.clone(),
            roles: directory,
        }
    }

    fn postgres(directory: PostgresDirectory) -> Self {
        let directory = Arc::new(directory);
        Self {
            users: directory.clone(),
            applications: directory.clone(),
            roles: directory,
        }
    }
}

impl AppServices {
    /// Wire everything from captured configuration. Fails fast on unreachable backends.
    pub async fn from_config(config: &TollgateConfig) -> Result<Self> {
        let issuer = load_issuer(&config.signing)?;
        let policy = config.session.expiry_policy()?;

        let directories = match config.directory.backend {
            DirectoryBackend::Memory => {
                tracing::warn!("using the in-memory directory; accounts are lost on restart");
                Directories::in_memory()
            }
            DirectoryBackend::Postgres => Directories::postgres(connect_postgres(config).await?),
        };

        let memory_tickets = match config.tickets.backend {
            TicketBackend::Memory => Some(Arc::new(InMemoryTicketStore::new())),
            TicketBackend::Redis => None,
        };
        let store: Arc<dyn TicketStore> = match &memory_tickets {
            Some(store) => store.clone(),
            None => redis_store(config).await?,
        };
        tracing::info!(backend = store.backend(), ttl_secs = config.tickets.ttl.as_secs(), "ticket store ready");

        let mut services = Self::assemble(issuer, policy, store, config.tickets.ttl, directories)?;
        services.memory_tickets = memory_tickets;
        services.cookie_secure = config.session.cookie_secure;
        Ok(services)
    }

    /// Everything in memory; used by tests and local development.
    pub fn in_memory(issuer: SessionIssuer, policy: ExpiryPolicy, ticket_ttl: Duration) -> Result<Self> {
        let store = Arc::new(InMemoryTicketStore::new());
        let mut services = Self::assemble(issuer, policy, store.clone(), ticket_ttl, Directories::in_memory())?;
        services.memory_tickets = Some(store);
        Ok(services)
    }

    fn assemble(
        issuer: SessionIssuer,
        policy: ExpiryPolicy,
        store: Arc<dyn TicketStore>,
        ticket_ttl: Duration,
        directories: Directories,
    ) -> Result<Self> {
        let broker = TicketBroker::new(store, ticket_ttl).context("ticket broker")?;
        let sso = SsoOrchestrator::new(
            Arc::new(issuer),
            broker,
            directories.users.clone(),
            directories.applications.clone(),
            policy,
        );
        Ok(Self {
            sso,
            gate: AuthorizationGate::new(directories.roles.clone()),
            users: directories.users,
            applications: directories.applications,
            roles: directories.roles,
            cookie_secure: false,
            memory_tickets: None,
        })
    }

    /// Seed the `admin` role and the configured bootstrap administrator.
    pub async fn bootstrap(&self, config: &TollgateConfig) -> Result<()> {
        bootstrap::ensure_admin(self.users.as_ref(), self.roles.as_ref(), config.bootstrap.as_ref())
            .await
            .context("bootstrap admin (has `tollgate migrate` been run?)")?;
        Ok(())
    }

    pub fn sso(&self) -> &SsoOrchestrator {
        &self.sso
    }

    pub fn issuer(&self) -> &SessionIssuer {
        self.sso.issuer()
    }

    pub fn users(&self) -> &dyn UserDirectory {
        self.users.as_ref()
    }

    pub fn applications(&self) -> &dyn ApplicationDirectory {
        self.applications.as_ref()
    }

    pub fn roles(&self) -> &dyn RoleDirectory {
        self.roles.as_ref()
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    /// The in-memory ticket store, when that backend is active (for the expiry reaper).
    pub fn memory_tickets(&self) -> Option<Arc<InMemoryTicketStore>> {
        self.memory_tickets.clone()
    }

    pub async fn hash_password(&self, password: &str) -> Result<String, ApiError> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ApiError::internal("password hashing", MessageCode::DatabaseError, e))?
            .map_err(|_| ApiError::bind())
    }

    pub async fn verify_password(&self, hash: &str, password: &str) -> Result<bool, ApiError> {
        let (hash, password) = (hash.to_string(), password.to_string());
        tokio::task::spawn_blocking(move || verify_password(&hash, &password))
            .await
            .map_err(|e| ApiError::internal("password check", MessageCode::DatabaseError, e))
    }
}

pub fn load_issuer(signing: &SigningConfig) -> Result<SessionIssuer> {
    let pem = fs::read_to_string(&signing.private_key_path)
        .with_context(|| format!("read signing key {}", signing.private_key_path.display()))?;
    let mut issuer = SessionIssuer::from_private_key_pem(&pem).context("load signing key")?;
    if let Some(path) = &signing.public_key_path {
        let public = fs::read_to_string(path).with_context(|| format!("read public key {}", path.display()))?;
        issuer = issuer.with_public_key_pem(&public).context("load public key")?;
    }
    Ok(issuer.with_leeway(signing.leeway_secs))
}

pub async fn connect_postgres(config: &TollgateConfig) -> Result<PostgresDirectory> {
    let Some(url) = config.directory.database_url.as_deref() else {
        bail!("the postgres directory backend requires TOLLGATE_DATABASE_URL");
    };
    PostgresDirectory::connect(url, config.directory.max_connections, config.directory.acquire_timeout)
        .await
        .context("connect to postgres")
}

#[cfg(feature = "redis")]
async fn redis_store(config: &TollgateConfig) -> Result<Arc<dyn TicketStore>> {
    use tollgate_infra::tickets::RedisTicketStore;

    let tickets = &config.tickets;
    let store = RedisTicketStore::new(&tickets.redis_url, tickets.take_mode, tickets.timeout)
        .context("redis ticket store")?;
    let pinger = store.clone();
    tokio::task::spawn_blocking(move || pinger.ping())
        .await
        .context("redis ping task")?
        .context("ping redis")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn redis_store(_config: &TollgateConfig) -> Result<Arc<dyn TicketStore>> {
    bail!("the redis ticket backend requires building with the `redis` feature")
}
