//! Process configuration, captured once at startup.
//!
//! Values come from `TOLLGATE_*` environment variables and may be overridden by a
//! YAML file named by `TOLLGATE_CONFIG`. Components receive the parts they need
//! as plain values; nothing re-reads the environment after startup.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use tollgate_auth::ExpiryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TollgateConfig {
    pub bind_addr: SocketAddr,
    pub signing: SigningConfig,
    pub session: SessionConfig,
    pub tickets: TicketConfig,
    pub directory: DirectoryConfig,
    pub bootstrap: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningConfig {
    pub private_key_path: PathBuf,
    pub public_key_path: Option<PathBuf>,
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub session_ttl: Duration,
    pub scoped_token_ttl: Duration,
    pub cookie_secure: bool,
}

impl SessionConfig {
    pub fn expiry_policy(&self) -> Result<ExpiryPolicy> {
        Ok(ExpiryPolicy {
            session_ttl: chrono::Duration::from_std(self.session_ttl).context("session ttl out of range")?,
            scoped_token_ttl: chrono::Duration::from_std(self.scoped_token_ttl)
                .context("scoped token ttl out of range")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketConfig {
    pub ttl: Duration,
    pub backend: TicketBackend,
    pub redis_url: String,
    pub take_mode: RedisTakeMode,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketBackend {
    Memory,
    Redis,
}

/// How the Redis store removes a ticket while reading it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisTakeMode {
    /// `GETDEL` (Redis 6.2+).
    GetDel,
    /// A server-side `GET` + `DEL` script, for older servers.
    Script,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub backend: DirectoryBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryBackend {
    Memory,
    Postgres,
}

/// Administrator account ensured at startup / migration.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

impl core::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            signing: SigningConfig {
                private_key_path: PathBuf::from("private.rsa"),
                public_key_path: None,
                leeway_secs: 0,
            },
            session: SessionConfig {
                session_ttl: Duration::from_secs(365 * 24 * 60 * 60),
                scoped_token_ttl: Duration::from_secs(60 * 60),
                cookie_secure: false,
            },
            tickets: TicketConfig {
                ttl: Duration::from_secs(60),
                backend: TicketBackend::Memory,
                redis_url: "redis://127.0.0.1:6379".to_string(),
                take_mode: RedisTakeMode::GetDel,
                timeout: Duration::from_millis(2000),
            },
            directory: DirectoryConfig {
                backend: DirectoryBackend::Memory,
                database_url: None,
                max_connections: 10,
                acquire_timeout: Duration::from_millis(3000),
            },
            bootstrap: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigOverride {
    bind_addr: Option<String>,
    signing: Option<SigningOverride>,
    session: Option<SessionOverride>,
    tickets: Option<TicketOverride>,
    directory: Option<DirectoryOverride>,
    bootstrap: Option<BootstrapOverride>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SigningOverride {
    private_key_path: Option<PathBuf>,
    public_key_path: Option<PathBuf>,
    leeway_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionOverride {
    session_ttl_secs: Option<u64>,
    scoped_token_ttl_secs: Option<u64>,
    cookie_secure: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TicketOverride {
    ttl_secs: Option<u64>,
    backend: Option<String>,
    redis_url: Option<String>,
    take_mode: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DirectoryOverride {
    backend: Option<String>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BootstrapOverride {
    username: Option<String>,
    password: Option<String>,
}

impl TollgateConfig {
    /// Environment first, then the YAML file named by `TOLLGATE_CONFIG` (if any).
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::from_env_lookup(&lookup)?;
        if let Some(path) = lookup("TOLLGATE_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read TOLLGATE_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn from_env_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("TOLLGATE_BIND") {
            config.bind_addr = v.parse().with_context(|| "parse TOLLGATE_BIND")?;
        }
        if let Some(v) = lookup("TOLLGATE_SIGNING_KEY") {
            config.signing.private_key_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TOLLGATE_PUBLIC_KEY") {
            config.signing.public_key_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TOLLGATE_TOKEN_LEEWAY_SECS") {
            config.signing.leeway_secs = v.parse().with_context(|| "parse TOLLGATE_TOKEN_LEEWAY_SECS")?;
        }
        if let Some(v) = lookup("TOLLGATE_SESSION_TTL_SECS") {
            config.session.session_ttl = secs(&v).with_context(|| "parse TOLLGATE_SESSION_TTL_SECS")?;
        }
        if let Some(v) = lookup("TOLLGATE_SCOPED_TOKEN_TTL_SECS") {
            config.session.scoped_token_ttl =
                secs(&v).with_context(|| "parse TOLLGATE_SCOPED_TOKEN_TTL_SECS")?;
        }
        if let Some(v) = lookup("TOLLGATE_COOKIE_SECURE") {
            config.session.cookie_secure = parse_bool(&v).with_context(|| "parse TOLLGATE_COOKIE_SECURE")?;
        }
        if let Some(v) = lookup("TOLLGATE_TICKET_TTL_SECS") {
            config.tickets.ttl = secs(&v).with_context(|| "parse TOLLGATE_TICKET_TTL_SECS")?;
        }
        if let Some(v) = lookup("TOLLGATE_TICKET_BACKEND") {
            config.tickets.backend = parse_ticket_backend(&v)?;
        }
        if let Some(v) = lookup("TOLLGATE_REDIS_URL") {
            config.tickets.redis_url = v;
        }
        if let Some(v) = lookup("TOLLGATE_REDIS_TAKE_MODE") {
            config.tickets.take_mode = parse_take_mode(&v)?;
        }
        if let Some(v) = lookup("TOLLGATE_REDIS_TIMEOUT_MS") {
            config.tickets.timeout = millis(&v).with_context(|| "parse TOLLGATE_REDIS_TIMEOUT_MS")?;
        }
        if let Some(v) = lookup("TOLLGATE_DIRECTORY_BACKEND") {
            config.directory.backend = parse_directory_backend(&v)?;
        }
        if let Some(v) = lookup("TOLLGATE_DATABASE_URL") {
            config.directory.database_url = Some(v);
        }
        if let Some(v) = lookup("TOLLGATE_DB_MAX_CONNECTIONS") {
            config.directory.max_connections = v.parse().with_context(|| "parse TOLLGATE_DB_MAX_CONNECTIONS")?;
        }
        if let Some(v) = lookup("TOLLGATE_DB_ACQUIRE_TIMEOUT_MS") {
            config.directory.acquire_timeout =
                millis(&v).with_context(|| "parse TOLLGATE_DB_ACQUIRE_TIMEOUT_MS")?;
        }
        config.bootstrap = bootstrap_from(lookup("TOLLGATE_BOOTSTRAP_ADMIN"), lookup("TOLLGATE_BOOTSTRAP_PASSWORD"))?;

        Ok(config)
    }

    /// Apply a YAML override document on top of the current values.
    pub fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let o: ConfigOverride = serde_yaml::from_str(contents).with_context(|| "parse tollgate config yaml")?;

        if let Some(v) = o.bind_addr {
            self.bind_addr = v.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(s) = o.signing {
            if let Some(v) = s.private_key_path {
                self.signing.private_key_path = v;
            }
            if s.public_key_path.is_some() {
                self.signing.public_key_path = s.public_key_path;
            }
            if let Some(v) = s.leeway_secs {
                self.signing.leeway_secs = v;
            }
        }
        if let Some(s) = o.session {
            if let Some(v) = s.session_ttl_secs {
                self.session.session_ttl = Duration::from_secs(v);
            }
            if let Some(v) = s.scoped_token_ttl_secs {
                self.session.scoped_token_ttl = Duration::from_secs(v);
            }
            if let Some(v) = s.cookie_secure {
                self.session.cookie_secure = v;
            }
        }
        if let Some(t) = o.tickets {
            if let Some(v) = t.ttl_secs {
                self.tickets.ttl = Duration::from_secs(v);
            }
            if let Some(v) = t.backend {
                self.tickets.backend = parse_ticket_backend(&v)?;
            }
            if let Some(v) = t.redis_url {
                self.tickets.redis_url = v;
            }
            if let Some(v) = t.take_mode {
                self.tickets.take_mode = parse_take_mode(&v)?;
            }
            if let Some(v) = t.timeout_ms {
                self.tickets.timeout = Duration::from_millis(v);
            }
        }
        if let Some(d) = o.directory {
            if let Some(v) = d.backend {
                self.directory.backend = parse_directory_backend(&v)?;
            }
            if d.database_url.is_some() {
                self.directory.database_url = d.database_url;
            }
            if let Some(v) = d.max_connections {
                self.directory.max_connections = v;
            }
            if let Some(v) = d.acquire_timeout_ms {
                self.directory.acquire_timeout = Duration::from_millis(v);
            }
        }
        if let Some(b) = o.bootstrap {
            self.bootstrap = bootstrap_from(b.username, b.password)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.session_ttl.is_zero() {
            bail!("session ttl must be positive");
        }
        if self.session.scoped_token_ttl.is_zero() {
            bail!("scoped token ttl must be positive");
        }
        if self.tickets.ttl.is_zero() {
            bail!("ticket ttl must be positive");
        }
        if self.directory.backend == DirectoryBackend::Postgres && self.directory.database_url.is_none() {
            bail!("postgres directory backend requires TOLLGATE_DATABASE_URL");
        }
        if self.directory.max_connections == 0 {
            bail!("database pool needs at least one connection");
        }
        Ok(())
    }
}

fn secs(raw: &str) -> Result<Duration> {
    Ok(Duration::from_secs(raw.trim().parse()?))
}

fn millis(raw: &str) -> Result<Duration> {
    Ok(Duration::from_millis(raw.trim().parse()?))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}

fn parse_ticket_backend(raw: &str) -> Result<TicketBackend> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "memory" => Ok(TicketBackend::Memory),
        "redis" => Ok(TicketBackend::Redis),
        other => bail!("unknown ticket backend '{other}' (expected memory or redis)"),
    }
}

fn parse_take_mode(raw: &str) -> Result<RedisTakeMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "getdel" => Ok(RedisTakeMode::GetDel),
        "script" => Ok(RedisTakeMode::Script),
        other => bail!("unknown redis take mode '{other}' (expected getdel or script)"),
    }
}

fn parse_directory_backend(raw: &str) -> Result<DirectoryBackend> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "memory" => Ok(DirectoryBackend::Memory),
        "postgres" => Ok(DirectoryBackend::Postgres),
        other => bail!("unknown directory backend '{other}' (expected memory or postgres)"),
    }
}

fn bootstrap_from(username: Option<String>, password: Option<String>) -> Result<Option<BootstrapAdmin>> {
    match (username, password) {
        (Some(username), Some(password)) => Ok(Some(BootstrapAdmin { username, password })),
        (None, None) => Ok(None),
        _ => bail!("bootstrap admin needs both a username and a password"),
    }
}
