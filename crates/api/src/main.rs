use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use tollgate_api::app::{AppServices, build_app, services};
use tollgate_infra::TollgateConfig;
use tollgate_infra::config::DirectoryBackend;
use tollgate_infra::tickets::InMemoryTicketStore;

#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about = "Cross-domain single sign-on authority")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Create the PostgreSQL schema and seed the admin role / bootstrap account.
    Migrate,
    /// Write a new RSA signing key (PKCS#1 PEM).
    Keygen {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 2048)]
        bits: usize,
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tollgate_observability::init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(TollgateConfig::load()?).await,
        Command::Migrate => migrate(TollgateConfig::load()?).await,
        Command::Keygen { out, bits, force } => keygen(&out, bits, force).await,
    }
}

async fn serve(config: TollgateConfig) -> Result<()> {
    let services = Arc::new(AppServices::from_config(&config).await?);
    services.bootstrap(&config).await?;

    if let Some(store) = services.memory_tickets() {
        spawn_ticket_reaper(store, config.tickets.ttl);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, build_app(services))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    tracing::info!("shut down");
    Ok(())
}

async fn migrate(config: TollgateConfig) -> Result<()> {
    if config.directory.backend != DirectoryBackend::Postgres {
        bail!("migrate requires TOLLGATE_DIRECTORY_BACKEND=postgres");
    }
    let directory = services::connect_postgres(&config).await?;
    directory.migrate().await.context("apply schema")?;

    let admin = tollgate_infra::bootstrap::ensure_admin(&directory, &directory, config.bootstrap.as_ref())
        .await
        .context("seed admin")?;
    match admin {
        Some(id) => tracing::info!(user_id = %id, "schema ready; bootstrap admin ensured"),
        None => tracing::info!("schema ready"),
    }
    Ok(())
}

async fn keygen(out: &Path, bits: usize, force: bool) -> Result<()> {
    if out.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", out.display());
    }
    let pem = tokio::task::spawn_blocking(move || tollgate_auth::generate_private_key_pem(bits))
        .await
        .context("key generation task")??;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(out)
        .with_context(|| format!("open {}", out.display()))?;
    file.write_all(pem.as_bytes())
        .with_context(|| format!("write {}", out.display()))?;
    tracing::info!(path = %out.display(), bits, "signing key written");
    Ok(())
}

/// Drop expired in-memory tickets; redemption already ignores them.
fn spawn_ticket_reaper(store: Arc<InMemoryTicketStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.purge_expired()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(purged)) => tracing::debug!(purged, "expired tickets purged"),
                Ok(Err(e)) => tracing::warn!(error = %e, "ticket purge failed"),
                Err(e) => tracing::warn!(error = %e, "ticket purge task failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
