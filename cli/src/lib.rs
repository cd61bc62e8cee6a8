use anyhow::Context;
use backlink_catalog::Credentials;
use backlink_catalog::OpenLibraryClient;
use backlink_catalog::ReqwestTransport;
use backlink_config::BacklinkConfig;
use backlink_config::DEFAULT_CONFIG_FILE;
use backlink_core::FileWatcher;
use backlink_core::ReconcileWorker;
use backlink_core::Reconciler;
use backlink_server::ApiKeyFile;
use backlink_server::AppState;
use backlink_server::hash_api_key;
use backlink_state::WorkItemStore;
use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinError;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

pub const BOT_USER_ENV_VAR: &str = "BOT_USER";
pub const BOT_PASSWORD_ENV_VAR: &str = "BOT_PASSWORD";

/// Links catalog editions back to their archive items.
///
/// Without a subcommand, runs the ingestion endpoint and the reconcile loop
/// until interrupted.
#[derive(Debug, Parser)]
#[clap(author, version, bin_name = "backlink-bot")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        long,
        short = 'c',
        env = "BACKLINK_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the API key file line for KEY.
    HashKey {
        /// Plain API key, e.g. from `openssl rand -hex 32`.
        key: String,
    },
}

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::HashKey { key }) = cli.command {
        let line = hash_api_key(&key).context("failed to hash API key")?;
        println!("{line}");
        return Ok(());
    }

    init_tracing();
    let config = BacklinkConfig::load(&cli.config)?;
    info!(config = %cli.config.display(), "loaded configuration");
    run_bot(config).await
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}

fn credentials_from_env() -> Option<Credentials> {
    let username = std::env::var(BOT_USER_ENV_VAR).ok()?;
    let password = std::env::var(BOT_PASSWORD_ENV_VAR).ok()?;
    (!username.is_empty() && !password.is_empty()).then_some(Credentials { username, password })
}

enum Exit {
    Signal,
    Worker(anyhow::Result<()>),
    Server(Result<std::io::Result<()>, JoinError>),
}

/// Wire the store, catalog client, worker and HTTP endpoint together and
/// run until a shutdown signal or a fatal error.
pub async fn run_bot(config: BacklinkConfig) -> anyhow::Result<()> {
    let store = WorkItemStore::open(config.sqlite.clone()).await?;

    let credentials = credentials_from_env();
    if credentials.is_none() {
        warn!(
            "{BOT_USER_ENV_VAR} or {BOT_PASSWORD_ENV_VAR} is not set; catalog edits will fail"
        );
    }
    let catalog = OpenLibraryClient::new(
        ReqwestTransport::new(reqwest::Client::new()),
        &config.catalog.base_url,
        credentials,
    )
    .with_comment(config.catalog.comment.clone())
    .with_timeout(config.catalog.timeout());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to listen on {}", config.listen_addr))?;

    let reconciler = Reconciler::new(store.clone(), Arc::new(catalog), config.item_delay());
    let watcher = FileWatcher::new(config.watch_dir.clone());
    let mut worker = ReconcileWorker::new(reconciler, watcher, config.poll_interval()).spawn();
    let shutdown = worker.cancellation_token();

    let state = AppState::new(store, ApiKeyFile::new(config.api_key_file.clone()));
    let mut server = tokio::spawn(backlink_server::serve(listener, state, shutdown.clone()));

    let exit = tokio::select! {
        () = shutdown_signal() => Exit::Signal,
        result = worker.wait() => Exit::Worker(result),
        joined = &mut server => Exit::Server(joined),
    };

    let (worker_result, server_result) = match exit {
        Exit::Signal => {
            info!("shutdown requested; finishing the current item");
            shutdown.cancel();
            (worker.wait().await, server.await)
        }
        Exit::Worker(result) => {
            if let Err(err) = &result {
                error!("reconcile worker stopped: {err:#}");
            }
            shutdown.cancel();
            (result, server.await)
        }
        Exit::Server(joined) => {
            error!("http server exited before shutdown was requested");
            shutdown.cancel();
            (worker.wait().await, joined)
        }
    };

    server_result
        .context("http server task failed")?
        .context("http server failed")?;
    worker_result
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
