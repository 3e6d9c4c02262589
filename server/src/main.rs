// Cartable Server - Main Entry Point
//
// This file contains only the application bootstrap logic, CLI commands,
// and initialization. All handlers, routes, and business logic are in separate modules.

pub use cartable_server::*;

use anyhow::Context;
use cartable_core::{config::AppConfig, db::Database};
use clap::{Parser, Subcommand};
use dotenvy::{Error as DotenvError, dotenv, from_filename};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use cartable_server::auth::{TokenIssuer, resolve_auth_secret};

#[derive(Parser, Debug)]
#[command(author, version, about = "Cartable realtime server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP and socket server
    Serve,
    /// Run database migrations
    Migrate,
    /// Issue a signed access token for a user
    IssueToken {
        /// Subject user ID
        user_id: String,
        /// Role claim (e.g. student, teacher, admin)
        #[arg(long, default_value = "student")]
        role: String,
        /// Token lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_status = load_env_file();
    observability::init_tracing();
    report_env_status(&env_status);

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(config).await,
        Command::Migrate => run_migrate(config).await,
        Command::IssueToken { user_id, role, ttl } => run_issue_token(config, user_id, role, ttl),
    }
}

async fn run_serve(config: AppConfig) -> anyhow::Result<()> {
    info!(
        database_path = %config.database_path,
        "Starting server with database configuration"
    );
    let database = Database::connect(&config).await?;
    database.run_migrations().await?;

    let state = build_state(&database, &config);
    info!(
        version = %state.metadata.version,
        deployment_type = %state.metadata.deployment_type,
        "Loaded server metadata"
    );

    let (app, _socket_io) = router::build_router(state);

    let listener = TcpListener::bind(config.bind_address)
        .await
        .context("failed to bind socket")?;
    let actual_addr = listener
        .local_addr()
        .context("failed to read local address")?;

    info!("listening on {actual_addr}");

    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(?error, "server terminated with error");
    }

    Ok(())
}

async fn run_migrate(config: AppConfig) -> anyhow::Result<()> {
    let database = Database::connect(&config).await?;
    database.run_migrations().await?;
    info!("migrations completed");
    Ok(())
}

fn run_issue_token(config: AppConfig, user_id: String, role: String, ttl: i64) -> anyhow::Result<()> {
    if user_id.trim().is_empty() {
        anyhow::bail!("user_id must not be empty");
    }
    if ttl <= 0 {
        anyhow::bail!("ttl must be positive");
    }

    let secret = resolve_auth_secret(config.auth_secret.as_deref());
    let issuer = TokenIssuer::new(&secret);
    let token = issuer.issue(user_id.trim(), role.trim(), ttl)?;
    println!("{token}");
    Ok(())
}

enum EnvLoadStatus {
    Loaded(PathBuf),
    NotFound,
    Failed(DotenvError),
}

fn load_env_file() -> EnvLoadStatus {
    if let Ok(env_file) = std::env::var("CARTABLE_ENV_FILE") {
        let trimmed = env_file.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            return match from_filename(&path) {
                Ok(_) => {
                    let display_path = make_relative(&path).unwrap_or_else(|| path.clone());
                    EnvLoadStatus::Loaded(display_path)
                }
                Err(err) => EnvLoadStatus::Failed(err),
            };
        }
    }

    match dotenv() {
        Ok(path) => {
            let display_path = make_relative(&path).unwrap_or_else(|| path.clone());
            EnvLoadStatus::Loaded(display_path)
        }
        Err(DotenvError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            EnvLoadStatus::NotFound
        }
        Err(err) => EnvLoadStatus::Failed(err),
    }
}

fn report_env_status(status: &EnvLoadStatus) {
    match status {
        EnvLoadStatus::Loaded(path) => {
            info!("Loaded environment variables from {}", path.display());
        }
        EnvLoadStatus::NotFound => {
            info!("No .env file found; using process environment only");
        }
        EnvLoadStatus::Failed(err) => {
            warn!("Failed to load .env file: {err:?}");
        }
    }
}

fn make_relative(path: &Path) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    path.strip_prefix(&cwd).map(|p| p.to_path_buf()).ok()
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = term.recv() => {},
            _ = int.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
