//! Snippets API - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use snippets_api::auth::{self, Authenticator, PasswordService};
use snippets_api::{ServerConfig, SnippetStore, StateManager, UserStore, api, metrics};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "snippets-api")]
#[command(about = "Code snippet REST API", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
    }

    tracing::info!("Starting Snippets API");

    // Load configuration
    let mut config = ServerConfig::load(cli.config)?;

    // CLI overrides
    if let Some(port) = cli.port {
        config.api_port = port;
    }

    config.validate()?;

    tracing::info!(
        api_port = config.api_port,
        state_file = ?config.state_file,
        page_size = config.page_size,
        seed_users = config.users.len(),
        "Configuration loaded"
    );

    // Setup metrics
    let prometheus_handle = metrics::setup_metrics()?;

    let users = Arc::new(UserStore::new("user"));
    let snippets = Arc::new(SnippetStore::new("snippet"));

    // Restore persisted records before seeding so existing users win
    let state_manager = match &config.state_file {
        Some(path) => {
            let manager = Arc::new(StateManager::new(
                path.clone(),
                users.clone(),
                snippets.clone(),
            ));
            manager.restore().await?;
            Some(manager)
        }
        None => {
            tracing::info!("No state file configured, records are kept in memory only");
            None
        }
    };

    let passwords = PasswordService::new(config.password_memory_kib, config.password_iterations)
        .context("Invalid password hashing parameters")?;
    auth::seed_users(&users, &passwords, &config.users).await?;

    // Persist after seeding, then on every change
    let autosave_handle = match &state_manager {
        Some(manager) => {
            manager.save().await?;
            Some(tokio::spawn(manager.clone().run_autosave()))
        }
        None => None,
    };

    let authenticator = Arc::new(Authenticator::new(
        users.clone(),
        passwords,
        &config.session_cookie_name,
    ));

    // Setup API
    let app_state = api::AppState {
        snippets: snippets.clone(),
        users: users.clone(),
        authenticator,
        prometheus_handle,
        page_size: config.page_size,
        snippet_defaults: config.snippet_defaults.clone(),
    };

    let app = api::create_router(app_state).context("Failed to build API routes")?;

    let addr = SocketAddr::new(config.bind_address, config.api_port);
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("Shutting down...");

    if let Some(handle) = autosave_handle {
        handle.abort();
    }

    // Save final state
    if let Some(manager) = state_manager {
        tracing::info!(path = ?manager.state_file(), "Saving final state");
        manager.save().await?;
    }

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
