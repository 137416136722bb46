//! shulboard content backend entry point.
//!
//! Serves the board shell page and the entity API the board's pages read
//! and the office edits. The gateway in front of the kiosk treats this
//! process as its upstream origin.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use shulboard_core::{AppConfig, StoreDb};

mod api;
mod shell;

use api::ContentState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(
        listen_addr = %config.content_listen_addr,
        "starting shulboard content backend"
    );

    let store = StoreDb::open(&config.content_db_path)
        .await
        .with_context(|| format!("opening store at {}", config.content_db_path.display()))?;

    let app = api::build_router(ContentState {
        store,
        shell: Arc::new(load_shell(&config)),
    });

    let listener = tokio::net::TcpListener::bind(&config.content_listen_addr)
        .await
        .with_context(|| format!("binding {}", config.content_listen_addr))?;
    tracing::info!(addr = %config.content_listen_addr, "content backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    tracing::info!("content backend shutdown complete");
    Ok(())
}

/// Read the shell page from disk when configured, else use the built-in one.
fn load_shell(config: &AppConfig) -> String {
    match &config.shell_file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "shell file unreadable, using built-in");
                shell::BUILTIN_SHELL.to_string()
            }
        },
        None => shell::BUILTIN_SHELL.to_string(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
