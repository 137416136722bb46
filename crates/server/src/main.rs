//! shulboard gateway entry point.
//!
//! Boots the caching gateway the kiosk browser points at: opens the store,
//! primes and activates the current cache generation, then serves until a
//! shutdown signal arrives. Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use shulboard_client::{CacheEngine, HttpUpstream, Revalidator, Upstream, UpstreamConfig};
use shulboard_core::{AppConfig, StoreDb};

mod admin;
mod lifecycle;
mod proxy;
mod router;

use lifecycle::{Lifecycle, RoutePolicy};
use router::GatewayState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(
        listen_addr = %config.listen_addr,
        upstream_origin = %config.upstream_origin,
        cache_version = %config.cache_version,
        "starting shulboard gateway"
    );

    let store = StoreDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening store at {}", config.db_path.display()))?;

    let http = Arc::new(HttpUpstream::new(UpstreamConfig::from_app(&config)?)?);
    let upstream: Arc<dyn Upstream> = http.clone();

    let revalidator = Revalidator::spawn(store.clone(), upstream.clone());
    let engine = CacheEngine::new(store.clone(), upstream.clone(), revalidator.handle());

    let policy = RoutePolicy::from_config(&config)?;
    let lifecycle = Arc::new(Lifecycle::new(
        store.clone(),
        upstream,
        &config.cache_version,
        policy.board_origin.clone(),
        config.shell_routes.clone(),
    ));

    // Install, then activate immediately: no coexistence with a previous
    // generation. The listener below only opens once activation is done,
    // so every page the kiosk has open is talking to this generation from
    // its next request on.
    let primed = lifecycle.install().await;
    tracing::info!(primed, "install finished");
    lifecycle.activate().await?;

    let app = router::build_router(GatewayState {
        engine,
        http,
        lifecycle: lifecycle.clone(),
        policy,
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    // Retire this generation, then drain the refresh queue so no store
    // write is cut off mid-pair.
    lifecycle.supersede().await;
    revalidator.shutdown().await;
    tracing::info!("gateway shutdown complete");

    Ok(())
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

    tracing::info!("shutdown signal received");
}
