//! sockprobe -- multi-connection TCP client diagnostics.
//!
//! This crate provides the core library for opening and tracking many
//! outbound TCP connections, exchanging raw payloads with servers, and
//! generating synthetic load on a timer, plus an HTTP control API.

pub mod api;
pub mod config;
pub mod encoding;
pub mod error;
pub mod loadtest;
pub mod notify;
pub mod tcp;

use anyhow::{Context, Result};

use crate::api::state::AppState;
use crate::config::SockprobeConfig;
use crate::loadtest::LoadGenerator;
use crate::notify::Notifier;
use crate::tcp::ConnectionManager;

/// Wire up the notifier, connection manager, and load generator.
pub fn app_state(config: &SockprobeConfig) -> AppState {
    let notifier = Notifier::new(config.notifications.channel_capacity);
    let manager = ConnectionManager::new(config.connection.clone(), notifier.clone());
    let load_generator = LoadGenerator::new(manager.clone(), config.load_test.clone());
    AppState {
        manager,
        load_generator,
        notifier,
    }
}

/// Run the control API until Ctrl+C, then close every connection.
pub async fn serve(config: &SockprobeConfig) -> Result<()> {
    let state = app_state(config);

    let addr: std::net::SocketAddr = config
        .api
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address: {}", config.api.listen_address))?;
    let app = api::router(state.clone());

    tracing::info!(%addr, "sockprobe control API listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    state.load_generator.stop().await;
    state.manager.disconnect(None).await;
    tracing::info!("sockprobe shutting down");
    Ok(())
}
