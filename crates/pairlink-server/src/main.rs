//! HTTP control server for a single paired messaging session.
//!
//! Run with: cargo run -p pairlink-server
//!
//! Then `POST http://localhost:3000/session/start` and poll
//! `GET /session/status` until it reports `CONNECTED`.

mod config;

use std::{future::IntoFuture, sync::Arc, time::Duration};

use anyhow::Context;
use pairlink_core::loopback::LoopbackProtocol;
use pairlink_session::{BroadcastDispatcher, ConnectionStateMachine, storage::FileCredentialStore};
use pairlink_transport::{ControlState, control_router};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;

/// How long in-flight requests (long broadcasts) get after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let mut protocol = LoopbackProtocol::new();
    if let Some(after) = config.auto_pair {
        protocol = protocol.with_auto_pair(after);
    }
    let store = FileCredentialStore::from_config(&config.session);
    tracing::info!(dir = %store.dir().display(), "credential directory");

    let machine = ConnectionStateMachine::new(
        config.session.clone(),
        Arc::new(protocol),
        Arc::new(store),
    );
    let dispatcher = BroadcastDispatcher::with_pacing(machine.context(), config.session.pacing);

    let app = control_router(ControlState::new(machine, dispatcher)).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!("Server listening on http://{}", config.bind);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let graceful_rx = shutdown_rx.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stopped(graceful_rx).await;
            tracing::info!("shutdown requested, draining requests");
        })
        .into_future();

    tokio::select! {
        res = server => res.context("server error")?,
        () = async move {
            stopped(shutdown_rx).await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            tracing::warn!("shutdown grace elapsed, aborting in-flight requests");
        }
    }

    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
