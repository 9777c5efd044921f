// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

mod api;
mod auth;
mod bridge;
mod config;
mod error;
mod notify;
mod reconcile;
mod resolver;
mod session_keys;
mod state;
mod storage;
mod transfers;
mod vault;

#[cfg(not(test))]
use std::{env, net::SocketAddr, sync::Arc};

#[cfg(not(test))]
use api::router;
#[cfg(not(test))]
use config::Config;
#[cfg(not(test))]
use reconcile::TransferPoller;
#[cfg(not(test))]
use state::AppState;
#[cfg(not(test))]
use tokio_util::sync::CancellationToken;
#[cfg(not(test))]
use tracing::info;

#[cfg(not(test))]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if env::var("LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(not(test))]
#[tokio::main]
async fn main() {
    init_tracing();

    let config = Config::from_env();

    let db_path = config.data_dir.join("bridge.redb");
    let db = storage::open_database(&db_path).expect("Failed to open database");

    let state = AppState::new(config, db).expect("Failed to build application state");

    // Background reconciliation poller with graceful shutdown.
    let shutdown = CancellationToken::new();
    let poller = TransferPoller::new(
        Arc::clone(&state.transfers),
        Arc::clone(&state.engine),
        Arc::clone(&state.bridge),
    )
    .with_interval(state.config.poll_interval)
    .with_batch_limit(state.config.poll_batch_limit);
    let poller_handle = tokio::spawn(poller.run(shutdown.clone()));

    let app = router(state.clone());

    let addr: SocketAddr = format!("{}:{}", state.config.host, state.config.port)
        .parse()
        .expect("Failed to parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    info!("Relational Bridge server listening on http://{addr} (docs at /docs)");

    let shutdown_for_server = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown_for_server.cancel();
        })
        .await
        .expect("HTTP server failed");

    let _ = poller_handle.await;

    // Decrypted session keys do not outlive the process.
    state.session_keys.clear_all();
    info!("Shutdown complete");
}
