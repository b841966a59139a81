//! Main entry point for the Fleetcast gateway.
//!
//! Loads configuration, starts the dispatch queue over the file-backed
//! presence store and serves the gateway routes.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use fleetcast_core::{
    DispatchConfig, DispatchQueue, Dispatcher, FilePresenceStore, HttpTransport, PresenceClient,
};
use fleetcast_server::{
    model::{common::AppState, config::Cli},
    startup::{self, LoggingConfig},
};

const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = cli
        .configuration()
        .with_context(|| format!("Failed to load configuration from {}", cli.config))?;

    let _logging_guard =
        startup::init_logging(&LoggingConfig::from_configuration(&configuration))?;

    let dispatch_config = DispatchConfig::from_configuration(&configuration);
    info!(
        message_path = %dispatch_config.message_path,
        disconnect_path = %dispatch_config.disconnect_path,
        broadcast_path = %dispatch_config.broadcast_path,
        probe_path = %dispatch_config.probe_path,
        timeout_ms = dispatch_config.request_timeout.as_millis() as u64,
        identifier_key = %dispatch_config.identifier_key,
        "Dispatch configuration loaded"
    );

    let store_file = configuration.store_file();
    let store = FilePresenceStore::new(&store_file);
    if !store.path().exists() {
        warn!(path = %store_file, "Presence registry not found, lookups will fail until it exists");
    }

    let transport =
        HttpTransport::from_config(&dispatch_config).context("Failed to build HTTP client")?;
    let presence = PresenceClient::new(Arc::new(store), &dispatch_config);
    let dispatcher = Arc::new(Dispatcher::new(
        presence,
        Arc::new(transport),
        dispatch_config.clone(),
    ));

    let (queue, worker) = DispatchQueue::start(dispatcher, dispatch_config.queue_capacity);
    let app_state = Arc::new(AppState::new(queue, &dispatch_config));

    let address = configuration.server_address();
    let port = configuration.server_port();
    info!("Gateway listening on http://{}:{}", address, port);

    startup::main_server(app_state.clone(), address.clone(), port)
        .with_context(|| format!("Failed to bind {}:{}", address, port))?
        .await
        .context("Gateway server failed")?;

    // Releasing the last sender lets the worker drain and stop
    drop(app_state);
    match tokio::time::timeout(WORKER_SHUTDOWN_TIMEOUT, worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Dispatch worker ended abnormally"),
        Err(_) => warn!("Dispatch worker still busy at shutdown, abandoning it"),
    }

    info!("Gateway stopped");
    Ok(())
}
