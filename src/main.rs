// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{process::ExitCode, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use social_recovery_node::{
    api::router,
    config::NodeConfig,
    logging,
    recovery::RecoveryExpirySweeper,
    state::AppState,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// How long in-flight requests get to finish after ctrl-c.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    let config = match NodeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(config.log_format);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Node stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: NodeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.bind_addr()?;
    let tls = config.tls.clone();
    let sweep_interval = config.sweep_interval;

    let state = AppState::from_config(config)?;
    info!(
        data_dir = %state.storage.paths().root().display(),
        content_store = state.content.backend(),
        threshold = state.recovery.settings().threshold,
        "Node state initialized"
    );

    let shutdown = CancellationToken::new();
    let sweeper = RecoveryExpirySweeper::new(state.recovery.clone()).with_interval(sweep_interval);
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.clone()));

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for ctrl-c");
                return;
            }
            info!("Shutdown requested");
            shutdown.cancel();
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    let app = router(state).into_make_service();
    let served = match tls {
        Some(paths) => {
            // Install the ring crypto provider for rustls (must be done before any TLS operations)
            let _ = rustls::crypto::ring::default_provider().install_default();
            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key).await?;
            info!(%addr, "Social recovery node listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await
        }
        None => {
            info!(%addr, "Social recovery node listening on http (docs at /docs)");
            axum_server::bind(addr).handle(handle).serve(app).await
        }
    };

    shutdown.cancel();
    let _ = sweeper_task.await;
    served?;
    Ok(())
}
