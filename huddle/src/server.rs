//! Server lifecycle management
//!
//! Starts the HTTP/WebSocket listener and the reservation sweep, then waits
//! for a shutdown signal. If the media engine dies the server stops and the
//! process exits with an error; nothing the engine held can be recovered.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use huddle_core::Config;
use huddle_sfu::{SessionCoordinator, SfuError};

use crate::http::{create_router, AppState};

const HTTP_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HuddleServer {
    config: Config,
    coordinator: Arc<SessionCoordinator>,
}

impl HuddleServer {
    pub const fn new(config: Config, coordinator: Arc<SessionCoordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }

    /// Run until a shutdown signal, an HTTP server failure or engine death
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Starting Huddle server...");

        let shutdown = CancellationToken::new();
        let maintenance = self.coordinator.start_maintenance(shutdown.clone());
        let mut http_handle = self.start_http_server(shutdown.clone()).await?;
        let engine_died = self.coordinator.engine_died();

        let mut http_finished = false;
        let outcome = tokio::select! {
            result = &mut http_handle => {
                http_finished = true;
                match result {
                    Ok(Ok(())) => Err(anyhow::anyhow!("HTTP server stopped unexpectedly")),
                    Ok(Err(e)) => Err(anyhow::anyhow!("HTTP server error: {e}")),
                    Err(e) => Err(anyhow::anyhow!("HTTP server task failed: {e}")),
                }
            }
            () = engine_died.cancelled() => {
                error!("Media engine died, terminating");
                Err(SfuError::EngineProcessDied.into())
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
                Ok(())
            }
        };

        shutdown.cancel();

        if !http_finished {
            match tokio::time::timeout(HTTP_DRAIN_TIMEOUT, http_handle).await {
                Ok(_) => info!("HTTP server shut down gracefully"),
                Err(_) => warn!(
                    timeout_secs = HTTP_DRAIN_TIMEOUT.as_secs(),
                    remaining_peers = self.coordinator.peer_count(),
                    "HTTP server did not drain in time"
                ),
            }
        }
        if let Err(e) = maintenance.await {
            warn!(error = %e, "Reservation sweep task failed");
        }

        info!("Huddle server stopped");
        outcome
    }

    async fn start_http_server(
        &self,
        shutdown: CancellationToken,
    ) -> anyhow::Result<JoinHandle<std::io::Result<()>>> {
        let http_address = self.config.http_address();
        let listener = TcpListener::bind(&http_address).await.map_err(|e| {
            error!("Failed to bind HTTP address {}: {}", http_address, e);
            anyhow::anyhow!("Failed to bind {http_address}: {e}")
        })?;

        info!(
            address = %http_address,
            ws_path = %self.config.server.ws_path,
            "HTTP server listening"
        );

        let router = create_router(AppState {
            coordinator: Arc::clone(&self.coordinator),
            server: Arc::new(self.config.server.clone()),
        });

        Ok(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }))
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
