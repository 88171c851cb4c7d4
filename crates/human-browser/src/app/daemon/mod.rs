//! Daemon wiring: HTTP API, bridge socket, and the blocking entry point.

mod bridge_socket;
mod error;
mod server;

use anyhow::Context;
use anyhow::Result;
use tracing::info;

pub use error::DaemonServerError;
pub use server::DaemonHandle;
pub use server::serve;

use crate::infra::config::DaemonConfig;

/// Runs the daemon until Ctrl-C or SIGTERM; `on_ready` sees the bound handle.
pub fn run_daemon(config: DaemonConfig, on_ready: impl FnOnce(&DaemonHandle)) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build daemon runtime")?;

    runtime.block_on(async move {
        let handle = serve(config).await.context("Failed to start daemon")?;
        on_ready(&handle);
        shutdown_signal().await;
        info!("Shutdown signal received");
        handle.shutdown().await;
        Ok(())
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to install SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
