use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wait for Ctrl+C or SIGTERM, whichever arrives first.
pub async fn wait_for_shutdown() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .context("failed to install Ctrl+C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        sigterm.recv().await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    let received = tokio::select! {
        res = ctrl_c => res.map(|_| "SIGINT"),
        res = terminate => res.map(|_| "SIGTERM"),
    };

    match received {
        Ok(name) => {
            tracing::info!(signal = name, "shutdown signal received, initiating graceful shutdown");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "signal handling failed");
            Err(e)
        }
    }
}

/// Cancels `token` on the first termination signal.
///
/// Returns when either the signal arrived or the token was cancelled elsewhere.
pub async fn cancel_on_shutdown(token: CancellationToken) {
    tokio::select! {
        res = wait_for_shutdown() => {
            match res {
                Ok(()) => token.cancel(),
                Err(_) => {
                    tracing::warn!("signal handlers unavailable; waiting for explicit cancellation");
                    token.cancelled().await;
                }
            }
        }
        _ = token.cancelled() => {}
    }
}
