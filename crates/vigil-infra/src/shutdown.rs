//! Shutdown signal handling

use tokio::sync::watch;

/// Resolve on Ctrl+C (SIGINT) or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires; the other one still
/// does.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal");
        },
    }

    tracing::info!("Shutting down gracefully...");
}

/// Watch channel that flips to `true` once `signal` resolves. Consumer loops stop
/// between messages when it does.
pub fn shutdown_channel<F>(signal: F) -> watch::Receiver<bool>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        signal.await;
        let _ = tx.send(true);
        // keep the sender alive so receivers see `true` rather than a closed channel
        tx.closed().await;
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn channel_flips_when_signal_resolves() {
        let mut rx = shutdown_channel(tokio::time::sleep(Duration::from_secs(5)));
        assert!(!*rx.borrow());

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
