use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cancels `token` on SIGTERM or SIGINT.
///
/// Returns early without cancelling anything when the token is cancelled
/// elsewhere first, e.g. because a finite input source reached its end.
pub async fn listen_shutdown(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {
            debug!("shutdown listener released: reason=token cancelled");
        }
        signal = wait_for_signal() => {
            warn!("shutdown signal received: signal={signal}");
            token.cancel();
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(err), _) | (_, Err(err)) => {
            warn!("failed to install signal handlers: error={err}");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "SIGINT",
        Err(err) => {
            warn!("failed to listen for ctrl-c: error={err}");
            std::future::pending().await
        }
    }
}
