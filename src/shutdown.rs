//! Translation of process termination signals into token cancellation.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawn a task that cancels `cancel` on the first SIGINT or SIGTERM.
///
/// The task ends once the token is cancelled, whatever cancelled it.
pub fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            signal = wait_for_signal() => {
                tracing::info!("action: signal_received | result: success | signal: {}", signal);
            }
        }
        cancel.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("action: register_sigterm | result: fail | error: {}", e);
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        name = ctrl_c() => name,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("action: register_sigint | result: fail | error: {}", e);
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
