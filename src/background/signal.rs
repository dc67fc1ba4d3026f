//! Process termination as a one-shot future.

use tracing::{error, info};

/// Resolves once the process is asked to terminate.
///
/// On unix that is SIGTERM, SIGHUP or Ctrl-C; elsewhere only Ctrl-C. A
/// handler that cannot be installed is logged and never fires, so a broken
/// signal source does not stop the caller early.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;

        tokio::select! {
            () = unix_signal(SignalKind::terminate(), "SIGTERM") => {}
            () = unix_signal(SignalKind::hangup(), "SIGHUP") => {}
            () = ctrl_c() => {}
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(signal = "SIGINT", "shutdown requested"),
        Err(e) => {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind, name: &'static str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
            info!(signal = name, "shutdown requested");
        }
        Err(e) => {
            error!(signal = name, error = %e, "failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}
