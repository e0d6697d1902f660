use {
    anyhow::{Context, Result},
    derive_more::Display,
    std::future::{Future, pending},
    tokio::signal::ctrl_c,
    tracing::{error, info},
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Sigint,
    Sigterm,
}

/// Resolves when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() -> Result<ShutdownSignal> {
    let sigterm = sigterm().context("failed to install sigterm signal handler")?;
    tokio::select! {
        signal = ctrl_c() => {
            signal.context("failed to install sigint signal handler")?;
            Ok(ShutdownSignal::Sigint)
        }
        () = sigterm => Ok(ShutdownSignal::Sigterm),
    }
}

/// Like [`shutdown_signal`], but logs the outcome. If the handlers can't be
/// installed, it never resolves and the process has to be killed.
pub async fn wait_for_shutdown() {
    match shutdown_signal().await {
        Ok(signal) => info!(%signal, "shutting down"),
        Err(err) => {
            error!(?err, "graceful shutdown is unavailable");
            pending::<()>().await;
        }
    }
}

fn sigterm() -> Result<impl Future<Output = ()>> {
    #[cfg(target_family = "unix")]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        Ok(async move {
            sigterm.recv().await;
        })
    }

    #[cfg(not(target_family = "unix"))]
    Ok(pending())
}
