use {
    crate::cancel::CancellationToken,
    anyhow::{Context, Result},
    derive_more::Display,
    futures::{FutureExt, future::select},
    std::{future::Future, pin::pin},
    tokio::signal::ctrl_c,
    tracing::warn,
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    #[display("SIGINT")]
    Sigint,
    #[display("SIGTERM")]
    Sigterm,
}

/// Waits for the first SIGINT or SIGTERM.
#[inline]
pub async fn shutdown_signal() -> Result<ShutdownSignal> {
    let sigint = ctrl_c().map(|signal| {
        signal
            .map(|()| ShutdownSignal::Sigint)
            .context("failed to install sigint signal handler")
    });
    let sigint = pin!(sigint);
    let sigterm = sigterm()
        .context("failed to install sigterm signal handler")?
        .map(|()| Ok(ShutdownSignal::Sigterm));
    let sigterm = pin!(sigterm);
    let (signal, _unfired_signal) = select(sigint, sigterm).await.factor_first();
    signal
}

/// Trips `token` when the process is asked to stop.
///
/// Running cipher streams fail their next read with a cancellation error.
#[inline]
pub async fn cancel_on_shutdown(token: CancellationToken) -> Result<ShutdownSignal> {
    let signal = shutdown_signal().await?;
    warn!(%signal, "shutdown requested, cancelling running operations");
    token.cancel();
    Ok(signal)
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
    Ok(std::future::pending())
}
