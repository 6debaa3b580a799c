//! OS signal handling
//!
//! A listener task waits for SIGINT or SIGTERM, logs which one arrived and
//! cancels the shared [`CancellationToken`]. Components never observe signals
//! directly; they only see the token.

use std::fmt;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Signal that requested shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Waits for the next shutdown signal.
///
/// # Errors
///
/// Returns the I/O error if a signal handler cannot be installed.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| ShutdownSignal::Interrupt),
        _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
    }
}

/// Waits for the next shutdown signal.
///
/// # Errors
///
/// Returns the I/O error if the Ctrl-C handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}

/// Spawns the listener that cancels `token` on the first signal.
///
/// The task also ends, without a signal, when the token is cancelled by
/// someone else.
pub fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<Option<ShutdownSignal>> {
    tokio::spawn(async move {
        tokio::select! {
            biased;

            _ = token.cancelled() => None,

            result = wait_for_signal() => match result {
                Ok(signal) => {
                    info!(signal = %signal, "Shutdown signal received");
                    token.cancel();
                    Some(signal)
                }
                Err(e) => {
                    error!(error = %e, "Failed to install signal handlers");
                    None
                }
            },
        }
    })
}
