//! Signal supervision.
//!
//! The SIGINT/SIGTERM handlers are registered synchronously by [`install`],
//! before any device call. One background task then waits for the first
//! signal and cancels the shared token, which makes the pending device call
//! return `Interrupted` and close the device. The main path checks the token
//! once the command returns, so a signal always ends in the failure exit
//! code. If the main path has not exited after a grace period (it may be
//! blocked outside a device call, e.g. reading a prompt), the process is
//! ended with the failure exit code.

use std::time::Duration;

use tkey_sign_lib::FAILURE_EXIT_CODE;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time the main path gets to tear down after a signal.
pub const GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Registered shutdown signal handlers.
///
/// Once registered, SIGINT and SIGTERM no longer terminate the process on
/// their own.
pub struct ShutdownSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    /// Register the handlers. Must be called inside the runtime.
    pub fn register() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            Ok(Self {
                sigint: signal(SignalKind::interrupt())?,
                sigterm: signal(SignalKind::terminate())?,
            })
        }

        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next shutdown signal.
    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigint.recv() => tracing::info!("received SIGINT"),
                _ = self.sigterm.recv() => tracing::info!("received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("received Ctrl+C"),
                Err(e) => {
                    tracing::warn!("could not listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}

/// Register the handlers and spawn the supervisor.
///
/// The handlers are in place when this returns.
pub fn install(token: CancellationToken) -> std::io::Result<JoinHandle<()>> {
    let mut signals = ShutdownSignals::register()?;
    Ok(tokio::spawn(async move {
        signals.recv().await;
        supervise(token, GRACE_PERIOD).await;
        std::process::exit(FAILURE_EXIT_CODE);
    }))
}

/// Cancel `token` and give the main path `grace` to finish.
pub async fn supervise(token: CancellationToken, grace: Duration) {
    token.cancel();
    tokio::time::sleep(grace).await;
    tracing::warn!("teardown did not finish in {:?}, exiting", grace);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_supervise_cancels_first() {
        let token = CancellationToken::new();
        let watcher = token.clone();

        let task = tokio::spawn(supervise(token, Duration::from_millis(10)));
        watcher.cancelled().await;
        assert!(watcher.is_cancelled());
        task.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_registered_handler_receives_sigint() {
        let mut signals = ShutdownSignals::register().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .expect("SIGINT was not delivered to the handler");
    }
}
