//! Device session state machine.
//!
//! ```text
//! connect --> Connected
//! Connected --probe--> ConnectedFirmwareMode | ConnectedAppMode
//! ConnectedFirmwareMode --load--> AppLoaded
//! AppLoaded | ConnectedAppMode --confirm--> Ready
//! any --close--> Closed
//! ```
//!
//! The session owns the device client exclusively and closes it exactly
//! once: explicitly, when an interrupt cancels a pending call, or on drop.
//! Every device call races against the session's cancellation token so a
//! signal can end even the unbounded wait for a touch.

use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::device::{Connector, DeviceClient, NameVersion, Probe, FIRMWARE_NAME, SIGNER_APP_NAME};
use crate::record::PublicKey;
use crate::report::SharedReporter;
use crate::secret::{Secret, SecretSource};
use crate::{Result, SignError};

/// Shown before signing when the touch requirement is compiled out.
const NO_TOUCH_WARNING: &str =
    "WARNING! This tkey-sign and signer app is built with the touch requirement removed";

/// Lifecycle state of a [`DeviceSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    ConnectedFirmwareMode,
    ConnectedAppMode,
    AppLoaded,
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Await `fut` unless `cancel` fires first.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SignError::Interrupted),
        out = fut => Ok(out),
    }
}

/// A connection to one token.
pub struct DeviceSession<C: DeviceClient> {
    client: C,
    port: String,
    state: SessionState,
    config: SessionConfig,
    reporter: SharedReporter,
    cancel: CancellationToken,
}

impl<C: DeviceClient> DeviceSession<C> {
    /// Open the configured port, or the single detected token.
    pub fn connect<K>(
        connector: &K,
        config: SessionConfig,
        reporter: SharedReporter,
        cancel: CancellationToken,
    ) -> Result<Self>
    where
        K: Connector<Client = C>,
    {
        if cancel.is_cancelled() {
            return Err(SignError::Interrupted);
        }

        let port = match config.explicit_port() {
            Some(port) => port.to_string(),
            None => detect_port(connector)?,
        };

        reporter.info(&format!("Connecting to TKey on serial port {} ...", port));
        let client = connector
            .connect(&port, config.speed)
            .map_err(|e| SignError::transport("Connect", e))?;
        tracing::debug!(port = %port, speed = config.speed, "connected");

        Ok(Self {
            client,
            port,
            state: SessionState::Connected,
            config,
            reporter,
            cancel,
        })
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Device path in use.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Ask the firmware who it is.
    ///
    /// Only an exact firmware name match counts as firmware mode. Anything
    /// else, including a failed query, is taken to mean an app is running.
    pub async fn probe_mode(&mut self) -> Result<Probe> {
        self.require(&[SessionState::Connected], "probe mode")?;

        let result = until_cancelled(&self.cancel, self.client.firmware_name_version()).await;
        let result = self.teardown_if_interrupted(result)?;
        let probe = Probe::classify(result, FIRMWARE_NAME);

        match &probe {
            Probe::Confirmed(nv) => {
                tracing::debug!(version = nv.version, "token in firmware mode");
                self.state = SessionState::ConnectedFirmwareMode;
            }
            Probe::NotPresent(_) => {
                tracing::debug!("token not in firmware mode");
                self.state = SessionState::ConnectedAppMode;
            }
            Probe::TransportFailure(e) => {
                tracing::debug!(error = %e, "firmware query failed, assuming app mode");
                self.state = SessionState::ConnectedAppMode;
            }
        }
        Ok(probe)
    }

    /// Load the signer app. Only valid in firmware mode; never retried.
    pub async fn load_application(&mut self, image: &[u8], secret: Option<&Secret>) -> Result<()> {
        self.require(&[SessionState::ConnectedFirmwareMode], "load application")?;

        tracing::info!(
            size = image.len(),
            uss = secret.is_some(),
            "loading signer app"
        );
        let result = until_cancelled(&self.cancel, self.client.load_app(image, secret)).await;
        self.teardown_if_interrupted(result)?
            .map_err(|e| SignError::LoadFailed(e.to_string()))?;

        self.state = SessionState::AppLoaded;
        self.reporter.info("Signer app loaded.");
        Ok(())
    }

    /// Bring the token to [`SessionState::Ready`].
    ///
    /// In firmware mode the app image is loaded, with the USS from `secret`
    /// if one was requested. If an app already runs, loading is skipped and
    /// the operator is warned that a requested USS has no effect.
    pub async fn ensure_app(
        &mut self,
        image: Option<&[u8]>,
        secret: &dyn SecretSource,
    ) -> Result<NameVersion> {
        if self.probe_mode().await?.is_confirmed() {
            let image = image.ok_or_else(|| {
                SignError::LoadFailed(
                    "TKey is in firmware mode but no signer app image was given".to_string(),
                )
            })?;
            let secret = secret.obtain()?;
            self.load_application(image, secret.as_ref()).await?;
        } else if secret.is_requested() {
            self.reporter
                .warn("App already loaded, your USS won't be used.");
        } else {
            self.reporter.warn("App already loaded.");
        }

        self.confirm_identity().await
    }

    /// Check that the running app is the signer.
    ///
    /// End of stream means "not the signer" and is not logged as an error.
    pub async fn confirm_identity(&mut self) -> Result<NameVersion> {
        self.require(
            &[
                SessionState::AppLoaded,
                SessionState::ConnectedAppMode,
                SessionState::Ready,
            ],
            "confirm identity",
        )?;

        let result = until_cancelled(&self.cancel, self.client.app_name_version()).await;
        let result = self.teardown_if_interrupted(result)?;

        match Probe::classify(result, SIGNER_APP_NAME) {
            Probe::Confirmed(nv) => {
                tracing::debug!(version = nv.version, "signer app confirmed");
                self.state = SessionState::Ready;
                Ok(nv)
            }
            Probe::NotPresent(Some(nv)) => {
                tracing::debug!(name0 = %nv.name0, name1 = %nv.name1, "unexpected app");
                Err(SignError::WrongApplication)
            }
            Probe::NotPresent(None) => Err(SignError::WrongApplication),
            Probe::TransportFailure(e) => {
                tracing::error!("GetAppNameVersion: {}", e);
                Err(SignError::WrongApplication)
            }
        }
    }

    /// Public key of the running signer app.
    pub async fn public_key(&mut self) -> Result<PublicKey> {
        self.require(&[SessionState::Ready], "get public key")?;

        let result = until_cancelled(&self.cancel, self.client.public_key()).await;
        let raw = self
            .teardown_if_interrupted(result)?
            .map_err(|e| SignError::transport("GetPubkey", e))?;
        Ok(PublicKey::new(raw))
    }

    /// Ask the token to sign `payload`.
    ///
    /// Blocks until the operator touches the token or the session is
    /// cancelled. The operator is told beforehand whether a touch is needed.
    pub async fn request_signature(&mut self, payload: &[u8]) -> Result<[u8; 64]> {
        self.require(&[SessionState::Ready], "sign")?;

        if self.config.no_touch {
            self.reporter.warn(NO_TOUCH_WARNING);
        } else {
            self.reporter
                .info("The TKey will flash green when touch is required ...");
        }

        let result = until_cancelled(&self.cancel, self.client.sign(payload)).await;
        self.teardown_if_interrupted(result)?
            .map_err(|e| SignError::transport("Sign", e))
    }

    /// Release the device. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        match self.client.close() {
            Ok(()) => tracing::debug!(port = %self.port, "device closed"),
            Err(e) => tracing::warn!(port = %self.port, error = %e, "closing device failed"),
        }
    }

    fn require(&self, allowed: &[SessionState], operation: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SignError::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    /// Close the device right away when a call was cancelled.
    fn teardown_if_interrupted<T>(&mut self, result: Result<T>) -> Result<T> {
        if matches!(result, Err(SignError::Interrupted)) {
            tracing::info!("interrupted, closing device");
            self.close();
        }
        result
    }
}

impl<C: DeviceClient> Drop for DeviceSession<C> {
    fn drop(&mut self) {
        self.close();
    }
}

fn detect_port<K: Connector>(connector: &K) -> Result<String> {
    let ports = connector
        .detect()
        .map_err(|e| SignError::DeviceNotFound(e.to_string()))?;

    match ports.as_slice() {
        [] => Err(SignError::DeviceNotFound(
            "no TKey on any serial port".to_string(),
        )),
        [port] => Ok(port.clone()),
        many => Err(SignError::DeviceNotFound(format!(
            "more than one TKey found ({}), pass the port explicitly",
            many.join(", ")
        ))),
    }
}
