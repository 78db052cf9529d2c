//! In-memory token.
//!
//! A [`MockToken`] is a cloneable handle on shared token state. Tests keep
//! one handle for inspection and hand a [`MockConnector`] to the session,
//! which opens [`MockDevice`] clients on the same state.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest as _, Sha512};
use tokio::sync::Notify;

use super::fixtures::test_signing_key;
use crate::device::{
    Connector, DeviceClient, DeviceError, NameVersion, FIRMWARE_NAME, SIGNER_APP_NAME,
};
use crate::record::PublicKey;
use crate::secret::Secret;

#[derive(Debug)]
struct TokenState {
    ports: Vec<String>,
    firmware_mode: bool,
    app_name: ([u8; 4], [u8; 4]),
    secret: Option<Vec<u8>>,
    tamper: bool,
    block_sign: bool,
    fail_load: bool,
    fail_connect: bool,
    load_calls: usize,
    sign_calls: usize,
    close_calls: usize,
    last_payload: Option<Vec<u8>>,
    connected_path: Option<String>,
}

impl Default for TokenState {
    fn default() -> Self {
        Self {
            ports: vec!["/dev/ttyMOCK0".to_string()],
            firmware_mode: false,
            app_name: (name_bytes(SIGNER_APP_NAME.0), name_bytes(SIGNER_APP_NAME.1)),
            secret: None,
            tamper: false,
            block_sign: false,
            fail_load: false,
            fail_connect: false,
            load_calls: 0,
            sign_calls: 0,
            close_calls: 0,
            last_payload: None,
            connected_path: None,
        }
    }
}

fn name_bytes(name: &str) -> [u8; 4] {
    let mut out = [b' '; 4];
    for (dst, src) in out.iter_mut().zip(name.bytes()) {
        *dst = src;
    }
    out
}

/// Handle on a simulated token.
#[derive(Clone, Default)]
pub struct MockToken {
    state: Arc<Mutex<TokenState>>,
    sign_started: Arc<Notify>,
}

impl MockToken {
    /// A token already running the signer app.
    pub fn running_app() -> Self {
        Self::default()
    }

    /// A freshly plugged token waiting for an app.
    pub fn in_firmware_mode() -> Self {
        let token = Self::default();
        token.lock().firmware_mode = true;
        token
    }

    /// Run an app with a different name instead of the signer.
    pub fn with_app_name(self, name0: &str, name1: &str) -> Self {
        self.lock().app_name = (name_bytes(name0), name_bytes(name1));
        self
    }

    /// Corrupt every signature the token returns.
    pub fn tampering(self) -> Self {
        self.lock().tamper = true;
        self
    }

    /// Never answer a sign request, as if nobody touched the token.
    pub fn blocking_sign(self) -> Self {
        self.lock().block_sign = true;
        self
    }

    /// Reject app loads.
    pub fn failing_load(self) -> Self {
        self.lock().fail_load = true;
        self
    }

    /// Refuse to open the port.
    pub fn failing_connect(self) -> Self {
        self.lock().fail_connect = true;
        self
    }

    /// Replace the detected ports.
    pub fn with_ports<I, S>(self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().ports = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Connector opening clients on this token.
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            token: self.clone(),
        }
    }

    /// Number of app load attempts.
    pub fn load_calls(&self) -> usize {
        self.lock().load_calls
    }

    /// Number of sign requests.
    pub fn sign_calls(&self) -> usize {
        self.lock().sign_calls
    }

    /// Number of times a client was closed.
    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    /// Payload of the last sign request.
    pub fn last_payload(&self) -> Option<Vec<u8>> {
        self.lock().last_payload.clone()
    }

    /// Path the last client was opened on.
    pub fn connected_path(&self) -> Option<String> {
        self.lock().connected_path.clone()
    }

    /// Wait until a sign request reached the token.
    pub async fn wait_for_sign(&self) {
        self.sign_started.notified().await;
    }

    /// The key the token would use after a load with `secret`.
    pub fn public_key_for(secret: Option<&[u8]>) -> PublicKey {
        PublicKey::new(derive_key(secret).verifying_key().to_bytes())
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap()
    }
}

/// A USS changes the key the same way on every load.
fn derive_key(secret: Option<&[u8]>) -> SigningKey {
    let base = test_signing_key();
    match secret {
        None => base,
        Some(secret) => {
            let mut hasher = Sha512::new();
            hasher.update(base.to_bytes());
            hasher.update(secret);
            let hash = hasher.finalize();
            let mut seed = [0u8; 32];
            seed.copy_from_slice(&hash[..32]);
            SigningKey::from_bytes(&seed)
        }
    }
}

/// Connector for a [`MockToken`].
#[derive(Clone)]
pub struct MockConnector {
    token: MockToken,
}

impl Connector for MockConnector {
    type Client = MockDevice;

    fn detect(&self) -> Result<Vec<String>, DeviceError> {
        Ok(self.token.lock().ports.clone())
    }

    fn connect(&self, path: &str, _speed: u32) -> Result<MockDevice, DeviceError> {
        let mut state = self.token.lock();
        if state.fail_connect {
            return Err(DeviceError::Io(format!("cannot open {}", path)));
        }
        state.connected_path = Some(path.to_string());
        drop(state);

        Ok(MockDevice {
            token: self.token.clone(),
            closed: false,
        })
    }
}

/// Client on a [`MockToken`].
pub struct MockDevice {
    token: MockToken,
    closed: bool,
}

impl MockDevice {
    fn check_open(&self) -> Result<(), DeviceError> {
        if self.closed {
            Err(DeviceError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeviceClient for MockDevice {
    async fn firmware_name_version(&mut self) -> Result<NameVersion, DeviceError> {
        self.check_open()?;
        if self.token.lock().firmware_mode {
            Ok(NameVersion::from_raw(
                name_bytes(FIRMWARE_NAME.0),
                name_bytes(FIRMWARE_NAME.1),
                5,
            ))
        } else {
            // A running app does not answer firmware commands.
            Err(DeviceError::EndOfStream)
        }
    }

    async fn load_app(&mut self, image: &[u8], secret: Option<&Secret>) -> Result<(), DeviceError> {
        self.check_open()?;
        let mut state = self.token.lock();
        state.load_calls += 1;

        if !state.firmware_mode {
            return Err(DeviceError::Protocol("not in firmware mode".to_string()));
        }
        if state.fail_load || image.is_empty() {
            return Err(DeviceError::Protocol("app load rejected".to_string()));
        }

        state.firmware_mode = false;
        state.secret = secret.map(|s| s.as_bytes().to_vec());
        Ok(())
    }

    async fn app_name_version(&mut self) -> Result<NameVersion, DeviceError> {
        self.check_open()?;
        let state = self.token.lock();
        if state.firmware_mode {
            return Err(DeviceError::EndOfStream);
        }
        Ok(NameVersion::from_raw(state.app_name.0, state.app_name.1, 1))
    }

    async fn public_key(&mut self) -> Result<[u8; 32], DeviceError> {
        self.check_open()?;
        let state = self.token.lock();
        Ok(derive_key(state.secret.as_deref())
            .verifying_key()
            .to_bytes())
    }

    async fn sign(&mut self, payload: &[u8]) -> Result<[u8; 64], DeviceError> {
        self.check_open()?;
        let (key, tamper, block) = {
            let mut state = self.token.lock();
            state.sign_calls += 1;
            state.last_payload = Some(payload.to_vec());
            (
                derive_key(state.secret.as_deref()),
                state.tamper,
                state.block_sign,
            )
        };
        self.token.sign_started.notify_one();

        if block {
            std::future::pending::<()>().await;
        }

        let mut sig = key.sign(payload).to_bytes();
        if tamper {
            sig[0] ^= 0x01;
        }
        Ok(sig)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.closed = true;
        self.token.lock().close_calls += 1;
        Ok(())
    }
}
