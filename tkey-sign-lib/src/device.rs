//! Interface to the token.
//!
//! The session only talks to the token through [`DeviceClient`] and opens it
//! through [`Connector`], so the workflow can run against real hardware or a
//! test double alike.

use async_trait::async_trait;

use crate::secret::Secret;

/// Firmware name tags of a token waiting for an app.
pub const FIRMWARE_NAME: (&str, &str) = ("tk1 ", "mkdf");

/// Name tags of the signer app.
pub const SIGNER_APP_NAME: (&str, &str) = ("tk1 ", "sign");

/// Largest payload the signer app accepts.
pub const MAX_SIGN_SIZE: usize = 4096;

/// Default serial speed in bits per second.
pub const DEFAULT_SPEED: u32 = 62_500;

/// Errors reported by a device client.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The token sent nothing back. For identity queries this means "not
    /// the expected program" rather than a broken link.
    #[error("end of stream")]
    EndOfStream,

    /// The underlying link failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The token answered with something unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The client was already closed.
    #[error("device closed")]
    Closed,
}

/// Name and version reported by firmware or app.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameVersion {
    pub name0: String,
    pub name1: String,
    pub version: u32,
}

impl NameVersion {
    /// Build from the raw 4-byte name fields.
    pub fn from_raw(name0: [u8; 4], name1: [u8; 4], version: u32) -> Self {
        Self {
            name0: String::from_utf8_lossy(&name0).into_owned(),
            name1: String::from_utf8_lossy(&name1).into_owned(),
            version,
        }
    }

    /// True if both name fields match exactly. The version is ignored.
    pub fn matches(&self, expected: (&str, &str)) -> bool {
        self.name0 == expected.0 && self.name1 == expected.1
    }
}

/// Outcome of an identity query.
#[derive(Debug)]
pub enum Probe {
    /// The expected program answered.
    Confirmed(NameVersion),
    /// Something else answered, or nothing did.
    NotPresent(Option<NameVersion>),
    /// The link failed while asking.
    TransportFailure(DeviceError),
}

impl Probe {
    /// Classify the result of a name/version query.
    pub fn classify(
        result: std::result::Result<NameVersion, DeviceError>,
        expected: (&str, &str),
    ) -> Self {
        match result {
            Ok(nv) if nv.matches(expected) => Self::Confirmed(nv),
            Ok(nv) => Self::NotPresent(Some(nv)),
            Err(DeviceError::EndOfStream) => Self::NotPresent(None),
            Err(e) => Self::TransportFailure(e),
        }
    }

    /// True for [`Probe::Confirmed`].
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}

/// Client for one connected token.
///
/// The handle is owned by a single session. `close` must be safe to call
/// while another call is pending on a different thread of control and must
/// release the link.
#[async_trait]
pub trait DeviceClient: Send {
    /// Query the firmware name and version.
    async fn firmware_name_version(&mut self) -> std::result::Result<NameVersion, DeviceError>;

    /// Load an app image, optionally mixing in a USS.
    async fn load_app(
        &mut self,
        image: &[u8],
        secret: Option<&Secret>,
    ) -> std::result::Result<(), DeviceError>;

    /// Query the running app's name and version.
    async fn app_name_version(&mut self) -> std::result::Result<NameVersion, DeviceError>;

    /// Fetch the app's raw Ed25519 public key.
    async fn public_key(&mut self) -> std::result::Result<[u8; 32], DeviceError>;

    /// Sign `payload`. Waits for the touch confirmation without a timeout.
    async fn sign(&mut self, payload: &[u8]) -> std::result::Result<[u8; 64], DeviceError>;

    /// Release the link.
    fn close(&mut self) -> std::result::Result<(), DeviceError>;
}

/// Finds and opens tokens.
pub trait Connector {
    /// Client type produced by this connector.
    type Client: DeviceClient;

    /// Candidate device paths.
    fn detect(&self) -> std::result::Result<Vec<String>, DeviceError>;

    /// Open the token at `path`.
    fn connect(&self, path: &str, speed: u32) -> std::result::Result<Self::Client, DeviceError>;
}
