//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use tkey_sign_lib::prelude::*;
//! ```

// Error handling
pub use crate::errors::{ErrorCode, SignError};
pub use crate::Result;

// Device seam
pub use crate::device::{Connector, DeviceClient, DeviceError, NameVersion, Probe};

// Session
pub use crate::config::SessionConfig;
pub use crate::session::{DeviceSession, SessionState};

// Records and files
pub use crate::digest::Framing;
pub use crate::envelope;
pub use crate::record::{PublicKey, Record, Signature};

// Operator surface
pub use crate::report::{Reporter, SharedReporter, TracingReporter};
pub use crate::secret::{NoSecret, Secret, SecretFile, SecretSource};

// Workflows
pub use crate::signing::{SignRequest, SignedMessage, SigningOrchestrator};
pub use crate::verify::{OfflineVerifier, Verified};
