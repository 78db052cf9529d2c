//! Host-side Ed25519 signing with a TKey.
//!
//! The token holds the private key; this crate drives it over an abstract
//! [`device::DeviceClient`], writes keys and signatures as small text
//! envelopes and verifies signatures offline.
//!
//! # Workflow
//!
//! ```ignore
//! use tkey_sign_lib::prelude::*;
//!
//! let request = SignRequest::from_file(&path, Framing::Digest)?;
//! let mut session = DeviceSession::connect(&connector, config, reporter.clone(), cancel)?;
//! session.ensure_app(Some(&image), &NoSecret).await?;
//!
//! let signed = SigningOrchestrator::new(reporter).sign(&mut session, None, &request).await?;
//! envelope::write(&sig_path, &signed.signature, &signed.signature_comment(), false)?;
//! ```

pub mod config;
pub mod device;
pub mod digest;
pub mod envelope;
pub mod errors;
pub mod prelude;
pub mod record;
pub mod report;
pub mod secret;
pub mod session;
pub mod signing;
pub mod verify;

/// Test doubles for the token and the operator.
///
/// Only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use errors::{ErrorCode, SignError, FAILURE_EXIT_CODE};

/// Common result alias for tkey-sign operations.
pub type Result<T> = std::result::Result<T, SignError>;
