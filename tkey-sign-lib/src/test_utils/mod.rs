//! Test utilities for tkey-sign.
//!
//! - [`MockToken`]: an in-memory token with configurable mode and faults
//! - [`CapturingReporter`]: records everything shown to the operator
//! - fixtures for deterministic keys and message files
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tkey_sign_lib::test_utils::{CapturingReporter, MockToken};
//!
//! let token = MockToken::in_firmware_mode();
//! let connector = token.connector();
//! let reporter = CapturingReporter::shared();
//!
//! let mut session = DeviceSession::connect(&connector, config, reporter.clone(), cancel)?;
//! session.ensure_app(Some(b"app"), &NoSecret).await?;
//! assert_eq!(token.load_calls(), 1);
//! ```

mod fixtures;
mod mock_device;
mod reporter;

pub use fixtures::{test_public_key, test_signing_key, write_file, TEST_APP_IMAGE};
pub use mock_device::{MockConnector, MockDevice, MockToken};
pub use reporter::CapturingReporter;
