//! Session configuration.

use crate::device::DEFAULT_SPEED;

/// How to reach the token and what to tell the operator about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Serial device path. `None` (or empty) means auto-detect.
    pub port: Option<String>,

    /// Serial speed in bits per second.
    pub speed: u32,

    /// The deployed signer app was built without the touch requirement.
    pub no_touch: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: None,
            speed: DEFAULT_SPEED,
            no_touch: false,
        }
    }
}

impl SessionConfig {
    /// Create a configuration for an explicit port.
    pub fn with_port(port: impl Into<String>) -> Self {
        Self {
            port: Some(port.into()),
            ..Self::default()
        }
    }

    /// Explicit port, ignoring an empty string.
    pub fn explicit_port(&self) -> Option<&str> {
        self.port.as_deref().filter(|p| !p.is_empty())
    }
}
