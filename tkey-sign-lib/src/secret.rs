//! User Supplied Secret (USS).
//!
//! The USS is an opaque blob mixed into the app load. A different USS gives
//! a different key pair. It is only held for the duration of the load call
//! and wiped when dropped.

use std::io::Read;
use std::path::PathBuf;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Result, SignError};

/// Opaque secret bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Wrap raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Read a secret verbatim from `reader`.
    pub fn from_reader(mut reader: impl Read) -> std::io::Result<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Self(buf))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret({} bytes)", self.0.len())
    }
}

/// Where the USS comes from, resolved only when the token actually loads
/// the app.
pub trait SecretSource {
    /// True if the operator asked for a USS at all.
    fn is_requested(&self) -> bool;

    /// Produce the secret. Called at most once per session.
    fn obtain(&self) -> Result<Option<Secret>>;
}

/// No USS.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSecret;

impl SecretSource for NoSecret {
    fn is_requested(&self) -> bool {
        false
    }

    fn obtain(&self) -> Result<Option<Secret>> {
        Ok(None)
    }
}

/// USS read from a file, or from standard input when the path is `-`.
///
/// The contents are used unmodified; trailing newlines are kept.
#[derive(Clone, Debug)]
pub struct SecretFile(pub PathBuf);

impl SecretSource for SecretFile {
    fn is_requested(&self) -> bool {
        true
    }

    fn obtain(&self) -> Result<Option<Secret>> {
        let read = if self.0.as_os_str() == "-" {
            Secret::from_reader(std::io::stdin().lock())
        } else {
            std::fs::File::open(&self.0).and_then(|file| Secret::from_reader(file))
        };
        let secret =
            read.map_err(|e| SignError::Secret(format!("{}: {}", self.0.display(), e)))?;

        Ok(Some(secret))
    }
}
