//! Deterministic keys and files.

use std::path::{Path, PathBuf};

use ed25519_dalek::SigningKey;

use crate::record::PublicKey;

/// Seed of the mock token's built-in key.
const TEST_SEED: [u8; 32] = [0x42; 32];

/// Stand-in for a signer app binary.
pub const TEST_APP_IMAGE: &[u8] = b"\x7fTKEY signer app image";

/// The key a [`super::MockToken`] uses when loaded without a USS.
pub fn test_signing_key() -> SigningKey {
    SigningKey::from_bytes(&TEST_SEED)
}

/// Public half of [`test_signing_key`].
pub fn test_public_key() -> PublicKey {
    PublicKey::new(test_signing_key().verifying_key().to_bytes())
}

/// Write `contents` to `dir/name` and return the path.
///
/// # Panics
/// Panics if the file cannot be written.
pub fn write_file(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write test file");
    path
}
